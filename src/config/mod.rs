//! Configuration module.
//!
//! Handles the TOML settings file: schema defaults, the divide-by-zero
//! epsilon and recipe defaults.

mod settings;

pub use settings::{DivideSettings, RecipeSettings, SchemaSettings, Settings, SettingsError};
