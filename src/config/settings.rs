//! TOML-based configuration.
//!
//! Example configuration:
//! ```toml
//! [schema]
//! default_aggregation = "sum"
//! datatypes = ["integer", "float", "string"]
//!
//! [schema.formats]
//! euro = "€,.2f"
//!
//! [divide]
//! epsilon = 1e-9
//!
//! [recipe]
//! dialect = "postgres"
//! anonymize = false
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingredient::DEFAULT_EPSILON;
use crate::schema::{builtin_formats, Aggregation, SchemaConfig};
use crate::sql::{DataType, Dialect};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "RECIPE_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub schema: SchemaSettings,
    pub divide: DivideSettings,
    pub recipe: RecipeSettings,
}

/// Field validation defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchemaSettings {
    /// Aggregation for metric fields that do not name one.
    pub default_aggregation: String,

    /// Allowed cast targets; empty allows every known datatype.
    pub datatypes: Vec<DataType>,

    /// Extra named formats, merged over the built-in ones.
    pub formats: BTreeMap<String, String>,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            default_aggregation: "sum".to_string(),
            datatypes: Vec::new(),
            formats: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DivideSettings {
    /// Added to denominators of divide metrics without `ifzero`.
    pub epsilon: f64,
}

impl Default for DivideSettings {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RecipeSettings {
    pub dialect: Dialect,
    pub anonymize: bool,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `RECIPE_CONFIG`
    /// 2. `./recipe.toml`
    /// 3. `~/.config/recipe/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("recipe.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("recipe").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if !(self.divide.epsilon.is_finite() && self.divide.epsilon > 0.0) {
            return Err(SettingsError::InvalidConfig(format!(
                "divide.epsilon must be a positive number, got {}",
                self.divide.epsilon
            )));
        }
        self.default_aggregation().map(|_| ())
    }

    fn default_aggregation(&self) -> Result<Aggregation, SettingsError> {
        let name = &self.schema.default_aggregation;
        Aggregation::from_keyword(name).ok_or_else(|| {
            SettingsError::InvalidConfig(format!("unknown default_aggregation '{}'", name))
        })
    }

    /// The schema validator configuration these settings describe.
    pub fn schema_config(&self) -> Result<SchemaConfig, SettingsError> {
        let mut formats = builtin_formats();
        formats.extend(self.schema.formats.clone());
        Ok(SchemaConfig {
            formats,
            datatypes: if self.schema.datatypes.is_empty() {
                None
            } else {
                Some(self.schema.datatypes.clone())
            },
            default_aggregation: self.default_aggregation()?,
        })
    }
}
