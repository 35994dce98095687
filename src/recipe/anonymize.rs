//! Turns on the anonymize flag of every selected ingredient, so that
//! ingredients carrying an anonymizer formatter apply it after their other
//! formatters. Register it after extensions that add ingredients.

use std::any::Any;

use super::extension::Extension;
use crate::error::RecipeResult;
use crate::shelf::Shelf;

#[derive(Debug, Clone)]
pub struct Anonymize {
    anonymize: bool,
    dirty: bool,
}

impl Anonymize {
    pub fn new(anonymize: bool) -> Self {
        Self {
            anonymize,
            dirty: true,
        }
    }

    pub fn enabled(&self) -> bool {
        self.anonymize
    }

    pub fn set(&mut self, anonymize: bool) {
        if self.anonymize != anonymize {
            self.anonymize = anonymize;
            self.dirty = true;
        }
    }
}

impl Default for Anonymize {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Extension for Anonymize {
    fn name(&self) -> &str {
        "anonymize"
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn add_ingredients(&mut self, _shelf: &Shelf, cauldron: &mut Shelf) -> RecipeResult<()> {
        if self.anonymize {
            cauldron.set_anonymize(true);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
