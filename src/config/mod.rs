//! Decoder variant configuration
//!
//! Supports loading configuration from:
//! - Built-in variant tables (GMC standard, GMC-500+Re 1.18, Gamma-Scout)
//! - TOML files with additional `[[variant]]` tables
//!
//! Adding a firmware variant is adding a table; every loaded variant is
//! compiled once so a conflicting tag map is rejected at load time.
//!
//! # Example
//! ```ignore
//! let registry = VariantRegistry::with_file("variants.toml")?;
//! let variant = registry.for_model("GMC-500+Re 1.18").unwrap();
//! ```

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::common::DecodeError;
use crate::history::variant::best_model_match;
use crate::history::DecoderVariant;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Unknown variant: {0}")]
    UnknownVariant(String),

    #[error("Invalid variant: {0}")]
    Invalid(#[from] DecodeError),
}

/// Contents of a variant file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariantFile {
    #[serde(rename = "variant", default)]
    pub variants: Vec<DecoderVariant>,
}

impl VariantFile {
    /// Load variants from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load variants from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: VariantFile = toml::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for variant in &self.variants {
            variant.compile()?;
            debug!(variant = %variant.name, models = ?variant.models, "variant loaded");
        }
        Ok(())
    }
}

/// Built-in variants plus any loaded from files
///
/// A configured variant with the name of a built-in one replaces it.
#[derive(Debug, Clone)]
pub struct VariantRegistry {
    variants: Vec<DecoderVariant>,
}

impl Default for VariantRegistry {
    fn default() -> Self {
        Self {
            variants: DecoderVariant::builtin(),
        }
    }
}

impl VariantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-ins extended by the variants of a TOML file
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        registry.extend(VariantFile::load(path)?);
        Ok(registry)
    }

    pub fn extend(&mut self, file: VariantFile) {
        for variant in file.variants {
            match self.variants.iter_mut().find(|v| v.name == variant.name) {
                Some(slot) => *slot = variant,
                None => self.variants.push(variant),
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<&DecoderVariant, ConfigError> {
        self.variants
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| ConfigError::UnknownVariant(name.to_string()))
    }

    /// Best variant for a device model / firmware string
    pub fn for_model(&self, model: &str) -> Result<&DecoderVariant, ConfigError> {
        best_model_match(&self.variants, model)
            .ok_or_else(|| ConfigError::UnknownVariant(model.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn all(&self) -> &[DecoderVariant] {
        &self.variants
    }
}
