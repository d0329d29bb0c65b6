//! CLI argument parsing for histdecode
//!
//! # Design Principles (KISS)
//! - Use clap's derive macro for declarative argument definition
//! - Common arguments shared via composition, not inheritance
//! - Each subcommand has its own Args struct that embeds the shared ones

use clap::Parser;
use std::path::PathBuf;

use crate::config::{ConfigError, VariantRegistry};
use crate::history::DecoderVariant;

mod constants {
    pub const DEFAULT_VARIANT: &str = "gmc";
}

/// Common arguments shared across all subcommands
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// TOML file with additional decoder variants
    #[arg(short = 'f', long = "config", env = "HISTDECODE_CONFIG")]
    pub config_file: Option<PathBuf>,
}

impl CommonArgs {
    /// Built-in variants, extended by the config file if one was given
    pub fn registry(&self) -> Result<VariantRegistry, ConfigError> {
        match &self.config_file {
            Some(path) => VariantRegistry::with_file(path),
            None => Ok(VariantRegistry::new()),
        }
    }
}

/// Arguments selecting the decoder variant
#[derive(Parser, Debug, Clone)]
pub struct VariantArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Variant name (see `histdecode variants`)
    #[arg(short = 'v', long, conflicts_with = "model")]
    pub variant: Option<String>,

    /// Device model / firmware string, e.g. "GMC-500+Re 1.18"
    #[arg(short = 'm', long)]
    pub model: Option<String>,
}

impl VariantArgs {
    /// Variant picked by name, else by model, else the standard GMC one
    pub fn resolve(&self) -> Result<DecoderVariant, ConfigError> {
        let registry = self.common.registry()?;
        let variant = match (&self.variant, &self.model) {
            (Some(name), _) => registry.get(name)?,
            (None, Some(model)) => registry.for_model(model)?,
            (None, None) => registry.get(constants::DEFAULT_VARIANT)?,
        };
        Ok(variant.clone())
    }
}

/// Arguments for `decode`
#[derive(Parser, Debug, Clone)]
pub struct DecodeArgs {
    /// History dump file (.bin for GMC, .dat for Gamma-Scout)
    pub file: PathBuf,

    #[command(flatten)]
    pub select: VariantArgs,

    /// Treat interior fill bytes as single-byte counts
    #[arg(long)]
    pub keep_fill: bool,

    /// Print rows, comments and issues as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `info`
#[derive(Parser, Debug, Clone)]
pub struct InfoArgs {
    /// History dump file
    pub file: PathBuf,

    #[command(flatten)]
    pub select: VariantArgs,
}
