//! Types shared across the decoder, the loaders and the CLI

pub mod cli;
pub mod error;

pub use error::{DecodeError, DecodeIssue};
