//! geiger-history: decoder for the history memory of Geiger counters
//!
//! Turns the raw history buffer of GQ GMC and Gamma-Scout counters into
//! time-stamped count records, driven by per-model variant tables.

pub mod common;
pub mod config;
pub mod dump;
pub mod history;
