//! Sorter Configuration Module
//!
//! Per-line configuration loaded from TOML, replacing the hardcoded pin map,
//! lane codes and timing constants with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line
//! 2. `SORTER_CONFIG` environment variable (path to TOML file)
//! 3. `sorter_config.toml` in the current working directory
//! 4. Built-in defaults (matching the stock line)
//!
//! The loaded config is immutable for the process lifetime and is handed to
//! each worker explicitly; there is no global instance.

mod sorter_config;
pub mod defaults;

pub use sorter_config::*;
