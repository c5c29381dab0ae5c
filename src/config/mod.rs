//! Configuration module
//!
//! Environment variable parsing and runtime constants

pub mod env;

pub use env::{AdapterMode, EnvConfig};
