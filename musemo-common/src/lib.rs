//! # Musemo Common Library
//!
//! Shared code for the musemo services:
//! - Error types
//! - Configuration file loading and data directory resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
