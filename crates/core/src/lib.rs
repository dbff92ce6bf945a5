//! Core utilities shared by the vkpack crates.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer utilities and per-frame time data
//! - Engine configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{Config, DEFAULT_MIN_ALLOCATION_SIZE, PresentModePreference};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{TimeData, Timer};
