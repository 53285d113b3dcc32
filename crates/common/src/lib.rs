//! Shared types and utilities for biotransfer.
//!
//! This crate provides common functionality used across all biotransfer crates:
//! - Access class of repository files
//! - Generic progress callback trait and the shared progress counter
//! - Shared constants

pub mod access;
pub mod constants;
pub mod progress;

// Re-export commonly used items at crate root
pub use access::{AccessClass, ParseAccessClassError};
pub use constants::*;
pub use progress::{progress_fn, FnProgress, ProgressCallback, ProgressCounter};
