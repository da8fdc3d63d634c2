//! Common utilities and types shared across the presence relay crates.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT pre-parse checks (size limits, header inspection, expiry)
pub mod jwt;
