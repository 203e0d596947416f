//! # clip-core
//!
//! Core types, traits, and configuration shared by the Clip RS storage adapters.
//!
//! This crate provides:
//! - The `Record` accessor capability handed to path callbacks and interpolation
//! - Inflection helpers used to derive type-based path segments
//! - Layered attachment configuration (framework defaults + per-model options)
//! - Common error types
//! - Logging initialisation

pub mod config;
pub mod error;
pub mod inflector;
pub mod telemetry;
pub mod traits;

pub use config::*;
pub use error::*;
pub use traits::*;
