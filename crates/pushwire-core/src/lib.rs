//! # pushwire-core
//!
//! Core crate for Pushwire. Contains configuration schemas and the unified
//! error system shared by the connection runtime and the monitor binary.
//!
//! This crate has **no** internal dependencies on other Pushwire crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
