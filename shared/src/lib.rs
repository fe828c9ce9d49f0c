//! Shared types and models for the retail inventory platform
//!
//! This crate contains the pure domain logic shared between the backend,
//! the browser (via WASM) and the test suites.

pub mod financial;
pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
