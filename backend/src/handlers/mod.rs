//! HTTP handlers

pub mod container;
pub mod financial;
pub mod health;
pub mod session;
pub mod transfer;

pub use container::*;
pub use financial::*;
pub use health::*;
pub use session::*;
pub use transfer::*;
