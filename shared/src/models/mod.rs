//! Domain models for container intake, stock and transfers

mod catalog;
mod container;
mod rollup;
mod stock;
mod transfer;

pub use catalog::*;
pub use container::*;
pub use rollup::*;
pub use stock::*;
pub use transfer::*;
