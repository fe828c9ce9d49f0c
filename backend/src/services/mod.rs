//! Business logic services for the POS inventory backend

pub mod container;
pub mod financial;
pub mod materializer;
pub mod stock;
pub mod transfer;

pub use container::ContainerService;
pub use financial::FinancialService;
pub use transfer::TransferService;
