// src/lib.rs
// Drivers for a small electronics bench and the frequency response sweep
// built on top of them.
pub mod config;
pub mod error;
pub mod instruments;
pub mod port;
pub mod response;
pub use config::{BenchConfig, InstrumentAddress};
pub use error::LabError;
