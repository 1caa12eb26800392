//! CLMSR Engine — Library Root
//!
//! Fixed-point pricing engine for continuous range prediction markets.
//! Re-exports all modules for integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;

pub use domain::error::{ClmsrError, ErrorCategory, Result};
