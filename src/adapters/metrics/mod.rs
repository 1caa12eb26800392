//! Metrics and Monitoring Adapters
//!
//! Prometheus counters and histograms for executed and rejected trades,
//! rendered in the text exposition format on demand.

pub mod prometheus;

pub use prometheus::EngineMetrics;
