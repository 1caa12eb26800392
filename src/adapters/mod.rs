//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! backing: market parameters from configuration and Prometheus metrics.
//!
//! Adapter categories:
//! - `markets`: `MarketSource` backed by `config.toml` market entries
//! - `metrics`: Prometheus registry implementing `TradeObserver`

pub mod markets;
pub mod metrics;
