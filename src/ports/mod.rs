//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) the engine and desk require from the
//! collaborators around them. Adapters implement these traits.
//!
//! Port categories:
//! - `MarketSource`: liquidity parameter and bin geometry per market
//! - `FeePolicy`: fee quotes composed with engine cost and proceeds
//! - `TradeObserver`: notification of executed and rejected trades

pub mod fee_policy;
pub mod market_source;
pub mod trade_observer;
