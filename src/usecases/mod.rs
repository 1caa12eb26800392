//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement the
//! engine's workflows. Each use case is a self-contained operation.
//!
//! Use cases:
//! - `ClmsrEngine`: per-market tree store, quotes and trade application
//! - `TradeDesk`: fee composition and execution reporting around the engine
//! - `ScenarioRunner`: replay of configured trade steps

pub mod engine;
pub mod scenario;
pub mod trade_desk;

pub use engine::{ClmsrEngine, TreeStats};
pub use scenario::{ScenarioRunner, StepOutcome, StepResult};
pub use trade_desk::TradeDesk;
