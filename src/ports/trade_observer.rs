//! Trade Observer Port - Execution Notifications
//!
//! The desk reports every executed trade and every rejected request
//! through this trait so observability stays outside the use cases.

use crate::domain::error::ClmsrError;
use crate::domain::trade::{TradeReceipt, TradeSide};

/// Receives trade outcomes from the desk.
pub trait TradeObserver: Send + Sync {
  /// A trade was committed; `chunks` is how many pieces it was priced in.
  fn on_trade(&self, receipt: &TradeReceipt, chunks: u32);

  /// A request was refused with `error`.
  fn on_rejection(&self, side: TradeSide, error: &ClmsrError);
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TradeObserver for NoopObserver {
  fn on_trade(&self, _receipt: &TradeReceipt, _chunks: u32) {}

  fn on_rejection(&self, _side: TradeSide, _error: &ClmsrError) {}
}
