//! Prometheus Metrics Registry - Trade Observability
//!
//! Counts executed trades and chunks per side, rejections per error
//! category and fees collected. All metrics follow the naming convention
//! `clmsr_*`. The registry is rendered as text; serving it is left to the
//! host.

use prometheus::{
    Counter, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::warn;

use crate::domain::error::ClmsrError;
use crate::domain::trade::{TradeReceipt, TradeSide};
use crate::ports::trade_observer::TradeObserver;

/// Centralized Prometheus metrics for the pricing engine.
pub struct EngineMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Executed trades by side.
    pub trades_total: IntCounterVec,
    /// Chunks priced by side.
    pub trade_chunks_total: IntCounterVec,
    /// Rejected requests by error category.
    pub rejections_total: IntCounterVec,
    /// Fees collected, in whole units (approximate).
    pub fees_collected: Counter,
    /// Chunks per trade.
    pub trade_chunks: HistogramVec,
}

impl EngineMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let trades_total = IntCounterVec::new(
            Opts::new("clmsr_trades_total", "Total trades executed"),
            &["side"],
        )?;

        let trade_chunks_total = IntCounterVec::new(
            Opts::new("clmsr_trade_chunks_total", "Total chunks priced and committed"),
            &["side"],
        )?;

        let rejections_total = IntCounterVec::new(
            Opts::new("clmsr_rejections_total", "Total trade requests rejected"),
            &["category"],
        )?;

        let fees_collected = Counter::new(
            "clmsr_fees_collected_wad_total",
            "Cumulative fees collected, converted from WAD",
        )?;

        let trade_chunks = HistogramVec::new(
            HistogramOpts::new("clmsr_trade_chunks", "Chunks per executed trade")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]),
            &["side"],
        )?;

        // Register all metrics
        registry.register(Box::new(trades_total.clone()))?;
        registry.register(Box::new(trade_chunks_total.clone()))?;
        registry.register(Box::new(rejections_total.clone()))?;
        registry.register(Box::new(fees_collected.clone()))?;
        registry.register(Box::new(trade_chunks.clone()))?;

        Ok(Self {
            registry,
            trades_total,
            trade_chunks_total,
            rejections_total,
            fees_collected,
            trade_chunks,
        })
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    fn record_trade(&self, side: TradeSide, chunks: u32, fee: f64) {
        let label = side.as_str();
        self.trades_total.with_label_values(&[label]).inc();
        self.trade_chunks_total
            .with_label_values(&[label])
            .inc_by(u64::from(chunks));
        self.trade_chunks
            .with_label_values(&[label])
            .observe(f64::from(chunks));
        if fee.is_finite() && fee >= 0.0 {
            self.fees_collected.inc_by(fee);
        } else {
            warn!(fee, "Skipping non-finite fee sample");
        }
    }
}

impl TradeObserver for EngineMetrics {
    fn on_trade(&self, receipt: &TradeReceipt, chunks: u32) {
        self.record_trade(receipt.side, chunks, receipt.fee.to_f64());
    }

    fn on_rejection(&self, _side: TradeSide, error: &ClmsrError) {
        self.rejections_total
            .with_label_values(&[error.category().as_str()])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixed_point::Wad;
    use crate::domain::trade::TradeRequest;

    #[test]
    fn test_records_trades_and_rejections() {
        let metrics = EngineMetrics::new().unwrap();
        let request = TradeRequest::buy(1, 0, 4, Wad::ONE);
        let receipt =
            TradeReceipt::compose(&request, Wad::from_int(2), Wad::ONE, "percent").unwrap();

        metrics.on_trade(&receipt, 3);
        metrics.on_rejection(TradeSide::Sell, &ClmsrError::EmptyDistribution);

        assert_eq!(metrics.trades_total.with_label_values(&["buy"]).get(), 1);
        assert_eq!(metrics.trade_chunks_total.with_label_values(&["buy"]).get(), 3);
        assert_eq!(
            metrics
                .rejections_total
                .with_label_values(&["consistency"])
                .get(),
            1
        );
        assert!((metrics.fees_collected.get() - 1.0).abs() < f64::EPSILON);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("clmsr_trades_total{side=\"buy\"} 1"));
        assert!(text.contains("clmsr_rejections_total{category=\"consistency\"} 1"));
    }
}
