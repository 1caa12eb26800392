//! Simulation Tests - Long Trade Sequences
//!
//! Drives the engine through synthetic, deterministic order flow to
//! validate path independence, chunked pricing, underflow flushes and
//! inverse quoting at a scale the unit tests do not reach.

use std::sync::Arc;

use clmsr_engine::adapters::markets::{ConfiguredMarkets, MarketParams};
use clmsr_engine::domain::fixed_point::{Rounding, Wad};
use clmsr_engine::domain::geometry::BinGeometry;
use clmsr_engine::domain::range_tree::RangeTree;
use clmsr_engine::usecases::engine::ClmsrEngine;

/// Deterministic generator for synthetic order flow (splitmix64).
struct SyntheticFlow(u64);

impl SyntheticFlow {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

/// An open position held by the simulated trader.
#[derive(Debug, Clone, Copy)]
struct Holding {
    lower: u32,
    upper: u32,
    quantity: Wad,
}

/// Summary of a simulated session.
#[derive(Debug, PartialEq)]
struct SessionResult {
    /// Total cost paid for opens.
    paid: Wad,
    /// Total proceeds received for decreases.
    received: Wad,
    /// Trades executed.
    trades: usize,
    /// Total weight at the end of the session.
    final_total: Wad,
}

fn engine(alpha: u64, bins: i64) -> ClmsrEngine<ConfiguredMarkets> {
    let mut markets = ConfiguredMarkets::new();
    markets
        .insert(
            1,
            MarketParams {
                name: "simulation".to_string(),
                liquidity: Wad::from_int(alpha),
                geometry: BinGeometry::new(0, bins, 1).unwrap(),
                fee_bps: None,
            },
        )
        .unwrap();
    let mut engine = ClmsrEngine::new(Arc::new(markets));
    engine.init_market(1).unwrap();
    engine
}

/// Random opens and partial decreases, then every holding is closed.
fn run_session(seed: u64, steps: usize) -> SessionResult {
    let mut engine = engine(1_000, 1_000);
    let mut flow = SyntheticFlow(seed);
    let mut holdings: Vec<Holding> = Vec::new();
    let mut paid = Wad::ZERO;
    let mut received = Wad::ZERO;
    let mut trades = 0;

    for _ in 0..steps {
        if holdings.is_empty() || flow.below(3) > 0 {
            #[allow(clippy::cast_possible_truncation)]
            let lower = flow.below(900) as u32;
            #[allow(clippy::cast_possible_truncation)]
            let upper = lower + flow.below(100) as u32;
            let quantity = Wad::from_int(1 + flow.below(50));
            let quote = engine.apply_open(1, lower, upper, quantity).unwrap();
            paid = paid.try_add(quote.amount).unwrap();
            holdings.push(Holding { lower, upper, quantity });
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let pick = flow.below(holdings.len() as u64) as usize;
            let holding = holdings[pick];
            let quantity = holding
                .quantity
                .mul_div(u128::from(1 + flow.below(100)), 100, Rounding::Down)
                .unwrap();
            let quote = engine
                .apply_decrease(1, holding.lower, holding.upper, quantity)
                .unwrap();
            received = received.try_add(quote.amount).unwrap();
            let remaining = holding.quantity.try_sub(quantity).unwrap();
            if remaining.is_zero() {
                holdings.swap_remove(pick);
            } else {
                holdings[pick].quantity = remaining;
            }
        }
        trades += 1;
    }

    for holding in holdings.drain(..) {
        let quote = engine
            .apply_decrease(1, holding.lower, holding.upper, holding.quantity)
            .unwrap();
        received = received.try_add(quote.amount).unwrap();
        trades += 1;
    }

    SessionResult {
        paid,
        received,
        trades,
        final_total: engine.total_weight(1).unwrap(),
    }
}

fn assert_relative(actual: f64, expected: f64, tolerance: f64) {
    let relative = (actual - expected).abs() / expected.abs();
    assert!(
        relative < tolerance,
        "expected {expected}, got {actual} (relative error {relative:e})"
    );
}

#[test]
fn test_session_is_path_independent() {
    let result = run_session(42, 500);
    assert!(result.trades >= 500);

    // Every holding is closed, so every bin's exponent nets to zero.
    assert_relative(result.final_total.to_f64(), 1_000.0, 1e-9);

    // Round trips settle at zero net cost up to rounding.
    let paid = result.paid.to_f64();
    let received = result.received.to_f64();
    assert!(paid > 0.0);
    assert!((paid - received).abs() < 1e-9 * paid);
}

#[test]
fn test_session_is_deterministic() {
    assert_eq!(run_session(7, 200), run_session(7, 200));
}

#[test]
fn test_large_chunked_trade_on_million_bins() {
    let mut engine = engine(10, 1_000_000);
    let quantity = Wad::from_int(250);

    let quoted = engine.quote_open_cost(1, 500_000, 500_009, quantity).unwrap();
    assert_eq!(quoted.chunks, 193);

    let applied = engine.apply_open(1, 500_000, 500_009, quantity).unwrap();
    assert_eq!(applied, quoted);

    let expected = 10.0 * ((999_990.0 + 10.0 * 25.0f64.exp()) / 1_000_000.0).ln();
    assert_relative(applied.amount.to_f64(), expected, 1e-9);

    let probability = engine.bin_probability(1, 500_004).unwrap().to_f64();
    assert!(probability > 0.09 && probability < 0.1, "probability {probability}");

    let stats = engine.tree_stats(1).unwrap();
    assert!(stats.node_count < 200, "nodes {}", stats.node_count);
}

#[test]
fn test_repeated_sells_trigger_flush() {
    let mut engine = engine(10, 100);
    engine.apply_open(1, 0, 49, Wad::from_int(5)).unwrap();

    // 77 chunks of e^-0.13 compose past the flush threshold on the root.
    let quote = engine.apply_decrease(1, 0, 99, Wad::from_int(100)).unwrap();
    assert_eq!(quote.chunks, 77);
    assert!(engine.tree_stats(1).unwrap().flush_count >= 1);

    let decay = (-10.0f64).exp();
    assert_relative(engine.range_weight(1, 99, 99).unwrap().to_f64(), decay, 1e-9);
    assert_relative(
        engine.range_weight(1, 0, 0).unwrap().to_f64(),
        0.5f64.exp() * decay,
        1e-9,
    );
    assert_relative(
        engine.total_weight(1).unwrap().to_f64(),
        50.0 * decay * (1.0 + 0.5f64.exp()),
        1e-9,
    );
}

#[test]
fn test_inverse_quotes_track_forward_pricing() {
    let mut engine = engine(500, 1_000);
    let mut flow = SyntheticFlow(99);
    for _ in 0..50 {
        #[allow(clippy::cast_possible_truncation)]
        let lower = flow.below(950) as u32;
        engine
            .apply_open(1, lower, lower + 49, Wad::from_int(1 + flow.below(40)))
            .unwrap();
    }

    for _ in 0..50 {
        #[allow(clippy::cast_possible_truncation)]
        let lower = flow.below(900) as u32;
        let upper = lower + 99;
        let target = Wad::from_int(1 + flow.below(20));

        let inverse = engine.quote_quantity_from_cost(1, lower, upper, target).unwrap();
        let forward = engine.quote_open_cost(1, lower, upper, inverse.quantity).unwrap();
        assert_eq!(inverse.amount, forward.amount);
        assert_relative(inverse.amount.to_f64(), target.to_f64(), 1e-9);
    }
}

#[test]
fn test_full_materialization_at_scale() {
    let mut tree = RangeTree::new(1_024).unwrap();
    for bin in 0..1_024u32 {
        tree.update(bin, Wad::from_int(u64::from(bin % 7) + 1)).unwrap();
    }
    assert_eq!(tree.node_count(), 2_047);

    let expected = |lo: u32, hi: u32| -> u64 { (lo..=hi).map(|bin| u64::from(bin % 7) + 1).sum() };
    assert_eq!(tree.total_sum(), Wad::from_int(expected(0, 1_023)));
    assert_eq!(tree.range_sum(100, 611).unwrap(), Wad::from_int(expected(100, 611)));
    assert_eq!(tree.range_sum(1_023, 1_023).unwrap(), Wad::from_int(expected(1_023, 1_023)));
}
