//! CLMSR Engine — Entry Point
//!
//! Loads a configuration, prices its markets and replays its scenario.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging on stderr)
//! 3. Register markets (MarketSource adapter)
//! 4. Create the engine and one tree per market
//! 5. Create the Prometheus metrics observer
//! 6. Create the trade desk with per-market fee policies
//! 7. Replay the scenario, one JSON result per line on stdout
//! 8. Print the metrics exposition when enabled

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use clmsr_engine::adapters::markets::ConfiguredMarkets;
use clmsr_engine::adapters::metrics::EngineMetrics;
use clmsr_engine::config;
use clmsr_engine::domain::fees::{NullFeePolicy, PercentFeePolicy};
use clmsr_engine::usecases::{ClmsrEngine, ScenarioRunner, StepResult, TradeDesk};

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // ── 1. Load configuration ───────────────────────────────
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.engine.log_level)
                }),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    info!(
        name = %config.engine.name,
        version = env!("CARGO_PKG_VERSION"),
        markets = config.markets.len(),
        steps = config.scenario.len(),
        "Starting CLMSR engine"
    );

    // ── 3. Register markets ─────────────────────────────────
    let markets = Arc::new(
        ConfiguredMarkets::from_config(&config.markets)
            .context("Failed to register markets")?,
    );

    // ── 4. Engine with one tree per market ──────────────────
    let mut engine = ClmsrEngine::new(Arc::clone(&markets));
    for market_id in markets.ids() {
        engine
            .init_market(market_id)
            .with_context(|| format!("Failed to initialize market {market_id}"))?;
    }

    // ── 5. Metrics observer ─────────────────────────────────
    let metrics = Arc::new(EngineMetrics::new().context("Failed to create metrics registry")?);

    // ── 6. Trade desk with fee policies ─────────────────────
    let mut desk = TradeDesk::new(engine, Box::new(NullFeePolicy), metrics.clone());
    for market in &config.markets {
        if let Some(bps) = market.fee_bps {
            let policy = PercentFeePolicy::new(bps)
                .with_context(|| format!("Market {} fee_bps {bps} exceeds 100%", market.id))?;
            desk = desk.with_market_policy(market.id, Box::new(policy));
        }
    }

    // ── 7. Replay scenario ──────────────────────────────────
    let mut runner = ScenarioRunner::new(desk);
    let outcomes = runner.run(&config.scenario);
    let rejected = outcomes
        .iter()
        .filter(|o| matches!(o.result, StepResult::Rejected { .. }))
        .count();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for outcome in &outcomes {
        writeln!(out, "{}", serde_json::to_string(outcome)?)?;
    }

    // ── 8. Metrics exposition ───────────────────────────────
    if config.metrics.enabled {
        write!(out, "{}", metrics.encode_text()?)?;
    }

    for market_id in markets.ids() {
        let stats = runner.desk().engine().tree_stats(market_id)?;
        info!(
            market_id,
            nodes = stats.node_count,
            flushes = stats.flush_count,
            "Market tree state"
        );
    }

    info!(
        steps = outcomes.len(),
        rejected,
        "Scenario complete"
    );
    Ok(())
}
