//! Configured Markets - `MarketSource` Backed by Configuration
//!
//! Holds the liquidity parameter and tick geometry of every market the
//! engine prices. Liquidity is validated once, when a market is added.

use std::collections::HashMap;

use anyhow::Context;
use tracing::info;

use crate::config::MarketConfig;
use crate::domain::clmsr::validate_liquidity;
use crate::domain::error::{ClmsrError, Result};
use crate::domain::fixed_point::Wad;
use crate::domain::geometry::BinGeometry;
use crate::domain::trade::MarketId;
use crate::ports::market_source::MarketSource;

/// Parameters of one market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketParams {
    pub name: String,
    pub liquidity: Wad,
    pub geometry: BinGeometry,
    pub fee_bps: Option<u16>,
}

/// In-memory market registry.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredMarkets {
    markets: HashMap<MarketId, MarketParams>,
}

impl ConfiguredMarkets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from validated configuration entries.
    pub fn from_config(markets: &[MarketConfig]) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        for market in markets {
            let liquidity = Wad::from_decimal(market.liquidity)
                .with_context(|| format!("Market {} liquidity", market.id))?;
            let geometry = BinGeometry::new(market.min_tick, market.max_tick, market.tick_spacing)
                .with_context(|| format!("Market {} geometry", market.id))?;
            registry
                .insert(
                    market.id,
                    MarketParams {
                        name: market.name.clone(),
                        liquidity,
                        geometry,
                        fee_bps: market.fee_bps,
                    },
                )
                .with_context(|| format!("Market {} rejected", market.id))?;
        }
        Ok(registry)
    }

    /// Register a market.
    ///
    /// # Errors
    /// `InvalidLiquidity` when α is outside the supported range,
    /// `MarketAlreadyInitialized` when the id is taken.
    pub fn insert(&mut self, market_id: MarketId, params: MarketParams) -> Result<()> {
        validate_liquidity(params.liquidity)?;
        if self.markets.contains_key(&market_id) {
            return Err(ClmsrError::MarketAlreadyInitialized(market_id));
        }
        info!(
            market_id,
            name = %params.name,
            liquidity = %params.liquidity,
            bins = params.geometry.bin_count(),
            "Market registered"
        );
        self.markets.insert(market_id, params);
        Ok(())
    }

    /// Parameters of a registered market.
    pub fn get(&self, market_id: MarketId) -> Result<&MarketParams> {
        self.markets
            .get(&market_id)
            .ok_or(ClmsrError::UnknownMarket(market_id))
    }

    /// Registered market ids in ascending order.
    pub fn ids(&self) -> Vec<MarketId> {
        let mut ids: Vec<MarketId> = self.markets.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl MarketSource for ConfiguredMarkets {
    fn liquidity(&self, market_id: MarketId) -> Result<Wad> {
        Ok(self.get(market_id)?.liquidity)
    }

    fn geometry(&self, market_id: MarketId) -> Result<BinGeometry> {
        Ok(self.get(market_id)?.geometry)
    }
}
