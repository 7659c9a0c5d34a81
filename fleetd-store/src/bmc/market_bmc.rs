use crate::{db, Ctx, DbModelManager};
use anyhow::*;
use async_trait::async_trait;
use chrono::Utc;
use fleetd_domain::{MarketData, SystemSymbol};
use mockall::automock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-waypoint market snapshots, keyed by the most recent fetch — scout-tour
/// containers write here after every market visit (spec.md §4.7 item 3).
#[automock]
#[async_trait]
pub trait MarketBmcTrait: Send + Sync + Debug {
    async fn get_latest_market_data_for_system(&self, ctx: &Ctx, system_symbol: &SystemSymbol) -> Result<Vec<MarketData>>;
    async fn save_market_data(&self, ctx: &Ctx, market_data: MarketData) -> Result<()>;
}

#[derive(Debug)]
pub struct DbMarketBmc {
    pub(crate) mm: DbModelManager,
}

#[async_trait]
impl MarketBmcTrait for DbMarketBmc {
    async fn get_latest_market_data_for_system(&self, _ctx: &Ctx, system_symbol: &SystemSymbol) -> Result<Vec<MarketData>> {
        db::select_latest_market_data_for_system(self.mm.pool(), system_symbol).await
    }

    async fn save_market_data(&self, _ctx: &Ctx, market_data: MarketData) -> Result<()> {
        db::insert_market_data(self.mm.pool(), vec![market_data], Utc::now()).await
    }
}

#[derive(Debug, Default)]
struct InMemoryMarkets {
    by_waypoint: HashMap<String, MarketData>,
}

#[derive(Debug)]
pub struct InMemoryMarketBmc {
    state: Arc<RwLock<InMemoryMarkets>>,
}

impl Default for InMemoryMarketBmc {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMarketBmc {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryMarkets::default())),
        }
    }
}

#[async_trait]
impl MarketBmcTrait for InMemoryMarketBmc {
    async fn get_latest_market_data_for_system(&self, _ctx: &Ctx, system_symbol: &SystemSymbol) -> Result<Vec<MarketData>> {
        let waypoint_symbol_prefix = system_symbol.0.clone();
        Ok(self.state.read().await.by_waypoint.iter().filter(|(wp, _)| wp.starts_with(&waypoint_symbol_prefix)).map(|(_, m)| m.clone()).collect())
    }

    async fn save_market_data(&self, _ctx: &Ctx, market_data: MarketData) -> Result<()> {
        self.state.write().await.by_waypoint.insert(market_data.symbol.0.clone(), market_data);
        Ok(())
    }
}
