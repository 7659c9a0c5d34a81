use crate::ctx::Ctx;
use crate::{db, DbModelManager};
use anyhow::*;
use async_trait::async_trait;
use chrono::Utc;
use fleetd_domain::{ShipType, Shipyard, ShipyardShip, SystemSymbol, WaypointSymbol};
use itertools::Itertools;
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Flattened purchase-price lookup across every shipyard in a system that has
/// ever reported detailed prices, used by the batch-purchase-ship handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ShipPriceInfo {
    pub price_infos: Vec<(WaypointSymbol, Vec<ShipyardShip>)>,
}

impl ShipPriceInfo {
    pub fn cheapest_for(&self, ship_type: &ShipType) -> Option<(WaypointSymbol, u32)> {
        self.price_infos
            .iter()
            .flat_map(|(wp, ships)| ships.iter().filter(|s| &s.r#type == ship_type).map(move |s| (wp.clone(), s.purchase_price)))
            .min_by_key(|(_, price)| *price)
    }
}

#[derive(Debug)]
pub struct DbShipyardBmc {
    pub(crate) mm: DbModelManager,
}

#[automock]
#[async_trait]
pub trait ShipyardBmcTrait: Send + Sync + Debug {
    async fn get_latest_ship_prices(&self, ctx: &Ctx, system_symbol: &SystemSymbol) -> Result<ShipPriceInfo>;
    async fn save_shipyard_data(&self, ctx: &Ctx, shipyard: Shipyard) -> Result<()>;
}

#[async_trait]
impl ShipyardBmcTrait for DbShipyardBmc {
    async fn get_latest_ship_prices(&self, _ctx: &Ctx, system_symbol: &SystemSymbol) -> Result<ShipPriceInfo> {
        let shipyards = db::select_latest_shipyard_entry_of_system(self.mm.pool(), system_symbol)
            .await?
            .into_iter()
            .map(|sd| sd.entry.0)
            .collect_vec();
        Ok(extract_ship_price_info_from_shipyards(&shipyards))
    }

    async fn save_shipyard_data(&self, _ctx: &Ctx, shipyard: Shipyard) -> Result<()> {
        db::insert_shipyards(self.mm.pool(), vec![shipyard], Utc::now()).await
    }
}

#[derive(Debug, Default)]
struct InMemoryShipyards {
    shipyards: HashMap<SystemSymbol, HashMap<WaypointSymbol, Shipyard>>,
}

#[derive(Debug)]
pub struct InMemoryShipyardBmc {
    in_memory_shipyards: Arc<RwLock<InMemoryShipyards>>,
}

impl Default for InMemoryShipyardBmc {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryShipyardBmc {
    pub fn new() -> Self {
        Self {
            in_memory_shipyards: Arc::new(RwLock::new(InMemoryShipyards::default())),
        }
    }
}

#[async_trait]
impl ShipyardBmcTrait for InMemoryShipyardBmc {
    async fn get_latest_ship_prices(&self, _ctx: &Ctx, system_symbol: &SystemSymbol) -> Result<ShipPriceInfo> {
        let shipyards = self
            .in_memory_shipyards
            .read()
            .await
            .shipyards
            .get(system_symbol)
            .cloned()
            .unwrap_or_default()
            .values()
            .cloned()
            .collect_vec();
        Ok(extract_ship_price_info_from_shipyards(&shipyards))
    }

    async fn save_shipyard_data(&self, _ctx: &Ctx, shipyard: Shipyard) -> Result<()> {
        let mut guard = self.in_memory_shipyards.write().await;
        guard.shipyards.entry(shipyard.symbol.system_symbol()).or_default().insert(shipyard.symbol.clone(), shipyard);
        Ok(())
    }
}

fn extract_ship_price_info_from_shipyards(shipyards: &[Shipyard]) -> ShipPriceInfo {
    let price_infos = shipyards
        .iter()
        .filter_map(|entry| entry.has_detailed_price_information().then(|| (entry.symbol.clone(), entry.ships.clone().unwrap_or_default())))
        .collect_vec();
    ShipPriceInfo { price_infos }
}
