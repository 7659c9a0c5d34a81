use std::sync::Arc;

use chrono::Utc;
use fleetd_domain::{SystemGraph, SystemSymbol};
use fleetd_store::{Bmc, Ctx};
use tracing::info;

use crate::pagination::{fetch_all_pages, PaginationInput};
use crate::st_client::StClientTrait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphSource {
    Database,
    Api,
}

#[derive(Debug, Clone)]
pub struct GraphLoadResult {
    pub graph: SystemGraph,
    pub source: GraphSource,
    pub message: String,
}

/// Fronts the routing engine's need for a system's waypoint graph: serves
/// the cached copy in the store when one exists, and otherwise fetches every
/// waypoint page from the game API and caches the result for next time.
pub struct GraphProvider {
    bmc: Arc<dyn Bmc>,
    client: Arc<dyn StClientTrait>,
}

impl GraphProvider {
    pub fn new(bmc: Arc<dyn Bmc>, client: Arc<dyn StClientTrait>) -> Self {
        Self { bmc, client }
    }

    pub async fn get_graph(&self, system_symbol: &SystemSymbol, force_refresh: bool) -> anyhow::Result<GraphLoadResult> {
        if !force_refresh {
            if let Some(graph) = self.bmc.graph_bmc().get_graph(&Ctx::Anonymous, system_symbol).await? {
                return Ok(GraphLoadResult { graph, source: GraphSource::Database, message: "served from cache".to_string() });
            }
        }
        self.refresh(system_symbol).await
    }

    async fn refresh(&self, system_symbol: &SystemSymbol) -> anyhow::Result<GraphLoadResult> {
        info!(system_symbol = %system_symbol.0, "fetching system graph from the game API");
        let client = self.client.clone();
        let symbol = system_symbol.clone();
        let waypoints = fetch_all_pages(move |pagination: PaginationInput| {
            let client = client.clone();
            let symbol = symbol.clone();
            async move { client.list_waypoints_of_system_page(&symbol, pagination).await }
        })
        .await?;

        let graph = SystemGraph { system_symbol: system_symbol.clone(), waypoints, fetched_at: Utc::now() };
        self.bmc.graph_bmc().put_graph(&Ctx::Anonymous, graph.clone()).await?;

        Ok(GraphLoadResult { graph, source: GraphSource::Api, message: "refreshed from the game API".to_string() })
    }
}
