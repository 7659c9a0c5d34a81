use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fleetd_domain::{NavigateCommand, ShipSymbol, WaypointSymbol};
use tracing::info;

use crate::errors::{CoreError, CoreResult, GameApiError};
use crate::graph_provider::GraphProvider;
use crate::mediator::CommandHandler;
use crate::routing::{plan_path, RoutingGraph, Step};
use crate::ship_repository::ShipRepository;
use crate::st_client::StClientTrait;

fn remote(e: anyhow::Error) -> CoreError {
    CoreError::RemoteApi(GameApiError::Other(e))
}

/// Drives a ship from wherever it currently is to `destination`, following
/// the route the routing engine plans: orbiting before each travel leg,
/// docking before each refuel, and waiting out each leg's transit time.
/// Shared by every handler that needs to move a ship (§4: navigate, dock is
/// trivial enough to skip this, scout_markets/scout_tour/batch_contract all
/// go through here).
pub async fn navigate_to(
    client: &Arc<dyn StClientTrait>,
    ship_repository: &ShipRepository,
    graph_provider: &GraphProvider,
    ship_symbol: &ShipSymbol,
    destination: &WaypointSymbol,
) -> CoreResult<()> {
    let ship = ship_repository
        .find_by_symbol(ship_symbol)
        .await
        .map_err(remote)?
        .ok_or_else(|| CoreError::Validation(format!("ship {} not found", ship_symbol.0)))?;

    if ship.nav.waypoint_symbol == *destination {
        return Ok(());
    }

    let load = graph_provider.get_graph(&ship.nav.system_symbol, false).await.map_err(remote)?;
    let routing_graph = RoutingGraph::new(&load.graph);
    let path = plan_path(&routing_graph, &ship.nav.waypoint_symbol, destination, ship.fuel.current, ship.fuel.capacity, ship.engine.speed as u32)
        .ok_or_else(|| CoreError::Validation(format!("no fuel-feasible route from {} to {}", ship.nav.waypoint_symbol.0, destination.0)))?;

    info!(ship_symbol = %ship_symbol.0, from = %ship.nav.waypoint_symbol.0, to = %destination.0, steps = path.steps.len(), "navigating");

    let mut docked = ship.is_docked();

    for step in path.steps {
        match step {
            Step::Refuel { .. } => {
                if !docked {
                    client.dock_ship(ship_symbol.clone()).await.map_err(remote)?;
                    docked = true;
                }
                let current = ship_repository.find_by_symbol(ship_symbol).await.map_err(remote)?.map(|s| s.fuel).unwrap_or(ship.fuel.clone());
                let amount = (current.capacity - current.current).max(0) as u32;
                if amount > 0 {
                    client.refuel(ship_symbol.clone(), amount, false).await.map_err(remote)?;
                }
            }
            Step::Travel { to, mode, .. } => {
                if docked {
                    client.orbit_ship(ship_symbol.clone()).await.map_err(remote)?;
                    docked = false;
                }
                client.set_flight_mode(ship_symbol.clone(), &mode).await.map_err(remote)?;
                let response = client.navigate(ship_symbol.clone(), &to).await.map_err(remote)?;
                let arrival = response.data.nav.route.arrival;
                let now = Utc::now();
                if let Ok(remaining) = (arrival - now).to_std() {
                    tokio::time::sleep(remaining).await;
                }
            }
        }
    }

    Ok(())
}

pub struct NavigateCommandHandler {
    client: Arc<dyn StClientTrait>,
    ship_repository: Arc<ShipRepository>,
    graph_provider: Arc<GraphProvider>,
}

impl NavigateCommandHandler {
    pub fn new(client: Arc<dyn StClientTrait>, ship_repository: Arc<ShipRepository>, graph_provider: Arc<GraphProvider>) -> Self {
        Self { client, ship_repository, graph_provider }
    }
}

#[async_trait]
impl CommandHandler<NavigateCommand> for NavigateCommandHandler {
    async fn handle(&self, command: NavigateCommand) -> CoreResult<()> {
        navigate_to(&self.client, &self.ship_repository, &self.graph_provider, &command.ship_symbol, &command.destination).await
    }
}
