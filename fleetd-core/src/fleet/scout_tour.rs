use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetd_domain::{NavStatus, ScoutTourCommand, WaypointSymbol};
use fleetd_store::{Bmc, Ctx};
use tracing::info;

use crate::container::cancellation;
use crate::errors::{CoreError, CoreResult, GameApiError};
use crate::fleet::navigate::navigate_to;
use crate::graph_provider::GraphProvider;
use crate::mediator::CommandHandler;
use crate::ship_repository::ShipRepository;
use crate::st_client::StClientTrait;

fn remote(e: anyhow::Error) -> CoreError {
    CoreError::RemoteApi(GameApiError::Other(e))
}

/// `60s` pacing for a single stationary market, per §4.7 item 5 — multi-market
/// tours never hit this path since travel time between stops is the delay.
const STATIONARY_TOUR_PAUSE: Duration = Duration::from_secs(60);

pub struct ScoutTourCommandHandler {
    client: Arc<dyn StClientTrait>,
    ship_repository: Arc<ShipRepository>,
    graph_provider: Arc<GraphProvider>,
    bmc: Arc<dyn Bmc>,
}

impl ScoutTourCommandHandler {
    pub fn new(client: Arc<dyn StClientTrait>, ship_repository: Arc<ShipRepository>, graph_provider: Arc<GraphProvider>, bmc: Arc<dyn Bmc>) -> Self {
        Self { client, ship_repository, graph_provider, bmc }
    }
}

/// Rotates `waypoints` so the tour resumes from wherever the ship already is
/// (§4.7 item 2): a crashed-and-resumed container shouldn't revisit markets
/// it had already finished before the restart.
fn rotate_to_current(waypoints: &[WaypointSymbol], current: &WaypointSymbol, in_transit_destination: Option<&WaypointSymbol>) -> Vec<WaypointSymbol> {
    let resume_point = waypoints.iter().position(|w| w == current).or_else(|| in_transit_destination.and_then(|dest| waypoints.iter().position(|w| w == dest)));

    match resume_point {
        Some(index) => waypoints.iter().skip(index).chain(waypoints.iter().take(index)).cloned().collect(),
        None => waypoints.to_vec(),
    }
}

#[async_trait]
impl CommandHandler<ScoutTourCommand> for ScoutTourCommandHandler {
    async fn handle(&self, command: ScoutTourCommand) -> CoreResult<u32> {
        let ship = self
            .ship_repository
            .find_by_symbol(&command.ship_symbol)
            .await
            .map_err(remote)?
            .ok_or_else(|| CoreError::Validation(format!("ship {} not found", command.ship_symbol.0)))?;

        let start = ship.nav.waypoint_symbol.clone();
        let in_transit_destination = (ship.nav.status == NavStatus::InTransit).then(|| ship.nav.route.destination.symbol.clone());
        let tour = rotate_to_current(&command.waypoints, &start, in_transit_destination.as_ref());

        let mut scouted = 0u32;
        for waypoint in &tour {
            if cancellation::is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            navigate_to(&self.client, &self.ship_repository, &self.graph_provider, &command.ship_symbol, waypoint).await?;
            self.client.dock_ship(command.ship_symbol.clone()).await.map_err(remote)?;

            let market = self.client.get_marketplace(waypoint.clone()).await.map_err(remote)?;
            self.bmc.market_bmc().save_market_data(&Ctx::Anonymous, market.data).await?;
            scouted += 1;
        }

        if tour.len() >= 2 {
            navigate_to(&self.client, &self.ship_repository, &self.graph_provider, &command.ship_symbol, &start).await?;
        }

        if tour.len() == 1 {
            info!(ship_symbol = %command.ship_symbol.0, "single-market tour, pausing before the next iteration");
            tokio::select! {
                _ = cancellation::cancelled() => return Err(CoreError::Cancelled),
                _ = tokio::time::sleep(STATIONARY_TOUR_PAUSE) => {}
            }
        }

        Ok(scouted)
    }
}
