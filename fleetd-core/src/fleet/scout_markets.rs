use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetd_domain::{CommandSpec, ContainerSpec, ContainerStatus, PlayerId, RestartPolicy, ScoutMarketsCommand, ShipSymbol, WaypointSymbol};
use fleetd_store::{Bmc, Ctx};
use tokio::sync::Mutex;

use crate::container::manager::ContainerManager;
use crate::errors::{CoreError, CoreResult, GameApiError};
use crate::graph_provider::GraphProvider;
use crate::mediator::CommandHandler;
use crate::routing::{partition_fleet, RoutingGraph};
use crate::ship_repository::ShipRepository;

/// Single-tenant placeholder until the daemon grows real multi-account
/// support — every container this handler creates belongs to this player.
pub const DEFAULT_PLAYER_ID: &str = "default";

const PARTITION_BUDGET: Duration = Duration::from_secs(5);

fn remote(e: anyhow::Error) -> CoreError {
    CoreError::RemoteApi(GameApiError::Other(e))
}

/// Deploys scout-tour containers across every currently-unassigned ship in a
/// system (§4.7: "multi-ship deployer"). Holds a process-wide lock for the
/// duration of the list-then-create sequence so two concurrent deployments
/// can't both decide the same idle ship is up for grabs (§5).
pub struct ScoutMarketsCommandHandler {
    bmc: Arc<dyn Bmc>,
    ship_repository: Arc<ShipRepository>,
    graph_provider: Arc<GraphProvider>,
    container_manager: Arc<ContainerManager>,
    deploy_lock: Arc<Mutex<()>>,
}

impl ScoutMarketsCommandHandler {
    pub fn new(bmc: Arc<dyn Bmc>, ship_repository: Arc<ShipRepository>, graph_provider: Arc<GraphProvider>, container_manager: Arc<ContainerManager>) -> Self {
        Self { bmc, ship_repository, graph_provider, container_manager, deploy_lock: Arc::new(Mutex::new(())) }
    }
}

#[async_trait]
impl CommandHandler<ScoutMarketsCommand> for ScoutMarketsCommandHandler {
    async fn handle(&self, command: ScoutMarketsCommand) -> CoreResult<u32> {
        let _guard = self.deploy_lock.lock().await;

        let running = self.bmc.container_bmc().list_containers(&Ctx::Anonymous, None, Some(ContainerStatus::Running)).await?;
        let already_touring: HashSet<ShipSymbol> = running
            .iter()
            .filter_map(|c| match &c.spec.command {
                CommandSpec::ScoutTour { ship_symbol, system_symbol, .. } if system_symbol == &command.system_symbol.0 => Some(ship_symbol.clone()),
                _ => None,
            })
            .collect();

        let fleet = self.ship_repository.find_all().await.map_err(remote)?;
        let candidates: Vec<_> = fleet
            .iter()
            .filter(|s| s.nav.system_symbol == command.system_symbol)
            .filter(|s| s.symbol == command.ship_symbol || !already_touring.contains(&s.symbol))
            .collect();

        if candidates.is_empty() {
            return Ok(0);
        }

        let ship_positions: Vec<(ShipSymbol, WaypointSymbol)> = candidates.iter().map(|s| (s.symbol.clone(), s.nav.waypoint_symbol.clone())).collect();
        let fuel_capacity = candidates.iter().map(|s| s.fuel.capacity).min().unwrap_or(0);
        let engine_speed = candidates.iter().map(|s| s.engine.speed).min().unwrap_or(1).max(1) as u32;

        let load = self.graph_provider.get_graph(&command.system_symbol, false).await.map_err(remote)?;
        let markets: Vec<WaypointSymbol> = load.graph.waypoints.iter().filter(|w| w.has_fuel()).map(|w| w.symbol.clone()).collect();

        let graph = load.graph;
        let assignments = tokio::task::spawn_blocking(move || {
            let routing_graph = RoutingGraph::new(&graph);
            partition_fleet(&routing_graph, &markets, &ship_positions, fuel_capacity, engine_speed, PARTITION_BUDGET)
        })
        .await
        .map_err(|e| CoreError::Programmer(e.to_string()))?;

        let mut spawned = 0u32;
        for assignment in assignments {
            if assignment.stops.is_empty() {
                continue;
            }
            let spec = ContainerSpec {
                name: format!("scout-tour-{}", assignment.ship_symbol.0),
                command: CommandSpec::ScoutTour {
                    system_symbol: command.system_symbol.0.clone(),
                    ship_symbol: assignment.ship_symbol.clone(),
                    waypoints: assignment.stops.iter().map(|w| w.0.clone()).collect(),
                },
                iterations: None,
                restart_policy: RestartPolicy::Always,
            };
            match self.container_manager.create_container(PlayerId(DEFAULT_PLAYER_ID.to_string()), spec).await {
                Ok(_) => spawned += 1,
                Err(CoreError::AssignmentConflict { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(spawned)
    }
}
