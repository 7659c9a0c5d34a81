use std::sync::Arc;

use chrono::Utc;
use fleetd_domain::{
    BatchContractCommand, BatchPurchaseShipCommand, CommandSpec, ContainerId, ContainerSpec, ContainerStatus, DockCommand, ExitReason, NavigateCommand, PlayerId,
    ScoutMarketsCommand, ScoutTourCommand, SystemSymbol, WaypointSymbol,
};
use fleetd_store::{Bmc, Ctx};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::container::base::{BaseContainer, Outcome};
use crate::container::cancellation;
use crate::errors::CoreError;
use crate::mediator::Mediator;

/// The single concrete container type (§3: "currently always `command`").
/// Runs the one `CommandSpec` it was built with, looping `iterations` times
/// (or forever, if `None`) until it finishes, is cancelled, or fails.
pub struct CommandContainer {
    id: ContainerId,
    player_id: PlayerId,
    spec: ContainerSpec,
    mediator: Arc<Mediator>,
    bmc: Arc<dyn Bmc>,
}

impl CommandContainer {
    pub fn new(id: ContainerId, player_id: PlayerId, spec: ContainerSpec, mediator: Arc<Mediator>, bmc: Arc<dyn Bmc>) -> Self {
        Self { id, player_id, spec, mediator, bmc }
    }

    async fn run_once(&self) -> Result<(), CoreError> {
        dispatch_command_spec(&self.mediator, self.spec.command.clone()).await?;
        Ok(())
    }
}

/// Translates one [`CommandSpec`] into its matching mediator call. Shared by
/// a container's own dispatch loop and the IPC surface's `send_command`
/// passthrough (§6.5), which has no container of its own to loop inside.
pub async fn dispatch_command_spec(mediator: &Mediator, command: CommandSpec) -> Result<serde_json::Value, CoreError> {
    let value = match command {
        CommandSpec::Navigate { ship_symbol, destination } => {
            mediator.send(NavigateCommand { ship_symbol, destination: WaypointSymbol(destination) }).await?;
            serde_json::Value::Null
        }
        CommandSpec::Dock { ship_symbol } => {
            mediator.send(DockCommand { ship_symbol }).await?;
            serde_json::Value::Null
        }
        CommandSpec::ScoutMarkets { system_symbol, ship_symbol } => {
            let scouted = mediator.send(ScoutMarketsCommand { ship_symbol, system_symbol: SystemSymbol(system_symbol) }).await?;
            serde_json::json!(scouted)
        }
        CommandSpec::ScoutTour { system_symbol, ship_symbol, waypoints } => {
            let scouted = mediator
                .send(ScoutTourCommand { ship_symbol, system_symbol: SystemSymbol(system_symbol), waypoints: waypoints.into_iter().map(WaypointSymbol).collect() })
                .await?;
            serde_json::json!(scouted)
        }
        CommandSpec::BatchContract { ship_symbol, iterations } => {
            let fulfilled = mediator.send(BatchContractCommand { ship_symbol, iterations }).await?;
            serde_json::json!(fulfilled)
        }
        CommandSpec::BatchPurchaseShip { shipyard_waypoint, ship_type, count } => {
            let purchased = mediator.send(BatchPurchaseShipCommand { shipyard_waypoint: WaypointSymbol(shipyard_waypoint), ship_type, count }).await?;
            serde_json::json!(purchased)
        }
    };
    Ok(value)
}

#[async_trait::async_trait]
impl BaseContainer for CommandContainer {
    fn id(&self) -> ContainerId {
        self.id.clone()
    }

    fn player_id(&self) -> PlayerId {
        self.player_id.clone()
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), CoreError> {
        cancellation::scope(cancel.clone(), async {
            match self.spec.iterations {
                Some(total) => {
                    let log_every = (total / 10).max(1);
                    for completed in 0..total {
                        if cancel.is_cancelled() {
                            return Err(CoreError::Cancelled);
                        }
                        self.run_once().await?;
                        if (completed + 1) % log_every == 0 || completed + 1 == total {
                            info!(container_id = %self.id, "{}/{} iterations complete", completed + 1, total);
                        }
                    }
                    Ok(())
                }
                None => loop {
                    if cancel.is_cancelled() {
                        return Err(CoreError::Cancelled);
                    }
                    self.run_once().await?;
                },
            }
        })
        .await
    }

    async fn cleanup(&self, outcome: &Outcome) {
        let Some(ship_symbol) = self.spec.command.ship_symbol() else { return };
        let ctx = Ctx::Anonymous;
        // `outcome.exit_reason` is the raw (possibly truncated) error message
        // for a failed run, not the exit-reason vocabulary's literal
        // "failed" string; only STOPPED carries a clean literal already.
        let reason = match outcome.status {
            ContainerStatus::Failed => ExitReason::Failed.as_str().to_string(),
            _ => outcome.exit_reason.clone(),
        };
        if let Err(e) = self.bmc.assignment_bmc().release(&ctx, &self.player_id, ship_symbol, &reason, Utc::now()).await {
            tracing::warn!(container_id = %self.id, ship_symbol = %ship_symbol.0, error = %e, "failed to release ship assignment on cleanup");
        }
    }
}

#[cfg(test)]
mod test {
    use fleetd_domain::{RestartPolicy, ShipSymbol};
    use fleetd_store::InMemoryBmc;

    use super::*;

    fn container_with(bmc: Arc<dyn Bmc>) -> CommandContainer {
        let spec = ContainerSpec { name: "dock-1".to_string(), command: CommandSpec::Dock { ship_symbol: ShipSymbol("SHIP-1".to_string()) }, iterations: None, restart_policy: RestartPolicy::No };
        CommandContainer::new(ContainerId::new(), PlayerId("p1".to_string()), spec, Arc::new(Mediator::new()), bmc)
    }

    async fn release_reason_after(outcome: Outcome) -> Option<String> {
        let bmc: Arc<dyn Bmc> = Arc::new(InMemoryBmc::new());
        let ship_symbol = ShipSymbol("SHIP-1".to_string());
        bmc.assignment_bmc()
            .assign(&Ctx::Anonymous, &PlayerId("p1".to_string()), &ship_symbol, &ContainerId::new(), "dock", Utc::now())
            .await
            .unwrap();

        let container = container_with(bmc.clone());
        container.cleanup(&outcome).await;

        bmc.assignment_bmc().get_info(&Ctx::Anonymous, &PlayerId("p1".to_string()), &ship_symbol).await.unwrap().and_then(|a| a.release_reason)
    }

    #[tokio::test]
    async fn cleanup_releases_with_the_literal_failed_reason_not_the_raw_error_text() {
        let outcome = Outcome { status: ContainerStatus::Failed, exit_code: ExitReason::Failed.exit_code(), exit_reason: "connection reset by peer at waypoint X1-A1".to_string() };
        let reason = release_reason_after(outcome).await;
        assert_eq!(reason.as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn cleanup_releases_with_the_literal_completed_reason() {
        let outcome = Outcome { status: ContainerStatus::Stopped, exit_code: ExitReason::Completed.exit_code(), exit_reason: ExitReason::Completed.as_str().to_string() };
        let reason = release_reason_after(outcome).await;
        assert_eq!(reason.as_deref(), Some("completed"));
    }

    #[tokio::test]
    async fn cleanup_releases_with_the_literal_stopped_reason() {
        let outcome = Outcome { status: ContainerStatus::Stopped, exit_code: ExitReason::Stopped.exit_code(), exit_reason: ExitReason::Stopped.as_str().to_string() };
        let reason = release_reason_after(outcome).await;
        assert_eq!(reason.as_deref(), Some("stopped"));
    }
}
