use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleetd_store::{Bmc, Ctx};
use tracing::{info, warn};

use crate::container::manager::ContainerManager;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically reconciles the assignment registry against the container
/// table: an assignment whose container has already gone terminal but whose
/// `cleanup` never ran (e.g. the process was killed between the status
/// write and the release) is a zombie, and gets released here instead of
/// blocking the ship forever. Cross-checks against `manager`'s live handle
/// table so a container that's legitimately still running, just with a row
/// that hasn't caught up yet, is never mistaken for a zombie.
pub async fn run_health_sweep(bmc: Arc<dyn Bmc>, manager: Arc<ContainerManager>) {
    run_health_sweep_with_interval(bmc, manager, DEFAULT_SWEEP_INTERVAL).await
}

pub async fn run_health_sweep_with_interval(bmc: Arc<dyn Bmc>, manager: Arc<ContainerManager>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(e) = sweep_once(&bmc, &manager).await {
            warn!(error = %e, "health sweep failed");
        }
    }
}

async fn sweep_once(bmc: &Arc<dyn Bmc>, manager: &Arc<ContainerManager>) -> anyhow::Result<()> {
    let ctx = Ctx::Anonymous;
    let assignments = bmc.assignment_bmc().list_assignments(&ctx).await?;
    let live = manager.active_container_ids().await;
    let mut released = 0u32;

    for assignment in assignments.into_iter().filter(|a| a.is_active()) {
        if live.contains(&assignment.container_id) {
            continue;
        }
        let container = bmc.container_bmc().get_container(&ctx, &assignment.container_id).await?;
        let is_zombie = match container {
            None => true,
            Some(c) => c.status.is_terminal(),
        };
        if is_zombie {
            bmc.assignment_bmc()
                .release(&ctx, &assignment.player_id, &assignment.ship_symbol, "zombie_cleanup", Utc::now())
                .await?;
            released += 1;
        }
    }

    if released > 0 {
        info!(released, "health sweep released zombie ship assignments");
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use fleetd_domain::{CommandSpec, Container, ContainerSpec, ContainerStatus, DockCommand, PlayerId, RestartPolicy, ShipSymbol};
    use fleetd_store::{Bmc, Ctx, InMemoryBmc};

    use super::*;
    use crate::errors::CoreResult as Result;
    use crate::mediator::{CommandHandler, Mediator};
    use crate::ship_repository::ShipRepository;
    use crate::st_client::MockStClientTrait;

    struct NoopDockHandler;

    #[async_trait]
    impl CommandHandler<DockCommand> for NoopDockHandler {
        async fn handle(&self, _command: DockCommand) -> Result<()> {
            Ok(())
        }
    }

    fn manager(bmc: Arc<dyn Bmc>) -> Arc<ContainerManager> {
        let mediator = Arc::new(Mediator::new());
        mediator.register("dock", NoopDockHandler);
        let ship_repository = Arc::new(ShipRepository::new(Arc::new(MockStClientTrait::new())));
        Arc::new(ContainerManager::new(bmc, mediator, ship_repository))
    }

    fn dock_spec(name: &str, ship: &str) -> ContainerSpec {
        ContainerSpec { name: name.to_string(), command: CommandSpec::Dock { ship_symbol: ShipSymbol(ship.to_string()) }, iterations: None, restart_policy: RestartPolicy::No }
    }

    #[tokio::test]
    async fn releases_an_assignment_whose_container_row_went_terminal() {
        let bmc: Arc<dyn Bmc> = Arc::new(InMemoryBmc::new());
        let manager = manager(bmc.clone());
        let player = PlayerId("p1".to_string());
        let container = Container::new(player.clone(), dock_spec("dock-1", "SHIP-1"), Utc::now());
        let id = container.id.clone();
        bmc.container_bmc().create_container(&Ctx::Anonymous, container).await.unwrap();
        bmc.container_bmc().update_status(&Ctx::Anonymous, &id, ContainerStatus::Failed, Some(1), Some("failed".into()), Utc::now()).await.unwrap();
        bmc.assignment_bmc().assign(&Ctx::Anonymous, &player, &ShipSymbol("SHIP-1".to_string()), &id, "dock", Utc::now()).await.unwrap();

        sweep_once(&bmc, &manager).await.unwrap();

        let available = bmc.assignment_bmc().check_available(&Ctx::Anonymous, &player, &ShipSymbol("SHIP-1".to_string())).await.unwrap();
        assert!(available);
    }

    #[tokio::test]
    async fn leaves_an_assignment_alone_while_its_container_is_still_live() {
        let bmc: Arc<dyn Bmc> = Arc::new(InMemoryBmc::new());
        let manager = manager(bmc.clone());
        let player = PlayerId("p1".to_string());

        // A row still marked RUNNING (not yet caught up with the process's
        // handle table) for a container the manager actually has live.
        let id = manager.create_container(player.clone(), dock_spec("dock-1", "SHIP-1")).await.unwrap();

        sweep_once(&bmc, &manager).await.unwrap();

        let available = bmc.assignment_bmc().check_available(&Ctx::Anonymous, &player, &ShipSymbol("SHIP-1".to_string())).await.unwrap();
        assert!(!available, "a live container's assignment must not be released");

        manager.stop_container(&id).await.unwrap();
    }
}
