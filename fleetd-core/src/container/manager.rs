use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleetd_domain::{Container, ContainerId, ContainerSpec, ContainerStatus, ExitReason, PlayerId};
use fleetd_store::{Bmc, Ctx};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::container::base::run_container_lifecycle;
use crate::container::command::CommandContainer;
use crate::errors::{CoreError, CoreResult};
use crate::mediator::Mediator;
use crate::ship_repository::ShipRepository;

const STOP_GRACE_PERIOD: Duration = Duration::from_secs(2);

struct ContainerHandle {
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

/// Owns every in-flight container. Each container runs as its own Tokio
/// task; this struct just tracks the handle table and provides the create
/// / list / inspect / stop / remove surface the IPC layer dispatches into.
pub struct ContainerManager {
    bmc: Arc<dyn Bmc>,
    mediator: Arc<Mediator>,
    ship_repository: Arc<ShipRepository>,
    handles: Mutex<HashMap<ContainerId, ContainerHandle>>,
}

impl ContainerManager {
    pub fn new(bmc: Arc<dyn Bmc>, mediator: Arc<Mediator>, ship_repository: Arc<ShipRepository>) -> Self {
        Self { bmc, mediator, ship_repository, handles: Mutex::new(HashMap::new()) }
    }

    /// The ids of every container this process currently has a live task
    /// for, used by the health sweep to tell "legitimately still running,
    /// row not yet updated" apart from an actual zombie.
    pub async fn active_container_ids(&self) -> Vec<ContainerId> {
        self.handles.lock().await.keys().cloned().collect()
    }

    /// Claims the command's ship (if any) before the container row ever
    /// exists, so two concurrent `create_container` calls for the same ship
    /// can't both win (§4.2: at most one active assignment per ship).
    pub async fn create_container(&self, player_id: PlayerId, spec: ContainerSpec) -> CoreResult<ContainerId> {
        let now = Utc::now();
        let container = Container::new(player_id.clone(), spec.clone(), now);
        let id = container.id.clone();

        if let Some(ship_symbol) = spec.command.ship_symbol() {
            let claimed = self
                .bmc
                .assignment_bmc()
                .assign(&Ctx::Anonymous, &player_id, ship_symbol, &id, spec.command.registry_key(), now)
                .await?;
            if !claimed {
                return Err(CoreError::AssignmentConflict { ship_symbol: ship_symbol.0.clone() });
            }
        }

        self.bmc.container_bmc().create_container(&Ctx::Anonymous, container).await?;
        self.spawn(id.clone(), player_id, spec).await;
        Ok(id)
    }

    async fn spawn(&self, id: ContainerId, player_id: PlayerId, spec: ContainerSpec) {
        let cancel = CancellationToken::new();
        let bmc = self.bmc.clone();
        let mediator = self.mediator.clone();

        let task_cancel = cancel.clone();
        let task_id = id.clone();
        let join = tokio::spawn(async move {
            let container = CommandContainer::new(task_id, player_id, spec, mediator, bmc.clone());
            run_container_lifecycle(&container, &bmc, task_cancel, |_status| {}).await;
        });

        self.handles.lock().await.insert(id, ContainerHandle { cancel, join });
    }

    pub async fn list_containers(&self, player_id: Option<&PlayerId>, status: Option<ContainerStatus>) -> CoreResult<Vec<Container>> {
        Ok(self.bmc.container_bmc().list_containers(&Ctx::Anonymous, player_id, status).await?)
    }

    pub async fn get_container(&self, id: &ContainerId) -> CoreResult<Option<Container>> {
        Ok(self.bmc.container_bmc().get_container(&Ctx::Anonymous, id).await?)
    }

    /// Requests cancellation and waits up to [`STOP_GRACE_PERIOD`] for the
    /// container's task to observe it and exit; times out rather than
    /// blocking the caller indefinitely on a wedged container.
    pub async fn stop_container(&self, id: &ContainerId) -> CoreResult<()> {
        let join = {
            let mut handles = self.handles.lock().await;
            let Some(handle) = handles.get_mut(id) else {
                return Err(CoreError::Validation(format!("no running container {id}")));
            };
            handle.cancel.cancel();
            handles.remove(id).map(|h| h.join)
        };

        if let Some(join) = join {
            if timeout(STOP_GRACE_PERIOD, join).await.is_err() {
                warn!(container_id = %id, "container did not stop within grace period");
            }
        }
        Ok(())
    }

    pub async fn remove_container(&self, id: &ContainerId) -> CoreResult<()> {
        let container = self.get_container(id).await?.ok_or_else(|| CoreError::Validation(format!("no such container {id}")))?;
        if !container.status.is_terminal() {
            return Err(CoreError::Validation("cannot remove a container that is still running".into()));
        }
        self.bmc.container_bmc().delete_container(&Ctx::Anonymous, id).await?;
        Ok(())
    }

    /// Run once at daemon startup, before the IPC listener binds: releases
    /// every assignment left `active` by the previous process (it can't
    /// possibly still be valid, since nothing was running to hold it), then
    /// walks every container still marked STARTING or RUNNING and either
    /// resumes or fails it out. Terminal rows are left untouched.
    pub async fn recover(&self) -> CoreResult<()> {
        let ctx = Ctx::Anonymous;
        let released = self.bmc.assignment_bmc().release_all_active(&ctx, "daemon_restart", Utc::now()).await?;
        info!(released, "released stale ship assignments from previous run");

        // `list_containers` silently skips rows whose spec didn't parse, so
        // those need failing out separately or they'd be lost entirely.
        let malformed = self.bmc.container_bmc().list_malformed_container_ids(&ctx).await?;
        for id in malformed {
            warn!(container_id = %id, "container has an unparseable config, marking FAILED");
            self.bmc.container_bmc().force_fail(&ctx, &id, ExitReason::InvalidConfig.exit_code(), ExitReason::InvalidConfig.as_str(), Utc::now()).await?;
        }

        let stale = self
            .bmc
            .container_bmc()
            .list_containers(&ctx, None, None)
            .await?
            .into_iter()
            .filter(|c| matches!(c.status, ContainerStatus::Starting | ContainerStatus::Running))
            .collect::<Vec<_>>();

        for container in stale {
            self.resume_or_fail(container).await;
        }
        Ok(())
    }

    async fn resume_or_fail(&self, container: Container) {
        let ctx = Ctx::Anonymous;
        let id = container.id.clone();

        if !spec_looks_valid(&container.spec) {
            warn!(container_id = %id, "container has an invalid config, marking FAILED");
            self.fail(&ctx, &id, ExitReason::InvalidConfig).await;
            return;
        }

        if let Some(ship_symbol) = container.spec.command.ship_symbol() {
            match self.ship_repository.find_by_symbol(ship_symbol).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!(container_id = %id, %ship_symbol, "ship no longer exists, marking FAILED");
                    self.fail(&ctx, &id, ExitReason::MissingResource).await;
                    return;
                }
                Err(e) => {
                    error!(container_id = %id, %ship_symbol, error = %e, "failed to look up ship while recovering, marking FAILED");
                    self.fail(&ctx, &id, ExitReason::MissingResource).await;
                    return;
                }
            }

            let claimed = match self
                .bmc
                .assignment_bmc()
                .assign(&ctx, &container.player_id, ship_symbol, &id, container.spec.command.registry_key(), Utc::now())
                .await
            {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(container_id = %id, %ship_symbol, error = %e, "failed to reclaim ship assignment while recovering, marking FAILED");
                    self.fail(&ctx, &id, ExitReason::Failed).await;
                    return;
                }
            };
            if !claimed {
                warn!(container_id = %id, %ship_symbol, "ship is already claimed by another container, marking FAILED");
                self.fail(&ctx, &id, ExitReason::Failed).await;
                return;
            }
        }

        info!(container_id = %id, "resuming container after daemon restart");
        self.spawn(id, container.player_id, container.spec).await;
    }

    async fn fail(&self, ctx: &Ctx, id: &ContainerId, reason: ExitReason) {
        let _ = self.bmc.container_bmc().update_status(ctx, id, ContainerStatus::Failed, Some(reason.exit_code()), Some(reason.as_str().into()), Utc::now()).await;
    }
}

/// §6's crash-recovery contract distinguishes "unparseable config" from
/// everything else; since `ContainerSpec` only deserializes when it's
/// internally consistent, the only remaining check is for an empty command
/// name, which would indicate a spec written by something other than this
/// daemon.
fn spec_looks_valid(spec: &ContainerSpec) -> bool {
    !spec.name.is_empty()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use fleetd_domain::{CommandSpec, DockCommand, RestartPolicy, ShipSymbol};
    use fleetd_store::InMemoryBmc;
    use tokio::time::sleep;

    use super::*;
    use crate::errors::CoreResult as Result;
    use crate::mediator::CommandHandler;
    use crate::st_client::MockStClientTrait;

    /// Resolves immediately; `CommandContainer::run`'s loop re-checks
    /// cancellation between iterations, so a container built on this handler
    /// stops the moment `stop_container` cancels its token, no grace period
    /// needed.
    struct InstantDockHandler;

    #[async_trait]
    impl CommandHandler<DockCommand> for InstantDockHandler {
        async fn handle(&self, _command: DockCommand) -> Result<()> {
            Ok(())
        }
    }

    /// Never returns on its own, modelling a workload stuck mid-hop (§8's
    /// "stop_container invoked while a workload is in a long sleep").
    struct StuckDockHandler;

    #[async_trait]
    impl CommandHandler<DockCommand> for StuckDockHandler {
        async fn handle(&self, _command: DockCommand) -> Result<()> {
            sleep(Duration::from_secs(369)).await;
            Ok(())
        }
    }

    fn dock_spec(name: &str, ship: &str) -> ContainerSpec {
        ContainerSpec { name: name.to_string(), command: CommandSpec::Dock { ship_symbol: ShipSymbol(ship.to_string()) }, iterations: None, restart_policy: RestartPolicy::No }
    }

    fn manager_with<H: CommandHandler<DockCommand> + 'static>(handler: H) -> ContainerManager {
        let mediator = Arc::new(Mediator::new());
        mediator.register("dock", handler);
        let bmc: Arc<dyn Bmc> = Arc::new(InMemoryBmc::new());
        let client = MockStClientTrait::new();
        let ship_repository = Arc::new(ShipRepository::new(Arc::new(client)));
        ContainerManager::new(bmc, mediator, ship_repository)
    }

    #[tokio::test]
    async fn create_container_claims_the_ships_assignment() {
        let manager = manager_with(InstantDockHandler);
        let player = PlayerId("p1".to_string());

        let id = manager.create_container(player.clone(), dock_spec("dock-1", "SHIP-1")).await.unwrap();
        let container = manager.get_container(&id).await.unwrap().unwrap();
        assert_eq!(container.status, ContainerStatus::Starting);

        let conflict = manager.create_container(player, dock_spec("dock-2", "SHIP-1")).await;
        assert!(matches!(conflict, Err(CoreError::AssignmentConflict { .. })));

        manager.stop_container(&id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_container_returns_within_the_grace_period() {
        let manager = manager_with(StuckDockHandler);
        let player = PlayerId("p1".to_string());
        let id = manager.create_container(player, dock_spec("dock-1", "SHIP-1")).await.unwrap();

        // Let the spawned task actually enter its 369s sleep before asking
        // it to stop.
        sleep(Duration::from_millis(10)).await;

        let stop = tokio::spawn(async move { manager.stop_container(&id).await });
        tokio::time::advance(STOP_GRACE_PERIOD + Duration::from_secs(1)).await;
        stop.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn remove_container_rejects_a_still_running_container() {
        let manager = manager_with(InstantDockHandler);
        let player = PlayerId("p1".to_string());
        let id = manager.create_container(player, dock_spec("dock-1", "SHIP-1")).await.unwrap();

        let err = manager.remove_container(&id).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        manager.stop_container(&id).await.unwrap();
    }

    fn manager_with_client<H: CommandHandler<DockCommand> + 'static>(handler: H, client: MockStClientTrait) -> (ContainerManager, Arc<dyn Bmc>) {
        let mediator = Arc::new(Mediator::new());
        mediator.register("dock", handler);
        let bmc: Arc<dyn Bmc> = Arc::new(InMemoryBmc::new());
        let ship_repository = Arc::new(ShipRepository::new(Arc::new(client)));
        (ContainerManager::new(bmc.clone(), mediator, ship_repository), bmc)
    }

    async fn seed_stale_container(bmc: &Arc<dyn Bmc>, spec: ContainerSpec) -> ContainerId {
        let container = Container::new(PlayerId("p1".to_string()), spec, Utc::now());
        let id = container.id.clone();
        bmc.container_bmc().create_container(&Ctx::Anonymous, container).await.unwrap();
        id
    }

    #[tokio::test]
    async fn recover_fails_a_container_whose_ship_no_longer_exists() {
        let mut client = MockStClientTrait::new();
        client.expect_get_ship().returning(|_| Err(anyhow::anyhow!("request failed: 404 Not Found")));
        let (manager, bmc) = manager_with_client(InstantDockHandler, client);
        let id = seed_stale_container(&bmc, dock_spec("dock-1", "SHIP-1")).await;

        manager.recover().await.unwrap();

        let container = manager.get_container(&id).await.unwrap().unwrap();
        assert_eq!(container.status, ContainerStatus::Failed);
        assert_eq!(container.exit_reason.as_deref(), Some(ExitReason::MissingResource.as_str()));
    }

    #[tokio::test]
    async fn recover_reclaims_the_assignment_and_resumes_when_the_ship_exists() {
        let mut client = MockStClientTrait::new();
        client.expect_get_ship().returning(|s| Ok(fleetd_domain::Data { data: fleetd_domain::fixtures::ship_at(&s.0, "X1", "X1-A1", 100) }));
        let (manager, bmc) = manager_with_client(InstantDockHandler, client);
        let id = seed_stale_container(&bmc, dock_spec("dock-1", "SHIP-1")).await;

        manager.recover().await.unwrap();

        let available = bmc.assignment_bmc().check_available(&Ctx::Anonymous, &PlayerId("p1".to_string()), &ShipSymbol("SHIP-1".to_string())).await.unwrap();
        assert!(!available, "ship should be re-claimed by the resumed container");

        manager.stop_container(&id).await.unwrap();
    }

    #[tokio::test]
    async fn recover_fails_a_container_whose_ship_is_already_claimed_elsewhere() {
        let mut client = MockStClientTrait::new();
        client.expect_get_ship().returning(|s| Ok(fleetd_domain::Data { data: fleetd_domain::fixtures::ship_at(&s.0, "X1", "X1-A1", 100) }));
        let (manager, bmc) = manager_with_client(InstantDockHandler, client);
        let id = seed_stale_container(&bmc, dock_spec("dock-1", "SHIP-1")).await;

        let other = ContainerId::new();
        bmc.assignment_bmc().assign(&Ctx::Anonymous, &PlayerId("p1".to_string()), &ShipSymbol("SHIP-1".to_string()), &other, "dock", Utc::now()).await.unwrap();

        manager.recover().await.unwrap();

        let container = manager.get_container(&id).await.unwrap().unwrap();
        assert_eq!(container.status, ContainerStatus::Failed);
    }
}
