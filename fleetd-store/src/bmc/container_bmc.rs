use crate::{db, Ctx, DbModelManager};
use anyhow::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetd_domain::{Container, ContainerId, ContainerLog, ContainerStatus, LogLevel, PlayerId};
use mockall::automock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;

#[automock]
#[async_trait]
pub trait ContainerBmcTrait: Send + Sync + Debug {
    async fn create_container(&self, ctx: &Ctx, container: Container) -> Result<()>;
    async fn get_container(&self, ctx: &Ctx, id: &ContainerId) -> Result<Option<Container>>;
    async fn list_containers(&self, ctx: &Ctx, player_id: Option<&PlayerId>, status: Option<ContainerStatus>) -> Result<Vec<Container>>;
    /// Ids of non-terminal containers whose `spec` column didn't parse as a
    /// `ContainerSpec`. `list_containers` silently skips these rows rather
    /// than failing the whole batch; recovery uses this to fail them one by
    /// one instead of losing them.
    async fn list_malformed_container_ids(&self, ctx: &Ctx) -> Result<Vec<ContainerId>>;
    /// Rejects the write if `id` is already in a terminal state and `status` would
    /// move it back to a non-terminal one (§4.3 invariant).
    async fn update_status(&self, ctx: &Ctx, id: &ContainerId, status: ContainerStatus, exit_code: Option<i32>, exit_reason: Option<String>, now: DateTime<Utc>) -> Result<()>;
    /// Force-fails a container by id without reading back its (possibly
    /// unparseable) spec.
    async fn force_fail(&self, ctx: &Ctx, id: &ContainerId, exit_code: i32, exit_reason: &str, now: DateTime<Utc>) -> Result<()>;
    async fn delete_container(&self, ctx: &Ctx, id: &ContainerId) -> Result<()>;
    async fn append_log(&self, ctx: &Ctx, log: ContainerLog) -> Result<()>;
    async fn get_logs(
        &self,
        ctx: &Ctx,
        id: &ContainerId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        level: Option<LogLevel>,
        limit: u32,
    ) -> Result<Vec<ContainerLog>>;
}

#[derive(Debug)]
pub struct DbContainerBmc {
    pub(crate) mm: DbModelManager,
}

#[async_trait]
impl ContainerBmcTrait for DbContainerBmc {
    async fn create_container(&self, _ctx: &Ctx, container: Container) -> Result<()> {
        db::insert_container(self.mm.pool(), &container).await
    }

    async fn get_container(&self, _ctx: &Ctx, id: &ContainerId) -> Result<Option<Container>> {
        db::select_container(self.mm.pool(), id).await
    }

    async fn list_containers(&self, _ctx: &Ctx, player_id: Option<&PlayerId>, status: Option<ContainerStatus>) -> Result<Vec<Container>> {
        db::select_containers(self.mm.pool(), player_id, status).await
    }

    async fn list_malformed_container_ids(&self, _ctx: &Ctx) -> Result<Vec<ContainerId>> {
        db::select_malformed_container_ids(self.mm.pool()).await
    }

    async fn force_fail(&self, _ctx: &Ctx, id: &ContainerId, exit_code: i32, exit_reason: &str, now: DateTime<Utc>) -> Result<()> {
        db::mark_container_failed(self.mm.pool(), id, exit_code, exit_reason, now).await
    }

    async fn update_status(&self, _ctx: &Ctx, id: &ContainerId, status: ContainerStatus, exit_code: Option<i32>, exit_reason: Option<String>, now: DateTime<Utc>) -> Result<()> {
        let Some(mut container) = db::select_container(self.mm.pool(), id).await? else {
            return Err(anyhow!("container {id} not found"));
        };

        if container.status.is_terminal() && !status.is_terminal() {
            return Err(anyhow!("container {id} already reached a terminal state ({:?}), refusing to move to {:?}", container.status, status));
        }

        container.status = status;
        container.exit_code = exit_code;
        container.exit_reason = exit_reason;
        if status.is_terminal() {
            container.stopped_at = Some(now);
        }

        db::update_container(self.mm.pool(), &container).await
    }

    async fn delete_container(&self, _ctx: &Ctx, id: &ContainerId) -> Result<()> {
        db::delete_container(self.mm.pool(), id).await
    }

    async fn append_log(&self, _ctx: &Ctx, log: ContainerLog) -> Result<()> {
        db::insert_container_log(self.mm.pool(), &log).await
    }

    async fn get_logs(
        &self,
        _ctx: &Ctx,
        id: &ContainerId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        level: Option<LogLevel>,
        limit: u32,
    ) -> Result<Vec<ContainerLog>> {
        db::select_container_logs(self.mm.pool(), id, since, until, level, limit).await
    }
}

#[derive(Debug, Default)]
struct InMemoryContainers {
    containers: HashMap<ContainerId, Container>,
    logs: HashMap<ContainerId, Vec<ContainerLog>>,
}

#[derive(Debug)]
pub struct InMemoryContainerBmc {
    state: Arc<RwLock<InMemoryContainers>>,
}

impl Default for InMemoryContainerBmc {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryContainerBmc {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryContainers::default())),
        }
    }
}

#[async_trait]
impl ContainerBmcTrait for InMemoryContainerBmc {
    async fn create_container(&self, _ctx: &Ctx, container: Container) -> Result<()> {
        self.state.write().await.containers.insert(container.id.clone(), container);
        Ok(())
    }

    async fn get_container(&self, _ctx: &Ctx, id: &ContainerId) -> Result<Option<Container>> {
        Ok(self.state.read().await.containers.get(id).cloned())
    }

    async fn list_containers(&self, _ctx: &Ctx, player_id: Option<&PlayerId>, status: Option<ContainerStatus>) -> Result<Vec<Container>> {
        Ok(self
            .state
            .read()
            .await
            .containers
            .values()
            .filter(|c| player_id.map_or(true, |p| &c.player_id == p))
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect())
    }

    async fn list_malformed_container_ids(&self, _ctx: &Ctx) -> Result<Vec<ContainerId>> {
        // In-memory containers are constructed from already-typed `ContainerSpec`
        // values, so there's never an unparseable one to report.
        Ok(Vec::new())
    }

    async fn force_fail(&self, _ctx: &Ctx, id: &ContainerId, exit_code: i32, exit_reason: &str, now: DateTime<Utc>) -> Result<()> {
        let mut guard = self.state.write().await;
        if let Some(container) = guard.containers.get_mut(id) {
            container.status = ContainerStatus::Failed;
            container.exit_code = Some(exit_code);
            container.exit_reason = Some(exit_reason.to_string());
            container.stopped_at = Some(now);
        }
        Ok(())
    }

    async fn update_status(&self, _ctx: &Ctx, id: &ContainerId, status: ContainerStatus, exit_code: Option<i32>, exit_reason: Option<String>, now: DateTime<Utc>) -> Result<()> {
        let mut guard = self.state.write().await;
        let container = guard.containers.get_mut(id).ok_or_else(|| anyhow!("container {id} not found"))?;

        if container.status.is_terminal() && !status.is_terminal() {
            return Err(anyhow!("container {id} already reached a terminal state ({:?}), refusing to move to {:?}", container.status, status));
        }

        container.status = status;
        container.exit_code = exit_code;
        container.exit_reason = exit_reason;
        if status.is_terminal() {
            container.stopped_at = Some(now);
        }
        Ok(())
    }

    async fn delete_container(&self, _ctx: &Ctx, id: &ContainerId) -> Result<()> {
        let mut guard = self.state.write().await;
        guard.containers.remove(id);
        guard.logs.remove(id);
        Ok(())
    }

    async fn append_log(&self, _ctx: &Ctx, log: ContainerLog) -> Result<()> {
        self.state.write().await.logs.entry(log.container_id.clone()).or_default().push(log);
        Ok(())
    }

    async fn get_logs(
        &self,
        _ctx: &Ctx,
        id: &ContainerId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        level: Option<LogLevel>,
        limit: u32,
    ) -> Result<Vec<ContainerLog>> {
        let guard = self.state.read().await;
        let logs = guard.logs.get(id).cloned().unwrap_or_default();
        let filtered: Vec<ContainerLog> = logs
            .into_iter()
            .filter(|l| since.map_or(true, |s| l.recorded_at >= s))
            .filter(|l| until.map_or(true, |u| l.recorded_at <= u))
            .filter(|l| level.map_or(true, |lvl| l.level == lvl))
            .collect();
        let start = filtered.len().saturating_sub(limit as usize);
        Ok(filtered[start..].to_vec())
    }
}
