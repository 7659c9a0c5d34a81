use std::sync::Arc;

use chrono::Utc;
use fleetd_domain::{ContainerId, ContainerStatus, ExitReason, PlayerId};
use fleetd_store::{Bmc, Ctx};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::CoreError;

/// What a container's lifecycle ended with, passed to `cleanup` so it can
/// tailor the release reason it writes to the assignment registry.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: ContainerStatus,
    pub exit_code: i32,
    pub exit_reason: String,
}

/// Anything the container manager can run to completion: `CommandContainer`
/// is the only implementation today, but the lifecycle below is generic
/// over whatever a future container type needs to do.
#[async_trait::async_trait]
pub trait BaseContainer: Send + Sync {
    fn id(&self) -> ContainerId;
    fn player_id(&self) -> PlayerId;

    /// Runs until done, cancelled, or failed. Returning `Err(CoreError::Cancelled)`
    /// distinguishes a stop request from an actual failure; anything else is
    /// treated as FAILED.
    async fn run(&self, cancel: CancellationToken) -> Result<(), CoreError>;

    /// Always called exactly once, regardless of how `run` ended. Typically
    /// releases whatever ship assignment the container was holding.
    async fn cleanup(&self, outcome: &Outcome);
}

/// Drives a container through STARTING (already persisted by the caller) ->
/// RUNNING -> {STOPPED, FAILED}, persisting each transition and invoking the
/// in-memory callback so `ContainerManager`'s handle table stays in sync.
pub async fn run_container_lifecycle<C: BaseContainer + ?Sized>(
    container: &C,
    bmc: &Arc<dyn Bmc>,
    cancel: CancellationToken,
    on_status_change: impl Fn(ContainerStatus),
) {
    let ctx = Ctx::Anonymous;
    let id = container.id();

    if let Err(e) = bmc.container_bmc().update_status(&ctx, &id, ContainerStatus::Running, None, None, Utc::now()).await {
        warn!(container_id = %id, error = %e, "failed to persist RUNNING transition");
    }
    on_status_change(ContainerStatus::Running);

    let result = container.run(cancel).await;

    let outcome = match result {
        Ok(()) => Outcome { status: ContainerStatus::Stopped, exit_code: ExitReason::Completed.exit_code(), exit_reason: ExitReason::Completed.as_str().to_string() },
        Err(CoreError::Cancelled) => Outcome { status: ContainerStatus::Stopped, exit_code: ExitReason::Stopped.exit_code(), exit_reason: ExitReason::Stopped.as_str().to_string() },
        Err(other) => {
            let message: String = other.to_string().chars().take(500).collect();
            Outcome { status: ContainerStatus::Failed, exit_code: ExitReason::Failed.exit_code(), exit_reason: message }
        }
    };

    info!(container_id = %id, status = ?outcome.status, exit_code = outcome.exit_code, "container finished");

    if let Err(e) = bmc
        .container_bmc()
        .update_status(&ctx, &id, outcome.status, Some(outcome.exit_code), Some(outcome.exit_reason.clone()), Utc::now())
        .await
    {
        warn!(container_id = %id, error = %e, "failed to persist terminal status");
    }
    on_status_change(outcome.status);

    container.cleanup(&outcome).await;
}
