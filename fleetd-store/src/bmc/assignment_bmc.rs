use crate::{db, Ctx, DbModelManager};
use anyhow::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetd_domain::{AssignmentStatus, ContainerId, PlayerId, ShipAssignment, ShipSymbol};
use mockall::automock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;

/// At-most-one-active-assignment-per-ship registry (§4.2). `release` always
/// flips a row to idle rather than deleting it, so the history of who last
/// held a ship survives for the health monitor's zombie sweep.
#[automock]
#[async_trait]
pub trait ShipAssignmentBmcTrait: Send + Sync + Debug {
    /// Fails (returns `Ok(false)`) if the ship already has an active assignment.
    async fn assign(&self, ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol, container_id: &ContainerId, operation: &str, now: DateTime<Utc>) -> Result<bool>;
    /// Fails if the ship isn't currently active under `old_container_id`.
    async fn reassign(&self, ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol, old_container_id: &ContainerId, new_container_id: &ContainerId, now: DateTime<Utc>) -> Result<bool>;
    async fn release(&self, ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol, reason: &str, now: DateTime<Utc>) -> Result<()>;
    async fn check_available(&self, ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol) -> Result<bool>;
    async fn get_info(&self, ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol) -> Result<Option<ShipAssignment>>;
    async fn list_assignments(&self, ctx: &Ctx) -> Result<Vec<ShipAssignment>>;
    /// Bulk-release every active row (daemon startup crash recovery); returns the count released.
    async fn release_all_active(&self, ctx: &Ctx, reason: &str, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Debug)]
pub struct DbShipAssignmentBmc {
    pub(crate) mm: DbModelManager,
}

#[async_trait]
impl ShipAssignmentBmcTrait for DbShipAssignmentBmc {
    async fn assign(&self, _ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol, container_id: &ContainerId, operation: &str, now: DateTime<Utc>) -> Result<bool> {
        db::assign_ship(self.mm.pool(), player_id, ship_symbol, container_id, operation, now).await
    }

    async fn reassign(&self, _ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol, old_container_id: &ContainerId, new_container_id: &ContainerId, now: DateTime<Utc>) -> Result<bool> {
        db::reassign_ship(self.mm.pool(), player_id, ship_symbol, old_container_id, new_container_id, now).await
    }

    async fn release(&self, _ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol, reason: &str, now: DateTime<Utc>) -> Result<()> {
        db::release_ship(self.mm.pool(), player_id, ship_symbol, reason, now).await
    }

    async fn check_available(&self, _ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol) -> Result<bool> {
        let existing = db::select_assignment(self.mm.pool(), player_id, ship_symbol).await?;
        Ok(existing.map(|a| !a.is_active()).unwrap_or(true))
    }

    async fn get_info(&self, _ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol) -> Result<Option<ShipAssignment>> {
        db::select_assignment(self.mm.pool(), player_id, ship_symbol).await
    }

    async fn list_assignments(&self, _ctx: &Ctx) -> Result<Vec<ShipAssignment>> {
        db::select_all_assignments(self.mm.pool()).await
    }

    async fn release_all_active(&self, _ctx: &Ctx, reason: &str, now: DateTime<Utc>) -> Result<u64> {
        db::release_all_active_assignments(self.mm.pool(), reason, now).await
    }
}

#[derive(Debug, Default)]
struct InMemoryAssignments {
    by_player_ship: HashMap<(PlayerId, ShipSymbol), ShipAssignment>,
}

#[derive(Debug)]
pub struct InMemoryShipAssignmentBmc {
    state: Arc<RwLock<InMemoryAssignments>>,
}

impl Default for InMemoryShipAssignmentBmc {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryShipAssignmentBmc {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryAssignments::default())),
        }
    }
}

#[async_trait]
impl ShipAssignmentBmcTrait for InMemoryShipAssignmentBmc {
    async fn assign(&self, _ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol, container_id: &ContainerId, operation: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut guard = self.state.write().await;
        let key = (player_id.clone(), ship_symbol.clone());

        if let Some(existing) = guard.by_player_ship.get(&key) {
            if existing.is_active() {
                return Ok(false);
            }
        }

        guard
            .by_player_ship
            .insert(key, ShipAssignment::new_active(player_id.clone(), ship_symbol.clone(), container_id.clone(), operation, now));
        Ok(true)
    }

    async fn reassign(&self, _ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol, old_container_id: &ContainerId, new_container_id: &ContainerId, now: DateTime<Utc>) -> Result<bool> {
        let mut guard = self.state.write().await;
        let key = (player_id.clone(), ship_symbol.clone());

        match guard.by_player_ship.get_mut(&key) {
            Some(a) if a.is_active() && &a.container_id == old_container_id => {
                a.container_id = new_container_id.clone();
                a.assigned_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, _ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol, reason: &str, now: DateTime<Utc>) -> Result<()> {
        let mut guard = self.state.write().await;
        if let Some(a) = guard.by_player_ship.get_mut(&(player_id.clone(), ship_symbol.clone())) {
            a.status = AssignmentStatus::Idle;
            a.released_at = Some(now);
            a.release_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn check_available(&self, _ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol) -> Result<bool> {
        let guard = self.state.read().await;
        Ok(guard.by_player_ship.get(&(player_id.clone(), ship_symbol.clone())).map(|a| !a.is_active()).unwrap_or(true))
    }

    async fn get_info(&self, _ctx: &Ctx, player_id: &PlayerId, ship_symbol: &ShipSymbol) -> Result<Option<ShipAssignment>> {
        Ok(self.state.read().await.by_player_ship.get(&(player_id.clone(), ship_symbol.clone())).cloned())
    }

    async fn list_assignments(&self, _ctx: &Ctx) -> Result<Vec<ShipAssignment>> {
        Ok(self.state.read().await.by_player_ship.values().cloned().collect())
    }

    async fn release_all_active(&self, _ctx: &Ctx, reason: &str, now: DateTime<Utc>) -> Result<u64> {
        let mut guard = self.state.write().await;
        let mut count = 0u64;
        for a in guard.by_player_ship.values_mut() {
            if a.is_active() {
                a.status = AssignmentStatus::Idle;
                a.released_at = Some(now);
                a.release_reason = Some(reason.to_string());
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn player() -> PlayerId {
        PlayerId("p1".to_string())
    }

    fn ship() -> ShipSymbol {
        ShipSymbol("SHIP-1".to_string())
    }

    #[tokio::test]
    async fn assign_then_assign_again_is_a_conflict() {
        let bmc = InMemoryShipAssignmentBmc::new();
        let c1 = ContainerId::new();
        let c2 = ContainerId::new();
        let now = Utc::now();

        assert!(bmc.assign(&Ctx::Anonymous, &player(), &ship(), &c1, "dock", now).await.unwrap());
        assert!(!bmc.assign(&Ctx::Anonymous, &player(), &ship(), &c2, "dock", now).await.unwrap());
    }

    #[tokio::test]
    async fn assign_release_assign_succeeds_both_times() {
        let bmc = InMemoryShipAssignmentBmc::new();
        let c1 = ContainerId::new();
        let c2 = ContainerId::new();
        let now = Utc::now();

        assert!(bmc.assign(&Ctx::Anonymous, &player(), &ship(), &c1, "dock", now).await.unwrap());
        bmc.release(&Ctx::Anonymous, &player(), &ship(), "done", now).await.unwrap();
        assert!(bmc.assign(&Ctx::Anonymous, &player(), &ship(), &c2, "dock", now).await.unwrap());
    }

    #[tokio::test]
    async fn release_twice_has_the_same_effect_as_once() {
        let bmc = InMemoryShipAssignmentBmc::new();
        let c1 = ContainerId::new();
        let now = Utc::now();

        bmc.assign(&Ctx::Anonymous, &player(), &ship(), &c1, "dock", now).await.unwrap();
        bmc.release(&Ctx::Anonymous, &player(), &ship(), "done", now).await.unwrap();
        let after_first = bmc.get_info(&Ctx::Anonymous, &player(), &ship()).await.unwrap();

        bmc.release(&Ctx::Anonymous, &player(), &ship(), "done", now).await.unwrap();
        let after_second = bmc.get_info(&Ctx::Anonymous, &player(), &ship()).await.unwrap();

        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn reassign_fails_if_the_old_container_id_does_not_match() {
        let bmc = InMemoryShipAssignmentBmc::new();
        let held = ContainerId::new();
        let wrong = ContainerId::new();
        let target = ContainerId::new();
        let now = Utc::now();

        bmc.assign(&Ctx::Anonymous, &player(), &ship(), &held, "dock", now).await.unwrap();
        assert!(!bmc.reassign(&Ctx::Anonymous, &player(), &ship(), &wrong, &target, now).await.unwrap());
        assert!(bmc.reassign(&Ctx::Anonymous, &player(), &ship(), &held, &target, now).await.unwrap());

        let info = bmc.get_info(&Ctx::Anonymous, &player(), &ship()).await.unwrap().unwrap();
        assert_eq!(info.container_id, target);
    }

    #[tokio::test]
    async fn release_all_active_only_touches_active_rows() {
        let bmc = InMemoryShipAssignmentBmc::new();
        let now = Utc::now();

        bmc.assign(&Ctx::Anonymous, &player(), &ShipSymbol("SHIP-1".to_string()), &ContainerId::new(), "dock", now).await.unwrap();
        bmc.assign(&Ctx::Anonymous, &player(), &ShipSymbol("SHIP-2".to_string()), &ContainerId::new(), "dock", now).await.unwrap();
        bmc.release(&Ctx::Anonymous, &player(), &ShipSymbol("SHIP-2".to_string()), "done", now).await.unwrap();

        let released = bmc.release_all_active(&Ctx::Anonymous, "daemon_restart", now).await.unwrap();
        assert_eq!(released, 1);

        assert!(bmc.check_available(&Ctx::Anonymous, &player(), &ShipSymbol("SHIP-1".to_string())).await.unwrap());
        assert!(bmc.check_available(&Ctx::Anonymous, &player(), &ShipSymbol("SHIP-2".to_string())).await.unwrap());
    }
}
