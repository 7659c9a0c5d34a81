use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::container::ContainerId;
use crate::{PlayerId, ShipSymbol};

/// At-most-one-active-row-per-ship lock. `release` never deletes the row —
/// it flips it to idle so `reassign` and the zombie-cleanup pass still have
/// something to look at.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Idle,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ShipAssignment {
    pub player_id: PlayerId,
    pub ship_symbol: ShipSymbol,
    pub status: AssignmentStatus,
    pub container_id: ContainerId,
    pub operation: String,
    pub assigned_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub release_reason: Option<String>,
}

impl ShipAssignment {
    pub fn new_active(player_id: PlayerId, ship_symbol: ShipSymbol, container_id: ContainerId, operation: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            player_id,
            ship_symbol,
            status: AssignmentStatus::Active,
            container_id,
            operation: operation.into(),
            assigned_at: now,
            released_at: None,
            release_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}
