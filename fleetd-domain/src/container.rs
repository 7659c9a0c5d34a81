use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use crate::ShipSymbol;

/// Identifies the operator a container, assignment, or log line belongs to.
/// The daemon is single-tenant in practice today (one game account), but every
/// store row carries this so scoping by player doesn't require a schema change
/// later — mirrors how the teacher threads `AgentSymbol` through its own
/// per-agent tables even though it only ever runs one agent at a time.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub String);

impl Display for PlayerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ContainerId(pub Uuid);

impl ContainerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContainerId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ContainerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerStatus {
    Starting,
    Running,
    Stopped,
    Failed,
}

impl ContainerStatus {
    /// A container that has reached STOPPED or FAILED never transitions again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ContainerStatus::Stopped | ContainerStatus::Failed)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    No,
    OnFailure,
    Always,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::No
    }
}

/// The single concrete container type today (§3: "currently always
/// `command`; extensible").
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
    Command,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandSpec {
    ScoutMarkets {
        system_symbol: String,
        ship_symbol: ShipSymbol,
    },
    ScoutTour {
        system_symbol: String,
        ship_symbol: ShipSymbol,
        waypoints: Vec<String>,
    },
    BatchContract {
        ship_symbol: ShipSymbol,
        iterations: Option<u32>,
    },
    BatchPurchaseShip {
        shipyard_waypoint: String,
        ship_type: String,
        count: u32,
    },
    Navigate {
        ship_symbol: ShipSymbol,
        destination: String,
    },
    Dock {
        ship_symbol: ShipSymbol,
    },
}

impl CommandSpec {
    /// The registry key `build_command` resolves, replacing the source's
    /// late-bound class-name scan (§9 REDESIGN FLAGS).
    pub fn registry_key(&self) -> &'static str {
        match self {
            CommandSpec::ScoutMarkets { .. } => "scout_markets",
            CommandSpec::ScoutTour { .. } => "scout_tour",
            CommandSpec::BatchContract { .. } => "batch_contract",
            CommandSpec::BatchPurchaseShip { .. } => "batch_purchase_ship",
            CommandSpec::Navigate { .. } => "navigate",
            CommandSpec::Dock { .. } => "dock",
        }
    }

    /// The ship this command's container should hold a lock on, if any —
    /// `CommandContainer::cleanup` reads this to release the right ship.
    pub fn ship_symbol(&self) -> Option<&ShipSymbol> {
        match self {
            CommandSpec::ScoutMarkets { ship_symbol, .. }
            | CommandSpec::ScoutTour { ship_symbol, .. }
            | CommandSpec::BatchContract { ship_symbol, .. }
            | CommandSpec::Navigate { ship_symbol, .. }
            | CommandSpec::Dock { ship_symbol } => Some(ship_symbol),
            CommandSpec::BatchPurchaseShip { .. } => None,
        }
    }
}

/// `-1` in spec terms; `None` here reads better than a magic number in Rust.
pub type Iterations = Option<u32>;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub command: CommandSpec,
    pub iterations: Iterations,
    pub restart_policy: RestartPolicy,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Completed,
    Failed,
    Stopped,
    InvalidConfig,
    MissingResource,
}

impl ExitReason {
    /// Wire exit codes, fixed by §6 ("part of the wire contract").
    pub fn exit_code(self) -> i32 {
        match self {
            ExitReason::Completed => 0,
            ExitReason::Failed => 1,
            ExitReason::Stopped => 2,
            ExitReason::InvalidConfig => 3,
            ExitReason::MissingResource => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Completed => "completed",
            ExitReason::Failed => "failed",
            ExitReason::Stopped => "stopped",
            ExitReason::InvalidConfig => "invalid_config",
            ExitReason::MissingResource => "missing_resource",
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Container {
    pub id: ContainerId,
    pub player_id: PlayerId,
    pub container_type: ContainerType,
    pub spec: ContainerSpec,
    pub status: ContainerStatus,
    pub restart_count: u32,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub exit_reason: Option<String>,
}

impl Container {
    pub fn new(player_id: PlayerId, spec: ContainerSpec, now: DateTime<Utc>) -> Self {
        Self {
            id: ContainerId::new(),
            player_id,
            container_type: ContainerType::Command,
            spec,
            status: ContainerStatus::Starting,
            restart_count: 0,
            started_at: now,
            stopped_at: None,
            exit_code: None,
            exit_reason: None,
        }
    }

    /// §3 invariant: `exit_code.is_some()` implies terminal status and a set
    /// `stopped_at`. Checked defensively wherever a transition is applied.
    pub fn invariant_holds(&self) -> bool {
        match self.exit_code {
            Some(_) => self.status.is_terminal() && self.stopped_at.is_some(),
            None => true,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ContainerLog {
    pub container_id: ContainerId,
    pub player_id: PlayerId,
    pub level: LogLevel,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}
