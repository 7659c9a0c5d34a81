use serde::{Deserialize, Serialize};

use crate::{ShipSymbol, SystemSymbol, WaypointSymbol};

/// Marker for anything the mediator can dispatch. `Output` is what the
/// matching handler resolves to.
pub trait Command: Send + Sync + std::fmt::Debug + 'static {
    type Output: Send + Sync + 'static;
}

/// Commands that carry invariants worth checking before a handler ever runs
/// implement this; `ValidationBehaviour` looks for it via a capability check
/// rather than reflection.
pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavigateCommand {
    pub ship_symbol: ShipSymbol,
    pub destination: WaypointSymbol,
}

impl Command for NavigateCommand {
    type Output = ();
}

impl Validatable for NavigateCommand {
    fn validate(&self) -> Result<(), String> {
        if self.destination.0.is_empty() {
            return Err("destination must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DockCommand {
    pub ship_symbol: ShipSymbol,
}

impl Command for DockCommand {
    type Output = ();
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoutMarketsCommand {
    pub ship_symbol: ShipSymbol,
    pub system_symbol: SystemSymbol,
}

impl Command for ScoutMarketsCommand {
    type Output = u32;
}

impl Validatable for ScoutMarketsCommand {
    fn validate(&self) -> Result<(), String> {
        if self.system_symbol.0.is_empty() {
            return Err("system_symbol must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoutTourCommand {
    pub ship_symbol: ShipSymbol,
    pub system_symbol: SystemSymbol,
    pub waypoints: Vec<WaypointSymbol>,
}

impl Command for ScoutTourCommand {
    type Output = u32;
}

impl Validatable for ScoutTourCommand {
    fn validate(&self) -> Result<(), String> {
        if self.waypoints.is_empty() {
            return Err("a scout tour needs at least one waypoint".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchContractCommand {
    pub ship_symbol: ShipSymbol,
    pub iterations: Option<u32>,
}

impl Command for BatchContractCommand {
    type Output = u32;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchPurchaseShipCommand {
    pub shipyard_waypoint: WaypointSymbol,
    pub ship_type: String,
    pub count: u32,
}

impl Command for BatchPurchaseShipCommand {
    type Output = u32;
}

impl Validatable for BatchPurchaseShipCommand {
    fn validate(&self) -> Result<(), String> {
        if self.count == 0 {
            return Err("count must be at least 1".into());
        }
        Ok(())
    }
}
