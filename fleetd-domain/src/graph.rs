use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::st_model::distance_to;
use crate::{SystemSymbol, Waypoint, WaypointSymbol, WaypointTraitSymbol};

impl Waypoint {
    /// §3: "`has_fuel` (bool)". The wire model has no such field — the game
    /// API instead marks fuel-selling waypoints via the MARKETPLACE trait, so
    /// this is a method rather than a stored flag, matching how
    /// `has_reached_critical_limit` above reads a derived boolean off `modifiers`.
    pub fn has_fuel(&self) -> bool {
        self.traits.iter().any(|t| t.symbol == WaypointTraitSymbol::MARKETPLACE)
    }

    /// Two waypoints are orbital neighbours iff either appears in the
    /// other's `orbitals` set (§3); the caller also has to check both
    /// directions since the API only guarantees it one way around.
    pub fn is_orbital_neighbour(&self, other: &Waypoint) -> bool {
        self.orbitals.iter().any(|o| o.symbol == other.symbol) || other.orbitals.iter().any(|o| o.symbol == self.symbol)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Orbital,
    Euclidean,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub from: WaypointSymbol,
    pub to: WaypointSymbol,
    pub distance: u32,
    pub kind: EdgeKind,
}

/// A cached snapshot of a system's waypoints, refreshed whenever the routing
/// engine is asked to plan against a system it hasn't seen recently.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SystemGraph {
    pub system_symbol: SystemSymbol,
    pub waypoints: Vec<Waypoint>,
    pub fetched_at: DateTime<Utc>,
}

impl SystemGraph {
    pub fn by_symbol(&self) -> HashMap<WaypointSymbol, &Waypoint> {
        self.waypoints.iter().map(|w| (w.symbol.clone(), w)).collect()
    }

    pub fn refueling_stations(&self) -> Vec<WaypointSymbol> {
        self.waypoints.iter().filter(|w| w.has_fuel()).map(|w| w.symbol.clone()).collect()
    }

    /// Distance between two waypoints per §3: 0 for orbital neighbours,
    /// Euclidean otherwise.
    pub fn distance(&self, from: &Waypoint, to: &Waypoint) -> u32 {
        if from.symbol == to.symbol {
            0
        } else if from.is_orbital_neighbour(to) {
            0
        } else {
            distance_to(from.x, from.y, to.x, to.y)
        }
    }

    /// Every bidirectional edge in the system, orbital pairs marked with
    /// distance 0. Used by callers that want the full edge list rather than
    /// point-to-point queries (e.g. diagnostics, tests).
    pub fn edges(&self) -> Vec<GraphEdge> {
        let mut edges = Vec::new();
        for (i, a) in self.waypoints.iter().enumerate() {
            for b in self.waypoints.iter().skip(i + 1) {
                let kind = if a.is_orbital_neighbour(b) { EdgeKind::Orbital } else { EdgeKind::Euclidean };
                let distance = self.distance(a, b);
                edges.push(GraphEdge {
                    from: a.symbol.clone(),
                    to: b.symbol.clone(),
                    distance,
                    kind,
                });
            }
        }
        edges
    }
}
