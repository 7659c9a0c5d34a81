use std::collections::HashMap;

use fleetd_domain::{SystemGraph, Waypoint, WaypointSymbol};

/// Indexes a `SystemGraph` once per solve so the routing algorithms below
/// don't rebuild a `waypoint -> &Waypoint` map on every successor expansion.
pub struct RoutingGraph<'g> {
    graph: &'g SystemGraph,
    by_symbol: HashMap<WaypointSymbol, &'g Waypoint>,
}

impl<'g> RoutingGraph<'g> {
    pub fn new(graph: &'g SystemGraph) -> Self {
        Self { graph, by_symbol: graph.by_symbol() }
    }

    pub fn get(&self, symbol: &WaypointSymbol) -> Option<&'g Waypoint> {
        self.by_symbol.get(symbol).copied()
    }

    pub fn waypoints(&self) -> impl Iterator<Item = &'g Waypoint> {
        self.graph.waypoints.iter()
    }

    pub fn distance(&self, from: &Waypoint, to: &Waypoint) -> u32 {
        self.graph.distance(from, to)
    }

    pub fn distance_between(&self, from: &WaypointSymbol, to: &WaypointSymbol) -> Option<u32> {
        Some(self.graph.distance(self.get(from)?, self.get(to)?))
    }
}
