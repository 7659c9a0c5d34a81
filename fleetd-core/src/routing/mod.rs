pub mod fleet_partition;
pub mod graph;
pub mod pathfinder;
pub mod tour;

pub use fleet_partition::*;
pub use graph::*;
pub use pathfinder::*;
pub use tour::*;

#[cfg(test)]
pub(crate) mod test_fixtures {
    use chrono::Utc;
    use fleetd_domain::{Orbital, SystemGraph, SystemSymbol, Waypoint, WaypointSymbol, WaypointTrait, WaypointTraitSymbol, WaypointType};

    pub fn waypoint(symbol: &str, x: i64, y: i64, has_fuel: bool) -> Waypoint {
        Waypoint {
            symbol: WaypointSymbol(symbol.to_string()),
            r#type: WaypointType::PLANET,
            system_symbol: SystemSymbol("X1".to_string()),
            x,
            y,
            orbitals: Vec::new(),
            orbits: None,
            faction: None,
            traits: if has_fuel {
                vec![WaypointTrait { symbol: WaypointTraitSymbol::MARKETPLACE, name: "Marketplace".to_string(), description: String::new() }]
            } else {
                Vec::new()
            },
            modifiers: Vec::new(),
            chart: None,
            is_under_construction: false,
        }
    }

    /// Registers `child` as an orbital neighbour of `parent` (one direction is enough, §3).
    pub fn orbit(parent: &mut Waypoint, child: &Waypoint) {
        parent.orbitals.push(Orbital { symbol: child.symbol.clone() });
    }

    pub fn system_graph(waypoints: Vec<Waypoint>) -> SystemGraph {
        SystemGraph { system_symbol: SystemSymbol("X1".to_string()), waypoints, fetched_at: Utc::now() }
    }
}
