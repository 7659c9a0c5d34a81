use std::collections::HashMap;
use std::time::{Duration, Instant};

use fleetd_domain::{ShipSymbol, WaypointSymbol};

use super::graph::RoutingGraph;
use super::pathfinder::plan_path;
use super::tour::optimise_tour;

const UNREACHABLE: u32 = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct FleetAssignment {
    pub ship_symbol: ShipSymbol,
    pub stops: Vec<WaypointSymbol>,
    pub estimated_time: u32,
}

/// Partitions `markets` across `ships` so each ship's tour takes roughly the
/// same time: greedy cheapest-insertion assignment (every market goes to
/// whichever ship's tour it extends least) followed by a budgeted pairwise
/// swap pass that trades markets between ships to shrink the makespan.
///
/// `ships` is `(symbol, current_location)`. Reuses the same `plan_path`-
/// derived time costs the tour solver uses so assignment and ordering agree
/// on what "closer" means.
pub fn partition_fleet(
    graph: &RoutingGraph,
    markets: &[WaypointSymbol],
    ships: &[(ShipSymbol, WaypointSymbol)],
    fuel_capacity: i32,
    engine_speed: u32,
    budget: Duration,
) -> Vec<FleetAssignment> {
    let deadline = Instant::now() + budget;

    if ships.is_empty() || markets.is_empty() {
        return ships
            .iter()
            .map(|(symbol, _)| FleetAssignment { ship_symbol: symbol.clone(), stops: Vec::new(), estimated_time: 0 })
            .collect();
    }

    if ships.len() == 1 {
        let (symbol, start) = &ships[0];
        let tour = optimise_tour(graph, markets, start, fuel_capacity, engine_speed, remaining(deadline));
        return vec![FleetAssignment { ship_symbol: symbol.clone(), stops: markets.to_vec(), estimated_time: tour.total_time }];
    }

    let mut assigned: Vec<Vec<WaypointSymbol>> = vec![Vec::new(); ships.len()];
    let mut load: Vec<u32> = vec![0; ships.len()];

    let mut unassigned: Vec<WaypointSymbol> = markets.to_vec();
    while let Some(pos) = pick_cheapest_insertion(graph, ships, &assigned, &load, &unassigned, fuel_capacity, engine_speed) {
        let (ship_idx, market_idx, added_time) = pos;
        let market = unassigned.remove(market_idx);
        assigned[ship_idx].push(market);
        load[ship_idx] = load[ship_idx].saturating_add(added_time);
    }

    swap_local_search(graph, ships, &mut assigned, &mut load, fuel_capacity, engine_speed, deadline);

    ships
        .iter()
        .zip(assigned.into_iter())
        .map(|((symbol, start), stops)| {
            let tour = optimise_tour(graph, &stops, start, fuel_capacity, engine_speed, remaining(deadline));
            FleetAssignment { ship_symbol: symbol.clone(), stops: tour.ordered.into_iter().filter(|s| s != start).collect(), estimated_time: tour.total_time }
        })
        .collect()
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn pick_cheapest_insertion(
    graph: &RoutingGraph,
    ships: &[(ShipSymbol, WaypointSymbol)],
    assigned: &[Vec<WaypointSymbol>],
    load: &[u32],
    unassigned: &[WaypointSymbol],
    fuel_capacity: i32,
    engine_speed: u32,
) -> Option<(usize, usize, u32)> {
    if unassigned.is_empty() {
        return None;
    }

    let mut best: Option<(usize, usize, u32)> = None;
    for (ship_idx, (_, start)) in ships.iter().enumerate() {
        let last_stop = assigned[ship_idx].last().unwrap_or(start);
        for (market_idx, market) in unassigned.iter().enumerate() {
            let marginal = plan_path(graph, last_stop, market, fuel_capacity, fuel_capacity, engine_speed)
                .map(|p| p.total_time)
                .unwrap_or(UNREACHABLE);
            let projected_load = load[ship_idx].saturating_add(marginal);
            let better = match &best {
                None => true,
                Some((_, _, best_time)) => projected_load < *best_time,
            };
            if better {
                best = Some((ship_idx, market_idx, marginal));
            }
        }
    }
    best
}

fn swap_local_search(
    graph: &RoutingGraph,
    ships: &[(ShipSymbol, WaypointSymbol)],
    assigned: &mut [Vec<WaypointSymbol>],
    load: &mut [u32],
    fuel_capacity: i32,
    engine_speed: u32,
    deadline: Instant,
) {
    let n = ships.len();
    loop {
        if Instant::now() >= deadline {
            return;
        }
        let mut improved = false;
        for a in 0..n {
            for b in 0..n {
                if a == b {
                    continue;
                }
                if Instant::now() >= deadline {
                    return;
                }
                let Some((i, j, new_a, new_b)) = best_swap(graph, ships, assigned, a, b, fuel_capacity, engine_speed) else { continue };
                let current_span = load[a].max(load[b]);
                let new_span = new_a.max(new_b);
                if new_span < current_span {
                    assigned[a].swap_remove(i);
                    assigned[b].swap_remove(j);
                    load[a] = new_a;
                    load[b] = new_b;
                    improved = true;
                }
            }
        }
        if !improved {
            return;
        }
    }
}

fn best_swap(
    graph: &RoutingGraph,
    ships: &[(ShipSymbol, WaypointSymbol)],
    assigned: &[Vec<WaypointSymbol>],
    a: usize,
    b: usize,
    fuel_capacity: i32,
    engine_speed: u32,
) -> Option<(usize, usize, u32, u32)> {
    let mut result: Option<(usize, usize, u32, u32)> = None;
    for (i, market_a) in assigned[a].iter().enumerate() {
        for (j, market_b) in assigned[b].iter().enumerate() {
            let load_a = route_time(graph, &ships[a].1, &swap_at(&assigned[a], i, market_b.clone()), fuel_capacity, engine_speed);
            let load_b = route_time(graph, &ships[b].1, &swap_at(&assigned[b], j, market_a.clone()), fuel_capacity, engine_speed);
            let span = load_a.max(load_b);
            let better = match &result {
                None => true,
                Some((_, _, ra, rb)) => span < ra.max(*rb),
            };
            if better {
                result = Some((i, j, load_a, load_b));
            }
        }
    }
    result
}

fn swap_at(stops: &[WaypointSymbol], idx: usize, replacement: WaypointSymbol) -> Vec<WaypointSymbol> {
    let mut out = stops.to_vec();
    out[idx] = replacement;
    out
}

fn route_time(graph: &RoutingGraph, start: &WaypointSymbol, stops: &[WaypointSymbol], fuel_capacity: i32, engine_speed: u32) -> u32 {
    let mut total = 0u32;
    let mut current = start.clone();
    for stop in stops {
        total = total.saturating_add(
            plan_path(graph, &current, stop, fuel_capacity, fuel_capacity, engine_speed)
                .map(|p| p.total_time)
                .unwrap_or(UNREACHABLE),
        );
        current = stop.clone();
    }
    total
}

pub type FleetPartition = HashMap<ShipSymbol, Vec<WaypointSymbol>>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::routing::test_fixtures::{system_graph, waypoint};
    use crate::routing::RoutingGraph;

    #[test]
    fn fewer_markets_than_ships_leaves_some_ships_empty() {
        let start1 = waypoint("S1", 0, 0, false);
        let start2 = waypoint("S2", 1_000, 0, false);
        let market = waypoint("M1", 10, 0, false);
        let graph = system_graph(vec![start1.clone(), start2.clone(), market.clone()]);
        let routing = RoutingGraph::new(&graph);

        let ships = vec![(ShipSymbol("SHIP-1".to_string()), start1.symbol.clone()), (ShipSymbol("SHIP-2".to_string()), start2.symbol.clone())];

        let assignments = partition_fleet(&routing, &[market.symbol.clone()], &ships, 10_000, 30, Duration::from_millis(50));

        let total_assigned: usize = assignments.iter().map(|a| a.stops.len()).sum();
        assert_eq!(total_assigned, 1);
        assert!(assignments.iter().any(|a| a.stops.is_empty()));
    }

    #[test]
    fn every_market_is_assigned_exactly_once() {
        let start1 = waypoint("S1", 0, 0, false);
        let start2 = waypoint("S2", 1_000, 0, false);
        let m1 = waypoint("M1", 10, 0, false);
        let m2 = waypoint("M2", 990, 0, false);
        let m3 = waypoint("M3", 5, 0, false);
        let m4 = waypoint("M4", 995, 0, false);
        let graph = system_graph(vec![start1.clone(), start2.clone(), m1.clone(), m2.clone(), m3.clone(), m4.clone()]);
        let routing = RoutingGraph::new(&graph);

        let ships = vec![(ShipSymbol("SHIP-1".to_string()), start1.symbol.clone()), (ShipSymbol("SHIP-2".to_string()), start2.symbol.clone())];
        let markets = vec![m1.symbol.clone(), m2.symbol.clone(), m3.symbol.clone(), m4.symbol.clone()];

        let assignments = partition_fleet(&routing, &markets, &ships, 10_000, 30, Duration::from_millis(50));

        let mut assigned: Vec<WaypointSymbol> = assignments.iter().flat_map(|a| a.stops.clone()).collect();
        assigned.sort_by(|a, b| a.0.cmp(&b.0));
        let mut expected = markets.clone();
        expected.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(assigned, expected);

        // Each ship's cluster of markets sits squarely on its own side, so
        // cheapest-insertion should never starve one ship entirely.
        assert!(assignments.iter().all(|a| !a.stops.is_empty()));
    }
}
