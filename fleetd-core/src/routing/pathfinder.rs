use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use fleetd_domain::{FlightMode, WaypointSymbol};

use super::graph::RoutingGraph;

/// Fuel is bucketed at this granularity for state deduplication only; the
/// actual fuel carried forward to successor expansion stays exact.
const FUEL_BUCKET_SIZE: i32 = 10;
const SAFETY_RESERVE: i32 = 4;
const REFUEL_LOW_WATER_RATIO: f64 = 0.9;

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Travel {
        to: WaypointSymbol,
        mode: FlightMode,
        distance: u32,
        fuel_cost: i32,
        time: u32,
    },
    Refuel {
        at: WaypointSymbol,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    pub steps: Vec<Step>,
    pub total_fuel_cost: i32,
    pub total_time: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct StateKey {
    waypoint: usize,
    fuel_bucket: i32,
}

#[derive(Clone)]
struct QueueEntry {
    key: StateKey,
    time: u32,
    seq: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl Eq for QueueEntry {}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse both keys so popping yields the
        // lowest time, and among ties, the entry inserted first (lowest seq).
        other.time.cmp(&self.time).then(other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

enum Pred {
    Start,
    From(StateKey, Step),
}

/// Plans a fuel-aware route from `start` to `goal` over the indexed waypoint
/// set, returning `None` when no sequence of travel/refuel hops reaches the
/// goal with the given fuel capacity.
///
/// The search runs Dijkstra over `(waypoint, fuel_bucket)` states: bucketing
/// fuel keeps the state space finite while the `fuel` value carried on each
/// queue entry stays exact for fuel-cost/REFUEL decisions. REFUEL is an
/// explicit zero-time, zero-cost successor emitted whenever the current
/// waypoint sells fuel and the ship is either below 90% of capacity or
/// couldn't reach the goal on DRIFT alone; TRAVEL successors are emitted for
/// every other waypoint for which `FlightMode::select_optimal` finds a mode
/// that leaves at least `SAFETY_RESERVE` fuel in the tank.
pub fn plan_path(
    graph: &RoutingGraph,
    start: &WaypointSymbol,
    goal: &WaypointSymbol,
    current_fuel: i32,
    fuel_capacity: i32,
    engine_speed: u32,
) -> Option<Path> {
    if start == goal {
        return Some(Path::default());
    }

    let waypoints: Vec<_> = graph.waypoints().collect();
    let index_of: HashMap<WaypointSymbol, usize> = waypoints.iter().enumerate().map(|(i, w)| (w.symbol.clone(), i)).collect();

    let start_idx = *index_of.get(start)?;
    let goal_idx = *index_of.get(goal)?;

    let mut seq_counter: u64 = 0;
    let mut heap = BinaryHeap::new();
    let mut best_time: HashMap<StateKey, (u32, u64)> = HashMap::new();
    let mut fuel_at: HashMap<StateKey, i32> = HashMap::new();
    let mut came_from: HashMap<StateKey, Pred> = HashMap::new();

    let start_key = StateKey { waypoint: start_idx, fuel_bucket: current_fuel / FUEL_BUCKET_SIZE };
    fuel_at.insert(start_key, current_fuel);
    best_time.insert(start_key, (0, 0));
    came_from.insert(start_key, Pred::Start);
    heap.push(QueueEntry { key: start_key, time: 0, seq: 0 });

    while let Some(entry) = heap.pop() {
        let Some(&(known_time, known_seq)) = best_time.get(&entry.key) else { continue };
        if entry.time != known_time || entry.seq != known_seq {
            continue; // stale queue entry, superseded by a better one
        }

        if entry.key.waypoint == goal_idx {
            return Some(reconstruct(&waypoints, &came_from, entry.key, entry.time));
        }

        let here = waypoints[entry.key.waypoint];
        let fuel = fuel_at[&entry.key];

        if here.has_fuel() {
            let distance_to_goal = graph.distance(here, waypoints[goal_idx]);
            let below_low_water = (fuel as f64) < (fuel_capacity as f64) * REFUEL_LOW_WATER_RATIO;
            let cant_drift_to_goal = fuel < FlightMode::Drift.fuel_cost(distance_to_goal);
            if below_low_water || cant_drift_to_goal {
                let refuel_key = StateKey { waypoint: entry.key.waypoint, fuel_bucket: fuel_capacity / FUEL_BUCKET_SIZE };
                relax(
                    &mut heap,
                    &mut best_time,
                    &mut fuel_at,
                    &mut came_from,
                    &mut seq_counter,
                    entry.key,
                    refuel_key,
                    entry.time,
                    fuel_capacity,
                    Step::Refuel { at: here.symbol.clone() },
                );
            }
        }

        for (to_idx, to_wp) in waypoints.iter().enumerate() {
            if to_idx == entry.key.waypoint {
                continue;
            }
            let distance = graph.distance(here, to_wp);
            let Some(mode) = FlightMode::select_optimal(distance, fuel, SAFETY_RESERVE) else { continue };
            let fuel_cost = mode.fuel_cost(distance);
            let time = mode.travel_time(distance, engine_speed);
            let remaining_fuel = fuel - fuel_cost;
            let to_key = StateKey { waypoint: to_idx, fuel_bucket: remaining_fuel / FUEL_BUCKET_SIZE };
            relax(
                &mut heap,
                &mut best_time,
                &mut fuel_at,
                &mut came_from,
                &mut seq_counter,
                entry.key,
                to_key,
                entry.time + time,
                remaining_fuel,
                Step::Travel { to: to_wp.symbol.clone(), mode, distance, fuel_cost, time },
            );
        }
    }

    None
}

#[allow(clippy::too_many_arguments)]
fn relax(
    heap: &mut BinaryHeap<QueueEntry>,
    best_time: &mut HashMap<StateKey, (u32, u64)>,
    fuel_at: &mut HashMap<StateKey, i32>,
    came_from: &mut HashMap<StateKey, Pred>,
    seq_counter: &mut u64,
    from: StateKey,
    to: StateKey,
    new_time: u32,
    new_fuel: i32,
    step: Step,
) {
    let improves = match best_time.get(&to) {
        None => true,
        Some(&(t, _)) => new_time < t,
    };
    if !improves {
        return;
    }
    *seq_counter += 1;
    best_time.insert(to, (new_time, *seq_counter));
    fuel_at.insert(to, new_fuel);
    came_from.insert(to, Pred::From(from, step));
    heap.push(QueueEntry { key: to, time: new_time, seq: *seq_counter });
}

fn reconstruct(waypoints: &[&fleetd_domain::Waypoint], came_from: &HashMap<StateKey, Pred>, goal_key: StateKey, total_time: u32) -> Path {
    let mut steps = Vec::new();
    let mut total_fuel_cost = 0;
    let mut cursor = goal_key;
    loop {
        match &came_from[&cursor] {
            Pred::Start => break,
            Pred::From(prev, step) => {
                if let Step::Travel { fuel_cost, .. } = step {
                    total_fuel_cost += fuel_cost;
                }
                steps.push(step.clone());
                cursor = *prev;
            }
        }
    }
    steps.reverse();
    let _ = waypoints;
    Path { steps, total_fuel_cost, total_time }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::test_fixtures::{system_graph, waypoint};
    use crate::routing::RoutingGraph;

    #[test]
    fn start_equals_goal_is_a_trivial_path() {
        let a = waypoint("A", 0, 0, false);
        let graph = system_graph(vec![a.clone()]);
        let routing = RoutingGraph::new(&graph);

        let path = plan_path(&routing, &a.symbol, &a.symbol, 60, 100, 30).unwrap();

        assert!(path.steps.is_empty());
        assert_eq!(path.total_fuel_cost, 0);
        assert_eq!(path.total_time, 0);
    }

    #[test]
    fn unreachable_when_fuel_cannot_cover_even_drift_with_reserve() {
        let a = waypoint("A", 0, 0, false);
        let b = waypoint("B", 100, 0, false);
        let graph = system_graph(vec![a.clone(), b.clone()]);
        let routing = RoutingGraph::new(&graph);

        // current_fuel (2) minus reserve (4) can't clear even DRIFT's 1-unit
        // cost, and neither waypoint sells fuel.
        let path = plan_path(&routing, &a.symbol, &b.symbol, 2, 100, 30);

        assert!(path.is_none());
    }

    #[test]
    fn prefers_burn_over_drift_when_fuel_is_abundant() {
        let a = waypoint("A", 0, 0, false);
        let b = waypoint("B", 10, 0, false);
        let graph = system_graph(vec![a.clone(), b.clone()]);
        let routing = RoutingGraph::new(&graph);

        let path = plan_path(&routing, &a.symbol, &b.symbol, 100, 100, 30).unwrap();

        assert_eq!(path.steps.len(), 1);
        match &path.steps[0] {
            Step::Travel { mode, distance, fuel_cost, .. } => {
                assert_eq!(*mode, FlightMode::Burn);
                assert_eq!(*distance, 10);
                assert_eq!(*fuel_cost, 20);
            }
            other => panic!("expected a single TRAVEL step, got {other:?}"),
        }
    }

    #[test]
    fn orbital_neighbours_are_a_zero_cost_one_time_hop() {
        let mut planet = waypoint("PLANET", 0, 0, false);
        let station = waypoint("STATION", 0, 0, false);
        crate::routing::test_fixtures::orbit(&mut planet, &station);
        let graph = system_graph(vec![planet.clone(), station.clone()]);
        let routing = RoutingGraph::new(&graph);

        let path = plan_path(&routing, &planet.symbol, &station.symbol, 10, 100, 30).unwrap();

        assert_eq!(path.steps.len(), 1);
        match &path.steps[0] {
            Step::Travel { distance, fuel_cost, time, .. } => {
                assert_eq!(*distance, 0);
                assert_eq!(*fuel_cost, 0);
                assert_eq!(*time, 1);
            }
            other => panic!("expected a single TRAVEL step, got {other:?}"),
        }
    }
}
