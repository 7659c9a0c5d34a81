//! Minimal builders for the nested game-API response types, shared by
//! `fleetd-core`'s handler tests so they don't each hand-roll a full `Ship`.
//! Gated behind `test-utils` rather than always compiled in, matching how
//! the rest of the workspace keeps fixture code out of release builds.

use chrono::Utc;
use ordered_float::OrderedFloat;

use crate::{
    ActivityLevel, Cargo, Cooldown, Crew, DockShipResponse, Engine, FactionSymbol, Frame, Fuel, FuelConsumed, NavOnlyResponse, NavRouteWaypoint, NavStatus, Reactor, Registration,
    Requirements, Route, Ship, ShipFrameSymbol, ShipRegistrationRole, ShipSymbol, ShipType, Shipyard, ShipyardShip, ShipyardShipCrew, SupplyLevel, SystemSymbol, WaypointSymbol, WaypointType,
};
use crate::st_model::{FlightMode, Nav};

fn waypoint(symbol: &WaypointSymbol, system: &SystemSymbol) -> NavRouteWaypoint {
    NavRouteWaypoint { symbol: symbol.clone(), waypoint_type: WaypointType::PLANET, system_symbol: system.clone(), x: 0, y: 0 }
}

fn nav_at(waypoint_symbol: &WaypointSymbol, system_symbol: &SystemSymbol, status: NavStatus) -> Nav {
    let now = Utc::now();
    let here = waypoint(waypoint_symbol, system_symbol);
    Nav { system_symbol: system_symbol.clone(), waypoint_symbol: waypoint_symbol.clone(), route: Route { destination: here.clone(), origin: here, departure_time: now, arrival: now }, status, flight_mode: FlightMode::Cruise }
}

/// A `dock_ship` response landing the ship at `waypoint_symbol`, docked.
pub fn dock_response(system: &str, waypoint_symbol: &str) -> DockShipResponse {
    let nav = nav_at(&WaypointSymbol(waypoint_symbol.to_string()), &SystemSymbol(system.to_string()), NavStatus::Docked);
    DockShipResponse { data: NavOnlyResponse { nav } }
}

/// A shipyard publishing detailed prices with a single listing for
/// `ship_type` at `price`.
pub fn shipyard_with_listing(waypoint_symbol: &str, ship_type: ShipType, price: u32) -> Shipyard {
    let requirements = Requirements { power: None, crew: None, slots: None };
    let listing = ShipyardShip {
        name: "Listing".to_string(),
        r#type: ship_type,
        description: String::new(),
        supply: SupplyLevel::Abundant,
        activity: ActivityLevel::Strong,
        purchase_price: price,
        frame: Frame {
            symbol: ShipFrameSymbol::FRAME_PROBE,
            name: "Frame".to_string(),
            description: String::new(),
            condition: OrderedFloat(1.0),
            integrity: OrderedFloat(1.0),
            module_slots: 0,
            mounting_points: 0,
            fuel_capacity: 100,
            requirements: requirements.clone(),
        },
        reactor: Reactor {
            symbol: "REACTOR".to_string(),
            name: "Reactor".to_string(),
            description: String::new(),
            condition: OrderedFloat(1.0),
            integrity: OrderedFloat(1.0),
            power_output: 0,
            requirements: requirements.clone(),
        },
        engine: Engine {
            symbol: "ENGINE".to_string(),
            name: "Engine".to_string(),
            description: String::new(),
            condition: OrderedFloat(1.0),
            integrity: OrderedFloat(1.0),
            speed: 30,
            requirements: requirements.clone(),
        },
        modules: Vec::new(),
        mounts: Vec::new(),
        crew: ShipyardShipCrew { required: 0, capacity: 0 },
    };

    Shipyard { symbol: WaypointSymbol(waypoint_symbol.to_string()), ship_types: Vec::new(), transactions: None, ships: Some(vec![listing]), modifications_fee: 0 }
}

/// A docked ship at `waypoint`, full fuel tank of `fuel_capacity`, 30-speed
/// engine. Good enough for handler tests that care about nav/fuel and don't
/// touch cargo, crew, or mounts.
pub fn ship_at(symbol: &str, system: &str, waypoint_symbol: &str, fuel_capacity: i32) -> Ship {
    let symbol = ShipSymbol(symbol.to_string());
    let system_symbol = SystemSymbol(system.to_string());
    let waypoint_symbol = WaypointSymbol(waypoint_symbol.to_string());
    let now = Utc::now();
    let nav = nav_at(&waypoint_symbol, &system_symbol, NavStatus::Docked);

    Ship {
        symbol: symbol.clone(),
        registration: Registration { name: symbol.0.clone(), faction_symbol: FactionSymbol::COSMIC, role: ShipRegistrationRole::Command },
        nav,
        crew: Crew { current: 0, required: 0, capacity: 0, rotation: "STRICT".to_string(), morale: 100, wages: 0 },
        frame: Frame {
            symbol: ShipFrameSymbol::FRAME_PROBE,
            name: "Frame".to_string(),
            description: String::new(),
            condition: OrderedFloat(1.0),
            integrity: OrderedFloat(1.0),
            module_slots: 0,
            mounting_points: 0,
            fuel_capacity,
            requirements: Requirements { power: None, crew: None, slots: None },
        },
        reactor: Reactor {
            symbol: "REACTOR".to_string(),
            name: "Reactor".to_string(),
            description: String::new(),
            condition: OrderedFloat(1.0),
            integrity: OrderedFloat(1.0),
            power_output: 0,
            requirements: Requirements { power: None, crew: None, slots: None },
        },
        engine: Engine {
            symbol: "ENGINE".to_string(),
            name: "Engine".to_string(),
            description: String::new(),
            condition: OrderedFloat(1.0),
            integrity: OrderedFloat(1.0),
            speed: 30,
            requirements: Requirements { power: None, crew: None, slots: None },
        },
        cooldown: Cooldown { ship_symbol: symbol, total_seconds: 0, remaining_seconds: 0, expiration: None },
        modules: Vec::new(),
        mounts: Vec::new(),
        cargo: Cargo { capacity: 0, units: 0, inventory: Vec::new() },
        fuel: Fuel { current: fuel_capacity, capacity: fuel_capacity, consumed: FuelConsumed { amount: 0, timestamp: now } },
    }
}
