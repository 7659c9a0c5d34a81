use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{ConnectOptions, Pool, Postgres};
use tracing::log::LevelFilter;
use tracing::{event, Level};

use fleetd_domain::{
    AssignmentStatus, Container, ContainerId, ContainerLog, ContainerStatus, ContainerType, Contract, LogLevel, MarketData, PlayerId, ShipAssignment,
    ShipSymbol, Shipyard, SystemGraph, SystemSymbol,
};

#[derive(Clone)]
pub struct PgConnectionString(pub String);

pub async fn get_pg_connection_pool(connection_string: PgConnectionString) -> Result<Pool<Postgres>> {
    let database_connection_options: PgConnectOptions = connection_string
        .0
        .parse::<PgConnectOptions>()?
        .log_slow_statements(LevelFilter::Warn, Duration::from_secs(60));

    let pg_connection_pool: Pool<Postgres> = PgPoolOptions::new().max_connections(5).connect_with(database_connection_options).await?;

    Ok(pg_connection_pool)
}

/// Runs pending migrations against a fresh or existing database. The core
/// owns no schema beyond §3's entities (containers, assignments, graph cache,
/// plus the market/shipyard/contract caches the application handlers read
/// and write) — there is no reset-date archiving to do here, unlike the
/// teacher's season-aware bootstrap, because the core treats the remote
/// game's own reset semantics as an external-API concern (§1: out of scope).
pub async fn prepare_database_schema(connection_string: PgConnectionString) -> Result<Pool<Postgres>> {
    let pool = get_pg_connection_pool(connection_string).await?;
    perform_migration(&pool).await?;
    Ok(pool)
}

async fn perform_migration(pool: &Pool<Postgres>) -> Result<()> {
    event!(Level::INFO, "Migrating database if necessary");
    sqlx::migrate!().run(pool).await?;
    event!(Level::INFO, "Done migrating database");
    Ok(())
}

// --- containers -------------------------------------------------------

#[derive(sqlx::FromRow)]
struct DbContainerRow {
    id: uuid::Uuid,
    player_id: String,
    container_type: String,
    spec: Json<fleetd_domain::ContainerSpec>,
    status: String,
    restart_count: i32,
    started_at: DateTime<Utc>,
    stopped_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    exit_reason: Option<String>,
}

impl DbContainerRow {
    fn into_domain(self) -> Result<Container> {
        Ok(Container {
            id: ContainerId(self.id),
            player_id: PlayerId(self.player_id),
            container_type: parse_container_type(&self.container_type)?,
            spec: self.spec.0,
            status: parse_container_status(&self.status)?,
            restart_count: self.restart_count as u32,
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            exit_code: self.exit_code,
            exit_reason: self.exit_reason,
        })
    }

    fn from_domain(c: &Container) -> Self {
        Self {
            id: c.id.0,
            player_id: c.player_id.0.clone(),
            container_type: container_type_str(c.container_type).to_string(),
            spec: Json(c.spec.clone()),
            status: container_status_str(c.status).to_string(),
            restart_count: c.restart_count as i32,
            started_at: c.started_at,
            stopped_at: c.stopped_at,
            exit_code: c.exit_code,
            exit_reason: c.exit_reason.clone(),
        }
    }
}

fn container_type_str(t: ContainerType) -> &'static str {
    match t {
        ContainerType::Command => "command",
    }
}

fn parse_container_type(s: &str) -> Result<ContainerType> {
    match s {
        "command" => Ok(ContainerType::Command),
        other => Err(anyhow!("unknown container_type '{other}'")),
    }
}

fn container_status_str(s: ContainerStatus) -> &'static str {
    match s {
        ContainerStatus::Starting => "STARTING",
        ContainerStatus::Running => "RUNNING",
        ContainerStatus::Stopped => "STOPPED",
        ContainerStatus::Failed => "FAILED",
    }
}

fn parse_container_status(s: &str) -> Result<ContainerStatus> {
    match s {
        "STARTING" => Ok(ContainerStatus::Starting),
        "RUNNING" => Ok(ContainerStatus::Running),
        "STOPPED" => Ok(ContainerStatus::Stopped),
        "FAILED" => Ok(ContainerStatus::Failed),
        other => Err(anyhow!("unknown container status '{other}'")),
    }
}

pub async fn insert_container(pool: &Pool<Postgres>, container: &Container) -> Result<()> {
    let row = DbContainerRow::from_domain(container);
    sqlx::query(
        r#"
insert into containers (id, player_id, container_type, spec, status, restart_count, started_at, stopped_at, exit_code, exit_reason)
values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#,
    )
    .bind(row.id)
    .bind(row.player_id)
    .bind(row.container_type)
    .bind(row.spec)
    .bind(row.status)
    .bind(row.restart_count)
    .bind(row.started_at)
    .bind(row.stopped_at)
    .bind(row.exit_code)
    .bind(row.exit_reason)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_container(pool: &Pool<Postgres>, container: &Container) -> Result<()> {
    let row = DbContainerRow::from_domain(container);
    sqlx::query(
        r#"
update containers
   set status = $2, restart_count = $3, stopped_at = $4, exit_code = $5, exit_reason = $6
 where id = $1
"#,
    )
    .bind(row.id)
    .bind(row.status)
    .bind(row.restart_count)
    .bind(row.stopped_at)
    .bind(row.exit_code)
    .bind(row.exit_reason)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn select_container(pool: &Pool<Postgres>, id: &ContainerId) -> Result<Option<Container>> {
    let row: Option<DbContainerRow> = sqlx::query_as(
        r#"
select id, player_id, container_type, spec, status, restart_count, started_at, stopped_at, exit_code, exit_reason
  from containers
 where id = $1
"#,
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?;

    row.map(DbContainerRow::into_domain).transpose()
}

/// Looser row shape for batch reads: `spec` stays an untyped JSON blob so one
/// row with an unparseable command spec can't fail the whole `fetch_all`.
#[derive(sqlx::FromRow)]
struct DbContainerRowRaw {
    id: uuid::Uuid,
    player_id: String,
    container_type: String,
    spec: Json<serde_json::Value>,
    status: String,
    restart_count: i32,
    started_at: DateTime<Utc>,
    stopped_at: Option<DateTime<Utc>>,
    exit_code: Option<i32>,
    exit_reason: Option<String>,
}

impl DbContainerRowRaw {
    fn try_into_domain(self) -> Result<Container> {
        let spec: fleetd_domain::ContainerSpec = serde_json::from_value(self.spec.0)?;
        Ok(Container {
            id: ContainerId(self.id),
            player_id: PlayerId(self.player_id),
            container_type: parse_container_type(&self.container_type)?,
            spec,
            status: parse_container_status(&self.status)?,
            restart_count: self.restart_count as u32,
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            exit_code: self.exit_code,
            exit_reason: self.exit_reason,
        })
    }
}

pub async fn select_containers(pool: &Pool<Postgres>, player_id: Option<&PlayerId>, status: Option<ContainerStatus>) -> Result<Vec<Container>> {
    let rows: Vec<DbContainerRowRaw> = sqlx::query_as(
        r#"
select id, player_id, container_type, spec, status, restart_count, started_at, stopped_at, exit_code, exit_reason
  from containers
 where ($1::text is null or player_id = $1)
   and ($2::text is null or status = $2)
"#,
    )
    .bind(player_id.map(|p| p.0.clone()))
    .bind(status.map(container_status_str))
    .fetch_all(pool)
    .await?;

    let mut containers = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id;
        match row.try_into_domain() {
            Ok(container) => containers.push(container),
            Err(e) => tracing::warn!(container_id = %id, error = %e, "skipping a container row with an unparseable spec"),
        }
    }
    Ok(containers)
}

/// Ids of non-terminal containers whose `spec` doesn't parse as a
/// `ContainerSpec`, for `ContainerBmcTrait::list_malformed_container_ids`.
pub async fn select_malformed_container_ids(pool: &Pool<Postgres>) -> Result<Vec<ContainerId>> {
    let rows: Vec<(uuid::Uuid, Json<serde_json::Value>)> = sqlx::query_as(
        r#"
select id, spec
  from containers
 where status in ('STARTING', 'RUNNING')
"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(id, spec)| serde_json::from_value::<fleetd_domain::ContainerSpec>(spec.0).err().map(|_| ContainerId(id)))
        .collect())
}

/// Fails a container by id without reading its spec back, for rows
/// `select_containers` already had to skip.
pub async fn mark_container_failed(pool: &Pool<Postgres>, id: &ContainerId, exit_code: i32, exit_reason: &str, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
update containers
   set status = 'FAILED', exit_code = $2, exit_reason = $3, stopped_at = $4
 where id = $1
"#,
    )
    .bind(id.0)
    .bind(exit_code)
    .bind(exit_reason)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_container(pool: &Pool<Postgres>, id: &ContainerId) -> Result<()> {
    sqlx::query("delete from containers where id = $1").bind(id.0).execute(pool).await?;
    Ok(())
}

pub async fn insert_container_log(pool: &Pool<Postgres>, log: &ContainerLog) -> Result<()> {
    sqlx::query(
        r#"
insert into container_logs (container_id, player_id, level, message, recorded_at)
values ($1, $2, $3, $4, $5)
"#,
    )
    .bind(log.container_id.0)
    .bind(log.player_id.0.clone())
    .bind(log_level_str(log.level))
    .bind(log.message.clone())
    .bind(log.recorded_at)
    .execute(pool)
    .await?;
    Ok(())
}

fn log_level_str(l: LogLevel) -> &'static str {
    match l {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

fn parse_log_level(s: &str) -> LogLevel {
    match s {
        "debug" => LogLevel::Debug,
        "warn" => LogLevel::Warn,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

#[derive(sqlx::FromRow)]
struct DbLogRow {
    container_id: uuid::Uuid,
    player_id: String,
    level: String,
    message: String,
    recorded_at: DateTime<Utc>,
}

pub async fn select_container_logs(
    pool: &Pool<Postgres>,
    id: &ContainerId,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    level: Option<LogLevel>,
    limit: u32,
) -> Result<Vec<ContainerLog>> {
    let rows: Vec<DbLogRow> = sqlx::query_as(
        r#"
select container_id, player_id, level, message, recorded_at
  from container_logs
 where container_id = $1
   and ($2::timestamptz is null or recorded_at >= $2)
   and ($3::timestamptz is null or recorded_at <= $3)
   and ($4::text is null or level = $4)
 order by recorded_at asc
 limit $5
"#,
    )
    .bind(id.0)
    .bind(since)
    .bind(until)
    .bind(level.map(log_level_str))
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| ContainerLog {
            container_id: ContainerId(r.container_id),
            player_id: PlayerId(r.player_id),
            level: parse_log_level(&r.level),
            message: r.message,
            recorded_at: r.recorded_at,
        })
        .collect())
}

// --- ship assignments ---------------------------------------------------

fn assignment_status_str(s: AssignmentStatus) -> &'static str {
    match s {
        AssignmentStatus::Active => "active",
        AssignmentStatus::Idle => "idle",
    }
}

fn parse_assignment_status(s: &str) -> AssignmentStatus {
    match s {
        "active" => AssignmentStatus::Active,
        _ => AssignmentStatus::Idle,
    }
}

#[derive(sqlx::FromRow)]
struct DbAssignmentRow {
    player_id: String,
    ship_symbol: String,
    status: String,
    container_id: uuid::Uuid,
    operation: String,
    assigned_at: DateTime<Utc>,
    released_at: Option<DateTime<Utc>>,
    release_reason: Option<String>,
}

impl DbAssignmentRow {
    fn into_domain(self) -> ShipAssignment {
        ShipAssignment {
            player_id: PlayerId(self.player_id),
            ship_symbol: ShipSymbol(self.ship_symbol),
            status: parse_assignment_status(&self.status),
            container_id: ContainerId(self.container_id),
            operation: self.operation,
            assigned_at: self.assigned_at,
            released_at: self.released_at,
            release_reason: self.release_reason,
        }
    }
}

/// Atomic assign: inserts a fresh row, or flips an idle row to active. A row
/// that is already active is left untouched and `rows_affected() == 0` tells
/// the caller the assignment failed (§4.2).
pub async fn assign_ship(pool: &Pool<Postgres>, player_id: &PlayerId, ship_symbol: &ShipSymbol, container_id: &ContainerId, operation: &str, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        r#"
insert into ship_assignments (player_id, ship_symbol, status, container_id, operation, assigned_at, released_at, release_reason)
values ($1, $2, 'active', $3, $4, $5, null, null)
on conflict (player_id, ship_symbol) do update
   set status = 'active', container_id = excluded.container_id, operation = excluded.operation,
       assigned_at = excluded.assigned_at, released_at = null, release_reason = null
 where ship_assignments.status = 'idle'
"#,
    )
    .bind(&player_id.0)
    .bind(&ship_symbol.0)
    .bind(container_id.0)
    .bind(operation)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Atomic reassign: only succeeds if the row is currently active and held by
/// `old_container_id` (§4.2).
pub async fn reassign_ship(pool: &Pool<Postgres>, player_id: &PlayerId, ship_symbol: &ShipSymbol, old_container_id: &ContainerId, new_container_id: &ContainerId, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        r#"
update ship_assignments
   set container_id = $4, assigned_at = $5
 where player_id = $1 and ship_symbol = $2 and container_id = $3 and status = 'active'
"#,
    )
    .bind(&player_id.0)
    .bind(&ship_symbol.0)
    .bind(old_container_id.0)
    .bind(new_container_id.0)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Unconditional release; a no-op if no row exists (§4.2).
pub async fn release_ship(pool: &Pool<Postgres>, player_id: &PlayerId, ship_symbol: &ShipSymbol, reason: &str, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
update ship_assignments
   set status = 'idle', released_at = $3, release_reason = $4
 where player_id = $1 and ship_symbol = $2
"#,
    )
    .bind(&player_id.0)
    .bind(&ship_symbol.0)
    .bind(now)
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn select_assignment(pool: &Pool<Postgres>, player_id: &PlayerId, ship_symbol: &ShipSymbol) -> Result<Option<ShipAssignment>> {
    let row: Option<DbAssignmentRow> = sqlx::query_as(
        r#"
select player_id, ship_symbol, status, container_id, operation, assigned_at, released_at, release_reason
  from ship_assignments
 where player_id = $1 and ship_symbol = $2
"#,
    )
    .bind(&player_id.0)
    .bind(&ship_symbol.0)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(DbAssignmentRow::into_domain))
}

pub async fn select_all_assignments(pool: &Pool<Postgres>) -> Result<Vec<ShipAssignment>> {
    let rows: Vec<DbAssignmentRow> = sqlx::query_as(
        r#"
select player_id, ship_symbol, status, container_id, operation, assigned_at, released_at, release_reason
  from ship_assignments
"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(DbAssignmentRow::into_domain).collect())
}

/// Bulk-releases every active row; returns the count released (§4.2).
pub async fn release_all_active_assignments(pool: &Pool<Postgres>, reason: &str, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        r#"
update ship_assignments
   set status = 'idle', released_at = $1, release_reason = $2
 where status = 'active'
"#,
    )
    .bind(now)
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

// --- system graph cache --------------------------------------------------

#[derive(sqlx::FromRow)]
struct DbGraphRow {
    system_symbol: String,
    waypoints: Json<Vec<fleetd_domain::Waypoint>>,
    fetched_at: DateTime<Utc>,
}

pub async fn select_system_graph(pool: &Pool<Postgres>, system_symbol: &SystemSymbol) -> Result<Option<SystemGraph>> {
    let row: Option<DbGraphRow> = sqlx::query_as(
        r#"
select system_symbol, waypoints, fetched_at
  from system_graphs
 where system_symbol = $1
"#,
    )
    .bind(&system_symbol.0)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| SystemGraph {
        system_symbol: SystemSymbol(r.system_symbol),
        waypoints: r.waypoints.0,
        fetched_at: r.fetched_at,
    }))
}

pub async fn upsert_system_graph(pool: &Pool<Postgres>, graph: &SystemGraph) -> Result<()> {
    sqlx::query(
        r#"
insert into system_graphs (system_symbol, waypoints, fetched_at)
values ($1, $2, $3)
on conflict (system_symbol) do update set waypoints = excluded.waypoints, fetched_at = excluded.fetched_at
"#,
    )
    .bind(&graph.system_symbol.0)
    .bind(Json(&graph.waypoints))
    .bind(graph.fetched_at)
    .execute(pool)
    .await?;
    Ok(())
}

// --- markets ---------------------------------------------------------

#[derive(Clone, Debug, sqlx::FromRow, serde::Serialize, serde::Deserialize)]
pub struct DbMarketEntry {
    pub waypoint_symbol: String,
    pub entry: Json<MarketData>,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_market_data(pool: &Pool<Postgres>, market_entries: Vec<MarketData>, now: DateTime<Utc>) -> Result<()> {
    for me in market_entries {
        sqlx::query("insert into markets (waypoint_symbol, entry, created_at) values ($1, $2, $3)")
            .bind(me.symbol.0.clone())
            .bind(Json(me))
            .bind(now)
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn select_latest_market_data_for_system(pool: &Pool<Postgres>, system_symbol: &SystemSymbol) -> Result<Vec<MarketData>> {
    let waypoint_symbol_pattern = format!("{}%", system_symbol.0);

    let rows: Vec<DbMarketEntry> = sqlx::query_as(
        r#"
select distinct on (waypoint_symbol) waypoint_symbol, entry, created_at
  from markets
 where waypoint_symbol like $1
 order by waypoint_symbol, created_at desc
"#,
    )
    .bind(waypoint_symbol_pattern)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.entry.0).collect_vec())
}

// --- shipyards ---------------------------------------------------------

#[derive(Clone, Debug, sqlx::FromRow, serde::Serialize, serde::Deserialize)]
pub struct DbShipyardData {
    pub system_symbol: String,
    pub waypoint_symbol: String,
    pub entry: Json<Shipyard>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn insert_shipyards(pool: &Pool<Postgres>, shipyards: Vec<Shipyard>, now: DateTime<Utc>) -> Result<()> {
    for shipyard in shipyards {
        sqlx::query(
            r#"
insert into shipyards (system_symbol, waypoint_symbol, entry, created_at, updated_at)
values ($1, $2, $3, $4, $5)
on conflict (waypoint_symbol) do update set entry = excluded.entry, updated_at = excluded.updated_at
"#,
        )
        .bind(shipyard.symbol.system_symbol().0)
        .bind(shipyard.symbol.0.clone())
        .bind(Json(shipyard))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn select_latest_shipyard_entry_of_system(pool: &Pool<Postgres>, system_symbol: &SystemSymbol) -> Result<Vec<DbShipyardData>> {
    let rows: Vec<DbShipyardData> = sqlx::query_as(
        r#"
select system_symbol, waypoint_symbol, entry, created_at, updated_at
  from shipyards
 where system_symbol = $1
"#,
    )
    .bind(&system_symbol.0)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// --- contracts ---------------------------------------------------------

#[derive(sqlx::FromRow)]
struct DbContractRow {
    system_symbol: String,
    contract_id: String,
    entry: Json<Contract>,
    created_at: DateTime<Utc>,
}

pub async fn upsert_contract(pool: &Pool<Postgres>, system_symbol: &SystemSymbol, contract: &Contract, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
insert into contracts (system_symbol, contract_id, entry, created_at)
values ($1, $2, $3, $4)
on conflict (contract_id) do update set entry = excluded.entry
"#,
    )
    .bind(&system_symbol.0)
    .bind(contract.id.0.clone())
    .bind(Json(contract.clone()))
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_youngest_contract(pool: &Pool<Postgres>, system_symbol: &SystemSymbol) -> Result<Option<Contract>> {
    let row: Option<DbContractRow> = sqlx::query_as(
        r#"
select system_symbol, contract_id, entry, created_at
  from contracts
 where system_symbol = $1
 order by created_at desc
 limit 1
"#,
    )
    .bind(&system_symbol.0)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.entry.0))
}
