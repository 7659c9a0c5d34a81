use clap::Parser;

/// Bootstrap configuration for the daemon process. Every field is settable
/// by flag or environment variable (`clap`'s `env()`, the way the teacher's
/// `Cli` does it), since the daemon is normally started from a unit file or
/// container entrypoint rather than a shell.
#[derive(Clone, Debug, Parser)]
#[command(name = "fleetd", version, about = "Autonomous fleet orchestration daemon", long_about = None)]
pub struct DaemonConfig {
    #[arg(long, env("DATABASE_URL"))]
    pub database_url: String,

    #[arg(long, env("SPACETRADERS_ACCOUNT_TOKEN"))]
    pub spacetraders_account_token: String,

    #[arg(long, env("SPACETRADERS_API_BASE_URL"), default_value = "https://api.spacetraders.io/v2/")]
    pub spacetraders_api_base_url: String,

    /// Unix domain socket the IPC listener binds to.
    #[arg(long, env("FLEETD_SOCKET_PATH"), default_value = "/run/fleetd/fleetd.sock")]
    pub socket_path: String,
}
