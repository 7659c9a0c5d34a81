use std::fmt::Debug;
use std::time::Instant;

use fleetd_domain::Validatable;
use tracing::{error, info};

use crate::errors::{CoreError, CoreResult};

/// Runs first in the pipeline (outermost): records that a command started,
/// and on return logs either its duration or the error that ended it.
pub fn log_start(command_name: &str, command: &impl Debug) -> Instant {
    info!(command = command_name, ?command, "dispatching command");
    Instant::now()
}

pub fn log_outcome<T: Debug>(command_name: &str, started: Instant, result: &CoreResult<T>) {
    let elapsed = started.elapsed();
    match result {
        Ok(output) => info!(command = command_name, ?elapsed, ?output, "command completed"),
        Err(err) => error!(command = command_name, ?elapsed, %err, "command failed"),
    }
}

/// Runs just inside logging: rejects the command before the handler ever
/// sees it if the command's own `validate` reports a problem.
pub fn validate<C: Validatable>(command: &C) -> CoreResult<()> {
    command.validate().map_err(CoreError::Validation)
}
