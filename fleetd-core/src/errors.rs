use thiserror::Error;

/// Errors from the game API client, distinguishing the handful of cases
/// fleet handlers actually branch on from the generic "request failed" case.
#[derive(Debug, Error)]
pub enum GameApiError {
    #[error("agent already has an active contract")]
    ContractAlreadyActive,

    #[error("request to the game api failed: {0}")]
    Other(#[from] anyhow::Error),
}

impl GameApiError {
    /// The game API reports this error shape on failure:
    /// `{"error": {"code": 4511, "message": "..."}}`. Code 4511 is the one
    /// case callers need to distinguish from a generic failure (§6.1); this
    /// inspects the body as a last resort after the status-based `bail!` in
    /// `StClient::make_api_call` has already produced a plain anyhow error.
    pub fn from_response_body(body: &str, fallback: anyhow::Error) -> Self {
        #[derive(serde::Deserialize)]
        struct ErrorEnvelope {
            error: ErrorDetail,
        }
        #[derive(serde::Deserialize)]
        struct ErrorDetail {
            code: i64,
        }

        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) if envelope.error.code == 4511 => GameApiError::ContractAlreadyActive,
            _ => GameApiError::Other(fallback),
        }
    }
}

/// Errors surfaced by the mediator, containers, and fleet handlers.
///
/// Storage and remote-API failures are wrapped rather than matched on, since
/// callers only ever need to know "this command failed" plus a message to
/// log; `Programmer` marks states that invariants should have prevented.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("ship {ship_symbol} is already assigned to another container")]
    AssignmentConflict { ship_symbol: String },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("remote api error: {0}")]
    RemoteApi(#[from] GameApiError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("programmer error: {0}")]
    Programmer(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
