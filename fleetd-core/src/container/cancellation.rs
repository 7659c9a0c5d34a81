use tokio_util::sync::CancellationToken;

tokio::task_local! {
    /// Scoped over a container's entire `run()` call by `CommandContainer`
    /// (§3). Fleet handlers that loop internally (scout tours, batch
    /// contracts) read it instead of taking a token in their constructor,
    /// since the mediator registers one handler instance for every
    /// container that ever dispatches that command, not one per run.
    static CONTAINER_CANCEL: CancellationToken;
}

/// Runs `fut` with `token` available to [`is_cancelled`] and [`cancelled`]
/// for its duration.
pub async fn scope<F: std::future::Future>(token: CancellationToken, fut: F) -> F::Output {
    CONTAINER_CANCEL.scope(token, fut).await
}

/// `false` outside a container's `run()` call, so handlers behave the same
/// in unit tests that dispatch them directly through a bare `Mediator`.
pub fn is_cancelled() -> bool {
    CONTAINER_CANCEL.try_with(|t| t.is_cancelled()).unwrap_or(false)
}

/// Resolves when the enclosing container is cancelled; never resolves if
/// called outside one.
pub async fn cancelled() {
    match CONTAINER_CANCEL.try_with(|t| t.clone()) {
        Ok(token) => token.cancelled().await,
        Err(_) => std::future::pending().await,
    }
}
