use crate::store::Store;

/// End active sessions that have been idle past the configured limit.
pub async fn run(store: &Store, max_idle_secs: i64) {
    tracing::debug!("session_cleanup: start");
    match store.end_idle_sessions(max_idle_secs) {
        Ok(count) => tracing::info!(closed = count, "session_cleanup: done"),
        Err(e) => tracing::error!(error = %e, "session_cleanup failed"),
    }
}
