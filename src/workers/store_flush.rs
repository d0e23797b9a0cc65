use crate::store::Store;

/// Flush sled to disk so a crash loses at most one interval of writes.
pub async fn run(store: &Store) {
    match store.flush() {
        Ok(()) => tracing::debug!("store_flush: done"),
        Err(e) => tracing::error!(error = %e, "store_flush failed"),
    }
}
