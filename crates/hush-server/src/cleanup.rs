use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use hush_auth::Clock;
use hush_db::CredentialStore;

/// Background task that nulls out expired passcodes and reset tokens.
///
/// Expired credentials already fail verification; this only keeps them from
/// lingering in storage.
pub async fn run_cleanup_loop(
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    interval_secs: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        let store = store.clone();
        let now = clock.now();
        match tokio::task::spawn_blocking(move || store.clear_expired_credentials(now)).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Cleanup: cleared {} expired credentials", count);
                }
            }
            Ok(Err(e)) => warn!("Cleanup error: {:#}", e),
            Err(e) => warn!("Cleanup task failed: {}", e),
        }
    }
}
