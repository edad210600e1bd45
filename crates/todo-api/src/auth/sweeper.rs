//! Periodic removal of expired and revoked sessions.
//!
//! Runs on a fixed `tokio::time::interval` until cancelled. Sweeping is
//! housekeeping only: lookups already ignore expired sessions.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::service::AuthService;
use crate::audit::{audit_log, AuditEvent};

/// Run the session sweep loop until `cancel` is triggered.
pub async fn run(auth: AuthService, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Session sweeper started");

    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately; skip it so startup stays quiet.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                match auth.sweep_expired_sessions().await {
                    Ok(0) => tracing::debug!("Session sweep: nothing to remove"),
                    Ok(removed) => audit_log(&AuditEvent::SessionSweep { removed }),
                    Err(e) => tracing::error!(error = %e, "Session sweep failed"),
                }
            }
        }
    }
}

/// Spawn the sweep loop on the current runtime
pub fn spawn(auth: AuthService, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run(auth, every, cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtConfig;
    use crate::auth::password::PasswordConfig;

    #[tokio::test]
    async fn test_sweeper_stops_on_cancel() {
        let auth = AuthService::in_memory(JwtConfig::default(), PasswordConfig::low_cost());
        let cancel = CancellationToken::new();

        let handle = spawn(auth, Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(35)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
