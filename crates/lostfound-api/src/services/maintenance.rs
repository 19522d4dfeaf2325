//! Periodic cleanup of expired login codes and sessions.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use lostfound_db::{log_pool_metrics, Database, Stores};

/// Counts removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub otps: u64,
    pub sessions: u64,
}

/// Remove expired OTPs and sessions once. Failures are logged and counted as
/// zero so the next sweep can retry.
pub async fn sweep(stores: &Stores) -> SweepReport {
    let otps = match stores.otps.purge_expired(Utc::now()).await {
        Ok(n) => n,
        Err(e) => {
            error!(subsystem = "api", component = "maintenance", error = %e, "OTP purge failed");
            0
        }
    };
    let sessions = match stores.sessions.purge_expired().await {
        Ok(n) => n,
        Err(e) => {
            error!(subsystem = "api", component = "maintenance", error = %e, "Session purge failed");
            0
        }
    };

    let report = SweepReport { otps, sessions };
    if otps + sessions > 0 {
        info!(
            subsystem = "api",
            component = "maintenance",
            otps,
            sessions,
            "Expired credentials purged"
        );
    } else {
        debug!(subsystem = "api", component = "maintenance", "Nothing to purge");
    }
    report
}

/// Run [`sweep`] every `interval` until the runtime shuts down. With the
/// PostgreSQL backend, pool occupancy is logged after each sweep.
pub fn spawn(stores: Stores, db: Option<Database>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep(&stores).await;
            if let Some(db) = &db {
                log_pool_metrics(&db.pool);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lostfound_core::SessionRole;

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let stores = Stores::in_memory();
        stores
            .otps
            .replace("old@x.edu", "hash", Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();
        stores
            .otps
            .replace("new@x.edu", "hash", Utc::now() + chrono::Duration::minutes(5))
            .await
            .unwrap();
        stores
            .sessions
            .create(SessionRole::Admin, "admin", chrono::Duration::seconds(-1))
            .await
            .unwrap();
        let (live, _) = stores
            .sessions
            .create(SessionRole::Admin, "admin", chrono::Duration::hours(1))
            .await
            .unwrap();

        let report = sweep(&stores).await;
        assert_eq!(report, SweepReport { otps: 1, sessions: 1 });
        assert!(stores.sessions.validate(&live).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_sweeps_on_each_tick() {
        let stores = Stores::in_memory();
        stores
            .otps
            .replace("old@x.edu", "hash", Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();

        let handle = spawn(stores.clone(), None, Duration::from_secs(60));
        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sweep(&stores).await, SweepReport::default());
        handle.abort();
    }
}
