use crate::services::registry::UploadRegistry;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodically reports upload sessions that have stayed open too long.
///
/// Reporting only: stale sessions are logged, never closed.
pub struct SessionMonitor {
    registry: Arc<UploadRegistry>,
    max_age: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl SessionMonitor {
    pub fn new(
        registry: Arc<UploadRegistry>,
        max_age: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            max_age,
            interval: max_age.max(Duration::from_secs(1)),
            shutdown,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Session monitor started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Session monitor shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.report().await;
                }
            }
        }
    }

    /// Logs every stale session and returns how many were found.
    pub async fn report(&self) -> usize {
        let stale = self.registry.stale_sessions(self.max_age).await;

        for (identifier, created_at) in &stale {
            tracing::warn!(
                "upload session {} open since {}, older than {:?}",
                identifier,
                created_at,
                self.max_age
            );
        }

        stale.len()
    }
}
