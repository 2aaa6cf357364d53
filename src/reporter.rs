//! Background status reporting.
//!
//! Periodically logs the state of the live metadata document and the refresh
//! scheduler.

use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::metadata::{MetadataError, MetadataParser, ReloadingMetadataProvider};

/// Default status report interval in seconds.
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 300; // 5 minutes

/// Spawn a background task that periodically logs provider status.
///
/// Returns a `JoinHandle` that can be used to abort the task. The task also
/// ends on its own once the provider has been stopped.
pub fn spawn_status_reporter<P: MetadataParser>(
    provider: ReloadingMetadataProvider<P>,
    report_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(report_interval);

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let status = provider.status();

            match provider.get() {
                Ok(cached) => {
                    info!(
                        url = %cached.source_identifier(),
                        fetched_at = %cached.fetched_at(),
                        expires_at = %cached.expires_at(),
                        state = ?status.state,
                        consecutive_failures = status.consecutive_failures,
                        "Metadata status"
                    );
                }
                Err(MetadataError::Stopped) => {
                    debug!("Metadata provider stopped, status reporter exiting");
                    break;
                }
                Err(e) => {
                    warn!(
                        url = %provider.source_identifier(),
                        error = %e,
                        state = ?status.state,
                        last_error = ?status.last_error,
                        consecutive_failures = status.consecutive_failures,
                        "No metadata available"
                    );
                }
            }

            if let Some(next_refresh) = status.next_refresh {
                debug!(next_refresh = %next_refresh, "Metadata refresh schedule");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{RemoteSource, SamlMetadataParser};

    #[tokio::test]
    async fn test_reporter_exits_after_stop() {
        let source = RemoteSource::new("http://127.0.0.1:9/federation.xml").unwrap();
        let provider = ReloadingMetadataProvider::builder(source, SamlMetadataParser)
            .build()
            .unwrap();

        let handle = spawn_status_reporter(provider.clone(), Duration::from_millis(50));

        // Reports "unavailable" while nothing is cached
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!handle.is_finished());

        provider.stop().await;

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reporter should exit once the provider is stopped")
            .unwrap();
    }
}
