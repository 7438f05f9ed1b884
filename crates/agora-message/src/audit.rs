//! Best-effort channel event recording off the caller's path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use uuid::Uuid;

use agora_db::MessageRepository;
use agora_types::models::{ChannelEventDetail, ChannelEventType};

use crate::error::{MessageError, Result};

pub(crate) struct AuditLog {
    repo: Arc<dyn MessageRepository>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    runtime: Handle,
}

impl AuditLog {
    pub(crate) fn new(repo: Arc<dyn MessageRepository>, concurrency: usize, runtime: Handle) -> Self {
        Self {
            repo,
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            runtime,
        }
    }

    /// Queue an event write and return immediately. Failures are logged and dropped.
    pub(crate) fn record(
        &self,
        channel_id: Uuid,
        event_type: ChannelEventType,
        detail: ChannelEventDetail,
        at: DateTime<Utc>,
    ) {
        let repo = self.repo.clone();
        let permits = self.permits.clone();

        self.tracker.spawn_on(
            async move {
                // The semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();

                let written = detail.clone();
                let result = tokio::task::spawn_blocking(move || {
                    repo.record_channel_event(channel_id, event_type, &written, at)
                })
                .await;

                match result {
                    Ok(Ok(())) => debug!(%channel_id, %event_type, "Recorded channel event"),
                    Ok(Err(e)) => warn!(
                        error = %e,
                        %channel_id,
                        %event_type,
                        detail = ?detail,
                        datetime = %at,
                        "failed to record channel event"
                    ),
                    Err(e) => warn!(
                        error = %e,
                        %channel_id,
                        %event_type,
                        detail = ?detail,
                        datetime = %at,
                        "channel event task failed"
                    ),
                }
            },
            &self.runtime,
        );
    }

    pub(crate) fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every queued write has finished, or until `cancel` fires.
    ///
    /// The tracker is closed for good: writes queued afterwards are still
    /// tracked, and a later drain waits for them too.
    pub(crate) async fn drain(&self, cancel: &CancellationToken) -> Result<()> {
        self.tracker.close();
        tokio::select! {
            biased;
            _ = self.tracker.wait() => Ok(()),
            _ = cancel.cancelled() => {
                warn!(pending = self.tracker.len(), "Audit drain cancelled");
                Err(MessageError::DrainCancelled)
            }
        }
    }
}
