//! # Releases
//!
//! A [`Release`] records one deployment-worthy change detected in a bucket.
//! Releases are created from validated [`InboundEvent`]s and kept in the
//! configuration source as a FIFO queue that a downstream poller drains one
//! entry at a time through [`ReleaseQueue`].

use crate::{
    event::InboundEvent,
    store::{Record, RecordType, SourceStore, StoreError},
    ReleaseKey, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A queued release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Endpoint of the MinIO instance that reported the change
    pub origin: String,
    pub deployment_id: String,
    pub bucket_name: String,

    /// Version folder holding the release specification
    pub folder_name: String,

    /// Time the proxy accepted the notification
    pub time: Timestamp,
}

impl Release {
    /// Build a release from a validated event
    ///
    /// The release is stamped with the current server time rather than the
    /// event time, so that queue order follows arrival order.
    pub fn from_event(event: &InboundEvent) -> Self {
        Self {
            origin: event.origin.clone(),
            deployment_id: event.deployment_id.clone(),
            bucket_name: event.bucket_name.clone(),
            folder_name: event.folder_name.clone(),
            time: Timestamp::now(),
        }
    }
}

impl From<&InboundEvent> for Release {
    fn from(event: &InboundEvent) -> Self {
        Self::from_event(event)
    }
}

/// FIFO queue of releases held in the configuration source
///
/// The queue performs no deduplication; the same notification delivered twice
/// produces two entries. Ordering and single-winner removal are guaranteed by
/// the underlying [`SourceStore`].
///
/// ```
/// use doorman_proxy_core::{InMemorySource, ReleaseQueue};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let queue = ReleaseQueue::new(Arc::new(InMemorySource::with_policies(vec![])));
/// assert!(queue.dequeue_oldest().await.unwrap().is_none());
/// # });
/// ```
#[derive(Clone)]
pub struct ReleaseQueue {
    store: Arc<dyn SourceStore>,
}

impl ReleaseQueue {
    pub fn new(store: Arc<dyn SourceStore>) -> Self {
        Self { store }
    }

    /// Append a release under a fresh key
    #[instrument(skip(self, release), fields(folder = %release.folder_name))]
    pub async fn enqueue(&self, release: Release) -> Result<ReleaseKey, StoreError> {
        let key = ReleaseKey::new();
        self.store
            .save(&key.as_str(), Record::Release(release))
            .await?;

        info!(key = %key, "Release queued");
        Ok(key)
    }

    /// Remove and return the oldest release, or `None` when the queue is empty
    #[instrument(skip(self))]
    pub async fn dequeue_oldest(&self) -> Result<Option<Release>, StoreError> {
        match self.store.pop_oldest(RecordType::Release).await? {
            Some(record) => {
                let release = record.into_release()?;
                info!(
                    bucket = %release.bucket_name,
                    folder = %release.folder_name,
                    "Release handed to poller"
                );
                Ok(Some(release))
            }
            None => {
                debug!("No release queued");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
#[path = "release_tests.rs"]
mod tests;
