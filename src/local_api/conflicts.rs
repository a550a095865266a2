// Conflicts parked until a renderer answers them

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::catalog_client::{DownloadRequest, DuplicateRecord};
use crate::domain::negotiation::{ConflictResolver, Resolution};

#[derive(Debug, Clone, PartialEq)]
pub struct PendingConflict {
    pub request: DownloadRequest,
    pub record: DuplicateRecord,
    pub since: DateTime<Utc>,
}

/// A [`ConflictResolver`] that waits for an answer posted through the local API.
#[derive(Default)]
pub struct PendingConflicts {
    inner: Mutex<HashMap<String, (PendingConflict, oneshot::Sender<Resolution>)>>,
}

impl PendingConflicts {
    pub fn list(&self) -> Vec<PendingConflict> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pending: Vec<_> = inner.values().map(|(p, _)| p.clone()).collect();
        pending.sort_by_key(|p| p.since);
        pending
    }

    /// Deliver an answer. Returns false if nothing is waiting for this book.
    pub fn answer(&self, book_id: &str, resolution: Resolution) -> bool {
        let entry = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(book_id);
        match entry {
            Some((_, tx)) => tx.send(resolution).is_ok(),
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl ConflictResolver for PendingConflicts {
    async fn resolve(&self, request: &DownloadRequest, record: &DuplicateRecord) -> Resolution {
        let (tx, rx) = oneshot::channel();
        let pending = PendingConflict {
            request: request.clone(),
            record: record.clone(),
            since: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.book_id.clone(), (pending, tx));
        tracing::info!(book_id = %request.book_id, reason = record.reason.as_str(), "conflict waiting for a decision");
        // A dropped sender leaves the record in the registry.
        rx.await.unwrap_or(Resolution::Save)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog_client::DuplicateReason;

    fn record() -> DuplicateRecord {
        DuplicateRecord {
            id: "b1".into(),
            book: None,
            reason: DuplicateReason::OnDisk,
            detected_at: None,
            ingest_path: None,
            existing_path: None,
            status: None,
            priority: None,
        }
    }

    #[tokio::test]
    async fn answer_releases_waiting_resolver() {
        let conflicts = Arc::new(PendingConflicts::default());
        let waiting = {
            let conflicts = conflicts.clone();
            tokio::spawn(async move {
                conflicts
                    .resolve(&DownloadRequest::new("b1", Some(1)), &record())
                    .await
            })
        };
        while conflicts.list().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(conflicts.list()[0].request.priority, Some(1));
        assert!(conflicts.answer("b1", Resolution::Force));
        assert_eq!(waiting.await.unwrap(), Resolution::Force);
        assert!(conflicts.list().is_empty());
        assert!(!conflicts.answer("b1", Resolution::Save));
    }
}
