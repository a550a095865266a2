// Duplicate registry: standalone records and server-computed groups

use std::sync::Arc;

use super::{
    events::{ClientEvent, EventSink, Slice},
    negotiation::{BookLocks, QueueError},
    status::StatusReconciler,
    view::{Stamped, ViewHandle},
};
use crate::catalog_client::{
    CatalogClient, DuplicateGroup, DuplicateRecord, GatewayResult, GroupAction, Reply,
};

#[derive(Clone)]
pub struct DuplicateRegistry {
    client: Arc<CatalogClient>,
    view: ViewHandle,
    events: Arc<dyn EventSink>,
    locks: BookLocks,
    status: StatusReconciler,
}

impl DuplicateRegistry {
    pub fn new(
        client: Arc<CatalogClient>,
        view: ViewHandle,
        events: Arc<dyn EventSink>,
        locks: BookLocks,
        status: StatusReconciler,
    ) -> Self {
        Self {
            client,
            view,
            events,
            locks,
            status,
        }
    }

    fn fail(&self, slice: Slice, message: String) {
        tracing::warn!(?slice, error = %message, "duplicate registry refresh failed");
        self.events
            .emit(ClientEvent::RefreshFailed { slice, message });
    }

    /// Replace the held record list with a full fetch. Returns the new list,
    /// or `None` when the fetch failed and the previous list was kept.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn fetch_records(&self) -> Option<Vec<DuplicateRecord>> {
        let message = match self.client.duplicates().await {
            Ok(Reply::Ok(records)) => {
                let count = records.len();
                self.view.write().await.duplicates = Some(Stamped::now(records.clone()));
                self.events.emit(ClientEvent::Refreshed {
                    slice: Slice::Duplicates,
                    count,
                });
                return Some(records);
            }
            Ok(Reply::Rejected(r)) => format!("duplicates rejected ({}): {}", r.status, r.error),
            Err(e) => e.to_string(),
        };
        self.view
            .write()
            .await
            .push_notice(Slice::Duplicates, message.clone());
        self.fail(Slice::Duplicates, message);
        None
    }

    /// Drop a record without queueing its book, then re-fetch the list.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn dismiss(&self, record_id: &str) -> Option<Vec<DuplicateRecord>> {
        let result = self.client.remove_duplicate(record_id, false).await;
        self.report_action("dismiss_duplicate", record_id, Slice::Duplicates, result)
            .await;
        self.fetch_records().await
    }

    /// Queue a record's book anyway, then re-fetch both the list and the status.
    /// Records are keyed by book id, so the book's submission slot is held
    /// while the request is out, like a normal queue attempt.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn force(&self, record_id: &str) -> Result<Option<Vec<DuplicateRecord>>, QueueError> {
        let guard = self.locks.claim(record_id)?;
        let result = self.client.remove_duplicate(record_id, true).await;
        let accepted = self
            .report_action("force_duplicate", record_id, Slice::Duplicates, result)
            .await;
        drop(guard);

        if accepted {
            let (records, _) = tokio::join!(self.fetch_records(), self.status.fetch());
            Ok(records)
        } else {
            Ok(self.fetch_records().await)
        }
    }

    /// Replace the held group list with a full fetch.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn fetch_groups(&self) -> Option<Vec<DuplicateGroup>> {
        let message = match self.client.duplicate_groups().await {
            Ok(Reply::Ok(groups)) => {
                let count = groups.len();
                self.view.write().await.groups = Some(Stamped::now(groups.clone()));
                self.events.emit(ClientEvent::Refreshed {
                    slice: Slice::Groups,
                    count,
                });
                return Some(groups);
            }
            Ok(Reply::Rejected(r)) => format!("duplicate groups rejected ({}): {}", r.status, r.error),
            Err(e) => e.to_string(),
        };
        self.view
            .write()
            .await
            .push_notice(Slice::Groups, message.clone());
        self.fail(Slice::Groups, message);
        None
    }

    /// Toggle a group's review flag, then re-fetch all groups. Membership is
    /// never touched here.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn update_group(
        &self,
        action: GroupAction,
        group_id: &str,
    ) -> Option<Vec<DuplicateGroup>> {
        let result = self.client.update_group(action, group_id).await;
        let name = match action {
            GroupAction::MarkReviewed => "mark_reviewed",
            GroupAction::ClearReviewed => "clear_reviewed",
        };
        self.report_action(name, group_id, Slice::Groups, result)
            .await;
        self.fetch_groups().await
    }

    /// Raw bytes of a file inside a duplicate group.
    pub async fn file(&self, relative_path: &str, inline: bool) -> GatewayResult<Vec<u8>> {
        self.client.duplicate_file(relative_path, inline).await
    }

    /// Emit a failure signal for a rejected or failed action. Returns whether it was accepted.
    async fn report_action<T>(
        &self,
        action: &str,
        target: &str,
        slice: Slice,
        result: GatewayResult<T>,
    ) -> bool {
        let message = match result {
            Ok(Reply::Ok(_)) => return true,
            Ok(Reply::Rejected(r)) => r.error,
            Err(e) => e.to_string(),
        };
        tracing::warn!(%action, %target, error = %message, "duplicate action failed");
        self.view
            .write()
            .await
            .push_notice(slice, format!("{action} {target}: {message}"));
        self.events.emit(ClientEvent::ActionFailed {
            action: action.to_string(),
            target: target.to_string(),
            message,
        });
        false
    }
}
