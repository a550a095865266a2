// Download queue client: submit, cancel, clear, reorder

use std::{collections::BTreeMap, sync::Arc};

use super::{
    duplicates::DuplicateRegistry,
    events::{ClientEvent, EventSink, Slice},
    negotiation::{BookGuard, Negotiator, Outcome, QueueError},
    status::StatusReconciler,
    view::ViewHandle,
};
use crate::catalog_client::{
    Ack, Book, CatalogClient, DownloadRequest, GatewayResult, QueueOrderEntry, Reply,
};

/// The book a queue call is about: its id, plus a title for failure messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRef {
    pub id: String,
    pub title: Option<String>,
}

impl From<&Book> for BookRef {
    fn from(b: &Book) -> Self {
        BookRef {
            id: b.id.clone(),
            title: b.title.clone(),
        }
    }
}

impl From<&str> for BookRef {
    fn from(id: &str) -> Self {
        BookRef {
            id: id.to_string(),
            title: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    pub priority: Option<i64>,
    pub force: bool,
}

#[derive(Clone)]
pub struct DownloadQueue {
    client: Arc<CatalogClient>,
    negotiator: Negotiator,
    status: StatusReconciler,
    duplicates: DuplicateRegistry,
    view: ViewHandle,
    events: Arc<dyn EventSink>,
}

impl DownloadQueue {
    pub fn new(
        client: Arc<CatalogClient>,
        negotiator: Negotiator,
        status: StatusReconciler,
        duplicates: DuplicateRegistry,
        view: ViewHandle,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            client,
            negotiator,
            status,
            duplicates,
            view,
            events,
        }
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    /// Queue a book, negotiating any duplicate conflict on the way.
    ///
    /// Queued: status and duplicates are both refreshed. Saved: only the
    /// duplicate list is refreshed. Rejected or failed: a `QueueFailed`
    /// signal is emitted; the duplicate list is re-fetched only if the
    /// failing request was a forced one.
    pub async fn queue(&self, book: BookRef, options: QueueOptions) -> Result<Outcome, QueueError> {
        let guard = self.negotiator.locks().claim(&book.id)?;
        Ok(self.queue_claimed(guard, book, options).await)
    }

    /// [`DownloadQueue::queue`] with the book's slot already claimed, so a
    /// caller can refuse a duplicate submission before going async.
    #[tracing::instrument(level = "debug", skip(self, guard, book), fields(book_id = %book.id))]
    pub async fn queue_claimed(&self, guard: BookGuard, book: BookRef, options: QueueOptions) -> Outcome {
        let mut request = DownloadRequest::new(book.id.clone(), options.priority);
        request.force = options.force;
        let outcome = self.negotiator.negotiate_claimed(guard, request).await;

        match &outcome {
            Outcome::Queued { forced, .. } => {
                tracing::info!(book_id = %book.id, forced, "book queued");
                tokio::join!(self.status.fetch(), self.duplicates.fetch_records());
            }
            Outcome::Saved { .. } => {
                self.duplicates.fetch_records().await;
            }
            Outcome::Rejected { error, forced, .. }
            | Outcome::Failed {
                message: error,
                forced,
            } => {
                self.view
                    .write()
                    .await
                    .push_notice(Slice::Queue, format!("{}: {}", book.id, error));
                self.events.emit(ClientEvent::QueueFailed {
                    book_id: book.id.clone(),
                    title: book.title.clone(),
                    message: error.clone(),
                });
                if *forced {
                    self.duplicates.fetch_records().await;
                }
            }
        }
        outcome
    }

    /// Ask the service to cancel a download. The status is re-fetched
    /// whatever the answer, so the view shows what actually happened.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn cancel(&self, book_id: &str) -> bool {
        let result = self.client.cancel(book_id).await;
        let accepted = self.report("cancel", book_id, result).await;
        self.status.fetch().await;
        accepted
    }

    /// Clear completed entries, then re-fetch. Partial clears only show up
    /// in the fresh snapshot.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn clear_completed(&self) -> bool {
        let result = self.client.clear_completed().await;
        let accepted = self.report("clear_completed", "completed", result).await;
        self.status.fetch().await;
        accepted
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn set_priority(&self, book_id: &str, priority: i64) -> bool {
        let result = self.client.set_priority(book_id, priority).await;
        let accepted = self.report("set_priority", book_id, result).await;
        self.status.fetch().await;
        accepted
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn reorder(&self, book_priorities: &BTreeMap<String, i64>) -> bool {
        let result = self.client.reorder(book_priorities).await;
        let accepted = self.report("reorder", "queue", result).await;
        self.status.fetch().await;
        accepted
    }

    /// Current queue order as the service sees it. Not held in the view.
    pub async fn order(&self) -> GatewayResult<Vec<QueueOrderEntry>> {
        self.client.queue_order().await
    }

    /// Bytes of a completed download.
    pub async fn local_file(&self, book_id: &str) -> GatewayResult<Vec<u8>> {
        self.client.local_download(book_id).await
    }

    async fn report(&self, action: &str, target: &str, result: GatewayResult<Ack>) -> bool {
        let message = match result {
            Ok(Reply::Ok(_)) => return true,
            Ok(Reply::Rejected(r)) => r.error,
            Err(e) => e.to_string(),
        };
        tracing::warn!(%action, %target, error = %message, "queue action failed");
        self.view
            .write()
            .await
            .push_notice(Slice::Queue, format!("{action} {target}: {message}"));
        self.events.emit(ClientEvent::ActionFailed {
            action: action.to_string(),
            target: target.to_string(),
            message,
        });
        false
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{
        events::testing::RecordingSink,
        negotiation::{
            BookLocks, ConflictResolver, Resolution, testing::ScriptedResolver,
        },
        view::new_view,
    };
    use crate::catalog_client::DuplicateRecord;
    use tokio::sync::Notify;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn build(server: &MockServer, resolver: Arc<dyn ConflictResolver>, sink: RecordingSink) -> DownloadQueue {
        let client = Arc::new(CatalogClient::new(server.uri()).unwrap());
        let view = new_view();
        let events: Arc<dyn EventSink> = Arc::new(sink);
        let locks = BookLocks::default();
        let status = StatusReconciler::new(client.clone(), view.clone(), events.clone());
        let duplicates = DuplicateRegistry::new(
            client.clone(),
            view.clone(),
            events.clone(),
            locks.clone(),
            status.clone(),
        );
        let negotiator = Negotiator::new(client.clone(), resolver, locks, events.clone());
        DownloadQueue::new(client, negotiator, status, duplicates, view, events)
    }

    fn conflict() -> ResponseTemplate {
        ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "error": "Duplicate detected",
            "duplicate": { "book_id": "b1", "reason": "queued", "status": "queued" }
        }))
    }

    async fn mount_refreshes(server: &MockServer, status_calls: u64, duplicate_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/api/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "queued": {} })))
            .expect(status_calls)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/duplicates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "duplicates": [] })))
            .expect(duplicate_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn queued_book_refreshes_status_and_duplicates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/download"))
            .and(query_param("priority", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "queued", "priority": 2})))
            .expect(1)
            .mount(&server)
            .await;
        mount_refreshes(&server, 1, 1).await;

        let q = build(&server, Arc::new(ScriptedResolver::default()), RecordingSink::default());
        let outcome = q
            .queue(
                BookRef::from("b1"),
                QueueOptions {
                    priority: Some(2),
                    force: false,
                },
            )
            .await
            .unwrap();
        match outcome {
            Outcome::Queued { forced, ack } => {
                assert!(!forced);
                assert_eq!(ack.priority, Some(2));
            }
            other => panic!("expected queued, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn saved_conflict_refreshes_duplicates_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/download"))
            .respond_with(conflict())
            .expect(1)
            .mount(&server)
            .await;
        mount_refreshes(&server, 0, 1).await;

        let q = build(
            &server,
            Arc::new(ScriptedResolver::new(vec![Resolution::Save])),
            RecordingSink::default(),
        );
        let outcome = q.queue(BookRef::from("b1"), QueueOptions::default()).await.unwrap();
        assert!(matches!(outcome, Outcome::Saved { .. }));
    }

    #[tokio::test]
    async fn failure_signals_with_book_and_keeps_view() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/download"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "Failed to queue book"})),
            )
            .mount(&server)
            .await;
        mount_refreshes(&server, 0, 0).await;

        let sink = RecordingSink::default();
        let q = build(&server, Arc::new(ScriptedResolver::default()), sink.clone());
        let book = Book {
            id: "b1".into(),
            title: Some("Dune".into()),
            author: None,
            year: None,
            language: None,
            format: None,
            size: None,
            preview: None,
            publisher: None,
            info: Default::default(),
        };
        let outcome = q.queue(BookRef::from(&book), QueueOptions::default()).await.unwrap();
        assert!(matches!(outcome, Outcome::Rejected { status: 500, .. }));
        assert!(sink.take().contains(&ClientEvent::QueueFailed {
            book_id: "b1".into(),
            title: Some("Dune".into()),
            message: "Failed to queue book".into(),
        }));
        assert!(q.view.read().await.status.is_none());
    }

    #[tokio::test]
    async fn failed_forced_reissue_still_refreshes_duplicates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/download"))
            .and(query_param("force", "true"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "Failed to queue book"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/download"))
            .respond_with(conflict())
            .expect(1)
            .mount(&server)
            .await;
        mount_refreshes(&server, 0, 1).await;

        let sink = RecordingSink::default();
        let q = build(
            &server,
            Arc::new(ScriptedResolver::new(vec![Resolution::Force])),
            sink.clone(),
        );
        let outcome = q.queue(BookRef::from("b1"), QueueOptions::default()).await.unwrap();
        assert!(matches!(
            outcome,
            Outcome::Rejected {
                status: 500,
                forced: true,
                ..
            }
        ));
        assert!(q.view.read().await.duplicates.is_some());
        assert!(sink
            .take()
            .iter()
            .any(|e| matches!(e, ClientEvent::QueueFailed { .. })));
    }

    /// Holds every conflict open until released.
    struct GatedResolver {
        gate: Notify,
        reached: Notify,
    }

    #[async_trait::async_trait]
    impl ConflictResolver for GatedResolver {
        async fn resolve(&self, _request: &DownloadRequest, _record: &DuplicateRecord) -> Resolution {
            self.reached.notify_one();
            self.gate.notified().await;
            Resolution::Save
        }
    }

    #[tokio::test]
    async fn second_submission_for_same_book_is_rejected_while_first_is_open() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/download"))
            .respond_with(conflict())
            .expect(1)
            .mount(&server)
            .await;
        mount_refreshes(&server, 0, 1).await;

        let resolver = Arc::new(GatedResolver {
            gate: Notify::new(),
            reached: Notify::new(),
        });
        let q = build(&server, resolver.clone(), RecordingSink::default());

        let first = {
            let q = q.clone();
            tokio::spawn(async move { q.queue(BookRef::from("b1"), QueueOptions::default()).await })
        };
        tokio::time::timeout(Duration::from_secs(5), resolver.reached.notified())
            .await
            .unwrap();

        let second = q.queue(BookRef::from("b1"), QueueOptions::default()).await;
        assert_eq!(second, Err(QueueError::AlreadyInFlight("b1".into())));

        resolver.gate.notify_one();
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, Outcome::Saved { .. }));
        assert!(!q.negotiator().locks().is_open("b1"));
    }

    #[tokio::test]
    async fn cancel_refreshes_even_when_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/download/b1/cancel"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"error": "Failed to cancel download or book not found"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_refreshes(&server, 1, 0).await;

        let q = build(&server, Arc::new(ScriptedResolver::default()), RecordingSink::default());
        assert!(!q.cancel("b1").await);
        assert!(q.view.read().await.status.is_some());
    }

    #[tokio::test]
    async fn clear_completed_then_fetch_shows_no_completed_entries() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/queue/clear"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "cleared", "removed_count": 2})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "queued": { "b4": { "id": "b4", "title": "Next" } },
                "completed": {}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let q = build(&server, Arc::new(ScriptedResolver::default()), RecordingSink::default());
        assert!(q.clear_completed().await);
        q.status.fetch().await;
        let view = q.status.current().await;
        assert!(view.category("completed").unwrap().rows.is_empty());
    }

    #[tokio::test]
    async fn set_priority_sends_body_and_refreshes() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/queue/b2/priority"))
            .and(wiremock::matchers::body_json(serde_json::json!({"priority": 7})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "updated"})))
            .expect(1)
            .mount(&server)
            .await;
        mount_refreshes(&server, 1, 0).await;

        let q = build(&server, Arc::new(ScriptedResolver::default()), RecordingSink::default());
        assert!(q.set_priority("b2", 7).await);
    }
}
