//! Download orchestration core.
//!
//! [`Orchestrator`] owns the single [`view::ViewHandle`] and hands it, along
//! with the gateway and event sink, to each component. Components replace
//! their own slice of the view on every successful full fetch and leave it
//! alone on failure.

pub mod duplicates;
pub mod events;
pub mod mapping;
pub mod models;
pub mod negotiation;
pub mod queue;
pub mod status;
pub mod view;

use std::sync::Arc;

use crate::catalog_client::{Book, CatalogClient, GatewayResult, SearchFilters};
use duplicates::DuplicateRegistry;
use events::EventSink;
use negotiation::{BookLocks, ConflictResolver, Negotiator};
use queue::DownloadQueue;
use status::StatusReconciler;
use view::ViewHandle;

pub struct Orchestrator {
    client: Arc<CatalogClient>,
    pub queue: DownloadQueue,
    pub status: StatusReconciler,
    pub duplicates: DuplicateRegistry,
    pub view: ViewHandle,
}

impl Orchestrator {
    pub fn new(
        client: CatalogClient,
        resolver: Arc<dyn ConflictResolver>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let client = Arc::new(client);
        let view = view::new_view();
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
        let queue = DownloadQueue::new(
            client.clone(),
            negotiator,
            status.clone(),
            duplicates.clone(),
            view.clone(),
            events,
        );
        Self {
            client,
            queue,
            status,
            duplicates,
            view,
        }
    }

    pub fn client(&self) -> &CatalogClient {
        &self.client
    }

    /// Search results are not held; each search is its own current view.
    pub async fn search(&self, filters: &SearchFilters) -> GatewayResult<Vec<Book>> {
        self.client.search(filters).await
    }

    pub async fn info(&self, book_id: &str) -> GatewayResult<Book> {
        self.client.info(book_id).await
    }

    /// Refresh every slice concurrently. Each slice succeeds or fails on its own.
    pub async fn refresh_all(&self) {
        tokio::join!(
            self.status.refresh(),
            self.duplicates.fetch_records(),
            self.duplicates.fetch_groups()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::{ClientEvent, Slice, testing::RecordingSink};
    use negotiation::testing::ScriptedResolver;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn failing_slice_does_not_block_the_others() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "downloading": {} })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/downloads/active"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "active_downloads": [] })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/duplicates"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/duplicates/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "groups": [] })))
            .mount(&server)
            .await;

        let sink = RecordingSink::default();
        let o = Orchestrator::new(
            CatalogClient::new(server.uri()).unwrap(),
            Arc::new(ScriptedResolver::default()),
            Arc::new(sink.clone()),
        );
        o.refresh_all().await;

        let view = o.view.read().await;
        assert!(view.status.is_some());
        assert!(view.groups.is_some());
        assert!(view.duplicates.is_none());
        let failed: Vec<_> = sink
            .take()
            .into_iter()
            .filter(|e| matches!(e, ClientEvent::RefreshFailed { .. }))
            .collect();
        assert_eq!(
            failed,
            vec![ClientEvent::RefreshFailed {
                slice: Slice::Duplicates,
                message: "duplicates rejected (503): unavailable".into()
            }]
        );
    }
}
