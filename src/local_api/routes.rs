use std::sync::Arc;

use poem_openapi::{
    OpenApi,
    param::{Path, Query},
    payload::{Json, PlainText},
};

use super::conflicts::PendingConflicts;
use super::models::{
    ActionResponse, ActionResultDto, BookResponse, ConflictAnswerDto, ConflictsResponse,
    DownloadRequestDto, DownloadStartResponse, DuplicatesResponse, ErrorDto, FileResponse,
    GroupUpdateDto, GroupsResponse, NegotiationsResponse, NoticesResponse, PriorityDto,
    QueueOrderResponse, ReorderDto, SearchResponse, StatusViewResponse,
};
use super::services::{
    catalog::CatalogService, downloads::DownloadService, duplicates::DuplicateService,
    health::HealthService, status::StatusService,
};
use crate::catalog_client::SearchFilters;
use crate::domain::Orchestrator;

pub struct LocalApi {
    pub orchestrator: Arc<Orchestrator>,
    pub conflicts: Arc<PendingConflicts>,
}

#[OpenApi]
impl LocalApi {
    #[oai(path = "/health", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn health(&self) -> PlainText<String> {
        HealthService::new(self.orchestrator.client())
            .status_text()
            .await
    }

    /// Search the remote catalog. No criteria returns an empty list.
    #[oai(path = "/v1/search", method = "get")]
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(level = "debug", skip_all)]
    async fn search(
        &self,
        Query(query): Query<Option<String>>,
        Query(isbn): Query<Option<String>>,
        Query(author): Query<Option<String>>,
        Query(title): Query<Option<String>>,
        Query(lang): Query<Option<String>>,
        Query(sort): Query<Option<String>>,
        Query(content): Query<Option<String>>,
        /// May repeat, e.g. `format=epub&format=pdf`
        Query(format): Query<Vec<String>>,
    ) -> SearchResponse {
        let filters = SearchFilters {
            query,
            isbn,
            author,
            title,
            lang,
            sort,
            content,
            formats: format,
        };
        CatalogService::new(&self.orchestrator).search(filters).await
    }

    #[oai(path = "/v1/books/:id", method = "get")]
    #[tracing::instrument(level = "debug", skip(self, id))]
    async fn book(&self, id: Path<String>) -> BookResponse {
        CatalogService::new(&self.orchestrator).info(&id.0).await
    }

    // ===== Download queue =====

    /// Start a download negotiation for a book
    #[oai(path = "/v1/downloads", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn start_download(&self, body: Json<DownloadRequestDto>) -> DownloadStartResponse {
        DownloadService::new(&self.orchestrator).start(body.0).await
    }

    /// Open negotiations and their current state
    #[oai(path = "/v1/negotiations", method = "get")]
    async fn negotiations(&self) -> NegotiationsResponse {
        DownloadService::new(&self.orchestrator).negotiations()
    }

    /// Clear completed downloads; the status is re-fetched afterwards
    #[oai(path = "/v1/downloads/completed", method = "delete")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn clear_completed(&self) -> ActionResponse {
        DownloadService::new(&self.orchestrator)
            .clear_completed()
            .await
    }

    /// Cancel a download; the status is re-fetched afterwards
    #[oai(path = "/v1/downloads/:id", method = "delete")]
    #[tracing::instrument(level = "debug", skip(self, id))]
    async fn cancel_download(&self, id: Path<String>) -> ActionResponse {
        DownloadService::new(&self.orchestrator).cancel(&id.0).await
    }

    /// Bytes of a completed download
    #[oai(path = "/v1/downloads/:id/file", method = "get")]
    #[tracing::instrument(level = "debug", skip(self, id))]
    async fn download_file(&self, id: Path<String>) -> FileResponse {
        DownloadService::new(&self.orchestrator)
            .local_file(&id.0)
            .await
    }

    #[oai(path = "/v1/queue/order", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn queue_order(&self) -> QueueOrderResponse {
        DownloadService::new(&self.orchestrator).order().await
    }

    #[oai(path = "/v1/queue/:id/priority", method = "put")]
    #[tracing::instrument(level = "debug", skip(self, id, body))]
    async fn set_priority(&self, id: Path<String>, body: Json<PriorityDto>) -> ActionResponse {
        DownloadService::new(&self.orchestrator)
            .set_priority(&id.0, body.0.priority)
            .await
    }

    #[oai(path = "/v1/queue/reorder", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn reorder(&self, body: Json<ReorderDto>) -> ActionResponse {
        DownloadService::new(&self.orchestrator)
            .reorder(body.0.book_priorities)
            .await
    }

    // ===== Conflicts =====

    /// Conflicts waiting for a force/save decision
    #[oai(path = "/v1/conflicts", method = "get")]
    async fn conflicts(&self) -> ConflictsResponse {
        DownloadService::new(&self.orchestrator).conflicts(&self.conflicts)
    }

    /// Answer a pending conflict
    #[oai(path = "/v1/conflicts/:book_id", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, book_id, body))]
    async fn answer_conflict(
        &self,
        book_id: Path<String>,
        body: Json<ConflictAnswerDto>,
    ) -> ActionResponse {
        if self.conflicts.answer(&book_id.0, body.0.action.into()) {
            tracing::info!(book_id = %book_id.0, action = ?body.0.action, "conflict answered");
            ActionResponse::Ok(Json(ActionResultDto { accepted: true }))
        } else {
            ActionResponse::NotFound(Json(ErrorDto {
                message: format!("no pending conflict for {}", book_id.0),
            }))
        }
    }

    // ===== Status =====

    /// Currently held status view, without fetching
    #[oai(path = "/v1/status", method = "get")]
    async fn status(&self) -> StatusViewResponse {
        StatusService::new(&self.orchestrator).current().await
    }

    /// Re-fetch the snapshot and the active count
    #[oai(path = "/v1/status/refresh", method = "post")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn refresh_status(&self) -> StatusViewResponse {
        StatusService::new(&self.orchestrator).refresh().await
    }

    /// Recent failures, oldest first
    #[oai(path = "/v1/notices", method = "get")]
    async fn notices(&self) -> NoticesResponse {
        StatusService::new(&self.orchestrator).notices().await
    }

    // ===== Duplicate registry =====

    #[oai(path = "/v1/duplicates", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn duplicates(&self) -> DuplicatesResponse {
        DuplicateService::new(&self.orchestrator).list().await
    }

    /// Dismiss a record, or queue its book anyway with `force=true`
    #[oai(path = "/v1/duplicates/:id", method = "delete")]
    #[tracing::instrument(level = "debug", skip(self, id, force))]
    async fn remove_duplicate(
        &self,
        id: Path<String>,
        Query(force): Query<Option<bool>>,
    ) -> ActionResponse {
        DuplicateService::new(&self.orchestrator)
            .remove(&id.0, force.unwrap_or(false))
            .await
    }

    /// Raw bytes of a file inside a duplicate group
    #[oai(path = "/v1/duplicates/file", method = "get")]
    #[tracing::instrument(level = "debug", skip(self, path, inline))]
    async fn duplicate_file(
        &self,
        Query(path): Query<String>,
        Query(inline): Query<Option<bool>>,
    ) -> FileResponse {
        DuplicateService::new(&self.orchestrator)
            .file(&path, inline.unwrap_or(false))
            .await
    }

    #[oai(path = "/v1/duplicate-groups", method = "get")]
    #[tracing::instrument(level = "debug", skip(self))]
    async fn duplicate_groups(&self) -> GroupsResponse {
        DuplicateService::new(&self.orchestrator).groups().await
    }

    /// Mark or clear a group's reviewed flag
    #[oai(path = "/v1/duplicate-groups", method = "post")]
    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn update_duplicate_group(&self, body: Json<GroupUpdateDto>) -> GroupsResponse {
        DuplicateService::new(&self.orchestrator)
            .update_group(body.0.action.into(), &body.0.group_id)
            .await
    }
}
