use std::collections::BTreeMap;

use poem_openapi::payload::{Binary, Json};

use crate::{
    catalog_client::{GatewayResult, Reply},
    domain::{
        Orchestrator,
        mapping::infer_file_kind_from_name,
        negotiation::Outcome,
        queue::{BookRef, QueueOptions},
    },
    local_api::{
        conflicts::PendingConflicts,
        models::{
            AcceptedDto, ActionResponse, ActionResultDto, ConflictDto, ConflictsResponse,
            DownloadRequestDto, DownloadStartResponse, ErrorDto, FileResponse, NegotiationDto,
            NegotiationsResponse, QueueOrderDto, QueueOrderResponse,
        },
    },
};

pub struct DownloadService<'a> {
    pub orchestrator: &'a Orchestrator,
}

impl<'a> DownloadService<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Start a negotiation in the background. The book's slot is claimed
    /// before answering, so a 202 always has a negotiation behind it.
    /// Conflicts surface through `/v1/conflicts`; the outcome through
    /// `/v1/negotiations` and the view.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn start(&self, body: DownloadRequestDto) -> DownloadStartResponse {
        let book_id = body.id.trim().to_string();
        if book_id.is_empty() {
            return DownloadStartResponse::BadRequest(Json(ErrorDto {
                message: "id is required".to_string(),
            }));
        }
        let queue = self.orchestrator.queue.clone();
        let guard = match queue.negotiator().locks().claim(&book_id) {
            Ok(guard) => guard,
            Err(e) => return DownloadStartResponse::Conflict(Json(ErrorDto::from(e.to_string()))),
        };

        let book = BookRef::from(book_id.as_str());
        let options = QueueOptions {
            priority: body.priority,
            force: false,
        };
        tokio::spawn(async move {
            match queue.queue_claimed(guard, book, options).await {
                Outcome::Queued { forced, .. } => tracing::debug!(forced, "negotiation finished queued"),
                outcome => tracing::debug!(?outcome, "negotiation finished"),
            }
        });
        DownloadStartResponse::Accepted(Json(AcceptedDto { book_id }))
    }

    pub fn negotiations(&self) -> NegotiationsResponse {
        let states = self.orchestrator.queue.negotiator().locks().snapshot();
        NegotiationsResponse::Ok(Json(
            states
                .into_iter()
                .map(|(book_id, state)| NegotiationDto::new(book_id, &state))
                .collect(),
        ))
    }

    pub fn conflicts(&self, pending: &PendingConflicts) -> ConflictsResponse {
        ConflictsResponse::Ok(Json(
            pending.list().into_iter().map(ConflictDto::from).collect(),
        ))
    }

    pub async fn cancel(&self, book_id: &str) -> ActionResponse {
        let accepted = self.orchestrator.queue.cancel(book_id).await;
        ActionResponse::Ok(Json(ActionResultDto { accepted }))
    }

    pub async fn clear_completed(&self) -> ActionResponse {
        let accepted = self.orchestrator.queue.clear_completed().await;
        ActionResponse::Ok(Json(ActionResultDto { accepted }))
    }

    pub async fn set_priority(&self, book_id: &str, priority: i64) -> ActionResponse {
        let accepted = self.orchestrator.queue.set_priority(book_id, priority).await;
        ActionResponse::Ok(Json(ActionResultDto { accepted }))
    }

    pub async fn reorder(&self, book_priorities: BTreeMap<String, i64>) -> ActionResponse {
        let accepted = self.orchestrator.queue.reorder(&book_priorities).await;
        ActionResponse::Ok(Json(ActionResultDto { accepted }))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn order(&self) -> QueueOrderResponse {
        match self.orchestrator.queue.order().await {
            Ok(Reply::Ok(entries)) => QueueOrderResponse::Ok(Json(
                entries.into_iter().map(QueueOrderDto::from).collect(),
            )),
            Ok(Reply::Rejected(r)) => QueueOrderResponse::BadGateway(Json(ErrorDto::from(r.error))),
            Err(e) => {
                tracing::error!(error = %format!("{:?}", e), "failed to fetch queue order");
                QueueOrderResponse::BadGateway(Json(ErrorDto {
                    message: format!("service error: {}", e),
                }))
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn local_file(&self, book_id: &str) -> FileResponse {
        let name = self
            .orchestrator
            .view
            .read()
            .await
            .status
            .as_ref()
            .and_then(|s| s.value.locate(book_id))
            .and_then(|(_, e)| e.download_path.clone())
            .and_then(|p| p.rsplit(['/', '\\']).next().map(str::to_string))
            .unwrap_or_else(|| book_id.to_string());
        file_response(self.orchestrator.queue.local_file(book_id).await, &name, false)
    }
}

/// Map a byte fetch onto a file response named after `name`.
pub fn file_response(result: GatewayResult<Vec<u8>>, name: &str, inline: bool) -> FileResponse {
    match result {
        Ok(Reply::Ok(bytes)) => {
            let disposition = format!(
                "{}; filename=\"{}\"",
                if inline { "inline" } else { "attachment" },
                name.replace('"', "")
            );
            let mime = infer_file_kind_from_name(name).mime().to_string();
            FileResponse::Ok(Binary(bytes), disposition, mime)
        }
        Ok(Reply::Rejected(r)) if r.status == 404 => FileResponse::NotFound(Json(ErrorDto::from(r.error))),
        Ok(Reply::Rejected(r)) => FileResponse::BadGateway(Json(ErrorDto::from(r.error))),
        Err(e) => {
            tracing::error!(error = %format!("{:?}", e), %name, "file fetch failed");
            FileResponse::BadGateway(Json(ErrorDto {
                message: format!("service error: {}", e),
            }))
        }
    }
}
