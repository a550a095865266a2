use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use poem_openapi::{ApiResponse, Enum, Object, payload::Binary, payload::Json};

use super::conflicts::PendingConflict;
use crate::catalog_client::{
    Book, DuplicateGroup, DuplicateRecord, GroupAction, GroupKind, QueueOrderEntry,
};
use crate::domain::{
    models::{CategoryView, StatusRow, StatusView},
    negotiation::{NegotiationState, Outcome, Resolution},
    view::Notice,
};

#[derive(Debug, Clone, Object)]
pub struct ErrorDto {
    /// Human-readable error message
    pub message: String,
}

impl From<String> for ErrorDto {
    fn from(message: String) -> Self {
        ErrorDto { message }
    }
}

#[derive(Debug, Clone, Object)]
pub struct BookDto {
    pub id: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub year: Option<String>,
    pub language: Option<String>,
    pub format: Option<String>,
    pub size: Option<String>,
    pub preview: Option<String>,
    pub publisher: Option<String>,
    /// Label -> one or more display values
    pub info: BTreeMap<String, Vec<String>>,
}

impl From<Book> for BookDto {
    fn from(b: Book) -> Self {
        BookDto {
            info: b
                .info
                .iter()
                .map(|(k, v)| (k.clone(), v.as_strings()))
                .collect(),
            id: b.id,
            title: b.title,
            author: b.author,
            year: b.year,
            language: b.language,
            format: b.format,
            size: b.size,
            preview: b.preview,
            publisher: b.publisher,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct DownloadRequestDto {
    /// Book identifier
    pub id: String,
    /// Lower is sooner; omitted means the service default
    pub priority: Option<i64>,
}

#[derive(Debug, Clone, Object)]
pub struct AcceptedDto {
    pub book_id: String,
}

#[derive(Debug, Clone, Object)]
pub struct ActionResultDto {
    /// Whether the service accepted the action; the view was refreshed either way
    pub accepted: bool,
}

#[derive(Debug, Clone, Object)]
pub struct NegotiationDto {
    pub book_id: String,
    /// idle | requested | conflicted | resolved
    pub state: String,
    pub force: bool,
    pub reason: Option<String>,
    /// queued | saved | rejected | failed, once resolved
    pub outcome: Option<String>,
}

impl NegotiationDto {
    pub fn new(book_id: String, state: &NegotiationState) -> Self {
        let (name, force, reason, outcome) = match state {
            NegotiationState::Idle => ("idle", false, None, None),
            NegotiationState::Requested { request } => ("requested", request.force, None, None),
            NegotiationState::Conflicted { request, record } => (
                "conflicted",
                request.force,
                Some(record.reason.as_str().to_string()),
                None,
            ),
            NegotiationState::Resolved { outcome } => {
                let o = match outcome {
                    Outcome::Queued { .. } => "queued",
                    Outcome::Saved { .. } => "saved",
                    Outcome::Rejected { .. } => "rejected",
                    Outcome::Failed { .. } => "failed",
                };
                ("resolved", false, None, Some(o.to_string()))
            }
        };
        NegotiationDto {
            book_id,
            state: name.to_string(),
            force,
            reason,
            outcome,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct StatusRowDto {
    pub id: String,
    pub title: String,
    /// Rounded, 0-100
    pub progress: Option<u8>,
    pub raw_progress: Option<f64>,
    pub download_path: Option<String>,
}

impl From<StatusRow> for StatusRowDto {
    fn from(r: StatusRow) -> Self {
        StatusRowDto {
            id: r.id,
            title: r.title,
            progress: r.progress,
            raw_progress: r.raw_progress,
            download_path: r.download_path,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct CategoryDto {
    pub name: String,
    pub rows: Vec<StatusRowDto>,
}

impl From<CategoryView> for CategoryDto {
    fn from(c: CategoryView) -> Self {
        CategoryDto {
            name: c.name,
            rows: c.rows.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct StatusViewDto {
    pub categories: Vec<CategoryDto>,
    pub downloading: Vec<StatusRowDto>,
    /// From the active-downloads endpoint, independent of `downloading`
    pub active_count: Option<u64>,
    pub active_count_agrees: Option<bool>,
    pub snapshot_fetched_at: Option<DateTime<Utc>>,
    pub active_fetched_at: Option<DateTime<Utc>>,
    /// True when the last refresh failed and this is the previous snapshot
    pub stale: bool,
}

impl From<StatusView> for StatusViewDto {
    fn from(v: StatusView) -> Self {
        StatusViewDto {
            active_count_agrees: v.active_count_agrees(),
            categories: v.categories.into_iter().map(Into::into).collect(),
            downloading: v.downloading.into_iter().map(Into::into).collect(),
            active_count: v.active_count.map(|c| c as u64),
            snapshot_fetched_at: v.snapshot_fetched_at,
            active_fetched_at: v.active_fetched_at,
            stale: v.stale,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct DuplicateDto {
    pub id: String,
    pub title: Option<String>,
    pub reason: String,
    pub detected_at: Option<DateTime<Utc>>,
    pub ingest_path: Option<String>,
    pub existing_path: Option<String>,
    pub priority: Option<i64>,
}

impl From<DuplicateRecord> for DuplicateDto {
    fn from(r: DuplicateRecord) -> Self {
        DuplicateDto {
            title: r.title().map(str::to_string),
            reason: r.reason.as_str().to_string(),
            id: r.id,
            detected_at: r.detected_at,
            ingest_path: r.ingest_path,
            existing_path: r.existing_path,
            priority: r.priority,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct ConflictDto {
    pub book_id: String,
    pub title: Option<String>,
    pub reason: String,
    pub existing_path: Option<String>,
    pub priority: Option<i64>,
    /// Whether the conflicted request was already a forced one
    pub forced: bool,
    pub since: DateTime<Utc>,
}

impl From<PendingConflict> for ConflictDto {
    fn from(p: PendingConflict) -> Self {
        ConflictDto {
            title: p.record.title().map(str::to_string),
            reason: p.record.reason.as_str().to_string(),
            existing_path: p.record.existing_path,
            book_id: p.request.book_id,
            priority: p.request.priority,
            forced: p.request.force,
            since: p.since,
        }
    }
}

#[derive(Debug, Clone, Copy, Enum)]
#[oai(rename_all = "snake_case")]
pub enum ConflictActionDto {
    Force,
    Save,
}

impl From<ConflictActionDto> for Resolution {
    fn from(a: ConflictActionDto) -> Self {
        match a {
            ConflictActionDto::Force => Resolution::Force,
            ConflictActionDto::Save => Resolution::Save,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct ConflictAnswerDto {
    pub action: ConflictActionDto,
}

#[derive(Debug, Clone, Object)]
pub struct GroupFileDto {
    pub name: String,
    pub relative_path: String,
    pub size: u64,
    pub modified: Option<String>,
}

#[derive(Debug, Clone, Object)]
pub struct GroupDto {
    pub id: String,
    /// hash | name
    pub kind: String,
    pub key: String,
    pub reviewed: bool,
    pub reviewed_at: Option<String>,
    pub files: Vec<GroupFileDto>,
}

impl From<DuplicateGroup> for GroupDto {
    fn from(g: DuplicateGroup) -> Self {
        GroupDto {
            id: g.id,
            kind: match g.kind {
                GroupKind::Hash => "hash".to_string(),
                GroupKind::Name => "name".to_string(),
                GroupKind::Other(s) => s,
            },
            key: g.key,
            reviewed: g.reviewed,
            reviewed_at: g.reviewed_at,
            files: g
                .files
                .into_iter()
                .map(|f| GroupFileDto {
                    name: f.name,
                    relative_path: f.relative_path,
                    size: f.size,
                    modified: f.modified,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Enum)]
#[oai(rename_all = "snake_case")]
pub enum GroupActionDto {
    MarkReviewed,
    ClearReviewed,
}

impl From<GroupActionDto> for GroupAction {
    fn from(a: GroupActionDto) -> Self {
        match a {
            GroupActionDto::MarkReviewed => GroupAction::MarkReviewed,
            GroupActionDto::ClearReviewed => GroupAction::ClearReviewed,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct GroupUpdateDto {
    pub action: GroupActionDto,
    pub group_id: String,
}

#[derive(Debug, Clone, Object)]
pub struct PriorityDto {
    pub priority: i64,
}

#[derive(Debug, Clone, Object)]
pub struct ReorderDto {
    /// Book id -> new priority
    pub book_priorities: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Object)]
pub struct QueueOrderDto {
    pub id: String,
    pub title: Option<String>,
    pub priority: i64,
    pub position: Option<i64>,
    pub status: Option<String>,
}

impl From<QueueOrderEntry> for QueueOrderDto {
    fn from(e: QueueOrderEntry) -> Self {
        QueueOrderDto {
            id: e.id,
            title: e.title,
            priority: e.priority,
            position: e.position,
            status: e.status,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct NoticeDto {
    pub at: DateTime<Utc>,
    pub slice: String,
    pub message: String,
}

impl From<&Notice> for NoticeDto {
    fn from(n: &Notice) -> Self {
        NoticeDto {
            at: n.at,
            slice: serde_json::to_value(n.slice)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            message: n.message.clone(),
        }
    }
}

#[derive(ApiResponse)]
pub enum SearchResponse {
    /// Matching books; empty when no criteria were given
    #[oai(status = 200)]
    Ok(Json<Vec<BookDto>>),

    /// Upstream service error
    #[oai(status = 502)]
    BadGateway(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum BookResponse {
    #[oai(status = 200)]
    Ok(Json<BookDto>),

    #[oai(status = 404)]
    NotFound(Json<ErrorDto>),

    /// Upstream service error
    #[oai(status = 502)]
    BadGateway(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum DownloadStartResponse {
    /// Negotiation started; follow it via /v1/negotiations and /v1/conflicts
    #[oai(status = 202)]
    Accepted(Json<AcceptedDto>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorDto>),

    /// A request for this book is still being negotiated
    #[oai(status = 409)]
    Conflict(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum ActionResponse {
    #[oai(status = 200)]
    Ok(Json<ActionResultDto>),

    #[oai(status = 404)]
    NotFound(Json<ErrorDto>),

    /// A request for this book is still being negotiated
    #[oai(status = 409)]
    Conflict(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum NegotiationsResponse {
    #[oai(status = 200)]
    Ok(Json<Vec<NegotiationDto>>),
}

#[derive(ApiResponse)]
pub enum ConflictsResponse {
    #[oai(status = 200)]
    Ok(Json<Vec<ConflictDto>>),
}

#[derive(ApiResponse)]
pub enum StatusViewResponse {
    #[oai(status = 200)]
    Ok(Json<StatusViewDto>),
}

#[derive(ApiResponse)]
pub enum NoticesResponse {
    #[oai(status = 200)]
    Ok(Json<Vec<NoticeDto>>),
}

#[derive(ApiResponse)]
pub enum QueueOrderResponse {
    #[oai(status = 200)]
    Ok(Json<Vec<QueueOrderDto>>),

    /// Upstream service error
    #[oai(status = 502)]
    BadGateway(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum DuplicatesResponse {
    /// Latest full list; the previous one if the refresh failed
    #[oai(status = 200)]
    Ok(Json<Vec<DuplicateDto>>),

    /// Upstream service error and nothing held yet
    #[oai(status = 502)]
    BadGateway(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum GroupsResponse {
    #[oai(status = 200)]
    Ok(Json<Vec<GroupDto>>),

    /// Upstream service error and nothing held yet
    #[oai(status = 502)]
    BadGateway(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum FileResponse {
    #[oai(status = 200)]
    Ok(
        Binary<Vec<u8>>,
        #[oai(header = "Content-Disposition")] String,
        #[oai(header = "Content-Type")] String,
    ),

    #[oai(status = 404)]
    NotFound(Json<ErrorDto>),

    /// Upstream service error
    #[oai(status = 502)]
    BadGateway(Json<ErrorDto>),
}
