// Wire shapes of the remote catalog service

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Search criteria. Every field is optional; `format` may repeat on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub query: Option<String>,
    pub isbn: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub lang: Option<String>,
    pub sort: Option<String>,
    pub content: Option<String>,
    pub formats: Vec<String>,
}

impl SearchFilters {
    /// Query pairs with blank values dropped. An empty result means "no criteria".
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let scalars = [
            ("query", &self.query),
            ("isbn", &self.isbn),
            ("author", &self.author),
            ("title", &self.title),
            ("lang", &self.lang),
            ("sort", &self.sort),
            ("content", &self.content),
        ];
        let mut pairs: Vec<(&'static str, String)> = scalars
            .into_iter()
            .filter_map(|(k, v)| {
                let v = v.as_deref()?.trim();
                (!v.is_empty()).then(|| (k, v.to_string()))
            })
            .collect();
        pairs.extend(
            self.formats
                .iter()
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .map(|f| ("format", f.to_string())),
        );
        pairs
    }

    /// `sort` alone does not narrow a search, so it does not count as a criterion.
    pub fn is_empty(&self) -> bool {
        self.to_query_pairs().iter().all(|(k, _)| *k == "sort")
    }
}

/// A value in a book's `info` map: either a single scalar or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfoValue {
    Many(Vec<serde_json::Value>),
    One(serde_json::Value),
}

impl InfoValue {
    /// Flatten into display strings.
    pub fn as_strings(&self) -> Vec<String> {
        fn show(v: &serde_json::Value) -> String {
            match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        }
        match self {
            InfoValue::Many(values) => values.iter().map(show).collect(),
            InfoValue::One(value) => vec![show(value)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "crate::catalog_client::de::opt_string_from_any")]
    pub year: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    /// Human-readable size as the service renders it, e.g. "2.4MB"
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub info: BTreeMap<String, InfoValue>,
}

/// One attempt to queue a book. Rebuilt for every submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub book_id: String,
    pub priority: Option<i64>,
    pub force: bool,
}

impl DownloadRequest {
    pub fn new(book_id: impl Into<String>, priority: Option<i64>) -> Self {
        DownloadRequest {
            book_id: book_id.into(),
            priority,
            force: false,
        }
    }

    /// Same book and priority, with the duplicate check overridden.
    pub fn forced(&self) -> Self {
        DownloadRequest {
            force: true,
            ..self.clone()
        }
    }

    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut q = vec![("id", self.book_id.clone())];
        if let Some(p) = self.priority {
            q.push(("priority", p.to_string()));
        }
        if self.force {
            q.push(("force", "true".to_string()));
        }
        q
    }
}

/// Generic acknowledgement body. Shapes vary per endpoint, so only the
/// commonly present keys are typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DuplicateReason {
    Queued,
    Downloading,
    OnDisk,
    SameHash,
    SameTitle,
    Other(String),
}

impl From<String> for DuplicateReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "queued" => DuplicateReason::Queued,
            "downloading" => DuplicateReason::Downloading,
            "on_disk" => DuplicateReason::OnDisk,
            "same_hash" => DuplicateReason::SameHash,
            "same_title" => DuplicateReason::SameTitle,
            _ => DuplicateReason::Other(s),
        }
    }
}

impl From<DuplicateReason> for String {
    fn from(r: DuplicateReason) -> Self {
        r.as_str().to_string()
    }
}

impl DuplicateReason {
    pub fn as_str(&self) -> &str {
        match self {
            DuplicateReason::Queued => "queued",
            DuplicateReason::Downloading => "downloading",
            DuplicateReason::OnDisk => "on_disk",
            DuplicateReason::SameHash => "same_hash",
            DuplicateReason::SameTitle => "same_title",
            DuplicateReason::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateRecord {
    #[serde(rename = "book_id")]
    pub id: String,
    #[serde(rename = "book_info", default)]
    pub book: Option<Book>,
    pub reason: DuplicateReason,
    #[serde(default, deserialize_with = "crate::catalog_client::de::opt_datetime_lenient")]
    pub detected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ingest_path: Option<String>,
    #[serde(default)]
    pub existing_path: Option<String>,
    /// Queue status of the existing entry when the reason is `queued`
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
}

impl DuplicateRecord {
    pub fn title(&self) -> Option<&str> {
        self.book.as_ref().and_then(|b| b.title.as_deref())
    }
}

/// Body of a 409 from the download endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ConflictBody {
    pub duplicate: DuplicateRecord,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DuplicatesResponse {
    #[serde(default)]
    pub duplicates: Vec<DuplicateRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GroupKind {
    Hash,
    Name,
    Other(String),
}

impl From<String> for GroupKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "hash" => GroupKind::Hash,
            "name" | "stem" => GroupKind::Name,
            _ => GroupKind::Other(s),
        }
    }
}

impl From<GroupKind> for String {
    fn from(k: GroupKind) -> Self {
        match k {
            GroupKind::Hash => "hash".into(),
            GroupKind::Name => "name".into(),
            GroupKind::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupFile {
    pub name: String,
    pub relative_path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    pub key: String,
    #[serde(default)]
    pub reviewed: bool,
    #[serde(default)]
    pub reviewed_at: Option<String>,
    #[serde(default)]
    pub files: Vec<GroupFile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupsResponse {
    #[serde(default)]
    pub groups: Vec<DuplicateGroup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupAction {
    MarkReviewed,
    ClearReviewed,
}

#[derive(Debug, Serialize)]
pub(crate) struct GroupUpdateBody<'a> {
    pub action: GroupAction,
    pub group_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Falls back to the map key when absent
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Raw progress as reported, nominally 0-100
    #[serde(default, deserialize_with = "crate::catalog_client::de::opt_f64_from_str_or_num")]
    pub progress: Option<f64>,
    #[serde(default)]
    pub download_path: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Point-in-time read of the whole queue, keyed by category then book id.
/// Category names are open-ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot {
    pub categories: BTreeMap<String, BTreeMap<String, StatusEntry>>,
}

impl StatusSnapshot {
    pub const DOWNLOADING: &'static str = "downloading";

    pub fn category(&self, name: &str) -> Option<&BTreeMap<String, StatusEntry>> {
        self.categories.get(name)
    }

    pub fn downloading(&self) -> impl Iterator<Item = &StatusEntry> {
        self.category(Self::DOWNLOADING)
            .into_iter()
            .flat_map(|entries| entries.values())
    }

    /// Category a book currently sits in, if any.
    pub fn locate(&self, book_id: &str) -> Option<(&str, &StatusEntry)> {
        self.categories
            .iter()
            .find_map(|(name, entries)| entries.get(book_id).map(|e| (name.as_str(), e)))
    }

    pub fn total(&self) -> usize {
        self.categories.values().map(|c| c.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveDownloads {
    #[serde(default)]
    pub active_downloads: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueOrderEntry {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PriorityBody {
    pub priority: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReorderBody<'a> {
    pub book_priorities: &'a BTreeMap<String, i64>,
}

/// Structured error body on a non-2xx response.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
