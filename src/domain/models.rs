// Display-side models derived from the wire snapshots

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Epub,
    Pdf,
    Mobi,
    Azw3,
    Fb2,
    Djvu,
    Cbz,
    Unknown,
}

impl FileKind {
    pub fn mime(&self) -> &'static str {
        match self {
            FileKind::Epub => "application/epub+zip",
            FileKind::Pdf => "application/pdf",
            FileKind::Mobi | FileKind::Azw3 => "application/x-mobipocket-ebook",
            FileKind::Fb2 => "application/x-fictionbook+xml",
            FileKind::Djvu => "image/vnd.djvu",
            FileKind::Cbz => "application/vnd.comicbook+zip",
            FileKind::Unknown => "application/octet-stream",
        }
    }
}

/// One book in one category of a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRow {
    pub id: String,
    pub title: String,
    /// Rounded and clamped to 0-100
    pub progress: Option<u8>,
    /// As reported by the service
    pub raw_progress: Option<f64>,
    pub download_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryView {
    pub name: String,
    pub rows: Vec<StatusRow>,
}

/// Everything a renderer needs for the queue panel.
///
/// `downloading` comes from the snapshot, `active_count` from a separate
/// endpoint. They are fetched independently and may briefly disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub categories: Vec<CategoryView>,
    pub downloading: Vec<StatusRow>,
    pub active_count: Option<usize>,
    pub snapshot_fetched_at: Option<DateTime<Utc>>,
    pub active_fetched_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

impl StatusView {
    /// Whether the two independently sourced signals currently agree.
    /// `None` until both have been fetched at least once.
    pub fn active_count_agrees(&self) -> Option<bool> {
        let active = self.active_count?;
        self.snapshot_fetched_at?;
        Some(active == self.downloading.len())
    }

    pub fn category(&self, name: &str) -> Option<&CategoryView> {
        self.categories.iter().find(|c| c.name == name)
    }
}
