// Mapping from wire snapshots to display models

use super::models::{CategoryView, FileKind, StatusRow, StatusView};
use super::view::ViewState;
use crate::catalog_client::{StatusEntry, StatusSnapshot};

pub fn infer_file_kind_from_name(name: &str) -> FileKind {
    let lower = name.to_ascii_lowercase();
    match lower.rsplit_once('.').map(|(_, ext)| ext) {
        Some("epub") => FileKind::Epub,
        Some("pdf") => FileKind::Pdf,
        Some("mobi") => FileKind::Mobi,
        Some("azw3") => FileKind::Azw3,
        Some("fb2") => FileKind::Fb2,
        Some("djvu") => FileKind::Djvu,
        Some("cbz") => FileKind::Cbz,
        _ => FileKind::Unknown,
    }
}

/// Round and clamp a raw progress value for display. Non-finite values show nothing.
pub fn display_progress(raw: Option<f64>) -> Option<u8> {
    let raw = raw?;
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}

pub fn map_entry(book_id: &str, entry: &StatusEntry) -> StatusRow {
    StatusRow {
        id: if entry.id.is_empty() {
            book_id.to_string()
        } else {
            entry.id.clone()
        },
        title: entry.title.clone().unwrap_or_else(|| "Untitled".into()),
        progress: display_progress(entry.progress),
        raw_progress: entry.progress,
        download_path: entry.download_path.clone(),
    }
}

pub fn map_snapshot(snapshot: &StatusSnapshot) -> (Vec<CategoryView>, Vec<StatusRow>) {
    let categories = snapshot
        .categories
        .iter()
        .map(|(name, entries)| CategoryView {
            name: name.clone(),
            rows: entries.iter().map(|(id, e)| map_entry(id, e)).collect(),
        })
        .collect();
    let downloading = snapshot
        .category(StatusSnapshot::DOWNLOADING)
        .map(|entries| entries.iter().map(|(id, e)| map_entry(id, e)).collect())
        .unwrap_or_default();
    (categories, downloading)
}

pub fn map_status_view(view: &ViewState) -> StatusView {
    let (categories, downloading) = view
        .status
        .as_ref()
        .map(|s| map_snapshot(&s.value))
        .unwrap_or_default();
    StatusView {
        categories,
        downloading,
        active_count: view.active.as_ref().map(|a| a.value.len()),
        snapshot_fetched_at: view.status.as_ref().map(|s| s.fetched_at),
        active_fetched_at: view.active.as_ref().map(|a| a.fetched_at),
        stale: view.status_stale,
    }
}
