// Client-side view state: one owner, shared by handle, last full fetch wins per slice

use std::{collections::VecDeque, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::events::Slice;
use crate::catalog_client::{DuplicateGroup, DuplicateRecord, StatusSnapshot};

const MAX_NOTICES: usize = 50;

/// A fetched value tagged with when it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stamped<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> Stamped<T> {
    pub fn now(value: T) -> Self {
        Stamped {
            value,
            fetched_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub at: DateTime<Utc>,
    pub slice: Slice,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ViewState {
    pub status: Option<Stamped<StatusSnapshot>>,
    /// Set when the last status refresh failed and `status` is older than it should be.
    pub status_stale: bool,
    pub active: Option<Stamped<Vec<String>>>,
    pub duplicates: Option<Stamped<Vec<DuplicateRecord>>>,
    pub groups: Option<Stamped<Vec<DuplicateGroup>>>,
    notices: VecDeque<Notice>,
}

impl ViewState {
    pub fn push_notice(&mut self, slice: Slice, message: impl Into<String>) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            at: Utc::now(),
            slice,
            message: message.into(),
        });
    }

    /// Most recent last.
    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }
}

pub type ViewHandle = Arc<RwLock<ViewState>>;

pub fn new_view() -> ViewHandle {
    Arc::new(RwLock::new(ViewState::default()))
}
