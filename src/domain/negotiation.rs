//! Duplicate conflict negotiation.
//!
//! Every queue attempt runs through a small state machine:
//!
//! ```text
//! Idle -> Requested -> Resolved(Queued | Rejected | Failed)
//!              |
//!              +-> Conflicted --force--> Requested (force = true)
//!                        |
//!                        +--save--> Resolved(Saved)
//! ```
//!
//! The decision in `Conflicted` is delegated to a [`ConflictResolver`], so the
//! protocol does not care whether the answer comes from a button, a CLI
//! prompt or a test script. At most one negotiation may be open per book.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use serde::Serialize;
use thiserror::Error;

use super::events::{ClientEvent, EventSink};
use crate::catalog_client::{
    Ack, CatalogClient, DownloadRequest, DuplicateRecord, QueueReply, Reply,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("a download request for {0} is already in progress")]
    AlreadyInFlight(String),
}

/// The user's answer to a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Reissue the same request with the duplicate check overridden.
    Force,
    /// Leave the record in the duplicate registry and stop.
    Save,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Queued { forced: bool, ack: Ack },
    Saved { record: DuplicateRecord },
    /// `forced` is set when the failing request overrode the duplicate check,
    /// so the service may already have dropped the record.
    Rejected {
        status: u16,
        error: String,
        forced: bool,
    },
    Failed { message: String, forced: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NegotiationState {
    Idle,
    Requested { request: DownloadRequest },
    Conflicted {
        request: DownloadRequest,
        record: DuplicateRecord,
    },
    Resolved { outcome: Outcome },
}

#[async_trait::async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Decide what to do with a conflicted request. Called once per conflict.
    async fn resolve(&self, request: &DownloadRequest, record: &DuplicateRecord) -> Resolution;
}

/// Open negotiations keyed by book id. A book id present here has a
/// submission in flight and must not be submitted again.
#[derive(Clone, Default)]
pub struct BookLocks {
    open: Arc<Mutex<HashMap<String, NegotiationState>>>,
}

impl BookLocks {
    pub fn claim(&self, book_id: &str) -> Result<BookGuard, QueueError> {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if open.contains_key(book_id) {
            return Err(QueueError::AlreadyInFlight(book_id.to_string()));
        }
        open.insert(book_id.to_string(), NegotiationState::Idle);
        Ok(BookGuard {
            locks: self.clone(),
            book_id: book_id.to_string(),
        })
    }

    pub fn is_open(&self, book_id: &str) -> bool {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(book_id)
    }

    /// Current state of every open negotiation.
    pub fn snapshot(&self) -> Vec<(String, NegotiationState)> {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let mut states: Vec<_> = open.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    fn set(&self, book_id: &str, state: NegotiationState) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = open.get_mut(book_id) {
            *slot = state;
        }
    }

    fn release(&self, book_id: &str) {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(book_id);
    }
}

/// Holds a book's slot in [`BookLocks`]; dropping it reopens the book.
pub struct BookGuard {
    locks: BookLocks,
    book_id: String,
}

impl Drop for BookGuard {
    fn drop(&mut self) {
        self.locks.release(&self.book_id);
    }
}

#[derive(Clone)]
pub struct Negotiator {
    client: Arc<CatalogClient>,
    resolver: Arc<dyn ConflictResolver>,
    locks: BookLocks,
    events: Arc<dyn EventSink>,
}

impl Negotiator {
    pub fn new(
        client: Arc<CatalogClient>,
        resolver: Arc<dyn ConflictResolver>,
        locks: BookLocks,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            client,
            resolver,
            locks,
            events,
        }
    }

    pub fn locks(&self) -> &BookLocks {
        &self.locks
    }

    fn transition(&self, book_id: &str, state: NegotiationState) {
        self.locks.set(book_id, state.clone());
        self.events.emit(ClientEvent::Negotiation {
            book_id: book_id.to_string(),
            state,
        });
    }

    /// Run one negotiation to a terminal outcome.
    ///
    /// Fails only when another negotiation for the same book is still open.
    pub async fn negotiate(&self, request: DownloadRequest) -> Result<Outcome, QueueError> {
        let guard = self.locks.claim(&request.book_id)?;
        Ok(self.negotiate_claimed(guard, request).await)
    }

    /// Like [`Negotiator::negotiate`], for a caller that already holds the
    /// book's slot. The slot is released once the outcome is recorded.
    #[tracing::instrument(level = "debug", skip(self, guard), fields(book_id = %request.book_id))]
    pub async fn negotiate_claimed(&self, guard: BookGuard, request: DownloadRequest) -> Outcome {
        let book_id = request.book_id.clone();
        let mut request = request;

        let outcome = loop {
            self.transition(
                &book_id,
                NegotiationState::Requested {
                    request: request.clone(),
                },
            );
            match self.client.download(&request).await {
                Err(e) => {
                    tracing::warn!(error = %e, %book_id, "download request failed");
                    break Outcome::Failed {
                        message: e.to_string(),
                        forced: request.force,
                    };
                }
                Ok(Reply::Rejected(r)) => {
                    break Outcome::Rejected {
                        status: r.status,
                        error: r.error,
                        forced: request.force,
                    };
                }
                Ok(Reply::Ok(QueueReply::Accepted(ack))) => {
                    break Outcome::Queued {
                        forced: request.force,
                        ack,
                    };
                }
                Ok(Reply::Ok(QueueReply::Conflict(record))) => {
                    self.transition(
                        &book_id,
                        NegotiationState::Conflicted {
                            request: request.clone(),
                            record: record.clone(),
                        },
                    );
                    match self.resolver.resolve(&request, &record).await {
                        Resolution::Force => {
                            tracing::info!(%book_id, reason = record.reason.as_str(), "forcing duplicate download");
                            request = request.forced();
                        }
                        Resolution::Save => {
                            tracing::info!(%book_id, reason = record.reason.as_str(), "duplicate saved for review");
                            break Outcome::Saved { record };
                        }
                    }
                }
            }
        };

        self.transition(
            &book_id,
            NegotiationState::Resolved {
                outcome: outcome.clone(),
            },
        );
        drop(guard);
        outcome
    }
}
