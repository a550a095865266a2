// Status reconciliation: full snapshots replace the held view, failures keep it

use std::sync::Arc;

use super::{
    events::{ClientEvent, EventSink, Slice},
    mapping::map_status_view,
    models::StatusView,
    view::{Stamped, ViewHandle},
};
use crate::catalog_client::{CatalogClient, Reply};

#[derive(Clone)]
pub struct StatusReconciler {
    client: Arc<CatalogClient>,
    view: ViewHandle,
    events: Arc<dyn EventSink>,
}

impl StatusReconciler {
    pub fn new(client: Arc<CatalogClient>, view: ViewHandle, events: Arc<dyn EventSink>) -> Self {
        Self {
            client,
            view,
            events,
        }
    }

    /// Fetch the full snapshot and replace the held one. On failure the held
    /// snapshot stays, marked stale. Returns whether the slice was replaced.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn fetch(&self) -> bool {
        let failure = match self.client.status().await {
            Ok(Reply::Ok(snapshot)) => {
                let count = snapshot.total();
                {
                    let mut view = self.view.write().await;
                    view.status = Some(Stamped::now(snapshot));
                    view.status_stale = false;
                }
                self.events.emit(ClientEvent::Refreshed {
                    slice: Slice::Status,
                    count,
                });
                return true;
            }
            Ok(Reply::Rejected(r)) => format!("status rejected ({}): {}", r.status, r.error),
            Err(e) => e.to_string(),
        };
        tracing::warn!(error = %failure, "status refresh failed, keeping previous snapshot");
        {
            let mut view = self.view.write().await;
            view.status_stale = true;
            view.push_notice(Slice::Status, failure.clone());
        }
        self.events.emit(ClientEvent::RefreshFailed {
            slice: Slice::Status,
            message: failure,
        });
        false
    }

    /// Fetch the active-download list from its own endpoint. Independent of
    /// the snapshot on purpose: the service reports it separately.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn fetch_active(&self) -> bool {
        let failure = match self.client.active_downloads().await {
            Ok(Reply::Ok(active)) => {
                let count = active.active_downloads.len();
                self.view.write().await.active = Some(Stamped::now(active.active_downloads));
                self.events.emit(ClientEvent::Refreshed {
                    slice: Slice::ActiveDownloads,
                    count,
                });
                return true;
            }
            Ok(Reply::Rejected(r)) => {
                format!("active downloads rejected ({}): {}", r.status, r.error)
            }
            Err(e) => e.to_string(),
        };
        tracing::warn!(error = %failure, "active downloads refresh failed");
        self.view
            .write()
            .await
            .push_notice(Slice::ActiveDownloads, failure.clone());
        self.events.emit(ClientEvent::RefreshFailed {
            slice: Slice::ActiveDownloads,
            message: failure,
        });
        false
    }

    /// Refresh both signals concurrently and return the derived view.
    pub async fn refresh(&self) -> StatusView {
        tokio::join!(self.fetch(), self.fetch_active());
        self.current().await
    }

    /// Derived view of whatever is currently held, without fetching.
    pub async fn current(&self) -> StatusView {
        map_status_view(&*self.view.read().await)
    }
}
