use poem_openapi::payload::PlainText;

use crate::catalog_client::{CatalogClient, Reply};

pub struct HealthService<'a> {
    pub client: &'a CatalogClient,
}

impl<'a> HealthService<'a> {
    pub fn new(client: &'a CatalogClient) -> Self {
        Self { client }
    }

    /// Version plus whether the remote service answers its status endpoint.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn status_text(&self) -> PlainText<String> {
        let version = env!("CARGO_PKG_VERSION");
        let remote = match self.client.active_downloads().await {
            Ok(Reply::Ok(a)) => format!("reachable, {} active", a.active_downloads.len()),
            Ok(Reply::Rejected(r)) => format!("rejected ({}): {}", r.status, r.error),
            Err(e) => format!("unreachable: {}", e),
        };
        PlainText(format!(
            "book_dl_client={} service={} remote={}",
            version,
            self.client.base_url(),
            remote
        ))
    }
}
