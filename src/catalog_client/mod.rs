// Typed gateway to the remote catalog/download service

pub mod models;

use std::{collections::BTreeMap, time::Duration};

use serde::de::DeserializeOwned;
use thiserror::Error;

pub use models::*;
use models::{
    ConflictBody, DuplicatesResponse, ErrorBody, GroupUpdateBody, GroupsResponse, PriorityBody,
    ReorderBody,
};

/// Failures where no usable answer came back from the service.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed response from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A structured non-2xx answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: u16,
    pub error: String,
}

impl Rejection {
    fn from_body(status: reqwest::StatusCode, body: &str) -> Self {
        let error = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error.or(b.message))
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| snippet(trimmed, 200).to_string())
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            });
        Rejection {
            status: status.as_u16(),
            error,
        }
    }
}

/// Outcome of a call that reached the service. Remote-declared errors are
/// values so callers can branch on them without unwinding.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    Ok(T),
    Rejected(Rejection),
}

impl<T> Reply<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Reply::Ok(v) => Some(v),
            Reply::Rejected(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        match self {
            Reply::Ok(v) => Reply::Ok(f(v)),
            Reply::Rejected(r) => Reply::Rejected(r),
        }
    }
}

pub type GatewayResult<T> = Result<Reply<T>, GatewayError>;

/// What the download endpoint said about a queue attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueReply {
    Accepted(Ack),
    Conflict(DuplicateRecord),
}

fn snippet(body: &str, max: usize) -> &str {
    if body.len() <= max {
        return body;
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[derive(Clone, Debug)]
pub struct CatalogClient {
    base_url: String,
    client: reqwest::Client,
}

impl CatalogClient {
    /// Create a new client with the given base URL (e.g. "http://localhost:8084").
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_connect_timeout(base_url, None)
    }

    pub fn with_connect_timeout(
        base_url: impl Into<String>,
        connect_timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = connect_timeout {
            builder = builder.connect_timeout(t);
        }
        let client = builder.build()?;
        let base_url_str = base_url.into();
        tracing::debug!(base_url = %base_url_str, "creating CatalogClient");
        Ok(CatalogClient {
            base_url: base_url_str.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn send(
        &self,
        url: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<(reqwest::StatusCode, String), GatewayError> {
        let transport = |source| GatewayError::Transport {
            url: url.to_string(),
            source,
        };
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        let body = resp.text().await.map_err(transport)?;
        Ok((status, body))
    }

    fn parse<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, GatewayError> {
        serde_json::from_str::<T>(body).map_err(|e| {
            let snippet = snippet(body, 2000);
            tracing::error!(error = %e, %url, body_snippet = %snippet, "failed to parse response");
            GatewayError::Malformed {
                url: url.to_string(),
                source: e,
            }
        })
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        req: reqwest::RequestBuilder,
    ) -> GatewayResult<T> {
        let (status, body) = self.send(url, req).await?;
        if !status.is_success() {
            return Ok(Reply::Rejected(Rejection::from_body(status, &body)));
        }
        Self::parse(url, &body).map(Reply::Ok)
    }

    /// Like `fetch_json`, but an empty or non-object success body still counts as an ack.
    async fn fetch_ack(&self, url: &str, req: reqwest::RequestBuilder) -> GatewayResult<Ack> {
        let (status, body) = self.send(url, req).await?;
        if !status.is_success() {
            return Ok(Reply::Rejected(Rejection::from_body(status, &body)));
        }
        Ok(Reply::Ok(serde_json::from_str::<Ack>(&body).unwrap_or_default()))
    }

    async fn fetch_bytes(&self, url: &str, req: reqwest::RequestBuilder) -> GatewayResult<Vec<u8>> {
        let transport = |source| GatewayError::Transport {
            url: url.to_string(),
            source,
        };
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.map_err(transport)?;
            return Ok(Reply::Rejected(Rejection::from_body(status, &body)));
        }
        let bytes = resp.bytes().await.map_err(transport)?;
        Ok(Reply::Ok(bytes.to_vec()))
    }

    /// GET /api/search
    /// No criteria means no request: the answer is an empty list.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn search(&self, filters: &SearchFilters) -> GatewayResult<Vec<Book>> {
        if filters.is_empty() {
            tracing::debug!("empty search criteria, skipping request");
            return Ok(Reply::Ok(Vec::new()));
        }
        let url = self.url("/api/search");
        let q = filters.to_query_pairs();
        tracing::debug!(%url, params = q.len(), "GET search");
        self.fetch_json(&url, self.client.get(&url).query(&q)).await
    }

    /// GET /api/info?id=
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn info(&self, book_id: &str) -> GatewayResult<Book> {
        let url = self.url("/api/info");
        tracing::debug!(%url, %book_id, "GET info");
        self.fetch_json(&url, self.client.get(&url).query(&[("id", book_id)]))
            .await
    }

    /// GET /api/download?id=&priority=&force=
    /// A 409 carrying a duplicate record is a conflict, not a rejection.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn download(&self, request: &DownloadRequest) -> GatewayResult<QueueReply> {
        let url = self.url("/api/download");
        tracing::debug!(%url, book_id = %request.book_id, priority = ?request.priority, force = request.force, "GET download");
        let req = self.client.get(&url).query(&request.to_query_pairs());
        let (status, body) = self.send(&url, req).await?;
        if status == reqwest::StatusCode::CONFLICT {
            if let Ok(conflict) = serde_json::from_str::<ConflictBody>(&body) {
                tracing::debug!(book_id = %request.book_id, reason = conflict.duplicate.reason.as_str(), "download conflicted");
                return Ok(Reply::Ok(QueueReply::Conflict(conflict.duplicate)));
            }
        }
        if !status.is_success() {
            return Ok(Reply::Rejected(Rejection::from_body(status, &body)));
        }
        Ok(Reply::Ok(QueueReply::Accepted(
            serde_json::from_str::<Ack>(&body).unwrap_or_default(),
        )))
    }

    /// DELETE /api/download/{id}/cancel
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn cancel(&self, book_id: &str) -> GatewayResult<Ack> {
        let url = self.url(&format!("/api/download/{}/cancel", book_id));
        tracing::debug!(%url, "DELETE cancel");
        self.fetch_ack(&url, self.client.delete(&url)).await
    }

    /// DELETE /api/queue/clear
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn clear_completed(&self) -> GatewayResult<Ack> {
        let url = self.url("/api/queue/clear");
        tracing::debug!(%url, "DELETE clear completed");
        self.fetch_ack(&url, self.client.delete(&url)).await
    }

    /// GET /api/status
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn status(&self) -> GatewayResult<StatusSnapshot> {
        let url = self.url("/api/status");
        tracing::debug!(%url, "GET status");
        self.fetch_json(&url, self.client.get(&url)).await
    }

    /// GET /api/downloads/active
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn active_downloads(&self) -> GatewayResult<ActiveDownloads> {
        let url = self.url("/api/downloads/active");
        tracing::debug!(%url, "GET active downloads");
        self.fetch_json(&url, self.client.get(&url)).await
    }

    /// GET /api/queue/order
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn queue_order(&self) -> GatewayResult<Vec<QueueOrderEntry>> {
        let url = self.url("/api/queue/order");
        tracing::debug!(%url, "GET queue order");
        self.fetch_json(&url, self.client.get(&url)).await
    }

    /// PUT /api/queue/{id}/priority
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn set_priority(&self, book_id: &str, priority: i64) -> GatewayResult<Ack> {
        let url = self.url(&format!("/api/queue/{}/priority", book_id));
        tracing::debug!(%url, priority, "PUT priority");
        self.fetch_ack(&url, self.client.put(&url).json(&PriorityBody { priority }))
            .await
    }

    /// POST /api/queue/reorder
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn reorder(&self, book_priorities: &BTreeMap<String, i64>) -> GatewayResult<Ack> {
        let url = self.url("/api/queue/reorder");
        tracing::debug!(%url, books = book_priorities.len(), "POST reorder");
        self.fetch_ack(
            &url,
            self.client.post(&url).json(&ReorderBody { book_priorities }),
        )
        .await
    }

    /// GET /api/localdownload?id=
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn local_download(&self, book_id: &str) -> GatewayResult<Vec<u8>> {
        let url = self.url("/api/localdownload");
        tracing::debug!(%url, %book_id, "GET local download");
        self.fetch_bytes(&url, self.client.get(&url).query(&[("id", book_id)]))
            .await
    }

    /// GET /api/duplicates
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn duplicates(&self) -> GatewayResult<Vec<DuplicateRecord>> {
        let url = self.url("/api/duplicates");
        tracing::debug!(%url, "GET duplicates");
        let reply: Reply<DuplicatesResponse> = self.fetch_json(&url, self.client.get(&url)).await?;
        Ok(reply.map(|r| r.duplicates))
    }

    /// DELETE /api/duplicates/{id}, with `force=true` to queue the book anyway.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn remove_duplicate(&self, record_id: &str, force: bool) -> GatewayResult<Ack> {
        let url = self.url(&format!("/api/duplicates/{}", record_id));
        tracing::debug!(%url, force, "DELETE duplicate");
        let mut req = self.client.delete(&url);
        if force {
            req = req.query(&[("force", "true")]);
        }
        self.fetch_ack(&url, req).await
    }

    /// GET /api/duplicates/groups
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn duplicate_groups(&self) -> GatewayResult<Vec<DuplicateGroup>> {
        let url = self.url("/api/duplicates/groups");
        tracing::debug!(%url, "GET duplicate groups");
        let reply: Reply<GroupsResponse> = self.fetch_json(&url, self.client.get(&url)).await?;
        Ok(reply.map(|r| r.groups))
    }

    /// POST /api/duplicates/groups
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn update_group(&self, action: GroupAction, group_id: &str) -> GatewayResult<Ack> {
        let url = self.url("/api/duplicates/groups");
        tracing::debug!(%url, ?action, %group_id, "POST duplicate group");
        self.fetch_ack(
            &url,
            self.client
                .post(&url)
                .json(&GroupUpdateBody { action, group_id }),
        )
        .await
    }

    /// GET /api/duplicates/file?path=&inline=1
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn duplicate_file(&self, relative_path: &str, inline: bool) -> GatewayResult<Vec<u8>> {
        let url = self.url("/api/duplicates/file");
        tracing::debug!(%url, %relative_path, inline, "GET duplicate file");
        let mut q = vec![("path", relative_path.to_string())];
        if inline {
            q.push(("inline", "1".to_string()));
        }
        self.fetch_bytes(&url, self.client.get(&url).query(&q)).await
    }
}

/// Internal serde helpers
pub mod de {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    /// Accept Option<f64> from either a number or a numeric string; null/"" -> None.
    pub fn opt_f64_from_str_or_num<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum NumOrStr {
            Num(f64),
            Str(String),
        }

        let val: Option<NumOrStr> = Option::deserialize(deserializer)?;
        Ok(match val {
            None => None,
            Some(NumOrStr::Num(n)) => Some(n),
            Some(NumOrStr::Str(s)) => s.trim().parse::<f64>().ok(),
        })
    }

    /// Accept a timestamp as RFC 3339, naive ISO 8601 (taken as UTC) or epoch
    /// seconds. Anything unreadable becomes None instead of failing the record.
    pub fn opt_datetime_lenient<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val: Option<serde_json::Value> = Option::deserialize(deserializer)?;
        Ok(match val {
            Some(serde_json::Value::String(s)) => parse_timestamp(s.trim()),
            Some(serde_json::Value::Number(n)) => match n.as_i64() {
                Some(secs) => DateTime::from_timestamp(secs, 0),
                None => n.as_f64().filter(|f| f.is_finite()).and_then(|f| {
                    let secs = f.trunc();
                    let nanos = ((f - secs) * 1e9).round() as u32;
                    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
                }),
            },
            _ => None,
        })
    }

    fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    /// Accept Option<String> from a string or a number (years come both ways).
    pub fn opt_string_from_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum NumOrStr {
            Int(i64),
            Num(f64),
            Str(String),
        }

        let val: Option<NumOrStr> = Option::deserialize(deserializer)?;
        Ok(match val {
            None => None,
            Some(NumOrStr::Int(n)) => Some(n.to_string()),
            Some(NumOrStr::Num(n)) => Some(n.to_string()),
            Some(NumOrStr::Str(s)) if s.trim().is_empty() => None,
            Some(NumOrStr::Str(s)) => Some(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn url_joins_without_double_slash() {
        let c = CatalogClient::new("http://localhost:8084/").unwrap();
        assert_eq!(c.url("/api/status"), "http://localhost:8084/api/status");
        assert_eq!(c.url("api/status"), "http://localhost:8084/api/status");
    }

    #[test]
    fn search_filters_drop_blanks_and_repeat_format() {
        let filters = SearchFilters {
            query: Some("dune".into()),
            author: Some("  ".into()),
            formats: vec!["epub".into(), "".into(), "pdf".into()],
            ..Default::default()
        };
        assert_eq!(
            filters.to_query_pairs(),
            vec![
                ("query", "dune".to_string()),
                ("format", "epub".to_string()),
                ("format", "pdf".to_string()),
            ]
        );
        assert!(!filters.is_empty());
        let sort_only = SearchFilters {
            sort: Some("newest".into()),
            ..Default::default()
        };
        assert!(sort_only.is_empty());
    }

    #[test]
    fn download_request_query_omits_defaults() {
        let req = DownloadRequest::new("b1", None);
        assert_eq!(req.to_query_pairs(), vec![("id", "b1".to_string())]);
        let forced = DownloadRequest::new("b1", Some(3)).forced();
        assert_eq!(
            forced.to_query_pairs(),
            vec![
                ("id", "b1".to_string()),
                ("priority", "3".to_string()),
                ("force", "true".to_string()),
            ]
        );
    }

    #[test]
    fn book_deserialize_example() {
        let json = r#"{
            "id": "a1b2",
            "title": "Dune",
            "author": "Frank Herbert",
            "year": 1965,
            "language": "en",
            "format": "epub",
            "size": "1.2MB",
            "preview": "https://covers.example/a1b2.jpg",
            "info": { "ISBN": ["9780441013593", "0441013597"], "Pages": 612, "Publisher": "Ace" }
        }"#;
        let book: Book = serde_json::from_str(json).unwrap();
        assert_eq!(book.year.as_deref(), Some("1965"));
        assert_eq!(book.info["ISBN"].as_strings(), vec!["9780441013593", "0441013597"]);
        assert_eq!(book.info["Pages"].as_strings(), vec!["612"]);
        assert_eq!(book.info["Publisher"].as_strings(), vec!["Ace"]);
    }

    #[test]
    fn status_snapshot_deserialize_open_categories() {
        let json = r#"{
            "queued": { "b2": { "id": "b2", "title": "Queued Book", "priority": 1 } },
            "downloading": { "b1": { "id": "b1", "title": "Dune", "progress": "42.4" } },
            "available": {},
            "cancelled": { "b3": { "id": "b3", "title": "Gone", "status": "cancelled" } }
        }"#;
        let snap: StatusSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.categories.len(), 4);
        assert_eq!(snap.total(), 3);
        let (cat, entry) = snap.locate("b1").unwrap();
        assert_eq!(cat, "downloading");
        assert_eq!(entry.progress, Some(42.4));
        assert_eq!(snap.locate("b3").unwrap().1.extra["status"], "cancelled");
        assert_eq!(snap.downloading().count(), 1);
    }

    #[test]
    fn duplicate_reason_and_group_kind_keep_unknown_tags() {
        let r: DuplicateReason = serde_json::from_str(r#""same_hash""#).unwrap();
        assert_eq!(r, DuplicateReason::SameHash);
        let r: DuplicateReason = serde_json::from_str(r#""fuzzy""#).unwrap();
        assert_eq!(r.as_str(), "fuzzy");
        let k: GroupKind = serde_json::from_str(r#""stem""#).unwrap();
        assert_eq!(k, GroupKind::Name);
        assert_eq!(serde_json::to_string(&GroupKind::Hash).unwrap(), r#""hash""#);
    }

    #[tokio::test]
    async fn duplicates_accept_mixed_timestamp_formats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/duplicates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "duplicates": [
                    { "book_id": "D1", "reason": "same_hash", "detected_at": "2025-03-01T10:00:00Z" },
                    { "book_id": "D2", "reason": "same_title", "detected_at": "2025-03-01T10:00:00.123456" },
                    { "book_id": "D3", "reason": "on_disk", "detected_at": 1740823200 },
                    { "book_id": "D4", "reason": "queued", "detected_at": "yesterday" }
                ]
            })))
            .mount(&server)
            .await;

        let client = CatalogClient::new(server.uri()).unwrap();
        let records = client.duplicates().await.unwrap().ok().unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(
            records[0].detected_at.unwrap().to_rfc3339(),
            "2025-03-01T10:00:00+00:00"
        );
        let naive = records[1].detected_at.unwrap();
        assert_eq!(naive.timestamp(), 1740823200);
        assert_eq!(naive.timestamp_subsec_micros(), 123456);
        assert_eq!(records[2].detected_at.unwrap().timestamp(), 1740823200);
        assert!(records[3].detected_at.is_none());
    }

    #[tokio::test]
    async fn empty_search_makes_no_request() {
        let server = MockServer::start().await;
        let client = CatalogClient::new(server.uri()).unwrap();
        let reply = client.search(&SearchFilters::default()).await.unwrap();
        assert_eq!(reply, Reply::Ok(vec![]));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_sends_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search"))
            .and(query_param("query", "dune"))
            .and(query_param("lang", "en"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "a1", "title": "Dune", "format": "epub" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = CatalogClient::new(server.uri()).unwrap();
        let filters = SearchFilters {
            query: Some("dune".into()),
            lang: Some("en".into()),
            ..Default::default()
        };
        let books = client.search(&filters).await.unwrap().ok().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title.as_deref(), Some("Dune"));
    }

    #[tokio::test]
    async fn download_409_is_a_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/download"))
            .and(query_param("id", "b1"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "error": "Duplicate detected",
                "duplicate": {
                    "book_id": "b1",
                    "book_info": { "id": "b1", "title": "Dune" },
                    "reason": "on_disk",
                    "ingest_path": "/ingest/Dune.epub",
                    "existing_path": "/ingest/Dune.epub"
                }
            })))
            .mount(&server)
            .await;

        let client = CatalogClient::new(server.uri()).unwrap();
        let reply = client
            .download(&DownloadRequest::new("b1", None))
            .await
            .unwrap();
        match reply {
            Reply::Ok(QueueReply::Conflict(record)) => {
                assert_eq!(record.id, "b1");
                assert_eq!(record.reason, DuplicateReason::OnDisk);
                assert_eq!(record.title(), Some("Dune"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn download_error_body_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/download"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "Invalid priority value: must be an integer."
            })))
            .mount(&server)
            .await;

        let client = CatalogClient::new(server.uri()).unwrap();
        let reply = client
            .download(&DownloadRequest::new("b1", Some(2)))
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Rejected(Rejection {
                status: 400,
                error: "Invalid priority value: must be an integer.".into()
            })
        );
    }

    #[tokio::test]
    async fn malformed_status_is_gateway_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = CatalogClient::new(server.uri()).unwrap();
        let err = client.status().await.unwrap_err();
        assert!(matches!(err, GatewayError::Malformed { .. }));
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_error() {
        // Nothing listens on port 9 of localhost in the test environment.
        let client = CatalogClient::new("http://127.0.0.1:9").unwrap();
        let err = client.active_downloads().await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport { .. }));
    }

    #[tokio::test]
    async fn remove_duplicate_passes_force_flag() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/duplicates/D1"))
            .and(query_param("force", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "queued"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = CatalogClient::new(server.uri()).unwrap();
        let ack = client.remove_duplicate("D1", true).await.unwrap().ok().unwrap();
        assert_eq!(ack.status.as_deref(), Some("queued"));
    }

    #[tokio::test]
    async fn update_group_posts_action_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/duplicates/groups"))
            .and(body_json(serde_json::json!({"action": "mark_reviewed", "group_id": "hash:abc"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = CatalogClient::new(server.uri()).unwrap();
        let reply = client
            .update_group(GroupAction::MarkReviewed, "hash:abc")
            .await
            .unwrap();
        assert_eq!(reply, Reply::Ok(Ack::default()));
    }

    #[tokio::test]
    async fn duplicate_file_returns_raw_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/duplicates/file"))
            .and(query_param("path", "a/Dune.epub"))
            .and(query_param("inline", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
            .mount(&server)
            .await;

        let client = CatalogClient::new(server.uri()).unwrap();
        let bytes = client
            .duplicate_file("a/Dune.epub", true)
            .await
            .unwrap()
            .ok()
            .unwrap();
        assert_eq!(bytes, b"PK\x03\x04".to_vec());
    }
}
