use poem_openapi::payload::Json;

use crate::{
    catalog_client::{Reply, SearchFilters},
    domain::Orchestrator,
    local_api::models::{BookDto, BookResponse, ErrorDto, SearchResponse},
};

pub struct CatalogService<'a> {
    pub orchestrator: &'a Orchestrator,
}

impl<'a> CatalogService<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn search(&self, filters: SearchFilters) -> SearchResponse {
        match self.orchestrator.search(&filters).await {
            Ok(Reply::Ok(books)) => {
                SearchResponse::Ok(Json(books.into_iter().map(BookDto::from).collect()))
            }
            Ok(Reply::Rejected(r)) => {
                tracing::warn!(status = r.status, error = %r.error, "search rejected");
                SearchResponse::BadGateway(Json(ErrorDto::from(r.error)))
            }
            Err(e) => {
                tracing::error!(error = %format!("{:?}", e), "search failed");
                SearchResponse::BadGateway(Json(ErrorDto {
                    message: format!("service error: {}", e),
                }))
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn info(&self, book_id: &str) -> BookResponse {
        match self.orchestrator.info(book_id).await {
            Ok(Reply::Ok(book)) => BookResponse::Ok(Json(book.into())),
            Ok(Reply::Rejected(r)) if r.status == 404 => {
                BookResponse::NotFound(Json(ErrorDto::from(r.error)))
            }
            Ok(Reply::Rejected(r)) => BookResponse::BadGateway(Json(ErrorDto::from(r.error))),
            Err(e) => {
                tracing::error!(error = %format!("{:?}", e), %book_id, "book info failed");
                BookResponse::BadGateway(Json(ErrorDto {
                    message: format!("service error: {}", e),
                }))
            }
        }
    }
}
