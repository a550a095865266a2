use poem_openapi::payload::Json;

use crate::{
    domain::Orchestrator,
    local_api::models::{NoticeDto, NoticesResponse, StatusViewDto, StatusViewResponse},
};

pub struct StatusService<'a> {
    pub orchestrator: &'a Orchestrator,
}

impl<'a> StatusService<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Whatever is held right now; no request goes out.
    pub async fn current(&self) -> StatusViewResponse {
        let view = self.orchestrator.status.current().await;
        StatusViewResponse::Ok(Json(StatusViewDto::from(view)))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn refresh(&self) -> StatusViewResponse {
        let view = self.orchestrator.status.refresh().await;
        StatusViewResponse::Ok(Json(StatusViewDto::from(view)))
    }

    pub async fn notices(&self) -> NoticesResponse {
        let view = self.orchestrator.view.read().await;
        NoticesResponse::Ok(Json(view.notices().map(NoticeDto::from).collect()))
    }
}
