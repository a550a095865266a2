use poem_openapi::payload::Json;

use super::downloads::file_response;
use crate::{
    catalog_client::GroupAction,
    domain::Orchestrator,
    local_api::models::{
        ActionResponse, ActionResultDto, DuplicateDto, DuplicatesResponse, ErrorDto,
        FileResponse, GroupDto, GroupsResponse,
    },
};

pub struct DuplicateService<'a> {
    pub orchestrator: &'a Orchestrator,
}

impl<'a> DuplicateService<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Fetch the full list; fall back to the held one if the fetch fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list(&self) -> DuplicatesResponse {
        let records = match self.orchestrator.duplicates.fetch_records().await {
            Some(records) => Some(records),
            None => self
                .orchestrator
                .view
                .read()
                .await
                .duplicates
                .as_ref()
                .map(|d| d.value.clone()),
        };
        match records {
            Some(records) => DuplicatesResponse::Ok(Json(
                records.into_iter().map(DuplicateDto::from).collect(),
            )),
            None => DuplicatesResponse::BadGateway(Json(ErrorDto {
                message: "duplicate list unavailable".to_string(),
            })),
        }
    }

    /// Dismiss (or, with `force`, queue anyway). `accepted` means the record is
    /// gone from the re-fetched list.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn remove(&self, record_id: &str, force: bool) -> ActionResponse {
        let registry = &self.orchestrator.duplicates;
        let after = if force {
            match registry.force(record_id).await {
                Ok(after) => after,
                Err(e) => return ActionResponse::Conflict(Json(ErrorDto::from(e.to_string()))),
            }
        } else {
            registry.dismiss(record_id).await
        };
        let gone = after
            .as_ref()
            .map(|records| records.iter().all(|r| r.id != record_id))
            .unwrap_or(false);
        ActionResponse::Ok(Json(ActionResultDto { accepted: gone }))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn groups(&self) -> GroupsResponse {
        let groups = match self.orchestrator.duplicates.fetch_groups().await {
            Some(groups) => Some(groups),
            None => self
                .orchestrator
                .view
                .read()
                .await
                .groups
                .as_ref()
                .map(|g| g.value.clone()),
        };
        match groups {
            Some(groups) => {
                GroupsResponse::Ok(Json(groups.into_iter().map(GroupDto::from).collect()))
            }
            None => GroupsResponse::BadGateway(Json(ErrorDto {
                message: "duplicate groups unavailable".to_string(),
            })),
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn update_group(&self, action: GroupAction, group_id: &str) -> GroupsResponse {
        match self.orchestrator.duplicates.update_group(action, group_id).await {
            Some(groups) => {
                GroupsResponse::Ok(Json(groups.into_iter().map(GroupDto::from).collect()))
            }
            None => GroupsResponse::BadGateway(Json(ErrorDto {
                message: "duplicate groups unavailable".to_string(),
            })),
        }
    }

    pub async fn file(&self, relative_path: &str, inline: bool) -> FileResponse {
        let name = relative_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(relative_path);
        file_response(
            self.orchestrator.duplicates.file(relative_path, inline).await,
            name,
            inline,
        )
    }
}
