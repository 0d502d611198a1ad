//! Work instance handlers: listing, creation, step updates, approvals,
//! deliverable export.

use crate::api::context::tenant_context;
use crate::api::envelope::ApiResponse;
use crate::api::extract::ApiJson;
use crate::api::state::AppState;
use crate::error::ApiResult;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use trellis_engine::{DecisionRequest, DeliverableDocument, InstancePage, StepUpdate};
use trellis_types::{
    Approval, ProjectId, Step, StepId, TemplateVersionId, WorkInstance, WorkInstanceId,
};

/// Paging query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    25
}

/// `GET /projects/:project_id/work-instances`
pub async fn list_instances(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<ApiResponse<InstancePage>>> {
    let ctx = tenant_context(&headers)?;
    let page = state
        .engine
        .list_instances(&ctx, &ProjectId::new(project_id), query.page, query.per_page)
        .await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// Body for instance creation.
#[derive(Debug, Deserialize)]
pub struct CreateInstanceRequest {
    pub template_version_id: String,
}

/// `POST /projects/:project_id/work-instances`
pub async fn create_instance(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<CreateInstanceRequest>,
) -> ApiResult<Json<ApiResponse<WorkInstance>>> {
    let ctx = tenant_context(&headers)?;
    let instance = state
        .engine
        .create_instance(
            &ctx,
            ProjectId::new(project_id),
            &TemplateVersionId::new(body.template_version_id),
        )
        .await?;
    Ok(Json(ApiResponse::ok_with_message(
        instance,
        "instance created",
    )))
}

/// `PATCH /work-instances/:instance_id/steps/:step_id`
pub async fn update_step(
    State(state): State<AppState>,
    Path((instance_id, step_id)): Path<(String, String)>,
    headers: HeaderMap,
    ApiJson(update): ApiJson<StepUpdate>,
) -> ApiResult<Json<ApiResponse<Step>>> {
    let ctx = tenant_context(&headers)?;
    let step = state
        .engine
        .update_step(
            &ctx,
            &WorkInstanceId::new(instance_id),
            &StepId::new(step_id),
            update,
        )
        .await?;
    Ok(Json(ApiResponse::ok(step)))
}

/// `POST /work-instances/:instance_id/steps/:step_id/approval`
pub async fn decide_step(
    State(state): State<AppState>,
    Path((instance_id, step_id)): Path<(String, String)>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<DecisionRequest>,
) -> ApiResult<Json<ApiResponse<Approval>>> {
    let ctx = tenant_context(&headers)?;
    let approval = state
        .engine
        .decide(
            &ctx,
            &WorkInstanceId::new(instance_id),
            &StepId::new(step_id),
            request,
        )
        .await?;
    Ok(Json(ApiResponse::ok(approval)))
}

/// `GET /work-instances/:instance_id/export`
pub async fn export_deliverable(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ApiResponse<DeliverableDocument>>> {
    let ctx = tenant_context(&headers)?;
    let document = state
        .engine
        .export(&ctx, &WorkInstanceId::new(instance_id))
        .await?;
    Ok(Json(ApiResponse::ok(document)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::context::{ACTOR_HEADER, TENANT_HEADER};
    use crate::error::ApiError;
    use std::sync::Arc;
    use trellis_engine::Engine;
    use trellis_store::InMemoryTrellisStore;
    use trellis_types::{Decision, StepStatus};

    fn headers(tenant: &str, actor: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, tenant.parse().unwrap());
        headers.insert(ACTOR_HEADER, actor.parse().unwrap());
        headers
    }

    async fn seeded_state() -> (AppState, TemplateVersionId) {
        let engine = Engine::from_store(Arc::new(InMemoryTrellisStore::new()));
        let state = AppState::new(engine);

        let admin = crate::api::handlers::RegisterProjectRequest {
            project_id: "p1".to_string(),
        };
        crate::api::handlers::register_project(
            State(state.clone()),
            headers("t1", "admin"),
            ApiJson(admin),
        )
        .await
        .unwrap();

        let publish = crate::api::handlers::PublishTemplateRequest {
            name: "Site Inspection".to_string(),
            version: 1,
            steps: vec![crate::api::handlers::StepDeclaration {
                step_key: "s1".to_string(),
                name: "Checks".to_string(),
                fields: vec![crate::api::handlers::FieldDeclaration {
                    field_key: "qty".to_string(),
                    field_type: "number".to_string(),
                }],
            }],
        };
        let Json(response) = crate::api::handlers::publish_template(
            State(state.clone()),
            headers("t1", "author"),
            ApiJson(publish),
        )
        .await
        .unwrap();

        let template_id = response.data.id.clone();
        (state, template_id)
    }

    async fn created_instance(
        state: &AppState,
        template_id: &TemplateVersionId,
    ) -> WorkInstance {
        let Json(response) = create_instance(
            State(state.clone()),
            Path("p1".to_string()),
            headers("t1", "pm"),
            ApiJson(CreateInstanceRequest {
                template_version_id: template_id.to_string(),
            }),
        )
        .await
        .unwrap();
        response.data
    }

    #[tokio::test]
    async fn full_step_lifecycle_over_handlers() {
        let (state, template_id) = seeded_state().await;
        let instance = created_instance(&state, &template_id).await;
        let step_id = instance.steps[0].id.to_string();

        let update: StepUpdate = serde_json::from_value(serde_json::json!({
            "status": "in_progress",
            "field_values": {"qty": "12"},
        }))
        .unwrap();
        let Json(response) = update_step(
            State(state.clone()),
            Path((instance.id.to_string(), step_id.clone())),
            headers("t1", "foreman"),
            ApiJson(update),
        )
        .await
        .unwrap();
        assert_eq!(response.data.status, StepStatus::InProgress);

        let Json(response) = decide_step(
            State(state.clone()),
            Path((instance.id.to_string(), step_id)),
            headers("t1", "supervisor"),
            ApiJson(DecisionRequest {
                decision: Decision::Approved,
                comment: Some("complete".to_string()),
                requested_by: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.data.decision, Decision::Approved);

        let Json(response) = export_deliverable(
            State(state.clone()),
            Path(instance.id.to_string()),
            headers("t1", "pm"),
        )
        .await
        .unwrap();
        let doc = serde_json::to_value(&response.data).unwrap();
        assert_eq!(doc["steps"][0]["status"], "approved");
        assert_eq!(doc["steps"][0]["values"][0]["value_number"], 12.0);
    }

    #[tokio::test]
    async fn listing_pages_and_wraps_envelope() {
        let (state, template_id) = seeded_state().await;
        created_instance(&state, &template_id).await;
        created_instance(&state, &template_id).await;

        let Json(response) = list_instances(
            State(state.clone()),
            Path("p1".to_string()),
            Query(PageQuery {
                page: 1,
                per_page: 1,
            }),
            headers("t1", "pm"),
        )
        .await
        .unwrap();
        assert!(response.success);
        assert_eq!(response.data.items.len(), 1);
        assert_eq!(response.data.total, 2);
    }

    #[tokio::test]
    async fn wrong_tenant_resolves_not_found() {
        let (state, template_id) = seeded_state().await;
        let instance = created_instance(&state, &template_id).await;

        let err = export_deliverable(
            State(state.clone()),
            Path(instance.id.to_string()),
            headers("t2", "spy"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_headers_are_a_context_fault() {
        let (state, _) = seeded_state().await;
        let err = list_instances(
            State(state),
            Path("p1".to_string()),
            Query(PageQuery {
                page: 1,
                per_page: 25,
            }),
            HeaderMap::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::TenantContextMissing(_)));
    }
}
