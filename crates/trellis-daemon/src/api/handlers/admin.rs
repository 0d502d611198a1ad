//! Admin handlers: project registration and template authoring.

use crate::api::context::tenant_context;
use crate::api::envelope::ApiResponse;
use crate::api::extract::ApiJson;
use crate::api::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use trellis_types::{
    FieldType, ProjectId, StepTemplate, TemplateVersion, ValidationErrors,
};

/// Body for project registration.
#[derive(Debug, Deserialize)]
pub struct RegisterProjectRequest {
    pub project_id: String,
}

/// `POST /admin/projects`
pub async fn register_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<RegisterProjectRequest>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    let ctx = tenant_context(&headers)?;
    let project_id = ProjectId::new(body.project_id);
    state.engine.register_project(&ctx, project_id.clone()).await?;
    Ok(Json(ApiResponse::ok_with_message(
        serde_json::json!({ "project_id": project_id }),
        "project registered",
    )))
}

/// One declared field in a template authoring request. The type name is
/// validated against the closed enumeration before anything is stored.
#[derive(Debug, Deserialize)]
pub struct FieldDeclaration {
    pub field_key: String,
    pub field_type: String,
}

/// One declared step in a template authoring request.
#[derive(Debug, Deserialize)]
pub struct StepDeclaration {
    pub step_key: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
}

/// Body for template version publication.
#[derive(Debug, Deserialize)]
pub struct PublishTemplateRequest {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub steps: Vec<StepDeclaration>,
}

/// `POST /admin/template-versions`
pub async fn publish_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<PublishTemplateRequest>,
) -> ApiResult<Json<ApiResponse<TemplateVersion>>> {
    let ctx = tenant_context(&headers)?;

    let mut errors = ValidationErrors::new();
    let mut steps = Vec::with_capacity(body.steps.len());
    for declaration in body.steps {
        let mut step = StepTemplate::new(declaration.step_key.clone(), declaration.name);
        for field in declaration.fields {
            match FieldType::parse(&field.field_type) {
                Ok(field_type) => step = step.with_field(field.field_key, field_type),
                Err(err) => errors.push(
                    format!("steps.{}.{}", declaration.step_key, field.field_key),
                    err.to_string(),
                ),
            }
        }
        steps.push(step);
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let template = state
        .engine
        .publish_template(&ctx, &body.name, body.version, steps)
        .await?;
    Ok(Json(ApiResponse::ok_with_message(
        template,
        "template version published",
    )))
}
