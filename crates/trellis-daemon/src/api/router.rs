//! API router configuration.

use super::handlers;
use super::state::AppState;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router.
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let mut router = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Work instances
        .route(
            "/projects/:project_id/work-instances",
            get(handlers::list_instances).post(handlers::create_instance),
        )
        .route(
            "/work-instances/:instance_id/steps/:step_id",
            patch(handlers::update_step),
        )
        .route(
            "/work-instances/:instance_id/steps/:step_id/approval",
            post(handlers::decide_step),
        )
        .route(
            "/work-instances/:instance_id/export",
            get(handlers::export_deliverable),
        )
        // Admin
        .route("/admin/projects", post(handlers::register_project))
        .route(
            "/admin/template-versions",
            post(handlers::publish_template),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;
    use trellis_engine::Engine;
    use trellis_store::InMemoryTrellisStore;

    fn app() -> Router {
        let engine = Engine::from_store(Arc::new(InMemoryTrellisStore::new()));
        create_router(AppState::new(engine), false)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn invalid_decision_value_gets_the_error_envelope() {
        let request = Request::builder()
            .method("POST")
            .uri("/work-instances/wi-1/steps/step-1/approval")
            .header("content-type", "application/json")
            .header("x-tenant-id", "t1")
            .header("x-actor-id", "supervisor")
            .body(Body::from(r#"{"decision":"maybe"}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        let message = body["field_errors"]["body"][0].as_str().unwrap();
        assert!(message.contains("decision"));
    }

    #[tokio::test]
    async fn syntactically_broken_body_is_a_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/admin/projects")
            .header("content-type", "application/json")
            .header("x-tenant-id", "t1")
            .header("x-actor-id", "admin")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "BAD_REQUEST");
    }
}
