//! API router.
//!
//! Returns a composable `Router` with all routes under `/api/`.
//! Layers: permissive CORS (browser consumers) and a request body limit.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;

/// Largest accepted request body (content plus previous outputs).
pub const MAX_REQUEST_BYTES: usize = 256 * 1024;

/// Build the API router.
pub fn api_router(ctx: ApiContext) -> Router {
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/analyze", post(endpoints::analyze::analyze))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::pipeline::analysis::validation::fixtures::valid_output;
    use crate::pipeline::analysis::{
        decode_events, AnalysisError, InferenceClient, MockInferenceClient, MockProviderFactory,
        MockReply, PipelineEvent, PipelineView, ProviderFactory, ProviderSet, Stage, StageRequest,
        COMPLETION_MESSAGE,
    };

    const CONTENT: &str = "Hook: X.\nValue: Y.\nCTA: Z.";

    fn all_valid_mock() -> MockInferenceClient {
        Stage::ALL
            .into_iter()
            .fold(MockInferenceClient::new(), |mock, stage| {
                mock.with_output(stage, &valid_output(stage))
            })
    }

    fn router_with(mock: &MockInferenceClient) -> Router {
        api_router(ApiContext::new(Arc::new(MockProviderFactory::new(mock.clone()))))
    }

    fn analyze_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn collect_events(response: axum::response::Response) -> Vec<PipelineEvent> {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        decode_events(text.lines())
    }

    #[tokio::test]
    async fn health_reports_ok_and_version() {
        let app = router_with(&MockInferenceClient::new());
        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::config::APP_VERSION);
    }

    #[tokio::test]
    async fn analyze_streams_full_run_as_ndjson() {
        let mock = all_valid_mock();
        let response = router_with(&mock)
            .oneshot(analyze_request(json!({"content": CONTENT})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            crate::pipeline::analysis::NDJSON_CONTENT_TYPE
        );

        let events = collect_events(response).await;
        assert_eq!(events.len(), 16);
        assert_eq!(events[0], PipelineEvent::StageStart { stage: Stage::A });
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::Log {
                message: COMPLETION_MESSAGE.to_string()
            })
        );

        let view = PipelineView::fold(&events);
        assert!(view.succeeded());
        for stage in Stage::ALL {
            assert_eq!(view.outputs[&stage], valid_output(stage));
        }
        assert_eq!(mock.call_count(), 5);
    }

    #[tokio::test]
    async fn null_previous_means_fresh_run() {
        let mock = all_valid_mock();
        let response = router_with(&mock)
            .oneshot(analyze_request(
                json!({"content": CONTENT, "fromStage": "A", "previous": null}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let events = collect_events(response).await;
        assert_eq!(events[0], PipelineEvent::StageStart { stage: Stage::A });
        assert!(PipelineView::fold(&events).succeeded());
        assert_eq!(mock.call_count(), 5);
    }

    /// Provider client that panics on every call.
    struct Exploding;

    impl InferenceClient for Exploding {
        fn infer(&self, _request: &StageRequest) -> Result<Value, AnalysisError> {
            panic!("provider client blew up");
        }
    }

    struct ExplodingFactory;

    impl ProviderFactory for ExplodingFactory {
        fn connect(&self) -> ProviderSet {
            ProviderSet {
                analysis: Box::new(Exploding),
                trends: Box::new(Exploding),
            }
        }
    }

    #[tokio::test]
    async fn worker_panic_ends_stream_with_stageless_error() {
        let app = api_router(ApiContext::new(Arc::new(ExplodingFactory)));
        let response = app
            .oneshot(analyze_request(json!({"content": CONTENT})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let events = collect_events(response).await;
        assert_eq!(events.first(), Some(&PipelineEvent::StageStart { stage: Stage::A }));
        assert_eq!(
            events.last(),
            Some(&PipelineEvent::Error {
                stage: None,
                message: crate::api::endpoints::analyze::WORKER_FAILURE_MESSAGE.to_string(),
            })
        );
        let view = PipelineView::fold(&events);
        assert!(view.finished);
        assert!(!view.succeeded());
    }

    #[tokio::test]
    async fn empty_content_is_400_before_streaming() {
        let mock = all_valid_mock();
        let response = router_with(&mock)
            .oneshot(analyze_request(json!({"content": "  <p> </p> "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().contains("empty"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn resume_without_previous_is_400_naming_stage() {
        let mock = all_valid_mock();
        let response = router_with(&mock)
            .oneshot(analyze_request(json!({"content": CONTENT, "fromStage": "C"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().contains("stage A"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn resume_from_d_streams_only_remaining_stages() {
        let mock = all_valid_mock();
        let body = json!({
            "content": CONTENT,
            "fromStage": "D",
            "previous": {
                "stageA": valid_output(Stage::A),
                "stageB": valid_output(Stage::B),
                "stageC": valid_output(Stage::C)
            }
        });
        let response = router_with(&mock).oneshot(analyze_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let events = collect_events(response).await;
        assert_eq!(events[0], PipelineEvent::StageStart { stage: Stage::D });
        assert!(events
            .iter()
            .all(|e| !matches!(e.stage(), Some(Stage::A | Stage::B | Stage::C))));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn stage_failure_is_200_with_terminal_error_event() {
        let mock = all_valid_mock().with_reply(
            Stage::C,
            MockReply::Status {
                status: 502,
                body: "bad gateway".into(),
            },
        );
        let response = router_with(&mock)
            .oneshot(analyze_request(json!({"content": CONTENT})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let events = collect_events(response).await;
        match events.last() {
            Some(PipelineEvent::Error { stage, message }) => {
                assert_eq!(*stage, Some(Stage::C));
                assert!(message.contains("502"));
            }
            other => panic!("expected terminal error event, got {other:?}"),
        }
        assert!(events.iter().all(|e| !matches!(e.stage(), Some(Stage::D | Stage::E))));
    }

    #[tokio::test]
    async fn malformed_json_is_400_with_error_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = router_with(&MockInferenceClient::new())
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn unknown_stage_is_400() {
        let response = router_with(&MockInferenceClient::new())
            .oneshot(analyze_request(json!({"content": CONTENT, "fromStage": "F"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let huge = "a".repeat(MAX_REQUEST_BYTES + 1);
        let response = router_with(&MockInferenceClient::new())
            .oneshot(analyze_request(json!({"content": huge})))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn cors_preflight_is_allowed() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/analyze")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = router_with(&MockInferenceClient::new())
            .oneshot(request)
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let response = router_with(&MockInferenceClient::new())
            .oneshot(Request::get("/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
