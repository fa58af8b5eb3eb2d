pub mod health;
pub mod middleware;

use axum::{
    routing::{get, post},
    Router,
};

use crate::interview::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Interview API
        .route("/api/v1/interviews", post(handlers::handle_create_interview))
        .route(
            "/api/v1/interviews/reports",
            get(handlers::handle_list_reports),
        )
        .route(
            "/api/v1/interviews/:id/turns",
            post(handlers::handle_submit_turn),
        )
        .route(
            "/api/v1/interviews/:id/report",
            get(handlers::handle_get_report),
        )
        .route(
            "/api/v1/interviews/:id/report/regenerate",
            post(handlers::handle_regenerate_report),
        )
        // Home screen read models
        .route("/api/v1/interview/records", get(handlers::handle_records))
        .route(
            "/api/v1/interview/score-trend",
            get(handlers::handle_score_trend),
        )
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use super::*;
    use crate::ai::testing::{ScriptedQuestions, ScriptedReports};
    use crate::interview::{InterviewOrchestrator, QueryProjections};
    use crate::report::{ReportPipeline, ReportQueue};
    use crate::store::InMemorySessionStore;

    fn app() -> Router {
        let store = Arc::new(InMemorySessionStore::new());
        let pipeline = Arc::new(ReportPipeline::new(store.clone(), ScriptedReports::new()));
        let queue = Arc::new(ReportQueue::start(pipeline, 1, 8));
        let state = AppState {
            orchestrator: Arc::new(InterviewOrchestrator::new(
                store.clone(),
                ScriptedQuestions::new(),
                queue,
            )),
            projections: Arc::new(QueryProjections::new(store)),
        };
        build_router(state)
    }

    fn post_json(uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn start_body() -> Value {
        json!({ "mainTopicId": "backend", "subTopicIds": ["nestjs"] })
    }

    fn turn_body(turn_index: i32) -> Value {
        json!({
            "turnIndex": turn_index,
            "answerText": format!("answer {turn_index}"),
            "answerDuration": 20.5,
            "voiceMetrics": { "avgVolume": 0.5 }
        })
    }

    async fn start(app: &Router, user: Option<&str>) -> String {
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/interviews", user, start_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["data"]["interviewId"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_interview_envelope() {
        let response = app()
            .oneshot(post_json("/api/v1/interviews", None, start_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
        assert!(request_id.starts_with("req_"));

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["meta"]["requestId"], request_id.as_str());
        let data = &body["data"];
        assert!(data["interviewId"].as_str().unwrap().starts_with("intv_"));
        assert_eq!(data["status"], "IN_PROGRESS");
        assert_eq!(data["turnIndex"], 1);
        assert_eq!(data["topics"]["main"], json!({ "id": "backend", "label": "backend" }));
        assert_eq!(data["firstQuestion"]["text"], "Base question 1?");
    }

    #[tokio::test]
    async fn test_errors_carry_code_and_request_id() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/interviews/intv_missing/turns")
            .header("content-type", "application/json")
            .header("x-request-id", "req_fixed")
            .body(Body::from(turn_body(1).to_string()))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-request-id"], "req_fixed");

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["meta"]["requestId"], "req_fixed");
    }

    #[tokio::test]
    async fn test_bad_bodies_are_validation_errors() {
        let app = app();
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/interviews", None, json!({ "mainTopicId": "backend" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");

        let id = start(&app, None).await;
        let response = app
            .oneshot(post_json(
                &format!("/api/v1/interviews/{id}/turns"),
                None,
                json!({ "turnIndex": 1 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_turn_order_and_ownership() {
        let app = app();
        let id = start(&app, Some("42")).await;
        let uri = format!("/api/v1/interviews/{id}/turns");

        let response = app
            .clone()
            .oneshot(post_json(&uri, Some("7"), turn_body(1)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(post_json(&uri, Some("42"), turn_body(3)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"]["code"], "SEQUENCE_MISMATCH");

        let response = app
            .oneshot(post_json(&uri, Some("42"), turn_body(1)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let data = body_json(response).await["data"].clone();
        assert_eq!(data["nextTurnIndex"], 2);
        assert_eq!(data["nextQuestion"]["type"], "base");
        assert_eq!(data["remainingFollowupCount"], 2);
    }

    #[tokio::test]
    async fn test_full_interview_produces_report() {
        let app = app();
        let id = start(&app, None).await;
        for turn in 1..=10 {
            let response = app
                .clone()
                .oneshot(post_json(&format!("/api/v1/interviews/{id}/turns"), None, turn_body(turn)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            if turn == 10 {
                let data = body_json(response).await["data"].clone();
                assert_eq!(data["status"], "ANALYZING");
                assert!(data["nextQuestion"].is_null());
                assert!(data["nextTurnIndex"].is_null());
            }
        }

        let mut report = Value::Null;
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(get(&format!("/api/v1/interviews/{id}/report")))
                .await
                .unwrap();
            report = body_json(response).await["data"].clone();
            if report["interviewStatus"] == "DONE" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(report["interviewStatus"], "DONE");
        assert_eq!(report["report"]["status"], "done");
        assert_eq!(report["report"]["totalScore"], 78.0);
        assert_eq!(report["report"]["view"]["record"]["turns"].as_array().unwrap().len(), 10);

        let response = app
            .clone()
            .oneshot(get("/api/v1/interview/records"))
            .await
            .unwrap();
        let records = body_json(response).await["data"].clone();
        assert_eq!(records[0]["questionProgress"], "10/10 questions answered");
        assert_eq!(records[0]["metrics"]["logic"], 20.0);

        let response = app
            .clone()
            .oneshot(get("/api/v1/interviews/reports?page=1&size=5"))
            .await
            .unwrap();
        let page = body_json(response).await["data"].clone();
        assert_eq!(page["page"]["totalItems"], 1);
        assert_eq!(page["items"][0]["reportStatus"], "done");

        let response = app
            .clone()
            .oneshot(post_json(&format!("/api/v1/interviews/{id}/report/regenerate"), None, json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["status"], "ANALYZING");

        let response = app.oneshot(get("/api/v1/interview/score-trend")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_regenerate_in_progress_is_conflict() {
        let app = app();
        let id = start(&app, None).await;
        let response = app
            .oneshot(post_json(&format!("/api/v1/interviews/{id}/report/regenerate"), None, json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"]["code"], "INVALID_STATE");
    }
}
