mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{script, Harness};
use web_grader::{api, GradingSettings};

fn app() -> axum::Router {
    let harness = Harness::new(GradingSettings::default());
    api::router(Arc::new(harness.service))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_grade(payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/grade")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn test_grade_rejects_non_http_url() {
    let response = app()
        .oneshot(post_grade(json!({
            "submissionId": "s-1",
            "targetUrl": "ftp://example.com",
            "scriptText": script(&[("A", "")]),
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("http"));
}

#[tokio::test]
async fn test_grade_rejects_empty_submission_id() {
    let response = app()
        .oneshot(post_grade(json!({
            "submissionId": "  ",
            "targetUrl": "http://localhost:3000",
            "scriptText": script(&[("A", "")]),
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn test_grade_returns_grading_response() {
    let response = app()
        .oneshot(post_grade(json!({
            "submissionId": "s-http",
            "targetUrl": "http://localhost:3000",
            "playwrightScript": script(&[("Check title", ""), ("Check button", "throw new Error('missing');")]),
            "subTaskNames": ["Check title", "Check button"],
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["submissionId"], "s-http");
    assert_eq!(body["success"], false);
    assert_eq!(body["results"][0]["taskName"], "Check title");
    assert_eq!(body["results"][0]["isPassed"], true);
    assert_eq!(body["results"][1]["isPassed"], false);
    assert!(body.get("errorMessage").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_grade_reports_missing_tests_in_body() {
    let response = app()
        .oneshot(post_grade(json!({
            "submissionId": "s-empty",
            "targetUrl": "https://example.com",
            "scriptText": "",
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["results"], json!([]));
    assert!(body["errorMessage"].as_str().unwrap().contains("No test cases"));
}
