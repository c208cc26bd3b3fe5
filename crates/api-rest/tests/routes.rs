use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use api_rest::{router, AppState};
use api_shared::ApiKey;
use biobank_core::CoreConfig;

fn app(data_dir: &TempDir, api_key: Option<&str>) -> Router {
    let cfg = CoreConfig::new(data_dir.path().to_path_buf(), 100).unwrap();
    router(AppState::new(
        Arc::new(cfg),
        ApiKey::new(api_key.map(str::to_string)),
    ))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn create_project(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/projects",
        Some(json!({"name": "Oncology 2024", "sponsor_project_code": "SP2024"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn save_scenario_rule(app: &Router, id: &str) {
    let (status, _) = send(
        app,
        "PUT",
        &format!("/projects/{id}/sample-code-rule"),
        Some(json!({
            "sample_code_rule": {
                "slots": ["sponsor_code", "clinic_code", "subject_id"],
                "dictionaries": {"clinic_codes": ["01", "02"]}
            },
            "audit_reason": "initial setup"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_is_open() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp, Some("secret"));

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
}

#[tokio::test]
async fn generate_sample_codes_end_to_end() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp, None);
    let id = create_project(&app).await;
    save_scenario_rule(&app, &id).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/projects/{id}/generate-sample-codes"),
        Some(json!({
            "clinic_subject_pairs": [
                {"clinic": "01", "subject": "001"},
                {"clinic": "02", "subject": "002"}
            ]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sample_codes"], json!(["SP2024-01-001", "SP2024-02-002"]));
}

#[tokio::test]
async fn rule_round_trips_and_lists_projects() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp, None);
    let id = create_project(&app).await;
    save_scenario_rule(&app, &id).await;

    let (status, body) = send(&app, "GET", &format!("/projects/{id}/sample-code-rule"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sample_code_rule"]["slots"][1], json!("clinic_code"));
    assert_eq!(body["sample_code_rule"]["slots"][3], Value::Null);

    let (status, body) = send(&app, "GET", "/projects", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projects"][0]["id"], json!(id));
}

#[tokio::test]
async fn empty_generation_request_is_bad_request() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp, None);
    let id = create_project(&app).await;
    save_scenario_rule(&app, &id).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/projects/{id}/generate-sample-codes"),
        Some(json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("no generation criteria selected"));
}

#[tokio::test]
async fn unconfigured_rule_is_bad_request() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp, None);
    let id = create_project(&app).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/projects/{id}/generate-sample-codes"),
        Some(json!({"cycles": ["C1"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn save_rule_requires_audit_reason() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp, None);
    let id = create_project(&app).await;

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/projects/{id}/sample-code-rule"),
        Some(json!({
            "sample_code_rule": {"slots": ["sponsor_code"]},
            "audit_reason": ""
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("an audit reason is required"));
}

#[tokio::test]
async fn stability_qc_codes() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp, None);
    let id = create_project(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/projects/{id}/generate-stability-qc-codes"),
        Some(json!({"sample_category": "QC", "code": "L", "quantity": 3, "start_number": 31})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(3));
    assert_eq!(body["sample_codes"], json!(["QC-L-031", "QC-L-032", "QC-L-033"]));

    let (status, _) = send(
        &app,
        "POST",
        &format!("/projects/{id}/generate-stability-qc-codes"),
        Some(json!({"sample_category": "XYZ", "code": "L", "quantity": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_and_malformed_project_ids() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp, None);

    let missing = "0123456789abcdef0123456789abcdef";
    let (status, _) = send(&app, "GET", &format!("/projects/{missing}/sample-code-rule"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/projects/not-an-id/sample-code-rule", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn project_routes_require_api_key_when_configured() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp, Some("secret"));

    let (status, _) = send(&app, "GET", "/projects", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/projects")
        .header("x-api-key", "secret")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn oversized_subject_ranges_are_rejected() {
    let temp = TempDir::new().unwrap();
    let app = app(&temp, None);
    let id = create_project(&app).await;

    for (range, reason) in [
        (json!({"start": 1, "count": 1, "width": 100000}), "width"),
        (json!({"start": 1, "count": 20000000}), "maximum"),
    ] {
        let (status, body) = send(
            &app,
            "PUT",
            &format!("/projects/{id}/sample-code-rule"),
            Some(json!({
                "sample_code_rule": {
                    "slots": ["subject_id"],
                    "dictionaries": {"subject_ranges": [range]}
                },
                "audit_reason": "bulk subjects"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.as_str().is_some_and(|text| text.contains(reason)), "{body}");
    }
}
