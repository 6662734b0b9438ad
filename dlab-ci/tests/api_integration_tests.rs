//! Integration tests for dlab-ci API endpoints
//!
//! Drives the router with `tower::ServiceExt::oneshot`; imports run on the
//! real background task and are polled through GET /import/jobs/:id.

mod helpers;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use dlab_ci::converters::ConverterRegistry;
use dlab_ci::models::{ImportJob, ImportOptions};
use dlab_ci::services::ImportPipeline;
use dlab_common::events::EventBus;
use helpers::fixtures::{background, malformed_background};
use helpers::{create_test_db, test_config, test_pipeline, ArchiveBuilder, MemoryAssetStore};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

/// Test helper: router over a temp-file database and an in-memory store
async fn create_test_app() -> (Router, SqlitePool, TempDir) {
    let (tmp, pool) = create_test_db().await;
    let event_bus = EventBus::new(256);
    let pipeline = test_pipeline(pool.clone(), MemoryAssetStore::new(), event_bus.clone());
    let state = dlab_ci::AppState::new(pool.clone(), event_bus, pipeline);
    (dlab_ci::build_router(state), pool, tmp)
}

fn sample_archive() -> Vec<u8> {
    ArchiveBuilder::new()
        .with_manifest("API Sample", &["backgrounds"])
        .json(
            "content/backgrounds.json",
            json!([background("Acolyte", "XPHB"), background("Sage", "XPHB"), malformed_background()]),
        )
        .build()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &Router, uri: &str, body: Vec<u8>) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/zip")
            .body(Body::from(body))
            .unwrap(),
    )
    .await
}

/// Poll a job until it reaches a terminal status
async fn wait_for_job(app: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let (status, job) = get(app, &format!("/import/jobs/{}", job_id)).await;
        assert_eq!(status, StatusCode::OK);
        if job["status"] == "completed" || job["status"] == "failed" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} never finished", job_id);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _pool, _tmp) = create_test_app().await;

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "dlab-ci");
    assert_eq!(body["storage_backend"], "memory");
    assert_eq!(body["running_jobs"], 0);
    assert_eq!(body["compendiums"], 0);
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_import_runs_to_completion() {
    let (app, _pool, _tmp) = create_test_app().await;

    let (status, body) = post(&app, "/compendiums/import?user_id=user-1", sample_archive()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let job = wait_for_job(&app, &job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["compendiumName"], "API Sample");
    assert_eq!(job["progress"]["stage"], "complete");
    assert_eq!(job["progress"]["totalItems"], 3);
    assert_eq!(job["progress"]["processedItems"], 3);
    assert_eq!(job["progress"]["errors"].as_array().unwrap().len(), 1);
    assert!(job["completedAt"].is_string());

    let compendium_id = job["compendiumId"].as_str().unwrap();
    let (status, compendium) = get(&app, &format!("/compendiums/{}", compendium_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(compendium["entriesByType"], json!({"background": 2}));
    assert_eq!(compendium["totalEntries"], 2);
    assert_eq!(compendium["importedBy"], "user-1");

    let (status, documents) = get(&app, &format!("/compendiums/{}/documents", compendium_id)).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = documents
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Acolyte"));
    assert!(names.contains(&"Sage"));
}

#[tokio::test]
async fn test_validate_only_import_creates_no_compendium() {
    let (app, pool, _tmp) = create_test_app().await;

    let (status, body) = post(
        &app,
        "/compendiums/import?user_id=user-1&validate_only=true&source_filter=XPHB",
        sample_archive(),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let job = wait_for_job(&app, body["jobId"].as_str().unwrap()).await;
    assert_eq!(job["status"], "completed");
    assert!(job.get("compendiumId").is_none());
    assert_eq!(job["options"]["validateOnly"], true);
    assert_eq!(job["validationResults"].as_array().unwrap().len(), 3);
    assert_eq!(dlab_ci::db::compendiums::count(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_import_requires_user_id() {
    let (app, _pool, _tmp) = create_test_app().await;

    let (status, body) = post(&app, "/compendiums/import", sample_archive()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_import_rejects_empty_body_and_bad_filter() {
    let (app, _pool, _tmp) = create_test_app().await;

    let (status, _) = post(&app, "/compendiums/import?user_id=user-1", Vec::new()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(&app, "/compendiums/import?user_id=user-1&source_filter=%2C", sample_archive()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("source filter"));
}

#[tokio::test]
async fn test_import_rejects_oversized_archive() {
    let (_tmp, pool) = create_test_db().await;
    let event_bus = EventBus::new(16);
    let mut config = test_config();
    config.max_archive_bytes = 64;
    let pipeline = ImportPipeline::new(
        pool.clone(),
        event_bus.clone(),
        Arc::new(ConverterRegistry::with_builtin()),
        MemoryAssetStore::new(),
        config,
    );
    let app = dlab_ci::build_router(dlab_ci::AppState::new(pool, event_bus, pipeline));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/compendiums/import?user_id=user-1")
                .body(Body::from(vec![0u8; 128]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_unknown_job_and_compendium_are_not_found() {
    let (app, _pool, _tmp) = create_test_app().await;
    let missing = Uuid::new_v4();

    let (status, body) = get(&app, &format!("/import/jobs/{}", missing)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = get(&app, &format!("/compendiums/{}", missing)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, &format!("/compendiums/{}/documents", missing)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(&app, &format!("/import/jobs/{}/cancel", missing), Vec::new()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_jobs_by_user() {
    let (app, _pool, _tmp) = create_test_app().await;

    let (status, _) = get(&app, "/import/jobs").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, first) = post(&app, "/compendiums/import?user_id=alice", sample_archive()).await;
    wait_for_job(&app, first["jobId"].as_str().unwrap()).await;

    let (status, jobs) = get(&app, "/import/jobs?user_id=alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().unwrap().len(), 1);
    assert_eq!(jobs[0]["id"], first["jobId"]);

    let (_, others) = get(&app, "/import/jobs?user_id=bob").await;
    assert!(others.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_finished_job_conflicts() {
    let (app, _pool, _tmp) = create_test_app().await;

    let (_, body) = post(&app, "/compendiums/import?user_id=user-1", sample_archive()).await;
    let job_id = body["jobId"].as_str().unwrap().to_string();
    wait_for_job(&app, &job_id).await;

    let (status, body) = post(&app, &format!("/import/jobs/{}/cancel", job_id), Vec::new()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_cancel_pending_job_sets_flag() {
    let (app, pool, _tmp) = create_test_app().await;

    let job = ImportJob::new("user-1", ImportOptions::default());
    dlab_ci::db::jobs::save_job(&pool, &job, 1000).await.unwrap();

    let (status, body) = post(&app, &format!("/import/jobs/{}/cancel", job.id), Vec::new()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["cancelRequested"], true);
    assert!(dlab_ci::db::jobs::is_cancel_requested(&pool, job.id).await.unwrap());
}

#[tokio::test]
async fn test_event_stream_is_sse() {
    let (app, _pool, _tmp) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/import/events?job_id={}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}
