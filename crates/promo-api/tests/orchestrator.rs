//! End-to-end orchestrator tests.
//!
//! Both providers and the result CDN are wiremock servers; the store is the
//! in-memory implementation. Requests go through the full router.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use promo_api::{create_router, ApiConfig, AppState, OrchestratorConfig};
use promo_models::{Job, JobId, JobStatus, VideoField, VideoKind};
use promo_providers::{
    AvatarClient, AvatarConfig, CinematicClient, CinematicConfig, RetryConfig,
};
use promo_store::{JobStore, MemoryJobStore};

struct Harness {
    app: axum::Router,
    store: Arc<MemoryJobStore>,
    avatar_server: MockServer,
    cinematic_server: MockServer,
    cdn: MockServer,
}

async fn harness() -> Harness {
    let avatar_server = MockServer::start().await;
    let cinematic_server = MockServer::start().await;
    let cdn = MockServer::start().await;

    let avatar = Arc::new(
        AvatarClient::new(AvatarConfig {
            base_url: avatar_server.uri(),
            api_key: "test-key".to_string(),
            request_timeout: Duration::from_secs(5),
            webhook_url: None,
            result_hosts: vec!["127.0.0.1".to_string()],
            fallback_presenter_url: Some("https://img.example.com/stock.png".to_string()),
        })
        .unwrap(),
    );
    let cinematic = Arc::new(
        CinematicClient::new(CinematicConfig {
            base_url: cinematic_server.uri(),
            api_key: "test-key".to_string(),
            request_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            poll_deadline: Duration::from_millis(300),
        })
        .unwrap(),
    );

    let orchestrator = OrchestratorConfig {
        job_timeout: Duration::from_secs(600),
        cinematic_grace: Duration::from_secs(180),
        sweep_interval: Duration::from_secs(30),
        sweep_enabled: false,
        retry: RetryConfig {
            max_retries: 1,
            base_delay_ms: 1,
            max_delay_ms: 2,
        },
    };

    let store = Arc::new(MemoryJobStore::new());
    let state = AppState::new(
        ApiConfig::default(),
        orchestrator,
        store.clone(),
        avatar,
        cinematic,
    );
    let app = create_router(state, None);

    Harness {
        app,
        store,
        avatar_server,
        cinematic_server,
        cdn,
    }
}

async fn seed_pending(
    store: &MemoryJobStore,
    id: &str,
    kind: VideoKind,
    external_id: &str,
    age_minutes: i64,
) -> JobId {
    let job_id = JobId::from(id);
    let mut job = Job::new(job_id.clone());
    job.created_at = Utc::now() - chrono::Duration::minutes(age_minutes);
    job.set_video(kind, Some(VideoField::pending(external_id)));
    job.status = job.recomputed_status();
    store.insert(job).await.unwrap();
    job_id
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_create_and_fetch_job() {
    let h = harness().await;

    let (status, created) = post_json(&h.app, "/api/jobs", json!({"script_ready": true})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["avatar_video"], "script_ready");
    assert_eq!(created["status"], "generating");

    let job_id = created["id"].as_str().unwrap();
    let (status, fetched) = get_json(&h.app, &format!("/api/jobs/{}", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], created["id"]);

    let (status, _) = get_json(&h.app, "/api/jobs/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_avatar_submit_then_sweep_completes() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/talks"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"id": "tlk_1", "status": "created"})),
        )
        .mount(&h.avatar_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/talks/tlk_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "tlk_1",
            "status": "done",
            "result_url": "https://cdn-a.example.com/tlk_1/video.mp4"
        })))
        .mount(&h.avatar_server)
        .await;

    let (_, created) = post_json(&h.app, "/api/jobs", json!({})).await;
    let job_id = created["id"].as_str().unwrap().to_string();

    let (status, submitted) = post_json(
        &h.app,
        &format!("/api/jobs/{}/avatar-video", job_id),
        json!({
            "script": "A script comfortably longer than the provider minimum length.",
            "image_url": "https://img.example.com/product.png"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["external_id"], "tlk_1");

    let job = h.store.get(&JobId::from(job_id.as_str())).await.unwrap().unwrap();
    assert_eq!(job.avatar_video, Some(VideoField::pending("tlk_1")));
    assert_eq!(job.status, JobStatus::Generating);

    // Sweep resolves the pending marker against the provider.
    let (status, report) = get_json(&h.app, "/api/videos/poll-pending").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["updated"], 1);

    let job = h.store.get(&JobId::from(job_id.as_str())).await.unwrap().unwrap();
    assert_eq!(
        job.avatar_video,
        Some(VideoField::ready("https://cdn-a.example.com/tlk_1/video.mp4"))
    );
    assert_eq!(job.status, JobStatus::Complete);
}

#[tokio::test]
async fn test_avatar_fallback_then_fail_records_reason() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/talks"))
        .respond_with(ResponseTemplate::new(422).set_body_string("source image aspect ratio not supported"))
        .expect(2..)
        .mount(&h.avatar_server)
        .await;

    let (_, created) = post_json(&h.app, "/api/jobs", json!({})).await;
    let job_id = created["id"].as_str().unwrap().to_string();

    let (status, _) = post_json(
        &h.app,
        &format!("/api/jobs/{}/avatar-video", job_id),
        json!({
            "script": "A script comfortably longer than the provider minimum length.",
            "image_url": "https://img.example.com/tall.png"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let job = h.store.get(&JobId::from(job_id.as_str())).await.unwrap().unwrap();
    assert_eq!(job.avatar_video, Some(VideoField::failed("aspect_ratio")));
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_cinematic_submit_completes_synchronously() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/v1/image_to_video"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "task-1", "status": "PENDING"})),
        )
        .mount(&h.cinematic_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/tasks/task-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "task-1",
            "status": "SUCCEEDED",
            "output": ["https://cdn-b.example.com/task-1.mp4"]
        })))
        .mount(&h.cinematic_server)
        .await;

    let (_, created) = post_json(&h.app, "/api/jobs", json!({})).await;
    let job_id = created["id"].as_str().unwrap().to_string();

    let (status, submitted) = post_json(
        &h.app,
        &format!("/api/jobs/{}/cinematic-video", job_id),
        json!({
            "prompt": "slow dolly in, warm light",
            "image_url": "https://img.example.com/product.png"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["external_id"], "task-1");

    let job = h.store.get(&JobId::from(job_id.as_str())).await.unwrap().unwrap();
    assert_eq!(
        job.cinematic_video,
        Some(VideoField::ready("https://cdn-b.example.com/task-1.mp4"))
    );
    assert_eq!(job.status, JobStatus::Complete);
}

#[tokio::test]
async fn test_webhook_first_terminal_write_wins() {
    let h = harness().await;
    let job_id = seed_pending(&h.store, "job-webhook", VideoKind::Avatar, "tlk_1", 0).await;

    // Success arrives first.
    let (status, body) = post_json(
        &h.app,
        "/webhooks/video",
        json!({"job_id": "job-webhook", "kind": "avatar", "url": "https://cdn/a.mp4"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], true);

    // A late failure for the same field is a no-op, not an error.
    let (status, body) = post_json(
        &h.app,
        "/webhooks/video",
        json!({"job_id": "job-webhook", "kind": "avatar", "error": "boom"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);

    let job = h.store.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.avatar_video, Some(VideoField::ready("https://cdn/a.mp4")));
}

#[tokio::test]
async fn test_webhook_native_shapes_correlate_by_external_id() {
    let h = harness().await;
    seed_pending(&h.store, "job-native", VideoKind::Cinematic, "task-9", 0).await;

    // Provider B native shape carries only the task id.
    let (status, body) = post_json(
        &h.app,
        "/webhooks/video",
        json!({
            "taskId": "task-9",
            "status": "SUCCEEDED",
            "output": ["https://cdn-b.example.com/task-9.mp4"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], true);

    let job = h.store.get(&JobId::from("job-native")).await.unwrap().unwrap();
    assert_eq!(
        job.cinematic_video,
        Some(VideoField::ready("https://cdn-b.example.com/task-9.mp4"))
    );

    // Provider A native shape with user_data echoing our job id.
    seed_pending(&h.store, "job-avatar", VideoKind::Avatar, "tlk_7", 0).await;
    let (status, body) = post_json(
        &h.app,
        "/webhooks/video",
        json!({
            "id": "tlk_7",
            "status": "done",
            "result_url": "https://cdn-a.example.com/tlk_7/video.mp4",
            "user_data": "job-avatar"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], true);
}

#[tokio::test]
async fn test_webhook_non_terminal_and_unknown_are_acknowledged() {
    let h = harness().await;
    seed_pending(&h.store, "job-1", VideoKind::Cinematic, "task-1", 0).await;

    // Non-terminal status: acknowledged, nothing written.
    let (status, body) = post_json(
        &h.app,
        "/webhooks/video",
        json!({"taskId": "task-1", "status": "RUNNING"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);

    // Unknown task: acknowledged so the provider stops retrying.
    let (status, body) = post_json(
        &h.app,
        "/webhooks/video",
        json!({"taskId": "task-unknown", "status": "SUCCEEDED", "output": ["https://x/y.mp4"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);

    // Unrecognized shape is the caller's bug.
    let (status, _) = post_json(&h.app, "/webhooks/video", json!({"hello": "world"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_stale_external_id_is_noop() {
    let h = harness().await;
    // The job was resubmitted; the stored marker is tlk_new.
    seed_pending(&h.store, "job-stale", VideoKind::Avatar, "tlk_new", 0).await;

    let (status, body) = post_json(
        &h.app,
        "/webhooks/video",
        json!({
            "id": "tlk_old",
            "status": "done",
            "result_url": "https://cdn-a.example.com/tlk_old/video.mp4",
            "user_data": "job-stale"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);

    let job = h.store.get(&JobId::from("job-stale")).await.unwrap().unwrap();
    assert_eq!(job.avatar_video, Some(VideoField::pending("tlk_new")));
}

#[tokio::test]
async fn test_timeout_applied_once() {
    let h = harness().await;
    seed_pending(&h.store, "job-old", VideoKind::Avatar, "tlk_1", 60).await;

    let (_, report) = get_json(&h.app, "/api/videos/poll-pending").await;
    assert_eq!(report["timed_out"], 1);

    let job = h.store.get(&JobId::from("job-old")).await.unwrap().unwrap();
    assert_eq!(job.avatar_video, Some(VideoField::failed("timeout")));
    assert_eq!(job.status, JobStatus::Failed);

    // The field is terminal now; later sweeps find nothing.
    let (_, report) = get_json(&h.app, "/api/videos/poll-pending").await;
    assert_eq!(report["checked"], 0);
    assert_eq!(report["timed_out"], 0);
}

#[tokio::test]
async fn test_cinematic_stuck_after_grace_untouched_within() {
    let h = harness().await;
    seed_pending(&h.store, "job-fresh", VideoKind::Cinematic, "task-1", 1).await;
    seed_pending(&h.store, "job-stuck", VideoKind::Cinematic, "task-2", 5).await;

    let (_, report) = get_json(&h.app, "/api/videos/poll-pending").await;
    assert_eq!(report["updated"], 1);
    assert_eq!(report["processing"], 1);

    let fresh = h.store.get(&JobId::from("job-fresh")).await.unwrap().unwrap();
    assert_eq!(fresh.cinematic_video, Some(VideoField::pending("task-1")));

    let stuck = h.store.get(&JobId::from("job-stuck")).await.unwrap().unwrap();
    assert_eq!(stuck.cinematic_video, Some(VideoField::failed("stuck")));
    assert!(stuck.cinematic_video_error.is_some());
}

#[tokio::test]
async fn test_proxy_streams_live_url() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/tlk_1/video.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(b"mp4-bytes".to_vec()),
        )
        .mount(&h.cdn)
        .await;

    let video_url = format!("{}/tlk_1/video.mp4", h.cdn.uri());
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", &video_url)
        .finish();

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/video-proxy?{}", query))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-disposition").unwrap(),
        "inline"
    );
    assert!(response.headers().get("x-video-url-refreshed").is_none());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"mp4-bytes");
}

#[tokio::test]
async fn test_proxy_refreshes_expired_url() {
    let h = harness().await;

    // Old signed URL is dead; the re-resolved one serves bytes.
    Mock::given(method("GET"))
        .and(path("/tlk_1/old.mp4"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&h.cdn)
        .await;
    Mock::given(method("GET"))
        .and(path("/tlk_1/new.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(b"fresh-bytes".to_vec()),
        )
        .mount(&h.cdn)
        .await;

    let old_url = format!("{}/tlk_1/old.mp4", h.cdn.uri());
    let new_url = format!("{}/tlk_1/new.mp4", h.cdn.uri());

    Mock::given(method("GET"))
        .and(path("/talks/tlk_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "tlk_1",
            "status": "done",
            "result_url": new_url
        })))
        .mount(&h.avatar_server)
        .await;

    // Job already holds the (now dead) URL.
    let job_id = JobId::from("job-proxy");
    let mut job = Job::new(job_id.clone());
    job.avatar_video = Some(VideoField::ready(old_url.as_str()));
    job.status = job.recomputed_status();
    h.store.insert(job).await.unwrap();

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", &old_url)
        .append_pair("job_id", "job-proxy")
        .finish();

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/video-proxy?{}", query))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-video-url-refreshed").unwrap(),
        "true"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"fresh-bytes");

    // The fresh URL was persisted through the Ready guard.
    let job = h.store.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.avatar_video, Some(VideoField::ready(new_url.as_str())));
}

#[tokio::test]
async fn test_proxy_expires_unresolvable_url() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/tlk_2/video.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.cdn)
        .await;
    Mock::given(method("GET"))
        .and(path("/talks/tlk_2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.avatar_server)
        .await;

    let dead_url = format!("{}/tlk_2/video.mp4", h.cdn.uri());

    let job_id = JobId::from("job-dead");
    let mut job = Job::new(job_id.clone());
    job.avatar_video = Some(VideoField::ready(dead_url.as_str()));
    job.status = job.recomputed_status();
    h.store.insert(job).await.unwrap();

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", &dead_url)
        .append_pair("job_id", "job-dead")
        .finish();

    let (status, _) = get_json(&h.app, &format!("/api/video-proxy?{}", query)).await;
    assert_eq!(status, StatusCode::GONE);

    let job = h.store.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.avatar_video, Some(VideoField::expired("video_not_found")));
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_proxy_rejects_bad_urls_and_maps_other_failures() {
    let h = harness().await;

    let (status, _) = get_json(&h.app, "/api/video-proxy?url=not-a-url").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A 500 from a non-provider host is a plain upstream failure.
    Mock::given(method("GET"))
        .and(path("/broken.mp4"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.cdn)
        .await;
    // The CDN host is a result host here, but 500 is not a dead-link code.
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", &format!("{}/broken.mp4", h.cdn.uri()))
        .finish();
    let (status, _) = get_json(&h.app, &format!("/api/video-proxy?{}", query)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = harness().await;

    let (status, body) = get_json(&h.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = get_json(&h.app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}
