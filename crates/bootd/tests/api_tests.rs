//! Integration tests for the daemon API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use boot_lib::{
    engine::MemoryEngine,
    events::EventBus,
    health::HealthRegistry,
    lifecycle::HostLifecycle,
    manager::ManagerOptions,
    registry::ManagerRegistry,
    resource::ResourceManager,
    settings::{ContainerDefinition, DockerSettings, LifecycleMode},
};
use bootd::api::{create_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    engine: Arc<MemoryEngine>,
    shutdown: CancellationToken,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn settings() -> DockerSettings {
    let mut settings = DockerSettings::default();
    settings.containers.insert(
        "redis".to_string(),
        ContainerDefinition::new("my-redis", "redis:latest").with_port("6379", 6379),
    );
    settings.containers.insert(
        "nginx".to_string(),
        ContainerDefinition::new("my-nginx", "nginx:latest")
            .with_lifecycle_mode(LifecycleMode::Manual),
    );
    settings
}

fn setup_test_app() -> TestApp {
    let engine = Arc::new(MemoryEngine::new());
    let shutdown = CancellationToken::new();
    let registry = Arc::new(
        ManagerRegistry::from_settings(
            &settings(),
            engine.clone(),
            ManagerOptions::default(),
            shutdown.clone(),
        )
        .unwrap(),
    );

    let bus = EventBus::default();
    registry.spawn_listeners(&bus, &shutdown);

    let state = Arc::new(AppState::new(registry, bus, HealthRegistry::new()));
    let router = create_router(state.clone());

    TestApp {
        router,
        state,
        engine,
        shutdown,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_healthz_degraded_before_host_start() {
    let app = setup_test_app();

    let response = app.router.clone().oneshot(get("/healthz")).await.unwrap();

    // Degraded still returns 200 (operational)
    assert_eq!(response.status(), StatusCode::OK);
    let health = json_body(response).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["redis"]["status"], "degraded");
    assert_eq!(health["components"]["nginx"]["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_ok_after_host_start() {
    let app = setup_test_app();
    app.state.registry.start_all().await.unwrap();

    let response = app.router.clone().oneshot(get("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = json_body(response).await;
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_503_after_failed_operation() {
    let app = setup_test_app();
    app.state.registry.start_all().await.unwrap();

    let redis = app.state.registry.get("redis").unwrap();
    let id = redis.container_id().unwrap();
    // removing a running container is refused by the engine
    redis.remove(&id).await.unwrap_err();

    let response = app.router.clone().oneshot(get("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let health = json_body(response).await;
    assert_eq!(health["status"], "unhealthy");
    assert!(health["components"]["redis"]["message"]
        .as_str()
        .unwrap()
        .contains("cannot remove redis container"));
}

#[tokio::test]
async fn test_readyz_follows_readiness_flag() {
    let app = setup_test_app();

    let response = app.router.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["ready"], false);

    app.state.health_registry.set_ready(true).await;

    let response = app.router.clone().oneshot(get("/readyz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let app = setup_test_app();
    // operations recorded by the managers show up without any handle in the API state
    app.state.registry.start_all().await.unwrap();

    let response = app.router.clone().oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("dockerboot_operations_total"));
    assert!(metrics_text
        .contains(r#"dockerboot_operations_total{container_type="redis",operation="create_and_start"}"#));
    assert!(metrics_text.contains("dockerboot_image_pull_seconds_bucket"));
    assert!(metrics_text.contains("dockerboot_managed_containers"));
}

#[tokio::test]
async fn test_list_containers() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(get("/api/v1/containers"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let list = json_body(response).await;
    let keys: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["nginx", "redis"]);
    assert_eq!(list[1]["lifecycle_mode"], "START_AND_STOP");
    assert_eq!(list[1]["running"], false);
}

#[tokio::test]
async fn test_get_unknown_container_is_404() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(get("/api/v1/containers/postgres"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(json_body(response).await["error"]
        .as_str()
        .unwrap()
        .contains("postgres"));
}

#[tokio::test]
async fn test_targeted_start_event() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/v1/containers/nginx/events",
            r#"{"action":"START","source":"test"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let published = json_body(response).await;
    assert_eq!(published["delivered_to"], 2);
    assert_eq!(published["event"]["target"], "nginx");

    let engine = app.engine.clone();
    wait_for(|| engine.container("my-nginx").is_some()).await;
    assert!(app.engine.container("my-nginx").unwrap().running);
    assert!(app.engine.container("my-redis").is_none());

    let nginx = app.state.registry.get("nginx").unwrap();
    assert!(nginx.is_alive());
}

#[tokio::test]
async fn test_broadcast_stop_event() {
    let app = setup_test_app();
    app.state.registry.start_all().await.unwrap();

    let response = app
        .router
        .clone()
        .oneshot(post_json("/api/v1/events", r#"{"action":"stop"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["event"]["source"], "api");

    let redis = app.state.registry.get("redis").unwrap();
    wait_for(|| !redis.is_alive()).await;
    assert!(!redis.is_alive());
    assert!(!app.engine.container("my-redis").unwrap().running);
}

#[tokio::test]
async fn test_unknown_action_is_rejected() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(post_json("/api/v1/events", r#"{"action":"RESTART"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_event_for_unknown_container_is_404() {
    let app = setup_test_app();

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/v1/containers/postgres/events",
            r#"{"action":"START"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
