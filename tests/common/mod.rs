#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tower::util::ServiceExt;

use tutor_backend::config::{AdaptiveConfig, Config, LlmConfig, WorkerConfig};
use tutor_backend::routes::build_router;
use tutor_backend::services::llm::LlmClient;
use tutor_backend::state::AppState;
use tutor_backend::store::operations::curriculum::{Concept, NewConcept, Topic};
use tutor_backend::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<Store>,
    pub llm: Arc<LlmClient>,
    _temp_dir: TempDir,
}

pub fn test_config(sled_path: String) -> Config {
    Config {
        host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
        port: 0,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path,
        cors_origin: "http://localhost:5173".to_string(),
        worker: WorkerConfig {
            is_leader: false,
            session_max_idle_hours: 12,
        },
        llm: LlmConfig {
            base_url: String::new(),
            model: "test".to_string(),
            mock: true,
            timeout_secs: 5,
            max_tokens: 256,
        },
        adaptive: AdaptiveConfig::default(),
    }
}

pub async fn spawn() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("tutor-test.sled");
    let config = test_config(sled_path.to_string_lossy().to_string());

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    let llm = Arc::new(LlmClient::new(&config.llm));
    let (shutdown_tx, _) = broadcast::channel(4);
    let state = AppState::new(store.clone(), llm.clone(), &config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        store,
        llm,
        _temp_dir: temp_dir,
    }
}

/// Seed a topic with three concepts c1 -> c2 -> c3 where each depends on
/// the previous one.
pub fn seed_topic(store: &Store) -> (Topic, Vec<Concept>) {
    let topic = store.create_topic("First Grade Math", "numbers to 20").unwrap();
    let mut concepts = Vec::new();
    let mut prereqs: Vec<String> = Vec::new();
    for (order, name) in ["counting", "addition", "subtraction"].iter().enumerate() {
        let concept = store
            .create_concept(
                &topic.id,
                &NewConcept {
                    name: name.to_string(),
                    description: format!("{name} within 20"),
                    order_index: order as u32,
                    prerequisites: prereqs.clone(),
                    mastery_threshold: None,
                    visual_required: false,
                },
                0.75,
            )
            .unwrap();
        prereqs = vec![concept.id.clone()];
        concepts.push(concept);
    }
    (topic, concepts)
}

pub async fn request(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> Response {
    let builder = Request::builder().method(method).uri(path);
    let req = if let Some(payload) = body {
        builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("empty body")
    };

    app.clone().oneshot(req).await.expect("oneshot response")
}

pub async fn response_json(resp: Response) -> (StatusCode, Value) {
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body bytes");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response json")
    };
    (status, json)
}
