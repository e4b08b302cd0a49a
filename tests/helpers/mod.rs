//! Test helpers: an in-process app on the memory store with a scripted
//! printer, driven through `tower::ServiceExt::oneshot`.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use labelops::app_state::AppState;
use labelops::config::AppConfig;
use labelops::db::memory::MemoryStore;
use labelops::routes::build_router;
use labelops::services::auth::{issue_token, Role};
use labelops::services::printer::{BridgeError, PrinterBridge, PrinterDevice};

pub const SECRET: &str = "api-test-secret-that-is-long-enough";

/// Printer bridge that fails with queued errors, then succeeds.
#[derive(Default)]
pub struct ScriptedBridge {
    failures: Mutex<VecDeque<BridgeError>>,
    pub sent: Mutex<Vec<String>>,
}

impl ScriptedBridge {
    pub async fn fail_next(&self, errors: impl IntoIterator<Item = BridgeError>) {
        self.failures.lock().await.extend(errors);
    }
}

pub fn zebra() -> PrinterDevice {
    PrinterDevice {
        name: "ZD421".to_string(),
        uid: "ZD421-USB".to_string(),
        connection: "usb".to_string(),
        device_type: "printer".to_string(),
        provider: String::new(),
        manufacturer: "Zebra Technologies".to_string(),
    }
}

#[async_trait]
impl PrinterBridge for ScriptedBridge {
    async fn discover(&self) -> Result<Vec<PrinterDevice>, BridgeError> {
        Ok(vec![zebra()])
    }

    async fn default_printer(&self) -> Result<Option<PrinterDevice>, BridgeError> {
        Ok(Some(zebra()))
    }

    async fn send(&self, _device: &PrinterDevice, content: &str) -> Result<(), BridgeError> {
        if let Some(err) = self.failures.lock().await.pop_front() {
            return Err(err);
        }
        self.sent.lock().await.push(content.to_string());
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "scripted"
    }
}

pub struct TestApp {
    pub router: Router,
    pub bridge: Arc<ScriptedBridge>,
    pub operator: Uuid,
    pub operator_token: String,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(|_| {})
}

pub fn spawn_app_with(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let mut config = AppConfig::with_secret(SECRET);
    configure(&mut config);

    let store = Arc::new(MemoryStore::new());
    let bridge = Arc::new(ScriptedBridge::default());
    let state = AppState::new(config, store.clone(), store.clone(), store, bridge.clone());

    let operator = Uuid::new_v4();
    TestApp {
        router: build_router(state, None),
        bridge,
        operator,
        operator_token: token(operator, Role::Operator),
    }
}

pub fn token(user_id: Uuid, role: Role) -> String {
    issue_token(user_id, role, SECRET, 600).expect("token")
}

impl TestApp {
    /// Send a request and decode the JSON body (`Null` when empty).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(&self.operator_token), None)
            .await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(&self.operator_token), Some(body))
            .await
    }

    /// Ingest records and return the ids of the new labels.
    pub async fn ingest(&self, labels: Value) -> Vec<Uuid> {
        let (status, body) = self
            .post("/api/v1/labels/batch", serde_json::json!({ "labels": labels }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["new_labels"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["id"].as_str().unwrap().parse().unwrap())
            .collect()
    }
}
