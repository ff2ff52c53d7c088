#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use http_body_util::BodyExt;
use order_receipts::{
    app_router,
    config::AppConfig,
    integrations::Embed,
    notifications::{Channel, Notifier},
    AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-receipt-secret";

/// Notifier that records every notice instead of posting it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Channel, Embed)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(Channel, Embed)> {
        self.sent.lock().expect("notifier lock").clone()
    }

    pub fn count(&self, channel: Channel) -> usize {
        self.sent().iter().filter(|(c, _)| *c == channel).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, channel: Channel, embed: &Embed) -> anyhow::Result<()> {
        self.sent.lock().expect("notifier lock").push((channel, embed.clone()));
        Ok(())
    }
}

/// Helper harness wrapping the router over fresh in-memory state.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Self::config())
    }

    /// Minimal configuration suitable for tests.
    pub fn config() -> AppConfig {
        let mut cfg = AppConfig::new(TEST_SECRET);
        cfg.environment = "test".to_string();
        cfg.store_name = "Test Shop".to_string();
        cfg.staff_chat_key = Some("staff-secret".to_string());
        cfg
    }

    pub fn with_config(cfg: AppConfig) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::new(cfg, Some(notifier.clone() as Arc<dyn Notifier>))
            .expect("failed to build test state");
        Self {
            router: app_router(state.clone()),
            state,
            notifier,
        }
    }

    pub fn token_for(&self, order_id: &str) -> String {
        self.state.tokens.issue(order_id)
    }

    /// Send a request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn get(&self, uri: &str) -> axum::response::Response {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> axum::response::Response {
        self.request(Method::POST, uri, Some(body)).await
    }

    /// Serves the router on an ephemeral local port for socket clients.
    pub async fn serve(&self) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("test server failed");
        });
        addr
    }

    /// Posts an `order.paid` webhook for `data`.
    pub async fn deliver(&self, event: &str, data: Value) -> axum::response::Response {
        self.post_json("/webhook", json!({ "event": event, "data": data }))
            .await
    }
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("body is not utf-8")
}

pub async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).expect("body is not json")
}

/// Payload used across the webhook scenarios.
pub fn vip_pass_order(order_id: &str) -> Value {
    json!({
        "id": order_id,
        "product_variants": [{
            "product_title": "VIP Pass",
            "quantity": 1,
            "additional_information": [{"label": "Roblox Username", "value": "Foo123"}]
        }],
        "customer_information": {"email": "a@b.com", "country": "US"}
    })
}

/// Waits for spawned side effects to reach the notifier.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
}
