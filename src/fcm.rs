//! Firebase Cloud Messaging HTTP v1 client.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::auth::TokenProvider;
use crate::model::{Destination, Notification};

const FCM_API_BASE: &str = "https://fcm.googleapis.com/";

/// Sample value some deployments leave in place of a real registration
/// token; it must never be used as a destination.
pub const TOKEN_PLACEHOLDER: &str = "YOUR_DEVICE_FCM_REGISTRATION_TOKEN";

/// Anything that can attempt one push delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Attempt exactly one delivery and return the provider's message name.
    async fn deliver(&self, note: &Notification, dest: &Destination) -> Result<String>;
}

#[derive(Clone)]
pub struct FcmClient {
    http: Client,
    base_url: Url,
    project_id: String,
    auth: Arc<dyn TokenProvider>,
}

impl fmt::Debug for FcmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FcmClient")
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl FcmClient {
    pub fn new(project_id: String, auth: Arc<dyn TokenProvider>) -> Self {
        let base_url = Url::parse(FCM_API_BASE).expect("valid default FCM URL");
        Self::with_base_url(project_id, auth, base_url)
    }

    pub fn with_base_url(project_id: String, auth: Arc<dyn TokenProvider>, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("fcm-notifier/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            project_id,
            auth,
        }
    }

    pub fn build_send_request(&self, token: &str, body: &Value) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(&format!("v1/projects/{}/messages:send", self.project_id))
            .context("invalid FCM base URL")?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build FCM request")
    }

    async fn execute_send(&self, body: Value) -> Result<String> {
        let token = self.auth.access_token().await?;
        let request = self.build_send_request(&token, &body)?;
        debug!(url = %request.url(), payload = %body, "sending fcm message");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach FCM")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("fcm error {}: {}", status, body));
        }
        let payload: SendResponse = res.json().await.context("invalid FCM response")?;
        Ok(payload.name)
    }
}

#[async_trait]
impl Notifier for FcmClient {
    async fn deliver(&self, note: &Notification, dest: &Destination) -> Result<String> {
        self.execute_send(build_message_request(note, dest)).await
    }
}

/// The v1 `messages:send` envelope for one notification and destination.
pub fn build_message_request(note: &Notification, dest: &Destination) -> Value {
    let mut message = Map::new();
    match dest {
        Destination::Token(token) => {
            message.insert("token".to_string(), json!(token));
        }
        Destination::Topic(topic) => {
            message.insert("topic".to_string(), json!(topic));
        }
    }
    message.insert(
        "notification".to_string(),
        json!({ "title": note.title, "body": note.body }),
    );
    if !note.data.is_empty() {
        message.insert("data".to_string(), json!(note.data));
    }
    json!({ "message": Value::Object(message) })
}

/// Pick the single-destination jobs' target: a configured device token wins
/// when it is set, non-empty and not the sample placeholder; otherwise the
/// topic; otherwise nothing.
pub fn resolve_destination(device_token: Option<&str>, topic: Option<&str>) -> Option<Destination> {
    if let Some(token) = device_token {
        let token = token.trim();
        if !token.is_empty() && token != TOKEN_PLACEHOLDER {
            return Some(Destination::Token(token.to_string()));
        }
    }
    match topic.map(str::trim) {
        Some(topic) if !topic.is_empty() => Some(Destination::Topic(topic.to_string())),
        _ => None,
    }
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}
