//! Minimal Firestore REST client: one structured query, plus decoding of the
//! typed wire values into plain JSON.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::model::PaymentSession;

const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/";

#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    base_url: Url,
    project_id: String,
    auth: Arc<dyn TokenProvider>,
}

impl fmt::Debug for FirestoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirestoreClient")
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl FirestoreClient {
    pub fn new(project_id: String, auth: Arc<dyn TokenProvider>) -> Self {
        let base_url = Url::parse(FIRESTORE_API_BASE).expect("valid default Firestore URL");
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

    /// Run the updated-since query against `collection_path` and decode every
    /// returned document. Documents with an unexpected shape are skipped with
    /// a warning.
    pub async fn query_updated_sessions(
        &self,
        collection_path: &str,
        updated_after_ms: i64,
    ) -> Result<Vec<PaymentSession>> {
        let (parent, collection_id) = split_collection_path(collection_path);
        let url = run_query_url(&self.base_url, &self.project_id, parent)?;
        let body = build_run_query(collection_id, "updatedAt", updated_after_ms);

        let token = self.auth.access_token().await?;
        debug!(url = %url, "running firestore query");
        let res = self
            .http
            .post(url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("failed to reach Firestore")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("firestore error {}: {}", status, body));
        }
        let rows: Vec<RunQueryRow> = res.json().await.context("invalid Firestore response")?;
        Ok(decode_rows(rows))
    }
}

/// Decode the documents in a `runQuery` response. Rows without a document and
/// documents with an unexpected shape are skipped.
fn decode_rows(rows: Vec<RunQueryRow>) -> Vec<PaymentSession> {
    let mut sessions = Vec::new();
    for row in rows {
        // Progress/metadata rows carry no document.
        let Some(doc) = row.document else { continue };
        match decode_session(doc) {
            Ok(session) => sessions.push(session),
            Err(err) => warn!(%err, "skipping malformed payment session"),
        }
    }
    sessions
}

fn run_query_url(base: &Url, project_id: &str, parent: &str) -> Result<Url> {
    let mut documents = format!("v1/projects/{}/databases/(default)/documents", project_id);
    if !parent.is_empty() {
        documents.push('/');
        documents.push_str(parent);
    }
    documents.push_str(":runQuery");
    base.join(&documents).context("invalid Firestore base URL")
}

/// Split a slash-separated collection path into the parent document path and
/// the collection id, e.g. `a/b/c` → (`a/b`, `c`).
pub fn split_collection_path(path: &str) -> (&str, &str) {
    let trimmed = path.trim_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    }
}

/// The structured query: `order_field > updated_after_ms`, ascending.
pub fn build_run_query(collection_id: &str, order_field: &str, updated_after_ms: i64) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection_id }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": order_field },
                    "op": "GREATER_THAN",
                    // int64 values travel as strings
                    "value": { "integerValue": updated_after_ms.to_string() }
                }
            },
            "orderBy": [{
                "field": { "fieldPath": order_field },
                "direction": "ASCENDING"
            }]
        }
    })
}

#[derive(Debug, Deserialize)]
struct RunQueryRow {
    #[serde(default)]
    document: Option<FirestoreDocument>,
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

fn decode_session(doc: FirestoreDocument) -> Result<PaymentSession> {
    let id = document_id(&doc.name).to_string();
    let fields = decode_fields(&doc.fields);
    let mut session: PaymentSession = serde_json::from_value(Value::Object(fields))
        .with_context(|| format!("payment session {} has an unexpected shape", id))?;
    session.id = id;
    Ok(session)
}

/// Last segment of a document resource name.
pub fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Flatten a map of Firestore-typed values into plain JSON.
pub fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect()
}

/// Flatten one Firestore-typed value (`{"stringValue": "x"}` and friends)
/// into plain JSON. Unknown shapes decode to null.
pub fn decode_value(value: &Value) -> Value {
    let Some(obj) = value.as_object() else {
        return Value::Null;
    };
    if let Some(v) = obj.get("stringValue") {
        return v.clone();
    }
    if let Some(v) = obj.get("integerValue") {
        return v
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| v.clone());
    }
    if let Some(v) = obj.get("doubleValue") {
        return v.clone();
    }
    if let Some(v) = obj.get("booleanValue") {
        return v.clone();
    }
    if let Some(v) = obj.get("timestampValue") {
        return v.clone();
    }
    if obj.contains_key("nullValue") {
        return Value::Null;
    }
    if let Some(map) = obj.get("mapValue") {
        let decoded = map
            .get("fields")
            .and_then(Value::as_object)
            .map(decode_fields)
            .unwrap_or_default();
        return Value::Object(decoded);
    }
    if let Some(array) = obj.get("arrayValue") {
        let decoded = array
            .get("values")
            .and_then(Value::as_array)
            .map(|values| values.iter().map(decode_value).collect())
            .unwrap_or_default();
        return Value::Array(decoded);
    }
    Value::Null
}

/// Where updated payment sessions come from.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn sessions_updated_since(&self, updated_after_ms: i64) -> Result<Vec<PaymentSession>>;
}

/// `SessionSource` view of one Firestore collection.
#[derive(Debug, Clone)]
pub struct SessionsCollection {
    client: Arc<FirestoreClient>,
    collection: String,
}

impl SessionsCollection {
    pub fn new(client: Arc<FirestoreClient>, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl SessionSource for SessionsCollection {
    async fn sessions_updated_since(&self, updated_after_ms: i64) -> Result<Vec<PaymentSession>> {
        self.client
            .query_updated_sessions(&self.collection, updated_after_ms)
            .await
    }
}
