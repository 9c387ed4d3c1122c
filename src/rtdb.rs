//! Minimal Firebase Realtime Database REST client, plus the card change
//! source built on it.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::model::Card;

#[derive(Clone)]
pub struct RtdbClient {
    http: Client,
    base_url: Url,
    auth: Arc<dyn TokenProvider>,
}

impl fmt::Debug for RtdbClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtdbClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RtdbClient {
    pub fn new(database_url: &str, auth: Arc<dyn TokenProvider>) -> Result<Self> {
        let base_url = Url::parse(database_url).context("invalid Realtime Database URL")?;
        Ok(Self::with_base_url(base_url, auth))
    }

    pub fn with_base_url(mut base_url: Url, auth: Arc<dyn TokenProvider>) -> Self {
        // Url::join drops the last path segment without this.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        let http = Client::builder()
            .user_agent("fcm-notifier/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            auth,
        }
    }

    /// Records under `path` whose `order_by` child is at or above `start_at`,
    /// as raw JSON. The REST API answers with an id→record object, or `null`
    /// when nothing matched.
    pub async fn range_query(&self, path: &str, order_by: &str, start_at: i64) -> Result<Value> {
        let url = range_query_url(&self.base_url, path, order_by, start_at)?;
        self.get_json(url).await
    }

    /// The plain value stored at `path`.
    pub async fn get_value(&self, path: &str) -> Result<Value> {
        let url = node_url(&self.base_url, path)?;
        self.get_json(url).await
    }

    /// Overwrite `path` with `value`.
    pub async fn put_value(&self, path: &str, value: &Value) -> Result<()> {
        let url = node_url(&self.base_url, path)?;
        let token = self.auth.access_token().await?;
        debug!(url = %url, "writing to realtime database");
        let res = self
            .http
            .put(url)
            .header("Authorization", format!("Bearer {}", token))
            .json(value)
            .send()
            .await
            .context("failed to reach the Realtime Database")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("realtime database error {}: {}", status, body));
        }
        Ok(())
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        let token = self.auth.access_token().await?;
        debug!(url = %url, "querying realtime database");
        let res = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .context("failed to reach the Realtime Database")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("realtime database error {}: {}", status, body));
        }
        res.json::<Value>()
            .await
            .context("invalid Realtime Database response")
    }
}

fn node_url(base: &Url, path: &str) -> Result<Url> {
    base.join(&format!("{}.json", path.trim_matches('/')))
        .context("invalid Realtime Database path")
}

fn range_query_url(base: &Url, path: &str, order_by: &str, start_at: i64) -> Result<Url> {
    let mut url = node_url(base, path)?;
    // orderBy takes a JSON string, quotes included.
    url.query_pairs_mut()
        .append_pair("orderBy", &format!("\"{}\"", order_by))
        .append_pair("startAt", &start_at.to_string());
    Ok(url)
}

/// Decode a range-query snapshot into (id, card) pairs. Entries that are not
/// objects, or that fail to decode, are skipped with a warning so one bad
/// record cannot poison the batch.
pub fn decode_cards(snapshot: Value) -> Vec<(String, Card)> {
    let entries = match snapshot {
        Value::Null => return Vec::new(),
        Value::Object(map) => map,
        other => {
            warn!(snapshot = %other, "unexpected snapshot shape, ignoring");
            return Vec::new();
        }
    };
    let mut cards = Vec::new();
    for (id, value) in entries {
        match serde_json::from_value::<Card>(value) {
            Ok(card) => cards.push((id, card)),
            Err(err) => warn!(%id, %err, "skipping malformed card entry"),
        }
    }
    cards
}

/// Where new cards come from.
#[async_trait]
pub trait CardSource: Send + Sync {
    /// Candidate cards whose timestamp may exceed `cursor`. Callers must
    /// re-check each record's own timestamp; the source is allowed to return
    /// records at the boundary.
    async fn cards_since(&self, cursor: i64) -> Result<Vec<(String, Card)>>;
}

/// `CardSource` view of one Realtime Database path.
#[derive(Debug, Clone)]
pub struct CardsPath {
    client: Arc<RtdbClient>,
    path: String,
}

impl CardsPath {
    pub fn new(client: Arc<RtdbClient>, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }
}

#[async_trait]
impl CardSource for CardsPath {
    async fn cards_since(&self, cursor: i64) -> Result<Vec<(String, Card)>> {
        // startAt is inclusive, so ask from cursor + 1.
        let snapshot = self
            .client
            .range_query(&self.path, "timestamp", cursor + 1)
            .await?;
        Ok(decode_cards(snapshot))
    }
}
