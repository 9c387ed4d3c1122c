//! Cursor persistence: how far polling progressed across runs.
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::rtdb::RtdbClient;

/// Durable polling progress. `load` runs once at job start and `save`
/// whenever the poller commits. Implementations treat absent or unreadable
/// state as the starting value rather than failing the run; only transport
/// errors surface as `Err`.
#[async_trait]
pub trait CursorStore: Send + Sync {
    type State: Send + Sync;

    async fn load(&self) -> Result<Self::State>;
    async fn save(&self, state: &Self::State) -> Result<()>;
}

/// Timestamp cursor kept in the Realtime Database, next to the data it
/// tracks.
#[derive(Debug, Clone)]
pub struct RtdbCheckpointStore {
    client: Arc<RtdbClient>,
    path: String,
}

impl RtdbCheckpointStore {
    pub fn new(client: Arc<RtdbClient>, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }
}

#[async_trait]
impl CursorStore for RtdbCheckpointStore {
    type State = i64;

    async fn load(&self) -> Result<i64> {
        let value = self.client.get_value(&self.path).await?;
        match checkpoint_from_value(&value) {
            Some(ts) => Ok(ts),
            None => {
                match &value {
                    Value::Null => {
                        info!(path = %self.path, "no checkpoint stored, starting from 0")
                    }
                    other => warn!(
                        path = %self.path,
                        value = %other,
                        "checkpoint is not an integer, starting from 0"
                    ),
                }
                Ok(0)
            }
        }
    }

    async fn save(&self, state: &i64) -> Result<()> {
        self.client.put_value(&self.path, &Value::from(*state)).await
    }
}

/// A checkpoint node holds a single integer; anything else reads as unset.
fn checkpoint_from_value(value: &Value) -> Option<i64> {
    value.as_i64()
}

/// Set of already-processed keys persisted as a JSON string array in a local
/// file. An absent or corrupt file is an empty set, never an error, so a
/// fresh checkout starts cleanly and a damaged file only risks duplicate
/// notifications, not a crash.
#[derive(Debug, Clone)]
pub struct JsonKeySetStore {
    path: PathBuf,
}

impl JsonKeySetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CursorStore for JsonKeySetStore {
    type State = BTreeSet<String>;

    async fn load(&self) -> Result<BTreeSet<String>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeSet::new());
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "could not read the processed-key file, starting empty");
                return Ok(BTreeSet::new());
            }
        };
        match serde_json::from_slice::<Vec<String>>(&raw) {
            Ok(keys) => Ok(keys.into_iter().collect()),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "processed-key file is corrupt, starting empty");
                Ok(BTreeSet::new())
            }
        }
    }

    async fn save(&self, state: &BTreeSet<String>) -> Result<()> {
        let keys: Vec<&String> = state.iter().collect();
        let raw = serde_json::to_vec(&keys).context("failed to encode processed keys")?;
        tokio::fs::write(&self.path, raw)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn checkpoint_value_parsing() {
        assert_eq!(checkpoint_from_value(&json!(1500)), Some(1500));
        assert_eq!(checkpoint_from_value(&Value::Null), None);
        assert_eq!(checkpoint_from_value(&json!("1500")), None);
        assert_eq!(checkpoint_from_value(&json!(12.5)), None);
        assert_eq!(checkpoint_from_value(&json!({"at": 1500})), None);
    }

    #[tokio::test]
    async fn absent_file_loads_as_empty_set() {
        let td = tempdir().unwrap();
        let store = JsonKeySetStore::new(td.path().join("processed_sessions.json"));
        let keys = store.load().await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_loads_as_empty_set() {
        let td = tempdir().unwrap();
        let path = td.path().join("processed_sessions.json");
        tokio::fs::write(&path, b"{definitely not json").await.unwrap();
        let store = JsonKeySetStore::new(&path);
        let keys = store.load().await.unwrap();
        assert!(keys.is_empty());

        tokio::fs::write(&path, b"{\"wrong\": \"shape\"}").await.unwrap();
        let keys = store.load().await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn keys_round_trip_sorted() {
        let td = tempdir().unwrap();
        let path = td.path().join("processed_sessions.json");
        let store = JsonKeySetStore::new(&path);

        let mut keys = BTreeSet::new();
        keys.insert("sess-2-pending_otp".to_string());
        keys.insert("sess-1-card_details_submitted".to_string());
        store.save(&keys).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, keys);

        // deterministic on-disk form
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(
            raw,
            "[\"sess-1-card_details_submitted\",\"sess-2-pending_otp\"]"
        );
    }
}
