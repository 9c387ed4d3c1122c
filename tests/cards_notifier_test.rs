use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use fcm_notifier::cards;
use fcm_notifier::config::Config;
use fcm_notifier::fcm::{Notifier, TOKEN_PLACEHOLDER};
use fcm_notifier::model::{Card, Destination, Notification};
use fcm_notifier::rtdb::CardSource;
use fcm_notifier::store::CursorStore;

fn card(id: &str, timestamp: i64) -> (String, Card) {
    let card = serde_json::from_value(json!({
        "timestamp": timestamp,
        "title": format!("Card {}", id),
        "description": "details"
    }))
    .unwrap();
    (id.to_string(), card)
}

fn test_config(device_token: Option<&str>, topic: Option<&str>) -> Config {
    let mut cfg = Config::default();
    cfg.fcm.device_token = device_token.map(str::to_string);
    cfg.fcm.topic = topic.map(str::to_string);
    cfg
}

/// Returns whatever it was built with; deliberately ignores the cursor so
/// tests can hand the poller boundary records.
struct FakeCards {
    cards: Vec<(String, Card)>,
    fail: bool,
}

impl FakeCards {
    fn with_cards(cards: Vec<(String, Card)>) -> Self {
        Self { cards, fail: false }
    }

    fn failing() -> Self {
        Self {
            cards: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl CardSource for FakeCards {
    async fn cards_since(&self, _cursor: i64) -> Result<Vec<(String, Card)>> {
        if self.fail {
            return Err(anyhow!("database unreachable"));
        }
        Ok(self.cards.clone())
    }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    deliveries: Arc<Mutex<Vec<(Notification, Destination)>>>,
}

impl RecordingNotifier {
    fn with_responses(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn pop_response(&self) -> Result<String> {
        let mut guard = self.responses.lock().await;
        guard
            .pop_front()
            .unwrap_or_else(|| Ok("projects/demo/messages/0".into()))
    }

    async fn deliveries(&self) -> Vec<(Notification, Destination)> {
        self.deliveries.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, note: &Notification, dest: &Destination) -> Result<String> {
        self.deliveries.lock().await.push((note.clone(), dest.clone()));
        self.pop_response().await
    }
}

struct MemoryCheckpoint {
    value: i64,
    fail_load: bool,
    fail_save: bool,
    saves: Arc<Mutex<Vec<i64>>>,
}

impl MemoryCheckpoint {
    fn at(value: i64) -> Self {
        Self {
            value,
            fail_load: false,
            fail_save: false,
            saves: Arc::default(),
        }
    }

    fn failing() -> Self {
        Self {
            fail_load: true,
            ..Self::at(0)
        }
    }

    fn failing_save(value: i64) -> Self {
        Self {
            fail_save: true,
            ..Self::at(value)
        }
    }

    async fn saves(&self) -> Vec<i64> {
        self.saves.lock().await.clone()
    }
}

#[async_trait]
impl CursorStore for MemoryCheckpoint {
    type State = i64;

    async fn load(&self) -> Result<i64> {
        if self.fail_load {
            return Err(anyhow!("checkpoint unreachable"));
        }
        Ok(self.value)
    }

    async fn save(&self, state: &i64) -> Result<()> {
        if self.fail_save {
            return Err(anyhow!("checkpoint write refused"));
        }
        self.saves.lock().await.push(*state);
        Ok(())
    }
}

#[tokio::test]
async fn cards_at_or_below_the_cursor_are_not_redelivered() {
    let source = FakeCards::with_cards(vec![
        card("card-a", 999),
        card("card-b", 1500),
        card("card-c", 1500),
    ]);
    let notifier = RecordingNotifier::default();
    let store = MemoryCheckpoint::at(1000);
    let cfg = test_config(None, Some("new_cards_topic"));

    let report = cards::run(&cfg, &source, &notifier, &store).await.unwrap();

    let deliveries = notifier.deliveries().await;
    assert_eq!(deliveries.len(), 2, "only cards past the cursor notify");
    let ids: Vec<&str> = deliveries
        .iter()
        .map(|(note, _)| note.data.get("card_id").unwrap().as_str())
        .collect();
    assert!(ids.contains(&"card-b") && ids.contains(&"card-c"));
    assert!(!ids.contains(&"card-a"));

    assert_eq!(store.saves().await, vec![1500]);
    assert_eq!(report.found, 3);
    assert_eq!(report.sent, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn cards_dispatch_in_ascending_timestamp_order() {
    let source = FakeCards::with_cards(vec![card("card-late", 1500), card("card-early", 1200)]);
    let notifier = RecordingNotifier::default();
    let store = MemoryCheckpoint::at(1000);
    let cfg = test_config(None, Some("new_cards_topic"));

    cards::run(&cfg, &source, &notifier, &store).await.unwrap();

    let deliveries = notifier.deliveries().await;
    let ids: Vec<&str> = deliveries
        .iter()
        .map(|(note, _)| note.data.get("card_id").unwrap().as_str())
        .collect();
    assert_eq!(ids, vec!["card-early", "card-late"]);
    assert_eq!(store.saves().await, vec![1500]);
}

#[tokio::test]
async fn device_token_beats_topic() {
    let source = FakeCards::with_cards(vec![card("card-a", 1200)]);
    let notifier = RecordingNotifier::default();
    let store = MemoryCheckpoint::at(1000);
    let cfg = test_config(Some("reg-1"), Some("alerts"));

    cards::run(&cfg, &source, &notifier, &store).await.unwrap();

    let deliveries = notifier.deliveries().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].1, Destination::Token("reg-1".into()));
}

#[tokio::test]
async fn placeholder_token_falls_back_to_topic() {
    let source = FakeCards::with_cards(vec![card("card-a", 1200)]);
    let notifier = RecordingNotifier::default();
    let store = MemoryCheckpoint::at(1000);
    let cfg = test_config(Some(TOKEN_PLACEHOLDER), Some("alerts"));

    cards::run(&cfg, &source, &notifier, &store).await.unwrap();

    let deliveries = notifier.deliveries().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].1, Destination::Topic("alerts".into()));
}

#[tokio::test]
async fn missing_destination_is_a_noop_failure() {
    let source = FakeCards::with_cards(vec![card("card-a", 1200)]);
    let notifier = RecordingNotifier::default();
    let store = MemoryCheckpoint::at(1000);
    let cfg = test_config(None, None);

    let report = cards::run(&cfg, &source, &notifier, &store).await.unwrap();

    assert!(notifier.deliveries().await.is_empty());
    assert_eq!(report.failed, 1);
    assert_eq!(report.sent, 0);
    // the cursor still advances: the card was seen and will not be retried
    assert_eq!(store.saves().await, vec![1200]);
}

#[tokio::test]
async fn delivery_failure_does_not_abort_the_batch() {
    let source = FakeCards::with_cards(vec![card("card-a", 1100), card("card-b", 1300)]);
    let notifier = RecordingNotifier::with_responses(vec![
        Err(anyhow!("fcm error 503: unavailable")),
        Ok("projects/demo/messages/77".into()),
    ]);
    let store = MemoryCheckpoint::at(1000);
    let cfg = test_config(None, Some("new_cards_topic"));

    let report = cards::run(&cfg, &source, &notifier, &store).await.unwrap();

    assert_eq!(notifier.deliveries().await.len(), 2, "both sends attempted");
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    // failures do not hold the cursor back; the attempt was made
    assert_eq!(store.saves().await, vec![1300]);
}

#[tokio::test]
async fn query_error_leaves_the_cursor_unadvanced() {
    let source = FakeCards::failing();
    let notifier = RecordingNotifier::default();
    let store = MemoryCheckpoint::at(1000);
    let cfg = test_config(None, Some("new_cards_topic"));

    let report = cards::run(&cfg, &source, &notifier, &store).await.unwrap();

    assert!(notifier.deliveries().await.is_empty());
    assert!(store.saves().await.is_empty(), "no checkpoint write on query failure");
    assert_eq!(report.found, 0);
}

#[tokio::test]
async fn checkpoint_load_error_abandons_the_run() {
    let source = FakeCards::with_cards(vec![card("card-a", 1200)]);
    let notifier = RecordingNotifier::default();
    let store = MemoryCheckpoint::failing();
    let cfg = test_config(None, Some("new_cards_topic"));

    let report = cards::run(&cfg, &source, &notifier, &store).await.unwrap();

    assert!(notifier.deliveries().await.is_empty());
    assert!(store.saves().await.is_empty());
    assert_eq!(report.found, 0);
}

#[tokio::test]
async fn checkpoint_write_failure_does_not_fail_the_run() {
    let source = FakeCards::with_cards(vec![card("card-a", 1200)]);
    let notifier = RecordingNotifier::default();
    let store = MemoryCheckpoint::failing_save(1000);
    let cfg = test_config(None, Some("new_cards_topic"));

    let report = cards::run(&cfg, &source, &notifier, &store).await.unwrap();

    assert_eq!(notifier.deliveries().await.len(), 1, "the send still happened");
    assert_eq!(report.found, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);
    // nothing persisted; the next run re-polls the same window
    assert!(store.saves().await.is_empty());
}

#[tokio::test]
async fn empty_window_still_rewrites_the_checkpoint() {
    let source = FakeCards::with_cards(Vec::new());
    let notifier = RecordingNotifier::default();
    let store = MemoryCheckpoint::at(1000);
    let cfg = test_config(None, Some("new_cards_topic"));

    let report = cards::run(&cfg, &source, &notifier, &store).await.unwrap();

    assert!(notifier.deliveries().await.is_empty());
    assert_eq!(store.saves().await, vec![1000]);
    assert_eq!(report.sent, 0);
}
