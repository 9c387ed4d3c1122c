use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A card record under the Realtime Database cards path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    /// Milliseconds since the epoch; the polling cursor compares against it.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Whatever else the application stores alongside a card.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A payment session document from Firestore, after the typed wire values
/// have been flattened to plain JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    /// Document id, taken from the resource name rather than the fields.
    #[serde(default)]
    pub id: String,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub mobile_number: Option<String>,
    #[serde(default)]
    pub card_payment_details: Option<CardPaymentDetails>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Nested card group inside a payment session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPaymentDetails {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub card_holder_name: Option<String>,
    #[serde(default)]
    pub last4_digits: Option<String>,
    /// Stored as a number or a string depending on the writer.
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A rendered push notification, ready for any destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Auxiliary key/value payload; FCM requires string values.
    pub data: BTreeMap<String, String>,
}

/// Where a notification is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Token(String),
    Topic(String),
}

impl Destination {
    /// Short log-safe form; registration tokens are truncated.
    pub fn describe(&self) -> String {
        match self {
            Destination::Token(token) => {
                let prefix: String = token.chars().take(10).collect();
                format!("token {}...", prefix)
            }
            Destination::Topic(topic) => format!("topic '{}'", topic),
        }
    }
}

/// What one polling run did, for the final log line and for tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Candidates returned by the change-source query.
    pub found: usize,
    /// Successful deliveries.
    pub sent: usize,
    /// Delivery attempts that failed (including an unresolvable destination).
    pub failed: usize,
    /// Records filtered out before dispatch.
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn card_keeps_unknown_attributes() {
        let card: Card = serde_json::from_value(json!({
            "timestamp": 1500,
            "title": "Launch",
            "color": "red"
        }))
        .unwrap();
        assert_eq!(card.timestamp, 1500);
        assert_eq!(card.title.as_deref(), Some("Launch"));
        assert_eq!(card.description, None);
        assert_eq!(card.extra.get("color"), Some(&json!("red")));
    }

    #[test]
    fn session_field_names_are_camel_case() {
        let session: PaymentSession = serde_json::from_value(json!({
            "updatedAt": 1700000000000_i64,
            "orderId": "o-42",
            "mobileNumber": "5551234",
            "cardPaymentDetails": {
                "status": "pending_otp",
                "cardHolderName": "Ada Lovelace",
                "last4Digits": "4242",
                "amount": 250
            }
        }))
        .unwrap();
        assert_eq!(session.updated_at, 1700000000000);
        assert_eq!(session.order_id.as_deref(), Some("o-42"));
        let details = session.card_payment_details.unwrap();
        assert_eq!(details.status.as_deref(), Some("pending_otp"));
        assert_eq!(details.last4_digits.as_deref(), Some("4242"));
        assert_eq!(details.amount, Some(json!(250)));
    }

    #[test]
    fn destination_describe_truncates_tokens() {
        let dest = Destination::Token("abcdefghijklmnop".to_string());
        assert_eq!(dest.describe(), "token abcdefghij...");
        let topic = Destination::Topic("new_cards_topic".to_string());
        assert_eq!(topic.describe(), "topic 'new_cards_topic'");
    }
}
