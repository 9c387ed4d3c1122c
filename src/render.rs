//! Turns records into notification payloads.
use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::{Card, CardPaymentDetails, Notification, PaymentSession};

const UNTITLED_CARD: &str = "Untitled Card";
const NO_DESCRIPTION: &str = "No description.";
/// Fallback for absent payment attributes.
const NOT_AVAILABLE: &str = "N/A";
/// Opened by the receiving app when a payment notification is tapped.
const CLICK_ACTION_URL: &str = "https://spinblaze.in/";

/// Notification for one new card.
pub fn render_card(id: &str, card: &Card) -> Notification {
    let title = card.title.as_deref().unwrap_or(UNTITLED_CARD);
    let description = card.description.as_deref().unwrap_or(NO_DESCRIPTION);

    let mut data = BTreeMap::new();
    data.insert("card_id".to_string(), id.to_string());
    data.insert("type".to_string(), "new_card".to_string());

    Notification {
        title: format!("New Card: {}", title),
        body: format!("Details: {}", description),
        data,
    }
}

/// Notification for one payment session event. `details` and `status` are the
/// session's own, passed separately because the caller has already checked
/// they exist.
pub fn render_session(
    session: &PaymentSession,
    details: &CardPaymentDetails,
    status: &str,
) -> Notification {
    let holder = details.card_holder_name.as_deref().unwrap_or(NOT_AVAILABLE);
    let last4 = details.last4_digits.as_deref().unwrap_or(NOT_AVAILABLE);
    let amount = details
        .amount
        .as_ref()
        .map(scalar_text)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let mut data = BTreeMap::new();
    data.insert("sessionId".to_string(), session.id.clone());
    data.insert(
        "orderId".to_string(),
        session.order_id.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
    );
    data.insert("amount".to_string(), amount.clone());
    data.insert(
        "mobileNumber".to_string(),
        session.mobile_number.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
    );
    data.insert("cardHolder".to_string(), holder.to_string());
    data.insert("cardLast4".to_string(), last4.to_string());
    data.insert("cardStatus".to_string(), status.to_string());
    data.insert("click_action".to_string(), CLICK_ACTION_URL.to_string());

    Notification {
        title: "New Card Payment Alert!".to_string(),
        body: format!(
            "Card by {} (ends {}) for ${} submitted. Status: {}",
            holder, last4, amount, status
        ),
        data,
    }
}

/// Text form of a scalar attribute; strings render unquoted.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}
