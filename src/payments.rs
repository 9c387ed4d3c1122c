//! Single-pass poller: recently updated payment sessions in Firestore become
//! FCM notifications, de-duplicated by a locally persisted set of
//! (session, status) keys.
use anyhow::Result;
use chrono::{Duration, Utc};
use std::collections::BTreeSet;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::fcm::Notifier;
use crate::firestore::SessionSource;
use crate::model::{Destination, RunReport};
use crate::render::render_session;
use crate::store::CursorStore;

/// Session statuses that warrant a push notification.
const RELEVANT_STATUSES: [&str; 2] = ["card_details_submitted", "pending_otp"];

/// De-duplication key for one (session, status) pair: the same session
/// notifies again when its status moves to another relevant value.
pub fn notification_key(session_id: &str, status: &str) -> String {
    format!("{}-{}", session_id, status)
}

/// One polling run over the lookback window. A session is marked processed
/// once at least one token delivery succeeds; if every token fails the key
/// stays unmarked and the session is retried while it remains inside the
/// window.
#[instrument(skip_all)]
pub async fn run(
    cfg: &Config,
    source: &dyn SessionSource,
    notifier: &dyn Notifier,
    store: &dyn CursorStore<State = BTreeSet<String>>,
) -> Result<RunReport> {
    let mut report = RunReport::default();

    let mut processed = match store.load().await {
        Ok(processed) => processed,
        Err(err) => {
            error!(error = ?err, "failed to load processed keys, abandoning this run");
            return Ok(report);
        }
    };

    let threshold_ms =
        (Utc::now() - Duration::minutes(cfg.payments.lookback_minutes as i64)).timestamp_millis();
    info!(
        threshold_ms,
        lookback_minutes = cfg.payments.lookback_minutes,
        known_keys = processed.len(),
        "checking for updated payment sessions"
    );

    let sessions = match source.sessions_updated_since(threshold_ms).await {
        Ok(sessions) => sessions,
        Err(err) => {
            error!(error = ?err, "failed to query firestore, abandoning this run");
            return Ok(report);
        }
    };
    report.found = sessions.len();

    let tokens = &cfg.fcm.device_tokens;
    if tokens.is_empty() && !sessions.is_empty() {
        warn!("no device tokens configured, payment notifications cannot be sent");
    }

    for session in &sessions {
        let Some(details) = session.card_payment_details.as_ref() else {
            info!(id = %session.id, "session has no card payment details, skipping");
            report.skipped += 1;
            continue;
        };
        let Some(status) = details.status.as_deref() else {
            info!(id = %session.id, "card payment details carry no status, skipping");
            report.skipped += 1;
            continue;
        };
        if !RELEVANT_STATUSES.contains(&status) {
            info!(id = %session.id, status, "status does not warrant a notification, skipping");
            report.skipped += 1;
            continue;
        }
        let key = notification_key(&session.id, status);
        if processed.contains(&key) {
            info!(id = %session.id, status, "already notified for this session and status");
            report.skipped += 1;
            continue;
        }

        info!(id = %session.id, status, "detected new payment event");
        let note = render_session(session, details, status);
        let mut delivered = false;
        for token in tokens {
            let dest = Destination::Token(token.clone());
            match notifier.deliver(&note, &dest).await {
                Ok(receipt) => {
                    info!(id = %session.id, destination = %dest.describe(), receipt = %receipt, "notification sent");
                    report.sent += 1;
                    delivered = true;
                }
                Err(err) => {
                    warn!(id = %session.id, destination = %dest.describe(), error = ?err, "failed to send notification");
                    report.failed += 1;
                }
            }
        }

        // One success marks the pair; persist right away so a crash later in
        // the batch cannot re-notify it.
        if delivered && processed.insert(key) {
            if let Err(err) = store.save(&processed).await {
                warn!(error = ?err, "failed to persist processed keys, duplicates possible next run");
            }
        }
    }

    // Rewrite at the end as well, covering runs where nothing changed.
    if let Err(err) = store.save(&processed).await {
        warn!(error = ?err, "failed to persist processed keys, duplicates possible next run");
    }

    info!(
        found = report.found,
        sent = report.sent,
        failed = report.failed,
        skipped = report.skipped,
        "payments run complete"
    );
    Ok(report)
}
