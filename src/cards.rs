//! Single-pass poller: new cards in the Realtime Database become FCM
//! notifications, tracked by a timestamp checkpoint stored in the same
//! database.
use anyhow::Result;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::fcm::{resolve_destination, Notifier};
use crate::model::RunReport;
use crate::render::render_card;
use crate::rtdb::CardSource;
use crate::store::CursorStore;

/// One polling run. Query and checkpoint-load errors abandon the run without
/// advancing the cursor; delivery failures do not, so a notification is
/// attempted at most once per card.
#[instrument(skip_all)]
pub async fn run(
    cfg: &Config,
    source: &dyn CardSource,
    notifier: &dyn Notifier,
    store: &dyn CursorStore<State = i64>,
) -> Result<RunReport> {
    let mut report = RunReport::default();

    let cursor = match store.load().await {
        Ok(cursor) => cursor,
        Err(err) => {
            error!(error = ?err, "failed to load the checkpoint, abandoning this run");
            return Ok(report);
        }
    };
    info!(cursor, "checking for new cards");

    let mut cards = match source.cards_since(cursor).await {
        Ok(cards) => cards,
        Err(err) => {
            error!(error = ?err, "failed to query the realtime database, abandoning this run");
            return Ok(report);
        }
    };
    report.found = cards.len();

    // The range query may hand back boundary records; a card's own timestamp
    // decides.
    cards.retain(|(id, card)| {
        if card.timestamp > cursor {
            true
        } else {
            info!(%id, timestamp = card.timestamp, cursor, "skipping card at or below the cursor");
            report.skipped += 1;
            false
        }
    });
    cards.sort_by_key(|(_, card)| card.timestamp);

    let destination = resolve_destination(cfg.fcm.device_token.as_deref(), cfg.fcm.topic.as_deref());

    let mut high_water = cursor;
    for (id, card) in &cards {
        info!(%id, timestamp = card.timestamp, "processing new card");
        let note = render_card(id, card);
        match &destination {
            Some(dest) => match notifier.deliver(&note, dest).await {
                Ok(receipt) => {
                    info!(%id, destination = %dest.describe(), receipt = %receipt, "notification sent");
                    report.sent += 1;
                }
                Err(err) => {
                    warn!(%id, error = ?err, "failed to send notification");
                    report.failed += 1;
                }
            },
            None => {
                warn!(%id, "no device token or topic configured, notification not sent");
                report.failed += 1;
            }
        }
        high_water = high_water.max(card.timestamp);
    }

    // Commit only after every dispatch attempt: a crash above re-delivers the
    // window next run instead of losing it.
    if let Err(err) = store.save(&high_water).await {
        warn!(error = ?err, high_water, "failed to persist the checkpoint, the window will be re-polled");
    }

    info!(
        found = report.found,
        sent = report.sent,
        failed = report.failed,
        skipped = report.skipped,
        new_cursor = high_water,
        "cards run complete"
    );
    Ok(report)
}
