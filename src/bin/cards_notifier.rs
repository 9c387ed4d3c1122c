use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use fcm_notifier::auth::{self, ServiceAccountTokenProvider};
use fcm_notifier::cards;
use fcm_notifier::config;
use fcm_notifier::fcm::FcmClient;
use fcm_notifier::rtdb::{CardsPath, RtdbClient};
use fcm_notifier::store::RtdbCheckpointStore;

/// Scopes for Realtime Database reads/writes plus messaging.
const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/firebase.database",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/firebase.messaging",
];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Poll the Realtime Database for new cards, push FCM notifications and exit"
)]
struct Args {
    /// Path to YAML config file (uses config.yaml when present, else defaults)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(args.config.as_deref())?;
    let database_url = cfg.database_url()?.to_string();

    let key = auth::load_service_account(&cfg.firebase)?;
    let project_id = key.project_id.clone();
    let auth = Arc::new(ServiceAccountTokenProvider::new(key, &SCOPES));

    let rtdb = Arc::new(RtdbClient::new(&database_url, auth.clone())?);
    let source = CardsPath::new(rtdb.clone(), cfg.cards.path.clone());
    let store = RtdbCheckpointStore::new(rtdb, cfg.cards.checkpoint_path.clone());
    let notifier = FcmClient::new(project_id, auth);

    info!("starting cards notifier");
    let report = cards::run(&cfg, &source, &notifier, &store).await?;
    info!(
        found = report.found,
        sent = report.sent,
        failed = report.failed,
        skipped = report.skipped,
        "cards notifier finished"
    );
    Ok(())
}
