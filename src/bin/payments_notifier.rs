use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use fcm_notifier::auth::{self, ServiceAccountTokenProvider};
use fcm_notifier::config;
use fcm_notifier::fcm::FcmClient;
use fcm_notifier::firestore::{FirestoreClient, SessionsCollection};
use fcm_notifier::payments;
use fcm_notifier::store::JsonKeySetStore;

/// Scopes for Firestore reads plus messaging.
const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/datastore",
    "https://www.googleapis.com/auth/firebase.messaging",
];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Poll Firestore for updated payment sessions, push FCM notifications and exit"
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

    let key = auth::load_service_account(&cfg.firebase)?;
    let project_id = key.project_id.clone();
    let auth = Arc::new(ServiceAccountTokenProvider::new(key, &SCOPES));

    let firestore = Arc::new(FirestoreClient::new(project_id.clone(), auth.clone()));
    let source = SessionsCollection::new(firestore, cfg.payments.collection.clone());
    let store = JsonKeySetStore::new(cfg.payments.state_file.clone());
    let notifier = FcmClient::new(project_id, auth);

    info!("starting payments notifier");
    let report = payments::run(&cfg, &source, &notifier, &store).await?;
    info!(
        found = report.found,
        sent = report.sent,
        failed = report.failed,
        skipped = report.skipped,
        "payments notifier finished"
    );
    Ok(())
}
