//! Achievement ledger - student achievement lifecycle service

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use achievement_ledger::{
    config::Args,
    db::{MongoClient, ReferenceDb},
    directory::{spawn_cleanup_task, CachedDirectory, Directory, SqliteDirectory},
    server,
    services::Services,
    store::{ContentStore, MemoryContentStore, MongoContentStore, SqliteReferenceStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("achievement_ledger={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Achievement Ledger");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Reference DB: {:?}", args.reference_db_path);
    info!("Directory cache TTL: {}s", args.directory_cache_ttl_secs);
    info!("======================================");

    // Content store: MongoDB, or in-memory when dev mode allows it
    let content: Arc<dyn ContentStore> =
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => {
                info!("MongoDB connected successfully");
                Arc::new(MongoContentStore::new(&client).await?)
            }
            Err(e) => {
                if args.dev_mode {
                    warn!(
                        "MongoDB connection failed (dev mode, using in-memory content store): {}",
                        e
                    );
                    Arc::new(MemoryContentStore::new())
                } else {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        };

    let db = Arc::new(ReferenceDb::open(&args.reference_db_path)?);
    let references = Arc::new(SqliteReferenceStore::new(db.clone()));
    let cached = Arc::new(CachedDirectory::new(
        SqliteDirectory::new(db),
        args.directory_cache(),
    ));
    if !args.directory_cache().ttl.is_zero() {
        spawn_cleanup_task(Arc::clone(&cached), Duration::from_secs(60));
    }
    let directory: Arc<dyn Directory> = cached;

    let services = Services::new(content, references, directory, args.service_settings());
    let state = Arc::new(server::AppState::new(args, services));

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
