//! Accolade - academic achievement tracking service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use accolade::{
    auth::JwtValidator,
    config::Args,
    db::{seed, MongoClient, MongoDetailStore, SqliteDb, SqliteDirectory, SqliteReferenceStore},
    lifecycle::{DetailStore, InMemoryDetailStore, LifecycleEngine},
    server::{self, AppState},
    uploads::LocalFileStorage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("accolade={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Accolade - Achievement Tracking");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("SQLite: {}", args.sqlite_path);
    info!("MongoDB: {} (db {})", args.mongodb_uri, args.mongodb_db);
    info!("Uploads: {} (max {} bytes)", args.upload_dir, args.max_upload_bytes);
    info!("======================================");

    // Relational store: references and the identity directory share one database
    let sqlite = Arc::new(SqliteDb::open(&args.sqlite_path)?);
    let directory = Arc::new(SqliteDirectory::new(Arc::clone(&sqlite)));
    let references = Arc::new(SqliteReferenceStore::new(Arc::clone(&sqlite)));

    if args.dev_mode && seed::seed_demo_accounts(&directory).await? {
        info!(
            "Seeded demo accounts admin / lecturer / student (password: {})",
            seed::DEMO_PASSWORD
        );
    }

    // Document store (optional in dev mode)
    let details: Arc<dyn DetailStore> = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Arc::new(MongoDetailStore::new(&client).await?)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory details): {}", e);
                Arc::new(InMemoryDetailStore::new())
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let files = Arc::new(LocalFileStorage::new(&args.upload_dir, args.max_upload_bytes));

    let jwt = match args.jwt_secret() {
        Some(secret) => JwtValidator::new(secret.to_string(), args.jwt_expiry_seconds)?,
        None => {
            warn!("No JWT_SECRET set, using the development signing key");
            JwtValidator::new_dev()
        }
    };

    let engine = LifecycleEngine::new(references, details, directory, files)
        .with_store_timeout(args.store_timeout());

    let state = Arc::new(AppState::new(args, engine, jwt));
    server::run(state).await?;

    Ok(())
}
