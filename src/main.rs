//! Biotop - habitat record verification and visibility service

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use biotop::{
    auth::JwtValidator,
    config::Args,
    db::{InMemoryRecordStore, MongoClient, MongoRecordStore, RecordStore},
    server::{self, AppState},
    services::{
        HabitatCatalog, HttpClassifier, InMemoryUserDirectory, MongoHabitatCatalog,
        MongoUserDirectory, RecordService, StaticHabitatCatalog, UserDirectory,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("biotop={},info", log_level).into());
    if args.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Biotop - Habitat Record Service");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} / {}", biotop::db::mongo::redact_uri(&args.mongodb_uri), args.mongodb_db);
    info!(
        "Classifier: {}",
        args.classifier_url.as_deref().unwrap_or("not configured")
    );
    info!("Max page size: {}", args.max_page_size);
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, continuing in memory): {}", e);
                None
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let (store, users, catalog): (
        Arc<dyn RecordStore>,
        Arc<dyn UserDirectory>,
        Arc<dyn HabitatCatalog>,
    ) = match &mongo {
        Some(client) => {
            let store: Arc<dyn RecordStore> = Arc::new(MongoRecordStore::new(client).await?);
            let users: Arc<dyn UserDirectory> = Arc::new(MongoUserDirectory::new(client).await?);
            let catalog: Arc<dyn HabitatCatalog> =
                Arc::new(MongoHabitatCatalog::new(client).await?);
            (store, users, catalog)
        }
        None => {
            let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
            let users: Arc<dyn UserDirectory> = Arc::new(InMemoryUserDirectory::new());
            let catalog: Arc<dyn HabitatCatalog> = Arc::new(StaticHabitatCatalog::new());
            (store, users, catalog)
        }
    };

    if args.seed_catalog {
        match catalog.ensure_seeded().await {
            Ok(inserted) => info!("Habitat catalog ready ({} new entries)", inserted),
            Err(e) => warn!("Habitat catalog seeding failed: {}", e),
        }
    }

    let mut records =
        RecordService::new(store, users, catalog).with_max_page_size(args.max_page_size);
    if let Some(url) = &args.classifier_url {
        let classifier = HttpClassifier::new(
            url.clone(),
            Duration::from_millis(args.classifier_timeout_ms),
        )?;
        // An analysis still marked running after two classifier timeouts was abandoned
        records = records
            .with_classifier(Arc::new(classifier))
            .with_analysis_stale_after(Duration::from_millis(
                args.classifier_timeout_ms.saturating_mul(2),
            ));
        info!("Re-analysis enabled via {}", url);
    } else {
        warn!("CLASSIFIER_URL not set - re-analysis requests will be rejected");
    }

    let jwt = match &args.jwt_secret {
        Some(secret) => JwtValidator::new(secret.clone(), args.jwt_expiry_seconds)?,
        None => JwtValidator::new_dev(),
    };

    let state = Arc::new(AppState::new(args, mongo, Arc::new(records), jwt));
    server::run(state).await?;

    Ok(())
}
