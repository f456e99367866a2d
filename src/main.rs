use axum::{Extension, Router};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use retro_studio::gemini_client::GeminiClient;
use retro_studio::jobs::RunManager;
use retro_studio::services::{
    FfmpegVideoProcessor, GenerationServices, InMemoryMediaRepository, LocalObjectStore, MediaRepository,
    ObjectStore, PostgresMediaRepository,
};
use retro_studio::settings::Settings;
use retro_studio::veo_client::VeoClient;
use retro_studio::workflow::{RetroGameConfig, RetroGameOrchestrator};
use retro_studio::{db, handlers, middleware, AppState};

/// Finished runs are kept this long for polling and regeneration.
const RUN_RETENTION_HOURS: i64 = 24;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging()?;
    let settings = Settings::from_env();

    if let Err(e) = std::fs::create_dir_all(&settings.storage_root) {
        tracing::warn!("Failed to create storage directory {}: {}", settings.storage_root.display(), e);
    } else {
        tracing::info!("Storage root ready: {}", settings.storage_root.display());
    }
    let storage: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(
        settings.storage_root.clone(),
        settings.storage_bucket.clone(),
    ));

    // Loaded once and shared read-only by every run
    let config = Arc::new(RetroGameConfig::load(&settings.config_path, &settings.prompts_path));

    let api_key = match &settings.gemini_api_key {
        Some(key) => {
            tracing::info!("✅ Gemini API key loaded");
            key.clone()
        }
        None => {
            tracing::warn!("GEMINI_API_KEY not set. Generation requests will fail.");
            String::new()
        }
    };
    let gemini = Arc::new(GeminiClient::new(
        api_key.clone(),
        settings.image_model.clone(),
        settings.text_model.clone(),
        storage.clone(),
    ));
    let veo = Arc::new(VeoClient::new(api_key, storage.clone()));
    let video_processor = Arc::new(FfmpegVideoProcessor::new(storage.clone()));

    let (media, db_pool) = media_library(&settings).await;

    let services = GenerationServices {
        images: gemini.clone(),
        text: gemini,
        video: veo,
        video_processor,
        storage,
        media,
    };
    let orchestrator = Arc::new(RetroGameOrchestrator::new(config.clone(), services));
    let runs = Arc::new(RunManager::new(orchestrator));
    tracing::info!("🎬 Run manager initialized");

    let shared_state = Arc::new(AppState {
        config,
        runs: runs.clone(),
        db_pool,
        settings: settings.clone(),
    });

    let app = Router::new()
        .merge(handlers::retro_games::retro_game_routes())
        .merge(handlers::status::status_routes())
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            runs.cleanup_old_runs(RUN_RETENTION_HOURS).await;
        }
    });

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

/// Postgres when `DATABASE_URL` is set and reachable, otherwise an in-memory library.
async fn media_library(settings: &Settings) -> (Arc<dyn MediaRepository>, Option<PgPool>) {
    let Some(url) = &settings.database_url else {
        tracing::warn!("DATABASE_URL not set. Media items are kept in memory only.");
        let media: Arc<dyn MediaRepository> = Arc::new(InMemoryMediaRepository::new());
        return (media, None);
    };

    match db::create_pool(url).await {
        Ok(pool) => {
            let repository = PostgresMediaRepository::new(pool.clone());
            match repository.setup().await {
                Ok(_) => tracing::info!("✅ Media library enabled (PostgreSQL)"),
                Err(e) => tracing::error!("❌ Failed to setup media library table: {}", e),
            }
            let media: Arc<dyn MediaRepository> = Arc::new(repository);
            (media, Some(pool))
        }
        Err(e) => {
            tracing::error!("❌ Database connection failed, keeping media items in memory: {}", e);
            let media: Arc<dyn MediaRepository> = Arc::new(InMemoryMediaRepository::new());
            (media, None)
        }
    }
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,retro_studio=trace,sqlx=info,reqwest=info,hyper=info,tower_http=info".to_string()
        } else {
            "info,retro_studio=info,sqlx=warn,reqwest=warn,hyper=warn,tower_http=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for log aggregation
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()?;

    tracing::info!("🕹️ Retro Studio starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);
    Ok(())
}
