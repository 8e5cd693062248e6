use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use square_service::config::Config;
use square_service::db::PgCandidateStore;
use square_service::handlers::{get_stream, health, SquareHandlerState};
use square_service::metrics;
use square_service::registry::default_registry;
use square_service::services::{CandidateStore, ItemSerializer, RegistryPayloadSerializer, SquareService};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting square-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    // Duplicate kinds are a configuration error and must fail the boot, not
    // a request.
    let registry = match default_registry() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            tracing::error!("Content source registration failed: {}", e);
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        kinds = registry.list().len(),
        "content source registry initialized"
    );

    let pool = match PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Database connection failed: {}", e);
            eprintln!("ERROR: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn CandidateStore> = Arc::new(PgCandidateStore::new(
        pool,
        registry.clone(),
        config.square.candidate_window,
    ));
    let serializer: Arc<dyn ItemSerializer> =
        Arc::new(RegistryPayloadSerializer::new(registry.clone()));
    let service = Arc::new(SquareService::new(registry, store, serializer));
    let state = web::Data::new(SquareHandlerState { service });

    let bind_addr = (config.app.host.clone(), config.app.port);
    tracing::info!("Listening on {}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(web::scope("/api/v1/square").service(get_stream))
            .service(health)
            .route("/metrics", web::get().to(metrics::export))
    })
    .bind(bind_addr)?
    .run()
    .await
}
