// src/bin/api_server.rs

use odoo_mercury_bridge::infra::logging::init_logger;
use odoo_mercury_bridge::transport;
use odoo_mercury_bridge::{
    AppConfig, MercuryClient, OdooClient, SlackNotifier, SyncScheduler, SyncService,
    SyncSettings, SyncStore,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_logger(config.json_logs);

    tracing::info!(path = %config.mercury.sync_db, "opening sync state database");
    let store = SyncStore::connect(&config.mercury.sync_db).await?;

    let odoo = Arc::new(OdooClient::new(config.odoo.clone())?);
    tracing::info!(url = %config.odoo.url, db = %config.odoo.db, "Odoo client configured");

    let notifier = Arc::new(SlackNotifier::new(config.slack_webhook_url.clone()));
    if !notifier.is_enabled() {
        tracing::info!("SLACK_WEBHOOK_URL not set; Slack notifications disabled");
    }

    let mut app_state = transport::http::AppState::new(odoo.clone(), store.clone(), notifier.clone());

    // --- Mercury sync (optional) ---
    let scheduler = match config.mercury.api_token.as_deref() {
        Some(token) => {
            let bank = Arc::new(MercuryClient::new(&config.mercury.api_base, token)?);
            let sync = Arc::new(
                SyncService::new(
                    bank,
                    store.clone(),
                    notifier.clone(),
                    SyncSettings {
                        auto_reconcile: config.mercury.auto_reconcile,
                        min_confidence: config.mercury.min_confidence,
                    },
                )
                .with_odoo(odoo.clone()),
            );
            let scheduler = Arc::new(SyncScheduler::new(
                sync.clone(),
                config.mercury.sync_interval_minutes,
            ));
            scheduler.clone().start();
            app_state = app_state.with_mercury(sync, scheduler.clone());
            Some(scheduler)
        }
        None => {
            tracing::warn!("MERCURY_API_TOKEN not set; Mercury endpoints and scheduled sync disabled");
            None
        }
    };

    // --- API Server Initialization ---
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = transport::http::create_router(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", transport::http::ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "API server listening (Swagger UI at /swagger-ui)");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            if let Some(scheduler) = scheduler {
                scheduler.stop();
            }
            tracing::info!("graceful shutdown complete");
        }
    }

    Ok(())
}
