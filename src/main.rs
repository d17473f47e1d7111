use std::{net::SocketAddr, sync::Arc};

use http::HeaderValue;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing::{error, info, warn};

use storefront_assistant as app;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = app::config::load_config()?;
    app::config::init_tracing(cfg.log_level(), cfg.log_json);
    app::config::log_startup(&cfg);

    // Init DB
    let db_pool = app::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        app::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    // Language model client; absent key means rule-based answers only
    let model: Option<Arc<dyn app::services::llm::LanguageModel>> =
        match app::services::llm::GeminiClient::from_config(&cfg.llm)? {
            Some(client) => {
                info!(model = %cfg.llm.model, "language model client configured");
                Some(Arc::new(client))
            }
            None => None,
        };

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        error!("Missing CORS configuration detected; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        return Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true".into());
    };

    let trust_forwarded_user = cfg.trust_forwarded_user;
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    let state = app::AppState::new(db.clone(), cfg, model);

    let mut router = app::app_router(state)
        // HTTP tracing layer for consistent request/response telemetry
        .layer(app::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors_layer);

    if trust_forwarded_user {
        info!("Trusting x-user-id from the upstream proxy");
        router = router.layer(axum::middleware::from_fn(
            app::middleware_helpers::forwarded_user_middleware,
        ));
    }

    // Bind and serve
    info!("🚀 storefront-assistant listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Ok(db) = Arc::try_unwrap(db) {
        if let Err(e) = app::db::close_pool(db).await {
            warn!("Failed to close database pool cleanly: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
