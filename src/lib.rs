//! Storefront assistant library
//!
//! Chat assistant, sales analytics and stock reporting for an e-commerce
//! storefront.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Builds the service container over `db`. Pass `None` as `model` to run
    /// the assistant without a hosted language model.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        model: Option<Arc<dyn services::llm::LanguageModel>>,
    ) -> Self {
        let services = handlers::AppServices::new(db.clone(), &config, model);
        Self {
            db,
            config: Arc::new(config),
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: &'static str,
    pub language_model: &'static str,
    pub version: &'static str,
}

/// Assistant and report routes, without middleware.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(handlers::chat::send_message))
        .route("/chat/history", get(handlers::chat::history))
        .route("/chat/action", post(handlers::chat::chat_action))
        .route(
            "/products-by-category",
            post(handlers::catalog::products_by_category),
        )
        .route("/stock-list", get(handlers::catalog::stock_list))
        .route("/stock-report.pdf", get(handlers::reports::stock_report_pdf))
        .route("/compare-products", post(handlers::reports::compare_products))
        .route("/sales-analysis", post(handlers::reports::sales_analysis))
        .route("/generate-chart", post(handlers::reports::generate_chart))
        .route("/business-metrics", get(handlers::reports::business_metrics))
        .route("/sales-data", get(handlers::reports::sales_data))
}

/// Full application router: API routes, health and the OpenAPI document.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .merge(api_routes())
        .route("/health", get(health_check))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let database = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(e) => {
            ::tracing::warn!(error = %e, "health check could not reach the database");
            "unhealthy"
        }
    };
    let language_model = if state.config.llm.api_key().is_some() {
        "configured"
    } else {
        "fallback_only"
    };

    Json(ApiResponse::success(HealthStatus {
        status: if database == "healthy" {
            "healthy"
        } else {
            "degraded"
        },
        database,
        language_model,
        version: env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("oops"));
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
    }

    #[test]
    fn responses_outside_a_request_have_no_request_id() {
        let response = ApiResponse::success(1);
        assert!(response.meta.unwrap().request_id.is_none());
    }
}
