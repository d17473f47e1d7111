pub mod catalog;
pub mod chat;
pub mod reports;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::{header, request::Parts, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::services::{
    analytics::AnalyticsService,
    catalog::CatalogService,
    charts::ChartService,
    chat::ChatService,
    comparison::ComparisonService,
    dispatcher::StatisticalDispatcher,
    fallback::FallbackResponder,
    llm::{GenerationParams, LanguageModel, LlmGateway},
    stock_report::StockReportService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer used by the HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: CatalogService,
    pub analytics: AnalyticsService,
    pub charts: ChartService,
    pub chat: ChatService,
    pub comparison: ComparisonService,
    pub stock_report: StockReportService,
}

impl AppServices {
    /// Wires every service over one pool. `model` is `None` when no API key is
    /// configured; the assistant then answers with the rule-based responder.
    pub fn new(
        db: Arc<DbPool>,
        config: &AppConfig,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        let assistant = &config.assistant;
        let params = GenerationParams::from(&config.llm);

        let catalog = CatalogService::new(db.clone());
        let analytics = AnalyticsService::new(db.clone(), assistant.low_stock_threshold);
        let charts = ChartService::new(analytics.clone(), assistant.chart_window_days);
        let dispatcher = StatisticalDispatcher::new(
            analytics.clone(),
            charts.clone(),
            assistant.top_products_limit,
        );
        let fallback =
            FallbackResponder::new(catalog.clone(), analytics.clone(), assistant.budget_threshold);
        let gateway = LlmGateway::new(model.clone(), catalog.clone(), fallback, params.clone());
        let chat = ChatService::new(
            db,
            dispatcher,
            gateway,
            assistant.history_limit,
            assistant.history_page_size,
        );

        Self {
            comparison: ComparisonService::new(catalog.clone(), model, params),
            stock_report: StockReportService::new(catalog.clone()),
            catalog,
            analytics,
            charts,
            chat,
        }
    }
}

/// JSON body extractor that reports parse failures as `BadRequest` and then
/// runs `validator` rules.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ServiceError::BadRequest(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Query-string counterpart of [`ValidatedJson`]. Undecodable parameters are a
/// `ValidationError` so they share the JSON error body.
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| {
                ServiceError::ValidationError(rejection.body_text())
            })?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Binary download with `Content-Disposition: attachment`.
pub fn attachment(content_type: &'static str, filename: &str, bytes: Vec<u8>) -> Response {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}
