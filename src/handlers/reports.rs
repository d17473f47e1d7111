use std::str::FromStr;

use axum::{
    extract::State,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{attachment, chat::ComparisonReply, ValidatedJson, ValidatedQuery};
use crate::{
    errors::ServiceError,
    services::{
        analytics::SalesSeries,
        charts::{chart_filename, ChartKind},
        reports::{format_business_metrics, format_sales_analysis, format_top_products},
    },
    ApiResponse, ApiResult, AppState,
};

const DEFAULT_DAYS: u32 = 30;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CompareProductsRequest {
    #[validate(length(min = 2, message = "Se necesitan al menos 2 productos para comparar"))]
    pub product_ids: Vec<i32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SalesAnalysisRequest {
    /// Window length in days, at least 1; defaults to 30
    #[validate(range(min = 1))]
    #[schema(minimum = 1)]
    pub days: Option<u32>,
    /// `general`, `top_products` or `metrics`; anything else means `general`
    #[serde(rename = "type")]
    pub analysis_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SalesAnalysisReply {
    pub analysis: String,
    #[serde(rename = "type")]
    pub analysis_type: String,
    pub days: u32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GenerateChartRequest {
    /// `sales_bar`, `sales_line` or `category_pie`; defaults to `sales_bar`
    pub chart_type: Option<String>,
    /// Only names the downloaded file; the chart covers the configured window
    #[validate(range(min = 1))]
    #[schema(minimum = 1)]
    pub days: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BusinessMetricsReply {
    pub metrics: String,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SalesDataQuery {
    /// Window length in days, at least 1; defaults to 30
    #[validate(range(min = 1))]
    #[param(minimum = 1)]
    pub days: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SalesDataReply {
    pub labels: Vec<String>,
    pub sales: Vec<f64>,
    pub orders: Vec<u64>,
    pub days: u32,
}

#[utoipa::path(
    get,
    path = "/stock-report.pdf",
    summary = "Stock report PDF",
    description = "Products grouped by category with stock and price. A simpler layout is tried once when the grouped report fails.",
    responses(
        (status = 200, description = "PDF attachment (`application/pdf`)"),
        (status = 500, description = "Both layouts failed", body = crate::errors::ErrorResponse),
    ),
    tag = "reports"
)]
pub async fn stock_report_pdf(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let pdf = state.services.stock_report.generate().await?;
    Ok(attachment("application/pdf", "stock_report.pdf", pdf))
}

#[utoipa::path(
    post,
    path = "/compare-products",
    summary = "Compare products",
    request_body = CompareProductsRequest,
    responses(
        (status = 200, description = "Comparison text", body = ApiResponse<ComparisonReply>),
        (status = 400, description = "Fewer than two known products", body = crate::errors::ErrorResponse),
    ),
    tag = "reports"
)]
pub async fn compare_products(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CompareProductsRequest>,
) -> ApiResult<ComparisonReply> {
    let comparison = state
        .services
        .comparison
        .compare(&payload.product_ids)
        .await?;
    Ok(Json(ApiResponse::success(ComparisonReply { comparison })))
}

#[utoipa::path(
    post,
    path = "/sales-analysis",
    summary = "Sales analysis report",
    request_body = SalesAnalysisRequest,
    responses(
        (status = 200, description = "Formatted report", body = ApiResponse<SalesAnalysisReply>),
        (status = 400, description = "Invalid window", body = crate::errors::ErrorResponse),
    ),
    tag = "reports"
)]
pub async fn sales_analysis(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SalesAnalysisRequest>,
) -> ApiResult<SalesAnalysisReply> {
    let days = payload.days.unwrap_or(DEFAULT_DAYS);
    let analytics = &state.services.analytics;

    let (analysis_type, analysis) = match payload.analysis_type.as_deref() {
        Some("top_products") => {
            let top = analytics
                .top_products(state.config.assistant.top_products_limit)
                .await?;
            ("top_products", format_top_products(&top))
        }
        Some("metrics") => (
            "metrics",
            format_business_metrics(&analytics.business_metrics().await?),
        ),
        _ => (
            "general",
            format_sales_analysis(&analytics.sales_analysis(days).await?),
        ),
    };

    Ok(Json(ApiResponse::success(SalesAnalysisReply {
        analysis,
        analysis_type: analysis_type.to_string(),
        days,
    })))
}

#[utoipa::path(
    post,
    path = "/generate-chart",
    summary = "Render a chart",
    description = "Returns a PNG attachment. When there is no data to draw the response is a JSON body with `success: false`.",
    request_body = GenerateChartRequest,
    responses(
        (status = 200, description = "PNG attachment (`image/png`), or a no-data notice"),
        (status = 400, description = "Unknown chart type", body = crate::errors::ErrorResponse),
    ),
    tag = "reports"
)]
pub async fn generate_chart(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<GenerateChartRequest>,
) -> Result<Response, ServiceError> {
    let kind = match payload.chart_type.as_deref() {
        None => ChartKind::SalesBar,
        Some(raw) => ChartKind::from_str(raw.trim())
            .map_err(|_| ServiceError::BadRequest(format!("Tipo de gráfico no válido: {raw}")))?,
    };
    let days = payload.days.unwrap_or(DEFAULT_DAYS);

    match state.services.charts.generate(kind).await? {
        Some(chart) => Ok(attachment(
            "image/png",
            &chart_filename(kind, days),
            chart.png,
        )),
        None => Ok(Json(ApiResponse::<()>::error(
            "No hay datos suficientes para generar el gráfico".to_string(),
        ))
        .into_response()),
    }
}

#[utoipa::path(
    get,
    path = "/business-metrics",
    summary = "Business metrics report",
    responses(
        (status = 200, description = "Formatted report", body = ApiResponse<BusinessMetricsReply>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "reports"
)]
pub async fn business_metrics(State(state): State<AppState>) -> ApiResult<BusinessMetricsReply> {
    let metrics = state.services.analytics.business_metrics().await?;
    Ok(Json(ApiResponse::success(BusinessMetricsReply {
        metrics: format_business_metrics(&metrics),
    })))
}

#[utoipa::path(
    get,
    path = "/sales-data",
    summary = "Daily sales series",
    params(SalesDataQuery),
    responses(
        (status = 200, description = "Labels, revenue and order counts per day", body = ApiResponse<SalesDataReply>),
        (status = 400, description = "Malformed or non-positive `days`", body = crate::errors::ErrorResponse),
    ),
    tag = "reports"
)]
pub async fn sales_data(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<SalesDataQuery>,
) -> ApiResult<SalesDataReply> {
    let days = query.days.unwrap_or(DEFAULT_DAYS);

    let daily = state.services.analytics.daily_sales(days).await?;
    let SalesSeries {
        labels,
        sales,
        orders,
    } = SalesSeries::from(daily.as_slice());

    Ok(Json(ApiResponse::success(SalesDataReply {
        labels,
        sales,
        orders,
        days,
    })))
}
