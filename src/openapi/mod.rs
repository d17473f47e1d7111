use axum::response::Json;
use utoipa::OpenApi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Assistant API",
        version = "0.1.0",
        description = r#"
# Storefront Assistant API

Chat assistant and reporting endpoints for an online store.

## Features

- **Chat**: answers shopper questions with a hosted language model, with a rule-based fallback
- **Statistics in chat**: sales, best sellers, business metrics and charts on request
- **Reports**: stock PDF, product comparison, sales analysis, chart PNGs, daily sales series

## Sessions

Anonymous callers are identified by the `chat_session` cookie or the
`x-session-key` header. A new key is issued on first contact.

## Error Handling

```json
{
  "error": "Bad Request",
  "message": "Bad request: Failed to parse the request body as JSON",
  "request_id": "5f0c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "chat", description = "Conversational assistant"),
        (name = "catalog", description = "Product and stock lookups"),
        (name = "reports", description = "Analytics, charts and documents")
    ),
    paths(
        // Chat
        handlers::chat::send_message,
        handlers::chat::history,
        handlers::chat::chat_action,
        // Catalog
        handlers::catalog::products_by_category,
        handlers::catalog::stock_list,
        // Reports
        handlers::reports::stock_report_pdf,
        handlers::reports::compare_products,
        handlers::reports::sales_analysis,
        handlers::reports::generate_chart,
        handlers::reports::business_metrics,
        handlers::reports::sales_data,
    ),
    components(
        schemas(
            // Chat types
            handlers::chat::ChatRequest,
            handlers::chat::ChatReply,
            handlers::chat::ChatChart,
            handlers::chat::ChatHistoryEntry,
            handlers::chat::ChatActionRequest,
            handlers::chat::ComparisonReply,
            crate::services::charts::ChartKind,
            // Catalog types
            handlers::catalog::CategoryProductsRequest,
            crate::services::catalog::ProductSummary,
            crate::services::catalog::StockListEntry,
            // Report types
            handlers::reports::CompareProductsRequest,
            handlers::reports::SalesAnalysisRequest,
            handlers::reports::SalesAnalysisReply,
            handlers::reports::GenerateChartRequest,
            handlers::reports::BusinessMetricsReply,
            handlers::reports::SalesDataReply,
            // Error types
            crate::errors::ErrorResponse,
        )
    )
)]
pub struct ApiDoc;

/// Serves the generated document at `/api-docs/openapi.json`.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
