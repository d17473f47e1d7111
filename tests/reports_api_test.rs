mod common;

use axum::http::{header, StatusCode};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use storefront_assistant::entities::order::OrderStatus;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{body_bytes, body_json, TestApp};

#[tokio::test]
async fn comparison_survives_language_model_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let app = TestApp::with_llm_base_url(&server.uri()).await;
    let cat = app.seed_category("Audio").await;
    let a = app.seed_product(cat.id, "Auriculares", Decimal::from(45000), 9).await;
    let b = app.seed_product(cat.id, "Parlante", Decimal::from(80000), 3).await;

    let response = app
        .post_json("/compare-products", json!({ "product_ids": [a.id, b.id] }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    let text = body["data"]["comparison"].as_str().unwrap();
    assert!(text.starts_with("🔄 **Comparación de Productos**"));
    assert!(text.contains("• Más económico: Auriculares ($45,000.00)"));
}

#[tokio::test]
async fn comparison_uses_language_model_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "El parlante suena más fuerte." }] } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::with_llm_base_url(&server.uri()).await;
    let cat = app.seed_category("Audio").await;
    let a = app.seed_product(cat.id, "Auriculares", Decimal::from(45000), 9).await;
    let b = app.seed_product(cat.id, "Parlante", Decimal::from(80000), 3).await;

    let body = body_json(
        app.post_json("/compare-products", json!({ "product_ids": [a.id, b.id] }))
            .await,
    )
    .await;
    assert_eq!(body["data"]["comparison"], "El parlante suena más fuerte.");
}

#[tokio::test]
async fn comparison_needs_two_products() {
    let app = TestApp::new().await;

    let response = app
        .post_json("/compare-products", json!({ "product_ids": [1] }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Se necesitan al menos 2 productos para comparar"));
}

#[tokio::test]
async fn sales_analysis_for_a_quiet_window_is_all_zero() {
    let app = TestApp::new().await;
    app.seed_order(
        OrderStatus::Completed,
        Decimal::from(500),
        Utc::now() - Duration::days(40),
    )
    .await;

    let body = body_json(
        app.post_json("/sales-analysis", json!({ "days": 7, "type": "general" }))
            .await,
    )
    .await;

    assert_eq!(body["data"]["type"], "general");
    assert_eq!(body["data"]["days"], 7);
    let text = body["data"]["analysis"].as_str().unwrap();
    assert!(text.contains("• **Total de Pedidos:** 0"));
    assert!(text.contains("• **Ingresos Totales:** $0.00"));
    assert!(text.contains("• **Valor Promedio por Pedido:** $0.00"));
    assert!(!text.contains("Tendencia de Ventas"));
    assert!(!text.contains("Top"));
}

#[tokio::test]
async fn sales_analysis_defaults_to_thirty_days() {
    let app = TestApp::new().await;

    let body = body_json(app.post_json("/sales-analysis", json!({})).await).await;
    assert_eq!(body["data"]["days"], 30);
    assert_eq!(body["data"]["type"], "general");
}

#[tokio::test]
async fn sales_analysis_rejects_zero_days() {
    let app = TestApp::new().await;

    let response = app.post_json("/sales-analysis", json!({ "days": 0 })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn top_products_analysis_ranks_by_quantity() {
    let app = TestApp::new().await;
    let cat = app.seed_category("Oficina").await;
    let pen = app.seed_product(cat.id, "Lapicera", Decimal::from(500), 100).await;
    let desk = app.seed_product(cat.id, "Escritorio", Decimal::from(90000), 2).await;

    let order = app
        .seed_order(OrderStatus::Completed, Decimal::from(95000), Utc::now())
        .await;
    app.seed_item(order.id, pen.id, 10, Decimal::from(500)).await;
    app.seed_item(order.id, desk.id, 1, Decimal::from(90000)).await;

    let body = body_json(
        app.post_json("/sales-analysis", json!({ "type": "top_products" }))
            .await,
    )
    .await;
    let text = body["data"]["analysis"].as_str().unwrap();
    let pen_at = text.find("Lapicera").unwrap();
    let desk_at = text.find("Escritorio").unwrap();
    assert!(pen_at < desk_at);
    assert!(text.contains("📦 Vendidos: 10"));
}

#[tokio::test]
async fn business_metrics_on_empty_store_report_zero_rates() {
    let app = TestApp::new().await;

    let body = body_json(app.get("/business-metrics").await).await;
    let text = body["data"]["metrics"].as_str().unwrap();
    assert!(text.starts_with("📈 **Métricas del Negocio**"));
    assert!(text.contains("0.0%"));
}

#[tokio::test]
async fn sales_data_returns_daily_series() {
    let app = TestApp::new().await;
    let now = Utc::now();
    app.seed_order(OrderStatus::Completed, Decimal::from(100), now - Duration::days(2))
        .await;
    app.seed_order(OrderStatus::Completed, Decimal::from(50), now - Duration::days(2))
        .await;
    app.seed_order(OrderStatus::Pending, Decimal::from(70), now - Duration::days(1))
        .await;

    let body = body_json(app.get("/sales-data?days=7").await).await;
    let data = &body["data"];
    assert_eq!(data["days"], 7);
    assert_eq!(data["labels"].as_array().unwrap().len(), 1);
    assert_eq!(data["sales"][0], 150.0);
    assert_eq!(data["orders"][0], 2);
}

#[tokio::test]
async fn sales_data_with_undecodable_days_returns_error_body() {
    let app = TestApp::new().await;

    let response = app.get("/sales-data?days=abc").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let body = body_json(response).await;
    assert_eq!(body["error"], "Bad Request");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Validation error: Failed to deserialize query string"));
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn sales_data_accepts_windows_beyond_a_year() {
    let app = TestApp::new().await;

    let response = app.get("/sales-data?days=400").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["days"], 400);

    let response = app.get("/sales-data?days=0").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chart_without_data_is_not_an_error() {
    let app = TestApp::new().await;

    let response = app
        .post_json("/generate-chart", json!({ "chart_type": "sales_line" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn pie_chart_is_a_png_attachment() {
    let app = TestApp::new().await;
    let cat = app.seed_category("Jardín").await;
    app.seed_product(cat.id, "Maceta", Decimal::from(3000), 20).await;

    let response = app
        .post_json(
            "/generate-chart",
            json!({ "chart_type": "category_pie", "days": 14 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"chart_category_pie_14d.png\""
    );
    let png = body_bytes(response).await;
    assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
}

#[tokio::test]
async fn unknown_chart_type_is_a_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .post_json("/generate-chart", json!({ "chart_type": "radar" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stock_report_pdf_is_downloadable() {
    let app = TestApp::new().await;
    let cat = app.seed_category("Cocina").await;
    app.seed_product(cat.id, "Sartén", Decimal::from(18000), 6).await;

    let response = app.get("/stock-report.pdf").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"stock_report.pdf\""
    );
    assert!(body_bytes(response).await.starts_with(b"%PDF"));
}

#[tokio::test]
async fn products_by_category_name_lists_available_products() {
    let app = TestApp::new().await;
    let cat = app.seed_category("Electrónica").await;
    app.seed_product(cat.id, "Tablet", Decimal::from(250000), 5).await;

    let body = body_json(
        app.post_json("/products-by-category", json!({ "category_name": "electrónica" }))
            .await,
    )
    .await;
    let products = body["data"].as_array().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["name"], "Tablet");
    assert_eq!(products[0]["stock"], 5);
}

#[tokio::test]
async fn products_by_category_requires_a_selector() {
    let app = TestApp::new().await;

    let response = app.post_json("/products-by-category", json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stock_list_formats_display_line() {
    let app = TestApp::new().await;
    let cat = app.seed_category("Deportes").await;
    app.seed_product(cat.id, "Pelota", Decimal::from(12000), 15).await;

    let body = body_json(app.get("/stock-list").await).await;
    assert_eq!(
        body["data"][0]["display"],
        "Pelota - Stock: 15 - $12000.00"
    );
}

#[tokio::test]
async fn openapi_document_and_health_are_served() {
    let app = TestApp::new().await;

    let doc = body_json(app.get("/api-docs/openapi.json").await).await;
    assert!(doc["paths"]["/chat"].is_object());

    let health = body_json(app.get("/health").await).await;
    assert_eq!(health["data"]["database"], "healthy");
    assert_eq!(health["data"]["language_model"], "fallback_only");
}
