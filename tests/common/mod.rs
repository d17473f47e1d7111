#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, Response},
    middleware, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_assistant::{
    config::{AppConfig, LlmConfig},
    db,
    entities::{category, order, order::OrderStatus, order_item, product, user},
    middleware_helpers::forwarded_user_middleware,
    services::llm::{GeminiClient, LanguageModel},
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

/// Application router over a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    /// No language model: every free-form answer comes from the rule-based responder.
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Language model pointed at `base_url` (usually a wiremock server).
    pub async fn with_llm_base_url(base_url: &str) -> Self {
        Self::build(Some(LlmConfig {
            api_key: Some("test-key".to_string()),
            model: "gemini-test".to_string(),
            base_url: base_url.to_string(),
            timeout_secs: 5,
            ..LlmConfig::default()
        }))
        .await
    }

    async fn build(llm: Option<LlmConfig>) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cors_allow_any_origin = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.trust_forwarded_user = true;
        if let Some(llm) = llm {
            cfg.llm = llm;
        }

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let model: Option<Arc<dyn LanguageModel>> = GeminiClient::from_config(&cfg.llm)
            .expect("language model client")
            .map(|client| Arc::new(client) as Arc<dyn LanguageModel>);

        let state = AppState::new(Arc::new(pool), cfg, model);
        let router = storefront_assistant::app_router(state.clone())
            .layer(middleware::from_fn(forwarded_user_middleware));

        Self { router, state }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router call")
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        self.request(Method::POST, uri, Some(body), &[]).await
    }

    pub async fn post_raw(&self, uri: &str, raw: &'static str) -> Response<Body> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(raw))
            .expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router call")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.request(Method::GET, uri, None, &[]).await
    }

    pub async fn seed_category(&self, name: &str) -> category::Model {
        category::ActiveModel {
            name: Set(name.to_string()),
            description: Set(None),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("insert category")
    }

    pub async fn seed_product(
        &self,
        category_id: i32,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> product::Model {
        product::ActiveModel {
            name: Set(name.to_string()),
            description: Set(Some(format!("{name} de prueba"))),
            price: Set(price),
            stock: Set(stock),
            is_available: Set(true),
            image_url: Set(None),
            category_id: Set(category_id),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("insert product")
    }

    pub async fn seed_user(&self, email: &str) -> user::Model {
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            name: Set("Cliente".to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("insert user")
    }

    pub async fn seed_order(
        &self,
        status: OrderStatus,
        total: Decimal,
        created_at: DateTime<Utc>,
    ) -> order::Model {
        let id = Uuid::new_v4();
        order::ActiveModel {
            id: Set(id),
            order_number: Set(format!("ORD-{}", &id.simple().to_string()[..8])),
            user_id: Set(None),
            status: Set(status.to_string()),
            order_total: Set(total),
            created_at: Set(created_at),
        }
        .insert(&*self.state.db)
        .await
        .expect("insert order")
    }

    pub async fn seed_item(
        &self,
        order_id: Uuid,
        product_id: i32,
        quantity: i32,
        unit_price: Decimal,
    ) -> order_item::Model {
        order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            unit_price: Set(unit_price),
            ordered: Set(true),
        }
        .insert(&*self.state.db)
        .await
        .expect("insert order item")
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body")
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("parse response body")
}

/// `name=value` of the first `Set-Cookie` header.
pub fn cookie_pair(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}
