//! Seed helpers shared by the service tests.

use crate::entities::{category, order, order_item, order::OrderStatus, product, user};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use uuid::Uuid;

/// Fresh in-memory SQLite database with the schema applied.
pub async fn memory_db() -> Arc<DatabaseConnection> {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("sqlite memory db");
    crate::migrator::Migrator::up(&db, None)
        .await
        .expect("migrations");
    Arc::new(db)
}

pub async fn seed_category(db: &DatabaseConnection, name: &str) -> category::Model {
    category::ActiveModel {
        name: Set(name.to_string()),
        description: Set(Some(format!("Productos de {name}"))),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert category")
}

pub async fn seed_product(
    db: &DatabaseConnection,
    category_id: i32,
    name: &str,
    price: Decimal,
    stock: i32,
    is_available: bool,
) -> product::Model {
    product::ActiveModel {
        name: Set(name.to_string()),
        description: Set(Some(format!("Descripción de {name}"))),
        price: Set(price),
        stock: Set(stock),
        is_available: Set(is_available),
        image_url: Set(None),
        category_id: Set(category_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert product")
}

pub async fn seed_user(db: &DatabaseConnection, email: &str) -> user::Model {
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        name: Set(email.split('@').next().unwrap_or(email).to_string()),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("insert user")
}

pub async fn seed_order(
    db: &DatabaseConnection,
    status: OrderStatus,
    total: Decimal,
    created_at: DateTime<Utc>,
    user_id: Option<Uuid>,
) -> order::Model {
    let id = Uuid::new_v4();
    order::ActiveModel {
        id: Set(id),
        order_number: Set(format!("ORD-{}", &id.simple().to_string()[..8])),
        user_id: Set(user_id),
        status: Set(status.to_string()),
        order_total: Set(total),
        created_at: Set(created_at),
    }
    .insert(db)
    .await
    .expect("insert order")
}

pub async fn seed_item(
    db: &DatabaseConnection,
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
    .insert(db)
    .await
    .expect("insert order item")
}
