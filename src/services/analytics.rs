use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, RelationTrait,
};
use sea_orm::sea_query::JoinType;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        category::Entity as CategoryEntity,
        order::{self, Column as OrderColumn, Entity as OrderEntity, OrderStatus},
        order_item::{self, Column as OrderItemColumn, Entity as OrderItemEntity},
        product::{Column as ProductColumn, Entity as ProductEntity},
        user::Entity as UserEntity,
    },
    errors::ServiceError,
};

/// Revenue and order count of one calendar day (UTC)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub revenue: Decimal,
    pub orders: u64,
}

/// Units and revenue sold of one product
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductSales {
    pub product_id: i32,
    pub name: String,
    pub category: Option<String>,
    pub quantity: i64,
    pub revenue: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SalesAnalysis {
    pub days: u32,
    pub total_orders: u64,
    pub total_revenue: Decimal,
    pub average_order_value: Decimal,
    /// Ascending by date; empty when no completed order fell in the window
    pub daily: Vec<DailySales>,
    /// At most five entries, quantity descending
    pub top_products: Vec<ProductSales>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusinessMetrics {
    pub total_orders: u64,
    pub completed_orders: u64,
    pub cancelled_orders: u64,
    /// Percentage 0..=100
    pub completion_rate: f64,
    pub total_revenue: Decimal,
    pub average_revenue: Decimal,
    pub total_products: u64,
    pub available_products: u64,
    pub low_stock_products: u64,
    pub total_users: u64,
    pub users_with_orders: u64,
    /// Percentage 0..=100
    pub conversion_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub name: String,
    pub product_count: u64,
}

/// Daily series for client-side charting
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SalesSeries {
    /// `%Y-%m-%d` labels
    pub labels: Vec<String>,
    pub sales: Vec<f64>,
    pub orders: Vec<u64>,
}

impl From<&[DailySales]> for SalesSeries {
    fn from(daily: &[DailySales]) -> Self {
        use rust_decimal::prelude::ToPrimitive;

        Self {
            labels: daily
                .iter()
                .map(|d| d.date.format("%Y-%m-%d").to_string())
                .collect(),
            sales: daily
                .iter()
                .map(|d| d.revenue.to_f64().unwrap_or(0.0))
                .collect(),
            orders: daily.iter().map(|d| d.orders).collect(),
        }
    }
}

/// Percentage of `part` in `whole`; zero when `whole` is zero.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn average(total: Decimal, count: u64) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        total / Decimal::from(count)
    }
}

/// Groups orders by UTC calendar date, ascending.
pub fn fold_daily(orders: &[order::Model]) -> Vec<DailySales> {
    let mut by_day: BTreeMap<NaiveDate, (Decimal, u64)> = BTreeMap::new();
    for o in orders {
        let entry = by_day
            .entry(o.created_at.date_naive())
            .or_insert((Decimal::ZERO, 0));
        entry.0 += o.order_total;
        entry.1 += 1;
    }

    by_day
        .into_iter()
        .map(|(date, (revenue, orders))| DailySales {
            date,
            revenue,
            orders,
        })
        .collect()
}

/// Sums quantity and line revenue per product, quantity descending.
fn fold_product_quantities(items: &[order_item::Model]) -> Vec<(i32, i64, Decimal)> {
    let mut per_product: HashMap<i32, (i64, Decimal)> = HashMap::new();
    for item in items {
        let entry = per_product
            .entry(item.product_id)
            .or_insert((0, Decimal::ZERO));
        entry.0 += i64::from(item.quantity);
        entry.1 += item.line_total();
    }

    let mut totals: Vec<(i32, i64, Decimal)> = per_product
        .into_iter()
        .map(|(id, (qty, revenue))| (id, qty, revenue))
        .collect();
    totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    totals
}

/// Aggregations over completed orders, products and users
#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<DatabaseConnection>,
    low_stock_threshold: i32,
}

impl AnalyticsService {
    pub fn new(db: Arc<DatabaseConnection>, low_stock_threshold: i32) -> Self {
        Self {
            db,
            low_stock_threshold,
        }
    }

    fn window(days: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
        if days == 0 {
            return Err(ServiceError::ValidationError(
                "days must be a positive integer".to_string(),
            ));
        }
        let end = Utc::now();
        let start = end
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("days={days} is out of the supported range"))
            })?;
        Ok((start, end))
    }

    async fn completed_orders_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<order::Model>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(OrderColumn::Status.eq(OrderStatus::Completed.as_ref()))
            .filter(OrderColumn::CreatedAt.between(start, end))
            .order_by_asc(OrderColumn::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Completed orders of the last `days` days, grouped by date
    pub async fn daily_sales(&self, days: u32) -> Result<Vec<DailySales>, ServiceError> {
        let (start, end) = Self::window(days)?;
        let orders = self.completed_orders_between(start, end).await?;
        Ok(fold_daily(&orders))
    }

    /// Sales report over `[now - days, now]`
    #[instrument(skip(self))]
    pub async fn sales_analysis(&self, days: u32) -> Result<SalesAnalysis, ServiceError> {
        let (start, end) = Self::window(days)?;
        let orders = self.completed_orders_between(start, end).await?;

        let total_orders = orders.len() as u64;
        let total_revenue: Decimal = orders.iter().map(|o| o.order_total).sum();
        let daily = fold_daily(&orders);

        let top_products = if orders.is_empty() {
            Vec::new()
        } else {
            let items = OrderItemEntity::find()
                .join(JoinType::InnerJoin, order_item::Relation::Order.def())
                .filter(OrderColumn::Status.eq(OrderStatus::Completed.as_ref()))
                .filter(OrderColumn::CreatedAt.between(start, end))
                .filter(OrderItemColumn::Ordered.eq(true))
                .all(&*self.db)
                .await?;
            self.name_products(fold_product_quantities(&items), 5).await?
        };

        info!(days, total_orders, "sales analysis computed");

        Ok(SalesAnalysis {
            days,
            total_orders,
            total_revenue,
            average_order_value: average(total_revenue, total_orders),
            daily,
            top_products,
        })
    }

    /// Best sellers over every completed order
    #[instrument(skip(self))]
    pub async fn top_products(&self, limit: u64) -> Result<Vec<ProductSales>, ServiceError> {
        if limit == 0 {
            return Err(ServiceError::ValidationError(
                "limit must be at least 1".to_string(),
            ));
        }

        let items = OrderItemEntity::find()
            .join(JoinType::InnerJoin, order_item::Relation::Order.def())
            .filter(OrderColumn::Status.eq(OrderStatus::Completed.as_ref()))
            .filter(OrderItemColumn::Ordered.eq(true))
            .all(&*self.db)
            .await?;

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        self.name_products(fold_product_quantities(&items), limit)
            .await
    }

    /// Attaches product and category names to the first `limit` totals.
    async fn name_products(
        &self,
        totals: Vec<(i32, i64, Decimal)>,
        limit: usize,
    ) -> Result<Vec<ProductSales>, ServiceError> {
        let totals: Vec<_> = totals.into_iter().take(limit).collect();
        if totals.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = totals.iter().map(|(id, _, _)| *id).collect();
        let names: HashMap<i32, (String, Option<String>)> = ProductEntity::find()
            .find_also_related(CategoryEntity)
            .filter(ProductColumn::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|(p, c)| (p.id, (p.name, c.map(|c| c.name))))
            .collect();

        Ok(totals
            .into_iter()
            .map(|(product_id, quantity, revenue)| {
                let (name, category) = names
                    .get(&product_id)
                    .cloned()
                    .unwrap_or_else(|| (format!("Producto #{product_id}"), None));
                ProductSales {
                    product_id,
                    name,
                    category,
                    quantity,
                    revenue,
                }
            })
            .collect())
    }

    /// All-time business KPIs
    #[instrument(skip(self))]
    pub async fn business_metrics(&self) -> Result<BusinessMetrics, ServiceError> {
        let db = &*self.db;

        let total_orders = OrderEntity::find().count(db).await?;
        let completed: Vec<order::Model> = OrderEntity::find()
            .filter(OrderColumn::Status.eq(OrderStatus::Completed.as_ref()))
            .all(db)
            .await?;
        let cancelled_orders = OrderEntity::find()
            .filter(OrderColumn::Status.eq(OrderStatus::Cancelled.as_ref()))
            .count(db)
            .await?;

        let completed_orders = completed.len() as u64;
        let total_revenue: Decimal = completed.iter().map(|o| o.order_total).sum();

        let total_products = ProductEntity::find().count(db).await?;
        let available_products = ProductEntity::find()
            .filter(ProductColumn::IsAvailable.eq(true))
            .count(db)
            .await?;
        let low_stock_products = ProductEntity::find()
            .filter(ProductColumn::IsAvailable.eq(true))
            .filter(ProductColumn::Stock.lte(self.low_stock_threshold))
            .count(db)
            .await?;

        let total_users = UserEntity::find().count(db).await?;
        let buyers: HashSet<Uuid> = OrderEntity::find()
            .select_only()
            .column(OrderColumn::UserId)
            .filter(OrderColumn::UserId.is_not_null())
            .into_tuple::<Option<Uuid>>()
            .all(db)
            .await?
            .into_iter()
            .flatten()
            .collect();
        let users_with_orders = buyers.len() as u64;

        Ok(BusinessMetrics {
            total_orders,
            completed_orders,
            cancelled_orders,
            completion_rate: percentage(completed_orders, total_orders),
            total_revenue,
            average_revenue: average(total_revenue, completed_orders),
            total_products,
            available_products,
            low_stock_products,
            total_users,
            users_with_orders,
            conversion_rate: percentage(users_with_orders, total_users),
        })
    }

    /// Product count per category, ordered by category name
    pub async fn category_shares(&self) -> Result<Vec<CategoryShare>, ServiceError> {
        let rows = CategoryEntity::find()
            .find_with_related(ProductEntity)
            .order_by_asc(crate::entities::category::Column::Name)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(category, products)| CategoryShare {
                name: category.name,
                product_count: products.len() as u64,
            })
            .collect())
    }
}
