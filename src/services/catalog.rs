use std::sync::Arc;

use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::{
    entities::{
        category::{self, Entity as CategoryEntity},
        product::{self, Column as ProductColumn, Entity as ProductEntity},
    },
    errors::ServiceError,
};

/// How a caller names the category it wants to browse
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CategorySelector {
    Id(i32),
    /// Case-insensitive substring of the category name
    Name(String),
}

/// Available product as returned to catalogue browsers
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductSummary {
    pub id: i32,
    pub name: String,
    #[schema(value_type = String, example = "150000.00")]
    pub price: Decimal,
    pub stock: i32,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl From<product::Model> for ProductSummary {
    fn from(p: product::Model) -> Self {
        Self {
            id: p.id,
            name: p.name,
            price: p.price,
            stock: p.stock,
            description: p.description,
            image_url: p.image_url,
        }
    }
}

/// Row of the stock list used by autocomplete widgets
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StockListEntry {
    pub id: i32,
    pub name: String,
    pub stock: i32,
    #[schema(value_type = String)]
    pub price: Decimal,
    /// `"{name} - Stock: {stock} - ${price}"`
    pub display: String,
}

/// Product joined with its category name. `category` is `None` when the
/// referenced category row no longer exists.
#[derive(Clone, Debug, Serialize)]
pub struct ProductWithCategory {
    pub id: i32,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub is_available: bool,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl ProductWithCategory {
    fn from_pair((p, c): (product::Model, Option<category::Model>)) -> Self {
        Self {
            id: p.id,
            name: p.name,
            price: p.price,
            stock: p.stock,
            is_available: p.is_available,
            category: c.map(|c| c.name),
            description: p.description,
        }
    }
}

/// Two-decimal price as shown to shoppers, without thousands separators.
pub fn display_price(price: Decimal) -> String {
    format!("{:.2}", price.round_dp(2))
}

/// Read access to products and categories
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// All categories ordered by name
    pub async fn categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        Ok(CategoryEntity::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    /// Available products of the selected category
    #[instrument(skip(self))]
    pub async fn products_by_category(
        &self,
        selector: CategorySelector,
    ) -> Result<Vec<ProductSummary>, ServiceError> {
        let category_ids: Vec<i32> = match selector {
            CategorySelector::Id(id) => vec![id],
            CategorySelector::Name(name) => {
                let needle = name.trim().to_lowercase();
                if needle.is_empty() {
                    return Err(ServiceError::ValidationError(
                        "Se requiere category_id o category_name".to_string(),
                    ));
                }
                self.categories()
                    .await?
                    .into_iter()
                    .filter(|c| c.name.to_lowercase().contains(&needle))
                    .map(|c| c.id)
                    .collect()
            }
        };

        if category_ids.is_empty() {
            debug!("no category matched selector");
            return Ok(Vec::new());
        }

        let products = ProductEntity::find()
            .filter(ProductColumn::CategoryId.is_in(category_ids))
            .filter(ProductColumn::IsAvailable.eq(true))
            .order_by_asc(ProductColumn::Name)
            .all(&*self.db)
            .await?;

        Ok(products.into_iter().map(ProductSummary::from).collect())
    }

    /// Available products ordered by name
    pub async fn available_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(ProductEntity::find()
            .filter(ProductColumn::IsAvailable.eq(true))
            .order_by_asc(ProductColumn::Name)
            .all(&*self.db)
            .await?)
    }

    pub async fn stock_list(&self) -> Result<Vec<StockListEntry>, ServiceError> {
        Ok(self
            .available_products()
            .await?
            .into_iter()
            .map(|p| StockListEntry {
                display: format!("{} - Stock: {} - ${}", p.name, p.stock, display_price(p.price)),
                id: p.id,
                name: p.name,
                stock: p.stock,
                price: p.price,
            })
            .collect())
    }

    /// Every product with its category name, sorted by category then product name
    pub async fn products_with_categories(
        &self,
        only_available: bool,
    ) -> Result<Vec<ProductWithCategory>, ServiceError> {
        let mut query = ProductEntity::find().find_also_related(CategoryEntity);
        if only_available {
            query = query.filter(ProductColumn::IsAvailable.eq(true));
        }

        let mut rows: Vec<ProductWithCategory> = query
            .all(&*self.db)
            .await?
            .into_iter()
            .map(ProductWithCategory::from_pair)
            .collect();

        rows.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(rows)
    }

    /// Products with the given ids, in id order
    pub async fn products_by_ids(
        &self,
        ids: &[i32],
    ) -> Result<Vec<ProductWithCategory>, ServiceError> {
        Ok(ProductEntity::find()
            .find_also_related(CategoryEntity)
            .filter(ProductColumn::Id.is_in(ids.to_vec()))
            .order_by_asc(ProductColumn::Id)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(ProductWithCategory::from_pair)
            .collect())
    }

    pub async fn product_count(&self) -> Result<u64, ServiceError> {
        Ok(ProductEntity::find().count(&*self.db).await?)
    }

    pub async fn category_count(&self) -> Result<u64, ServiceError> {
        Ok(CategoryEntity::find().count(&*self.db).await?)
    }

    /// Available products priced at or below `threshold`, cheapest first
    pub async fn affordable_products(
        &self,
        threshold: Decimal,
    ) -> Result<Vec<product::Model>, ServiceError> {
        Ok(ProductEntity::find()
            .filter(ProductColumn::IsAvailable.eq(true))
            .filter(ProductColumn::Price.lte(threshold))
            .order_by_asc(ProductColumn::Price)
            .all(&*self.db)
            .await?)
    }

    pub async fn cheapest_available(&self) -> Result<Option<product::Model>, ServiceError> {
        Ok(ProductEntity::find()
            .filter(ProductColumn::IsAvailable.eq(true))
            .order_by_asc(ProductColumn::Price)
            .one(&*self.db)
            .await?)
    }

    /// Products with the most units on hand
    pub async fn top_by_stock(&self, limit: u64) -> Result<Vec<product::Model>, ServiceError> {
        Ok(ProductEntity::find()
            .order_by_desc(ProductColumn::Stock)
            .order_by_asc(ProductColumn::Name)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    /// Up to `count` available products picked at random
    pub async fn random_available(&self, count: usize) -> Result<Vec<product::Model>, ServiceError> {
        let products = self.available_products().await?;
        let mut rng = rand::thread_rng();
        Ok(products
            .choose_multiple(&mut rng, count)
            .cloned()
            .collect())
    }
}
