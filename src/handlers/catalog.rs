use axum::{extract::State, response::Json};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use super::ValidatedJson;
use crate::{
    services::catalog::{CategorySelector, ProductSummary, StockListEntry},
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_selector"))]
pub struct CategoryProductsRequest {
    pub category_id: Option<i32>,
    pub category_name: Option<String>,
}

fn validate_selector(req: &CategoryProductsRequest) -> Result<(), ValidationError> {
    let has_name = req
        .category_name
        .as_deref()
        .is_some_and(|n| !n.trim().is_empty());
    if req.category_id.is_none() && !has_name {
        let mut err = ValidationError::new("category_required");
        err.message = Some("Se requiere category_id o category_name".into());
        return Err(err);
    }
    Ok(())
}

impl CategoryProductsRequest {
    fn selector(self) -> CategorySelector {
        match (self.category_id, self.category_name) {
            (Some(id), _) => CategorySelector::Id(id),
            (None, name) => CategorySelector::Name(name.unwrap_or_default()),
        }
    }
}

#[utoipa::path(
    post,
    path = "/products-by-category",
    summary = "Available products of a category",
    description = "Looks the category up by id, or by a case-insensitive match on its name",
    request_body = CategoryProductsRequest,
    responses(
        (status = 200, description = "Products", body = ApiResponse<Vec<ProductSummary>>),
        (status = 400, description = "Neither category_id nor category_name given", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "catalog"
)]
pub async fn products_by_category(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CategoryProductsRequest>,
) -> ApiResult<Vec<ProductSummary>> {
    let products = state
        .services
        .catalog
        .products_by_category(payload.selector())
        .await?;
    Ok(Json(ApiResponse::success(products)))
}

#[utoipa::path(
    get,
    path = "/stock-list",
    summary = "Stock list",
    description = "Available products with their stock, for quick lookups",
    responses(
        (status = 200, description = "Stock entries", body = ApiResponse<Vec<StockListEntry>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "catalog"
)]
pub async fn stock_list(State(state): State<AppState>) -> ApiResult<Vec<StockListEntry>> {
    let entries = state.services.catalog.stock_list().await?;
    Ok(Json(ApiResponse::success(entries)))
}
