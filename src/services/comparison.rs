use std::fmt::Write as _;
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{instrument, warn};

use super::catalog::{display_price, CatalogService, ProductWithCategory};
use super::llm::{GenerationParams, LanguageModel};
use super::reports::format_amount;
use crate::errors::ServiceError;

const NOT_ENOUGH_PRODUCTS: &str = "Se necesitan al menos 2 productos para comparar";

#[derive(Serialize)]
struct ComparedProduct<'a> {
    nombre: &'a str,
    precio: String,
    #[serde(rename = "categoría")]
    categoria: &'a str,
    stock: i32,
    #[serde(rename = "descripción")]
    descripcion: &'a str,
}

fn category_of(p: &ProductWithCategory) -> &str {
    p.category.as_deref().unwrap_or("Sin categoría")
}

pub fn build_comparison_prompt(products: &[ProductWithCategory]) -> Result<String, ServiceError> {
    let data: Vec<ComparedProduct<'_>> = products
        .iter()
        .map(|p| ComparedProduct {
            nombre: &p.name,
            precio: display_price(p.price),
            categoria: category_of(p),
            stock: p.stock,
            descripcion: p.description.as_deref().unwrap_or(""),
        })
        .collect();

    Ok(format!(
        "Como experto en e-commerce, compara estos productos de manera útil:\n\n\
         {}\n\n\
         Responde en español con:\n\
         1. Similitudes clave\n\
         2. Diferencias principales (precio, características)\n\
         3. Recomendación según diferentes necesidades\n\
         4. Mejor opción por categoría (valor, características)\n\n\
         Sé objetivo y útil para el cliente:",
        serde_json::to_string_pretty(&data)?
    ))
}

/// Side-by-side listing used when the language model cannot answer.
///
/// Expects at least two products.
pub fn manual_comparison(products: &[ProductWithCategory]) -> String {
    let mut out = String::from("🔄 **Comparación de Productos**\n\n");

    for (i, p) in products.iter().enumerate() {
        let _ = writeln!(out, "**{}. {}**", i + 1, p.name);
        let _ = writeln!(out, "   💰 Precio: ${}", format_amount(p.price));
        let _ = writeln!(out, "   📦 Stock: {} unidades", p.stock);
        let _ = writeln!(out, "   📂 Categoría: {}", category_of(p));
        if let Some(description) = p.description.as_deref().filter(|d| !d.trim().is_empty()) {
            let _ = writeln!(out, "   📝 {}", description.trim());
        }
        out.push('\n');
    }

    let cheapest = products.iter().min_by(|a, b| a.price.cmp(&b.price));
    let priciest = products.iter().max_by(|a, b| a.price.cmp(&b.price));
    let most_stock = products.iter().max_by_key(|p| p.stock);

    out.push_str("**Resumen:**\n");
    if let Some(p) = cheapest {
        let _ = writeln!(out, "• Más económico: {} (${})", p.name, format_amount(p.price));
    }
    if let Some(p) = most_stock {
        let _ = writeln!(out, "• Mayor stock: {} ({} unidades)", p.name, p.stock);
    }
    if let (Some(low), Some(high)) = (cheapest, priciest) {
        let _ = writeln!(
            out,
            "• Diferencia de precio: ${}",
            format_amount(high.price - low.price)
        );
    }
    out.push_str("\n¿Quieres más detalles de alguno de estos productos?");
    out
}

/// Compares catalogue products, preferring the language model
#[derive(Clone)]
pub struct ComparisonService {
    catalog: CatalogService,
    model: Option<Arc<dyn LanguageModel>>,
    params: GenerationParams,
}

impl ComparisonService {
    pub fn new(
        catalog: CatalogService,
        model: Option<Arc<dyn LanguageModel>>,
        params: GenerationParams,
    ) -> Self {
        Self {
            catalog,
            model,
            params,
        }
    }

    #[instrument(skip(self))]
    pub async fn compare(&self, product_ids: &[i32]) -> Result<String, ServiceError> {
        let mut ids = product_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() < 2 {
            return Err(ServiceError::ValidationError(NOT_ENOUGH_PRODUCTS.to_string()));
        }

        let products = self.catalog.products_by_ids(&ids).await?;
        if products.len() < 2 {
            return Err(ServiceError::ValidationError(NOT_ENOUGH_PRODUCTS.to_string()));
        }

        if let Some(model) = self.model.as_deref() {
            let prompt = build_comparison_prompt(&products)?;
            match model.generate(&prompt, &self.params).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(error = %e, "comparison via language model failed, using manual comparison");
                    counter!("assistant.llm_fallbacks", 1);
                }
            }
        }

        Ok(manual_comparison(&products))
    }
}
