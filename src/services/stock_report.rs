use chrono::{DateTime, Utc};
use metrics::counter;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use tracing::{error, instrument, warn};

use super::catalog::{display_price, CatalogService, ProductWithCategory};
use crate::errors::ServiceError;

/// US Letter, in points
const PAGE_WIDTH_PT: f32 = 612.0;
const PAGE_HEIGHT_PT: f32 = 792.0;
const BOTTOM_MARGIN_PT: f32 = 50.0;
const LINE_STEP_PT: f32 = 15.0;

const PRIMARY_TITLE: &str = "Reporte de Stock de Productos";
const FALLBACK_TITLE: &str = "Reporte de Stock - E-commerce";

/// A string placed on a page, coordinates in points from the bottom-left corner
#[derive(Clone, Debug, PartialEq)]
pub struct TextItem {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub bold: bool,
}

impl TextItem {
    fn new(text: impl Into<String>, x: f32, y: f32, size: f32, bold: bool) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            size,
            bold,
        }
    }
}

pub type PageLayout = Vec<TextItem>;

/// Grouped report of every product, one heading per category.
///
/// Fails when a product has no category.
pub fn layout_primary(
    products: &[ProductWithCategory],
    generated_at: DateTime<Utc>,
) -> Result<Vec<PageLayout>, ServiceError> {
    let mut pages: Vec<PageLayout> = vec![vec![
        TextItem::new(PRIMARY_TITLE, 100.0, 750.0, 16.0, true),
        TextItem::new(
            format!("Generado el: {}", generated_at.format("%Y-%m-%d %H:%M")),
            100.0,
            735.0,
            10.0,
            false,
        ),
    ]];
    let mut y = 700.0;
    let mut current_category: Option<&str> = None;

    for product in products {
        let category = product.category.as_deref().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "product {} has no category",
                product.id
            ))
        })?;

        if current_category != Some(category) {
            current_category = Some(category);
            y -= 20.0;
            if y < BOTTOM_MARGIN_PT {
                pages.push(Vec::new());
                y = 750.0;
            }
            push_item(
                &mut pages,
                TextItem::new(format!("Categoría: {category}"), 100.0, y, 12.0, true),
            );
            y -= LINE_STEP_PT;
        }

        if y < BOTTOM_MARGIN_PT {
            pages.push(Vec::new());
            y = 750.0;
        }
        push_item(
            &mut pages,
            TextItem::new(
                format!(
                    "  {} - Stock: {} - Precio: ${}",
                    product.name,
                    product.stock,
                    display_price(product.price)
                ),
                120.0,
                y,
                10.0,
                false,
            ),
        );
        y -= LINE_STEP_PT;
    }

    Ok(pages)
}

/// Flat single-pass listing; later pages repeat the title with "(Cont.)".
pub fn layout_fallback(products: &[ProductWithCategory]) -> Vec<PageLayout> {
    let mut pages: Vec<PageLayout> = vec![vec![TextItem::new(
        FALLBACK_TITLE,
        100.0,
        750.0,
        16.0,
        true,
    )]];
    let mut y = 720.0;

    for product in products {
        if y < BOTTOM_MARGIN_PT {
            pages.push(vec![TextItem::new(
                format!("{FALLBACK_TITLE} (Cont.)"),
                100.0,
                750.0,
                16.0,
                true,
            )]);
            y = 720.0;
        }
        push_item(
            &mut pages,
            TextItem::new(
                format!(
                    "{} - Stock: {} - Precio: ${}",
                    product.name,
                    product.stock,
                    display_price(product.price)
                ),
                50.0,
                y,
                10.0,
                false,
            ),
        );
        y -= LINE_STEP_PT;
    }

    pages
}

fn push_item(pages: &mut [PageLayout], item: TextItem) {
    if let Some(page) = pages.last_mut() {
        page.push(item);
    }
}

fn pt_to_mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

fn pdf_err(e: impl std::fmt::Display) -> ServiceError {
    ServiceError::InternalError(e.to_string())
}

/// Writes the laid-out pages with the built-in Helvetica fonts.
pub fn render_pdf(title: &str, pages: &[PageLayout]) -> Result<Vec<u8>, ServiceError> {
    let (width, height) = (pt_to_mm(PAGE_WIDTH_PT), pt_to_mm(PAGE_HEIGHT_PT));
    let (doc, first_page, first_layer) = PdfDocument::new(title, width, height, "Capa 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_err)?;

    for (index, page) in pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page_index, layer_index) = doc.add_page(width, height, "Capa 1");
            doc.get_page(page_index).get_layer(layer_index)
        };

        for item in page {
            let font = if item.bold { &bold } else { &regular };
            layer.use_text(
                item.text.as_str(),
                item.size,
                pt_to_mm(item.x),
                pt_to_mm(item.y),
                font,
            );
        }
    }

    doc.save_to_bytes().map_err(pdf_err)
}

/// Builds the stock PDF, retrying once with the simpler layout
#[derive(Clone)]
pub struct StockReportService {
    catalog: CatalogService,
}

impl StockReportService {
    pub fn new(catalog: CatalogService) -> Self {
        Self { catalog }
    }

    async fn primary(&self) -> Result<Vec<u8>, ServiceError> {
        let products = self.catalog.products_with_categories(false).await?;
        let pages = layout_primary(&products, Utc::now())?;
        render_pdf(PRIMARY_TITLE, &pages)
    }

    async fn fallback(&self) -> Result<Vec<u8>, ServiceError> {
        let products = self.catalog.products_with_categories(true).await?;
        render_pdf(FALLBACK_TITLE, &layout_fallback(&products))
    }

    /// When both layouts fail the error carries both causes.
    #[instrument(skip(self))]
    pub async fn generate(&self) -> Result<Vec<u8>, ServiceError> {
        let primary_error = match self.primary().await {
            Ok(pdf) => return Ok(pdf),
            Err(e) => e,
        };
        warn!(error = %primary_error, "stock PDF failed, retrying with simple layout");
        counter!("assistant.pdf_fallbacks", 1);

        self.fallback().await.map_err(|fallback_error| {
            error!(error = %fallback_error, "simple stock PDF failed as well");
            ServiceError::InternalError(format!(
                "Error al generar PDF: {primary_error}. Fallback también falló: {fallback_error}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_fixtures::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn product(id: i32, name: &str, category: Option<&str>) -> ProductWithCategory {
        ProductWithCategory {
            id,
            name: name.into(),
            price: dec!(1500),
            stock: 3,
            is_available: true,
            category: category.map(str::to_string),
            description: None,
        }
    }

    #[test]
    fn primary_layout_groups_by_category() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        let pages = layout_primary(
            &[
                product(1, "Cable", Some("Accesorios")),
                product(2, "Funda", Some("Accesorios")),
                product(3, "Silla", Some("Muebles")),
            ],
            at,
        )
        .unwrap();

        assert_eq!(pages.len(), 1);
        let texts: Vec<_> = pages[0].iter().map(|i| i.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Reporte de Stock de Productos",
                "Generado el: 2024-06-01 09:30",
                "Categoría: Accesorios",
                "  Cable - Stock: 3 - Precio: $1500.00",
                "  Funda - Stock: 3 - Precio: $1500.00",
                "Categoría: Muebles",
                "  Silla - Stock: 3 - Precio: $1500.00",
            ]
        );
        assert!(pages[0].iter().all(|i| i.y >= BOTTOM_MARGIN_PT));
    }

    #[test]
    fn primary_layout_rejects_orphan_products() {
        let err = layout_primary(&[product(9, "Huérfano", None)], Utc::now()).unwrap_err();
        assert!(matches!(err, ServiceError::InternalError(_)));
    }

    #[test]
    fn long_listings_break_pages() {
        let products: Vec<_> = (0..100)
            .map(|i| product(i, &format!("P{i}"), Some("Única")))
            .collect();

        let pages = layout_primary(&products, Utc::now()).unwrap();
        assert!(pages.len() > 1);
        for page in &pages {
            assert!(page.iter().all(|i| i.y >= BOTTOM_MARGIN_PT && i.y <= PAGE_HEIGHT_PT));
        }

        let fallback = layout_fallback(&products);
        assert!(fallback.len() > 1);
        assert_eq!(fallback[1][0].text, "Reporte de Stock - E-commerce (Cont.)");
    }

    #[test]
    fn rendered_pdf_has_pdf_header() {
        let pages = layout_fallback(&[product(1, "Cable", Some("Accesorios"))]);
        let bytes = render_pdf(FALLBACK_TITLE, &pages).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn generate_from_catalogue() {
        let db = memory_db().await;
        let cat = seed_category(&db, "Ropa").await;
        seed_product(&db, cat.id, "Remera", Decimal::from(60000), 8, true).await;

        let pdf = StockReportService::new(CatalogService::new(db))
            .generate()
            .await
            .unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn orphan_product_switches_to_simple_layout() {
        use sea_orm::ConnectionTrait;

        let db = memory_db().await;
        let cat = seed_category(&db, "Ropa").await;
        seed_product(&db, cat.id, "Remera", Decimal::from(60000), 8, true).await;
        db.execute_unprepared("PRAGMA foreign_keys = OFF").await.unwrap();
        seed_product(&db, 999, "Sin categoría", Decimal::from(100), 1, true).await;

        let catalog = CatalogService::new(db);
        let products = catalog.products_with_categories(false).await.unwrap();
        assert!(layout_primary(&products, Utc::now()).is_err());

        let pdf = StockReportService::new(catalog).generate().await.unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn both_layouts_failing_reports_each_cause() {
        use sea_orm::ConnectionTrait;

        let db = memory_db().await;
        db.execute_unprepared("PRAGMA foreign_keys = OFF").await.unwrap();
        db.execute_unprepared("DROP TABLE products").await.unwrap();

        let err = StockReportService::new(CatalogService::new(db))
            .generate()
            .await
            .unwrap_err();
        let ServiceError::InternalError(message) = err else {
            panic!("expected an internal error, got {err:?}");
        };
        assert!(message.starts_with("Error al generar PDF: "));
        assert!(message.contains(". Fallback también falló: "));
        assert_eq!(message.matches("no such table").count(), 2);
    }
}
