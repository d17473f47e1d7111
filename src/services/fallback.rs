use std::fmt::Write as _;

use rust_decimal::Decimal;
use tracing::{error, instrument};

use super::analytics::AnalyticsService;
use super::catalog::{display_price, CatalogService};
use super::reports::{format_business_metrics, format_count};
use crate::errors::ServiceError;

const STATIC_GREETING: &str = "¡Hola! Estoy aquí para ayudarte con información sobre nuestros productos, stock, precios, proceso de compra, gestión de tu cuenta y **análisis estadísticos**. ¿En qué puedo asistirte hoy?";

const PASSWORD_HELP: &str = "🔐 **Para cambiar tu contraseña:**\n\n\
1. Ve a 'Mi Cuenta' en el menú superior\n\
2. Haz clic en 'Cambiar Contraseña'\n\
3. Ingresa tu contraseña actual y la nueva\n\
4. Confirma los cambios\n\n\
Si olvidaste tu contraseña, haz clic en '¿Olvidaste tu contraseña?' en la página de login.";

const PURCHASE_HELP: &str = "🛒 **Proceso de compra:**\n\n\
1. **Agregar productos**: Haz clic en 'Agregar al Carrito'\n\
2. **Ver carrito**: Ve a 'Carrito' en el menú\n\
3. **Checkout**: Haz clic en 'Proceder al Pago'\n\
4. **Envío**: Elige dirección y método de envío\n\
5. **Pago**: Selecciona tu método de pago\n\
6. **Confirmación**: Recibirás un email de confirmación\n\n\
¿En qué paso necesitas ayuda?";

/// Intent recognised by the rule-based responder, in evaluation order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackRule {
    Category,
    Budget,
    Password,
    Purchase,
    Stock,
    Statistics,
}

impl FallbackRule {
    pub const ORDER: [FallbackRule; 6] = [
        FallbackRule::Category,
        FallbackRule::Budget,
        FallbackRule::Password,
        FallbackRule::Purchase,
        FallbackRule::Stock,
        FallbackRule::Statistics,
    ];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            FallbackRule::Category => &[
                "categoría",
                "categoria",
                "computadoras",
                "ropa",
                "música",
                "muebles",
                "accesorios",
                "category",
            ],
            FallbackRule::Budget => &[
                "presupuesto",
                "gs",
                "guaraníes",
                "200.000",
                "200000",
                "dinero",
                "budget",
            ],
            FallbackRule::Password => &[
                "contraseña",
                "password",
                "cambiar contraseña",
                "olvidé contraseña",
            ],
            FallbackRule::Purchase => &["comprar", "pedido", "carrito", "pago", "envío"],
            FallbackRule::Stock => &["stock", "disponible", "cantidad", "unidades"],
            FallbackRule::Statistics => &["estadística", "estadisticas", "ventas", "métricas"],
        }
    }

    /// Lower-cased `text` mentions one of this rule's words
    pub fn matches(self, text: &str) -> bool {
        self.keywords().iter().any(|k| text.contains(k))
    }
}

/// Rules whose keywords appear in `message`, in evaluation order
pub fn candidate_rules(message: &str) -> Vec<FallbackRule> {
    let text = message.to_lowercase();
    FallbackRule::ORDER
        .into_iter()
        .filter(|rule| rule.matches(&text))
        .collect()
}

/// Singular-ish stem of a category name, so "computadora" finds "Computadoras"
fn category_stem(name: &str) -> String {
    let lowered = name.to_lowercase();
    lowered
        .strip_suffix("es")
        .filter(|s| s.len() >= 4)
        .or_else(|| lowered.strip_suffix('s'))
        .unwrap_or(&lowered)
        .to_string()
}

/// Answers common questions from the catalogue when no language model is available
#[derive(Clone)]
pub struct FallbackResponder {
    catalog: CatalogService,
    analytics: AnalyticsService,
    budget_threshold: i64,
}

impl FallbackResponder {
    pub fn new(catalog: CatalogService, analytics: AnalyticsService, budget_threshold: i64) -> Self {
        Self {
            catalog,
            analytics,
            budget_threshold,
        }
    }

    /// Always produces a reply; storage errors degrade to a static greeting.
    #[instrument(skip(self, message))]
    pub async fn respond(&self, message: &str) -> String {
        match self.try_respond(message).await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "fallback responder failed");
                STATIC_GREETING.to_string()
            }
        }
    }

    async fn try_respond(&self, message: &str) -> Result<String, ServiceError> {
        let text = message.to_lowercase();
        for rule in FallbackRule::ORDER {
            if !rule.matches(&text) {
                continue;
            }
            if let Some(reply) = self.answer(rule, &text).await? {
                return Ok(reply);
            }
        }
        self.greeting().await
    }

    /// `Ok(None)` lets the next rule answer.
    async fn answer(&self, rule: FallbackRule, text: &str) -> Result<Option<String>, ServiceError> {
        match rule {
            FallbackRule::Category => self.category_reply(text).await.map(Some),
            FallbackRule::Budget => self.budget_reply().await.map(Some),
            FallbackRule::Password => Ok(Some(PASSWORD_HELP.to_string())),
            FallbackRule::Purchase => Ok(Some(PURCHASE_HELP.to_string())),
            FallbackRule::Stock => self.stock_reply().await,
            FallbackRule::Statistics => {
                let metrics = self.analytics.business_metrics().await?;
                Ok(Some(format_business_metrics(&metrics)))
            }
        }
    }

    async fn category_reply(&self, text: &str) -> Result<String, ServiceError> {
        let categories = self.catalog.categories().await?;

        if let Some(category) = categories
            .iter()
            .find(|c| text.contains(&category_stem(&c.name)))
        {
            let products = self
                .catalog
                .products_by_category(super::catalog::CategorySelector::Id(category.id))
                .await?;
            if products.is_empty() {
                return Ok(format!(
                    "❌ No hay productos disponibles en la categoría {}.",
                    category.name
                ));
            }

            let list = products
                .iter()
                .map(|p| format!("• **{}** - ${} (Stock: {})", p.name, display_price(p.price), p.stock))
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(format!(
                "🛍️ **Productos en {}:**\n\n{}\n\n¿Te interesa alguno de estos productos?",
                category.name, list
            ));
        }

        let list = categories
            .iter()
            .map(|c| format!("• {}", c.name))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!(
            "📂 **Categorías disponibles:**\n\n{list}\n\nPuedo mostrarte los productos de cualquier categoría. ¿Cuál te interesa?"
        ))
    }

    async fn budget_reply(&self) -> Result<String, ServiceError> {
        let budget = format_count(self.budget_threshold);
        let affordable = self
            .catalog
            .affordable_products(Decimal::from(self.budget_threshold))
            .await?;

        if !affordable.is_empty() {
            let list = affordable
                .iter()
                .map(|p| format!("• **{}** - ${} (Stock: {})", p.name, display_price(p.price), p.stock))
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(format!(
                "💰 **Productos dentro de tu presupuesto de {budget} GS:**\n\n{list}\n\n¿Te gustaría más información de algún producto en particular?"
            ));
        }

        let mut reply = format!("❌ No hay productos dentro de tu presupuesto de {budget} GS.");
        if let Some(cheapest) = self.catalog.cheapest_available().await? {
            let _ = write!(
                reply,
                " El producto más económico cuesta ${}",
                display_price(cheapest.price)
            );
        }
        Ok(reply)
    }

    async fn stock_reply(&self) -> Result<Option<String>, ServiceError> {
        let products = self.catalog.top_by_stock(3).await?;
        if products.is_empty() {
            return Ok(None);
        }
        let list = products
            .iter()
            .map(|p| format!("• **{}** - {} unidades", p.name, p.stock))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Some(format!(
            "📦 **Productos con mayor stock:**\n\n{list}\n\n¿Quieres información detallada de algún producto?"
        )))
    }

    async fn greeting(&self) -> Result<String, ServiceError> {
        let product_count = self.catalog.product_count().await?;
        let category_count = self.catalog.category_count().await?;
        let featured = self.catalog.random_available(3).await?;

        let featured_list = featured
            .iter()
            .map(|p| format!("• **{}** - ${}", p.name, display_price(p.price)))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(format!(
            "¡Hola! Soy tu asistente virtual. 😊\n\n\
             **Resumen de la tienda:**\n\
             • {product_count} productos disponibles\n\
             • {category_count} categorías\n\n\
             **Algunos productos destacados:**\n{featured_list}\n\n\
             **Puedo ayudarte con:**\n\
             • 🛍️ Información de productos y stock\n\
             • 💰 Precios y presupuestos\n\
             • 🛒 Proceso de compra\n\
             • 🔐 Gestión de cuenta\n\
             • 📦 Seguimiento de pedidos\n\
             • 🔄 Comparación de productos\n\
             • 📊 **Análisis estadísticos y gráficos**\n\n\
             ¿En qué necesitas ayuda específicamente?"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_fixtures::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test_case("¿qué hay en la categoría ropa?", FallbackRule::Category)]
    #[test_case("tengo un presupuesto de 200.000", FallbackRule::Budget)]
    #[test_case("olvidé mi password", FallbackRule::Password)]
    #[test_case("¿cómo hago un pedido?", FallbackRule::Purchase)]
    #[test_case("¿cuántas unidades tienen?", FallbackRule::Stock)]
    #[test_case("quiero ver las métricas", FallbackRule::Statistics)]
    fn first_candidate_rule(message: &str, expected: FallbackRule) {
        assert_eq!(candidate_rules(message).first(), Some(&expected));
    }

    #[test]
    fn category_words_outrank_budget_words() {
        let rules = candidate_rules("ropa con mi presupuesto");
        assert_eq!(rules, vec![FallbackRule::Category, FallbackRule::Budget]);
    }

    #[test]
    fn plain_greeting_matches_no_rule() {
        assert!(candidate_rules("hola").is_empty());
    }

    #[test_case("Computadoras", "computadora")]
    #[test_case("Accesorios", "accesorio")]
    #[test_case("Ropa", "ropa")]
    fn category_stems(name: &str, stem: &str) {
        assert_eq!(category_stem(name), stem);
    }

    async fn responder() -> (FallbackResponder, std::sync::Arc<sea_orm::DatabaseConnection>) {
        let db = memory_db().await;
        let catalog = CatalogService::new(db.clone());
        let analytics = AnalyticsService::new(db.clone(), 10);
        (FallbackResponder::new(catalog, analytics, 200_000), db)
    }

    #[tokio::test]
    async fn category_mention_lists_its_products() {
        let (responder, db) = responder().await;
        let computers = seed_category(&db, "Computadoras").await;
        seed_category(&db, "Ropa").await;
        seed_product(&db, computers.id, "Notebook", dec!(3500000), 3, true).await;

        let reply = responder
            .respond("¿qué computadora me recomiendas? busco en la categoría")
            .await;
        assert!(reply.starts_with("🛍️ **Productos en Computadoras:**"));
        assert!(reply.contains("• **Notebook** - $3500000.00 (Stock: 3)"));
    }

    #[tokio::test]
    async fn unknown_category_lists_categories() {
        let (responder, db) = responder().await;
        seed_category(&db, "Muebles").await;
        seed_category(&db, "Música").await;

        let reply = responder.respond("¿qué categorías tienen?").await;
        assert!(reply.starts_with("📂 **Categorías disponibles:**"));
        assert!(reply.contains("• Muebles"));
        assert!(reply.contains("• Música"));
    }

    #[tokio::test]
    async fn budget_lists_affordable_products_cheapest_first() {
        let (responder, db) = responder().await;
        let cat = seed_category(&db, "Accesorios").await;
        seed_product(&db, cat.id, "Funda", dec!(150000), 5, true).await;
        seed_product(&db, cat.id, "Cable", dec!(30000), 9, true).await;
        seed_product(&db, cat.id, "Teclado", dec!(450000), 2, true).await;

        let reply = responder.respond("mi presupuesto es bajo").await;
        assert!(reply.contains("presupuesto de 200,000 GS"));
        let cable = reply.find("Cable").unwrap();
        let funda = reply.find("Funda").unwrap();
        assert!(cable < funda);
        assert!(!reply.contains("Teclado"));
    }

    #[tokio::test]
    async fn budget_without_matches_names_cheapest_price() {
        let (responder, db) = responder().await;
        let cat = seed_category(&db, "Muebles").await;
        seed_product(&db, cat.id, "Sofá", dec!(2500000), 1, true).await;

        let reply = responder.respond("tengo poco dinero").await;
        assert!(reply.starts_with("❌ No hay productos dentro de tu presupuesto de 200,000 GS."));
        assert!(reply.ends_with("El producto más económico cuesta $2500000.00"));
    }

    #[tokio::test]
    async fn stock_rule_lists_top_three() {
        let (responder, db) = responder().await;
        let cat = seed_category(&db, "Accesorios").await;
        for (name, stock) in [("A", 5), ("B", 50), ("C", 20), ("D", 1)] {
            seed_product(&db, cat.id, name, dec!(10), stock, true).await;
        }

        let reply = responder.respond("¿qué tienen en stock?").await;
        assert!(reply.starts_with("📦 **Productos con mayor stock:**"));
        assert!(reply.contains("• **B** - 50 unidades"));
        assert!(!reply.contains("• **D**"));
    }

    #[tokio::test]
    async fn empty_stock_falls_through_to_greeting() {
        let (responder, _db) = responder().await;
        let reply = responder.respond("¿hay stock?").await;
        assert!(reply.starts_with("¡Hola! Soy tu asistente virtual."));
        assert!(reply.contains("• 0 productos disponibles"));
    }

    #[tokio::test]
    async fn static_help_rules() {
        let (responder, _db) = responder().await;
        assert_eq!(responder.respond("cambiar contraseña").await, PASSWORD_HELP);
        assert_eq!(responder.respond("quiero comprar").await, PURCHASE_HELP);
    }

    #[tokio::test]
    async fn statistics_rule_reports_metrics() {
        let (responder, _db) = responder().await;
        let reply = responder.respond("estadística por favor").await;
        assert!(reply.starts_with("📈 **Métricas del Negocio**"));
    }

    #[tokio::test]
    async fn greeting_features_available_products() {
        let (responder, db) = responder().await;
        let cat = seed_category(&db, "Ropa").await;
        seed_product(&db, cat.id, "Campera", dec!(180000), 4, true).await;
        seed_product(&db, cat.id, "Oculta", dec!(1), 4, false).await;

        let reply = responder.respond("hola").await;
        assert!(reply.contains("• 2 productos disponibles"));
        assert!(reply.contains("• 1 categorías"));
        assert!(reply.contains("• **Campera** - $180000.00"));
        assert!(!reply.contains("Oculta"));
    }
}
