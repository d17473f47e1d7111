use metrics::counter;
use tracing::{debug, instrument};

use super::analytics::AnalyticsService;
use super::charts::{ChartKind, ChartService, RenderedChart};
use super::reports::{format_business_metrics, format_sales_analysis, format_top_products};
use crate::errors::ServiceError;

/// Words that mark a message as a statistics request at all
const STATISTICAL_KEYWORDS: &[&str] = &[
    "estadística",
    "estadisticas",
    "gráfico",
    "grafico",
    "chart",
    "ventas",
    "análisis",
    "analisis",
    "métricas",
    "metricas",
    "historial de ventas",
    "reporte",
    "tendencia",
    "comparar ventas",
    "productos más vendidos",
    "ingresos",
    "ganancias",
    "utilidades",
    "diagrama",
    "barras",
    "líneas",
    "lineas",
    "circular",
    "pastel",
    "statistics",
    "sales",
    "revenue",
    "trend",
    "metrics",
];

// Branch words only apply after the gate above matched.
const SALES_WORDS: &[&str] = &["ventas", "ingresos", "ganancias", "sales", "revenue"];
const TOP_PRODUCT_WORDS: &[&str] = &["más vendidos", "populares"];
const METRIC_WORDS: &[&str] = &["métricas", "metricas", "kpi", "indicadores", "metrics"];
const CHART_WORDS: &[&str] = &["gráfico", "grafico", "chart"];

/// Explicit windows, checked in order; anything else means 30 days.
const SALES_WINDOWS: &[(&[&str], u32)] = &[
    (&["últimos 7 días", "última semana", "last 7 days", "last week"], 7),
    (&["últimos 30 días", "último mes", "last 30 days", "last month"], 30),
    (&["últimos 90 días", "último trimestre", "last 90 days", "last quarter"], 90),
];
const DEFAULT_SALES_WINDOW: u32 = 30;

/// Canned report a statistics message resolves to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatisticalIntent {
    SalesAnalysis { days: u32 },
    TopProducts,
    BusinessMetrics,
    /// `explicit` is false when no shape word was given and the line chart is the default
    Chart { kind: ChartKind, explicit: bool },
}

impl StatisticalIntent {
    fn label(&self) -> &'static str {
        match self {
            Self::SalesAnalysis { .. } => "sales_analysis",
            Self::TopProducts => "top_products",
            Self::BusinessMetrics => "business_metrics",
            Self::Chart { .. } => "chart",
        }
    }
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

fn sales_window(text: &str) -> u32 {
    SALES_WINDOWS
        .iter()
        .find(|(phrases, _)| contains_any(text, phrases))
        .map(|(_, days)| *days)
        .unwrap_or(DEFAULT_SALES_WINDOW)
}

fn chart_shape(text: &str) -> StatisticalIntent {
    let (kind, explicit) = if text.contains("bar") {
        (ChartKind::SalesBar, true)
    } else if contains_any(text, &["línea", "linea", "line"]) {
        (ChartKind::SalesLine, true)
    } else if contains_any(text, &["circular", "pastel", "pie"]) {
        (ChartKind::CategoryPie, true)
    } else {
        (ChartKind::SalesLine, false)
    };
    StatisticalIntent::Chart { kind, explicit }
}

fn is_sales(text: &str) -> bool {
    contains_any(text, SALES_WORDS)
}

fn sales_intent(text: &str) -> StatisticalIntent {
    StatisticalIntent::SalesAnalysis {
        days: sales_window(text),
    }
}

fn is_top_products(text: &str) -> bool {
    contains_any(text, TOP_PRODUCT_WORDS)
}

fn top_products_intent(_: &str) -> StatisticalIntent {
    StatisticalIntent::TopProducts
}

fn is_metrics(text: &str) -> bool {
    contains_any(text, METRIC_WORDS)
}

fn metrics_intent(_: &str) -> StatisticalIntent {
    StatisticalIntent::BusinessMetrics
}

fn is_chart(text: &str) -> bool {
    contains_any(text, CHART_WORDS)
}

/// One branch of the dispatcher: a predicate and the intent it produces
struct Rule {
    matches: fn(&str) -> bool,
    intent: fn(&str) -> StatisticalIntent,
}

/// Evaluated top to bottom; the first match wins.
const RULES: &[Rule] = &[
    Rule {
        matches: is_sales,
        intent: sales_intent,
    },
    Rule {
        matches: is_top_products,
        intent: top_products_intent,
    },
    Rule {
        matches: is_metrics,
        intent: metrics_intent,
    },
    Rule {
        matches: is_chart,
        intent: chart_shape,
    },
];

/// Classifies a chat message. `None` means "not a statistics request".
pub fn classify(message: &str) -> Option<StatisticalIntent> {
    let text = message.to_lowercase();
    if !contains_any(&text, STATISTICAL_KEYWORDS) {
        return None;
    }
    RULES
        .iter()
        .find(|rule| (rule.matches)(&text))
        .map(|rule| (rule.intent)(&text))
}

fn chart_heading(kind: ChartKind, explicit: bool) -> &'static str {
    match (kind, explicit) {
        (ChartKind::SalesBar, _) => "📊 **Gráfico de Barras Generado:**",
        (ChartKind::SalesLine, true) => "📈 **Gráfico de Líneas Generado:**",
        (ChartKind::CategoryPie, _) => "🥧 **Gráfico Circular Generado:**",
        (ChartKind::SalesLine, false) => "📊 **Gráfico de Ventas Generado:**",
    }
}

/// Report text plus the chart image when one was drawn
#[derive(Clone, Debug)]
pub struct StatisticalReply {
    pub text: String,
    pub chart: Option<RenderedChart>,
}

/// Runs the canned report picked by [`classify`]
#[derive(Clone)]
pub struct StatisticalDispatcher {
    analytics: AnalyticsService,
    charts: ChartService,
    top_products_limit: u64,
}

impl StatisticalDispatcher {
    pub fn new(analytics: AnalyticsService, charts: ChartService, top_products_limit: u64) -> Self {
        Self {
            analytics,
            charts,
            top_products_limit,
        }
    }

    /// `Ok(None)` when the message is not a statistics request or a chart has
    /// nothing to draw; the caller then asks the language model.
    #[instrument(skip(self, message))]
    pub async fn respond(&self, message: &str) -> Result<Option<StatisticalReply>, ServiceError> {
        let Some(intent) = classify(message) else {
            return Ok(None);
        };
        debug!(?intent, "statistical intent");
        counter!("assistant.statistical_dispatch", 1, "branch" => intent.label());

        let reply = match intent {
            StatisticalIntent::SalesAnalysis { days } => {
                let report = self.analytics.sales_analysis(days).await?;
                Some(StatisticalReply {
                    text: format_sales_analysis(&report),
                    chart: None,
                })
            }
            StatisticalIntent::TopProducts => {
                let top = self.analytics.top_products(self.top_products_limit).await?;
                Some(StatisticalReply {
                    text: format_top_products(&top),
                    chart: None,
                })
            }
            StatisticalIntent::BusinessMetrics => {
                let metrics = self.analytics.business_metrics().await?;
                Some(StatisticalReply {
                    text: format_business_metrics(&metrics),
                    chart: None,
                })
            }
            StatisticalIntent::Chart { kind, explicit } => {
                self.charts.generate(kind).await?.map(|chart| StatisticalReply {
                    text: format!(
                        "{}\n\n{}\n\n*El gráfico está listo para descargar.*",
                        chart_heading(kind, explicit),
                        chart.analysis
                    ),
                    chart: Some(chart),
                })
            }
        };

        Ok(reply)
    }
}
