use std::f64::consts::PI;
use std::fmt::Write as _;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::png::PngEncoder, ColorType, ImageEncoder};
use plotters::prelude::*;
use plotters::style::register_font;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, instrument};
use utoipa::ToSchema;

use super::analytics::{AnalyticsService, CategoryShare, DailySales};
use super::reports::format_amount;
use crate::errors::ServiceError;

const SALES_SIZE: (u32, u32) = (1200, 600);
const PIE_SIZE: (u32, u32) = (800, 800);

const BAR_COLOR: RGBColor = RGBColor(135, 206, 235);
const LINE_COLOR: RGBColor = RGBColor(0, 128, 0);
const PIE_PALETTE: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
];

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChartKind {
    SalesBar,
    SalesLine,
    CategoryPie,
}

/// Direction of the daily revenue series
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

/// Input of a chart: daily revenue for the sales charts, product counts for the pie
#[derive(Clone, Debug, PartialEq)]
pub enum ChartData {
    Sales(Vec<DailySales>),
    Categories(Vec<CategoryShare>),
}

impl ChartData {
    /// Nothing to draw
    pub fn is_empty(&self) -> bool {
        match self {
            ChartData::Sales(days) => days.is_empty(),
            ChartData::Categories(shares) => shares.iter().all(|s| s.product_count == 0),
        }
    }
}

/// PNG plus its textual analysis
#[derive(Clone, Debug)]
pub struct RenderedChart {
    pub kind: ChartKind,
    pub png: Vec<u8>,
    pub analysis: String,
}

impl RenderedChart {
    pub fn image_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }
}

/// Attachment name of a downloaded chart
pub fn chart_filename(kind: ChartKind, days: u32) -> String {
    format!("chart_{}_{}d.png", kind, days)
}

/// Compares the average of the last seven points against the first seven.
///
/// `None` when fewer than seven points exist.
pub fn trend(values: &[Decimal]) -> Option<Trend> {
    if values.len() < 7 {
        return None;
    }
    // both windows have seven points, so sums compare like averages
    let first: Decimal = values[..7].iter().copied().sum();
    let last: Decimal = values[values.len() - 7..].iter().copied().sum();

    if last > first * Decimal::new(11, 1) {
        Some(Trend::Rising)
    } else if last < first * Decimal::new(9, 1) {
        Some(Trend::Falling)
    } else {
        Some(Trend::Stable)
    }
}

/// Text analysis shown next to a chart
pub fn summarize(data: &ChartData) -> String {
    match data {
        ChartData::Sales(days) => summarize_sales(days),
        ChartData::Categories(shares) => {
            let mut out = String::from("**Distribución de Productos por Categoría:**\n");
            for share in shares {
                let _ = writeln!(out, "• {}: {} productos", share.name, share.product_count);
            }
            out
        }
    }
}

fn summarize_sales(days: &[DailySales]) -> String {
    if days.is_empty() {
        return "No hay datos suficientes para el análisis.".to_string();
    }

    let values: Vec<Decimal> = days.iter().map(|d| d.revenue).collect();
    let total: Decimal = values.iter().copied().sum();
    let average = total / Decimal::from(values.len());
    let max = values.iter().copied().max().unwrap_or_default();
    let min = values.iter().copied().min().unwrap_or_default();

    let mut out = String::from("**📈 Análisis de Tendencia:**\n");
    let _ = writeln!(out, "• Ventas Totales: ${}", format_amount(total));
    let _ = writeln!(out, "• Promedio Diario: ${}", format_amount(average));
    let _ = writeln!(out, "• Día Pico: ${}", format_amount(max));
    let _ = writeln!(out, "• Día Más Bajo: ${}", format_amount(min));

    let line = match trend(&values) {
        Some(Trend::Rising) => "• 📈 Tendencia: **ALCISTA** en las últimas semanas",
        Some(Trend::Falling) => "• 📉 Tendencia: **BAJISTA** en las últimas semanas",
        Some(Trend::Stable) => "• ➡️ Tendencia: **ESTABLE** en las últimas semanas",
        None => "• ℹ️ Se necesitan más datos para análisis de tendencia",
    };
    out.push_str(line);
    out.push('\n');
    out
}

const FONT_FAMILY: &str = "sans-serif";
static FONT_BYTES: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");
static FONT_READY: OnceLock<Result<(), String>> = OnceLock::new();

/// Registers the embedded font with plotters once per process.
fn ensure_font() -> Result<(), ServiceError> {
    FONT_READY
        .get_or_init(|| {
            register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES)
                .map_err(|_| "embedded chart font could not be parsed".to_string())
        })
        .clone()
        .map_err(ServiceError::InternalError)
}

fn draw_err<E: std::fmt::Display>(err: E) -> ServiceError {
    ServiceError::InternalError(format!("chart rendering failed: {err}"))
}

fn encode_png(buf: &[u8], (width, height): (u32, u32)) -> Result<Vec<u8>, ServiceError> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(buf, width, height, ColorType::Rgb8)
        .map_err(draw_err)?;
    Ok(png)
}

/// One non-empty slice of a pie, angles in radians
#[derive(Clone, Debug, PartialEq)]
pub struct PieSlice {
    /// Position of the value in the input
    pub index: usize,
    pub start: f64,
    pub sweep: f64,
    /// Share of the total, 0..=100
    pub percent: f64,
}

impl PieSlice {
    pub fn mid_angle(&self) -> f64 {
        self.start + self.sweep / 2.0
    }
}

/// Slices start at twelve o'clock and run counter-clockwise. Zero values are skipped.
pub fn pie_slices(values: &[u64]) -> Vec<PieSlice> {
    let total: u64 = values.iter().sum();
    if total == 0 {
        return Vec::new();
    }

    let mut start = PI / 2.0;
    let mut slices = Vec::new();
    for (index, &value) in values.iter().enumerate() {
        if value == 0 {
            continue;
        }
        let share = value as f64 / total as f64;
        let sweep = share * 2.0 * PI;
        slices.push(PieSlice {
            index,
            start,
            sweep,
            percent: share * 100.0,
        });
        start += sweep;
    }
    slices
}

fn polar(center: (i32, i32), radius: f64, angle: f64) -> (i32, i32) {
    (
        center.0 + (radius * angle.cos()).round() as i32,
        center.1 - (radius * angle.sin()).round() as i32,
    )
}

/// Polygons approximating each wedge of a pie, in `pie_slices` order.
pub fn pie_wedges(values: &[u64], center: (i32, i32), radius: f64) -> Vec<Vec<(i32, i32)>> {
    pie_slices(values)
        .into_iter()
        .map(|slice| {
            let steps = ((slice.sweep / (2.0 * PI)) * 180.0).ceil().max(2.0) as usize;
            let mut polygon = Vec::with_capacity(steps + 2);
            polygon.push(center);
            for step in 0..=steps {
                let angle = slice.start + slice.sweep * step as f64 / steps as f64;
                polygon.push(polar(center, radius, angle));
            }
            polygon
        })
        .collect()
}

/// Rasterises `data` into a titled PNG. `window_days` only feeds the title.
pub fn render(kind: ChartKind, data: &ChartData, window_days: u32) -> Result<Vec<u8>, ServiceError> {
    ensure_font()?;
    match (kind, data) {
        (ChartKind::SalesBar | ChartKind::SalesLine, ChartData::Sales(days)) => {
            render_sales(kind, days, window_days)
        }
        (ChartKind::CategoryPie, ChartData::Categories(shares)) => render_pie(shares),
        _ => Err(ServiceError::InternalError(format!(
            "chart data does not match chart kind {kind}"
        ))),
    }
}

fn sales_title(kind: ChartKind, window_days: u32) -> String {
    match kind {
        ChartKind::SalesLine => format!("Tendencia de Ventas - Últimos {window_days} Días"),
        _ => format!("Ventas de los Últimos {window_days} Días"),
    }
}

fn render_sales(
    kind: ChartKind,
    days: &[DailySales],
    window_days: u32,
) -> Result<Vec<u8>, ServiceError> {
    let values: Vec<f64> = days
        .iter()
        .map(|d| d.revenue.to_f64().unwrap_or(0.0))
        .collect();
    let labels: Vec<String> = days
        .iter()
        .map(|d| d.date.format("%m-%d").to_string())
        .collect();
    let y_max = values.iter().copied().fold(0.0_f64, f64::max).max(1.0) * 1.1;
    let x_max = values.len().max(1) as f64;

    let mut buf = vec![0u8; (SALES_SIZE.0 * SALES_SIZE.1 * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buf, SALES_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(sales_title(kind, window_days), (FONT_FAMILY, 28))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(90)
            .build_cartesian_2d(0f64..x_max, 0f64..y_max)
            .map_err(draw_err)?;

        let date_tick = |x: &f64| {
            labels
                .get(x.floor().max(0.0) as usize)
                .cloned()
                .unwrap_or_default()
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc("Fecha")
            .y_desc("Ventas ($)")
            .x_labels(labels.len().clamp(1, 15))
            .x_label_formatter(&date_tick)
            .y_label_formatter(&|y| format!("${y:.0}"))
            .label_style((FONT_FAMILY, 14))
            .axis_desc_style((FONT_FAMILY, 16))
            .draw()
            .map_err(draw_err)?;

        match kind {
            ChartKind::SalesBar => {
                chart
                    .draw_series(values.iter().enumerate().map(|(i, v)| {
                        let x = i as f64;
                        Rectangle::new([(x + 0.15, 0.0), (x + 0.85, *v)], BAR_COLOR.filled())
                    }))
                    .map_err(draw_err)?;
            }
            _ => {
                let points: Vec<(f64, f64)> = values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i as f64 + 0.5, *v))
                    .collect();
                chart
                    .draw_series(LineSeries::new(
                        points.clone(),
                        LINE_COLOR.stroke_width(2),
                    ))
                    .map_err(draw_err)?;
                chart
                    .draw_series(
                        points
                            .into_iter()
                            .map(|p| Circle::new(p, 4, LINE_COLOR.filled())),
                    )
                    .map_err(draw_err)?;
            }
        }

        root.present().map_err(draw_err)?;
    }

    encode_png(&buf, SALES_SIZE)
}

fn render_pie(shares: &[CategoryShare]) -> Result<Vec<u8>, ServiceError> {
    let counts: Vec<u64> = shares.iter().map(|s| s.product_count).collect();
    let center = (PIE_SIZE.0 as i32 / 2, PIE_SIZE.1 as i32 / 2 + 20);
    let radius = f64::from(PIE_SIZE.0.min(PIE_SIZE.1)) * 0.32;
    let centered = Pos::new(HPos::Center, VPos::Center);

    let mut buf = vec![0u8; (PIE_SIZE.0 * PIE_SIZE.1 * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buf, PIE_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        root.draw(&Text::new(
            "Distribución de Productos por Categoría",
            (PIE_SIZE.0 as i32 / 2, 40),
            TextStyle::from((FONT_FAMILY, 28).into_font()).pos(centered),
        ))
        .map_err(draw_err)?;

        let slices = pie_slices(&counts);
        for (slice, wedge) in slices.iter().zip(pie_wedges(&counts, center, radius)) {
            let color = PIE_PALETTE[slice.index % PIE_PALETTE.len()];
            root.draw(&Polygon::new(wedge.clone(), color.filled()))
                .map_err(draw_err)?;
            root.draw(&PathElement::new(wedge, WHITE.stroke_width(2)))
                .map_err(draw_err)?;
        }

        for slice in &slices {
            let name = &shares[slice.index].name;
            root.draw(&Text::new(
                name.clone(),
                polar(center, radius * 1.18, slice.mid_angle()),
                TextStyle::from((FONT_FAMILY, 18).into_font()).pos(centered),
            ))
            .map_err(draw_err)?;
            root.draw(&Text::new(
                format!("{:.1}%", slice.percent),
                polar(center, radius * 0.62, slice.mid_angle()),
                TextStyle::from((FONT_FAMILY, 16).into_font())
                    .color(&WHITE)
                    .pos(centered),
            ))
            .map_err(draw_err)?;
        }

        root.present().map_err(draw_err)?;
    }

    encode_png(&buf, PIE_SIZE)
}

/// Loads chart data and renders it
#[derive(Clone)]
pub struct ChartService {
    analytics: AnalyticsService,
    window_days: u32,
}

impl ChartService {
    pub fn new(analytics: AnalyticsService, window_days: u32) -> Self {
        Self {
            analytics,
            window_days,
        }
    }

    /// Sales charts always cover the configured window.
    pub async fn data(&self, kind: ChartKind) -> Result<ChartData, ServiceError> {
        Ok(match kind {
            ChartKind::SalesBar | ChartKind::SalesLine => {
                ChartData::Sales(self.analytics.daily_sales(self.window_days).await?)
            }
            ChartKind::CategoryPie => ChartData::Categories(self.analytics.category_shares().await?),
        })
    }

    /// `Ok(None)` when there is nothing to draw.
    #[instrument(skip(self))]
    pub async fn generate(&self, kind: ChartKind) -> Result<Option<RenderedChart>, ServiceError> {
        let data = self.data(kind).await?;
        if data.is_empty() {
            debug!(%kind, "no chart data");
            return Ok(None);
        }

        let png = tokio::task::spawn_blocking({
            let data = data.clone();
            let window_days = self.window_days;
            move || render(kind, &data, window_days)
        })
        .await
        .map_err(|e| ServiceError::InternalError(format!("chart task failed: {e}")))??;

        Ok(Some(RenderedChart {
            kind,
            png,
            analysis: summarize(&data),
        }))
    }
}
