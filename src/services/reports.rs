//! Plain-text renderings of the analytics reports, as shown in the chat.

use std::fmt::Write;

use rust_decimal::{Decimal, RoundingStrategy};

use super::analytics::{BusinessMetrics, ProductSales, SalesAnalysis};

/// Inserts `,` every three digits of a non-negative integer string.
fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `1234.5` -> `1,234.50`
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}{}.{frac_part}", group_thousands(int_part))
}

/// `200000` -> `200,000`
pub fn format_count(value: i64) -> String {
    let grouped = group_thousands(&value.unsigned_abs().to_string());
    if value < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

pub fn format_rate(rate: f64) -> String {
    format!("{rate:.1}%")
}

pub fn format_sales_analysis(report: &SalesAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "📊 **Análisis de Ventas - Últimos {} días**\n", report.days);
    let _ = writeln!(out, "• **Total de Pedidos:** {}", report.total_orders);
    let _ = writeln!(
        out,
        "• **Ingresos Totales:** ${}",
        format_amount(report.total_revenue)
    );
    let _ = writeln!(
        out,
        "• **Valor Promedio por Pedido:** ${}\n",
        format_amount(report.average_order_value)
    );

    if !report.daily.is_empty() {
        out.push_str("**Tendencia de Ventas:**\n");
        for day in &report.daily {
            let _ = writeln!(
                out,
                "  {}: ${} ({} pedidos)",
                day.date.format("%Y-%m-%d"),
                format_amount(day.revenue),
                day.orders
            );
        }
    }

    if !report.top_products.is_empty() {
        let _ = writeln!(
            out,
            "\n**🏆 Top {} Productos Más Vendidos:**",
            report.top_products.len()
        );
        for (i, product) in report.top_products.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. {} - {} unidades (${})",
                i + 1,
                product.name,
                product.quantity,
                format_amount(product.revenue)
            );
        }
    }

    out.push_str("\n¿Quieres un gráfico específico o más detalles?");
    out
}

pub fn format_top_products(products: &[ProductSales]) -> String {
    let mut out = format!("🏆 **Top {} Productos Más Vendidos**\n\n", products.len());
    for (i, product) in products.iter().enumerate() {
        let _ = writeln!(out, "{}. **{}**", i + 1, product.name);
        let _ = writeln!(out, "   📦 Vendidos: {}", product.quantity);
        let _ = writeln!(out, "   💰 Ingresos: ${}", format_amount(product.revenue));
        let _ = writeln!(
            out,
            "   📂 Categoría: {}\n",
            product.category.as_deref().unwrap_or("Sin categoría")
        );
    }
    out
}

pub fn format_business_metrics(m: &BusinessMetrics) -> String {
    let mut out = String::from("📈 **Métricas del Negocio**\n\n");

    out.push_str("**📦 PEDIDOS:**\n");
    let _ = writeln!(out, "• Total de Pedidos: {}", m.total_orders);
    let _ = writeln!(out, "• Pedidos Completados: {}", m.completed_orders);
    let _ = writeln!(out, "• Pedidos Cancelados: {}", m.cancelled_orders);
    let _ = writeln!(
        out,
        "• Tasa de Completación: {}\n",
        format_rate(m.completion_rate)
    );

    out.push_str("**💰 INGRESOS:**\n");
    let _ = writeln!(out, "• Ingresos Totales: ${}", format_amount(m.total_revenue));
    let _ = writeln!(
        out,
        "• Ingreso Promedio por Pedido: ${}\n",
        format_amount(m.average_revenue)
    );

    out.push_str("**🛍️ PRODUCTOS:**\n");
    let _ = writeln!(out, "• Total de Productos: {}", m.total_products);
    let _ = writeln!(out, "• Productos Disponibles: {}", m.available_products);
    let _ = writeln!(out, "• Productos con Stock Bajo: {}\n", m.low_stock_products);

    out.push_str("**👥 USUARIOS:**\n");
    let _ = writeln!(out, "• Total de Usuarios: {}", m.total_users);
    let _ = writeln!(out, "• Usuarios con Compras: {}", m.users_with_orders);
    let _ = writeln!(
        out,
        "• Tasa de Conversión: {}",
        format_rate(m.conversion_rate)
    );
    out
}
