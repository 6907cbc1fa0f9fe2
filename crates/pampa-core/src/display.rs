use crate::NeighborhoodSummary;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
pub struct SummaryTableRow {
    #[tabled(rename = "Barrio")]
    pub neighborhood: String,
    #[tabled(rename = "Precio Promedio x m2")]
    pub avg_price_per_m2: String,
    #[tabled(rename = "Metros Cuadrados Promedio")]
    pub avg_area_m2: String,
    #[tabled(rename = "Cantidad")]
    pub listings: String,
}

impl SummaryTableRow {
    pub fn from_summary(summary: &NeighborhoodSummary) -> Self {
        Self {
            neighborhood: summary.neighborhood.clone(),
            avg_price_per_m2: format_avg(summary.avg_price_per_m2),
            avg_area_m2: format_avg(summary.avg_area_m2),
            listings: summary.listings.to_string(),
        }
    }
}

fn format_avg(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "N/A".to_string())
}

/// Renders the per-neighborhood summary for the console.
pub fn summary_table(summaries: &[NeighborhoodSummary]) -> String {
    let rows: Vec<SummaryTableRow> = summaries.iter().map(SummaryTableRow::from_summary).collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    table.to_string()
}
