use serde::{Deserialize, Serialize};

mod display;
mod error;
mod report;
mod table;

pub use display::{summary_table, SummaryTableRow};
pub use error::{PampaError, Result};
pub use report::{ReportWriter, EXTREMES_FILE, LISTINGS_FILE, SUMMARY_FILE};
pub use table::{
    clean_area, clean_price, normalize, price_extremes, summarize, NeighborhoodSummary,
    PriceExtreme, ReportRow,
};

/// Placeholder stored for any optional card field that could not be
/// extracted. Kept in Spanish because it flows verbatim into the reports.
pub const UNSPECIFIED: &str = "No especificado";

/// One scraped property listing, as read from a results-page card.
///
/// Every field is kept as the raw text found in the markup; numeric
/// cleanup happens later, when the rows are normalized. Optional fields
/// that were absent hold [`UNSPECIFIED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub title: String,
    pub price: String,
    pub address: String,
    pub neighborhood: String,
    pub city: String,
    pub link: String,
    pub rooms: String,
    pub bathrooms: String,
    pub area: String,
    pub age: String,
}
