pub mod fetch;
pub mod mercadolibre;
pub mod zonaprop;

use async_trait::async_trait;
use pampa_core::{Listing, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

pub use mercadolibre::MercadoLibreScraper;
pub use zonaprop::ZonaPropScraper;

/// The property listing sources this crate knows how to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Portal {
    MercadoLibre,
    ZonaProp,
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Portal::MercadoLibre => write!(f, "MercadoLibre"),
            Portal::ZonaProp => write!(f, "ZonaProp"),
        }
    }
}

/// The filter set of one scrape run. Built once from flags or prompts
/// and never mutated afterwards. Ranges are taken as given: a min above
/// its max is not an error here, it simply yields a search with no
/// results.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub min_rooms: u32,
    pub max_rooms: u32,
    pub min_price: u64,
    pub max_price: u64,
    pub min_age: u32,
    pub max_age: u32,
    pub neighborhoods: Vec<String>,
    pub locality: String,
}

/// A filter set plus the pagination cursor. The cursor is a zero-based
/// page index; each portal maps it to its own scheme (result offset or
/// one-based page number).
#[derive(Debug, Clone)]
pub struct ScrapeQuery {
    pub filters: SearchFilters,
    pub page: u32,
}

impl ScrapeQuery {
    pub fn new(filters: SearchFilters) -> Self {
        Self { filters, page: 0 }
    }

    pub fn next_page(&mut self) {
        self.page += 1;
    }
}

/// One fetched-and-parsed results page. `total_results` is the result
/// count the portal reports on the page, when it could be read.
#[derive(Debug, Clone)]
pub struct ScrapedPage {
    pub listings: Vec<Listing>,
    pub total_results: Option<u64>,
}

/// Trait for scraping listing pages from a portal.
#[async_trait]
pub trait PortalScraper: Send + Sync {
    fn name(&self) -> &'static str;

    /// Builds the search URL for a query. Deterministic and infallible.
    fn build_url(&self, query: &ScrapeQuery) -> String;

    /// Fixed pause between successive page requests, to keep the
    /// request rate polite.
    fn page_delay(&self) -> Duration;

    /// Fetches and parses a single results page.
    async fn scrape_page(&self, query: &ScrapeQuery) -> Result<ScrapedPage>;

    /// Drives `scrape_page` across successive pages, accumulating
    /// listings until a page comes back empty or the portal's reported
    /// total has been reached. `max_pages` is an optional safety cap;
    /// by default the loop is bounded only by those two conditions.
    async fn collect_listings(
        &self,
        mut query: ScrapeQuery,
        max_pages: Option<u32>,
    ) -> Result<Vec<Listing>> {
        let mut all_listings = Vec::new();
        let mut total_results: Option<u64> = None;

        loop {
            if let Some(cap) = max_pages {
                if query.page >= cap {
                    info!("reached the page cap of {cap}, stopping");
                    break;
                }
            }

            let page = self.scrape_page(&query).await?;
            if total_results.is_none() {
                total_results = page.total_results;
                if let Some(total) = total_results {
                    info!("{} reports {} total results", self.name(), total);
                }
            }

            if page.listings.is_empty() {
                debug!("page {} came back empty, stopping", query.page);
                break;
            }
            all_listings.extend(page.listings);
            info!("accumulated {} listings", all_listings.len());

            if let Some(total) = total_results {
                if all_listings.len() as u64 >= total {
                    break;
                }
            }

            query.next_page();
            sleep(self.page_delay()).await;
        }

        Ok(all_listings)
    }
}

/// Factory for creating scraper instances.
pub struct ScraperFactory;

impl ScraperFactory {
    pub fn create(portal: Portal) -> Result<Arc<dyn PortalScraper>> {
        Ok(match portal {
            Portal::MercadoLibre => Arc::new(MercadoLibreScraper::new()?),
            Portal::ZonaProp => Arc::new(ZonaPropScraper::new()?),
        })
    }
}

/// Folds the accented characters that show up in Argentine place names
/// so they can be embedded in URL path segments.
pub(crate) fn fold_diacritics(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            _ => c,
        })
        .collect()
}

/// Lowercase, diacritic-free, hyphen-separated URL token for one place
/// name ("Villa Urquiza" → "villa-urquiza", "Núñez" → "nunez").
pub fn slug(input: &str) -> String {
    fold_diacritics(&input.trim().to_lowercase()).replace(' ', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_query_starts_at_page_zero() {
        let mut query = ScrapeQuery::new(SearchFilters::default());
        assert_eq!(query.page, 0);
        query.next_page();
        assert_eq!(query.page, 1);
    }

    #[test]
    fn slug_strips_diacritics_and_spaces() {
        assert_eq!(slug("Núñez"), "nunez");
        assert_eq!(slug("Villa Urquiza"), "villa-urquiza");
        assert_eq!(slug("  Agronomía "), "agronomia");
        assert_eq!(slug("Belgrano"), "belgrano");
    }
}
