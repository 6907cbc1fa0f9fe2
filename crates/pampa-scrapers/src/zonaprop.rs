use crate::{fetch, fold_diacritics, PortalScraper, ScrapeQuery, ScrapedPage};
use async_trait::async_trait;
use pampa_core::{Listing, PampaError, Result, UNSPECIFIED};
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;
use url::Url;

const BASE_URL: &str = "https://www.zonaprop.com.ar";
const PAGE_SUFFIX: &str = "-pagina-";
const HTML_EXTENSION: &str = ".html";

const PAGE_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub struct ZonaPropScraper {
    client: Client,
    // Set when the caller supplies a ready-made listing URL; the filter
    // set is ignored for URL construction in that case.
    base_url: Option<String>,
}

impl ZonaPropScraper {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: fetch::build_browser_client()?,
            base_url: None,
        })
    }

    /// Builds a scraper around a pre-built listing URL, as copied from
    /// the browser. The trailing `.html` is stripped so page suffixes
    /// can be appended.
    pub fn from_listing_url(listing_url: &str) -> Result<Self> {
        Url::parse(listing_url)?;
        let base = listing_url
            .strip_suffix(HTML_EXTENSION)
            .unwrap_or(listing_url)
            .to_string();
        Ok(Self {
            client: fetch::build_browser_client()?,
            base_url: Some(base),
        })
    }

    fn parse_selector(selector: &str) -> Result<Selector> {
        Selector::parse(selector).map_err(|e| PampaError::Selector(e.to_string()))
    }

    fn create_selectors() -> Result<(
        Selector, // property card
        Selector, // price
        Selector, // address
        Selector, // location heading
        Selector, // main features
    )> {
        // Class names on this portal carry build hashes
        // ("…-module__location-address__k8Ip7"), so they are matched by
        // prefix instead of verbatim.
        Ok((
            Self::parse_selector(r#"div[data-posting-type="PROPERTY"]"#)?,
            Self::parse_selector(r#"div[data-qa="POSTING_CARD_PRICE"]"#)?,
            Self::parse_selector(r#"div[class^="postingLocations-module__location-address"]"#)?,
            Self::parse_selector(r#"h2[data-qa="POSTING_CARD_LOCATION"]"#)?,
            Self::parse_selector(r#"span[class^="postingMainFeatures-module__posting-main-features-span"]"#)?,
        ))
    }

    /// Parses one results page. The card has no title node of its own;
    /// the address heading doubles as the listing title, and the
    /// location heading fills both the neighborhood and the city.
    pub fn parse_page(&self, html: &str) -> Result<ScrapedPage> {
        let document = Html::parse_document(html);
        let (card_sel, price_sel, address_sel, location_sel, features_sel) =
            Self::create_selectors()?;

        let mut listings = Vec::new();
        for card in document.select(&card_sel) {
            let link = card
                .value()
                .attr("data-to-posting")
                .map(|path| format!("{BASE_URL}{path}"))
                .ok_or(PampaError::MissingField { field: "link" })?;

            let price = select_text(card, &price_sel)
                .ok_or(PampaError::MissingField { field: "price" })?;

            let address =
                select_text(card, &address_sel).unwrap_or_else(|| UNSPECIFIED.to_string());
            let location =
                select_text(card, &location_sel).unwrap_or_else(|| UNSPECIFIED.to_string());

            let features: Vec<String> = card.select(&features_sel).map(element_text).collect();
            let (area, rooms, bathrooms) = assign_features(&features);

            listings.push(Listing {
                title: address.clone(),
                price,
                address,
                neighborhood: location.clone(),
                city: location,
                link,
                rooms,
                bathrooms,
                area,
                age: UNSPECIFIED.to_string(),
            });
        }

        let total_results = parse_total_results(&document);
        Ok(ScrapedPage {
            listings,
            total_results,
        })
    }

    fn search_base(&self, query: &ScrapeQuery) -> String {
        if let Some(base) = &self.base_url {
            return base.clone();
        }

        let filters = &query.filters;
        let neighborhoods = filters
            .neighborhoods
            .iter()
            .map(|n| fold_diacritics(&n.trim().to_lowercase()).replace(' ', ""))
            .collect::<Vec<_>>()
            .join("-");

        format!(
            "{BASE_URL}/departamentos-ph-venta-{}-con-apto-credito-desde-{}-hasta-{}-ambientes-hasta-{}-anos-{}-{}-dolar",
            neighborhoods,
            filters.min_rooms,
            filters.max_rooms,
            filters.max_age,
            filters.min_price,
            filters.max_price,
        )
    }
}

#[async_trait]
impl PortalScraper for ZonaPropScraper {
    fn name(&self) -> &'static str {
        "zonaprop"
    }

    fn build_url(&self, query: &ScrapeQuery) -> String {
        let base = self.search_base(query);
        if query.page == 0 {
            format!("{base}{HTML_EXTENSION}")
        } else {
            // Page numbers on the portal are one-based.
            format!("{base}{PAGE_SUFFIX}{}{HTML_EXTENSION}", query.page + 1)
        }
    }

    fn page_delay(&self) -> Duration {
        PAGE_DELAY
    }

    async fn scrape_page(&self, query: &ScrapeQuery) -> Result<ScrapedPage> {
        let url = self.build_url(query);
        info!("scraping {url}");
        let html = fetch::fetch_html(&self.client, &url).await?;
        self.parse_page(&html)
    }
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn select_text(card: ElementRef, selector: &Selector) -> Option<String> {
    card.select(selector).next().map(element_text)
}

// Feature spans are rendered in a fixed order: total area, rooms,
// bedrooms, bathrooms. This card style fills whatever prefix is present
// instead of discarding the lot; the bedroom count is not reported.
fn assign_features(values: &[String]) -> (String, String, String) {
    let get = |idx: usize| {
        values
            .get(idx)
            .cloned()
            .unwrap_or_else(|| UNSPECIFIED.to_string())
    };
    (get(0), get(1), get(3))
}

// The results heading reads like "1.446 departamentos en venta…"; its
// leading number is the total result count.
fn parse_total_results(document: &Html) -> Option<u64> {
    static DIGITS_RE: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS_RE.get_or_init(|| Regex::new(r"\d+").expect("valid digits regex"));

    let selector = Selector::parse("h1").ok()?;
    let text = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>()
        .replace('.', "");
    re.find(&text)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SearchFilters;

    fn filters() -> SearchFilters {
        SearchFilters {
            min_rooms: 2,
            max_rooms: 4,
            min_price: 90_000,
            max_price: 200_000,
            min_age: 0,
            max_age: 20,
            neighborhoods: vec!["Villa Urquiza".to_string(), "Núñez".to_string()],
            locality: String::new(),
        }
    }

    fn card(posting: &str, price: &str, address: &str, location: &str, features: &[&str]) -> String {
        let features: String = features
            .iter()
            .map(|f| {
                format!(
                    r#"<span class="postingMainFeatures-module__posting-main-features-span__ror2o">{f}</span>"#
                )
            })
            .collect();
        format!(
            r#"<div data-posting-type="PROPERTY" data-to-posting="{posting}">
                 <div data-qa="POSTING_CARD_PRICE">{price}</div>
                 <div class="postingLocations-module__location-address__k8Ip7">{address}</div>
                 <h2 data-qa="POSTING_CARD_LOCATION">{location}</h2>
                 {features}
               </div>"#
        )
    }

    fn page(heading: &str, cards: &[String]) -> String {
        format!("<html><body><h1>{heading}</h1>{}</body></html>", cards.join("\n"))
    }

    #[test]
    fn url_is_deterministic_and_well_formed() {
        let scraper = ZonaPropScraper::new().unwrap();
        let query = ScrapeQuery::new(filters());

        let url = scraper.build_url(&query);
        assert_eq!(url, scraper.build_url(&query));
        Url::parse(&url).unwrap();

        assert_eq!(
            url,
            "https://www.zonaprop.com.ar/departamentos-ph-venta-villaurquiza-nunez-con-apto-credito-desde-2-hasta-4-ambientes-hasta-20-anos-90000-200000-dolar.html"
        );
    }

    #[test]
    fn pages_past_the_first_get_a_one_based_suffix() {
        let scraper = ZonaPropScraper::new().unwrap();
        let mut query = ScrapeQuery::new(filters());
        query.next_page();

        assert!(scraper.build_url(&query).ends_with("-dolar-pagina-2.html"));
    }

    #[test]
    fn prebuilt_listing_url_replaces_the_builder() {
        let scraper = ZonaPropScraper::from_listing_url(
            "https://www.zonaprop.com.ar/departamentos-venta-palermo.html",
        )
        .unwrap();
        let mut query = ScrapeQuery::new(SearchFilters::default());

        assert_eq!(
            scraper.build_url(&query),
            "https://www.zonaprop.com.ar/departamentos-venta-palermo.html"
        );
        query.next_page();
        assert_eq!(
            scraper.build_url(&query),
            "https://www.zonaprop.com.ar/departamentos-venta-palermo-pagina-2.html"
        );
    }

    #[test]
    fn rejects_an_invalid_prebuilt_url() {
        assert!(ZonaPropScraper::from_listing_url("not a url").is_err());
    }

    #[test]
    fn cards_parse_with_location_filling_neighborhood_and_city() {
        let scraper = ZonaPropScraper::new().unwrap();
        let html = page(
            "2 departamentos en venta en Belgrano",
            &[
                card(
                    "/propiedades/depto-1.html",
                    "USD 120.000",
                    "Av. Cabildo 2300",
                    "Belgrano, Capital Federal",
                    &["45 m² tot.", "2 amb.", "1 dorm.", "1 baño"],
                ),
                card(
                    "/propiedades/depto-2.html",
                    "USD 185.000",
                    "Echeverría 1500",
                    "Belgrano, Capital Federal",
                    &["72 m² tot.", "3 amb.", "2 dorm.", "2 baños"],
                ),
            ],
        );

        let page = scraper.parse_page(&html).unwrap();
        assert_eq!(page.listings.len(), 2);
        assert_eq!(page.total_results, Some(2));

        let first = &page.listings[0];
        assert_eq!(first.link, "https://www.zonaprop.com.ar/propiedades/depto-1.html");
        assert_eq!(first.title, "Av. Cabildo 2300");
        assert_eq!(first.address, "Av. Cabildo 2300");
        assert_eq!(first.neighborhood, "Belgrano, Capital Federal");
        assert_eq!(first.city, first.neighborhood);
        assert_eq!(first.area, "45 m² tot.");
        assert_eq!(first.rooms, "2 amb.");
        assert_eq!(first.bathrooms, "1 baño");
        assert_eq!(first.age, UNSPECIFIED);
    }

    #[test]
    fn short_feature_list_fills_what_it_can() {
        let scraper = ZonaPropScraper::new().unwrap();
        let html = page(
            "1 departamento en venta",
            &[card(
                "/propiedades/depto.html",
                "USD 99.000",
                "Calle 1",
                "Palermo",
                &["50 m² tot.", "2 amb."],
            )],
        );

        let listing = &scraper.parse_page(&html).unwrap().listings[0];
        assert_eq!(listing.area, "50 m² tot.");
        assert_eq!(listing.rooms, "2 amb.");
        assert_eq!(listing.bathrooms, UNSPECIFIED);
    }

    #[test]
    fn card_without_price_fails_the_page() {
        let scraper = ZonaPropScraper::new().unwrap();
        let html = page(
            "1 departamento en venta",
            &[r#"<div data-posting-type="PROPERTY" data-to-posting="/x.html"></div>"#.to_string()],
        );

        match scraper.parse_page(&html) {
            Err(PampaError::MissingField { field }) => assert_eq!(field, "price"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn card_without_posting_link_fails_the_page() {
        let scraper = ZonaPropScraper::new().unwrap();
        let html = page(
            "1 departamento en venta",
            &[r#"<div data-posting-type="PROPERTY"><div data-qa="POSTING_CARD_PRICE">USD 1</div></div>"#.to_string()],
        );

        match scraper.parse_page(&html) {
            Err(PampaError::MissingField { field }) => assert_eq!(field, "link"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn dotted_heading_count_is_read_as_thousands() {
        let scraper = ZonaPropScraper::new().unwrap();
        let html = page("1.446 departamentos en venta en Palermo", &[]);

        let page = scraper.parse_page(&html).unwrap();
        assert_eq!(page.total_results, Some(1446));
        assert!(page.listings.is_empty());
    }
}
