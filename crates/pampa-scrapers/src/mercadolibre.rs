use crate::{fetch, slug, PortalScraper, ScrapeQuery, ScrapedPage};
use async_trait::async_trait;
use pampa_core::{Listing, PampaError, Result, UNSPECIFIED};
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

const BASE_URL: &str = "https://inmuebles.mercadolibre.com.ar/departamentos/venta/apto-credito/";

/// Results per page served by the portal; the pagination cursor is an
/// offset in multiples of this.
pub const PAGE_SIZE: u32 = 48;

const PAGE_DELAY: Duration = Duration::from_secs(5);

// The portal pins the applied age filter in the URL fragment as well as
// in the path.
const AGE_FILTER_FRAGMENT: &str = "#applied_filter_id%3DPROPERTY_AGE\
%26applied_filter_name%3DAntig%C3%BCedad%26applied_filter_order%3D14\
%26applied_value_id%3D{age}%26applied_value_name%3D{age}\
%26applied_value_order%3D6%26applied_value_results%3DUNKNOWN_RESULTS%26is_custom%3Dtrue";

#[derive(Debug)]
pub struct MercadoLibreScraper {
    client: Client,
}

impl MercadoLibreScraper {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: fetch::build_client()?,
        })
    }

    fn parse_selector(selector: &str) -> Result<Selector> {
        Selector::parse(selector).map_err(|e| PampaError::Selector(e.to_string()))
    }

    fn create_selectors() -> Result<(
        Selector, // card
        Selector, // title anchor
        Selector, // price amount
        Selector, // location
        Selector, // attributes list
        Selector, // age label
    )> {
        Ok((
            Self::parse_selector("li.ui-search-layout__item")?,
            Self::parse_selector("a.poly-component__title")?,
            Self::parse_selector("span.andes-money-amount__fraction")?,
            Self::parse_selector("span.poly-component__location")?,
            Self::parse_selector("li.poly-attributes-list__item")?,
            Self::parse_selector("span.ui-search-card-attributes__attribute")?,
        ))
    }

    /// Parses one results page into listings plus the total-results
    /// count shown in the page header.
    pub fn parse_page(&self, html: &str) -> Result<ScrapedPage> {
        let document = Html::parse_document(html);
        let (card_sel, title_sel, price_sel, location_sel, attribute_sel, age_sel) =
            Self::create_selectors()?;

        let mut listings = Vec::new();
        for card in document.select(&card_sel) {
            // Title anchor is the one node a card cannot be read without:
            // it carries both the title text and the detail link.
            let title_anchor = card
                .select(&title_sel)
                .next()
                .ok_or(PampaError::MissingField { field: "title" })?;
            let title = element_text(title_anchor);
            let link = title_anchor
                .value()
                .attr("href")
                .ok_or(PampaError::MissingField { field: "link" })?
                .to_string();

            let price = select_text(card, &price_sel).unwrap_or_else(|| UNSPECIFIED.to_string());
            let (address, neighborhood, city) = split_location(select_text(card, &location_sel));

            let attributes: Vec<String> = card.select(&attribute_sel).map(element_text).collect();
            let (rooms, bathrooms, area) = assign_attributes(&attributes);

            let age = select_text(card, &age_sel).unwrap_or_else(|| UNSPECIFIED.to_string());

            listings.push(Listing {
                title,
                price,
                address,
                neighborhood,
                city,
                link,
                rooms,
                bathrooms,
                area,
                age,
            });
        }

        let total_results = parse_total_results(&document);
        Ok(ScrapedPage {
            listings,
            total_results,
        })
    }
}

#[async_trait]
impl PortalScraper for MercadoLibreScraper {
    fn name(&self) -> &'static str {
        "mercadolibre"
    }

    fn build_url(&self, query: &ScrapeQuery) -> String {
        let filters = &query.filters;

        let mut slugs: Vec<String> = filters.neighborhoods.iter().map(|n| slug(n)).collect();
        slugs.sort();
        let neighborhoods = slugs.join("-o-");

        let mut url = format!(
            "{BASE_URL}{}-a-{}-ambientes/{}/{}/departamentos",
            filters.min_rooms,
            filters.max_rooms,
            slug(&filters.locality),
            neighborhoods,
        );

        let offset = query.page * PAGE_SIZE;
        if offset > 0 {
            url.push_str(&format!("_Desde_{offset}"));
        }

        url.push_str(&format!(
            "_PriceRange_{}USD-{}USD_NoIndex_True_PROPERTY*AGE_{}-{}",
            filters.min_price, filters.max_price, filters.min_age, filters.max_age,
        ));
        let age = format!("{}-{}", filters.min_age, filters.max_age);
        url.push_str(&AGE_FILTER_FRAGMENT.replace("{age}", &age));
        url
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

// Card locations read "street, neighborhood, city". Anything that does
// not split into exactly those three parts is unusable as a hierarchy,
// so all three fields fall back to the sentinel together.
fn split_location(raw: Option<String>) -> (String, String, String) {
    if let Some(raw) = raw {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() == 3 {
            return (parts[0].to_string(), parts[1].to_string(), parts[2].to_string());
        }
    }
    (
        UNSPECIFIED.to_string(),
        UNSPECIFIED.to_string(),
        UNSPECIFIED.to_string(),
    )
}

// The attribute list items carry no semantic markup; the portal renders
// them in a fixed order. This is the single place that order is assumed.
// Expected: [rooms, bathrooms, area]; any other cardinality blanks all
// three fields together.
fn assign_attributes(values: &[String]) -> (String, String, String) {
    match values {
        [rooms, bathrooms, area] => (rooms.clone(), bathrooms.clone(), area.clone()),
        _ => (
            UNSPECIFIED.to_string(),
            UNSPECIFIED.to_string(),
            UNSPECIFIED.to_string(),
        ),
    }
}

// "1.234 resultados" → 1234. None when the label is missing or carries
// no digits, which callers treat as "no results".
fn parse_total_results(document: &Html) -> Option<u64> {
    static DIGITS_RE: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS_RE.get_or_init(|| Regex::new(r"\d+").expect("valid digits regex"));

    let selector = Selector::parse("span.ui-search-search-result__quantity-results").ok()?;
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
    use url::Url;

    fn filters() -> SearchFilters {
        SearchFilters {
            min_rooms: 2,
            max_rooms: 3,
            min_price: 80_000,
            max_price: 150_000,
            min_age: 0,
            max_age: 30,
            neighborhoods: vec!["Palermo".to_string(), "Belgrano".to_string(), "Núñez".to_string()],
            locality: "Capital Federal".to_string(),
        }
    }

    fn card(title: &str, price: &str, location: &str, attributes: &[&str], age: Option<&str>) -> String {
        let attrs: String = attributes
            .iter()
            .map(|a| format!(r#"<li class="poly-attributes-list__item">{a}</li>"#))
            .collect();
        let age = age
            .map(|a| format!(r#"<span class="ui-search-card-attributes__attribute">{a}</span>"#))
            .unwrap_or_default();
        format!(
            r#"<li class="ui-search-layout__item">
                 <a class="poly-component__title" href="https://inmueble.example.com/{title}">{title}</a>
                 <span class="andes-money-amount__fraction">{price}</span>
                 <span class="poly-component__location">{location}</span>
                 <ul>{attrs}</ul>
                 {age}
               </li>"#
        )
    }

    fn page(total: Option<u64>, cards: &[String]) -> String {
        let quantity = total
            .map(|t| {
                format!(r#"<span class="ui-search-search-result__quantity-results">{t} resultados</span>"#)
            })
            .unwrap_or_default();
        format!("<html><body>{quantity}<ol>{}</ol></body></html>", cards.join("\n"))
    }

    #[test]
    fn url_is_deterministic_and_well_formed() {
        let scraper = MercadoLibreScraper::new().unwrap();
        let query = ScrapeQuery::new(filters());

        let url = scraper.build_url(&query);
        assert_eq!(url, scraper.build_url(&query));
        Url::parse(&url).unwrap();

        assert!(url.starts_with(BASE_URL));
        assert!(url.contains("2-a-3-ambientes/capital-federal/"));
        // Neighborhood slugs are sorted and diacritic-free.
        assert!(url.contains("belgrano-o-nunez-o-palermo"));
        assert!(url.contains("_PriceRange_80000USD-150000USD"));
        assert!(url.contains("PROPERTY*AGE_0-30"));
        assert!(!url.contains("_Desde_"));
    }

    #[test]
    fn url_carries_the_result_offset_past_the_first_page() {
        let scraper = MercadoLibreScraper::new().unwrap();
        let mut query = ScrapeQuery::new(filters());
        query.next_page();

        let url = scraper.build_url(&query);
        assert!(url.contains("_Desde_48"));
        Url::parse(&url).unwrap();

        query.next_page();
        assert!(scraper.build_url(&query).contains("_Desde_96"));
    }

    #[test]
    fn well_formed_cards_parse_into_as_many_listings() {
        let scraper = MercadoLibreScraper::new().unwrap();
        let html = page(
            Some(2),
            &[
                card(
                    "Depto 2 amb",
                    "125.000",
                    "Av. Cabildo 2300, Belgrano, Capital Federal",
                    &["2 ambientes", "1 baño", "45 m²"],
                    Some("10 años"),
                ),
                card(
                    "Depto 3 amb",
                    "190.000",
                    "Echeverría 1500, Belgrano, Capital Federal",
                    &["3 ambientes", "2 baños", "72 m²"],
                    None,
                ),
            ],
        );

        let page = scraper.parse_page(&html).unwrap();
        assert_eq!(page.listings.len(), 2);
        assert_eq!(page.total_results, Some(2));

        let first = &page.listings[0];
        assert_eq!(first.title, "Depto 2 amb");
        assert!(!first.link.is_empty());
        assert_eq!(first.address, "Av. Cabildo 2300");
        assert_eq!(first.neighborhood, "Belgrano");
        assert_eq!(first.city, "Capital Federal");
        assert_eq!(first.rooms, "2 ambientes");
        assert_eq!(first.bathrooms, "1 baño");
        assert_eq!(first.area, "45 m²");
        assert_eq!(first.age, "10 años");

        assert_eq!(page.listings[1].age, UNSPECIFIED);
    }

    #[test]
    fn two_part_location_blanks_all_three_fields() {
        let scraper = MercadoLibreScraper::new().unwrap();
        let html = page(
            Some(1),
            &[card(
                "Depto",
                "100.000",
                "Belgrano, Capital Federal",
                &["2 ambientes", "1 baño", "45 m²"],
                None,
            )],
        );

        let listing = &scraper.parse_page(&html).unwrap().listings[0];
        assert_eq!(listing.address, UNSPECIFIED);
        assert_eq!(listing.neighborhood, UNSPECIFIED);
        assert_eq!(listing.city, UNSPECIFIED);
    }

    #[test]
    fn wrong_attribute_count_blanks_all_three_attributes() {
        let scraper = MercadoLibreScraper::new().unwrap();
        let html = page(
            Some(1),
            &[card(
                "Depto",
                "100.000",
                "Calle 1, Belgrano, Capital Federal",
                &["2 ambientes", "45 m²"],
                None,
            )],
        );

        let listing = &scraper.parse_page(&html).unwrap().listings[0];
        assert_eq!(listing.rooms, UNSPECIFIED);
        assert_eq!(listing.bathrooms, UNSPECIFIED);
        assert_eq!(listing.area, UNSPECIFIED);
    }

    #[test]
    fn card_without_title_anchor_fails_the_page() {
        let scraper = MercadoLibreScraper::new().unwrap();
        let html = page(
            Some(1),
            &[r#"<li class="ui-search-layout__item">
                   <span class="andes-money-amount__fraction">100.000</span>
                 </li>"#
                .to_string()],
        );

        match scraper.parse_page(&html) {
            Err(PampaError::MissingField { field }) => assert_eq!(field, "title"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn missing_price_falls_back_to_sentinel() {
        let scraper = MercadoLibreScraper::new().unwrap();
        let html = page(
            Some(1),
            &[r#"<li class="ui-search-layout__item">
                   <a class="poly-component__title" href="https://inmueble.example.com/x">Depto</a>
                 </li>"#
                .to_string()],
        );

        let listing = &scraper.parse_page(&html).unwrap().listings[0];
        assert_eq!(listing.price, UNSPECIFIED);
    }

    #[test]
    fn dotted_total_count_is_read_as_thousands() {
        let scraper = MercadoLibreScraper::new().unwrap();
        let html = r#"<html><body>
            <span class="ui-search-search-result__quantity-results">1.234 resultados</span>
        </body></html>"#;

        let page = scraper.parse_page(html).unwrap();
        assert_eq!(page.total_results, Some(1234));
        assert!(page.listings.is_empty());
    }

    #[test]
    fn page_without_quantity_label_has_no_total() {
        let scraper = MercadoLibreScraper::new().unwrap();
        let page = scraper.parse_page("<html><body></body></html>").unwrap();
        assert_eq!(page.total_results, None);
    }
}
