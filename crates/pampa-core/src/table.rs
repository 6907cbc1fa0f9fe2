use crate::Listing;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// One row of the normalized listing table: the raw card fields plus the
/// derived price columns. Unparseable numbers stay `None` and propagate
/// as `None` through every derived column, never as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    #[serde(rename = "Título")]
    pub title: String,
    #[serde(rename = "Precio (US$)", serialize_with = "round2_opt")]
    pub price: Option<f64>,
    #[serde(rename = "Dirección")]
    pub address: String,
    #[serde(rename = "Barrio")]
    pub neighborhood: String,
    #[serde(rename = "Ciudad")]
    pub city: String,
    #[serde(rename = "Link")]
    pub link: String,
    #[serde(rename = "Ambientes")]
    pub rooms: String,
    #[serde(rename = "Baños")]
    pub bathrooms: String,
    #[serde(rename = "Metros Cuadrados")]
    pub area: String,
    #[serde(rename = "Antigüedad")]
    pub age: String,
    #[serde(rename = "Metros Cuadrados Limpios", serialize_with = "round2_opt")]
    pub area_m2: Option<f64>,
    #[serde(rename = "$ x m2", serialize_with = "round2_opt")]
    pub price_per_m2: Option<f64>,
    #[serde(rename = "Promedio $ x m2", serialize_with = "round2_opt")]
    pub neighborhood_avg: Option<f64>,
    #[serde(rename = "Diferencia con Promedio", serialize_with = "round2_opt")]
    pub avg_deviation: Option<f64>,
}

/// Per-neighborhood aggregates over the normalized table.
///
/// `listings` counts every raw row of the neighborhood, including rows
/// whose price or area failed to parse. The upstream reports have always
/// counted that way, so the quirk is kept rather than silently corrected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborhoodSummary {
    #[serde(rename = "Barrio")]
    pub neighborhood: String,
    #[serde(rename = "Precio Promedio x m2", serialize_with = "round2_opt")]
    pub avg_price_per_m2: Option<f64>,
    #[serde(rename = "Metros Cuadrados Promedio", serialize_with = "round2_opt")]
    pub avg_area_m2: Option<f64>,
    #[serde(rename = "Cantidad de Departamentos")]
    pub listings: u64,
}

/// A cheapest-or-dearest listing for one neighborhood.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceExtreme {
    #[serde(rename = "Barrio")]
    pub neighborhood: String,
    #[serde(rename = "Título")]
    pub title: String,
    #[serde(rename = "Precio (US$)", serialize_with = "round2")]
    pub price: f64,
    #[serde(rename = "Link")]
    pub link: String,
}

// Rounding happens only at the serialization boundary; the rows keep
// full precision for any further computation.
fn round2<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value * 100.0).round() / 100.0)
}

fn round2_opt<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => round2(v, serializer),
        None => serializer.serialize_none(),
    }
}

/// Parses a price string as scraped from a card: strips the currency
/// markers and the es-AR thousands separators, then reads a decimal.
/// Anything that still fails to parse becomes `None`.
pub fn clean_price(raw: &str) -> Option<f64> {
    let cleaned = raw
        .trim()
        .replace("U$S", "")
        .replace("US$", "")
        .replace("USD", "")
        .replace('$', "")
        .replace('.', "")
        .replace(',', "")
        .trim()
        .to_string();

    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Extracts the leading numeric token of an area string ("45 m²",
/// "120 m² tot."). `None` when no digits lead the string.
pub fn clean_area(raw: &str) -> Option<f64> {
    static AREA_RE: OnceLock<Regex> = OnceLock::new();
    let re = AREA_RE.get_or_init(|| Regex::new(r"^(\d+(?:\.\d+)?)").expect("valid area regex"));
    re.captures(raw.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Builds the normalized table from the accumulated listings: cleans the
/// numeric columns, derives price per m², and broadcasts each
/// neighborhood's average back onto its rows.
pub fn normalize(listings: &[Listing]) -> Vec<ReportRow> {
    let mut rows: Vec<ReportRow> = listings
        .iter()
        .map(|listing| {
            let price = clean_price(&listing.price);
            let area_m2 = clean_area(&listing.area);
            let price_per_m2 = match (price, area_m2) {
                (Some(p), Some(a)) if a != 0.0 => Some(p / a),
                _ => None,
            };
            ReportRow {
                title: listing.title.clone(),
                price,
                address: listing.address.clone(),
                neighborhood: listing.neighborhood.clone(),
                city: listing.city.clone(),
                link: listing.link.clone(),
                rooms: listing.rooms.clone(),
                bathrooms: listing.bathrooms.clone(),
                area: listing.area.clone(),
                age: listing.age.clone(),
                area_m2,
                price_per_m2,
                neighborhood_avg: None,
                avg_deviation: None,
            }
        })
        .collect();

    let averages = neighborhood_averages(&rows);
    for row in &mut rows {
        row.neighborhood_avg = averages.get(&row.neighborhood).copied();
        row.avg_deviation = match (row.price_per_m2, row.neighborhood_avg) {
            (Some(ppm2), Some(avg)) => Some(ppm2 - avg),
            _ => None,
        };
    }
    rows
}

// Mean of price per m² per neighborhood, skipping rows where it could
// not be derived. A neighborhood with no derivable rows has no average.
fn neighborhood_averages(rows: &[ReportRow]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for row in rows {
        if let Some(ppm2) = row.price_per_m2 {
            let entry = sums.entry(row.neighborhood.clone()).or_insert((0.0, 0));
            entry.0 += ppm2;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(neighborhood, (sum, count))| (neighborhood, sum / f64::from(count)))
        .collect()
}

/// Per-neighborhood mean price per m², mean area and listing count,
/// ordered by neighborhood.
pub fn summarize(rows: &[ReportRow]) -> Vec<NeighborhoodSummary> {
    let mut groups: BTreeMap<&str, Vec<&ReportRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(&row.neighborhood).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|(neighborhood, group)| NeighborhoodSummary {
            neighborhood: neighborhood.to_string(),
            avg_price_per_m2: mean(group.iter().filter_map(|r| r.price_per_m2)),
            avg_area_m2: mean(group.iter().filter_map(|r| r.area_m2)),
            listings: group.len() as u64,
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0u32;
    for value in values {
        sum += value;
        count += 1;
    }
    (count > 0).then(|| sum / f64::from(count))
}

/// The cheapest and dearest listings of each neighborhood, by raw price.
/// Ties are all kept; the union is de-duplicated so a lone listing shows
/// up once even though it is both extremes. Rows whose price failed to
/// parse do not participate.
pub fn price_extremes(rows: &[ReportRow]) -> Vec<PriceExtreme> {
    let mut groups: BTreeMap<&str, Vec<&ReportRow>> = BTreeMap::new();
    for row in rows {
        if row.price.is_some() {
            groups.entry(&row.neighborhood).or_default().push(row);
        }
    }

    let mut extremes = Vec::new();
    for (_, group) in groups {
        let min = group.iter().filter_map(|r| r.price).fold(f64::INFINITY, f64::min);
        let max = group
            .iter()
            .filter_map(|r| r.price)
            .fold(f64::NEG_INFINITY, f64::max);

        for row in group {
            let price = match row.price {
                Some(p) if p == min || p == max => p,
                _ => continue,
            };
            let extreme = PriceExtreme {
                neighborhood: row.neighborhood.clone(),
                title: row.title.clone(),
                price,
                link: row.link.clone(),
            };
            if !extremes.contains(&extreme) {
                extremes.push(extreme);
            }
        }
    }
    extremes
}
