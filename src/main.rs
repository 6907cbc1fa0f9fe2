use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pampa_core::{normalize, price_extremes, summarize, summary_table, ReportWriter};
use pampa_scrapers::{
    Portal, PortalScraper, ScrapeQuery, ScraperFactory, SearchFilters, ZonaPropScraper,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, Level};

/// Localities the MercadoLibre URL scheme accepts, as shown in the
/// interactive menu.
const LOCALITIES: [&str; 24] = [
    "Brasil",
    "BsAs GBA Norte",
    "BsAs GBA Sur",
    "BsAs Costa Atlantica",
    "BsAs Oeste",
    "Buenos Aires Interior",
    "Capital Federal",
    "Chubut",
    "Cordoba",
    "Corrientes",
    "Chaco",
    "Entre Rios",
    "La rioja",
    "Mendoza",
    "Misiones",
    "Neuquen",
    "Rio Negro",
    "Salta",
    "San Juan",
    "San Luis",
    "Santa Fe",
    "Tucuman",
    "Uruguay",
    "USA",
];

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Portal to scrape (-x, --portal)
    #[arg(short = 'x', long, value_enum, default_value_t = CliPortal::Mercadolibre)]
    portal: CliPortal,

    /// Pre-built ZonaProp results URL; implies --portal zonaprop and
    /// skips the filter prompts (-u, --url)
    #[arg(short = 'u', long)]
    url: Option<String>,

    /// Minimum number of rooms
    #[arg(long)]
    min_rooms: Option<u32>,

    /// Maximum number of rooms
    #[arg(long)]
    max_rooms: Option<u32>,

    /// Minimum price in USD
    #[arg(long)]
    min_price: Option<u64>,

    /// Maximum price in USD
    #[arg(long)]
    max_price: Option<u64>,

    /// Minimum property age in years
    #[arg(long)]
    min_age: Option<u32>,

    /// Maximum property age in years
    #[arg(long)]
    max_age: Option<u32>,

    /// Comma-separated neighborhood names (-b, --barrios)
    #[arg(short = 'b', long = "barrios", value_delimiter = ',')]
    neighborhoods: Vec<String>,

    /// Locality to search in (MercadoLibre only); prompted from a menu
    /// when omitted (-l, --localidad)
    #[arg(short = 'l', long = "localidad")]
    locality: Option<String>,

    /// Maximum number of pages to fetch; unbounded by default
    #[arg(short = 'c', long)]
    max_pages: Option<u32>,

    /// Directory the CSV reports are written to (-o, --output-dir)
    #[arg(short = 'o', long, default_value = "informes")]
    output_dir: PathBuf,

    /// Append a datetime suffix to the output directory, keeping
    /// earlier runs around
    #[arg(long)]
    timestamp: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliPortal {
    Mercadolibre,
    Zonaprop,
}

impl From<CliPortal> for Portal {
    fn from(value: CliPortal) -> Self {
        match value {
            CliPortal::Mercadolibre => Portal::MercadoLibre,
            CliPortal::Zonaprop => Portal::ZonaProp,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let portal: Portal = cli.portal.into();

    let (scraper, filters): (Arc<dyn PortalScraper>, SearchFilters) = match &cli.url {
        Some(url) => {
            let scraper = ZonaPropScraper::from_listing_url(url)
                .context("the URL passed via --url is not usable")?;
            (Arc::new(scraper), SearchFilters::default())
        }
        None => {
            let filters = resolve_filters(&cli, portal)?;
            (ScraperFactory::create(portal)?, filters)
        }
    };

    let query = ScrapeQuery::new(filters);
    let listings = scraper
        .collect_listings(query, cli.max_pages)
        .await
        .with_context(|| format!("scraping {portal} failed"))?;
    info!("collected {} listings in total", listings.len());

    let rows = normalize(&listings);
    let summaries = summarize(&rows);
    let extremes = price_extremes(&rows);

    let writer = ReportWriter::new(&cli.output_dir, cli.timestamp)?;
    let dir = writer.write_all(&rows, &summaries, &extremes)?;
    info!("reports written to {}", dir.display());

    if !summaries.is_empty() {
        println!("{}", summary_table(&summaries));
    }

    Ok(())
}

/// Fills in whatever filter values were not passed as flags by asking
/// on stdin.
fn resolve_filters(cli: &Cli, portal: Portal) -> Result<SearchFilters> {
    let min_rooms = resolve(cli.min_rooms, "Ingrese la cantidad mínima de ambientes")?;
    let max_rooms = resolve(cli.max_rooms, "Ingrese la cantidad máxima de ambientes")?;
    let min_price = resolve(cli.min_price, "Ingrese el precio mínimo en USD")?;
    let max_price = resolve(cli.max_price, "Ingrese el precio máximo en USD")?;
    let min_age = resolve(cli.min_age, "Ingrese la antigüedad mínima")?;
    let max_age = resolve(cli.max_age, "Ingrese la antigüedad máxima")?;

    let neighborhoods = if cli.neighborhoods.is_empty() {
        prompt_neighborhoods()?
    } else {
        cli.neighborhoods.clone()
    };

    let locality = match portal {
        Portal::MercadoLibre => match &cli.locality {
            Some(locality) => locality.clone(),
            None => prompt_locality()?,
        },
        // The ZonaProp URL scheme has no locality segment.
        Portal::ZonaProp => String::new(),
    };

    Ok(SearchFilters {
        min_rooms,
        max_rooms,
        min_price,
        max_price,
        min_age,
        max_age,
        neighborhoods,
        locality,
    })
}

fn resolve<T: FromStr + Copy>(flag: Option<T>, label: &str) -> Result<T> {
    match flag {
        Some(value) => Ok(value),
        None => prompt_number(label),
    }
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_number<T: FromStr>(label: &str) -> Result<T> {
    loop {
        match prompt_line(label)?.parse() {
            Ok(value) => return Ok(value),
            Err(_) => println!("Entrada inválida. Por favor, ingrese un número."),
        }
    }
}

fn prompt_neighborhoods() -> Result<Vec<String>> {
    loop {
        let line = prompt_line("Ingrese los barrios separados por comas (,)")?;
        let neighborhoods: Vec<String> = line
            .split(',')
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if !neighborhoods.is_empty() {
            return Ok(neighborhoods);
        }
        println!("Debe ingresar al menos un barrio.");
    }
}

fn prompt_locality() -> Result<String> {
    println!("Seleccione la localidad:");
    for (i, locality) in LOCALITIES.iter().enumerate() {
        println!("{}. {locality}", i + 1);
    }

    loop {
        match prompt_line("Ingrese el número correspondiente a la localidad")?.parse::<usize>() {
            Ok(choice) if (1..=LOCALITIES.len()).contains(&choice) => {
                return Ok(LOCALITIES[choice - 1].to_string());
            }
            Ok(_) => println!("Número inválido. Por favor, intente nuevamente."),
            Err(_) => println!("Entrada inválida. Por favor, ingrese un número."),
        }
    }
}
