use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PampaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} unreachable after {attempts} attempts")]
    Unreachable { url: String, attempts: u32 },
    #[error("invalid selector: {0}")]
    Selector(String),
    #[error("listing card is missing required field `{field}`")]
    MissingField { field: &'static str },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, PampaError>;
