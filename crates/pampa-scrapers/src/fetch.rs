use pampa_core::{PampaError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Browser-like User-Agent; both portals serve a degraded page (or none
/// at all) to the default reqwest one.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/121.0 Safari/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_BASE_DELAY: Duration = Duration::from_secs(5);
const MAX_ATTEMPTS: u32 = 5;

pub fn build_client() -> Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Client for portals sitting behind automated-traffic checks: sends the
/// Accept headers a real browser would. Solving an actual challenge page
/// is not attempted; such a response fails the fetch like any other.
pub fn build_browser_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-AR,es;q=0.9,en;q=0.8"));

    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// GETs a page, retrying transient failures (transport errors, non-2xx
/// statuses, unreadable bodies) with exponential backoff. After
/// `MAX_ATTEMPTS` the URL is reported unreachable.
pub async fn fetch_html(client: &Client, url: &str) -> Result<String> {
    let mut delay = RETRY_BASE_DELAY;

    for attempt in 1..=MAX_ATTEMPTS {
        match client.get(url).send().await {
            Ok(response) => match response.error_for_status() {
                Ok(response) => match response.text().await {
                    Ok(body) => return Ok(body),
                    Err(e) => warn!("attempt {attempt}: failed to read body of {url}: {e}"),
                },
                Err(e) => warn!("attempt {attempt}: {url} answered with an error status: {e}"),
            },
            Err(e) => warn!("attempt {attempt}: request to {url} failed: {e}"),
        }

        if attempt < MAX_ATTEMPTS {
            sleep(delay).await;
            delay *= 2;
        }
    }

    Err(PampaError::Unreachable {
        url: url.to_string(),
        attempts: MAX_ATTEMPTS,
    })
}
