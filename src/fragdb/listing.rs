use crate::fragdb::config;
use crate::metrics;
use crate::models::CatalogEntry;
use crate::rules::Rules;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use tracing::warn;

/// Tri-state outcome of fetching one designer listing. `RateLimited` is
/// decided from the body alone, whatever the HTTP status was.
#[derive(Debug, Clone, PartialEq)]
pub enum DesignerPage {
    Listed(Vec<CatalogEntry>),
    RateLimited,
    Empty,
}

static PERFUME_ANCHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="/perfume/"]"#).expect("anchor selector"));
static CHILD_IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("img selector"));
static REMOTE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\d+)\.html$").expect("id pattern"));

/// Anti-bot classification. Runs before any parsing so a decoy page never
/// gets mistaken for an empty listing.
pub fn is_blocked(body: &str, rules: &Rules) -> bool {
    let lower = body.to_lowercase();
    rules
        .blocked_signatures
        .iter()
        .any(|signature| lower.contains(signature.as_str()))
}

pub fn remote_id_from(href: &str) -> Option<u64> {
    REMOTE_ID
        .captures(href)?
        .get(1)
        .and_then(|digits| digits.as_str().parse().ok())
}

/// Extraction contract: every anchor into the per-item URL space that ends
/// in the expected suffix and yields a numeric id. Display name is the
/// first non-empty text fragment; anchors that repeat an id (thumbnail +
/// title links for the same item) collapse onto the first occurrence.
pub fn extract_entries(body: &str) -> Vec<CatalogEntry> {
    let document = Html::parse_document(body);
    let mut seen: BTreeSet<u64> = BTreeSet::new();
    let mut entries = Vec::new();
    for anchor in document.select(&PERFUME_ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.ends_with(".html") {
            continue;
        }
        let Some(remote_id) = remote_id_from(href) else {
            continue;
        };
        let Some(display_name) = anchor
            .text()
            .map(str::trim)
            .find(|fragment| !fragment.is_empty())
        else {
            continue;
        };
        if !seen.insert(remote_id) {
            continue;
        }
        let has_image = anchor.select(&CHILD_IMG).next().is_some();
        entries.push(CatalogEntry {
            display_name: display_name.to_string(),
            remote_id,
            remote_url: absolutize(href),
            has_image,
        });
    }
    entries
}

fn absolutize(href: &str) -> String {
    if href.starts_with('/') {
        format!("{}{}", *config::LISTING_ROOT, href)
    } else {
        href.to_string()
    }
}

/// Fetches one namespace's listing page. Transport and read errors degrade
/// to `Empty` for that namespace; the run moves on.
pub async fn fetch_designer(client: &Client, slug: &str, rules: &Rules) -> DesignerPage {
    metrics::inc_listing_fetches();
    let url = config::designer_url(slug);
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(target = "sillage.crawl", namespace = slug, error = %err, "listing_fetch_failed");
            return DesignerPage::Empty;
        }
    };
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => {
            warn!(target = "sillage.crawl", namespace = slug, error = %err, "listing_read_failed");
            return DesignerPage::Empty;
        }
    };
    if is_blocked(&body, rules) {
        return DesignerPage::RateLimited;
    }
    if !status.is_success() {
        warn!(
            target = "sillage.crawl",
            namespace = slug,
            status = status.as_u16(),
            "listing_http_error"
        );
        return DesignerPage::Empty;
    }
    let entries = extract_entries(&body);
    if entries.is_empty() {
        DesignerPage::Empty
    } else {
        DesignerPage::Listed(entries)
    }
}

/// Lightweight canary used by the backoff loop: true once the remote is
/// serving regular content again.
pub async fn probe(client: &Client, rules: &Rules) -> bool {
    let url = config::search_url(&config::CANARY_QUERY);
    match client.get(&url).send().await {
        Ok(response) => match response.text().await {
            Ok(body) => !is_blocked(&body, rules),
            Err(_) => false,
        },
        Err(_) => false,
    }
}
