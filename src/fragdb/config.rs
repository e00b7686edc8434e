use once_cell::sync::Lazy;
use std::env;

pub static LISTING_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("SILLAGE_LISTING_ROOT").unwrap_or_else(|_| "https://www.fragrantica.com".to_string())
});

// The asset origin is a separate host that is not behind the listing
// site's anti-bot layer, which is why downloads run as their own phase.
pub static ASSET_ROOT: Lazy<String> =
    Lazy::new(|| env::var("SILLAGE_ASSET_ROOT").unwrap_or_else(|_| "https://fimgs.net".to_string()));

pub static USER_AGENT: Lazy<String> = Lazy::new(|| {
    env::var("SILLAGE_USER_AGENT").unwrap_or_else(|_| {
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36"
            .to_string()
    })
});

pub static CANARY_QUERY: Lazy<String> =
    Lazy::new(|| env::var("SILLAGE_CANARY_QUERY").unwrap_or_else(|_| "chanel".to_string()));

pub fn designer_url(slug: &str) -> String {
    format!("{}/designers/{}.html", *LISTING_ROOT, slug)
}

pub fn search_url(query: &str) -> String {
    format!("{}/search/?query={}", *LISTING_ROOT, urlencoding::encode(query))
}

pub fn image_url_for(remote_id: u64) -> String {
    format!("{}/mdimg/perfume-thumbs/375x500.{remote_id}.jpg", *ASSET_ROOT)
}

pub fn referer() -> String {
    format!("{}/", *LISTING_ROOT)
}
