use crate::fragdb::config;
use crate::metrics;
use reqwest::Client;
use reqwest::header::REFERER;
use tracing::warn;

// Error pages served with a 200 are shorter than any real thumbnail.
const MIN_IMAGE_BYTES: usize = 500;

/// Downloads one image from the asset origin. Any failure — transport,
/// status, or a body too small to be a real image — is a per-item miss,
/// never a run-level error.
pub async fn download_image(client: &Client, url: &str) -> Option<Vec<u8>> {
    let response = match client.get(url).header(REFERER, config::referer()).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(target = "sillage.images", url = url, error = %err, "image_fetch_failed");
            metrics::inc_image_downloads(false);
            return None;
        }
    };
    if !response.status().is_success() {
        warn!(
            target = "sillage.images",
            url = url,
            status = response.status().as_u16(),
            "image_http_error"
        );
        metrics::inc_image_downloads(false);
        return None;
    }
    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(target = "sillage.images", url = url, error = %err, "image_read_failed");
            metrics::inc_image_downloads(false);
            return None;
        }
    };
    if bytes.len() <= MIN_IMAGE_BYTES {
        warn!(
            target = "sillage.images",
            url = url,
            bytes = bytes.len(),
            "image_body_too_small"
        );
        metrics::inc_image_downloads(false);
        return None;
    }
    metrics::inc_image_downloads(true);
    Some(bytes.to_vec())
}
