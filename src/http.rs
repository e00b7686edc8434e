use crate::fragdb::config::USER_AGENT;
use reqwest::Client;
use std::time::Duration;

/// Shared client for both the listing site and the asset origin: realistic
/// browser identity, fixed per-request timeouts. The backoff loop, not the
/// client, decides how long to wait between requests.
pub fn build_client() -> Client {
    let timeout = std::env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(15);
    let connect = std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    Client::builder()
        .user_agent(USER_AGENT.as_str())
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}
