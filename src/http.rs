use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

/// Client for the catalog session. Cookies persist across page and detail
/// requests so the remote sees one continuous session.
pub fn build_session_client() -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .cookie_store(true)
        .timeout(Duration::from_secs(timeout_secs()))
        .connect_timeout(Duration::from_secs(connect_timeout_secs()))
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub fn build_client() -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs()))
        .connect_timeout(Duration::from_secs(connect_timeout_secs()))
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn timeout_secs() -> u64 {
    std::env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(15)
}

fn connect_timeout_secs() -> u64 {
    std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5)
}
