//! Shared HTTP Client Module
//!
//! Global, lazily built HTTP clients so every provider reuses one connection
//! pool instead of paying a TLS handshake per request.
//!
//! Every client carries a finite timeout: a hung backend must never stall a
//! worker forever. Providers may tighten it per request from settings.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Upper bound for any single provider request
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Global HTTP client for text-generation backends
///
/// - 60s ceiling; settings usually lower it to 10s per request
/// - 16 idle connections per host to match the worker pool
/// - 90s idle timeout between batches
pub static PROVIDER_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(CLIENT_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .user_agent(concat!("plugsort/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to create provider HTTP client")
});

/// Global HTTP client for the web-search backend
///
/// Short timeout: instant-answer lookups are small GETs.
pub static SEARCH_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(15))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .user_agent(concat!("plugsort/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to create search HTTP client")
});

#[inline]
pub fn provider_client() -> &'static Client {
    &PROVIDER_CLIENT
}

#[inline]
pub fn search_client() -> &'static Client {
    &SEARCH_CLIENT
}
