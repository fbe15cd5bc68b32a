use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Global shared HTTP client singleton.
///
/// Every LLM client clones this; `Client::clone()` is an `Arc` increment.
/// Multi-agent turns can take minutes, so the per-request timeout is generous.
static SHARED_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .pool_max_idle_per_host(5)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(300))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Failed to build tuned HTTP client ({}), using defaults", e);
            Client::new()
        })
});

/// Returns a reference to the global shared HTTP client.
pub fn shared_client() -> &'static Client {
    &SHARED_CLIENT
}
