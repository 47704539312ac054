//! HTTP wrappers around the upstream SEO providers.
//!
//! Both clients follow the same convention: a non-2xx provider response is
//! returned as an error *record* (`{"error": ..., "status_code": ...}`) so the
//! provider's own message survives to the tool envelope, while transport and
//! decode failures propagate as `Err`.

pub mod ahrefs;
pub mod topvisor;

/// Per-request timeout applied by both clients, in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

pub(crate) fn http_client() -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .context("failed to build HTTP client")
}
