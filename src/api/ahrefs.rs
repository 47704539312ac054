//! Ahrefs v3 Site Explorer wrapper.
//!
//! All endpoints are GETs with bearer auth and query-string parameters. Each
//! endpoint pins a fixed `select` field list so responses stay stable for the
//! tool envelopes downstream.

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::{Value, json};
use tracing::debug;

pub const BASE_URL: &str = "https://api.ahrefs.com/v3";

pub const DEFAULT_LIMIT: u32 = 100;
pub const REFDOMAINS_ORDER: &str = "domain_rating:desc";
pub const BACKLINKS_ORDER: &str = "domain_rating_source:desc";
pub const ORGANIC_ORDER: &str = "best_position:asc";

const REFDOMAINS_SELECT: &str =
    "domain,domain_rating,links_to_target,first_seen,last_seen,traffic_domain";
const BACKLINKS_SELECT: &str = "url_from,url_to,domain_rating_source,domain_rating_target,\
     traffic,traffic_domain,anchor,name_source,name_target,noindex,page_size,positions,\
     title,url_rating_source";
const ORGANIC_SELECT: &str = "keyword,best_position,best_position_url,keyword_country,\
     keyword_difficulty,last_update,sum_traffic,volume,volume_desktop_pct,volume_mobile_pct";

pub struct AhrefsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AhrefsClient {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("AHREFS_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .context("AHREFS_API_KEY is not set; add it to your environment or .env file")?;
        Self::new(BASE_URL, api_key)
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: super::http_client()?,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    async fn request(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/site-explorer/{}", self.base_url, endpoint);
        debug!(%url, "ahrefs request");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(params)
            .send()
            .await
            .with_context(|| format!("Ahrefs request to {endpoint} failed"))?;
        let status = response.status();
        if status.is_success() {
            response
                .json::<Value>()
                .await
                .with_context(|| format!("failed to decode Ahrefs response from {endpoint}"))
        } else {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), %body, "ahrefs error response");
            Ok(map_error_status(status.as_u16(), &body))
        }
    }

    pub async fn refdomains(
        &self,
        target: &str,
        limit: Option<u32>,
        order_by: Option<&str>,
    ) -> Result<Value> {
        let params = refdomains_params(target, limit, order_by);
        self.request("refdomains", &params).await
    }

    pub async fn backlinks(
        &self,
        target: &str,
        limit: Option<u32>,
        order_by: Option<&str>,
    ) -> Result<Value> {
        let params = backlinks_params(target, limit, order_by);
        self.request("all-backlinks", &params).await
    }

    /// Organic keywords need a snapshot date; defaults to today.
    pub async fn organic_keywords(
        &self,
        target: &str,
        limit: Option<u32>,
        order_by: Option<&str>,
        date: Option<&str>,
    ) -> Result<Value> {
        let params = organic_params(target, limit, order_by, date);
        self.request("organic-keywords", &params).await
    }
}

fn map_error_status(status: u16, body: &str) -> Value {
    match status {
        401 => json!({ "error": "Invalid API key", "status_code": 401 }),
        403 => json!({
            "error": "Insufficient access permissions or credits",
            "status_code": 403
        }),
        429 => json!({ "error": "Request limit exceeded", "status_code": 429 }),
        other => json!({ "error": format!("API error {other}"), "details": body }),
    }
}

pub fn today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

fn refdomains_params(target: &str, limit: Option<u32>, order_by: Option<&str>) -> Vec<(&'static str, String)> {
    vec![
        ("target", target.to_string()),
        ("limit", limit.unwrap_or(DEFAULT_LIMIT).to_string()),
        ("order_by", order_by.unwrap_or(REFDOMAINS_ORDER).to_string()),
        ("select", REFDOMAINS_SELECT.to_string()),
    ]
}

fn backlinks_params(target: &str, limit: Option<u32>, order_by: Option<&str>) -> Vec<(&'static str, String)> {
    vec![
        ("target", target.to_string()),
        ("limit", limit.unwrap_or(DEFAULT_LIMIT).to_string()),
        ("order_by", order_by.unwrap_or(BACKLINKS_ORDER).to_string()),
        ("select", BACKLINKS_SELECT.to_string()),
    ]
}

fn organic_params(
    target: &str,
    limit: Option<u32>,
    order_by: Option<&str>,
    date: Option<&str>,
) -> Vec<(&'static str, String)> {
    vec![
        ("target", target.to_string()),
        ("limit", limit.unwrap_or(DEFAULT_LIMIT).to_string()),
        ("order_by", order_by.unwrap_or(ORGANIC_ORDER).to_string()),
        ("select", ORGANIC_SELECT.to_string()),
        ("date", date.map(str::to_string).unwrap_or_else(today)),
    ]
}
