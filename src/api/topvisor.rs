//! Topvisor v2 JSON API wrapper.
//!
//! Every call is a POST to `{base}/{endpoint}` with a JSON payload and the
//! `User-Id` / bearer-key headers. The regions endpoint is the one exception:
//! it returns a semicolon-delimited CSV export which is parsed into records.

use anyhow::{Context, Result};
use chrono::{Duration, Local};
use serde_json::{Value, json};
use tracing::debug;

pub const BASE_URL: &str = "https://api.topvisor.com/v2/json/get";

/// Default region index used when a positions query does not name one.
pub const DEFAULT_REGION_INDEX: &str = "33";

pub struct TopvisorClient {
    http: reqwest::Client,
    base_url: String,
    user_id: String,
    api_key: String,
}

/// Parameters for a positions-history request. Dates default to the last
/// seven days when unset.
#[derive(Debug, Clone)]
pub struct PositionsQuery {
    pub project_id: i64,
    pub regions_indexes: Vec<String>,
    pub date1: Option<String>,
    pub date2: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl PositionsQuery {
    pub fn new(project_id: i64) -> Self {
        Self {
            project_id,
            regions_indexes: vec![DEFAULT_REGION_INDEX.to_string()],
            date1: None,
            date2: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl TopvisorClient {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("TOPVISOR_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .context("TOPVISOR_API_KEY is not set; add it to your environment or .env file")?;
        let user_id = std::env::var("TOPVISOR_USER_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .context("TOPVISOR_USER_ID is not set; add it to your environment or .env file")?;
        Self::new(BASE_URL, user_id, api_key)
    }

    pub fn new(
        base_url: impl Into<String>,
        user_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: super::http_client()?,
            base_url: base_url.into(),
            user_id: user_id.into(),
            api_key: api_key.into(),
        })
    }

    async fn send(&self, endpoint: &str, payload: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(%url, "topvisor request");
        self.http
            .post(&url)
            .header("User-Id", &self.user_id)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Topvisor request to {endpoint} failed"))
    }

    async fn request(&self, endpoint: &str, payload: Value) -> Result<Value> {
        let response = self.send(endpoint, &payload).await?;
        let status = response.status();
        if status.is_success() {
            response
                .json::<Value>()
                .await
                .with_context(|| format!("failed to decode Topvisor response from {endpoint}"))
        } else {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), %body, "topvisor error response");
            Ok(map_error_status(status.as_u16(), &body))
        }
    }

    /// Like [`request`](Self::request) but the success body is raw CSV text.
    async fn request_csv(&self, endpoint: &str, payload: Value) -> Result<Value> {
        let response = self.send(endpoint, &payload).await?;
        let status = response.status();
        if status.is_success() {
            let text = response
                .text()
                .await
                .with_context(|| format!("failed to read Topvisor export from {endpoint}"))?;
            Ok(json!({ "result": text, "status_code": 200 }))
        } else {
            let body = response.text().await.unwrap_or_default();
            Ok(map_error_status(status.as_u16(), &body))
        }
    }

    pub async fn projects(&self) -> Result<Value> {
        self.request("projects_2/projects", json!({})).await
    }

    pub async fn project_keywords(
        &self,
        project_id: i64,
        folder_id: Option<i64>,
        group_id: Option<i64>,
    ) -> Result<Value> {
        let mut payload = json!({ "project_id": project_id });
        if let Some(folder) = folder_id {
            payload["folder_id"] = json!(folder);
        }
        if let Some(group) = group_id {
            payload["group_id"] = json!(group);
        }
        self.request("keywords_2/keywords", payload).await
    }

    pub async fn positions_history(&self, query: &PositionsQuery) -> Result<Value> {
        self.request("positions_2/history", positions_payload(query))
            .await
    }

    pub async fn positions_summary(
        &self,
        project_id: i64,
        date1: Option<&str>,
        date2: Option<&str>,
    ) -> Result<Value> {
        let (default1, default2) = default_date_range();
        let payload = json!({
            "project_id": project_id,
            "date1": date1.unwrap_or(&default1),
            "date2": date2.unwrap_or(&default2),
        });
        self.request("positions_2/summary", payload).await
    }

    pub async fn competitors(&self, project_id: i64) -> Result<Value> {
        self.request("projects_2/competitors", json!({ "project_id": project_id }))
            .await
    }

    /// Regions and search engines for a project, parsed from the CSV export.
    pub async fn regions(&self, project_id: i64) -> Result<Value> {
        let response = self
            .request_csv(
                "positions_2/searchers_regions/export",
                json!({ "project_id": project_id }),
            )
            .await?;
        if response.get("error").is_some() {
            return Ok(response);
        }
        let text = response
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let rows = parse_regions_csv(text);
        let status = response
            .get("status_code")
            .cloned()
            .unwrap_or_else(|| json!(200));
        Ok(json!({ "result": rows, "status_code": status }))
    }

    pub async fn keyword_folders(&self, project_id: i64) -> Result<Value> {
        self.request("keywords_2/folders", json!({ "project_id": project_id }))
            .await
    }

    pub async fn keyword_groups(&self, project_id: i64, folder_id: Option<i64>) -> Result<Value> {
        let mut payload = json!({ "project_id": project_id });
        if let Some(folder) = folder_id {
            payload["folder_id"] = json!(folder);
        }
        self.request("keywords_2/groups", payload).await
    }

    pub async fn balance(&self) -> Result<Value> {
        self.request("bank_2/info", json!({})).await
    }
}

/// (seven days ago, today) in `YYYY-MM-DD`.
pub fn default_date_range() -> (String, String) {
    let today = Local::now().date_naive();
    let week_ago = today - Duration::days(7);
    (
        week_ago.format("%Y-%m-%d").to_string(),
        today.format("%Y-%m-%d").to_string(),
    )
}

pub fn positions_payload(query: &PositionsQuery) -> Value {
    let (default1, default2) = default_date_range();
    json!({
        "project_id": query.project_id,
        "regions_indexes": query.regions_indexes,
        "date1": query.date1.as_deref().unwrap_or(&default1),
        "date2": query.date2.as_deref().unwrap_or(&default2),
        "limit": query.limit,
        "offset": query.offset,
    })
}

fn map_error_status(status: u16, body: &str) -> Value {
    match status {
        401 => json!({ "error": "Invalid API key", "status_code": 401 }),
        403 => json!({ "error": "Insufficient access permissions", "status_code": 403 }),
        other => json!({ "error": format!("API error {other}"), "details": body }),
    }
}

/// Parse the semicolon-delimited regions export. Rows with fewer than six
/// fields are skipped.
pub fn parse_regions_csv(text: &str) -> Vec<Value> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(';').collect();
            if fields.len() < 6 {
                return None;
            }
            Some(json!({
                "search_engine_key": fields[0],
                "name": fields[1],
                "country_code": fields[2],
                "language": fields[3],
                "region_device": fields[4],
                "depth": fields[5],
            }))
        })
        .collect()
}
