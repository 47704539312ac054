//! Topvisor tools: setup check, projects, keywords, positions, competitors,
//! regions, folders, groups and balance.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use serde_json::{Map, Value, json};

use crate::api::topvisor::{PositionsQuery, TopvisorClient};
use crate::registry::{ToolRegistry, ToolSpec};

use super::{config_error, object_schema, opt_i64, opt_str, opt_string_array, opt_u32, require_i64};

const SETUP_HELP: &str =
    "Create a .env file and add TOPVISOR_API_KEY=your_key and TOPVISOR_USER_ID=your_id";

pub fn register(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(
        ToolSpec::new(
            "check_topvisor_setup",
            "Check Topvisor API setup and connection",
            object_schema(json!({}), &[]),
        ),
        Box::new(|args| Box::pin(run_setup_check(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_topvisor_projects",
            "Get a list of all user projects in Topvisor",
            object_schema(json!({}), &[]),
        ),
        Box::new(|args| Box::pin(run_projects(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_topvisor_keywords",
            "Get project keywords in Topvisor, optionally filtered by folder or group",
            object_schema(
                json!({
                    "project_id": { "type": "integer", "description": "Project ID in Topvisor" },
                    "folder_id": { "type": "integer", "description": "Folder ID (optional)" },
                    "group_id": { "type": "integer", "description": "Group ID (optional)" }
                }),
                &["project_id"],
            ),
        ),
        Box::new(|args| Box::pin(run_keywords(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_topvisor_positions_history",
            "Get keyword position history for a project in Topvisor",
            object_schema(
                json!({
                    "project_id": { "type": "integer", "description": "Project ID in Topvisor" },
                    "regions_indexes": {
                        "type": "array",
                        "description": "Region indexes, e.g. [\"33\"]"
                    },
                    "date1": { "type": "string", "description": "Period start, YYYY-MM-DD (default 7 days ago)" },
                    "date2": { "type": "string", "description": "Period end, YYYY-MM-DD (default today)" },
                    "limit": { "type": "integer", "description": "Number of records (default 100)" },
                    "offset": { "type": "integer", "description": "Pagination offset (default 0)" }
                }),
                &["project_id"],
            ),
        ),
        Box::new(|args| Box::pin(run_positions_history(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_topvisor_positions_summary",
            "Get position summary for a project in Topvisor",
            object_schema(
                json!({
                    "project_id": { "type": "integer", "description": "Project ID in Topvisor" },
                    "date1": { "type": "string", "description": "Period start, YYYY-MM-DD" },
                    "date2": { "type": "string", "description": "Period end, YYYY-MM-DD" }
                }),
                &["project_id"],
            ),
        ),
        Box::new(|args| Box::pin(run_positions_summary(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_topvisor_competitors",
            "Get project competitors list in Topvisor",
            object_schema(
                json!({ "project_id": { "type": "integer", "description": "Project ID in Topvisor" } }),
                &["project_id"],
            ),
        ),
        Box::new(|args| Box::pin(run_competitors(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_topvisor_regions",
            "Get project regions and search engines in Topvisor",
            object_schema(
                json!({ "project_id": { "type": "integer", "description": "Project ID in Topvisor" } }),
                &["project_id"],
            ),
        ),
        Box::new(|args| Box::pin(run_regions(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_topvisor_keyword_folders",
            "Get project keyword folders in Topvisor",
            object_schema(
                json!({ "project_id": { "type": "integer", "description": "Project ID in Topvisor" } }),
                &["project_id"],
            ),
        ),
        Box::new(|args| Box::pin(run_keyword_folders(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_topvisor_keyword_groups",
            "Get project keyword groups in Topvisor",
            object_schema(
                json!({
                    "project_id": { "type": "integer", "description": "Project ID in Topvisor" },
                    "folder_id": { "type": "integer", "description": "Folder ID (optional)" }
                }),
                &["project_id"],
            ),
        ),
        Box::new(|args| Box::pin(run_keyword_groups(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_topvisor_balance",
            "Get account balance information in Topvisor",
            object_schema(json!({}), &[]),
        ),
        Box::new(|args| Box::pin(run_balance(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_topvisor_project_keywords",
            "Get raw project keywords data for diagnostics",
            object_schema(
                json!({ "project_id": { "type": "integer", "description": "Project ID in Topvisor" } }),
                &["project_id"],
            ),
        ),
        Box::new(|args| Box::pin(run_project_keywords(args))),
    )?;
    Ok(())
}

/* ---- handlers ---- */

async fn run_setup_check(_args: Map<String, Value>) -> Result<Value> {
    let client = match TopvisorClient::from_env() {
        Ok(client) => client,
        Err(err) => {
            return Ok(json!({
                "status": "error",
                "message": format!("{err:#}"),
                "checks": {
                    "env_file": Path::new(".env").exists(),
                    "api_key_set": false,
                    "api_connection": false,
                },
                "help": SETUP_HELP,
            }));
        }
    };
    match client.balance().await {
        Ok(result) => Ok(setup_envelope(&result)),
        Err(err) => Ok(json!({
            "status": "error",
            "message": format!("API connection error: {err:#}"),
            "checks": { "env_file": true, "api_key_set": true, "api_connection": false },
            "help": "Check internet connection and API key validity",
        })),
    }
}

async fn run_projects(_args: Map<String, Value>) -> Result<Value> {
    let client = match TopvisorClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client.projects().await?;
    Ok(projects_envelope(&result))
}

async fn run_keywords(args: Map<String, Value>) -> Result<Value> {
    let project_id = require_i64(&args, "project_id")?;
    let client = match TopvisorClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client
        .project_keywords(project_id, opt_i64(&args, "folder_id"), opt_i64(&args, "group_id"))
        .await?;
    Ok(keywords_envelope(project_id, &result))
}

async fn run_positions_history(args: Map<String, Value>) -> Result<Value> {
    let mut query = PositionsQuery::new(require_i64(&args, "project_id")?);
    if let Some(regions) = opt_string_array(&args, "regions_indexes")
        && !regions.is_empty()
    {
        query.regions_indexes = regions;
    }
    query.date1 = opt_str(&args, "date1");
    query.date2 = opt_str(&args, "date2");
    if let Some(limit) = opt_u32(&args, "limit") {
        query.limit = limit;
    }
    if let Some(offset) = opt_u32(&args, "offset") {
        query.offset = offset;
    }
    let client = match TopvisorClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client.positions_history(&query).await?;
    Ok(positions_envelope(&query, &result))
}

async fn run_positions_summary(args: Map<String, Value>) -> Result<Value> {
    let project_id = require_i64(&args, "project_id")?;
    let date1 = opt_str(&args, "date1");
    let date2 = opt_str(&args, "date2");
    let client = match TopvisorClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client
        .positions_summary(project_id, date1.as_deref(), date2.as_deref())
        .await?;
    Ok(summary_envelope(project_id, date1.as_deref(), date2.as_deref(), &result))
}

async fn run_competitors(args: Map<String, Value>) -> Result<Value> {
    let project_id = require_i64(&args, "project_id")?;
    let client = match TopvisorClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client.competitors(project_id).await?;
    Ok(competitors_envelope(project_id, &result))
}

async fn run_regions(args: Map<String, Value>) -> Result<Value> {
    let project_id = require_i64(&args, "project_id")?;
    let client = match TopvisorClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client.regions(project_id).await?;
    Ok(regions_envelope(project_id, &result))
}

async fn run_keyword_folders(args: Map<String, Value>) -> Result<Value> {
    let project_id = require_i64(&args, "project_id")?;
    let client = match TopvisorClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client.keyword_folders(project_id).await?;
    Ok(folders_envelope(project_id, &result))
}

async fn run_keyword_groups(args: Map<String, Value>) -> Result<Value> {
    let project_id = require_i64(&args, "project_id")?;
    let folder_id = opt_i64(&args, "folder_id");
    let client = match TopvisorClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client.keyword_groups(project_id, folder_id).await?;
    Ok(groups_envelope(project_id, folder_id, &result))
}

async fn run_balance(_args: Map<String, Value>) -> Result<Value> {
    let client = match TopvisorClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client.balance().await?;
    Ok(balance_envelope(&result))
}

async fn run_project_keywords(args: Map<String, Value>) -> Result<Value> {
    let project_id = require_i64(&args, "project_id")?;
    let client = match TopvisorClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client.project_keywords(project_id, None, None).await?;
    Ok(json!({
        "status": "success",
        "project_id": project_id,
        "keywords_data": result,
    }))
}

/* ---- envelope shaping ---- */

/// Provider error record → error envelope, or None when the response is clean.
fn provider_error(result: &Value) -> Option<Value> {
    let error = result.get("error")?;
    Some(json!({
        "status": "error",
        "message": format!("API error: {}", text_of(error)),
        "details": result.get("details").cloned()
            .unwrap_or_else(|| json!("Check API key and account settings")),
    }))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn period_label(date1: Option<&str>, date2: Option<&str>) -> String {
    format!("{} - {}", date1.unwrap_or("auto"), date2.unwrap_or("auto"))
}

pub fn setup_envelope(result: &Value) -> Value {
    if let Some(error) = result.get("error") {
        return json!({
            "status": "warning",
            "message": format!("API key found, but there is a problem: {}", text_of(error)),
            "checks": { "env_file": true, "api_key_set": true, "api_connection": false },
            "help": "Check API key validity and account balance",
        });
    }
    let Some(data) = result.get("result") else {
        return json!({
            "status": "error",
            "message": "Unexpected response from API",
            "checks": { "env_file": true, "api_key_set": true, "api_connection": false },
        });
    };
    let balance = extract_balance(data);
    json!({
        "status": "success",
        "message": format!("Everything is set up correctly! Balance: {}", text_of(&balance)),
        "checks": { "env_file": true, "api_key_set": true, "api_connection": true },
        "balance": balance,
    })
}

fn extract_balance(data: &Value) -> Value {
    match data {
        Value::Object(map) => map.get("balance").cloned().unwrap_or_else(|| json!("N/A")),
        Value::Array(items) => items
            .first()
            .and_then(|item| item.get("balance"))
            .cloned()
            .unwrap_or_else(|| json!("N/A")),
        _ => json!("N/A"),
    }
}

pub fn projects_envelope(result: &Value) -> Value {
    if let Some(error) = provider_error(result) {
        return error;
    }
    let Some(projects) = result.get("result").and_then(Value::as_array) else {
        return json!({
            "status": "error",
            "message": "Failed to get project data",
            "help": SETUP_HELP,
        });
    };
    let info: Vec<Value> = projects
        .iter()
        .map(|p| {
            json!({
                "id": p.get("id"),
                "name": p.get("name"),
                "url": p.get("url"),
                "status": p.get("status"),
                "created": p.get("date_add"),
            })
        })
        .collect();
    json!({ "status": "success", "total_count": info.len(), "projects": info })
}

pub fn keywords_envelope(project_id: i64, result: &Value) -> Value {
    if let Some(error) = provider_error(result) {
        return error;
    }
    let Some(keywords) = result.get("result").and_then(Value::as_array) else {
        return json!({ "status": "error", "message": "Failed to get keyword data" });
    };
    let info: Vec<Value> = keywords
        .iter()
        .map(|k| {
            json!({
                "id": k.get("id"),
                "name": k.get("name"),
                "folder_id": k.get("folder_id"),
                "group_id": k.get("group_id"),
                "url": k.get("url"),
                "tags": k.get("tags").cloned().unwrap_or_else(|| json!([])),
            })
        })
        .collect();
    json!({
        "status": "success",
        "project_id": project_id,
        "total_count": info.len(),
        "keywords": info,
    })
}

/// Flatten `keywords[].positionsData` into per-date records. Keys look like
/// `2025-08-15:19294818:33` (date, project, region); `--` means the keyword
/// did not rank that day.
pub fn flatten_positions(result_data: &Value) -> Vec<Value> {
    let mut records = Vec::new();
    let Some(keywords) = result_data.get("keywords").and_then(Value::as_array) else {
        return records;
    };
    for keyword in keywords {
        let name = keyword.get("name").and_then(Value::as_str).unwrap_or("unknown");
        let Some(positions) = keyword.get("positionsData").and_then(Value::as_object) else {
            continue;
        };
        for (key, info) in positions {
            let Some(position) = info.get("position") else { continue };
            let position = text_of(position);
            let parts: Vec<&str> = key.split(':').collect();
            if parts.len() < 3 {
                continue;
            }
            records.push(json!({
                "keyword_name": name,
                "date": parts[0],
                "position": position,
                "project_id": parts[1],
                "region": parts[2],
                "position_numeric": position.parse::<i64>().ok(),
                "is_not_ranking": position == "--",
            }));
        }
    }
    records
}

pub fn positions_envelope(query: &PositionsQuery, result: &Value) -> Value {
    if let Some(error) = provider_error(result) {
        return error;
    }
    let Some(data) = result.get("result") else {
        return json!({ "status": "error", "message": "Failed to get position data" });
    };
    if data.is_null() {
        return json!({
            "status": "error",
            "message": "No position data for the specified period",
        });
    }
    let positions = flatten_positions(data);
    let unique: HashSet<&str> = positions
        .iter()
        .filter_map(|p| p.get("keyword_name").and_then(Value::as_str))
        .collect();
    let dates: Vec<&str> = positions
        .iter()
        .filter_map(|p| p.get("date").and_then(Value::as_str))
        .collect();
    json!({
        "status": "success",
        "project_id": query.project_id,
        "regions_indexes": query.regions_indexes,
        "period": period_label(query.date1.as_deref(), query.date2.as_deref()),
        "total_count": positions.len(),
        "unique_keywords": unique.len(),
        "date_range": {
            "start": dates.iter().min().copied().unwrap_or("no_data"),
            "end": dates.iter().max().copied().unwrap_or("no_data"),
        },
        "limit": query.limit,
        "offset": query.offset,
        "positions": positions,
    })
}

pub fn summary_envelope(
    project_id: i64,
    date1: Option<&str>,
    date2: Option<&str>,
    result: &Value,
) -> Value {
    if let Some(error) = provider_error(result) {
        return error;
    }
    let Some(summary) = result.get("result") else {
        return json!({ "status": "error", "message": "Failed to get position summary" });
    };
    json!({
        "status": "success",
        "project_id": project_id,
        "period": period_label(date1, date2),
        "summary": summary,
    })
}

pub fn competitors_envelope(project_id: i64, result: &Value) -> Value {
    if let Some(error) = provider_error(result) {
        return error;
    }
    let Some(competitors) = result.get("result").and_then(Value::as_array) else {
        return json!({ "status": "error", "message": "Failed to get competitor data" });
    };
    let info: Vec<Value> = competitors
        .iter()
        .map(|c| {
            json!({
                "id": c.get("id"),
                "name": c.get("name"),
                "url": c.get("url"),
                "status": c.get("on"),
                "enabled": c.get("enabled"),
            })
        })
        .collect();
    json!({
        "status": "success",
        "project_id": project_id,
        "total_count": info.len(),
        "competitors": info,
    })
}

pub fn regions_envelope(project_id: i64, result: &Value) -> Value {
    if let Some(error) = provider_error(result) {
        return error;
    }
    let Some(regions) = result.get("result").and_then(Value::as_array) else {
        return json!({ "status": "error", "message": "Failed to get region data" });
    };
    json!({
        "status": "success",
        "project_id": project_id,
        "total_count": regions.len(),
        "regions": regions,
    })
}

pub fn folders_envelope(project_id: i64, result: &Value) -> Value {
    if let Some(error) = provider_error(result) {
        return error;
    }
    let Some(folders) = result.get("result").and_then(Value::as_array) else {
        return json!({ "status": "error", "message": "Failed to get folder data" });
    };
    let info: Vec<Value> = folders
        .iter()
        .map(|f| {
            json!({
                "id": f.get("id"),
                "name": f.get("name"),
                "parent_id": f.get("parent_id"),
                "keywords_count": f.get("count_keywords"),
            })
        })
        .collect();
    json!({
        "status": "success",
        "project_id": project_id,
        "total_count": info.len(),
        "folders": info,
    })
}

pub fn groups_envelope(project_id: i64, folder_id: Option<i64>, result: &Value) -> Value {
    if let Some(error) = provider_error(result) {
        return error;
    }
    let Some(groups) = result.get("result").and_then(Value::as_array) else {
        return json!({ "status": "error", "message": "Failed to get group data" });
    };
    let info: Vec<Value> = groups
        .iter()
        .map(|g| {
            json!({
                "id": g.get("id"),
                "name": g.get("name"),
                "folder_id": g.get("folder_id"),
                "keywords_count": g.get("count_keywords"),
                "enabled": g.get("on"),
            })
        })
        .collect();
    json!({
        "status": "success",
        "project_id": project_id,
        "folder_id": folder_id,
        "total_count": info.len(),
        "groups": info,
    })
}

pub fn balance_envelope(result: &Value) -> Value {
    if let Some(error) = provider_error(result) {
        return error;
    }
    let Some(info) = result.get("result").and_then(Value::as_object) else {
        return json!({ "status": "error", "message": "Failed to get balance data" });
    };
    json!({
        "status": "success",
        "balance": info.get("balance"),
        "currency": info.get("currency").cloned().unwrap_or_else(|| json!("RUB")),
        "xml_limits": info.get("xml_limits").cloned().unwrap_or_else(|| json!({})),
        "account_info": info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_splits_composite_keys() {
        let data = json!({
            "keywords": [
                {
                    "name": "buy shoes",
                    "positionsData": {
                        "2025-08-15:19294818:33": { "position": "3" },
                        "2025-08-16:19294818:33": { "position": "--" }
                    }
                },
                {
                    "name": "red shoes",
                    "positionsData": {
                        "2025-08-15:19294818:33": { "position": "12" }
                    }
                }
            ]
        });
        let records = flatten_positions(&data);
        assert_eq!(records.len(), 3);
        let first = records
            .iter()
            .find(|r| r["keyword_name"] == "buy shoes" && r["date"] == "2025-08-15")
            .unwrap();
        assert_eq!(first["position"], "3");
        assert_eq!(first["position_numeric"], 3);
        assert_eq!(first["project_id"], "19294818");
        assert_eq!(first["region"], "33");
        assert_eq!(first["is_not_ranking"], false);

        let unranked = records.iter().find(|r| r["position"] == "--").unwrap();
        assert_eq!(unranked["position_numeric"], Value::Null);
        assert_eq!(unranked["is_not_ranking"], true);
    }

    #[test]
    fn flatten_skips_malformed_keys() {
        let data = json!({
            "keywords": [{
                "name": "kw",
                "positionsData": {
                    "2025-08-15": { "position": "1" },
                    "2025-08-15:1:33": { "note": "no position field" }
                }
            }]
        });
        assert!(flatten_positions(&data).is_empty());
    }

    #[test]
    fn positions_envelope_summarizes() {
        let query = PositionsQuery::new(19294818);
        let result = json!({
            "result": {
                "keywords": [{
                    "name": "kw",
                    "positionsData": {
                        "2025-08-10:19294818:33": { "position": "5" },
                        "2025-08-12:19294818:33": { "position": "4" }
                    }
                }]
            }
        });
        let envelope = positions_envelope(&query, &result);
        assert_eq!(envelope["status"], "success");
        assert_eq!(envelope["total_count"], 2);
        assert_eq!(envelope["unique_keywords"], 1);
        assert_eq!(envelope["date_range"]["start"], "2025-08-10");
        assert_eq!(envelope["date_range"]["end"], "2025-08-12");
        assert_eq!(envelope["period"], "auto - auto");
    }

    #[test]
    fn positions_envelope_null_result_is_an_error() {
        let query = PositionsQuery::new(1);
        let envelope = positions_envelope(&query, &json!({ "result": null }));
        assert_eq!(envelope["status"], "error");
    }

    #[test]
    fn projects_envelope_maps_fields() {
        let result = json!({
            "result": [
                { "id": 1, "name": "Shop", "url": "shop.example", "status": 1, "date_add": "2024-01-01" }
            ]
        });
        let envelope = projects_envelope(&result);
        assert_eq!(envelope["status"], "success");
        assert_eq!(envelope["total_count"], 1);
        assert_eq!(envelope["projects"][0]["created"], "2024-01-01");
    }

    #[test]
    fn provider_error_record_becomes_error_envelope() {
        let result = json!({ "error": "Invalid API key", "status_code": 401 });
        let envelope = projects_envelope(&result);
        assert_eq!(envelope["status"], "error");
        assert_eq!(envelope["message"], "API error: Invalid API key");
    }

    #[test]
    fn setup_envelope_variants() {
        let ok = setup_envelope(&json!({ "result": { "balance": 150.5 } }));
        assert_eq!(ok["status"], "success");
        assert_eq!(ok["balance"], 150.5);
        assert_eq!(ok["checks"]["api_connection"], true);

        let list = setup_envelope(&json!({ "result": [{ "balance": "10" }] }));
        assert_eq!(list["balance"], "10");

        let warn = setup_envelope(&json!({ "error": "Invalid API key" }));
        assert_eq!(warn["status"], "warning");
        assert_eq!(warn["checks"]["api_connection"], false);

        let odd = setup_envelope(&json!({ "unexpected": true }));
        assert_eq!(odd["status"], "error");
    }

    #[test]
    fn balance_envelope_defaults_currency() {
        let envelope = balance_envelope(&json!({ "result": { "balance": 99 } }));
        assert_eq!(envelope["status"], "success");
        assert_eq!(envelope["currency"], "RUB");
        assert_eq!(envelope["xml_limits"], json!({}));
    }

    #[test]
    fn groups_envelope_carries_folder_filter() {
        let result = json!({ "result": [{ "id": 7, "name": "g", "on": 1 }] });
        let envelope = groups_envelope(5, Some(2), &result);
        assert_eq!(envelope["folder_id"], 2);
        assert_eq!(envelope["groups"][0]["enabled"], 1);
    }
}
