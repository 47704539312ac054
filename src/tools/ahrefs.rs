//! Ahrefs tools: setup check, referring domains, backlinks and organic
//! keywords.

use std::path::Path;

use anyhow::Result;
use serde_json::{Map, Value, json};

use crate::api::ahrefs::{
    AhrefsClient, BACKLINKS_ORDER, DEFAULT_LIMIT, ORGANIC_ORDER, REFDOMAINS_ORDER,
};
use crate::registry::{ToolRegistry, ToolSpec};

use super::{config_error, object_schema, opt_str, opt_u32, require_str};

const SETUP_HELP: &str = "Create a .env file and add AHREFS_API_KEY=your_key";

fn target_schema(extra: Value, required: &[&str]) -> Value {
    let mut props = json!({
        "target": { "type": "string", "description": "Target domain, e.g. example.com" },
        "limit": { "type": "integer", "description": "Number of results (max 1000, default 100)" },
        "order_by": { "type": "string", "description": "Sort field with direction, e.g. domain_rating:desc" }
    });
    if let (Some(props_map), Some(extra_map)) = (props.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_map {
            props_map.insert(k.clone(), v.clone());
        }
    }
    object_schema(props, required)
}

pub fn register(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(
        ToolSpec::new(
            "check_ahrefs_setup",
            "Check Ahrefs API setup and connection",
            object_schema(json!({}), &[]),
        ),
        Box::new(|args| Box::pin(run_setup_check(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_ahrefs_refdomains",
            "Get list of referring domains for a target domain via Ahrefs",
            target_schema(json!({}), &["target"]),
        ),
        Box::new(|args| Box::pin(run_refdomains(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_ahrefs_backlinks",
            "Get list of backlinks for a target domain via Ahrefs",
            target_schema(json!({}), &["target"]),
        ),
        Box::new(|args| Box::pin(run_backlinks(args))),
    )?;
    registry.register(
        ToolSpec::new(
            "get_ahrefs_organic_keywords",
            "Get organic keywords for a target domain via Ahrefs",
            target_schema(
                json!({
                    "date": { "type": "string", "description": "Snapshot date, YYYY-MM-DD (default today)" }
                }),
                &["target"],
            ),
        ),
        Box::new(|args| Box::pin(run_organic_keywords(args))),
    )?;
    Ok(())
}

/* ---- handlers ---- */

async fn run_setup_check(_args: Map<String, Value>) -> Result<Value> {
    let client = match AhrefsClient::from_env() {
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
    // Minimal probe request against a known domain.
    match client.refdomains("example.com", Some(1), None).await {
        Ok(result) => Ok(setup_envelope(&result)),
        Err(err) => Ok(json!({
            "status": "error",
            "message": format!("API connection error: {err:#}"),
            "checks": { "env_file": true, "api_key_set": true, "api_connection": false },
            "help": "Check internet connection and API key validity",
        })),
    }
}

async fn run_refdomains(args: Map<String, Value>) -> Result<Value> {
    let target = require_str(&args, "target")?;
    let limit = opt_u32(&args, "limit");
    let order_by = opt_str(&args, "order_by");
    let client = match AhrefsClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client.refdomains(&target, limit, order_by.as_deref()).await?;
    Ok(listing_envelope(
        &target,
        "refdomains",
        limit.unwrap_or(DEFAULT_LIMIT),
        order_by.as_deref().unwrap_or(REFDOMAINS_ORDER),
        None,
        &result,
        "Failed to get referring domains data",
    ))
}

async fn run_backlinks(args: Map<String, Value>) -> Result<Value> {
    let target = require_str(&args, "target")?;
    let limit = opt_u32(&args, "limit");
    let order_by = opt_str(&args, "order_by");
    let client = match AhrefsClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client.backlinks(&target, limit, order_by.as_deref()).await?;
    Ok(listing_envelope(
        &target,
        "backlinks",
        limit.unwrap_or(DEFAULT_LIMIT),
        order_by.as_deref().unwrap_or(BACKLINKS_ORDER),
        None,
        &result,
        "Failed to get backlinks data",
    ))
}

async fn run_organic_keywords(args: Map<String, Value>) -> Result<Value> {
    let target = require_str(&args, "target")?;
    let limit = opt_u32(&args, "limit");
    let order_by = opt_str(&args, "order_by");
    let date = opt_str(&args, "date");
    let client = match AhrefsClient::from_env() {
        Ok(client) => client,
        Err(err) => return Ok(config_error(&err, SETUP_HELP)),
    };
    let result = client
        .organic_keywords(&target, limit, order_by.as_deref(), date.as_deref())
        .await?;
    Ok(listing_envelope(
        &target,
        "keywords",
        limit.unwrap_or(DEFAULT_LIMIT),
        order_by.as_deref().unwrap_or(ORGANIC_ORDER),
        date.as_deref(),
        &result,
        "Failed to get organic keywords data",
    ))
}

/* ---- envelope shaping ---- */

fn provider_error(result: &Value) -> Option<Value> {
    let error = result.get("error")?;
    let message = match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(json!({
        "status": "error",
        "message": format!("API error: {message}"),
        "details": result.get("details").cloned()
            .unwrap_or_else(|| json!("Check API key and balance")),
    }))
}

pub fn setup_envelope(result: &Value) -> Value {
    if let Some(error) = result.get("error") {
        let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        return json!({
            "status": "warning",
            "message": format!("API key found, but there is a problem: {message}"),
            "checks": { "env_file": true, "api_key_set": true, "api_connection": false },
            "help": "Check API key validity and account balance",
        });
    }
    if result.get("refdomains").is_some() {
        json!({
            "status": "success",
            "message": "Everything is set up correctly! Ahrefs API is working",
            "checks": { "env_file": true, "api_key_set": true, "api_connection": true },
        })
    } else {
        json!({
            "status": "error",
            "message": "Unexpected response from API",
            "checks": { "env_file": true, "api_key_set": true, "api_connection": false },
        })
    }
}

/// Success envelope for the three listing endpoints. `key` is the payload
/// field both in the provider response and in the envelope.
pub fn listing_envelope(
    target: &str,
    key: &str,
    limit: u32,
    order_by: &str,
    date: Option<&str>,
    result: &Value,
    failure_message: &str,
) -> Value {
    if let Some(error) = provider_error(result) {
        return error;
    }
    let Some(rows) = result.get(key) else {
        return json!({ "status": "error", "message": failure_message });
    };
    let mut envelope = json!({
        "status": "success",
        "target": target,
        "limit": limit,
        "order_by": order_by,
        key: rows,
    });
    if let Some(date) = date
        && let Some(map) = envelope.as_object_mut()
    {
        map.insert("date".into(), json!(date));
    }
    envelope
}
