/*!
Anthropic Messages API client.

One request per model round: the accumulated conversation plus the advertised
tool descriptors go up, text and tool_use content blocks come back. The
chaining loop itself lives in the chat REPL; this module only speaks the wire
format.
*/

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::debug;

use crate::chat::session::Conversation;
use crate::config::ChatSettings;

pub const API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const API_VERSION: &str = "2023-06-01";

pub struct ModelClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

/// One parsed model reply: the text parts, the tool calls, and the raw
/// content blocks for conversation replay.
#[derive(Debug)]
pub struct ModelReply {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub content: Value,
}

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl ModelClient {
    pub fn new(settings: &ChatSettings) -> Result<Self> {
        Self::with_url(settings, API_URL)
    }

    pub fn with_url(settings: &ChatSettings, api_url: impl Into<String>) -> Result<Self> {
        let api_key = settings.require_api_key()?.to_string();
        Ok(Self {
            http: crate::api::http_client()?,
            api_url: api_url.into(),
            api_key,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
        })
    }

    pub async fn complete(
        &self,
        conversation: &Conversation,
        tools: &[Value],
    ) -> Result<ModelReply> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": conversation.messages(),
        });
        if !tools.is_empty()
            && let Some(map) = body.as_object_mut()
        {
            map.insert("tools".into(), json!(tools));
        }
        debug!(model = %self.model, turns = conversation.len(), "model request");
        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .context("model request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("model API error ({status}): {}", failure_message(&body));
        }
        let value: Value = response
            .json()
            .await
            .context("model reply was not valid JSON")?;
        Ok(parse_reply(&value))
    }
}

/// Split the reply's content blocks into text and tool_use calls.
pub fn parse_reply(value: &Value) -> ModelReply {
    let content = value.get("content").cloned().unwrap_or_else(|| json!([]));
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    if let Some(blocks) = content.as_array() {
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(part) = block.get("text").and_then(Value::as_str) {
                        if !text.is_empty() {
                            text.push('\n');
                        }
                        text.push_str(part);
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                    let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                    if id.is_empty() || name.is_empty() {
                        continue;
                    }
                    tool_calls.push(ToolCall {
                        id: id.to_string(),
                        name: name.to_string(),
                        input: block.get("input").cloned().unwrap_or_else(|| json!({})),
                    });
                }
                _ => {}
            }
        }
    }
    ModelReply { text, tool_calls, content }
}

/// tool_result content block referencing the originating tool_use.
pub fn tool_result_block(tool_use_id: &str, result_text: &str, is_error: bool) -> Value {
    json!({
        "type": "tool_result",
        "tool_use_id": tool_use_id,
        "content": result_text,
        "is_error": is_error,
    })
}

pub fn api_error_message(value: &Value) -> String {
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

/// Message for a non-2xx reply body: the structured error when the body is
/// JSON, the raw text otherwise.
fn failure_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .map(|value| api_error_message(&value))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_text_only_reply() {
        let reply = parse_reply(&json!({
            "content": [
                { "type": "text", "text": "Your balance is" },
                { "type": "text", "text": "150 RUB" }
            ]
        }));
        assert_eq!(reply.text, "Your balance is\n150 RUB");
        assert!(reply.tool_calls.is_empty());
    }

    #[test]
    fn parse_tool_use_reply() {
        let reply = parse_reply(&json!({
            "content": [
                { "type": "text", "text": "Checking positions." },
                {
                    "type": "tool_use",
                    "id": "toolu_01",
                    "name": "get_topvisor_positions_history",
                    "input": { "project_id": 4878567 }
                }
            ]
        }));
        assert_eq!(reply.tool_calls.len(), 1);
        let call = &reply.tool_calls[0];
        assert_eq!(call.id, "toolu_01");
        assert_eq!(call.name, "get_topvisor_positions_history");
        assert_eq!(call.input["project_id"], 4878567);
        assert_eq!(reply.content.as_array().unwrap().len(), 2);
    }

    #[test]
    fn parse_ignores_malformed_tool_use() {
        let reply = parse_reply(&json!({
            "content": [{ "type": "tool_use", "input": {} }]
        }));
        assert!(reply.tool_calls.is_empty());
    }

    #[test]
    fn tool_result_block_shape() {
        let block = tool_result_block("toolu_01", "{\"status\":\"success\"}", false);
        assert_eq!(block["type"], "tool_result");
        assert_eq!(block["tool_use_id"], "toolu_01");
        assert_eq!(block["is_error"], false);
    }

    #[test]
    fn api_error_message_prefers_structured_error() {
        let value = json!({ "error": { "type": "authentication_error", "message": "bad key" } });
        assert_eq!(api_error_message(&value), "bad key");
        assert!(api_error_message(&json!({ "odd": 1 })).contains("odd"));
    }

    #[test]
    fn failure_message_handles_both_body_shapes() {
        assert_eq!(
            failure_message(r#"{ "error": { "message": "overloaded" } }"#),
            "overloaded"
        );
        assert_eq!(failure_message("<html>bad gateway</html>"), "<html>bad gateway</html>");
    }

    #[tokio::test]
    async fn non_success_status_survives_to_the_error() {
        use axum::{Router, http::StatusCode, routing::post};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().route(
            "/v1/messages",
            post(|| async { (StatusCode::UNAUTHORIZED, "key rejected upstream") }),
        );
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let settings = ChatSettings {
            model: "test-model".into(),
            max_tokens: 64,
            max_tool_rounds: 2,
            api_key: Some("sk-test".into()),
        };
        let client =
            ModelClient::with_url(&settings, format!("http://{addr}/v1/messages")).unwrap();
        let err = client.complete(&Conversation::new(), &[]).await.unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("401"), "status missing from: {text}");
        assert!(text.contains("key rejected upstream"), "body missing from: {text}");
    }
}
