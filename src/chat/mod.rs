/*!
Interactive chat loop.

Each input line goes through the command dispatcher: slash commands invoke
tools directly, `@` lines read resources, free text enters the model loop
where the model may chain tool calls up to a configured round cap. The model
client is built lazily so slash commands work without an ANTHROPIC_API_KEY.
*/

pub mod commands;
pub mod model;
pub mod session;

use std::io::Write as _;

use anyhow::Result;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::client::{ToolClient, first_text};
use crate::cmd::format::{Role, StyleOptions, color, emoji};
use crate::config::ChatSettings;

use self::commands::{Dispatch, parse_line};
use self::model::{ModelClient, tool_result_block};
use self::session::Conversation;

enum LoopAction {
    Continue,
    Quit,
}

pub struct ChatSession {
    client: ToolClient,
    settings: ChatSettings,
    model: Option<ModelClient>,
    conversation: Conversation,
    style: StyleOptions,
}

pub async fn run(client: ToolClient, settings: ChatSettings) -> Result<()> {
    let style = StyleOptions::detect();
    let mut session = ChatSession {
        client,
        settings,
        model: None,
        conversation: Conversation::new(),
        style,
    };
    session.banner();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match session.handle(&line).await {
            LoopAction::Continue => {}
            LoopAction::Quit => break,
        }
    }

    session.conversation.reset();
    session.client.shutdown().await;
    println!("bye");
    Ok(())
}

impl ChatSession {
    fn banner(&self) {
        let style = &self.style;
        println!(
            "{} connected: {} tools from {} server(s)",
            emoji("chat", style),
            self.client.tools().len(),
            self.client.server_count(),
        );
        println!("type /topvisor or /ahrefs for commands, quit to exit");
    }

    async fn handle(&mut self, line: &str) -> LoopAction {
        match parse_line(line) {
            Dispatch::Empty => {}
            Dispatch::Quit => return LoopAction::Quit,
            Dispatch::Help(topic) => println!("{}", topic.text()),
            Dispatch::Usage(usage) => println!("{usage}"),
            Dispatch::Invalid(reason) => {
                println!("{} {reason}", color(Role::Warning, "!", &self.style));
            }
            Dispatch::Unknown(command) => {
                println!(
                    "unknown command: {command} (try /topvisor or /ahrefs for the command list)"
                );
            }
            Dispatch::Prompts => self.show_prompts(),
            Dispatch::Prompt { name, args } => self.run_prompt(&name, args).await,
            Dispatch::Resource(uri) => self.show_resource(&uri).await,
            Dispatch::Invoke { tool, args } => self.direct_invoke(tool, args).await,
            Dispatch::Query(query) => self.process_query(&query).await,
        }
        LoopAction::Continue
    }

    fn show_prompts(&self) {
        if self.client.prompts().is_empty() {
            println!("no prompts available on the connected servers");
            return;
        }
        for prompt in self.client.prompts() {
            let name = prompt.get("name").and_then(Value::as_str).unwrap_or("?");
            let description = prompt
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("");
            println!(
                "  {}  {}",
                color(Role::Accent, name, &self.style),
                color(Role::Secondary, description, &self.style)
            );
        }
    }

    async fn run_prompt(&mut self, name: &str, args: Map<String, Value>) {
        match self.client.get_prompt(name, args).await {
            Ok(result) => {
                if let Some(text) = prompt_text(&result) {
                    self.process_query(&text).await;
                } else {
                    print_pretty(&result);
                }
            }
            Err(err) => self.print_error(&format!("{err:#}")),
        }
    }

    async fn show_resource(&self, uri: &str) {
        match self.client.read_resource(uri).await {
            Ok(result) => {
                let text = result
                    .get("contents")
                    .and_then(Value::as_array)
                    .and_then(|contents| contents.first())
                    .and_then(|c| c.get("text"))
                    .and_then(Value::as_str);
                match text {
                    Some(text) => println!("{text}"),
                    None => print_pretty(&result),
                }
            }
            Err(err) => self.print_error(&format!("{err:#}")),
        }
    }

    /// Slash-command path: one tool call, result printed, no model involved.
    async fn direct_invoke(&self, tool: &'static str, args: Map<String, Value>) {
        if !self.client.has_tool(tool) {
            self.print_error(&format!("tool '{tool}' is not available on the connected servers"));
            return;
        }
        println!("{} {tool}", emoji("tool", &self.style));
        match self.client.call_tool(tool, args).await {
            Ok(result) => {
                let is_error = result.get("isError").and_then(Value::as_bool).unwrap_or(false);
                let text = first_text(&result).map(str::to_string);
                match text {
                    Some(text) if is_error => self.print_error(&text),
                    Some(text) => println!("{text}"),
                    None => print_pretty(&result),
                }
            }
            Err(err) => self.print_error(&format!("{err:#}")),
        }
    }

    /// Free-text path: model rounds with tool-call chaining, bounded by the
    /// configured cap. A failed model call abandons the turn but keeps the
    /// loop alive.
    async fn process_query(&mut self, query: &str) {
        if self.model.is_none() {
            match ModelClient::new(&self.settings) {
                Ok(model) => self.model = Some(model),
                Err(err) => {
                    self.print_error(&format!("{err:#}"));
                    return;
                }
            }
        }
        // Checked above. Borrowed immutably so conversation stays writable.
        let Some(model) = self.model.as_ref() else { return };

        let descriptors = self.client.model_tool_descriptors();
        self.conversation.push_user_text(query);

        for round in 0..self.settings.max_tool_rounds {
            let reply = match model.complete(&self.conversation, &descriptors).await {
                Ok(reply) => reply,
                Err(err) => {
                    self.print_error(&format!("{err:#}"));
                    return;
                }
            };
            if !reply.text.is_empty() {
                println!("{}", reply.text);
            }
            self.conversation.push_assistant(reply.content.clone());
            if reply.tool_calls.is_empty() {
                return;
            }

            let mut blocks = Vec::new();
            for call in &reply.tool_calls {
                println!(
                    "{} {} {}",
                    emoji("tool", &self.style),
                    color(Role::Accent, &call.name, &self.style),
                    color(Role::Dim, call.input.to_string(), &self.style)
                );
                let args = call.input.as_object().cloned().unwrap_or_default();
                let block = match self.client.call_tool(&call.name, args).await {
                    Ok(result) => {
                        let is_error =
                            result.get("isError").and_then(Value::as_bool).unwrap_or(false);
                        let text = first_text(&result)
                            .map(str::to_string)
                            .unwrap_or_else(|| result.to_string());
                        tool_result_block(&call.id, &text, is_error)
                    }
                    Err(err) => {
                        debug!(tool = %call.name, %err, "tool call failed");
                        tool_result_block(&call.id, &format!("{err:#}"), true)
                    }
                };
                blocks.push(block);
            }
            self.conversation.push_tool_results(blocks);

            if round + 1 == self.settings.max_tool_rounds {
                println!(
                    "{} tool round limit reached ({}), stopping this turn",
                    color(Role::Warning, "!", &self.style),
                    self.settings.max_tool_rounds
                );
            }
        }
    }

    fn print_error(&self, message: &str) {
        println!(
            "{} {}",
            emoji("error", &self.style),
            color(Role::Error, message, &self.style)
        );
    }
}

fn print_pretty(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

/// Pull the user-facing text out of a `prompts/get` result.
fn prompt_text(result: &Value) -> Option<String> {
    let messages = result.get("messages")?.as_array()?;
    let mut parts = Vec::new();
    for message in messages {
        match message.get("content") {
            Some(Value::String(text)) => parts.push(text.clone()),
            Some(Value::Object(block)) => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    parts.push(text.to_string());
                }
            }
            Some(Value::Array(blocks)) => {
                for block in blocks {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        parts.push(text.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    if parts.is_empty() { None } else { Some(parts.join("\n")) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Json, Router, routing::post};

    use crate::client::target::TargetSpec;
    use crate::registry::{DuplicatePolicy, ToolRegistry, ToolSpec};
    use crate::server::McpServer;

    async fn spawn_router(router: Router) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        addr
    }

    /// Tool server with a single echo tool, reachable over http.
    async fn spawn_echo_server() -> std::net::SocketAddr {
        let mut registry = ToolRegistry::new(DuplicatePolicy::Reject);
        registry
            .register(
                ToolSpec::new("echo", "Echo the arguments back", json!({ "type": "object" })),
                Box::new(|args| Box::pin(async move { Ok(Value::Object(args)) })),
            )
            .unwrap();
        spawn_router(crate::server::http::router(Arc::new(McpServer::new(registry)))).await
    }

    #[tokio::test]
    async fn tool_round_cap_halts_chained_calls() {
        let tool_addr = spawn_echo_server().await;

        // Model stub that requests another tool call on every round.
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let model_router = Router::new().route(
            "/v1/messages",
            post(move || {
                let calls = counter.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "content": [{
                            "type": "tool_use",
                            "id": "toolu_1",
                            "name": "echo",
                            "input": { "value": "again" }
                        }]
                    }))
                }
            }),
        );
        let model_addr = spawn_router(model_router).await;

        let target = format!("http://{tool_addr}/mcp");
        let client = ToolClient::connect(&[(
            "stub".to_string(),
            TargetSpec::HttpUrl {
                original: target.clone(),
                url: url::Url::parse(&target).unwrap(),
            },
        )])
        .await
        .unwrap();

        let settings = ChatSettings {
            model: "test-model".into(),
            max_tokens: 64,
            max_tool_rounds: 2,
            api_key: Some("sk-test".into()),
        };
        let model =
            ModelClient::with_url(&settings, format!("http://{model_addr}/v1/messages")).unwrap();
        let mut session = ChatSession {
            client,
            settings,
            model: Some(model),
            conversation: Conversation::new(),
            style: StyleOptions {
                use_color: false,
                use_emoji: false,
                term_width: 80,
            },
        };

        session.process_query("check everything").await;

        // The model wanted a tool call every round; the cap stops it at two.
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let messages = session.conversation.messages();
        let messages = messages.as_array().unwrap();
        // user query + (assistant turn + tool results) per round
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "check everything");
        for round in 0..2 {
            let assistant = &messages[1 + round * 2];
            assert_eq!(assistant["role"], "assistant");
            assert_eq!(assistant["content"][0]["type"], "tool_use");
            let results = &messages[2 + round * 2];
            assert_eq!(results["role"], "user");
            assert_eq!(results["content"][0]["type"], "tool_result");
            assert_eq!(results["content"][0]["tool_use_id"], "toolu_1");
            assert_eq!(results["content"][0]["is_error"], false);
        }
    }

    #[tokio::test]
    async fn text_reply_ends_the_turn_before_the_cap() {
        let tool_addr = spawn_echo_server().await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let model_router = Router::new().route(
            "/v1/messages",
            post(move || {
                let calls = counter.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "content": [{ "type": "text", "text": "all done" }]
                    }))
                }
            }),
        );
        let model_addr = spawn_router(model_router).await;

        let target = format!("http://{tool_addr}/mcp");
        let client = ToolClient::connect(&[(
            "stub".to_string(),
            TargetSpec::HttpUrl {
                original: target.clone(),
                url: url::Url::parse(&target).unwrap(),
            },
        )])
        .await
        .unwrap();

        let settings = ChatSettings {
            model: "test-model".into(),
            max_tokens: 64,
            max_tool_rounds: 8,
            api_key: Some("sk-test".into()),
        };
        let model =
            ModelClient::with_url(&settings, format!("http://{model_addr}/v1/messages")).unwrap();
        let mut session = ChatSession {
            client,
            settings,
            model: Some(model),
            conversation: Conversation::new(),
            style: StyleOptions {
                use_color: false,
                use_emoji: false,
                term_width: 80,
            },
        };

        session.process_query("hello").await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // user query + one assistant turn, no tool-result turns
        assert_eq!(session.conversation.len(), 2);
    }

    #[test]
    fn prompt_text_handles_block_shapes() {
        let result = json!({
            "messages": [
                { "role": "user", "content": { "type": "text", "text": "first" } },
                { "role": "user", "content": [{ "type": "text", "text": "second" }] },
                { "role": "user", "content": "third" }
            ]
        });
        assert_eq!(prompt_text(&result).unwrap(), "first\nsecond\nthird");
        assert!(prompt_text(&json!({ "messages": [] })).is_none());
        assert!(prompt_text(&json!({})).is_none());
    }
}
