//! Environment-driven configuration.
//!
//! Provider credentials (`TOPVISOR_API_KEY`, `TOPVISOR_USER_ID`,
//! `AHREFS_API_KEY`) are read lazily by the API clients so that a missing key
//! only surfaces on the command that needs it. This module covers the chat
//! and serve settings; CLI flags override the environment.

use anyhow::{Context, Result, bail};

pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";
pub const DEFAULT_MAX_TOKENS: u32 = 2024;
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Load `.env` if present. Absence is not an error.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Settings for the chat front-end (model integration loop).
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub max_tokens: u32,
    /// Upper bound on chained model->tool->model rounds within one user turn.
    pub max_tool_rounds: usize,
    pub api_key: Option<String>,
}

impl ChatSettings {
    pub fn from_env() -> Self {
        Self::from_vars(
            env_nonempty("SEO_CHAT_MODEL"),
            env_nonempty("SEO_CHAT_MAX_TOKENS"),
            env_nonempty("SEO_CHAT_MAX_TOOL_ROUNDS"),
            env_nonempty("ANTHROPIC_API_KEY"),
        )
    }

    fn from_vars(
        model: Option<String>,
        max_tokens: Option<String>,
        max_tool_rounds: Option<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_TOKENS),
            max_tool_rounds: max_tool_rounds
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_MAX_TOOL_ROUNDS),
            api_key,
        }
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().context(
            "ANTHROPIC_API_KEY is not set; add it to your environment or .env file",
        )
    }
}

/// Transport for the tool server.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transport {
    Stdio,
    Http,
}

/// Settings for `mcp-seo serve`.
#[derive(Debug, Clone)]
pub struct ServeSettings {
    pub transport: Transport,
    pub port: u16,
}

impl ServeSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            env_nonempty("MCP_SERVER_TRANSPORT"),
            env_nonempty("MCP_SERVER_PORT"),
        )
    }

    fn from_vars(transport: Option<String>, port: Option<String>) -> Result<Self> {
        let transport = match transport.as_deref() {
            None => Transport::Stdio,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "stdio" => Transport::Stdio,
                "http" => Transport::Http,
                other => bail!(
                    "MCP_SERVER_TRANSPORT must be 'stdio' or 'http', got '{other}'"
                ),
            },
        };
        let port = match port {
            None => DEFAULT_HTTP_PORT,
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("MCP_SERVER_PORT is not a valid port: '{raw}'"))?,
        };
        Ok(Self { transport, port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_defaults_apply() {
        let s = ChatSettings::from_vars(None, None, None, None);
        assert_eq!(s.model, DEFAULT_MODEL);
        assert_eq!(s.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(s.max_tool_rounds, DEFAULT_MAX_TOOL_ROUNDS);
        assert!(s.api_key.is_none());
        assert!(s.require_api_key().is_err());
    }

    #[test]
    fn chat_overrides_parse() {
        let s = ChatSettings::from_vars(
            Some("claude-sonnet-4".into()),
            Some("4096".into()),
            Some("3".into()),
            Some("sk-test".into()),
        );
        assert_eq!(s.model, "claude-sonnet-4");
        assert_eq!(s.max_tokens, 4096);
        assert_eq!(s.max_tool_rounds, 3);
        assert_eq!(s.require_api_key().unwrap(), "sk-test");
    }

    #[test]
    fn zero_tool_rounds_falls_back_to_default() {
        let s = ChatSettings::from_vars(None, None, Some("0".into()), None);
        assert_eq!(s.max_tool_rounds, DEFAULT_MAX_TOOL_ROUNDS);
    }

    #[test]
    fn serve_defaults_to_stdio() {
        let s = ServeSettings::from_vars(None, None).unwrap();
        assert_eq!(s.transport, Transport::Stdio);
        assert_eq!(s.port, DEFAULT_HTTP_PORT);
    }

    #[test]
    fn serve_http_with_port() {
        let s = ServeSettings::from_vars(Some("http".into()), Some("8080".into())).unwrap();
        assert_eq!(s.transport, Transport::Http);
        assert_eq!(s.port, 8080);
    }

    #[test]
    fn serve_rejects_bad_transport() {
        assert!(ServeSettings::from_vars(Some("sse".into()), None).is_err());
    }

    #[test]
    fn serve_rejects_bad_port() {
        assert!(ServeSettings::from_vars(None, Some("not-a-port".into())).is_err());
    }
}
