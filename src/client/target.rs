//! Target parsing: a server target string is either an http(s) URL or a local
//! command line to spawn.

use anyhow::{Context, Result, bail};
use shell_words::split as shell_split;
use std::fmt;
use url::Url;

#[derive(Debug, Clone)]
pub enum TargetSpec {
    /// A local process to be spawned over stdio. Command + arguments.
    LocalCommand {
        original: String,
        program: String,
        args: Vec<String>,
    },
    /// Remote JSON-RPC endpoint.
    HttpUrl { original: String, url: Url },
}

impl TargetSpec {
    pub fn original(&self) -> &str {
        match self {
            TargetSpec::LocalCommand { original, .. } => original,
            TargetSpec::HttpUrl { original, .. } => original,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, TargetSpec::LocalCommand { .. })
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::LocalCommand { program, args, .. } => {
                if args.is_empty() {
                    write!(f, "local: {program}")
                } else {
                    write!(f, "local: {program} {}", args.join(" "))
                }
            }
            TargetSpec::HttpUrl { url, .. } => write!(f, "remote: {url}"),
        }
    }
}

/// Parse a target string.
///
/// 1. Try as URL; http/https means remote.
/// 2. Otherwise shell-split into a local command line.
///
/// Examples:
/// - "https://example.org/mcp" -> HttpUrl
/// - "npx -y @modelcontextprotocol/server-everything" -> LocalCommand
/// - "./mcp-seo serve" -> LocalCommand
pub fn parse_target(raw: &str) -> Result<TargetSpec> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("Target string is empty");
    }

    if let Ok(url) = Url::parse(trimmed)
        && matches!(url.scheme(), "http" | "https")
    {
        return Ok(TargetSpec::HttpUrl {
            original: raw.to_string(),
            url,
        });
    }

    let parts =
        shell_split(trimmed).context("Failed to parse local command line (shell splitting)")?;
    if parts.is_empty() {
        bail!("No tokens produced when parsing local command target");
    }
    let program = parts[0].clone();
    if program.is_empty() {
        bail!("Empty program name in local command target");
    }
    Ok(TargetSpec::LocalCommand {
        original: raw.to_string(),
        program,
        args: parts[1..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_remote_http() {
        let spec = parse_target("https://example.com/mcp").unwrap();
        assert!(!spec.is_local());
        assert_eq!(spec.original(), "https://example.com/mcp");
    }

    #[test]
    fn parse_local_simple() {
        let spec = parse_target("mcp-seo serve").unwrap();
        assert!(spec.is_local());
        if let TargetSpec::LocalCommand { program, args, .. } = spec {
            assert_eq!(program, "mcp-seo");
            assert_eq!(args, vec!["serve"]);
        } else {
            panic!("Expected LocalCommand variant");
        }
    }

    #[test]
    fn parse_local_quoted() {
        let spec = parse_target(r#"my-server --path "/tmp/my dir""#).unwrap();
        if let TargetSpec::LocalCommand { args, .. } = spec {
            assert_eq!(args, vec!["--path", "/tmp/my dir"]);
        } else {
            panic!("Expected LocalCommand variant");
        }
    }

    #[test]
    fn unknown_scheme_falls_back_to_command() {
        let spec = parse_target("ftp://example.com/resource").unwrap();
        assert!(spec.is_local(), "Unknown scheme should fall back to local");
    }

    #[test]
    fn empty_target_rejected() {
        let err = parse_target("   ").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
