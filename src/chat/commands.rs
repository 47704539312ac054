/*!
Slash-command dispatcher.

One input line resolves locally before anything touches the network: numeric
ids, limits and ISO dates are validated here, unknown commands are reported
here, and only well-formed invocations reach the tool client. Free text falls
through to the model loop.
*/

use chrono::NaiveDate;
use serde_json::{Map, Value, json};

/// What to do with one line of user input.
#[derive(Debug, PartialEq)]
pub enum Dispatch {
    Empty,
    Quit,
    Help(HelpTopic),
    /// List prompts advertised by connected servers.
    Prompts,
    /// Fetch one prompt with `key=value` arguments.
    Prompt { name: String, args: Map<String, Value> },
    /// Read a resource URI (`@folders`, `@<topic>`).
    Resource(String),
    /// Direct tool invocation with pre-validated arguments.
    Invoke { tool: &'static str, args: Map<String, Value> },
    /// Correct command, wrong shape; payload is the usage line.
    Usage(&'static str),
    /// Correct command, bad value; payload is the reason.
    Invalid(String),
    Unknown(String),
    /// Free text for the model loop.
    Query(String),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum HelpTopic {
    Topvisor,
    Ahrefs,
}

impl HelpTopic {
    pub fn text(self) -> &'static str {
        match self {
            HelpTopic::Topvisor => TOPVISOR_HELP,
            HelpTopic::Ahrefs => AHREFS_HELP,
        }
    }
}

pub const TOPVISOR_HELP: &str = "\
Topvisor commands:
  /setup                               check API key and connection
  /projects                            list your projects
  /keywords <project_id> [folder] [group]
                                       project keywords
  /positions <project_id> [from] [to]  position history (dates YYYY-MM-DD)
  /competitors <project_id>            project competitors
  /balance                             account balance";

pub const AHREFS_HELP: &str = "\
Ahrefs commands:
  /ahrefs_setup                        check API key and connection
  /refdomains <domain> [limit] [sort]  referring domains
  /backlinks <domain> [limit] [sort]   backlinks
  /organic <domain> [limit] [sort] [date]
                                       organic keywords (date YYYY-MM-DD)";

const USAGE_PROMPT: &str = "usage: /prompt <name> [key=value ...]";
const USAGE_KEYWORDS: &str = "usage: /keywords <project_id> [folder_id] [group_id]";
const USAGE_POSITIONS: &str = "usage: /positions <project_id> [date_from] [date_to]";
const USAGE_COMPETITORS: &str = "usage: /competitors <project_id>";
const USAGE_REFDOMAINS: &str = "usage: /refdomains <domain> [limit] [sort]";
const USAGE_BACKLINKS: &str = "usage: /backlinks <domain> [limit] [sort]";
const USAGE_ORGANIC: &str = "usage: /organic <domain> [limit] [sort] [date]";

pub fn parse_line(line: &str) -> Dispatch {
    let line = line.trim();
    if line.is_empty() {
        return Dispatch::Empty;
    }
    if line.eq_ignore_ascii_case("quit") {
        return Dispatch::Quit;
    }
    if let Some(topic) = line.strip_prefix('@') {
        let topic = topic.trim();
        if topic.is_empty() {
            return Dispatch::Invalid("resource topic is empty".into());
        }
        return Dispatch::Resource(if topic == "folders" {
            "papers://folders".to_string()
        } else {
            format!("papers://{topic}")
        });
    }
    if line.starts_with('/') {
        return parse_command(line);
    }
    Dispatch::Query(line.to_string())
}

fn parse_command(line: &str) -> Dispatch {
    let mut parts = line.split_whitespace();
    // split_whitespace on a non-empty line always yields a first token
    let Some(command) = parts.next() else {
        return Dispatch::Empty;
    };
    let args: Vec<&str> = parts.collect();
    match command {
        "/topvisor" => Dispatch::Help(HelpTopic::Topvisor),
        "/ahrefs" => Dispatch::Help(HelpTopic::Ahrefs),
        "/prompts" => Dispatch::Prompts,
        "/prompt" => parse_prompt(&args),
        "/setup" => Dispatch::Invoke {
            tool: "check_topvisor_setup",
            args: Map::new(),
        },
        "/ahrefs_setup" => Dispatch::Invoke {
            tool: "check_ahrefs_setup",
            args: Map::new(),
        },
        "/projects" => Dispatch::Invoke {
            tool: "get_topvisor_projects",
            args: Map::new(),
        },
        "/balance" => Dispatch::Invoke {
            tool: "get_topvisor_balance",
            args: Map::new(),
        },
        "/keywords" => parse_keywords(&args),
        "/positions" => parse_positions(&args),
        "/competitors" => parse_competitors(&args),
        "/refdomains" => parse_site_listing(
            &args,
            "get_ahrefs_refdomains",
            USAGE_REFDOMAINS,
            "domain_rating:desc",
            false,
        ),
        "/backlinks" => parse_site_listing(
            &args,
            "get_ahrefs_backlinks",
            USAGE_BACKLINKS,
            "domain_rating_source:desc",
            false,
        ),
        "/organic" => parse_site_listing(
            &args,
            "get_ahrefs_organic_keywords",
            USAGE_ORGANIC,
            "best_position:asc",
            true,
        ),
        other => Dispatch::Unknown(other.to_string()),
    }
}

fn parse_prompt(args: &[&str]) -> Dispatch {
    let Some((name, rest)) = args.split_first() else {
        return Dispatch::Usage(USAGE_PROMPT);
    };
    let mut map = Map::new();
    for pair in rest {
        let Some((key, value)) = pair.split_once('=') else {
            return Dispatch::Invalid(format!("expected key=value, got '{pair}'"));
        };
        if key.is_empty() {
            return Dispatch::Invalid(format!("expected key=value, got '{pair}'"));
        }
        map.insert(key.to_string(), json!(value));
    }
    Dispatch::Prompt {
        name: name.to_string(),
        args: map,
    }
}

fn parse_keywords(args: &[&str]) -> Dispatch {
    if args.is_empty() || args.len() > 3 {
        return Dispatch::Usage(USAGE_KEYWORDS);
    }
    let Some(project_id) = parse_id(args[0]) else {
        return Dispatch::Invalid("project_id must be a number".into());
    };
    let mut map = Map::new();
    map.insert("project_id".into(), json!(project_id));
    for (key, raw) in [("folder_id", args.get(1)), ("group_id", args.get(2))] {
        if let Some(raw) = raw {
            let Some(id) = parse_id(raw) else {
                return Dispatch::Invalid(format!("{key} must be a number"));
            };
            map.insert(key.into(), json!(id));
        }
    }
    Dispatch::Invoke {
        tool: "get_topvisor_keywords",
        args: map,
    }
}

fn parse_positions(args: &[&str]) -> Dispatch {
    if args.is_empty() || args.len() > 3 {
        return Dispatch::Usage(USAGE_POSITIONS);
    }
    let Some(project_id) = parse_id(args[0]) else {
        return Dispatch::Invalid("project_id must be a number".into());
    };
    let mut map = Map::new();
    map.insert("project_id".into(), json!(project_id));
    for (key, raw) in [("date1", args.get(1)), ("date2", args.get(2))] {
        if let Some(raw) = raw {
            if !is_iso_date(raw) {
                return Dispatch::Invalid(format!("{raw} is not a valid date (YYYY-MM-DD)"));
            }
            map.insert(key.into(), json!(raw));
        }
    }
    Dispatch::Invoke {
        tool: "get_topvisor_positions_history",
        args: map,
    }
}

fn parse_competitors(args: &[&str]) -> Dispatch {
    if args.len() != 1 {
        return Dispatch::Usage(USAGE_COMPETITORS);
    }
    let Some(project_id) = parse_id(args[0]) else {
        return Dispatch::Invalid("project_id must be a number".into());
    };
    let mut map = Map::new();
    map.insert("project_id".into(), json!(project_id));
    Dispatch::Invoke {
        tool: "get_topvisor_competitors",
        args: map,
    }
}

/// Shared shape of the three Ahrefs listings: target, optional limit, optional
/// sort, and (for organic keywords) an optional snapshot date.
fn parse_site_listing(
    args: &[&str],
    tool: &'static str,
    usage: &'static str,
    default_order: &str,
    with_date: bool,
) -> Dispatch {
    let max_args = if with_date { 4 } else { 3 };
    if args.is_empty() || args.len() > max_args {
        return Dispatch::Usage(usage);
    }
    let mut map = Map::new();
    map.insert("target".into(), json!(args[0]));
    let limit = match args.get(1) {
        None => 100,
        Some(raw) => match parse_id(raw) {
            Some(n) if n > 0 => n,
            _ => return Dispatch::Invalid("limit must be a positive number".into()),
        },
    };
    map.insert("limit".into(), json!(limit));
    map.insert(
        "order_by".into(),
        json!(args.get(2).copied().unwrap_or(default_order)),
    );
    if with_date && let Some(date) = args.get(3) {
        if !is_iso_date(date) {
            return Dispatch::Invalid(format!("{date} is not a valid date (YYYY-MM-DD)"));
        }
        map.insert("date".into(), json!(date));
    }
    Dispatch::Invoke { tool, args: map }
}

fn parse_id(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn is_iso_date(raw: &str) -> bool {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoked(line: &str) -> (&'static str, Map<String, Value>) {
        match parse_line(line) {
            Dispatch::Invoke { tool, args } => (tool, args),
            other => panic!("expected Invoke, got {other:?}"),
        }
    }

    #[test]
    fn blank_and_quit() {
        assert_eq!(parse_line("   "), Dispatch::Empty);
        assert_eq!(parse_line("quit"), Dispatch::Quit);
        assert_eq!(parse_line("QUIT"), Dispatch::Quit);
    }

    #[test]
    fn zero_arg_commands() {
        assert_eq!(invoked("/setup").0, "check_topvisor_setup");
        assert_eq!(invoked("/ahrefs_setup").0, "check_ahrefs_setup");
        assert_eq!(invoked("/projects").0, "get_topvisor_projects");
        assert_eq!(invoked("/balance").0, "get_topvisor_balance");
    }

    #[test]
    fn help_topics() {
        assert_eq!(parse_line("/topvisor"), Dispatch::Help(HelpTopic::Topvisor));
        assert_eq!(parse_line("/ahrefs"), Dispatch::Help(HelpTopic::Ahrefs));
    }

    #[test]
    fn keywords_with_filters() {
        let (tool, args) = invoked("/keywords 4878567 12 34");
        assert_eq!(tool, "get_topvisor_keywords");
        assert_eq!(args["project_id"], 4878567);
        assert_eq!(args["folder_id"], 12);
        assert_eq!(args["group_id"], 34);
    }

    #[test]
    fn non_numeric_project_id_is_rejected_locally() {
        match parse_line("/keywords abc") {
            Dispatch::Invalid(msg) => assert_eq!(msg, "project_id must be a number"),
            other => panic!("expected Invalid, got {other:?}"),
        }
        assert!(matches!(parse_line("/competitors xyz"), Dispatch::Invalid(_)));
        assert!(matches!(parse_line("/positions nope"), Dispatch::Invalid(_)));
    }

    #[test]
    fn positions_validates_dates() {
        let (tool, args) = invoked("/positions 123 2025-08-01 2025-08-20");
        assert_eq!(tool, "get_topvisor_positions_history");
        assert_eq!(args["date1"], "2025-08-01");
        assert_eq!(args["date2"], "2025-08-20");

        match parse_line("/positions 123 2025-13-40") {
            Dispatch::Invalid(msg) => assert!(msg.contains("not a valid date")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn refdomains_passes_exact_parameters() {
        let (tool, args) = invoked("/refdomains example.com 100 domain_rating:desc");
        assert_eq!(tool, "get_ahrefs_refdomains");
        assert_eq!(args.len(), 3);
        assert_eq!(args["target"], "example.com");
        assert_eq!(args["limit"], 100);
        assert_eq!(args["order_by"], "domain_rating:desc");
    }

    #[test]
    fn listing_defaults_apply() {
        let (_, args) = invoked("/refdomains example.com");
        assert_eq!(args["limit"], 100);
        assert_eq!(args["order_by"], "domain_rating:desc");

        let (_, args) = invoked("/backlinks example.com 50");
        assert_eq!(args["limit"], 50);
        assert_eq!(args["order_by"], "domain_rating_source:desc");

        let (tool, args) = invoked("/organic example.com 10 sum_traffic:desc 2024-06-01");
        assert_eq!(tool, "get_ahrefs_organic_keywords");
        assert_eq!(args["order_by"], "sum_traffic:desc");
        assert_eq!(args["date"], "2024-06-01");
    }

    #[test]
    fn bad_limit_is_rejected() {
        assert!(matches!(
            parse_line("/refdomains example.com many"),
            Dispatch::Invalid(_)
        ));
        assert!(matches!(
            parse_line("/backlinks example.com -5"),
            Dispatch::Invalid(_)
        ));
    }

    #[test]
    fn missing_required_args_show_usage() {
        assert_eq!(parse_line("/keywords"), Dispatch::Usage(USAGE_KEYWORDS));
        assert_eq!(parse_line("/refdomains"), Dispatch::Usage(USAGE_REFDOMAINS));
        assert_eq!(
            parse_line("/competitors 1 2"),
            Dispatch::Usage(USAGE_COMPETITORS)
        );
    }

    #[test]
    fn unknown_command_is_reported() {
        match parse_line("/frobnicate now") {
            Dispatch::Unknown(cmd) => assert_eq!(cmd, "/frobnicate"),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn resources_map_to_paper_uris() {
        assert_eq!(
            parse_line("@folders"),
            Dispatch::Resource("papers://folders".into())
        );
        assert_eq!(
            parse_line("@machine_learning"),
            Dispatch::Resource("papers://machine_learning".into())
        );
    }

    #[test]
    fn prompt_parses_key_value_arguments() {
        match parse_line("/prompt summarize topic=seo depth=2") {
            Dispatch::Prompt { name, args } => {
                assert_eq!(name, "summarize");
                assert_eq!(args["topic"], "seo");
                assert_eq!(args["depth"], "2");
            }
            other => panic!("expected Prompt, got {other:?}"),
        }
        assert_eq!(parse_line("/prompt"), Dispatch::Usage(USAGE_PROMPT));
        assert!(matches!(
            parse_line("/prompt name oops"),
            Dispatch::Invalid(_)
        ));
    }

    #[test]
    fn free_text_becomes_a_query() {
        match parse_line("how are my positions this week?") {
            Dispatch::Query(text) => assert!(text.starts_with("how are")),
            other => panic!("expected Query, got {other:?}"),
        }
    }
}
