/*!
Formatting primitives for the human output paths (chat, tools, call).

Centralizes the style decision logic (NO_COLOR / NO_EMOJI env) and degrades
to plain text when ANSI is disabled. JSON output paths must not use these
helpers so machine output stays clean.
*/

use std::borrow::Cow;

#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub use_color: bool,
    pub use_emoji: bool,
    pub term_width: usize,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self::detect()
    }
}

impl StyleOptions {
    pub fn detect() -> Self {
        let width = std::env::var("COLUMNS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|w| w.clamp(40, 220))
            .unwrap_or(100);
        StyleOptions {
            use_color: std::env::var_os("NO_COLOR").is_none(),
            use_emoji: std::env::var_os("NO_EMOJI").is_none(),
            term_width: width,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Primary,
    Secondary,
    Accent,
    Success,
    Warning,
    Error,
    Dim,
}

pub fn color(role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    if !style.use_color {
        return text.as_ref().to_string();
    }
    let code = match role {
        Role::Primary => "38;5;45",
        Role::Secondary => "38;5;250",
        Role::Accent => "38;5;213",
        Role::Success => "38;5;82",
        Role::Warning => "38;5;214",
        Role::Error => "38;5;196",
        Role::Dim => "2",
    };
    format!("\x1b[{code}m{}\x1b[0m", text.as_ref())
}

pub fn emoji(tag: &str, style: &StyleOptions) -> &'static str {
    if !style.use_emoji {
        return "";
    }
    match tag {
        "success" => "✔",
        "error" => "✖",
        "warn" => "⚠",
        "info" => "ℹ",
        "tool" => "🛠",
        "chat" => "💬",
        _ => "",
    }
}

/// Boxed one-line header with an optional dimmed subtitle. Content longer
/// than the terminal is truncated so the borders stay aligned.
pub fn box_header(
    title: impl AsRef<str>,
    subtitle: Option<impl AsRef<str>>,
    style: &StyleOptions,
) -> String {
    let max_inner = style.term_width.saturating_sub(4).max(8);
    let title = truncate_ellipsis(title.as_ref(), max_inner);
    let inner = match subtitle {
        Some(sub) => {
            let remaining = max_inner.saturating_sub(title.chars().count() + 2);
            if remaining < 2 {
                color(Role::Primary, &title, style)
            } else {
                format!(
                    "{}  {}",
                    color(Role::Primary, &title, style),
                    color(Role::Secondary, truncate_ellipsis(sub.as_ref(), remaining), style)
                )
            }
        }
        None => color(Role::Primary, &title, style),
    };
    let inner_len = display_width(&inner);
    let bar = "─".repeat(inner_len + 2);
    format!("┌{bar}┐\n│ {inner} │\n└{bar}┘")
}

/// Compact two-space-separated table with a dashed header separator. Columns
/// wider than the terminal are shrunk greedily, widest first.
pub fn table(headers: &[&str], rows: &[Vec<String>], style: &StyleOptions) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(cols) {
            widths[i] = widths[i].max(display_width(cell));
        }
    }

    let total: usize = widths.iter().sum::<usize>() + (cols - 1) * 2;
    if total > style.term_width {
        let mut overflow = total - style.term_width;
        let mut ordered: Vec<usize> = (0..cols).collect();
        ordered.sort_by_key(|&i| std::cmp::Reverse(widths[i]));
        for i in ordered {
            if overflow == 0 {
                break;
            }
            let shrink = widths[i].saturating_sub(8).min(overflow);
            widths[i] -= shrink;
            overflow -= shrink;
        }
    }

    let mut out = String::new();
    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            out.push_str("  ");
        }
        out.push_str(&color(Role::Accent, pad_or_truncate(header, widths[i]), style));
    }
    out.push('\n');
    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&color(Role::Dim, sep.join("  "), style));
    for row in rows {
        out.push('\n');
        for c in 0..cols {
            if c > 0 {
                out.push_str("  ");
            }
            let raw = row.get(c).map(String::as_str).unwrap_or("");
            out.push_str(&pad_or_truncate(raw, widths[c]));
        }
    }
    out
}

fn pad_or_truncate(s: &str, width: usize) -> String {
    let len = display_width(s);
    if len <= width {
        return format!("{s}{}", " ".repeat(width - len));
    }
    truncate_ellipsis(s, width)
}

pub fn truncate_ellipsis(s: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars == 1 {
        return "…".into();
    }
    let mut out: String = s.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

pub fn strip_ansi(s: &str) -> Cow<'_, str> {
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }
    let mut buf = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for n in chars.by_ref() {
                if n.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        buf.push(c);
    }
    Cow::Owned(buf)
}

fn display_width(s: &str) -> usize {
    strip_ansi(s).chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> StyleOptions {
        StyleOptions {
            use_color: false,
            use_emoji: false,
            term_width: 80,
        }
    }

    #[test]
    fn box_header_contains_title_and_subtitle() {
        let b = box_header("Tools (15)", Some("target=mcp-seo serve"), &plain());
        assert!(b.contains("Tools (15)"));
        assert!(b.contains("target=mcp-seo serve"));
        assert!(b.starts_with('┌'));
    }

    #[test]
    fn box_header_borders_match_overlong_content() {
        let style = StyleOptions {
            use_color: false,
            use_emoji: false,
            term_width: 40,
        };
        let b = box_header("a".repeat(100), Some("b".repeat(50)), &style);
        let widths: Vec<usize> = b.lines().map(|l| l.chars().count()).collect();
        assert_eq!(widths.len(), 3);
        assert!(widths.iter().all(|&w| w == widths[0]), "uneven box: {b}");
        assert!(widths[0] <= 40);
    }

    #[test]
    fn table_aligns_and_truncates() {
        let t = table(
            &["NAME", "DESCRIPTION"],
            &[
                vec!["get_topvisor_balance".into(), "Get account balance".into()],
                vec!["x".into(), "y".into()],
            ],
            &plain(),
        );
        assert!(t.contains("NAME"));
        assert!(t.contains("get_topvisor_balance"));
        assert!(t.lines().count() >= 4);
    }

    #[test]
    fn truncate_adds_ellipsis() {
        assert_eq!(truncate_ellipsis("abcdef", 4), "abc…");
        assert_eq!(truncate_ellipsis("ab", 4), "ab");
    }

    #[test]
    fn strip_ansi_removes_codes() {
        assert_eq!(strip_ansi("\x1b[31mRED\x1b[0m"), "RED");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn color_disabled_passthrough() {
        assert_eq!(color(Role::Error, "x", &plain()), "x");
    }
}
