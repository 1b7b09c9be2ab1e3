use regex::Regex;
use std::sync::LazyLock;

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("valid regex"));

/// Truncate a tool result to at most `max_chars`, stripping ANSI escapes
/// first so the character budget isn't spent on invisible control codes.
pub fn truncate_tool_result(result: &str, max_chars: usize) -> String {
    let clean = ANSI_ESCAPE.replace_all(result, "").to_string();

    if clean.len() <= max_chars {
        return clean;
    }

    if max_chars < 120 {
        let safe = floor_char_boundary(&clean, max_chars);
        return clean[..safe].to_string();
    }

    let budget = max_chars - 100;
    let safe_budget = floor_char_boundary(&clean, budget);
    format!(
        "{}\n\n... [truncated - showed {} of {} chars. Do NOT re-run this tool to see more.]",
        &clean[..safe_budget],
        safe_budget,
        clean.len()
    )
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_result_untouched() {
        assert_eq!(truncate_tool_result("hello", 100), "hello");
    }

    #[test]
    fn long_result_truncated_with_marker() {
        let long = "a".repeat(500);
        let out = truncate_tool_result(&long, 200);
        assert!(out.len() <= 220);
        assert!(out.contains("truncated"));
    }

    #[test]
    fn ansi_escapes_stripped() {
        let input = "\x1b[31mred\x1b[0m text";
        assert_eq!(truncate_tool_result(input, 100), "red text");
    }

    #[test]
    fn tiny_budget_returns_bare_slice() {
        let long = "hello world".repeat(10);
        let out = truncate_tool_result(&long, 10);
        assert_eq!(out.len(), 10);
    }
}
