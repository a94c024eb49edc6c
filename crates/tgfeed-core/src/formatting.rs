//! Text helpers shared by the feed generator and chat replies.

/// Escape HTML special characters, including both quote styles.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Cut `text` to at most `max_chars` characters, appending `...` when something was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn truncates_on_char_boundary() {
        let text = "a".repeat(150);
        let t = truncate_chars(&text, 100);
        assert_eq!(t.chars().count(), 103);
        assert!(t.ends_with("..."));

        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars(&"x".repeat(100), 100), "x".repeat(100));
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
    }
}
