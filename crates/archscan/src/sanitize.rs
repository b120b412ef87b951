//! Helpers for sanitizing user-supplied strings and span attributes.
//!
//! Traces are safe to share for debugging: only file names, never full
//! upload paths, go into spans.

use std::path::Path;

/// Elements whose content is dropped along with the tags.
const DROPPED_ELEMENTS: &[&str] = &["script", "style"];

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Replaces each of `paths` in `text` with its file name.
///
/// Longer paths are replaced first, so a child path keeps its own file name
/// instead of its parent's.
pub fn redact_paths_in(text: &str, paths: &[&Path]) -> String {
    let mut ordered: Vec<(String, String)> = paths
        .iter()
        .map(|p| (p.to_string_lossy().into_owned(), redact_path(p)))
        .filter(|(full, _)| !full.is_empty() && full != "/")
        .collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    ordered
        .iter()
        .fold(text.to_string(), |acc, (full, short)| acc.replace(full, short))
}

/// Removes all markup from `input` and escapes what is left.
///
/// Tags are dropped and their text kept, except for `<script>` and `<style>`
/// whose content is dropped too. The result contains no `<`, `>`, `&`, `"` or
/// `'` except as entities, and is trimmed.
pub fn strip_markup(input: &str) -> String {
    let mut text = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('<') {
        text.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        if !starts_tag(after) {
            text.push('<');
            rest = after;
            continue;
        }

        let Some(end) = after.find('>') else {
            // Unterminated tag: drop the remainder.
            rest = "";
            break;
        };

        let tag = &after[..end];
        rest = &after[end + 1..];

        if let Some(element) = opening_element(tag) {
            if DROPPED_ELEMENTS.contains(&element.as_str()) {
                rest = skip_past_closing(rest, &element);
            }
        }
    }
    text.push_str(rest);

    escape(text.trim())
}

fn starts_tag(after_lt: &str) -> bool {
    after_lt
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
}

/// Lower-cased element name of an opening tag, `None` for closing tags and comments.
fn opening_element(tag: &str) -> Option<String> {
    let name: String = tag
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name.to_ascii_lowercase())
    }
}

fn skip_past_closing<'a>(rest: &'a str, element: &str) -> &'a str {
    let closing = format!("</{}", element);
    let lower = rest.to_ascii_lowercase();
    match lower.find(&closing) {
        Some(pos) => match rest[pos..].find('>') {
            Some(end) => &rest[pos + end + 1..],
            None => "",
        },
        None => "",
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/tmp/archscan/5d7f.tar.gz")),
            "5d7f.tar.gz"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_redact_paths_in_text() {
        let root = Path::new("/tmp/archscan");
        let upload = root.join("5d7f.zip");
        let unpacked = root.join("5d7f");
        let stderr = "unzip:  cannot find zipfile directory in /tmp/archscan/5d7f.zip, \
                      writing /tmp/archscan/5d7f/app.py failed";

        let redacted = redact_paths_in(stderr, &[root, &upload, &unpacked]);

        assert!(!redacted.contains("/tmp"));
        assert!(redacted.contains("in 5d7f.zip,"));
        assert!(redacted.contains("writing 5d7f/app.py failed"));
    }

    #[test]
    fn test_redact_paths_in_skips_root() {
        assert_eq!(redact_paths_in("a/b", &[Path::new("/")]), "a/b");
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        assert_eq!(strip_markup("billing service v2"), "billing service v2");
    }

    #[test]
    fn test_tags_are_removed_text_kept() {
        assert_eq!(strip_markup("<b>bold</b> move"), "bold move");
        assert_eq!(strip_markup("<a href=\"x\">link</a>"), "link");
    }

    #[test]
    fn test_script_content_is_dropped() {
        assert_eq!(strip_markup("api<script>alert(1)</script>"), "api");
        assert_eq!(strip_markup("<STYLE>p{}</style>web"), "web");
    }

    #[test]
    fn test_special_characters_are_escaped() {
        assert_eq!(strip_markup("Tom & Jerry's \"app\""), "Tom &amp; Jerry&#39;s &#34;app&#34;");
        assert_eq!(strip_markup("a < b > c"), "a &lt; b &gt; c");
    }

    #[test]
    fn test_markup_only_becomes_empty() {
        assert_eq!(strip_markup("<img src=x onerror=alert(1)>"), "");
        assert_eq!(strip_markup("  <br/>  "), "");
    }

    #[test]
    fn test_unterminated_tag_is_dropped() {
        assert_eq!(strip_markup("name<img src=x"), "name");
    }

    #[test]
    fn test_comments_are_removed() {
        assert_eq!(strip_markup("a<!-- hidden -->b"), "ab");
    }
}
