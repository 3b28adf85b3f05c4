// Sanitize creator content before it reaches a provider.
// Strips markup tags and invisible/control characters, tidies blank lines,
// and clamps the length.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum content length sent to providers (characters).
pub const MAX_CONTENT_CHARS: usize = 20_000;

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z!][^<>]*>").expect("tag pattern is valid"));

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("blank-run pattern is valid"));

/// Sanitize raw content. An empty result means there is nothing to analyze.
pub fn sanitize_content(raw: &str) -> String {
    let without_tags = TAG_PATTERN.replace_all(raw, "");
    let visible = remove_invisible_chars(&without_tags.replace("\r\n", "\n"));
    let tidy = BLANK_RUNS.replace_all(&visible, "\n\n");
    clamp_chars(tidy.trim(), MAX_CONTENT_CHARS)
}

/// Drop control characters (keeping newline and tab) and zero-width or
/// bidi formatting characters.
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if *c == '\n' || *c == '\t' {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

fn clamp_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
