use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static THREE_OR_MORE_LF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Remove tags, decode the five named entities, normalize line endings to
/// LF, collapse runs of blank lines, and trim trailing per-line whitespace
/// (spec §4.1).
pub fn strip_html(s: &str) -> String {
    let normalized = s.replace("\r\n", "\n").replace('\r', "\n");
    let untagged = TAG.replace_all(&normalized, "");
    let decoded = decode_entities(&untagged);
    let collapsed = THREE_OR_MORE_LF.replace_all(&decoded, "\n\n");
    collapsed
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}
