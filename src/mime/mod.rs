//! Header decoding and MIME-part flattening (C1).

pub mod flatten;
pub mod html;
pub mod ics;
pub mod rfc2047;

pub use flatten::{flatten, pick_text, MimePart};
pub use html::strip_html;
pub use ics::{extract_ics, IcsEvent};
pub use rfc2047::decode_rfc2047;

/// Footer phrases whose presence at or after byte offset 200 (case
/// insensitive) truncates the body (spec §4.1).
const FOOTER_MARKERS: &[&str] = &[
    "unsubscribe",
    "manage preferences",
    "update your preferences",
    "privacy policy",
    "terms of service",
    "view in browser",
];

/// Truncate `body` at the first footer marker found at or past offset 200.
pub fn truncate_footer_noise(body: &str) -> String {
    let lower = body.to_lowercase();
    let mut earliest: Option<usize> = None;
    for marker in FOOTER_MARKERS {
        if let Some(pos) = lower.find(marker) {
            if pos >= 200 && earliest.map_or(true, |e| pos < e) {
                earliest = Some(pos);
            }
        }
    }
    match earliest {
        Some(pos) => body.chars().take(char_index_for_byte(body, pos)).collect(),
        None => body.to_string(),
    }
}

fn char_index_for_byte(s: &str, byte_pos: usize) -> usize {
    s.char_indices().take_while(|(i, _)| *i < byte_pos).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_footer_noise_cuts_at_marker_past_200() {
        let prefix = "a".repeat(210);
        let body = format!("{prefix}click here to unsubscribe from this list");
        let truncated = truncate_footer_noise(&body);
        assert_eq!(truncated.len(), prefix.len());
    }

    #[test]
    fn truncate_footer_noise_ignores_marker_before_200() {
        let body = "please unsubscribe if you want, but also here is the rest of a long message that goes on and on and on and on and on and on and on and on";
        let truncated = truncate_footer_noise(body);
        assert_eq!(truncated, body);
    }
}
