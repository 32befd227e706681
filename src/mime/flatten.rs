use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use serde::{Deserialize, Serialize};

/// A node in the provider's nested MIME-part tree. Container parts (e.g.
/// `multipart/mixed`) carry only `parts`; leaves carry a `body_base64`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MimePart {
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body_base64: Option<String>,
    #[serde(default)]
    pub parts: Vec<MimePart>,
}

impl MimePart {
    /// Decode this part's base64 body as UTF-8 (lossy).
    pub fn decoded_body(&self) -> Option<String> {
        let encoded = self.body_base64.as_ref()?;
        let bytes = URL_SAFE
            .decode(encoded)
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(encoded))
            .ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Depth-first flatten of the MIME tree into leaf parts, skipping
/// container-only nodes (spec §4.1).
pub fn flatten(payload: &MimePart) -> Vec<&MimePart> {
    let mut leaves = Vec::new();
    flatten_into(payload, &mut leaves);
    leaves
}

fn flatten_into<'a>(part: &'a MimePart, leaves: &mut Vec<&'a MimePart>) {
    if part.parts.is_empty() {
        leaves.push(part);
    } else {
        for child in &part.parts {
            flatten_into(child, leaves);
        }
    }
}

/// First `text/plain` part wins for text; first `text/html` wins for html.
pub fn pick_text(parts: &[&MimePart]) -> (Option<String>, Option<String>) {
    let mut text = None;
    let mut html = None;
    for part in parts {
        match part.mime_type.as_deref() {
            Some("text/plain") if text.is_none() => text = part.decoded_body(),
            Some("text/html") if html.is_none() => html = part.decoded_body(),
            _ => {}
        }
        if text.is_some() && html.is_some() {
            break;
        }
    }
    (text, html)
}
