use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches one `=?charset?B|Q?text?=` encoded-word (spec §4.1).
static ENCODED_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"=\?([^?]+)\?([bBqQ])\?([^?]*)\?=").unwrap());

/// Decode a header value containing zero or more RFC 2047 encoded-words.
///
/// Unknown charsets fall back to UTF-8. Malformed base64 inside an
/// encoded-word is left literal rather than raising — the spec requires
/// this for the malformed-encoded-word property (§9).
pub fn decode_rfc2047(header: &str) -> String {
    let mut out = String::new();
    let mut last_end = 0;
    let mut prev_was_encoded_word = false;

    for caps in ENCODED_WORD.captures_iter(header) {
        let whole = caps.get(0).unwrap();
        let between = &header[last_end..whole.start()];

        if prev_was_encoded_word && !between.is_empty() && between.trim().is_empty() {
            // inter-word whitespace between two encoded-words collapses to one space
            out.push(' ');
        } else {
            out.push_str(between);
        }

        let charset = caps.get(1).unwrap().as_str();
        let encoding = caps.get(2).unwrap().as_str();
        let text = caps.get(3).unwrap().as_str();

        match decode_word(charset, encoding, text) {
            Some(decoded) => out.push_str(&decoded),
            None => out.push_str(whole.as_str()),
        }

        last_end = whole.end();
        prev_was_encoded_word = true;
    }

    out.push_str(&header[last_end..]);
    out
}

fn decode_word(charset: &str, encoding: &str, text: &str) -> Option<String> {
    match encoding.to_ascii_uppercase().as_str() {
        "B" => {
            let bytes = STANDARD.decode(text).ok()?;
            Some(decode_charset(charset, &bytes))
        }
        "Q" => {
            let mut bytes = Vec::with_capacity(text.len());
            let mut chars = text.chars();
            while let Some(c) = chars.next() {
                match c {
                    '_' => bytes.push(b' '),
                    '=' => {
                        let hi = chars.next()?;
                        let lo = chars.next()?;
                        let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16).ok()?;
                        bytes.push(byte);
                    }
                    other => {
                        let mut buf = [0u8; 4];
                        bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                    }
                }
            }
            Some(decode_charset(charset, &bytes))
        }
        _ => None,
    }
}

/// Decode `bytes` per `charset`; unsupported charsets fall through as UTF-8.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    match charset.to_ascii_lowercase().as_str() {
        "iso-8859-1" | "latin1" | "latin-1" => {
            // ISO-8859-1 maps each byte directly onto the matching Unicode
            // scalar value (U+0000..U+00FF), so no lookup table is needed.
            bytes.iter().map(|&b| b as char).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ascii_subject_is_unchanged() {
        let subject = "Appointment confirmation";
        assert_eq!(decode_rfc2047(subject), subject);
    }

    #[test]
    fn decodes_utf8_base64_word() {
        // "Café" in UTF-8 base64
        let header = "=?UTF-8?B?Q2Fmw6k=?=";
        assert_eq!(decode_rfc2047(header), "Café");
    }

    #[test]
    fn decodes_quoted_printable_with_underscores_as_spaces() {
        let header = "=?UTF-8?Q?Hello_World?=";
        assert_eq!(decode_rfc2047(header), "Hello World");
    }

    #[test]
    fn decodes_quoted_printable_hex_escape() {
        let header = "=?UTF-8?Q?50=25_off?=";
        assert_eq!(decode_rfc2047(header), "50% off");
    }

    #[test]
    fn decodes_iso_8859_1() {
        // 0xE9 in ISO-8859-1 is 'é'
        let header = "=?ISO-8859-1?B?Y2Fm6Q==?=";
        assert_eq!(decode_rfc2047(header), "café");
    }

    #[test]
    fn unknown_charset_falls_back_to_utf8() {
        let header = "=?x-unknown?B?aGVsbG8=?=";
        assert_eq!(decode_rfc2047(header), "hello");
    }

    #[test]
    fn malformed_base64_is_left_literal() {
        let header = "=?UTF-8?B?not valid base64!!?=";
        assert_eq!(decode_rfc2047(header), header);
    }

    #[test]
    fn multiple_words_collapse_inter_word_whitespace() {
        let header = "=?UTF-8?B?SGVsbG8=?=   =?UTF-8?B?V29ybGQ=?=";
        assert_eq!(decode_rfc2047(header), "Hello World");
    }

    #[test]
    fn multiple_words_preserve_non_whitespace_separator() {
        let header = "=?UTF-8?Q?Hello?=, =?UTF-8?Q?World?=";
        assert_eq!(decode_rfc2047(header), "Hello, World");
    }
}
