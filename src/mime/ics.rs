use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::flatten::MimePart;

static DTSTART: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^DTSTART[^:]*:(\S+)").unwrap());
static DTEND: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^DTEND[^:]*:(\S+)").unwrap());
static LOCATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^LOCATION:(.*)").unwrap());
static ORGANIZER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^ORGANIZER;([^\r\n]*)").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcsEvent {
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub organizer: Option<String>,
    /// Raw DTSTART token as provided, for later timezone fix-up (spec §9:
    /// "a correct implementation should record the raw token alongside the
    /// parsed time").
    pub raw_dtstart: Option<String>,
}

/// First part with `mimeType = text/calendar` or filename `invite.ics`.
fn find_calendar_part<'a>(parts: &[&'a MimePart]) -> Option<&'a MimePart> {
    parts.iter().copied().find(|p| {
        p.mime_type.as_deref() == Some("text/calendar") || p.filename.as_deref() == Some("invite.ics")
    })
}

pub fn extract_ics(parts: &[&MimePart]) -> Option<IcsEvent> {
    let part = find_calendar_part(parts)?;
    let body = part.decoded_body()?;

    let raw_dtstart = DTSTART.captures(&body).map(|c| c[1].to_string());
    let start_at = raw_dtstart.as_deref().and_then(parse_ics_datetime);
    let end_at = DTEND.captures(&body).and_then(|c| parse_ics_datetime(&c[1]));
    let location = LOCATION.captures(&body).map(|c| c[1].trim().to_string());
    let organizer = ORGANIZER.captures(&body).map(|c| {
        // ORGANIZER;CN=Jane Doe:mailto:jane@example.com — keep the value after the colon if present.
        let rest = &c[1];
        rest.split_once(':').map(|(_, v)| v.to_string()).unwrap_or_else(|| rest.to_string())
    });

    Some(IcsEvent {
        start_at,
        end_at,
        location,
        organizer,
        raw_dtstart,
    })
}

/// Parse `YYYYMMDDTHHMMSS[Z]`: UTC when trailing `Z`, else treated as naive
/// UTC (documented limitation, spec §4.1 and §9).
fn parse_ics_datetime(token: &str) -> Option<DateTime<Utc>> {
    let (body, is_utc) = match token.strip_suffix('Z') {
        Some(stripped) => (stripped, true),
        None => (token, false),
    };
    let naive = NaiveDateTime::parse_from_str(body, "%Y%m%dT%H%M%S").ok()?;
    if is_utc {
        Some(Utc.from_utc_datetime(&naive))
    } else {
        Some(Utc.from_utc_datetime(&naive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ics_part(body: &str) -> MimePart {
        MimePart {
            mime_type: Some("text/calendar".into()),
            filename: None,
            headers: vec![],
            body_base64: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                body,
            )),
            parts: vec![],
        }
    }

    #[test]
    fn extracts_dtstart_dtend_location_organizer() {
        let body = "BEGIN:VEVENT\r\nDTSTART:20260121T143000Z\r\nDTEND:20260121T150000Z\r\nLOCATION:123 Main St\r\nORGANIZER;CN=Dr. Patel:mailto:patel@example.com\r\nEND:VEVENT";
        let part = ics_part(body);
        let parts = vec![&part];
        let event = extract_ics(&parts).unwrap();
        assert_eq!(event.start_at.unwrap().to_rfc3339(), "2026-01-21T14:30:00+00:00");
        assert_eq!(event.end_at.unwrap().to_rfc3339(), "2026-01-21T15:00:00+00:00");
        assert_eq!(event.location.as_deref(), Some("123 Main St"));
        assert_eq!(event.organizer.as_deref(), Some("mailto:patel@example.com"));
        assert_eq!(event.raw_dtstart.as_deref(), Some("20260121T143000Z"));
    }

    #[test]
    fn bare_datetime_without_z_is_treated_as_naive_utc() {
        let body = "DTSTART:20260121T143000";
        let part = ics_part(body);
        let parts = vec![&part];
        let event = extract_ics(&parts).unwrap();
        assert_eq!(event.start_at.unwrap().to_rfc3339(), "2026-01-21T14:30:00+00:00");
    }

    #[test]
    fn no_calendar_part_returns_none() {
        let part = MimePart {
            mime_type: Some("text/plain".into()),
            ..Default::default()
        };
        let parts = vec![&part];
        assert!(extract_ics(&parts).is_none());
    }

    #[test]
    fn recognizes_by_filename_when_mime_type_missing() {
        let mut part = ics_part("DTSTART:20260101T090000Z");
        part.mime_type = None;
        part.filename = Some("invite.ics".into());
        let parts = vec![&part];
        assert!(extract_ics(&parts).is_some());
    }
}
