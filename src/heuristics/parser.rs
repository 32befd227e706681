use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::TaskType;

use super::confidence::compute_confidence;

/// The typed extraction C2 produces before routing (spec §3 "Parsed
/// record"). Carries the heuristic confidence separately from the final
/// routed confidence (C5 may lower it).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsedRecord {
    pub r#type: TaskTypeOrDefault,
    pub confidence: f64,
    pub date: Option<DateTime<Utc>>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub statement_period: Option<String>,
    pub reference_number: Option<String>,
    pub vendor: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub route: Option<String>,
    pub prescriber: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub organizer: Option<String>,
}

/// Thin wrapper so `ParsedRecord` can `#[derive(Default)]` while `TaskType`
/// itself has no inherent default variant (spec treats "general" as the
/// fallback type, not a language-level default).
pub type TaskTypeOrDefault = TaskType;

impl Default for TaskType {
    fn default() -> Self {
        TaskType::General
    }
}

static APPOINTMENT_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)appointment|appt|calendar|meeting").unwrap());
static BILL_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bill|invoice|statement|amount due|payment").unwrap());
static MEDICATION_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)medication|prescription|rx|refill").unwrap());

static DATE_ISO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})(T\d{2}:\d{2}(:\d{2})?)?").unwrap());
static DATE_SLASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{2,4})\b").unwrap());
static DATE_MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?|Jul(?:y)?|Aug(?:ust)?|Sep(?:tember)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\.?\s+(\d{1,2}),?\s+(\d{4})\b").unwrap()
});

static AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\s?(\d{1,6}(?:,\d{3})*(?:\.\d{2})?)").unwrap());
static DUE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)due (?:on|by)\s+([A-Za-z0-9/,.\s-]{3,30}?)(?:[.\n]|$)").unwrap());
static STATEMENT_PERIOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)statement period[:\s]+(.+)").unwrap());
static REFERENCE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:invoice|statement|account)\s*(?:#|number)?\s*:?\s*([A-Z0-9-]{4,})").unwrap()
});
static VENDOR_FROM_BODY: Lazy<Regex> = Lazy::new(|| Regex::new(r"from ([A-Z][A-Za-z0-9&.,' -]*)").unwrap());
static DOSAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+\s?(?:mg|mcg|ml|tabs?))").unwrap());
static FREQUENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(once|twice) daily|q\d+h|every \d+ (?:hours|hrs|days)|bid|tid|qid").unwrap()
});
static ROUTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)oral|topical|inhaled?|ophthalmic|nasal").unwrap());
static PRESCRIBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"Dr\. [A-Z][a-z]+\s+[A-Z][a-z]+").unwrap());

/// Type selection: case-insensitive substring on subject+snippet+body,
/// first match wins (spec §4.2).
pub fn select_type(haystack: &str) -> TaskType {
    if APPOINTMENT_TYPE.is_match(haystack) {
        TaskType::Appointment
    } else if BILL_TYPE.is_match(haystack) {
        TaskType::Bill
    } else if MEDICATION_TYPE.is_match(haystack) {
        TaskType::Medication
    } else {
        TaskType::General
    }
}

fn parse_date_token(haystack: &str) -> Option<DateTime<Utc>> {
    if let Some(caps) = DATE_ISO.captures(haystack) {
        let date_part = &caps[1];
        let time_part = caps.get(2).map(|m| m.as_str());
        let full = match time_part {
            Some(t) => format!("{date_part}{t}"),
            None => format!("{date_part}T00:00:00"),
        };
        let fmt = if full.matches(':').count() == 2 {
            "%Y-%m-%dT%H:%M:%S"
        } else {
            "%Y-%m-%dT%H:%M"
        };
        if let Ok(naive) = NaiveDateTime::parse_from_str(&full, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Some(caps) = DATE_SLASH.captures(haystack) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let mut year: i32 = caps[3].parse().ok()?;
        if year < 100 {
            year += 2000;
        }
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    if let Some(caps) = DATE_MONTH_NAME.captures(haystack) {
        let month = month_from_name(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let month = match &lower[..3.min(lower.len())] {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn parse_amount(haystack: &str) -> Option<(f64, &'static str)> {
    let caps = AMOUNT.captures(haystack)?;
    let raw = caps[1].replace(',', "");
    raw.parse::<f64>().ok().map(|v| (v, "USD"))
}

fn vendor_from_sender(sender: &str) -> Option<String> {
    sender.split('@').nth(1).map(|domain| domain.trim_end_matches('>').to_string())
}

/// Run C2's field extraction over the decoded subject/sender/snippet/body,
/// optionally seeded by an ICS event (which forces `type = appointment`).
pub fn parse_fields(
    subject: &str,
    sender: &str,
    snippet: &str,
    body: &str,
    ics: Option<&crate::mime::IcsEvent>,
) -> ParsedRecord {
    let haystack = format!("{subject} {snippet} {body}");

    let r#type = if ics.is_some() {
        TaskType::Appointment
    } else {
        select_type(&haystack)
    };

    let date = parse_date_token(&haystack);
    let (amount, currency) = match parse_amount(&haystack) {
        Some((amount, currency)) => (Some(amount), Some(currency.to_string())),
        None => (None, None),
    };
    let due_at = DUE_DATE
        .captures(&haystack)
        .and_then(|c| parse_date_token(c[1].trim()));
    let statement_period = STATEMENT_PERIOD.captures(&haystack).map(|c| c[1].trim().to_string());
    let reference_number = REFERENCE_NUMBER.captures(&haystack).map(|c| c[1].to_string());
    let vendor = vendor_from_sender(sender).or_else(|| {
        VENDOR_FROM_BODY.captures(body).map(|c| c[1].trim().to_string())
    });
    let dosage = DOSAGE.captures(&haystack).map(|c| c[1].to_string());
    let frequency = FREQUENCY.captures(&haystack).map(|c| c[0].to_string());
    let route = ROUTE.captures(&haystack).map(|c| c[0].to_lowercase());
    let prescriber = PRESCRIBER.captures(&haystack).map(|c| c[0].to_string());

    let mut parsed = ParsedRecord {
        r#type,
        confidence: 0.0,
        date,
        amount,
        currency,
        due_at,
        statement_period,
        reference_number,
        vendor,
        dosage,
        frequency,
        route,
        prescriber,
        start_at: ics.and_then(|e| e.start_at),
        end_at: ics.and_then(|e| e.end_at),
        location: ics.and_then(|e| e.location.clone()),
        organizer: ics.and_then(|e| e.organizer.clone()),
    };

    parsed.confidence = compute_confidence(&parsed);
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_appointment_type() {
        assert_eq!(select_type("Appointment confirmed with Dr. Lee"), TaskType::Appointment);
    }

    #[test]
    fn selects_bill_type() {
        assert_eq!(select_type("Your invoice is ready"), TaskType::Bill);
    }

    #[test]
    fn selects_medication_type() {
        assert_eq!(select_type("Prescription refill ready"), TaskType::Medication);
    }

    #[test]
    fn falls_back_to_general() {
        assert_eq!(select_type("Just checking in"), TaskType::General);
    }

    #[test]
    fn first_match_wins_when_multiple_keywords_present() {
        assert_eq!(select_type("Appointment reminder, please pay your bill"), TaskType::Appointment);
    }

    #[test]
    fn ics_presence_forces_appointment_type() {
        let ics = crate::mime::IcsEvent {
            start_at: Some(Utc::now()),
            end_at: None,
            location: None,
            organizer: None,
            raw_dtstart: None,
        };
        let parsed = parse_fields("Payment due", "a@b.com", "invoice", "pay now", Some(&ics));
        assert_eq!(parsed.r#type, TaskType::Appointment);
    }

    #[test]
    fn extracts_amount_and_currency() {
        let parsed = parse_fields("Invoice", "billing@acme.com", "Amount due: $128.50", "", None);
        assert_eq!(parsed.amount, Some(128.50));
        assert_eq!(parsed.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn extracts_vendor_from_sender_domain() {
        let parsed = parse_fields("Invoice", "billing@acme.com", "pay now", "", None);
        assert_eq!(parsed.vendor.as_deref(), Some("acme.com"));
    }

    #[test]
    fn extracts_dosage_frequency_route_prescriber() {
        let parsed = parse_fields(
            "Prescription refill",
            "pharmacy@rx.com",
            "Take 20mg once daily oral as prescribed by Dr. Jane Smith",
            "",
            None,
        );
        assert_eq!(parsed.dosage.as_deref(), Some("20mg"));
        assert_eq!(parsed.frequency.as_deref(), Some("once daily"));
        assert_eq!(parsed.route.as_deref(), Some("oral"));
        assert_eq!(parsed.prescriber.as_deref(), Some("Dr. Jane Smith"));
    }

    #[test]
    fn extracts_reference_number() {
        let parsed = parse_fields("Invoice INV-10022 available", "a@b.com", "", "", None);
        assert_eq!(parsed.reference_number.as_deref(), Some("INV-10022"));
    }
}
