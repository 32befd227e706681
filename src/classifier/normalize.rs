use std::str::FromStr;

use crate::models::Bucket;

/// Normalize a raw label string against the fixed alias table (spec §4.4).
/// Returns `None` when the label is unrecognized even after normalization.
pub fn normalize_label(raw: &str) -> Option<Bucket> {
    let lower = raw.trim().to_lowercase();

    if let Ok(bucket) = Bucket::from_str(&lower) {
        return Some(bucket);
    }

    match lower.as_str() {
        "appt" | "calendar" | "appointment" => Some(Bucket::Appointments),
        "rx" | "prescription" | "medication" => Some(Bucket::Medications),
        "spam" | "junk" | "trash" => Some(Bucket::Ignore),
        "bill" | "invoice" | "billing" => Some(Bucket::Bills),
        "review" | "uncertain" => Some(Bucket::NeedsReview),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_labels_pass_through() {
        assert_eq!(normalize_label("appointments"), Some(Bucket::Appointments));
        assert_eq!(normalize_label("ignore"), Some(Bucket::Ignore));
    }

    #[test]
    fn aliases_normalize() {
        assert_eq!(normalize_label("appt"), Some(Bucket::Appointments));
        assert_eq!(normalize_label("calendar"), Some(Bucket::Appointments));
        assert_eq!(normalize_label("rx"), Some(Bucket::Medications));
        assert_eq!(normalize_label("prescription"), Some(Bucket::Medications));
        assert_eq!(normalize_label("spam"), Some(Bucket::Ignore));
        assert_eq!(normalize_label("JUNK"), Some(Bucket::Ignore));
    }

    #[test]
    fn unknown_label_returns_none() {
        assert_eq!(normalize_label("banana"), None);
    }
}
