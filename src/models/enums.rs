use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(TaskType {
    Appointment => "appointment",
    Bill => "bill",
    Medication => "medication",
    General => "general",
});

str_enum!(TaskStatus {
    Todo => "todo",
    InProgress => "in_progress",
    Scheduled => "scheduled",
    Snoozed => "snoozed",
    Done => "done",
});

str_enum!(ReviewState {
    Pending => "pending",
    Approved => "approved",
    Ignored => "ignored",
});

str_enum!(SourceStatus {
    Active => "active",
    Errored => "errored",
    Disconnected => "disconnected",
});

str_enum!(SourceProvider {
    Google => "google",
});

str_enum!(SyncReason {
    Push => "push",
    Poll => "poll",
    Manual => "manual",
});

/// The classifier's output label, or absent on classification failure.
/// Distinct from `TaskType`: a `needs_review`/`ignore` bucket never becomes
/// a task type directly — routing decides that separately.
str_enum!(Bucket {
    Appointments => "appointments",
    Bills => "bills",
    Medications => "medications",
    NeedsReview => "needs_review",
    Ignore => "ignore",
});

/// Per-message outcome of the upsert layer (C11).
str_enum!(IngestOutcome {
    Created => "created",
    Updated => "updated",
    Skipped => "skipped",
    SkippedLowConfidence => "skipped_low_confidence",
    SkippedIgnored => "skipped_ignored",
    Tombstoned => "tombstoned",
    Errored => "errored",
});
