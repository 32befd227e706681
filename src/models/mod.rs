pub mod enums;
pub mod event;
pub mod source;
pub mod suppression;
pub mod task;

pub use enums::{
    Bucket, IngestOutcome, ReviewState, SourceProvider, SourceStatus, SyncReason, TaskStatus,
    TaskType,
};
pub use event::IngestionEvent;
pub use source::Source;
pub use suppression::SenderSuppression;
pub use task::{AppointmentFields, BillFields, MedicationFields, Task, TaskUpsertPayload};
