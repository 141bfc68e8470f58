pub mod entry;

pub use entry::{DecodedPayload, ScanHistoryEntry, ScanOutcome, SubmissionResult};
