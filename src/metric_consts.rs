pub const EVENTS_RECEIVED: &str = "recon_events_received";
pub const EVENTS_SKIPPED: &str = "recon_events_skipped";
pub const EVENT_DECODE_FAILURES: &str = "recon_event_decode_failures";
pub const WORKFLOW_ERRORS: &str = "recon_workflow_errors";
pub const RECORDS_WRITTEN: &str = "recon_records_written";
pub const EVENTS_REPUBLISHED: &str = "recon_events_republished";
pub const REPUBLISH_FAILURES: &str = "recon_republish_failures";
pub const OFFSET_COMMIT_FAILURES: &str = "recon_offset_commit_failures";
