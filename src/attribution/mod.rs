pub mod job_handler;
pub mod selection;

pub use job_handler::{AttributionJobHandler, JobSummary, TriggerOutcome};
