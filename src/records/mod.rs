pub mod aggregate_report;
pub mod event_report;
pub mod source;
pub mod trigger;

pub use aggregate_report::{
    AggregateAttributionData, AggregateHistogramContribution, AggregateReport,
    AggregateReportStatus,
};
pub use event_report::{
    DebugReportStatus, EventReport, EventReportStatus, SummaryBucket,
};
pub use source::{AttributionMode, Source, SourceStatus, SourceType};
pub use trigger::{
    AggregatableTriggerDatum, AggregateDedupKey, DestinationType,
    EventTriggerDatum, Trigger, TriggerStatus,
};
