use serde::{Deserialize, Serialize};

use super::source::{Source, SourceType};
use crate::{
    reports::flexible::AttributedTrigger,
    values::{Timestamp, UnsignedLong},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventReportStatus {
    Pending,
    Delivered,
    MarkedToDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebugReportStatus {
    None,
    Pending,
}

/// Inclusive range of summary values a flexible report stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SummaryBucket {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventReport {
    pub id: String,
    pub source_id: String,
    pub trigger_id: String,
    pub source_event_id: UnsignedLong,
    pub enrollment_id: String,
    pub attribution_destinations: Vec<String>,
    pub source_type: SourceType,

    pub trigger_data: UnsignedLong,
    pub trigger_priority: i64,
    pub trigger_dedup_key: Option<UnsignedLong>,
    pub trigger_value: u64,
    pub trigger_time: Timestamp,

    pub report_time: Timestamp,
    pub randomized_trigger_rate: f64,
    pub status: EventReportStatus,
    pub debug_report_status: DebugReportStatus,

    /// Set on reports produced by a flexible report spec.
    pub trigger_summary_bucket: Option<SummaryBucket>,

    pub source_debug_key: Option<UnsignedLong>,
    pub trigger_debug_key: Option<UnsignedLong>,
}

impl EventReport {
    /// Builds a `PENDING` report crediting `attributed` to `source`.
    pub fn from_attributed_trigger(
        source: &Source,
        attributed: &AttributedTrigger,
        report_time: Timestamp,
        randomized_trigger_rate: f64,
        trigger_debug_key: Option<UnsignedLong>,
    ) -> Self {
        let debug_report_status =
            match (source.debug_key, trigger_debug_key) {
                (Some(_), Some(_)) => DebugReportStatus::Pending,
                _ => DebugReportStatus::None,
            };

        Self {
            id: format!("{}:{}", source.id, attributed.trigger_id),
            source_id: source.id.clone(),
            trigger_id: attributed.trigger_id.clone(),
            source_event_id: source.event_id,
            enrollment_id: source.enrollment_id.clone(),
            attribution_destinations: source
                .app_destinations
                .iter()
                .chain(&source.web_destinations)
                .cloned()
                .collect(),
            source_type: source.source_type,
            trigger_data: attributed.trigger_data,
            trigger_priority: attributed.priority,
            trigger_dedup_key: attributed.dedup_key,
            trigger_value: attributed.value,
            trigger_time: attributed.trigger_time,
            report_time,
            randomized_trigger_rate,
            status: EventReportStatus::Pending,
            debug_report_status,
            trigger_summary_bucket: None,
            source_debug_key: source.debug_key,
            trigger_debug_key,
        }
    }

    /// Tags the report with a summary bucket. The bucket start is folded
    /// into the id since one trigger may back several flexible reports.
    pub fn with_summary_bucket(mut self, bucket: SummaryBucket) -> Self {
        self.id = format!("{}:{}", self.id, bucket.start);
        self.trigger_summary_bucket = Some(bucket);
        self
    }

    /// Reports that count against a source's report limit.
    pub fn is_standing(&self) -> bool {
        matches!(
            self.status,
            EventReportStatus::Pending | EventReportStatus::Delivered
        )
    }
}
