use serde::{Deserialize, Serialize};

use crate::values::{Timestamp, UnsignedLong};

pub const AGGREGATE_API_VERSION: &str = "0.1";

/// One (bucket, value) pair of a histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregateHistogramContribution {
    pub key: u128,
    pub value: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateAttributionData {
    pub contributions: Vec<AggregateHistogramContribution>,
}

impl AggregateAttributionData {
    pub fn total_value(&self) -> u64 {
        self.contributions.iter().map(|c| u64::from(c.value)).sum()
    }

    /// `{"operation":"histogram","data":[{"bucket":"<decimal>","value":n}]}`
    pub fn cleartext_payload(&self) -> Result<String, serde_json::Error> {
        let payload = CleartextPayload {
            operation: "histogram",
            data: self
                .contributions
                .iter()
                .map(|c| CleartextBucket {
                    bucket: c.key.to_string(),
                    value: c.value,
                })
                .collect(),
        };
        serde_json::to_string(&payload)
    }
}

#[derive(Serialize)]
struct CleartextPayload {
    operation: &'static str,
    data: Vec<CleartextBucket>,
}

// Buckets are decimal strings: 128-bit keys do not fit a JSON number.
#[derive(Serialize)]
struct CleartextBucket {
    bucket: String,
    value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateReportStatus {
    Pending,
    Delivered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateReport {
    pub id: String,
    pub source_id: String,
    pub trigger_id: String,
    pub publisher: String,
    pub enrollment_id: String,
    pub attribution_destination: String,

    /// Source event time rounded down to the day.
    pub source_registration_time: Timestamp,
    pub scheduled_report_time: Timestamp,
    pub api_version: String,

    /// Plaintext mirror of the histogram, for debugging only.
    pub debug_cleartext_payload: String,
    pub aggregate_attribution_data: AggregateAttributionData,
    pub status: AggregateReportStatus,

    pub source_debug_key: Option<UnsignedLong>,
    pub trigger_debug_key: Option<UnsignedLong>,
    pub dedup_key: Option<UnsignedLong>,
}
