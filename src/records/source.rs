use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    errors::ParseError,
    filters::{FilterMap, SOURCE_TYPE_KEY},
    reports::flexible::ReportSpec,
    values::{json::parse_key_piece, Timestamp, UnsignedLong},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Event,
    Navigation,
}

impl SourceType {
    /// Value of the `source_type` pseudo-key seen by filters.
    pub fn filter_value(&self) -> &'static str {
        match self {
            SourceType::Event => "event",
            SourceType::Navigation => "navigation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributionMode {
    Truthfully,
    Falsely,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceStatus {
    Active,
    Ignored,
}

/// A registered ad exposure. Created at registration; the engine only
/// mutates dedup keys, contributions, attributed triggers and status.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: String,
    pub event_id: UnsignedLong,
    pub source_type: SourceType,

    /// Site that registered the source.
    pub publisher: String,

    /// Reporting origin.
    pub enrollment_id: String,
    pub app_destinations: Vec<String>,
    pub web_destinations: Vec<String>,

    pub priority: i64,
    pub event_time: Timestamp,
    pub expiry_time: Timestamp,

    /// Absolute end of the event-level reporting window.
    pub event_report_window: Timestamp,

    /// Absolute end of the aggregatable reporting window.
    pub aggregatable_report_window: Timestamp,
    pub attribution_mode: AttributionMode,

    pub filter_data: FilterMap,

    /// Key name to 128-bit key piece.
    pub aggregation_keys: BTreeMap<String, u128>,
    pub aggregate_contributions: u32,

    pub event_report_dedup_keys: Vec<UnsignedLong>,
    pub aggregate_report_dedup_keys: Vec<UnsignedLong>,

    pub install_attributed: bool,

    /// Duration (ms) after the source event during which an
    /// install-attributed source is protected from newer sources.
    pub install_cooldown_window: i64,

    pub debug_key: Option<UnsignedLong>,
    pub status: SourceStatus,

    /// Flexible event-level configuration, if the source opted in.
    pub report_spec: Option<ReportSpec>,
}

impl Source {
    /// Filter data with the `source_type` pseudo-key added.
    pub fn filter_data_for_matching(&self) -> FilterMap {
        let mut data = self.filter_data.clone();
        data.insert(SOURCE_TYPE_KEY, [self.source_type.filter_value()]);
        data
    }

    pub fn has_app_and_web_destinations(&self) -> bool {
        !self.app_destinations.is_empty() && !self.web_destinations.is_empty()
    }

    pub fn is_install_detection_enabled(&self) -> bool {
        self.install_cooldown_window > 0 && !self.app_destinations.is_empty()
    }

    /// An install-attributed source still inside its cooldown window at
    /// `trigger_time` outranks every non-protected source.
    pub fn is_install_cooldown_eligible(
        &self,
        trigger_time: Timestamp,
    ) -> bool {
        self.install_attributed
            && self.event_time + self.install_cooldown_window > trigger_time
    }

    pub fn set_filter_data_json(
        &mut self,
        json: &str,
    ) -> Result<(), ParseError> {
        self.filter_data = FilterMap::parse(json)?;
        Ok(())
    }

    pub fn set_aggregation_keys_json(
        &mut self,
        json: &str,
    ) -> Result<(), ParseError> {
        self.aggregation_keys = parse_aggregation_keys(json)?;
        Ok(())
    }
}

/// Reads `{"campaignCounts": "0x159", ...}`.
pub fn parse_aggregation_keys(
    json: &str,
) -> Result<BTreeMap<String, u128>, ParseError> {
    let raw: BTreeMap<String, String> = serde_json::from_str(json)?;
    raw.into_iter()
        .map(|(name, piece)| Ok((name, parse_key_piece(&piece)?)))
        .collect()
}
