use serde::{Deserialize, Serialize};

use crate::{
    records::{DestinationType, Source, SourceType},
    values::time::{days, hours, minutes},
};

pub const MAX_SUM_OF_AGGREGATE_VALUES_PER_SOURCE: u32 = 65536;

/// Outcome of a policy gate. Not an error: a blocked gate routes the
/// trigger, or one of its report paths, to `IGNORED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStatus {
    Continue,
    Exceeded,
}

impl LimitStatus {
    /// `count` existing entries against a ceiling of `max`.
    pub fn check(count: u64, max: u64) -> Self {
        if count >= max {
            LimitStatus::Exceeded
        } else {
            LimitStatus::Continue
        }
    }
}

/// Policy constants for privacy-limit enforcement and report scheduling.
/// Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionLimits {
    pub rate_limit_window: i64,
    pub max_attributions_per_rate_limit_window: u64,
    pub max_distinct_enrollments_in_attribution: u64,

    /// A destination holding this many reports admits no more.
    pub max_event_reports_per_destination: u64,
    pub max_aggregate_reports_per_destination: u64,

    pub max_aggregate_contributions_per_source: u32,

    pub navigation_source_max_reports: u32,
    pub event_source_max_reports: u32,
    pub install_attr_navigation_source_max_reports: u32,
    pub install_attr_event_source_max_reports: u32,

    pub navigation_early_reporting_windows: Vec<i64>,
    pub event_early_reporting_windows: Vec<i64>,
    pub install_attr_navigation_early_reporting_windows: Vec<i64>,
    pub install_attr_event_early_reporting_windows: Vec<i64>,

    pub event_report_delay: i64,
    pub aggregate_report_min_delay: i64,
    pub aggregate_report_max_delay: i64,
}

impl Default for AttributionLimits {
    fn default() -> Self {
        Self {
            rate_limit_window: days(30),
            max_attributions_per_rate_limit_window: 100,
            max_distinct_enrollments_in_attribution: 100,
            max_event_reports_per_destination: 1024,
            max_aggregate_reports_per_destination: 1024,
            max_aggregate_contributions_per_source:
                MAX_SUM_OF_AGGREGATE_VALUES_PER_SOURCE,
            navigation_source_max_reports: 3,
            event_source_max_reports: 1,
            install_attr_navigation_source_max_reports: 3,
            install_attr_event_source_max_reports: 2,
            navigation_early_reporting_windows: vec![days(2), days(7)],
            event_early_reporting_windows: vec![],
            install_attr_navigation_early_reporting_windows: vec![
                days(2),
                days(7),
            ],
            install_attr_event_early_reporting_windows: vec![days(2)],
            event_report_delay: hours(1),
            aggregate_report_min_delay: minutes(10),
            aggregate_report_max_delay: minutes(60),
        }
    }
}

impl AttributionLimits {
    /// Install-attributed variants only apply to app conversions.
    fn is_install_case(
        source: &Source,
        destination_type: DestinationType,
    ) -> bool {
        source.install_attributed && destination_type == DestinationType::App
    }

    pub fn max_event_reports(
        &self,
        source: &Source,
        destination_type: DestinationType,
    ) -> u32 {
        let install = Self::is_install_case(source, destination_type);
        match (source.source_type, install) {
            (SourceType::Event, false) => self.event_source_max_reports,
            (SourceType::Event, true) => {
                self.install_attr_event_source_max_reports
            }
            (SourceType::Navigation, false) => {
                self.navigation_source_max_reports
            }
            (SourceType::Navigation, true) => {
                self.install_attr_navigation_source_max_reports
            }
        }
    }

    /// Early window ends, relative to the source event time.
    pub fn early_reporting_windows(
        &self,
        source: &Source,
        destination_type: DestinationType,
    ) -> &[i64] {
        let install = Self::is_install_case(source, destination_type);
        match (source.source_type, install) {
            (SourceType::Event, false) => &self.event_early_reporting_windows,
            (SourceType::Event, true) => {
                &self.install_attr_event_early_reporting_windows
            }
            (SourceType::Navigation, false) => {
                &self.navigation_early_reporting_windows
            }
            (SourceType::Navigation, true) => {
                &self.install_attr_navigation_early_reporting_windows
            }
        }
    }
}
