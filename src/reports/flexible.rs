use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    errors::ParseError,
    privacy::params::{
        MAX_FLEXIBLE_EVENT_REPORTING_WINDOWS, MAX_FLEXIBLE_EVENT_REPORTS,
        MAX_FLEXIBLE_EVENT_TRIGGER_DATA_CARDINALITY,
    },
    records::{
        EventReport, EventReportStatus, EventTriggerDatum, Source,
        SummaryBucket, Trigger,
    },
    values::{Timestamp, UnsignedLong},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryOperator {
    /// Every attributed trigger adds one.
    #[default]
    Count,

    /// Every attributed trigger adds its value.
    ValueSum,
}

impl SummaryOperator {
    fn contribution(&self, trigger: &AttributedTrigger) -> u64 {
        match self {
            SummaryOperator::Count => 1,
            SummaryOperator::ValueSum => trigger.value,
        }
    }
}

/// Reporting windows, in milliseconds relative to the source event time.
/// Window `i` spans `[end_times[i - 1], end_times[i])`, the first one
/// starting at `start_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReportWindows {
    #[serde(default)]
    pub start_time: i64,
    pub end_times: Vec<i64>,
}

impl EventReportWindows {
    pub fn window_end_for(&self, offset: i64) -> Option<i64> {
        if offset < self.start_time {
            return None;
        }
        self.end_times.iter().copied().find(|end| offset < *end)
    }

    /// Report time of a report whose trigger fell in the window ending at
    /// `window_end`. When that window was already sent, the report moves
    /// to the next window still open at `ctx.now`. The past time is kept
    /// when none is left.
    fn report_time(
        &self,
        source: &Source,
        window_end: i64,
        ctx: &FlexReportContext,
    ) -> Timestamp {
        let due = source.event_time + window_end + ctx.report_delay;
        if due >= ctx.now {
            return due;
        }
        let earliest_end = ctx.now - ctx.report_delay - source.event_time;
        self.end_times
            .iter()
            .find(|end| **end >= earliest_end)
            .map_or(due, |end| source.event_time + end + ctx.report_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub trigger_data: Vec<UnsignedLong>,
    pub event_report_windows: EventReportWindows,
    #[serde(default)]
    pub summary_window_operator: SummaryOperator,

    /// Ascending thresholds. Empty means `1..=max_reports`.
    #[serde(default)]
    pub summary_buckets: Vec<u64>,
}

impl TriggerSpec {
    fn thresholds(&self, max_reports: u32) -> Vec<u64> {
        if self.summary_buckets.is_empty() {
            (1..=u64::from(max_reports)).collect()
        } else {
            self.summary_buckets.clone()
        }
    }

    fn summary_buckets(&self, max_reports: u32) -> Vec<SummaryBucket> {
        let thresholds = self.thresholds(max_reports);
        thresholds
            .iter()
            .enumerate()
            .map(|(i, start)| SummaryBucket {
                start: *start,
                end: thresholds
                    .get(i + 1)
                    .map_or(u64::MAX, |next| next.saturating_sub(1)),
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ParseError> {
        let invalid =
            |msg: &str| Err(ParseError::InvalidReportSpec(msg.to_string()));

        let windows = &self.event_report_windows;
        if windows.end_times.is_empty()
            || windows.end_times.len() > MAX_FLEXIBLE_EVENT_REPORTING_WINDOWS
        {
            return invalid("bad number of reporting windows");
        }
        if windows.start_time < 0
            || windows.end_times[0] <= windows.start_time
            || windows.end_times.windows(2).any(|w| w[0] >= w[1])
        {
            return invalid("reporting windows must be increasing");
        }
        if self.summary_buckets.windows(2).any(|w| w[0] >= w[1])
            || self.summary_buckets.first() == Some(&0)
        {
            return invalid("summary buckets must be positive and increasing");
        }
        Ok(())
    }
}

/// Flip probability used for the randomized trigger rate of the source's
/// flexible reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrivacyParameters {
    pub flip_probability: f64,
}

/// One entry of a source's attribution history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedTrigger {
    pub trigger_id: String,
    pub trigger_time: Timestamp,
    pub trigger_data: UnsignedLong,
    pub priority: i64,
    pub value: u64,
    pub dedup_key: Option<UnsignedLong>,
}

impl AttributedTrigger {
    pub fn from_datum(trigger: &Trigger, datum: &EventTriggerDatum) -> Self {
        Self {
            trigger_id: trigger.id.clone(),
            trigger_time: trigger.trigger_time,
            trigger_data: datum.trigger_data,
            priority: datum.priority,
            value: datum.value,
            dedup_key: datum.dedup_key,
        }
    }
}

/// A source's flexible event-level configuration plus its running history
/// of attributed triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReportSpecFields")]
pub struct ReportSpec {
    pub trigger_specs: Vec<TriggerSpec>,
    pub max_reports: u32,
    #[serde(default)]
    pub privacy_parameters: Option<PrivacyParameters>,
    #[serde(default)]
    pub attributed_triggers: Vec<AttributedTrigger>,
}

/// Stored form of a [`ReportSpec`], validated before use.
#[derive(Deserialize)]
struct ReportSpecFields {
    trigger_specs: Vec<TriggerSpec>,
    max_reports: u32,
    #[serde(default)]
    privacy_parameters: Option<PrivacyParameters>,
    #[serde(default)]
    attributed_triggers: Vec<AttributedTrigger>,
}

impl TryFrom<ReportSpecFields> for ReportSpec {
    type Error = ParseError;

    fn try_from(fields: ReportSpecFields) -> Result<Self, Self::Error> {
        let spec = Self {
            trigger_specs: fields.trigger_specs,
            max_reports: fields.max_reports,
            privacy_parameters: fields.privacy_parameters,
            attributed_triggers: fields.attributed_triggers,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Inputs of [`ReportSpec::process_trigger`] that do not come from the
/// report spec or the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlexReportContext {
    /// Reports due before this time are considered sent.
    pub now: Timestamp,
    pub report_delay: i64,
    pub randomized_trigger_rate: f64,
    pub trigger_debug_key: Option<UnsignedLong>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlexOutcome {
    /// Nothing changes, not even the history.
    Rejected(FlexRejection),

    /// The trigger joins the history but moves no report.
    HistoryOnly(ReportSpec),

    Reports {
        spec: ReportSpec,
        to_insert: Vec<EventReport>,
        to_delete: Vec<EventReport>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexRejection {
    UnknownTriggerData,
    DuplicateDedupKey,
    OutsideReportingWindows,
}

impl ReportSpec {
    pub fn new(
        trigger_specs: Vec<TriggerSpec>,
        max_reports: u32,
        privacy_parameters: Option<PrivacyParameters>,
    ) -> Result<Self, ParseError> {
        let spec = Self {
            trigger_specs,
            max_reports,
            privacy_parameters,
            attributed_triggers: Vec::new(),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Builds a spec from the registration's `trigger_specs` JSON array and
    /// optional `privacy_parameters` object.
    pub fn parse(
        trigger_specs_json: &str,
        max_reports: u32,
        privacy_parameters_json: Option<&str>,
    ) -> Result<Self, ParseError> {
        let trigger_specs = serde_json::from_str(trigger_specs_json)?;
        let privacy_parameters = privacy_parameters_json
            .map(serde_json::from_str)
            .transpose()?;
        Self::new(trigger_specs, max_reports, privacy_parameters)
    }

    fn validate(&self) -> Result<(), ParseError> {
        if self.max_reports > MAX_FLEXIBLE_EVENT_REPORTS {
            return Err(ParseError::InvalidReportSpec(format!(
                "max_reports {} above {MAX_FLEXIBLE_EVENT_REPORTS}",
                self.max_reports
            )));
        }
        if self.trigger_specs.is_empty() {
            return Err(ParseError::InvalidReportSpec(
                "no trigger specs".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for spec in &self.trigger_specs {
            spec.validate()?;
            for data in &spec.trigger_data {
                if !seen.insert(*data) {
                    return Err(ParseError::InvalidReportSpec(format!(
                        "trigger data {data} configured twice"
                    )));
                }
            }
        }
        if seen.is_empty()
            || seen.len() > MAX_FLEXIBLE_EVENT_TRIGGER_DATA_CARDINALITY
        {
            return Err(ParseError::InvalidReportSpec(format!(
                "trigger data cardinality {} out of range",
                seen.len()
            )));
        }

        if let Some(params) = self.privacy_parameters {
            if !(0.0..=1.0).contains(&params.flip_probability) {
                return Err(ParseError::InvalidReportSpec(
                    "flip_probability must be in [0, 1]".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn trigger_spec_for(
        &self,
        trigger_data: UnsignedLong,
    ) -> Option<&TriggerSpec> {
        self.trigger_specs
            .iter()
            .find(|spec| spec.trigger_data.contains(&trigger_data))
    }

    pub fn flip_probability(&self) -> Option<f64> {
        self.privacy_parameters.map(|p| p.flip_probability)
    }

    /// Folds `incoming` into the history and works out which reports must
    /// be inserted or deleted so that the standing reports reflect the
    /// top-ranked triggers. Pure: `self` is left untouched and the new
    /// history is returned in the outcome.
    pub fn process_trigger(
        &self,
        source: &Source,
        incoming: AttributedTrigger,
        existing_reports: &[EventReport],
        ctx: &FlexReportContext,
    ) -> FlexOutcome {
        let Some(trigger_spec) = self.trigger_spec_for(incoming.trigger_data)
        else {
            return FlexOutcome::Rejected(FlexRejection::UnknownTriggerData);
        };

        if incoming.dedup_key.is_some()
            && self
                .attributed_triggers
                .iter()
                .any(|t| t.dedup_key == incoming.dedup_key)
        {
            return FlexOutcome::Rejected(FlexRejection::DuplicateDedupKey);
        }

        let offset = incoming.trigger_time - source.event_time;
        if trigger_spec
            .event_report_windows
            .window_end_for(offset)
            .is_none()
        {
            return FlexOutcome::Rejected(
                FlexRejection::OutsideReportingWindows,
            );
        }

        let trigger_data = incoming.trigger_data;
        let thresholds = trigger_spec.thresholds(self.max_reports);
        let crossed =
            |sum: u64| thresholds.iter().filter(|t| **t <= sum).count();
        let before = self.summary_value(source, trigger_data);

        let mut next = self.clone();
        next.attributed_triggers.push(incoming);
        let after = next.summary_value(source, trigger_data);

        if crossed(before) == crossed(after) {
            return FlexOutcome::HistoryOnly(next);
        }

        let desired = next.desired_reports(source, ctx);
        let (to_insert, to_delete) =
            next.reconcile(desired, existing_reports, ctx.now);
        FlexOutcome::Reports {
            spec: next,
            to_insert,
            to_delete,
        }
    }

    /// Sum of in-window contributions recorded for `trigger_data`.
    fn summary_value(
        &self,
        source: &Source,
        trigger_data: UnsignedLong,
    ) -> u64 {
        let Some(spec) = self.trigger_spec_for(trigger_data) else {
            return 0;
        };
        self.attributed_triggers
            .iter()
            .filter(|t| t.trigger_data == trigger_data)
            .filter(|t| {
                spec.event_report_windows
                    .window_end_for(t.trigger_time - source.event_time)
                    .is_some()
            })
            .fold(0u64, |sum, t| {
                sum.saturating_add(spec.summary_window_operator.contribution(t))
            })
    }

    /// Every report the history would produce, best-ranked trigger first.
    /// Triggers are ranked by priority, then by age so that an incumbent
    /// keeps its slot on a tie.
    fn desired_reports(
        &self,
        source: &Source,
        ctx: &FlexReportContext,
    ) -> Vec<EventReport> {
        let incoming_id =
            self.attributed_triggers.last().map(|t| t.trigger_id.as_str());

        let mut ranked: Vec<&AttributedTrigger> =
            self.attributed_triggers.iter().collect();
        ranked.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.trigger_time.cmp(&b.trigger_time))
        });

        let mut sums: HashMap<UnsignedLong, u64> = HashMap::new();
        let mut desired = Vec::new();
        for attributed in ranked {
            let Some(spec) = self.trigger_spec_for(attributed.trigger_data)
            else {
                continue;
            };
            let Some(window_end) = spec
                .event_report_windows
                .window_end_for(attributed.trigger_time - source.event_time)
            else {
                continue;
            };

            let sum = sums.entry(attributed.trigger_data).or_default();
            let previous = *sum;
            *sum = sum.saturating_add(
                spec.summary_window_operator.contribution(attributed),
            );

            let debug_key =
                if Some(attributed.trigger_id.as_str()) == incoming_id {
                    ctx.trigger_debug_key
                } else {
                    None
                };
            let report_time =
                spec.event_report_windows.report_time(source, window_end, ctx);

            for bucket in spec.summary_buckets(self.max_reports) {
                if previous < bucket.start && bucket.start <= *sum {
                    desired.push(
                        EventReport::from_attributed_trigger(
                            source,
                            attributed,
                            report_time,
                            ctx.randomized_trigger_rate,
                            debug_key,
                        )
                        .with_summary_bucket(bucket),
                    );
                }
            }
        }
        desired
    }

    /// Diffs the desired reports against the source's standing ones.
    /// Delivered or overdue reports are locked: they are never deleted and
    /// keep covering their trigger data and bucket whichever trigger now
    /// ranks first for it. Nothing is inserted with a report time already
    /// in the past.
    fn reconcile(
        &self,
        desired: Vec<EventReport>,
        existing: &[EventReport],
        now: Timestamp,
    ) -> (Vec<EventReport>, Vec<EventReport>) {
        let (locked, mut pending): (Vec<&EventReport>, Vec<&EventReport>) =
            existing.iter().filter(|r| r.is_standing()).partition(|r| {
                r.status == EventReportStatus::Delivered || r.report_time < now
            });

        let max_reports = self.max_reports as usize;
        let mut occupied = locked.len();
        let mut to_insert = Vec::new();

        let open = desired.into_iter().filter(|report| {
            !locked.iter().any(|r| same_bucket(r, report))
                && report.report_time >= now
        });
        for report in open {
            if occupied >= max_reports {
                continue;
            }
            occupied += 1;
            if let Some(pos) =
                pending.iter().position(|r| same_slot(r, &report))
            {
                pending.swap_remove(pos);
                continue;
            }
            to_insert.push(report);
        }

        let to_delete = pending.into_iter().cloned().collect();
        (to_insert, to_delete)
    }
}

fn same_bucket(a: &EventReport, b: &EventReport) -> bool {
    a.trigger_data == b.trigger_data
        && a.trigger_summary_bucket.map(|s| s.start)
            == b.trigger_summary_bucket.map(|s| s.start)
}

/// Two reports stand for the same thing when they cover the same bucket
/// and are due at the same time.
fn same_slot(a: &EventReport, b: &EventReport) -> bool {
    same_bucket(a, b) && a.report_time == b.report_time
}
