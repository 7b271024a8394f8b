use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context};

use crate::{
    records::{
        AggregateReport, AggregateReportStatus, DestinationType, EventReport,
        EventReportStatus, Source, SourceStatus, Trigger, TriggerStatus,
    },
    store::traits::{Attribution, AttributionStore},
    values::Timestamp,
};

#[derive(Debug, Clone, Default)]
struct StoreState {
    sources: HashMap<String, Source>,
    /// Registration order, used for deterministic listings.
    source_order: Vec<String>,
    triggers: HashMap<String, Trigger>,
    trigger_order: Vec<String>,
    event_reports: Vec<EventReport>,
    aggregate_reports: Vec<AggregateReport>,
    attributions: Vec<Attribution>,
}

/// Simple in-memory implementation of AttributionStore. Transactions are
/// emulated by snapshotting the whole state.
#[derive(Debug, Default)]
pub struct HashMapAttributionStore {
    state: StoreState,
    snapshot: Option<StoreState>,
}

impl HashMapAttributionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, source: Source) {
        if !self.state.sources.contains_key(&source.id) {
            self.state.source_order.push(source.id.clone());
        }
        self.state.sources.insert(source.id.clone(), source);
    }

    pub fn add_trigger(&mut self, trigger: Trigger) {
        if !self.state.triggers.contains_key(&trigger.id) {
            self.state.trigger_order.push(trigger.id.clone());
        }
        self.state.triggers.insert(trigger.id.clone(), trigger);
    }

    pub fn source(&self, source_id: &str) -> Option<&Source> {
        self.state.sources.get(source_id)
    }

    pub fn trigger(&self, trigger_id: &str) -> Option<&Trigger> {
        self.state.triggers.get(trigger_id)
    }

    pub fn event_reports(&self) -> &[EventReport] {
        &self.state.event_reports
    }

    pub fn aggregate_reports(&self) -> &[AggregateReport] {
        &self.state.aggregate_reports
    }

    pub fn attributions(&self) -> &[Attribution] {
        &self.state.attributions
    }

    /// Delivery-side status change, e.g. after a report was sent.
    pub fn set_event_report_status(
        &mut self,
        report_id: &str,
        status: EventReportStatus,
    ) -> Result<(), anyhow::Error> {
        let report = self
            .state
            .event_reports
            .iter_mut()
            .find(|r| r.id == report_id)
            .with_context(|| format!("Unknown event report {report_id}"))?;
        report.status = status;
        Ok(())
    }

    fn source_mut(
        &mut self,
        source_id: &str,
    ) -> Result<&mut Source, anyhow::Error> {
        self.state
            .sources
            .get_mut(source_id)
            .with_context(|| format!("Unknown source {source_id}"))
    }
}

impl AttributionStore for HashMapAttributionStore {
    type Error = anyhow::Error;

    fn begin_transaction(&mut self) -> Result<(), Self::Error> {
        if self.snapshot.is_some() {
            bail!("Transaction already in progress");
        }
        self.snapshot = Some(self.state.clone());
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), Self::Error> {
        self.snapshot
            .take()
            .context("No transaction in progress")?;
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<(), Self::Error> {
        self.state = self
            .snapshot
            .take()
            .context("No transaction in progress")?;
        Ok(())
    }

    fn get_pending_triggers(&mut self) -> Result<Vec<Trigger>, Self::Error> {
        let triggers = self
            .state
            .trigger_order
            .iter()
            .filter_map(|id| self.state.triggers.get(id))
            .filter(|t| t.status == TriggerStatus::Pending)
            .cloned()
            .collect();
        Ok(triggers)
    }

    fn get_trigger(
        &mut self,
        trigger_id: &str,
    ) -> Result<Trigger, Self::Error> {
        self.state
            .triggers
            .get(trigger_id)
            .cloned()
            .with_context(|| format!("Unknown trigger {trigger_id}"))
    }

    fn get_matching_active_sources(
        &mut self,
        trigger: &Trigger,
    ) -> Result<Vec<Source>, Self::Error> {
        let sources = self
            .state
            .source_order
            .iter()
            .filter_map(|id| self.state.sources.get(id))
            .filter(|s| {
                let destinations = match trigger.destination_type {
                    DestinationType::App => &s.app_destinations,
                    DestinationType::Web => &s.web_destinations,
                };
                s.status == SourceStatus::Active
                    && s.enrollment_id == trigger.enrollment_id
                    && destinations.contains(&trigger.attribution_destination)
                    && s.event_time <= trigger.trigger_time
                    && s.expiry_time > trigger.trigger_time
            })
            .cloned()
            .collect();
        Ok(sources)
    }

    fn get_attributions_per_rate_limit_window(
        &mut self,
        source: &Source,
        trigger: &Trigger,
        window_start: Timestamp,
    ) -> Result<u64, Self::Error> {
        let count = self
            .state
            .attributions
            .iter()
            .filter(|a| {
                a.source_site == source.publisher
                    && a.destination_site == trigger.attribution_destination
                    && a.enrollment_id == trigger.enrollment_id
                    && a.trigger_time > window_start
                    && a.trigger_time <= trigger.trigger_time
            })
            .count();
        Ok(count as u64)
    }

    fn count_distinct_enrollments_per_publisher_x_destination_in_attribution(
        &mut self,
        publisher: &str,
        destination: &str,
        excluded_enrollment_id: &str,
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> Result<u64, Self::Error> {
        let enrollments: HashSet<&str> = self
            .state
            .attributions
            .iter()
            .filter(|a| {
                a.source_site == publisher
                    && a.destination_site == destination
                    && a.enrollment_id != excluded_enrollment_id
                    && a.trigger_time > window_start
                    && a.trigger_time <= window_end
            })
            .map(|a| a.enrollment_id.as_str())
            .collect();
        Ok(enrollments.len() as u64)
    }

    fn get_source_event_reports(
        &mut self,
        source: &Source,
    ) -> Result<Vec<EventReport>, Self::Error> {
        let reports = self
            .state
            .event_reports
            .iter()
            .filter(|r| r.source_id == source.id)
            .cloned()
            .collect();
        Ok(reports)
    }

    fn get_num_event_reports_per_destination(
        &mut self,
        destination: &str,
        _destination_type: DestinationType,
    ) -> Result<u64, Self::Error> {
        let count = self
            .state
            .event_reports
            .iter()
            .filter(|r| r.status == EventReportStatus::Pending)
            .filter(|r| {
                r.attribution_destinations.iter().any(|d| d == destination)
            })
            .count();
        Ok(count as u64)
    }

    fn get_num_aggregate_reports_per_destination(
        &mut self,
        destination: &str,
        _destination_type: DestinationType,
    ) -> Result<u64, Self::Error> {
        let count = self
            .state
            .aggregate_reports
            .iter()
            .filter(|r| r.status == AggregateReportStatus::Pending)
            .filter(|r| r.attribution_destination == destination)
            .count();
        Ok(count as u64)
    }

    fn insert_event_report(
        &mut self,
        report: EventReport,
    ) -> Result<(), Self::Error> {
        if self.state.event_reports.iter().any(|r| r.id == report.id) {
            bail!("Event report {} already exists", report.id);
        }
        self.state.event_reports.push(report);
        Ok(())
    }

    fn delete_event_report(
        &mut self,
        report: &EventReport,
    ) -> Result<(), Self::Error> {
        let position = self
            .state
            .event_reports
            .iter()
            .position(|r| r.id == report.id)
            .with_context(|| format!("Unknown event report {}", report.id))?;
        self.state.event_reports.remove(position);
        Ok(())
    }

    fn insert_aggregate_report(
        &mut self,
        report: AggregateReport,
    ) -> Result<(), Self::Error> {
        if self.state.aggregate_reports.iter().any(|r| r.id == report.id) {
            bail!("Aggregate report {} already exists", report.id);
        }
        self.state.aggregate_reports.push(report);
        Ok(())
    }

    fn update_source_event_report_dedup_keys(
        &mut self,
        source: &Source,
    ) -> Result<(), Self::Error> {
        self.source_mut(&source.id)?.event_report_dedup_keys =
            source.event_report_dedup_keys.clone();
        Ok(())
    }

    fn update_source_aggregate_report_dedup_keys(
        &mut self,
        source: &Source,
    ) -> Result<(), Self::Error> {
        self.source_mut(&source.id)?.aggregate_report_dedup_keys =
            source.aggregate_report_dedup_keys.clone();
        Ok(())
    }

    fn update_source_aggregate_contributions(
        &mut self,
        source: &Source,
    ) -> Result<(), Self::Error> {
        self.source_mut(&source.id)?.aggregate_contributions =
            source.aggregate_contributions;
        Ok(())
    }

    fn update_source_attributed_triggers(
        &mut self,
        source: &Source,
    ) -> Result<(), Self::Error> {
        self.source_mut(&source.id)?.report_spec = source.report_spec.clone();
        Ok(())
    }

    fn update_source_status(
        &mut self,
        source_ids: &[String],
        status: SourceStatus,
    ) -> Result<(), Self::Error> {
        for id in source_ids {
            self.source_mut(id)?.status = status;
        }
        Ok(())
    }

    fn update_trigger_status(
        &mut self,
        trigger_ids: &[String],
        status: TriggerStatus,
    ) -> Result<(), Self::Error> {
        for id in trigger_ids {
            self.state
                .triggers
                .get_mut(id)
                .with_context(|| format!("Unknown trigger {id}"))?
                .status = status;
        }
        Ok(())
    }

    fn insert_attribution(
        &mut self,
        attribution: Attribution,
    ) -> Result<(), Self::Error> {
        self.state.attributions.push(attribution);
        Ok(())
    }
}
