use crate::{
    records::{
        AggregateReport, DestinationType, EventReport, Source, SourceStatus,
        Trigger, TriggerStatus,
    },
    values::Timestamp,
};

/// One attribution decision, recorded for rate limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    /// Publisher of the attributed source.
    pub source_site: String,
    pub destination_site: String,
    pub enrollment_id: String,
    pub source_id: String,
    pub trigger_id: String,
    pub trigger_time: Timestamp,
}

impl Attribution {
    pub fn new(source: &Source, trigger: &Trigger) -> Self {
        Self {
            source_site: source.publisher.clone(),
            destination_site: trigger.attribution_destination.clone(),
            enrollment_id: trigger.enrollment_id.clone(),
            source_id: source.id.clone(),
            trigger_id: trigger.id.clone(),
            trigger_time: trigger.trigger_time,
        }
    }
}

/// Data access used by the attribution job.
///
/// Implementations must give one trigger's attribution transactional
/// atomicity: every call between `begin_transaction` and
/// `commit_transaction` commits together, or is undone by
/// `rollback_transaction`.
pub trait AttributionStore {
    type Error;

    fn begin_transaction(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Triggers still `PENDING`, in processing order.
    fn get_pending_triggers(&mut self) -> Result<Vec<Trigger>, Self::Error>;

    fn get_trigger(&mut self, trigger_id: &str) -> Result<Trigger, Self::Error>;

    /// Active, unexpired sources registered by the trigger's enrollment for
    /// the trigger's destination before the trigger time.
    fn get_matching_active_sources(
        &mut self,
        trigger: &Trigger,
    ) -> Result<Vec<Source>, Self::Error>;

    /// Attributions for the (source site, destination site, enrollment)
    /// triple with a trigger time in `(window_start, trigger time]`.
    fn get_attributions_per_rate_limit_window(
        &mut self,
        source: &Source,
        trigger: &Trigger,
        window_start: Timestamp,
    ) -> Result<u64, Self::Error>;

    /// Distinct enrollments other than `excluded_enrollment_id` attributed
    /// for this publisher and destination within the window.
    fn count_distinct_enrollments_per_publisher_x_destination_in_attribution(
        &mut self,
        publisher: &str,
        destination: &str,
        excluded_enrollment_id: &str,
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> Result<u64, Self::Error>;

    fn get_source_event_reports(
        &mut self,
        source: &Source,
    ) -> Result<Vec<EventReport>, Self::Error>;

    fn get_num_event_reports_per_destination(
        &mut self,
        destination: &str,
        destination_type: DestinationType,
    ) -> Result<u64, Self::Error>;

    fn get_num_aggregate_reports_per_destination(
        &mut self,
        destination: &str,
        destination_type: DestinationType,
    ) -> Result<u64, Self::Error>;

    fn insert_event_report(
        &mut self,
        report: EventReport,
    ) -> Result<(), Self::Error>;

    fn delete_event_report(
        &mut self,
        report: &EventReport,
    ) -> Result<(), Self::Error>;

    fn insert_aggregate_report(
        &mut self,
        report: AggregateReport,
    ) -> Result<(), Self::Error>;

    fn update_source_event_report_dedup_keys(
        &mut self,
        source: &Source,
    ) -> Result<(), Self::Error>;

    fn update_source_aggregate_report_dedup_keys(
        &mut self,
        source: &Source,
    ) -> Result<(), Self::Error>;

    fn update_source_aggregate_contributions(
        &mut self,
        source: &Source,
    ) -> Result<(), Self::Error>;

    /// Persists the source's flexible report spec, history included.
    fn update_source_attributed_triggers(
        &mut self,
        source: &Source,
    ) -> Result<(), Self::Error>;

    fn update_source_status(
        &mut self,
        source_ids: &[String],
        status: SourceStatus,
    ) -> Result<(), Self::Error>;

    fn update_trigger_status(
        &mut self,
        trigger_ids: &[String],
        status: TriggerStatus,
    ) -> Result<(), Self::Error>;

    fn insert_attribution(
        &mut self,
        attribution: Attribution,
    ) -> Result<(), Self::Error>;
}
