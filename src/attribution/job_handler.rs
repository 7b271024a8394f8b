use std::{cell::Cell, fmt::Debug, marker::PhantomData};

use log::{debug, info, warn};
use rand::{rngs::StdRng, SeedableRng};

use super::selection::{select_event_trigger_datum, select_source};
use crate::{
    errors::ParseError,
    filters::clauses_pass,
    privacy::{
        limits::{AttributionLimits, LimitStatus},
        noise::NoiseHandler,
    },
    records::{
        AttributionMode, EventReport, EventTriggerDatum, Source, SourceStatus,
        Trigger, TriggerStatus,
    },
    reports::{
        aggregate::{decide_aggregate_report, AggregateDecision},
        event_reports::{decide_standard_event_report, EventReportDecision},
        flexible::{
            AttributedTrigger, FlexOutcome, FlexReportContext, ReportSpec,
        },
    },
    store::traits::{Attribution, AttributionStore},
};

/// What happened to one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Attributed,
    Ignored,

    /// The trigger was no longer `PENDING`.
    Skipped,
}

/// Counters of one `process_pending_triggers` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub attributed: usize,
    pub ignored: usize,
    pub skipped: usize,

    /// Triggers left `PENDING` after a store error.
    pub failed: usize,
}

/// Attributes pending triggers to sources and writes the resulting event
/// and aggregate reports through the store.
pub struct AttributionJobHandler<S, N, ERR>
where
    S: AttributionStore,
    N: NoiseHandler,
    ERR: From<S::Error>,
{
    /// Data access interface.
    pub store: S,

    /// Randomized-response rates recorded on event reports.
    pub noise: N,

    pub limits: AttributionLimits,

    /// Draws the aggregate report delay.
    rng: StdRng,

    /// Cell<> keeps the handler off other threads: one job run attributes
    /// triggers sequentially.
    _phantom: PhantomData<Cell<ERR>>,
}

impl<S, N, ERR> AttributionJobHandler<S, N, ERR>
where
    S: AttributionStore,
    N: NoiseHandler,
    ERR: From<S::Error> + From<ParseError> + Debug,
{
    pub fn new(store: S, noise: N, limits: AttributionLimits) -> Self {
        Self::with_rng(store, noise, limits, StdRng::from_entropy())
    }

    /// Same as `new` with a caller-provided generator, e.g. a seeded one.
    pub fn with_rng(
        store: S,
        noise: N,
        limits: AttributionLimits,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            noise,
            limits,
            rng,
            _phantom: PhantomData,
        }
    }

    /// Processes every pending trigger in store order. A trigger whose
    /// processing fails stays `PENDING` and does not stop the batch.
    pub fn process_pending_triggers(&mut self) -> Result<JobSummary, ERR> {
        let pending = self.store.get_pending_triggers()?;
        debug!("Processing {} pending triggers", pending.len());

        let mut summary = JobSummary::default();
        for trigger in pending {
            match self.process_trigger(&trigger.id) {
                Ok(TriggerOutcome::Attributed) => summary.attributed += 1,
                Ok(TriggerOutcome::Ignored) => summary.ignored += 1,
                Ok(TriggerOutcome::Skipped) => summary.skipped += 1,
                Err(err) => {
                    warn!(
                        "Trigger {}: attribution failed, left pending: {err:?}",
                        trigger.id
                    );
                    summary.failed += 1;
                }
            }
        }

        info!("Attribution job done: {summary:?}");
        Ok(summary)
    }

    /// Attributes one trigger inside a store transaction. On error every
    /// effect of this trigger is rolled back.
    pub fn process_trigger(
        &mut self,
        trigger_id: &str,
    ) -> Result<TriggerOutcome, ERR> {
        self.store.begin_transaction()?;
        match self.attribute(trigger_id) {
            Ok(outcome) => {
                self.store.commit_transaction()?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback_transaction() {
                    warn!(
                        "Trigger {trigger_id}: rollback failed: {:?}",
                        ERR::from(rollback_err)
                    );
                }
                Err(err)
            }
        }
    }

    fn attribute(&mut self, trigger_id: &str) -> Result<TriggerOutcome, ERR> {
        let trigger = self.store.get_trigger(trigger_id)?;
        if trigger.status != TriggerStatus::Pending {
            debug!("Trigger {trigger_id} is {:?}, skipping", trigger.status);
            return Ok(TriggerOutcome::Skipped);
        }

        let sources = self.store.get_matching_active_sources(&trigger)?;
        let Some((mut source, losers)) = select_source(sources, &trigger) else {
            return self.ignore(&trigger, "no matching source");
        };
        debug!(
            "Trigger {trigger_id}: selected source {} out of {}",
            source.id,
            losers.len() + 1
        );

        let source_data = source.filter_data_for_matching();
        if !clauses_pass(&source_data, &trigger.filters, &trigger.not_filters) {
            return self.ignore(&trigger, "top-level filters do not match");
        }

        if self.rate_limit_status(&source, &trigger)? == LimitStatus::Exceeded {
            return self.ignore(&trigger, "attribution rate limit reached");
        }
        if self.enrollment_limit_status(&source, &trigger)?
            == LimitStatus::Exceeded
        {
            return self.ignore(&trigger, "distinct enrollment limit reached");
        }

        if source.attribution_mode != AttributionMode::Truthfully {
            return self
                .ignore(&trigger, "source does not attribute truthfully");
        }

        // The two paths are independent: one being blocked does not stop
        // the other.
        let event_attributed =
            self.generate_event_report(&mut source, &trigger)?;
        let aggregate_attributed =
            self.generate_aggregate_report(&mut source, &trigger)?;

        if !event_attributed && !aggregate_attributed {
            return self.ignore(&trigger, "no report produced");
        }

        if !losers.is_empty() {
            let loser_ids: Vec<String> =
                losers.into_iter().map(|s| s.id).collect();
            debug!("Trigger {trigger_id}: ignoring sources {loser_ids:?}");
            self.store
                .update_source_status(&loser_ids, SourceStatus::Ignored)?;
        }

        self.store
            .insert_attribution(Attribution::new(&source, &trigger))?;
        self.store.update_trigger_status(
            &[trigger.id.clone()],
            TriggerStatus::Attributed,
        )?;
        debug!(
            "Trigger {trigger_id} attributed to source {} \
             (event: {event_attributed}, aggregate: {aggregate_attributed})",
            source.id
        );
        Ok(TriggerOutcome::Attributed)
    }

    fn ignore(
        &mut self,
        trigger: &Trigger,
        reason: &str,
    ) -> Result<TriggerOutcome, ERR> {
        debug!("Trigger {} ignored: {reason}", trigger.id);
        self.store.update_trigger_status(
            &[trigger.id.clone()],
            TriggerStatus::Ignored,
        )?;
        Ok(TriggerOutcome::Ignored)
    }

    fn rate_limit_status(
        &mut self,
        source: &Source,
        trigger: &Trigger,
    ) -> Result<LimitStatus, ERR> {
        let window_start = trigger.trigger_time - self.limits.rate_limit_window;
        let count = self.store.get_attributions_per_rate_limit_window(
            source,
            trigger,
            window_start,
        )?;
        Ok(LimitStatus::check(
            count,
            self.limits.max_attributions_per_rate_limit_window,
        ))
    }

    fn enrollment_limit_status(
        &mut self,
        source: &Source,
        trigger: &Trigger,
    ) -> Result<LimitStatus, ERR> {
        let window_start = trigger.trigger_time - self.limits.rate_limit_window;
        let count = self
            .store
            .count_distinct_enrollments_per_publisher_x_destination_in_attribution(
                &source.publisher,
                &trigger.attribution_destination,
                &trigger.enrollment_id,
                window_start,
                trigger.trigger_time,
            )?;
        Ok(LimitStatus::check(
            count,
            self.limits.max_distinct_enrollments_in_attribution,
        ))
    }

    /// Event-level path. Returns whether the trigger counts as attributed
    /// by it.
    fn generate_event_report(
        &mut self,
        source: &mut Source,
        trigger: &Trigger,
    ) -> Result<bool, ERR> {
        let Some(datum) = select_event_trigger_datum(source, trigger) else {
            debug!("Trigger {}: no event trigger datum matches", trigger.id);
            return Ok(false);
        };

        let count = self.store.get_num_event_reports_per_destination(
            &trigger.attribution_destination,
            trigger.destination_type,
        )?;
        if LimitStatus::check(
            count,
            self.limits.max_event_reports_per_destination,
        ) == LimitStatus::Exceeded
        {
            debug!(
                "Trigger {}: {count} event reports already pending for {}",
                trigger.id, trigger.attribution_destination
            );
            return Ok(false);
        }

        let existing = self.store.get_source_event_reports(source)?;
        let randomized_trigger_rate =
            self.noise.random_attribution_probability(source);

        match source.report_spec.clone() {
            Some(spec) => self.generate_flexible_event_reports(
                source,
                trigger,
                datum,
                spec,
                &existing,
                randomized_trigger_rate,
            ),
            None => {
                let decision = decide_standard_event_report(
                    source,
                    trigger,
                    datum,
                    &existing,
                    &self.limits,
                    randomized_trigger_rate,
                );
                let (report, replaces) = match decision {
                    EventReportDecision::Insert { report, replaces } => {
                        (report, replaces)
                    }
                    EventReportDecision::Drop(reason) => {
                        debug!(
                            "Trigger {}: event report dropped: {reason:?}",
                            trigger.id
                        );
                        return Ok(false);
                    }
                };

                if let Some(replaced) = replaces {
                    debug!(
                        "Trigger {}: replacing lower priority report {}",
                        trigger.id, replaced.id
                    );
                    self.store.delete_event_report(&replaced)?;
                }
                if let Some(key) = datum.dedup_key {
                    source.event_report_dedup_keys.push(key);
                    self.store.update_source_event_report_dedup_keys(source)?;
                }
                self.store.insert_event_report(report)?;
                Ok(true)
            }
        }
    }

    fn generate_flexible_event_reports(
        &mut self,
        source: &mut Source,
        trigger: &Trigger,
        datum: &EventTriggerDatum,
        spec: ReportSpec,
        existing: &[EventReport],
        noise_rate: f64,
    ) -> Result<bool, ERR> {
        let ctx = FlexReportContext {
            now: trigger.trigger_time,
            report_delay: self.limits.event_report_delay,
            randomized_trigger_rate: spec
                .flip_probability()
                .unwrap_or(noise_rate),
            trigger_debug_key: trigger.debug_key,
        };
        let incoming = AttributedTrigger::from_datum(trigger, datum);

        let outcome = spec.process_trigger(source, incoming, existing, &ctx);
        let next = match outcome {
            FlexOutcome::Rejected(reason) => {
                debug!(
                    "Trigger {}: flexible report rejected: {reason:?}",
                    trigger.id
                );
                return Ok(false);
            }
            FlexOutcome::HistoryOnly(next) => {
                debug!("Trigger {}: recorded without new report", trigger.id);
                next
            }
            FlexOutcome::Reports {
                spec: next,
                to_insert,
                to_delete,
            } => {
                debug!(
                    "Trigger {}: flexible reports +{} -{}",
                    trigger.id,
                    to_insert.len(),
                    to_delete.len()
                );
                for report in &to_delete {
                    self.store.delete_event_report(report)?;
                }
                for report in to_insert {
                    self.store.insert_event_report(report)?;
                }
                next
            }
        };

        source.report_spec = Some(next);
        self.store.update_source_attributed_triggers(source)?;
        Ok(true)
    }

    /// Aggregate path. Returns whether an aggregate report was inserted.
    fn generate_aggregate_report(
        &mut self,
        source: &mut Source,
        trigger: &Trigger,
    ) -> Result<bool, ERR> {
        let decision = decide_aggregate_report(
            source,
            trigger,
            &self.limits,
            &mut self.rng,
        )?;
        let (report, dedup_key) = match decision {
            AggregateDecision::Insert { report, dedup_key } => {
                (report, dedup_key)
            }
            AggregateDecision::Drop(reason) => {
                debug!(
                    "Trigger {}: aggregate report dropped: {reason:?}",
                    trigger.id
                );
                return Ok(false);
            }
        };

        let count = self.store.get_num_aggregate_reports_per_destination(
            &trigger.attribution_destination,
            trigger.destination_type,
        )?;
        if LimitStatus::check(
            count,
            self.limits.max_aggregate_reports_per_destination,
        ) == LimitStatus::Exceeded
        {
            debug!(
                "Trigger {}: {count} aggregate reports already pending for {}",
                trigger.id, trigger.attribution_destination
            );
            return Ok(false);
        }

        let total = report.aggregate_attribution_data.total_value();
        source.aggregate_contributions = source
            .aggregate_contributions
            .saturating_add(u32::try_from(total).unwrap_or(u32::MAX));
        self.store.update_source_aggregate_contributions(source)?;

        if let Some(key) = dedup_key {
            source.aggregate_report_dedup_keys.push(key);
            self.store.update_source_aggregate_report_dedup_keys(source)?;
        }

        self.store.insert_aggregate_report(report)?;
        Ok(true)
    }
}
