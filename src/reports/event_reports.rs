use crate::{
    privacy::limits::AttributionLimits,
    records::{
        DestinationType, EventReport, EventReportStatus, EventTriggerDatum,
        Source, Trigger,
    },
    reports::flexible::AttributedTrigger,
    values::Timestamp,
};

#[derive(Debug, Clone, PartialEq)]
pub enum EventReportDecision {
    /// Insert `report`, after deleting `replaces` if set.
    Insert {
        report: EventReport,
        replaces: Option<EventReport>,
    },
    Drop(EventDropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDropReason {
    OutsideReportWindow,
    DuplicateDedupKey,
    /// At capacity with no pending report sharing the report time.
    ReportLimitReached,
    /// At capacity and not strictly above the lowest competing priority.
    LowerPriority,
}

/// Report time of a standard event report: the end of the first early
/// window still open at `trigger_time`, else the source's event report
/// window, plus the report delay. `None` once the event report window has
/// closed.
pub fn standard_report_time(
    source: &Source,
    trigger_time: Timestamp,
    destination_type: DestinationType,
    limits: &AttributionLimits,
) -> Option<Timestamp> {
    if trigger_time > source.event_report_window {
        return None;
    }

    let window_end = limits
        .early_reporting_windows(source, destination_type)
        .iter()
        .map(|offset| source.event_time + offset)
        .filter(|end| *end < source.event_report_window)
        .find(|end| trigger_time < *end)
        .unwrap_or(source.event_report_window);

    Some(window_end + limits.event_report_delay)
}

/// Decides what the non-flexible path does for `datum`. `existing` must be
/// the source's current event reports.
pub fn decide_standard_event_report(
    source: &Source,
    trigger: &Trigger,
    datum: &EventTriggerDatum,
    existing: &[EventReport],
    limits: &AttributionLimits,
    randomized_trigger_rate: f64,
) -> EventReportDecision {
    let Some(report_time) = standard_report_time(
        source,
        trigger.trigger_time,
        trigger.destination_type,
        limits,
    ) else {
        return EventReportDecision::Drop(EventDropReason::OutsideReportWindow);
    };

    if let Some(key) = datum.dedup_key {
        if source.event_report_dedup_keys.contains(&key) {
            return EventReportDecision::Drop(
                EventDropReason::DuplicateDedupKey,
            );
        }
    }

    let attributed = AttributedTrigger::from_datum(trigger, datum);
    let report = EventReport::from_attributed_trigger(
        source,
        &attributed,
        report_time,
        randomized_trigger_rate,
        trigger.debug_key,
    );

    let max_reports =
        limits.max_event_reports(source, trigger.destination_type) as usize;
    let standing = existing.iter().filter(|r| r.is_standing()).count();
    if standing < max_reports {
        return EventReportDecision::Insert {
            report,
            replaces: None,
        };
    }

    // Lowest priority first; on ties the most recent trigger goes first.
    let lowest = existing
        .iter()
        .filter(|r| {
            r.status == EventReportStatus::Pending
                && r.report_time == report_time
        })
        .min_by(|a, b| {
            a.trigger_priority
                .cmp(&b.trigger_priority)
                .then(b.trigger_time.cmp(&a.trigger_time))
        });

    match lowest {
        None => EventReportDecision::Drop(EventDropReason::ReportLimitReached),
        Some(lowest) if report.trigger_priority > lowest.trigger_priority => {
            EventReportDecision::Insert {
                report,
                replaces: Some(lowest.clone()),
            }
        }
        Some(_) => EventReportDecision::Drop(EventDropReason::LowerPriority),
    }
}
