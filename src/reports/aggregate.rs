use rand::Rng;

use crate::{
    errors::ParseError,
    filters::clauses_pass,
    privacy::limits::AttributionLimits,
    records::{
        aggregate_report::AGGREGATE_API_VERSION, AggregateAttributionData,
        AggregateHistogramContribution, AggregateReport, AggregateReportStatus,
        Source, Trigger,
    },
    values::{time::round_down_to_day, UnsignedLong},
};

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateDecision {
    Insert {
        report: AggregateReport,
        dedup_key: Option<UnsignedLong>,
    },
    Drop(AggregateDropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateDropReason {
    NoAggregatableData,
    OutsideReportWindow,
    DuplicateDedupKey,
    NoContributions,
    /// The source's contribution budget would be exceeded.
    InsufficientBudget,
}

/// Histogram contributions of `trigger` against `source`. Key pieces of
/// every passing entry are ORed into the source's key piece, per source
/// key; each resulting bucket gets the aggregate value of its key.
pub fn compute_contributions(
    source: &Source,
    trigger: &Trigger,
) -> Vec<AggregateHistogramContribution> {
    let source_data = source.filter_data_for_matching();

    // Keeps first-reference order.
    let mut buckets: Vec<(&str, u128)> = Vec::new();
    for datum in &trigger.aggregatable_trigger_data {
        if !clauses_pass(&source_data, &datum.filters, &datum.not_filters) {
            continue;
        }
        for key in &datum.source_keys {
            let Some(source_piece) = source.aggregation_keys.get(key) else {
                continue;
            };
            match buckets.iter_mut().find(|(name, _)| *name == key.as_str()) {
                Some((_, bucket)) => *bucket |= datum.key_piece,
                None => {
                    buckets.push((key.as_str(), source_piece | datum.key_piece))
                }
            }
        }
    }

    buckets
        .into_iter()
        .filter_map(|(name, key)| {
            let value = *trigger.aggregate_values.get(name)?;
            (value > 0).then_some(AggregateHistogramContribution { key, value })
        })
        .collect()
}

/// The dedup key of the first aggregate dedup entry whose clauses pass.
pub fn matching_aggregate_dedup_key(
    source: &Source,
    trigger: &Trigger,
) -> Option<UnsignedLong> {
    let source_data = source.filter_data_for_matching();
    trigger
        .aggregate_dedup_keys
        .iter()
        .find(|entry| {
            clauses_pass(&source_data, &entry.filters, &entry.not_filters)
        })
        .and_then(|entry| entry.dedup_key)
}

/// Decides what the aggregate path does. Nothing is mutated; a dropped
/// decision carries no partial contribution.
pub fn decide_aggregate_report<R: Rng>(
    source: &Source,
    trigger: &Trigger,
    limits: &AttributionLimits,
    rng: &mut R,
) -> Result<AggregateDecision, ParseError> {
    if trigger.aggregatable_trigger_data.is_empty()
        || trigger.aggregate_values.is_empty()
    {
        return Ok(AggregateDecision::Drop(
            AggregateDropReason::NoAggregatableData,
        ));
    }
    if trigger.trigger_time > source.aggregatable_report_window {
        return Ok(AggregateDecision::Drop(
            AggregateDropReason::OutsideReportWindow,
        ));
    }

    let dedup_key = matching_aggregate_dedup_key(source, trigger);
    if let Some(key) = dedup_key {
        if source.aggregate_report_dedup_keys.contains(&key) {
            return Ok(AggregateDecision::Drop(
                AggregateDropReason::DuplicateDedupKey,
            ));
        }
    }

    let contributions = compute_contributions(source, trigger);
    if contributions.is_empty() {
        return Ok(AggregateDecision::Drop(
            AggregateDropReason::NoContributions,
        ));
    }

    let data = AggregateAttributionData { contributions };
    let budget = u64::from(limits.max_aggregate_contributions_per_source);
    if u64::from(source.aggregate_contributions) + data.total_value() > budget {
        return Ok(AggregateDecision::Drop(
            AggregateDropReason::InsufficientBudget,
        ));
    }

    let (min_delay, max_delay) = (
        limits.aggregate_report_min_delay,
        limits.aggregate_report_max_delay,
    );
    let delay = if max_delay > min_delay {
        rng.gen_range(min_delay..max_delay)
    } else {
        min_delay
    };

    let debug_cleartext_payload = data.cleartext_payload()?;

    let report = AggregateReport {
        id: format!("{}:{}:aggregate", source.id, trigger.id),
        source_id: source.id.clone(),
        trigger_id: trigger.id.clone(),
        publisher: source.publisher.clone(),
        enrollment_id: source.enrollment_id.clone(),
        attribution_destination: trigger.attribution_destination.clone(),
        source_registration_time: round_down_to_day(source.event_time),
        scheduled_report_time: trigger.trigger_time + delay,
        api_version: AGGREGATE_API_VERSION.to_string(),
        debug_cleartext_payload,
        aggregate_attribution_data: data,
        status: AggregateReportStatus::Pending,
        source_debug_key: source.debug_key,
        trigger_debug_key: trigger.debug_key,
        dedup_key,
    };

    Ok(AggregateDecision::Insert { report, dedup_key })
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        filters::{FilterMap, FilterSet},
        records::{AggregatableTriggerDatum, AggregateDedupKey},
        values::time::minutes,
    };

    fn scenario() -> (Source, Trigger) {
        let mut source = Source::mock();
        source
            .set_aggregation_keys_json(
                r#"{"campaignCounts": "0x159", "geoValue": "0x5"}"#,
            )
            .expect("valid keys");
        let trigger = Trigger::mock()
            .with_aggregatable_trigger_data_json(
                r#"[{"key_piece": "0x400", "source_keys": ["campaignCounts"]},
                    {"key_piece": "0xA80",
                     "source_keys": ["geoValue", "nonMatch"]}]"#,
            )
            .with_aggregate_values_json(
                r#"{"campaignCounts": 32768, "geoValue": 1644}"#,
            );
        (source, trigger)
    }

    #[test]
    fn test_bucket_is_or_of_key_pieces() {
        let (source, trigger) = scenario();
        let contributions = compute_contributions(&source, &trigger);
        assert_eq!(
            contributions,
            vec![
                AggregateHistogramContribution {
                    key: 1369,
                    value: 32768
                },
                AggregateHistogramContribution {
                    key: 2693,
                    value: 1644
                },
            ]
        );
    }

    #[test]
    fn test_filtered_entries_are_skipped() {
        let (mut source, mut trigger) = scenario();
        source.filter_data = FilterMap::new().with("product", ["1234"]);
        trigger.aggregatable_trigger_data[1].filters =
            FilterSet::single(FilterMap::new().with("product", ["9999"]));

        let contributions = compute_contributions(&source, &trigger);
        assert_eq!(contributions.len(), 1);
        assert_eq!(contributions[0].key, 0x559);
    }

    #[test]
    fn test_entries_sharing_a_source_key_merge() {
        let (source, mut trigger) = scenario();
        trigger.aggregatable_trigger_data.push(AggregatableTriggerDatum {
            key_piece: 0x2000,
            source_keys: vec!["campaignCounts".to_string()],
            filters: FilterSet::Unconstrained,
            not_filters: FilterSet::Unconstrained,
        });
        let contributions = compute_contributions(&source, &trigger);
        assert_eq!(contributions.len(), 2);
        assert_eq!(contributions[0].key, 0x2559);
        assert_eq!(contributions[0].value, 32768);
    }

    #[test]
    fn test_report_fields() -> Result<(), anyhow::Error> {
        let (source, trigger) = scenario();
        let mut rng = StdRng::seed_from_u64(7);
        let limits = AttributionLimits::default();

        match decide_aggregate_report(&source, &trigger, &limits, &mut rng)? {
            AggregateDecision::Insert { report, dedup_key } => {
                assert_eq!(dedup_key, None);
                assert_eq!(report.api_version, "0.1");
                assert_eq!(report.publisher, source.publisher);
                assert_eq!(report.enrollment_id, source.enrollment_id);
                assert_eq!(
                    report.attribution_destination,
                    trigger.attribution_destination
                );
                assert_eq!(
                    report.debug_cleartext_payload,
                    r#"{"operation":"histogram","data":[{"bucket":"1369","value":32768},{"bucket":"2693","value":1644}]}"#
                );
                let delay = report.scheduled_report_time - trigger.trigger_time;
                assert!((minutes(10)..minutes(60)).contains(&delay));
            }
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_budget_overflow_drops_everything() -> Result<(), anyhow::Error> {
        let (mut source, trigger) = scenario();
        let mut rng = StdRng::seed_from_u64(7);
        let limits = AttributionLimits::default();

        // 34412 + 31124 = 65536 exactly fits.
        source.aggregate_contributions = 31124;
        assert!(matches!(
            decide_aggregate_report(&source, &trigger, &limits, &mut rng)?,
            AggregateDecision::Insert { .. }
        ));

        source.aggregate_contributions = 31125;
        assert_eq!(
            decide_aggregate_report(&source, &trigger, &limits, &mut rng)?,
            AggregateDecision::Drop(AggregateDropReason::InsufficientBudget)
        );
        Ok(())
    }

    #[test]
    fn test_aggregate_dedup() -> Result<(), anyhow::Error> {
        let (mut source, mut trigger) = scenario();
        let mut rng = StdRng::seed_from_u64(7);
        let limits = AttributionLimits::default();

        trigger.aggregate_dedup_keys = vec![
            AggregateDedupKey {
                dedup_key: Some(UnsignedLong::new(1)),
                filters: FilterSet::single(
                    FilterMap::new().with("source_type", ["navigation"]),
                ),
                not_filters: FilterSet::Unconstrained,
            },
            AggregateDedupKey {
                dedup_key: Some(UnsignedLong::new(2)),
                filters: FilterSet::Unconstrained,
                not_filters: FilterSet::Unconstrained,
            },
        ];
        assert_eq!(
            matching_aggregate_dedup_key(&source, &trigger),
            Some(UnsignedLong::new(2))
        );

        source.aggregate_report_dedup_keys = vec![UnsignedLong::new(2)];
        assert_eq!(
            decide_aggregate_report(&source, &trigger, &limits, &mut rng)?,
            AggregateDecision::Drop(AggregateDropReason::DuplicateDedupKey)
        );
        Ok(())
    }

    #[test]
    fn test_missing_data_and_late_trigger() -> Result<(), anyhow::Error> {
        let (source, trigger) = scenario();
        let mut rng = StdRng::seed_from_u64(7);
        let limits = AttributionLimits::default();

        let no_values = Trigger {
            aggregate_values: Default::default(),
            ..trigger.clone()
        };
        assert_eq!(
            decide_aggregate_report(&source, &no_values, &limits, &mut rng)?,
            AggregateDecision::Drop(AggregateDropReason::NoAggregatableData)
        );

        let late = Trigger {
            trigger_time: source.aggregatable_report_window + 1,
            ..trigger
        };
        assert_eq!(
            decide_aggregate_report(&source, &late, &limits, &mut rng)?,
            AggregateDecision::Drop(AggregateDropReason::OutsideReportWindow)
        );
        Ok(())
    }
}
