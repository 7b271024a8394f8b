use crate::{
    filters::clauses_pass,
    records::{EventTriggerDatum, Source, Trigger},
};

/// Picks the winning source among `sources` and returns it along with the
/// losers. Ranking: install-cooldown protected sources first, then higher
/// priority, then the most recent event time.
pub fn select_source(
    mut sources: Vec<Source>,
    trigger: &Trigger,
) -> Option<(Source, Vec<Source>)> {
    let trigger_time = trigger.trigger_time;
    sources.sort_by(|a, b| {
        b.is_install_cooldown_eligible(trigger_time)
            .cmp(&a.is_install_cooldown_eligible(trigger_time))
            .then(b.priority.cmp(&a.priority))
            .then(b.event_time.cmp(&a.event_time))
    });

    let mut ranked = sources.into_iter();
    let winner = ranked.next()?;
    Some((winner, ranked.collect()))
}

/// First event trigger datum, in registration order, whose clauses pass
/// against `source`.
pub fn select_event_trigger_datum<'a>(
    source: &Source,
    trigger: &'a Trigger,
) -> Option<&'a EventTriggerDatum> {
    let source_data = source.filter_data_for_matching();
    trigger
        .event_triggers
        .iter()
        .find(|datum| {
            clauses_pass(&source_data, &datum.filters, &datum.not_filters)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::{time::days, UnsignedLong};

    fn source(id: &str, priority: i64, event_time: i64) -> Source {
        Source {
            id: id.to_string(),
            priority,
            event_time,
            ..Source::mock()
        }
    }

    #[test]
    fn test_priority_then_recency() {
        let base = Source::mock().event_time;
        let trigger = Trigger::mock();

        let (winner, losers) = select_source(
            vec![
                source("low", 1, base),
                source("high_old", 5, base - days(1)),
                source("high_new", 5, base),
            ],
            &trigger,
        )
        .expect("a winner");
        assert_eq!(winner.id, "high_new");
        let loser_ids: Vec<_> = losers.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(loser_ids, vec!["high_old", "low"]);
    }

    #[test]
    fn test_install_cooldown_wins() {
        let base = Source::mock().event_time;
        let trigger = Trigger::mock();

        let protected = Source {
            install_attributed: true,
            install_cooldown_window: days(10),
            ..source("protected", 0, base - days(1))
        };
        let (winner, _) =
            select_source(vec![source("high", 100, base), protected], &trigger)
                .expect("a winner");
        assert_eq!(winner.id, "protected");

        // Once the cooldown has passed, normal ranking applies.
        let expired = Source {
            install_attributed: true,
            install_cooldown_window: 1,
            ..source("expired", 0, base - days(1))
        };
        let (winner, _) =
            select_source(vec![expired, source("high", 100, base)], &trigger)
                .expect("a winner");
        assert_eq!(winner.id, "high");
    }

    #[test]
    fn test_no_sources() {
        assert!(select_source(vec![], &Trigger::mock()).is_none());
    }

    #[test]
    fn test_first_passing_datum() {
        let source = Source::mock();
        let trigger = Trigger::mock().with_event_triggers_json(
            r#"[{"trigger_data": "1",
                 "filters": {"source_type": ["navigation"]}},
                {"trigger_data": "2", "filters": [{"source_type": ["event"]}]},
                {"trigger_data": "3"}]"#,
        );

        let datum =
            select_event_trigger_datum(&source, &trigger).expect("datum");
        assert_eq!(datum.trigger_data, UnsignedLong::new(2));
    }

    #[test]
    fn test_no_passing_datum() {
        let source = Source::mock();
        let trigger = Trigger::mock().with_event_triggers_json(
            r#"[{"trigger_data": "1",
                 "not_filters": {"source_type": ["event"]}}]"#,
        );
        assert!(select_event_trigger_datum(&source, &trigger).is_none());
    }
}
