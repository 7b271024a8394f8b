use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    errors::ParseError,
    filters::FilterSet,
    values::{
        json::{lenient_i64, lenient_u64, parse_key_piece},
        Timestamp, UnsignedLong,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerStatus {
    Pending,
    Attributed,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestinationType {
    App,
    Web,
}

/// One candidate report-shaping record of a trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTriggerDatum {
    pub trigger_data: UnsignedLong,
    pub priority: i64,
    pub dedup_key: Option<UnsignedLong>,
    pub value: u64,
    pub filters: FilterSet,
    pub not_filters: FilterSet,
}

impl Default for EventTriggerDatum {
    fn default() -> Self {
        Self {
            trigger_data: UnsignedLong::default(),
            priority: 0,
            dedup_key: None,
            value: 1,
            filters: FilterSet::Unconstrained,
            not_filters: FilterSet::Unconstrained,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatableTriggerDatum {
    pub key_piece: u128,
    pub source_keys: Vec<String>,
    pub filters: FilterSet,
    pub not_filters: FilterSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateDedupKey {
    pub dedup_key: Option<UnsignedLong>,
    pub filters: FilterSet,
    pub not_filters: FilterSet,
}

/// A conversion waiting to be attributed.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub id: String,
    pub attribution_destination: String,
    pub destination_type: DestinationType,
    pub enrollment_id: String,
    pub trigger_time: Timestamp,
    pub status: TriggerStatus,

    /// Ordered; the first datum whose clauses pass is used.
    pub event_triggers: Vec<EventTriggerDatum>,
    pub filters: FilterSet,
    pub not_filters: FilterSet,

    pub aggregatable_trigger_data: Vec<AggregatableTriggerDatum>,
    pub aggregate_values: BTreeMap<String, u32>,
    pub aggregate_dedup_keys: Vec<AggregateDedupKey>,

    pub debug_key: Option<UnsignedLong>,
}

fn default_trigger_value() -> u64 {
    1
}

#[derive(Deserialize)]
struct WireEventTrigger {
    #[serde(default)]
    trigger_data: UnsignedLong,
    #[serde(default, deserialize_with = "lenient_i64")]
    priority: i64,
    #[serde(default)]
    deduplication_key: Option<UnsignedLong>,
    #[serde(
        default = "default_trigger_value",
        deserialize_with = "lenient_u64"
    )]
    value: u64,
    #[serde(default)]
    filters: Option<Value>,
    #[serde(default)]
    not_filters: Option<Value>,
}

#[derive(Deserialize)]
struct WireAggregatableTriggerDatum {
    key_piece: String,
    #[serde(default)]
    source_keys: Vec<String>,
    #[serde(default)]
    filters: Option<Value>,
    #[serde(default)]
    not_filters: Option<Value>,
}

#[derive(Deserialize)]
struct WireAggregateDedupKey {
    #[serde(default)]
    deduplication_key: Option<UnsignedLong>,
    #[serde(default)]
    filters: Option<Value>,
    #[serde(default)]
    not_filters: Option<Value>,
}

/// Parses the `event_triggers` array. A malformed filter inside a datum
/// only disables that datum.
pub fn parse_event_triggers(
    json: &str,
) -> Result<Vec<EventTriggerDatum>, ParseError> {
    let wire: Vec<WireEventTrigger> = serde_json::from_str(json)?;
    Ok(wire
        .into_iter()
        .map(|w| EventTriggerDatum {
            trigger_data: w.trigger_data,
            priority: w.priority,
            dedup_key: w.deduplication_key,
            value: w.value,
            filters: FilterSet::from_json_value_lenient(w.filters.as_ref()),
            not_filters: FilterSet::from_json_value_lenient(
                w.not_filters.as_ref(),
            ),
        })
        .collect())
}

pub fn parse_aggregatable_trigger_data(
    json: &str,
) -> Result<Vec<AggregatableTriggerDatum>, ParseError> {
    let wire: Vec<WireAggregatableTriggerDatum> = serde_json::from_str(json)?;
    wire.into_iter()
        .map(|w| {
            Ok(AggregatableTriggerDatum {
                key_piece: parse_key_piece(&w.key_piece)?,
                source_keys: w.source_keys,
                filters: FilterSet::from_json_value_lenient(w.filters.as_ref()),
                not_filters: FilterSet::from_json_value_lenient(
                    w.not_filters.as_ref(),
                ),
            })
        })
        .collect()
}

pub fn parse_aggregate_values(
    json: &str,
) -> Result<BTreeMap<String, u32>, ParseError> {
    Ok(serde_json::from_str(json)?)
}

pub fn parse_aggregate_dedup_keys(
    json: &str,
) -> Result<Vec<AggregateDedupKey>, ParseError> {
    let wire: Vec<WireAggregateDedupKey> = serde_json::from_str(json)?;
    Ok(wire
        .into_iter()
        .map(|w| AggregateDedupKey {
            dedup_key: w.deduplication_key,
            filters: FilterSet::from_json_value_lenient(w.filters.as_ref()),
            not_filters: FilterSet::from_json_value_lenient(
                w.not_filters.as_ref(),
            ),
        })
        .collect())
}

/// Boundary setters. Each one parses its construct eagerly; a construct
/// that fails to parse is replaced by a value that can never produce a
/// report (empty lists, or a non-matching filter clause).
impl Trigger {
    pub fn with_event_triggers_json(mut self, json: &str) -> Self {
        self.event_triggers = parse_event_triggers(json).unwrap_or_else(|err| {
            warn!(
                "Trigger {}: dropping malformed event_triggers: {err}",
                self.id
            );
            Vec::new()
        });
        self
    }

    pub fn with_filters_json(mut self, json: &str) -> Self {
        self.filters = FilterSet::parse_lenient(json);
        self
    }

    pub fn with_not_filters_json(mut self, json: &str) -> Self {
        self.not_filters = FilterSet::parse_lenient(json);
        self
    }

    pub fn with_aggregatable_trigger_data_json(mut self, json: &str) -> Self {
        self.aggregatable_trigger_data = parse_aggregatable_trigger_data(json)
            .unwrap_or_else(|err| {
                warn!(
                    "Trigger {}: dropping malformed \
                     aggregatable_trigger_data: {err}",
                    self.id
                );
                Vec::new()
            });
        self
    }

    pub fn with_aggregate_values_json(mut self, json: &str) -> Self {
        self.aggregate_values =
            parse_aggregate_values(json).unwrap_or_else(|err| {
                warn!(
                    "Trigger {}: dropping malformed aggregatable_values: {err}",
                    self.id
                );
                BTreeMap::new()
            });
        self
    }

    pub fn with_aggregate_dedup_keys_json(mut self, json: &str) -> Self {
        self.aggregate_dedup_keys = parse_aggregate_dedup_keys(json)
            .unwrap_or_else(|err| {
                warn!(
                    "Trigger {}: dropping malformed \
                     aggregatable_deduplication_keys: {err}",
                    self.id
                );
                Vec::new()
            });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterMap;

    #[test]
    fn test_parse_event_triggers() -> Result<(), anyhow::Error> {
        let data = parse_event_triggers(
            r#"[
                {"trigger_data": 5, "priority": 123, "deduplication_key": 2,
                 "filters": [{"source_type": ["event"]}]},
                {"trigger_data": "6", "priority": "-1", "value": 1000},
                {}
            ]"#,
        )?;
        assert_eq!(data.len(), 3);

        assert_eq!(data[0].trigger_data, UnsignedLong::new(5));
        assert_eq!(data[0].priority, 123);
        assert_eq!(data[0].dedup_key, Some(UnsignedLong::new(2)));
        assert_eq!(data[0].value, 1);
        assert_eq!(
            data[0].filters,
            FilterSet::single(FilterMap::new().with("source_type", ["event"]))
        );
        assert_eq!(data[0].not_filters, FilterSet::Unconstrained);

        assert_eq!(data[1].trigger_data, UnsignedLong::new(6));
        assert_eq!(data[1].priority, -1);
        assert_eq!(data[1].value, 1000);

        assert_eq!(data[2], EventTriggerDatum::default());
        Ok(())
    }

    #[test]
    fn test_malformed_datum_filters_only_disable_datum(
    ) -> Result<(), anyhow::Error> {
        let data = parse_event_triggers(
            r#"[{"trigger_data": 1, "filters": {"key": "not-a-list"}},
                {"trigger_data": 2}]"#,
        )?;
        assert_eq!(data[0].filters, FilterSet::Malformed);
        assert_eq!(data[1].filters, FilterSet::Unconstrained);
        Ok(())
    }

    #[test]
    fn test_lenient_setters_fail_closed() {
        let trigger = Trigger::mock()
            .with_event_triggers_json("{oops")
            .with_filters_json("[1, 2]")
            .with_aggregatable_trigger_data_json(r#"[{"key_piece": "zz"}]"#)
            .with_aggregate_values_json(r#"{"a": -1}"#)
            .with_aggregate_dedup_keys_json("nope");

        assert!(trigger.event_triggers.is_empty());
        assert_eq!(trigger.filters, FilterSet::Malformed);
        assert!(trigger.aggregatable_trigger_data.is_empty());
        assert!(trigger.aggregate_values.is_empty());
        assert!(trigger.aggregate_dedup_keys.is_empty());
    }

    #[test]
    fn test_parse_aggregate_fields() -> Result<(), anyhow::Error> {
        let data = parse_aggregatable_trigger_data(
            r#"[{"key_piece": "0x400", "source_keys": ["campaignCounts"]},
                {"key_piece": "0xA80", "source_keys": ["geoValue", "nonMatch"],
                 "not_filters": {"product": ["1"]}}]"#,
        )?;
        assert_eq!(data[0].key_piece, 0x400);
        assert_eq!(data[1].key_piece, 0xA80);
        assert_eq!(data[1].source_keys, vec!["geoValue", "nonMatch"]);

        let values =
            parse_aggregate_values(
                r#"{"campaignCounts": 32768, "geoValue": 1644}"#,
            )?;
        assert_eq!(values.get("geoValue"), Some(&1644));

        let dedup = parse_aggregate_dedup_keys(
            r#"[{"deduplication_key": "10", "filters": {"product": ["1"]}},
                {"deduplication_key": 11}]"#,
        )?;
        assert_eq!(dedup[0].dedup_key, Some(UnsignedLong::new(10)));
        assert_eq!(dedup[1].dedup_key, Some(UnsignedLong::new(11)));
        Ok(())
    }
}
