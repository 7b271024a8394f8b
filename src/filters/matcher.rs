use super::filter_map::{FilterMap, FilterSet};

/// Whether a clause is evaluated as `filters` or as `not_filters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Filter,
    NotFilter,
}

/// Evaluates a trigger-side clause against a source's filter data.
///
/// A single map matches when, for every key present on both sides, the
/// value sets intersect (`Filter`) or are disjoint (`NotFilter`). Keys
/// present on one side only are ignored. A trigger key with an empty value
/// list intersects only a source key whose value list is also empty.
///
/// A set matches when any of its maps matches.
pub fn is_filter_match(
    source_data: &FilterMap,
    clause: &FilterSet,
    mode: MatchMode,
) -> bool {
    match clause {
        FilterSet::Unconstrained => true,
        FilterSet::Malformed => false,
        FilterSet::AnyOf(maps) => {
            maps.is_empty()
                || maps.iter().any(|map| map_matches(source_data, map, mode))
        }
    }
}

fn map_matches(
    source_data: &FilterMap,
    map: &FilterMap,
    mode: MatchMode,
) -> bool {
    map.iter().all(|(key, trigger_values)| {
        let Some(source_values) = source_data.get(key) else {
            return true;
        };
        let intersects = if trigger_values.is_empty() {
            source_values.is_empty()
        } else {
            trigger_values.iter().any(|v| source_values.contains(v))
        };
        match mode {
            MatchMode::Filter => intersects,
            MatchMode::NotFilter => !intersects,
        }
    })
}

/// Both clauses of a filtered construct must pass.
pub fn clauses_pass(
    source_data: &FilterMap,
    filters: &FilterSet,
    not_filters: &FilterSet,
) -> bool {
    is_filter_match(source_data, filters, MatchMode::Filter)
        && is_filter_match(source_data, not_filters, MatchMode::NotFilter)
}
