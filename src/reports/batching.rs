use std::collections::BTreeMap;

use crate::{
    records::AggregateReport,
    values::{time::round_down_to_day, Timestamp},
};

/// Export batch key: `"<destination>_<scheduled time rounded down to the
/// UTC day, in ms>"`.
pub fn batch_key(
    destination: &str,
    scheduled_report_time: Timestamp,
) -> String {
    format!("{destination}_{}", round_down_to_day(scheduled_report_time))
}

/// Groups aggregate reports by batch key, keeping input order inside each
/// batch.
pub fn group_into_batches<I>(
    reports: I,
) -> BTreeMap<String, Vec<AggregateReport>>
where
    I: IntoIterator<Item = AggregateReport>,
{
    let mut batches: BTreeMap<String, Vec<AggregateReport>> = BTreeMap::new();
    for report in reports {
        let key = batch_key(
            &report.attribution_destination,
            report.scheduled_report_time,
        );
        batches.entry(key).or_default().push(report);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: &str, scheduled_report_time: Timestamp) -> AggregateReport {
        AggregateReport {
            id: id.to_string(),
            attribution_destination: "https://www.example2.com/d2".to_string(),
            scheduled_report_time,
            ..AggregateReport::mock()
        }
    }

    #[test]
    fn test_batch_key() {
        assert_eq!(
            batch_key("https://www.example2.com/d2", 1642333584970),
            "https://www.example2.com/d2_1642291200000"
        );
    }

    #[test]
    fn test_same_day_single_batch() {
        let batches = group_into_batches([
            report("a", 1642333584970),
            report("b", 1642333584971),
        ]);
        assert_eq!(batches.len(), 1);
        let batch = &batches["https://www.example2.com/d2_1642291200000"];
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, "a");
        assert_eq!(batch[1].id, "b");
    }

    #[test]
    fn test_different_days_split() {
        let batches = group_into_batches([
            report("a", 1642333584970),
            report("b", 1642533584970),
        ]);
        assert_eq!(
            batches.keys().collect::<Vec<_>>(),
            vec![
                "https://www.example2.com/d2_1642291200000",
                "https://www.example2.com/d2_1642464000000"
            ]
        );
    }
}
