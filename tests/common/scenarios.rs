use attribution_engine::{
    attribution::AttributionJobHandler,
    privacy::{
        limits::AttributionLimits, noise::StaticNoiseHandler,
        params::PrivacyParams,
    },
    records::{Source, Trigger},
    store::{hashmap_store::HashMapAttributionStore, traits::AttributionStore},
};
use rand::{rngs::StdRng, SeedableRng};

pub type TestHandler<S = HashMapAttributionStore> =
    AttributionJobHandler<S, StaticNoiseHandler, anyhow::Error>;

/// Handler over `store` with default limits, mock noise and a seeded rng.
pub fn handler<S>(store: S) -> TestHandler<S>
where
    S: AttributionStore<Error = anyhow::Error>,
{
    AttributionJobHandler::with_rng(
        store,
        StaticNoiseHandler::new(PrivacyParams::mock()),
        AttributionLimits::default(),
        StdRng::seed_from_u64(1),
    )
}

/// Mock source carrying the `campaignCounts` and `geoValue` keys.
pub fn campaign_source() -> Source {
    let mut source = Source::mock();
    source
        .set_aggregation_keys_json(
            r#"{"campaignCounts": "0x159", "geoValue": "0x5"}"#,
        )
        .expect("valid aggregation keys");
    source
}

/// Trigger contributing 32768 to `campaignCounts` and 1644 to `geoValue`.
pub fn purchase_trigger(id: &str) -> Trigger {
    Trigger {
        id: id.to_string(),
        ..Trigger::mock()
    }
    .with_aggregatable_trigger_data_json(
        r#"[{"key_piece": "0x400", "source_keys": ["campaignCounts"]},
            {"key_piece": "0xA80", "source_keys": ["geoValue", "nonMatch"]}]"#,
    )
    .with_aggregate_values_json(
        r#"{"campaignCounts": 32768, "geoValue": 1644}"#,
    )
}
