use crate::{
    privacy::params::PrivacyParams,
    records::{Source, SourceType},
};

/// Supplies the randomized-response rate recorded on event reports.
pub trait NoiseHandler {
    fn random_attribution_probability(&self, source: &Source) -> f64;
}

/// Looks the probability up in the static [`PrivacyParams`] table by
/// source type, destination count and install detection.
#[derive(Debug, Clone)]
pub struct StaticNoiseHandler {
    params: PrivacyParams,
}

impl StaticNoiseHandler {
    pub fn new(params: PrivacyParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PrivacyParams {
        &self.params
    }
}

impl NoiseHandler for StaticNoiseHandler {
    fn random_attribution_probability(&self, source: &Source) -> f64 {
        let p = &self.params;
        let dual = source.has_app_and_web_destinations();
        let install = source.is_install_detection_enabled();

        match (source.source_type, dual, install) {
            (SourceType::Event, false, false) => p.event_noise_probability,
            (SourceType::Event, false, true) => {
                p.install_attr_event_noise_probability
            }
            (SourceType::Event, true, false) => {
                p.dual_destination_event_noise_probability
            }
            (SourceType::Event, true, true) => {
                p.install_attr_dual_destination_event_noise_probability
            }
            (SourceType::Navigation, false, false) => {
                p.navigation_noise_probability
            }
            (SourceType::Navigation, false, true) => {
                p.install_attr_navigation_noise_probability()
            }
            (SourceType::Navigation, true, false) => {
                p.dual_destination_navigation_noise_probability
            }
            (SourceType::Navigation, true, true) => {
                p.install_attr_dual_destination_navigation_noise_probability()
            }
        }
    }
}
