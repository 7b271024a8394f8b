use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const MAX_FLEXIBLE_EVENT_REPORTS: u32 = 20;
pub const MAX_FLEXIBLE_EVENT_TRIGGER_DATA_CARDINALITY: usize = 8;
pub const MAX_FLEXIBLE_EVENT_REPORTING_WINDOWS: usize = 5;

/// Static noise probabilities, loaded once at process start and handed to
/// the noise handler. Keys follow the established property names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PrivacyParams {
    pub event_noise_probability: f64,
    pub navigation_noise_probability: f64,
    pub install_attr_event_noise_probability: f64,
    pub dual_destination_event_noise_probability: f64,
    pub dual_destination_navigation_noise_probability: f64,
    pub install_attr_dual_destination_event_noise_probability: f64,
}

impl PrivacyParams {
    /// Parses and validates the configuration. Every key is required.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in self.entries() {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidProbability { key, value });
            }
        }
        Ok(())
    }

    /// Install-attributed navigation sources share the plain navigation
    /// probability.
    pub fn install_attr_navigation_noise_probability(&self) -> f64 {
        self.navigation_noise_probability
    }

    pub fn install_attr_dual_destination_navigation_noise_probability(
        &self,
    ) -> f64 {
        self.dual_destination_navigation_noise_probability
    }

    fn entries(&self) -> [(&'static str, f64); 6] {
        [
            ("eventNoiseProbability", self.event_noise_probability),
            ("navigationNoiseProbability", self.navigation_noise_probability),
            (
                "installAttrEventNoiseProbability",
                self.install_attr_event_noise_probability,
            ),
            (
                "dualDestinationEventNoiseProbability",
                self.dual_destination_event_noise_probability,
            ),
            (
                "dualDestinationNavigationNoiseProbability",
                self.dual_destination_navigation_noise_probability,
            ),
            (
                "installAttrDualDestinationEventNoiseProbability",
                self.install_attr_dual_destination_event_noise_probability,
            ),
        ]
    }
}
