//! Load-profile contract consumed by the generator process
//!
//! Written into the per-run ConfigMap as `profile.json`.

use crate::config::ThresholdConfig;
use crate::models::TestType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpikeProfile {
    pub multiplier: u32,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProfile {
    pub ramp_up_secs: u64,
    pub sustain_secs: u64,
    pub ramp_down_secs: u64,
}

impl StageProfile {
    pub fn total_secs(&self) -> u64 {
        self.ramp_up_secs
            .saturating_add(self.sustain_secs)
            .saturating_add(self.ramp_down_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadProfile {
    pub test_type: TestType,
    pub target_rate: u32,
    pub duration_secs: u64,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spike: Option<SpikeProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<StageProfile>,
    pub thresholds: ThresholdConfig,
    /// Expected wall-clock length of the load phase
    pub total_duration_secs: u64,
}

impl LoadProfile {
    pub fn total_duration(&self) -> Duration {
        Duration::from_secs(self.total_duration_secs)
    }
}
