//! Job descriptor construction from a test run spec

use super::{JobDescriptor, JobImages, LoadProfile, NodePlacement, SpikeProfile, StageProfile};
use crate::cluster::{MANAGED_BY_LABEL, MANAGED_BY_VALUE, TARGET_RPS_LABEL, TEST_TYPE_LABEL};
use crate::config::{HarnessConfig, ThresholdConfig};
use crate::duration::format_k6;
use crate::error::{HarnessError, Result};
use crate::models::{TestRunSpec, TestType};
use crate::sidecar::{env as sidecar_env, CONFIG_MOUNT, PROFILE_FILE, SHARED_MOUNT};
use crate::tier::resolve_tier;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_STRESS_DURATION: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SPIKE_MULTIPLIER: u32 = 5;
pub const DEFAULT_SPIKE_DURATION: Duration = Duration::from_secs(30);
pub const DEFAULT_SPIKE_TOTAL_DURATION: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_LOAD_RAMP_UP: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_LOAD_SUSTAIN: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_LOAD_RAMP_DOWN: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SOAK_DURATION: Duration = Duration::from_secs(30 * 60);

/// Headroom added to the load phase when it outgrows the scenario ceiling
const TIMEOUT_HEADROOM: Duration = Duration::from_secs(5 * 60);

fn timeout_ceiling(test_type: TestType) -> Duration {
    match test_type {
        TestType::Stress | TestType::Spike => Duration::from_secs(10 * 60),
        TestType::Load => Duration::from_secs(30 * 60),
        TestType::Soak => Duration::from_secs(60 * 60),
    }
}

/// Builds job descriptors. Pure: no cluster access.
#[derive(Debug, Clone)]
pub struct JobSpecBuilder {
    images: JobImages,
    service_account: String,
    scripts_config_map: String,
    ttl_seconds_after_finished: i32,
    placement: NodePlacement,
    thresholds: ThresholdConfig,
    nodepool_label: String,
}

impl JobSpecBuilder {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            images: JobImages {
                k6: config.k6_image.clone(),
                sidecar: config.sidecar_image.clone(),
            },
            service_account: config.service_account.clone(),
            scripts_config_map: config.scripts_config_map.clone(),
            ttl_seconds_after_finished: config.ttl_seconds_after_finished,
            placement: NodePlacement {
                node_selector: config.node_selector.clone(),
                tolerations: config.tolerations.clone(),
            },
            thresholds: config.thresholds,
            nodepool_label: config.nodepool_label.clone(),
        }
    }

    pub fn build(&self, spec: &TestRunSpec) -> Result<JobDescriptor> {
        if spec.target_rate == 0 {
            return Err(HarnessError::InvalidSpec(
                "target rate must be greater than zero".to_string(),
            ));
        }
        if spec.namespace.trim().is_empty() {
            return Err(HarnessError::InvalidSpec("namespace must not be empty".to_string()));
        }
        if spec.duration == Some(Duration::ZERO) {
            return Err(HarnessError::InvalidSpec("duration must not be zero".to_string()));
        }

        let key = spec.key();
        let profile = self.profile(spec)?;
        let script_path = spec.test_type.script_path();

        let labels = BTreeMap::from([
            (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
            (TEST_TYPE_LABEL.to_string(), spec.test_type.to_string()),
            (TARGET_RPS_LABEL.to_string(), spec.target_rate.to_string()),
        ]);

        let env = self.k6_env(spec, &profile, &script_path);
        let sidecar_env = self.sidecar_env(spec);

        let run_timeout = timeout_ceiling(spec.test_type)
            .max(profile.total_duration().saturating_add(TIMEOUT_HEADROOM));

        Ok(JobDescriptor {
            name: key.to_string(),
            namespace: spec.namespace.clone(),
            key,
            labels,
            tier: resolve_tier(spec.target_rate),
            env,
            sidecar_env,
            script_path,
            profile,
            ttl_seconds_after_finished: self.ttl_seconds_after_finished,
            placement: self.placement.clone(),
            images: self.images.clone(),
            service_account: self.service_account.clone(),
            scripts_config_map: self.scripts_config_map.clone(),
            run_timeout,
        })
    }

    /// Resolve scenario defaults into a concrete load profile
    fn profile(&self, spec: &TestRunSpec) -> Result<LoadProfile> {
        let overrides = &spec.overrides;
        let mut spike = None;
        let mut stages = None;

        let duration = match spec.test_type {
            TestType::Stress => spec.duration.unwrap_or(DEFAULT_STRESS_DURATION),
            TestType::Soak => spec.duration.unwrap_or(DEFAULT_SOAK_DURATION),
            TestType::Spike => {
                let total = spec.duration.unwrap_or(DEFAULT_SPIKE_TOTAL_DURATION);
                let multiplier = overrides.spike_multiplier.unwrap_or(DEFAULT_SPIKE_MULTIPLIER);
                let spike_duration = overrides.spike_duration.unwrap_or(DEFAULT_SPIKE_DURATION);

                if multiplier < 1 {
                    return Err(HarnessError::InvalidSpec(
                        "spike multiplier must be at least 1".to_string(),
                    ));
                }
                if spike_duration.is_zero() || spike_duration > total {
                    return Err(HarnessError::InvalidSpec(format!(
                        "spike duration must be between 1s and the test duration ({}s)",
                        total.as_secs()
                    )));
                }

                spike = Some(SpikeProfile {
                    multiplier,
                    duration_secs: spike_duration.as_secs(),
                });
                total
            }
            TestType::Load => {
                if let Some(duration) = spec.duration {
                    warn!(
                        ignored_secs = duration.as_secs(),
                        "Load tests run for ramp-up + sustain + ramp-down; duration is ignored"
                    );
                }
                let stage = StageProfile {
                    ramp_up_secs: overrides.ramp_up.unwrap_or(DEFAULT_LOAD_RAMP_UP).as_secs(),
                    sustain_secs: overrides.sustain.unwrap_or(DEFAULT_LOAD_SUSTAIN).as_secs(),
                    ramp_down_secs: overrides
                        .ramp_down
                        .unwrap_or(DEFAULT_LOAD_RAMP_DOWN)
                        .as_secs(),
                };
                if stage.sustain_secs == 0 {
                    return Err(HarnessError::InvalidSpec(
                        "sustain time must not be zero".to_string(),
                    ));
                }
                stages = Some(stage);
                Duration::from_secs(stage.total_secs())
            }
        };

        Ok(LoadProfile {
            test_type: spec.test_type,
            target_rate: spec.target_rate,
            duration_secs: duration.as_secs(),
            base_url: spec.base_url.clone(),
            spike,
            stages,
            thresholds: self.thresholds,
            total_duration_secs: duration.as_secs(),
        })
    }

    fn k6_env(
        &self,
        spec: &TestRunSpec,
        profile: &LoadProfile,
        script_path: &str,
    ) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("TEST_TYPE".to_string(), spec.test_type.to_string());
        env.insert("TARGET_RPS".to_string(), spec.target_rate.to_string());
        env.insert("DURATION".to_string(), format_k6(profile.total_duration()));
        env.insert("BASE_URL".to_string(), spec.base_url.clone());
        env.insert("NAMESPACE".to_string(), spec.namespace.clone());
        env.insert("SCRIPT_PATH".to_string(), script_path.to_string());
        env.insert(
            "THRESHOLD_P95_MS".to_string(),
            profile.thresholds.p95_ms.to_string(),
        );
        env.insert(
            "THRESHOLD_ERROR_RATE".to_string(),
            profile.thresholds.error_rate.to_string(),
        );

        if let Some(app_label) = &spec.app_label {
            env.insert("APP_LABEL".to_string(), app_label.clone());
        }
        if let Some(spike) = &profile.spike {
            env.insert("SPIKE_MULTIPLIER".to_string(), spike.multiplier.to_string());
            env.insert(
                "SPIKE_DURATION".to_string(),
                format_k6(Duration::from_secs(spike.duration_secs)),
            );
        }
        if let Some(stages) = &profile.stages {
            env.insert(
                "RAMP_UP_TIME".to_string(),
                format_k6(Duration::from_secs(stages.ramp_up_secs)),
            );
            env.insert(
                "SUSTAIN_TIME".to_string(),
                format_k6(Duration::from_secs(stages.sustain_secs)),
            );
            env.insert(
                "RAMP_DOWN_TIME".to_string(),
                format_k6(Duration::from_secs(stages.ramp_down_secs)),
            );
        }

        env
    }

    fn sidecar_env(&self, spec: &TestRunSpec) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(sidecar_env::SHARED_DIR.to_string(), SHARED_MOUNT.to_string());
        env.insert(
            sidecar_env::PROFILE_PATH.to_string(),
            format!("{}/{}", CONFIG_MOUNT, PROFILE_FILE),
        );
        env.insert(sidecar_env::NAMESPACE.to_string(), spec.namespace.clone());
        env.insert(
            sidecar_env::NODEPOOL_LABEL.to_string(),
            self.nodepool_label.clone(),
        );
        if let Some(app_label) = &spec.app_label {
            env.insert(sidecar_env::APP_LABEL.to_string(), app_label.clone());
        }
        env
    }
}
