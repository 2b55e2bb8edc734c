//! Rendering of job descriptors into Kubernetes objects

use super::JobDescriptor;
use crate::error::Result;
use crate::sidecar::{
    COLLECTOR_CONTAINER, CONFIG_MOUNT, GENERATOR_CONTAINER, INSTALLER_CONTAINER, PROFILE_FILE,
    SCRIPTS_MOUNT, SHARED_MOUNT, SIDECAR_BINARY, SUMMARY_FILE,
};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EmptyDirVolumeSource, EnvVar, PodSpec,
    PodTemplateSpec, ResourceRequirements, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

const SHARED_VOLUME: &str = "shared";
const CONFIG_VOLUME: &str = "run-config";
const SCRIPTS_VOLUME: &str = "scripts";

/// Trend statistics requested from k6's summary export
const TREND_STATS: &str = "avg,min,med,max,p(50),p(95),p(99)";

fn env_vars(env: &BTreeMap<String, String>) -> Vec<EnvVar> {
    env.iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect()
}

fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

fn config_map_volume(name: &str, config_map: &str) -> Volume {
    Volume {
        name: name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: Some(config_map.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

impl JobDescriptor {
    fn metadata(&self, name: String) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels.clone()),
            ..Default::default()
        }
    }

    fn resources(&self) -> ResourceRequirements {
        let tier = &self.tier;
        ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(tier.cpu_request.clone())),
                ("memory".to_string(), Quantity(tier.memory_request.clone())),
            ])),
            limits: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(tier.cpu_limit.clone())),
                ("memory".to_string(), Quantity(tier.memory_limit.clone())),
            ])),
            ..Default::default()
        }
    }

    fn sidecar_binary(&self) -> String {
        format!("{}/bin/{}", SHARED_MOUNT, SIDECAR_BINARY)
    }

    fn generator_args(&self) -> Vec<String> {
        vec![
            "generate".to_string(),
            "--".to_string(),
            "k6".to_string(),
            "run".to_string(),
            "--summary-export".to_string(),
            format!("{}/{}", SHARED_MOUNT, SUMMARY_FILE),
            "--summary-trend-stats".to_string(),
            TREND_STATS.to_string(),
            self.script_path.clone(),
        ]
    }

    fn tolerations(&self) -> Option<Vec<Toleration>> {
        if self.placement.tolerations.is_empty() {
            return None;
        }
        let tolerations = self
            .placement
            .tolerations
            .iter()
            .map(|t| Toleration {
                key: Some(t.key.clone()),
                operator: Some(if t.value.is_some() { "Equal" } else { "Exists" }.to_string()),
                value: t.value.clone(),
                effect: Some(t.effect.clone()),
                ..Default::default()
            })
            .collect();
        Some(tolerations)
    }

    /// Render the Kubernetes Job for this run
    pub fn to_job(&self) -> Job {
        let shared_env = env_vars(&self.sidecar_env);

        let installer = Container {
            name: INSTALLER_CONTAINER.to_string(),
            image: Some(self.images.sidecar.clone()),
            command: Some(vec![SIDECAR_BINARY.to_string()]),
            args: Some(vec![
                "install".to_string(),
                "--dest".to_string(),
                format!("{}/bin", SHARED_MOUNT),
            ]),
            volume_mounts: Some(vec![mount(SHARED_VOLUME, SHARED_MOUNT, false)]),
            ..Default::default()
        };

        let mut generator_env = env_vars(&self.env);
        generator_env.extend(shared_env.iter().cloned());

        let generator = Container {
            name: GENERATOR_CONTAINER.to_string(),
            image: Some(self.images.k6.clone()),
            command: Some(vec![self.sidecar_binary()]),
            args: Some(self.generator_args()),
            env: Some(generator_env),
            resources: Some(self.resources()),
            volume_mounts: Some(vec![
                mount(SHARED_VOLUME, SHARED_MOUNT, false),
                mount(CONFIG_VOLUME, CONFIG_MOUNT, true),
                mount(SCRIPTS_VOLUME, SCRIPTS_MOUNT, true),
            ]),
            ..Default::default()
        };

        let collector = Container {
            name: COLLECTOR_CONTAINER.to_string(),
            image: Some(self.images.sidecar.clone()),
            command: Some(vec![SIDECAR_BINARY.to_string()]),
            args: Some(vec!["collect".to_string()]),
            env: Some(shared_env),
            volume_mounts: Some(vec![
                mount(SHARED_VOLUME, SHARED_MOUNT, false),
                mount(CONFIG_VOLUME, CONFIG_MOUNT, true),
            ]),
            ..Default::default()
        };

        let pod_spec = PodSpec {
            restart_policy: Some("Never".to_string()),
            service_account_name: Some(self.service_account.clone()),
            init_containers: Some(vec![installer]),
            containers: vec![generator, collector],
            node_selector: (!self.placement.node_selector.is_empty())
                .then(|| self.placement.node_selector.clone()),
            tolerations: self.tolerations(),
            volumes: Some(vec![
                Volume {
                    name: SHARED_VOLUME.to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
                config_map_volume(CONFIG_VOLUME, &self.config_map_name()),
                config_map_volume(SCRIPTS_VOLUME, &self.scripts_config_map),
            ]),
            ..Default::default()
        };

        Job {
            metadata: self.metadata(self.name.clone()),
            spec: Some(JobSpec {
                backoff_limit: Some(0),
                ttl_seconds_after_finished: Some(self.ttl_seconds_after_finished),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels.clone()),
                        ..Default::default()
                    }),
                    spec: Some(pod_spec),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Render the per-run ConfigMap carrying the load profile
    pub fn to_config_map(&self) -> Result<ConfigMap> {
        let profile = serde_json::to_string_pretty(&self.profile)?;
        Ok(ConfigMap {
            metadata: self.metadata(self.config_map_name()),
            data: Some(BTreeMap::from([(PROFILE_FILE.to_string(), profile)])),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{HarnessConfig, TolerationConfig};
    use crate::job::{JobSpecBuilder, LoadProfile};
    use crate::models::{TestRunSpec, TestType};

    fn descriptor(config: &HarnessConfig, test_type: TestType, rate: u32) -> super::JobDescriptor {
        let spec = TestRunSpec::new(test_type, rate, config);
        JobSpecBuilder::new(config).build(&spec).unwrap()
    }

    #[test]
    fn test_job_shape() {
        let config = HarnessConfig::default();
        let job = descriptor(&config, TestType::Stress, 100).to_job();

        assert_eq!(job.metadata.name.as_deref(), Some("stress-100rps"));
        assert_eq!(job.metadata.namespace.as_deref(), Some("load-testing"));

        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(0));
        assert_eq!(spec.ttl_seconds_after_finished, Some(3600));

        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.init_containers.unwrap()[0].name, "install-sidecar");

        let names: Vec<_> = pod.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["k6", "metrics-collector"]);

        let k6 = &pod.containers[0];
        assert_eq!(k6.image.as_deref(), Some("grafana/k6:0.49.0"));
        assert_eq!(k6.command.as_ref().unwrap()[0], "/shared/bin/k6-sidecar");
        let args = k6.args.as_ref().unwrap();
        assert_eq!(args.last().map(String::as_str), Some("/scripts/stress-test.js"));
        assert!(args.contains(&"/shared/summary.json".to_string()));

        let resources = k6.resources.as_ref().unwrap();
        assert_eq!(resources.requests.as_ref().unwrap()["cpu"].0, "500m");
        assert_eq!(resources.limits.as_ref().unwrap()["memory"].0, "1Gi");

        let volumes: Vec<_> = pod
            .volumes
            .unwrap()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(volumes, vec!["shared", "run-config", "scripts"]);
    }

    #[test]
    fn test_env_is_rendered_on_generator() {
        let config = HarnessConfig::default();
        let job = descriptor(&config, TestType::Spike, 20).to_job();
        let pod = job.spec.unwrap().template.spec.unwrap();
        let env = pod.containers[0].env.as_ref().unwrap();

        let value = |name: &str| {
            env.iter()
                .find(|e| e.name == name)
                .and_then(|e| e.value.clone())
        };
        assert_eq!(value("TARGET_RPS").as_deref(), Some("20"));
        assert_eq!(value("SPIKE_MULTIPLIER").as_deref(), Some("5"));
        assert_eq!(value("SIDECAR_SHARED_DIR").as_deref(), Some("/shared"));
    }

    #[test]
    fn test_placement_is_optional() {
        let config = HarnessConfig::default();
        let pod = descriptor(&config, TestType::Stress, 10)
            .to_job()
            .spec
            .unwrap()
            .template
            .spec
            .unwrap();
        assert!(pod.node_selector.is_none());
        assert!(pod.tolerations.is_none());

        let mut config = HarnessConfig::default();
        config
            .node_selector
            .insert("agentpool".to_string(), "loadgen".to_string());
        config.tolerations.push(TolerationConfig {
            key: "dedicated".to_string(),
            value: Some("loadgen".to_string()),
            effect: "NoSchedule".to_string(),
        });
        let pod = descriptor(&config, TestType::Stress, 10)
            .to_job()
            .spec
            .unwrap()
            .template
            .spec
            .unwrap();
        assert_eq!(pod.node_selector.unwrap()["agentpool"], "loadgen");
        let toleration = &pod.tolerations.unwrap()[0];
        assert_eq!(toleration.operator.as_deref(), Some("Equal"));
        assert_eq!(toleration.effect.as_deref(), Some("NoSchedule"));
    }

    #[test]
    fn test_config_map_carries_profile() {
        let config = HarnessConfig::default();
        let descriptor = descriptor(&config, TestType::Load, 200);
        let config_map = descriptor.to_config_map().unwrap();

        assert_eq!(config_map.metadata.name.as_deref(), Some("load-200rps-config"));
        let raw = &config_map.data.unwrap()["profile.json"];
        let profile: LoadProfile = serde_json::from_str(raw).unwrap();
        assert_eq!(profile, descriptor.profile);
    }
}
