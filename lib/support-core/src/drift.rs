//! Drift detection between desired and live child resources
//!
//! Only the fields the operator owns are compared. Everything else on the live
//! object (server defaults, fields other controllers set, the
//! resourceVersion) is carried over into the update.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Container, Service, ServicePort};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use support_api::openshift::RoutePort;
use support_api::Route;

pub trait Drift: Sized {
    /// The live object with desired fields applied, or `None` when it already matches
    fn reconcile_onto(&self, live: &Self) -> Option<Self>;
}

fn metadata_drifted(desired: &ObjectMeta, live: &ObjectMeta) -> bool {
    let labels_missing = desired.labels.iter().flatten().any(|(k, v)| {
        live.labels.as_ref().and_then(|labels| labels.get(k)) != Some(v)
    });
    let owner_missing = desired.owner_references.is_some() && live.owner_references.is_none();
    labels_missing || owner_missing
}

fn apply_metadata(desired: &ObjectMeta, live: &mut ObjectMeta) {
    if let Some(labels) = &desired.labels {
        live.labels
            .get_or_insert_with(Default::default)
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if live.owner_references.is_none() {
        live.owner_references = desired.owner_references.clone();
    }
}

impl Drift for ConfigMap {
    fn reconcile_onto(&self, live: &Self) -> Option<Self> {
        if self.data == live.data && !metadata_drifted(&self.metadata, &live.metadata) {
            return None;
        }
        let mut updated = live.clone();
        updated.data = self.data.clone();
        apply_metadata(&self.metadata, &mut updated.metadata);
        Some(updated)
    }
}

fn primary_container(deployment: &Deployment) -> Option<&Container> {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.first())
}

fn container_drifted(desired: Option<&Container>, live: Option<&Container>) -> bool {
    let (desired, live) = match (desired, live) {
        (Some(desired), Some(live)) => (desired, live),
        (None, None) => return false,
        _ => return true,
    };

    let ports = |c: &Container| -> Vec<(Option<String>, i32)> {
        c.ports
            .iter()
            .flatten()
            .map(|p| (p.name.clone(), p.container_port))
            .collect()
    };
    let env = |c: &Container| -> Vec<(String, Option<String>)> {
        c.env
            .iter()
            .flatten()
            .map(|e| (e.name.clone(), e.value.clone()))
            .collect()
    };
    let mounts = |c: &Container| -> Vec<(String, String)> {
        c.volume_mounts
            .iter()
            .flatten()
            .map(|m| (m.name.clone(), m.mount_path.clone()))
            .collect()
    };

    desired.name != live.name
        || desired.image != live.image
        || ports(desired) != ports(live)
        || env(desired) != env(live)
        || mounts(desired) != mounts(live)
}

/// Pod volumes by name and the ConfigMap they project
fn pod_volumes(deployment: &Deployment) -> Vec<(String, Option<String>)> {
    deployment
        .spec
        .iter()
        .filter_map(|s| s.template.spec.as_ref())
        .flat_map(|p| p.volumes.iter().flatten())
        .map(|v| (v.name.clone(), v.config_map.as_ref().map(|c| c.name.clone())))
        .collect()
}

impl Drift for Deployment {
    fn reconcile_onto(&self, live: &Self) -> Option<Self> {
        let desired_replicas = self.spec.as_ref().and_then(|s| s.replicas);
        let live_replicas = live.spec.as_ref().and_then(|s| s.replicas);

        let drifted = desired_replicas != live_replicas
            || container_drifted(primary_container(self), primary_container(live))
            || pod_volumes(self) != pod_volumes(live)
            || metadata_drifted(&self.metadata, &live.metadata);
        if !drifted {
            return None;
        }

        let mut updated = live.clone();
        match (&mut updated.spec, &self.spec) {
            (Some(live_spec), Some(desired_spec)) => {
                live_spec.replicas = desired_spec.replicas;
                live_spec.template = desired_spec.template.clone();
            }
            (live_spec, desired_spec) => *live_spec = desired_spec.clone(),
        }
        apply_metadata(&self.metadata, &mut updated.metadata);
        Some(updated)
    }
}

fn service_ports(service: &Service) -> Vec<ServicePort> {
    service
        .spec
        .iter()
        .flat_map(|s| s.ports.iter().flatten())
        .map(|p| ServicePort {
            name: p.name.clone(),
            port: p.port,
            target_port: p.target_port.clone(),
            protocol: p.protocol.clone(),
            ..Default::default()
        })
        .collect()
}

impl Drift for Service {
    fn reconcile_onto(&self, live: &Self) -> Option<Self> {
        let selector = |s: &Service| s.spec.as_ref().and_then(|spec| spec.selector.clone());

        let drifted = service_ports(self) != service_ports(live)
            || selector(self) != selector(live)
            || metadata_drifted(&self.metadata, &live.metadata);
        if !drifted {
            return None;
        }

        let mut updated = live.clone();
        match (&mut updated.spec, &self.spec) {
            (Some(live_spec), Some(desired_spec)) => {
                live_spec.ports = desired_spec.ports.clone();
                live_spec.selector = desired_spec.selector.clone();
            }
            (live_spec, desired_spec) => *live_spec = desired_spec.clone(),
        }
        apply_metadata(&self.metadata, &mut updated.metadata);
        Some(updated)
    }
}

/// Route fields the operator sets; tls, path and weights belong to whoever set them
fn route_owned(route: &Route) -> (Option<&String>, &str, &str, Option<&RoutePort>) {
    let spec = &route.spec;
    (
        spec.host.as_ref(),
        spec.to.kind.as_str(),
        spec.to.name.as_str(),
        spec.port.as_ref(),
    )
}

impl Drift for Route {
    fn reconcile_onto(&self, live: &Self) -> Option<Self> {
        if route_owned(self) == route_owned(live)
            && !metadata_drifted(&self.metadata, &live.metadata)
        {
            return None;
        }
        let mut updated = live.clone();
        updated.spec.host = self.spec.host.clone();
        updated.spec.to.kind = self.spec.to.kind.clone();
        updated.spec.to.name = self.spec.to.name.clone();
        updated.spec.port = self.spec.port.clone();
        apply_metadata(&self.metadata, &mut updated.metadata);
        Some(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{
        ConfigMapVolumeSource, EnvVar, PodSpec, PodTemplateSpec, ServiceSpec, Volume, VolumeMount,
    };
    use std::collections::BTreeMap;
    use support_api::openshift::{RouteSpec, RouteTargetReference, RouteTls};

    fn meta(labels: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            name: Some("jobs-service".to_string()),
            namespace: Some("ns-a".to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn deployment(image: &str, replicas: i32) -> Deployment {
        Deployment {
            metadata: meta(&[("app", "jobs")]),
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "jobs-service".to_string(),
                            image: Some(image.to_string()),
                            env: Some(vec![EnvVar {
                                name: "HTTP_PORT".to_string(),
                                value: Some("8080".to_string()),
                                ..Default::default()
                            }]),
                            volume_mounts: Some(vec![VolumeMount {
                                name: "config".to_string(),
                                mount_path: "/deployments/config".to_string(),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        volumes: Some(vec![Volume {
                            name: "config".to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: "jobs-service-properties".to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_matching_deployment_has_no_drift() {
        let desired = deployment("img:1", 1);
        let mut live = desired.clone();
        live.metadata.resource_version = Some("42".to_string());
        live.metadata
            .labels
            .as_mut()
            .unwrap()
            .insert("extra".to_string(), "kept".to_string());
        live.spec.as_mut().unwrap().revision_history_limit = Some(10);
        assert!(desired.reconcile_onto(&live).is_none());
    }

    #[test]
    fn test_deployment_image_drift_keeps_live_fields() {
        let desired = deployment("img:2", 1);
        let mut live = deployment("img:1", 1);
        live.metadata.resource_version = Some("42".to_string());
        live.spec.as_mut().unwrap().revision_history_limit = Some(10);

        let updated = desired.reconcile_onto(&live).unwrap();
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(primary_container(&updated).unwrap().image.as_deref(), Some("img:2"));
        assert_eq!(updated.spec.as_ref().unwrap().revision_history_limit, Some(10));
    }

    #[test]
    fn test_deployment_replica_drift() {
        let desired = deployment("img:1", 3);
        let live = deployment("img:1", 1);
        let updated = desired.reconcile_onto(&live).unwrap();
        assert_eq!(updated.spec.unwrap().replicas, Some(3));
    }

    #[test]
    fn test_removed_config_volume_is_restored() {
        let desired = deployment("img:1", 1);
        let mut live = desired.clone();
        let pod = live.spec.as_mut().unwrap().template.spec.as_mut().unwrap();
        pod.volumes = None;
        pod.containers[0].volume_mounts = None;

        let updated = desired.reconcile_onto(&live).unwrap();
        assert_eq!(pod_volumes(&updated), pod_volumes(&desired));
        let mounts = primary_container(&updated).unwrap().volume_mounts.clone().unwrap();
        assert_eq!(mounts[0].mount_path, "/deployments/config");
    }

    #[test]
    fn test_repointed_config_volume_is_drift() {
        let desired = deployment("img:1", 1);
        let mut live = desired.clone();
        let pod = live.spec.as_mut().unwrap().template.spec.as_mut().unwrap();
        pod.volumes.as_mut().unwrap()[0].config_map = Some(ConfigMapVolumeSource {
            name: "other".to_string(),
            ..Default::default()
        });
        assert!(desired.reconcile_onto(&live).is_some());

        let mut live = desired.clone();
        let pod = live.spec.as_mut().unwrap().template.spec.as_mut().unwrap();
        pod.containers[0].volume_mounts.as_mut().unwrap()[0].mount_path = "/tmp".to_string();
        assert!(desired.reconcile_onto(&live).is_some());
    }

    #[test]
    fn test_missing_label_is_drift() {
        let desired = deployment("img:1", 1);
        let mut live = desired.clone();
        live.metadata.labels = None;
        let updated = desired.reconcile_onto(&live).unwrap();
        assert_eq!(updated.metadata.labels.unwrap()["app"], "jobs");
    }

    #[test]
    fn test_service_ignores_cluster_ip() {
        let desired = Service {
            metadata: meta(&[]),
            spec: Some(ServiceSpec {
                selector: Some(BTreeMap::from([("app".to_string(), "jobs".to_string())])),
                ports: Some(vec![ServicePort {
                    name: Some("http".to_string()),
                    port: 8080,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut live = desired.clone();
        let live_spec = live.spec.as_mut().unwrap();
        live_spec.cluster_ip = Some("10.0.0.12".to_string());
        live_spec.ports.as_mut().unwrap()[0].node_port = Some(30080);
        assert!(desired.reconcile_onto(&live).is_none());

        live.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].port = 9090;
        let updated = desired.reconcile_onto(&live).unwrap();
        let spec = updated.spec.unwrap();
        assert_eq!(spec.ports.unwrap()[0].port, 8080);
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.12"));
    }

    #[test]
    fn test_route_host_drift() {
        let spec = |host: &str| RouteSpec {
            host: Some(host.to_string()),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: "jobs-service".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let desired = Route {
            metadata: meta(&[]),
            spec: spec("a.example.com"),
            status: None,
        };
        let mut live = desired.clone();
        assert!(desired.reconcile_onto(&live).is_none());

        live.spec = spec("b.example.com");
        let updated = desired.reconcile_onto(&live).unwrap();
        assert_eq!(updated.spec.host.as_deref(), Some("a.example.com"));
    }

    #[test]
    fn test_route_update_keeps_admin_fields() {
        let desired = Route {
            metadata: meta(&[]),
            spec: RouteSpec {
                host: Some("a.example.com".to_string()),
                to: RouteTargetReference {
                    kind: "Service".to_string(),
                    name: "jobs-service".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
            status: None,
        };
        let mut live = desired.clone();
        live.spec.tls = Some(RouteTls {
            termination: "edge".to_string(),
            insecure_edge_termination_policy: Some("Redirect".to_string()),
            ..Default::default()
        });
        live.spec.path = Some("/jobs".to_string());
        live.spec.wildcard_policy = Some("None".to_string());
        live.spec.to.weight = Some(100);
        assert!(desired.reconcile_onto(&live).is_none());

        live.spec.host = Some("b.example.com".to_string());
        let updated = desired.reconcile_onto(&live).unwrap();
        assert_eq!(updated.spec.host.as_deref(), Some("a.example.com"));
        assert_eq!(updated.spec.tls, live.spec.tls);
        assert_eq!(updated.spec.path.as_deref(), Some("/jobs"));
        assert_eq!(updated.spec.wildcard_policy.as_deref(), Some("None"));
        assert_eq!(updated.spec.to.weight, Some(100));
    }

    #[test]
    fn test_config_map_data_drift() {
        let desired = ConfigMap {
            metadata: meta(&[]),
            data: Some(BTreeMap::from([("a".to_string(), "1".to_string())])),
            ..Default::default()
        };
        let mut live = desired.clone();
        live.data = None;
        assert_eq!(desired.reconcile_onto(&live).unwrap().data, desired.data);
    }
}
