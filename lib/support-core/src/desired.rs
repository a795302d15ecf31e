//! Desired state computation
//!
//! Maps a SupportingService to the child resources that should exist for it.
//! Names depend only on the instance name, so every pass targets the same
//! objects.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec,
    Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use support_api::openshift::{RoutePort, RouteSpec, RouteTargetReference};
use support_api::v1alpha1::{ServiceKind, ServicePortSpec, SupportingService};
use support_api::Route;
use thiserror::Error;

use crate::config::BuilderConfig;
use crate::kind::KindContract;
use crate::validation::{validate_dns1123_label, validate_env_name, FieldViolation, ViolationList};

pub const MANAGED_BY: &str = "support-operator";
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const CONFIG_FILE: &str = "application.properties";
const CONFIG_VOLUME: &str = "config";
const CONFIG_MOUNT_PATH: &str = "/deployments/config";
const DEFAULT_REPLICAS: i32 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("{kind} {name} must be exposed through a route but has no ports")]
    NoPorts { kind: ServiceKind, name: String },

    #[error("{name} must be exposed through a route but no host was resolved")]
    MissingHost { name: String },

    #[error("{0} has no namespace")]
    MissingNamespace(String),
}

/// One child resource the instance should own
#[derive(Clone, Debug, PartialEq)]
pub enum DesiredResource {
    ConfigMap(ConfigMap),
    Deployment(Deployment),
    Service(Service),
    Route(Route),
}

impl DesiredResource {
    pub fn kind(&self) -> &'static str {
        match self {
            DesiredResource::ConfigMap(_) => "ConfigMap",
            DesiredResource::Deployment(_) => "Deployment",
            DesiredResource::Service(_) => "Service",
            DesiredResource::Route(_) => "Route",
        }
    }

    pub fn name(&self) -> String {
        match self {
            DesiredResource::ConfigMap(r) => r.name_any(),
            DesiredResource::Deployment(r) => r.name_any(),
            DesiredResource::Service(r) => r.name_any(),
            DesiredResource::Route(r) => r.name_any(),
        }
    }
}

/// Target shape of one instance, in apply order
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredResourceSet {
    pub resources: Vec<DesiredResource>,
    /// Image the deployment runs
    pub image: String,
    /// Host of the route, when one is desired
    pub route_host: Option<String>,
    /// Spec fields that were ignored or replaced by defaults
    pub violations: ViolationList,
}

impl DesiredResourceSet {
    pub fn route(&self) -> Option<&Route> {
        self.resources.iter().find_map(|r| match r {
            DesiredResource::Route(route) => Some(route),
            _ => None,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &DesiredResource> {
        self.resources.iter()
    }
}

/// Whether the instance gets a Route
pub fn route_required(instance: &SupportingService) -> bool {
    instance
        .spec
        .expose_route
        .unwrap_or_else(|| KindContract::of(instance.spec.service_type).exposed)
}

/// Image for the instance: the spec override or the kind's default image
pub fn resolve_image(instance: &SupportingService, config: &BuilderConfig) -> String {
    match instance.spec.image.as_deref() {
        Some(image) if !image.is_empty() => image.to_string(),
        _ => format!(
            "{}/{}:{}",
            config.image_registry,
            KindContract::of(instance.spec.service_type).image_name,
            config.image_tag
        ),
    }
}

pub fn config_map_name(instance: &SupportingService) -> String {
    format!("{}-config", instance.name_any())
}

/// Labels selecting the instance's pods; must never change for a live instance
pub fn selector_labels(instance: &SupportingService) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), instance.name_any()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
    ])
}

/// Labels applied to every child resource
pub fn standard_labels(instance: &SupportingService) -> BTreeMap<String, String> {
    let mut labels = instance.spec.labels.clone();
    labels.extend(selector_labels(instance));
    labels.insert(
        LABEL_COMPONENT.to_string(),
        instance.spec.service_type.component_name().to_string(),
    );
    labels
}

fn child_meta(instance: &SupportingService, name: String, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.to_string()),
        labels: Some(standard_labels(instance)),
        owner_references: instance.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..Default::default()
    }
}

/// Spec values after validation, with invalid entries replaced or dropped
struct EffectiveSpec {
    replicas: i32,
    env: BTreeMap<String, String>,
    ports: Vec<ServicePortSpec>,
    violations: ViolationList,
}

fn effective_spec(
    instance: &SupportingService,
    infra_env: &BTreeMap<String, String>,
) -> EffectiveSpec {
    let contract = KindContract::of(instance.spec.service_type);
    let mut violations = ViolationList::new();

    let replicas = match instance.spec.replicas {
        Some(replicas) if replicas < 0 => {
            violations.push(FieldViolation::new(
                "spec.replicas",
                replicas.to_string(),
                format!("must be greater than or equal to 0, using {}", DEFAULT_REPLICAS),
            ));
            DEFAULT_REPLICAS
        }
        Some(replicas) => replicas,
        None => DEFAULT_REPLICAS,
    };

    let mut env: BTreeMap<String, String> = contract
        .base_env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    env.extend(infra_env.iter().map(|(k, v)| (k.clone(), v.clone())));
    for (name, value) in &instance.spec.env {
        let name_violations = validate_env_name(name, &format!("spec.env[{}]", name));
        if name_violations.is_empty() {
            env.insert(name.clone(), value.clone());
        } else {
            violations.extend(name_violations);
        }
    }

    let requested = instance
        .spec
        .ports
        .clone()
        .unwrap_or_else(|| contract.port_contract());
    let mut ports = Vec::with_capacity(requested.len());
    for (i, port) in requested.into_iter().enumerate() {
        let mut port_violations =
            validate_dns1123_label(&port.name, &format!("spec.ports[{}].name", i));
        if !(1..=65535).contains(&port.port) {
            port_violations.push(FieldViolation::new(
                format!("spec.ports[{}].port", i),
                port.port.to_string(),
                "must be between 1 and 65535",
            ));
        }
        if port_violations.is_empty() {
            ports.push(port);
        } else {
            violations.extend(port_violations);
        }
    }

    EffectiveSpec {
        replicas,
        env,
        ports,
        violations,
    }
}

/// Compute the child resources of an instance.
///
/// `route_host` must be set when the instance requires a route. `infra_env`
/// is the environment published by the instance's ready infrastructure.
pub fn build_desired_state(
    instance: &SupportingService,
    route_host: Option<&str>,
    infra_env: &BTreeMap<String, String>,
    config: &BuilderConfig,
) -> Result<DesiredResourceSet, BuildError> {
    let name = instance.name_any();
    let namespace = instance
        .namespace()
        .ok_or_else(|| BuildError::MissingNamespace(name.clone()))?;
    let spec = effective_spec(instance, infra_env);
    let expose = route_required(instance);

    let route_host = if expose {
        match route_host {
            Some(host) if !host.is_empty() => Some(host.to_string()),
            _ => return Err(BuildError::MissingHost { name }),
        }
    } else {
        None
    };
    if expose && spec.ports.is_empty() {
        return Err(BuildError::NoPorts {
            kind: instance.spec.service_type,
            name,
        });
    }

    let image = resolve_image(instance, config);
    let mut resources = vec![
        DesiredResource::ConfigMap(build_config_map(instance, &namespace)),
        DesiredResource::Deployment(build_deployment(instance, &namespace, &image, &spec)),
    ];
    if !spec.ports.is_empty() {
        resources.push(DesiredResource::Service(build_service(instance, &namespace, &spec.ports)));
    }
    if let Some(host) = &route_host {
        let route = build_route(instance, &namespace, host, &spec.ports[0]);
        resources.push(DesiredResource::Route(route));
    }

    Ok(DesiredResourceSet {
        resources,
        image,
        route_host,
        violations: spec.violations,
    })
}

fn build_config_map(instance: &SupportingService, namespace: &str) -> ConfigMap {
    let properties: String = instance
        .spec
        .properties
        .iter()
        .map(|(k, v)| format!("{}={}\n", k, v))
        .collect();

    ConfigMap {
        metadata: child_meta(instance, config_map_name(instance), namespace),
        data: Some(BTreeMap::from([(CONFIG_FILE.to_string(), properties)])),
        ..Default::default()
    }
}

fn build_deployment(
    instance: &SupportingService,
    namespace: &str,
    image: &str,
    spec: &EffectiveSpec,
) -> Deployment {
    let env = spec
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect();
    let ports = spec
        .ports
        .iter()
        .map(|p| ContainerPort {
            name: Some(p.name.clone()),
            container_port: p.port,
            protocol: Some(p.protocol.clone()),
            ..Default::default()
        })
        .collect();

    Deployment {
        metadata: child_meta(instance, instance.name_any(), namespace),
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(instance)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(standard_labels(instance)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: instance.spec.service_type.component_name().to_string(),
                        image: Some(image.to_string()),
                        ports: Some(ports),
                        env: Some(env),
                        volume_mounts: Some(vec![VolumeMount {
                            name: CONFIG_VOLUME.to_string(),
                            mount_path: CONFIG_MOUNT_PATH.to_string(),
                            read_only: Some(true),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: CONFIG_VOLUME.to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: config_map_name(instance),
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

fn build_service(
    instance: &SupportingService,
    namespace: &str,
    ports: &[ServicePortSpec],
) -> Service {
    Service {
        metadata: child_meta(instance, instance.name_any(), namespace),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(instance)),
            ports: Some(
                ports
                    .iter()
                    .map(|p| ServicePort {
                        name: Some(p.name.clone()),
                        port: p.port,
                        target_port: Some(IntOrString::String(p.name.clone())),
                        protocol: Some(p.protocol.clone()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_route(
    instance: &SupportingService,
    namespace: &str,
    host: &str,
    primary: &ServicePortSpec,
) -> Route {
    Route {
        metadata: child_meta(instance, instance.name_any(), namespace),
        spec: RouteSpec {
            host: Some(host.to_string()),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: instance.name_any(),
                ..Default::default()
            },
            port: Some(RoutePort {
                target_port: primary.name.clone(),
            }),
            ..Default::default()
        },
        status: None,
    }
}
