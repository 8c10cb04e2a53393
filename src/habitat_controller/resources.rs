// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use std::collections::BTreeMap;

use crate::crds::*;
use crate::habitat_controller::common::*;

/// Builds the Deployment running the pods of `sg`. The caller has validated `sg`.
pub fn make_deployment(sg: &ServiceGroup) -> appsv1::Deployment {
    let name = sg.metadata.name.clone().unwrap_or_default();
    appsv1::Deployment {
        metadata: metav1::ObjectMeta {
            name: Some(name.clone()),
            namespace: sg.metadata.namespace.clone(),
            labels: Some(pod_labels(&name)),
            ..metav1::ObjectMeta::default()
        },
        spec: Some(appsv1::DeploymentSpec {
            replicas: Some(sg.spec.count),
            selector: metav1::LabelSelector {
                match_labels: Some(pod_labels(&name)),
                ..metav1::LabelSelector::default()
            },
            template: corev1::PodTemplateSpec {
                metadata: Some(metav1::ObjectMeta {
                    labels: Some(pod_labels(&name)),
                    ..metav1::ObjectMeta::default()
                }),
                spec: Some(make_habitat_pod_spec(sg, &name)),
            },
            ..appsv1::DeploymentSpec::default()
        }),
        ..appsv1::Deployment::default()
    }
}

fn make_habitat_pod_spec(sg: &ServiceGroup, name: &str) -> corev1::PodSpec {
    let mut args = vec!["--group".to_string(), effective_group(sg).to_string()];
    for bind in sg.spec.habitat.bind.iter().flatten() {
        args.push("--bind".to_string());
        args.push(bind_arg(bind));
    }

    let mut volume_mounts = vec![corev1::VolumeMount {
        name: PEER_FILE_VOLUME.to_string(),
        mount_path: PEER_FILE_MOUNT_PATH.to_string(),
        read_only: Some(true),
        ..corev1::VolumeMount::default()
    }];
    let mut volumes = vec![corev1::Volume {
        name: PEER_FILE_VOLUME.to_string(),
        config_map: Some(corev1::ConfigMapVolumeSource {
            name: Some(peer_config_map_name(name)),
            items: Some(vec![corev1::KeyToPath {
                key: PEER_FILE_KEY.to_string(),
                path: PEER_FILE_PATH.to_string(),
                ..corev1::KeyToPath::default()
            }]),
            ..corev1::ConfigMapVolumeSource::default()
        }),
        ..corev1::Volume::default()
    }];

    if let Some(secret_name) = &sg.spec.habitat.config_secret_name {
        volume_mounts.push(corev1::VolumeMount {
            name: INITIAL_CONFIG_VOLUME.to_string(),
            mount_path: INITIAL_CONFIG_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..corev1::VolumeMount::default()
        });
        volumes.push(corev1::Volume {
            name: INITIAL_CONFIG_VOLUME.to_string(),
            secret: Some(corev1::SecretVolumeSource {
                secret_name: Some(secret_name.clone()),
                ..corev1::SecretVolumeSource::default()
            }),
            ..corev1::Volume::default()
        });
    }

    corev1::PodSpec {
        containers: vec![corev1::Container {
            name: CONTAINER_NAME.to_string(),
            image: Some(sg.spec.image.clone()),
            args: Some(args),
            volume_mounts: Some(volume_mounts),
            ..corev1::Container::default()
        }],
        volumes: Some(volumes),
        ..corev1::PodSpec::default()
    }
}

/// Builds the peer file config map of a service group, owned by its Deployment so that it is
/// garbage collected together with the Deployment.
pub fn make_peer_config_map(
    service_group_name: &str,
    namespace: &str,
    deployment_uid: &str,
    leader_address: &str,
) -> corev1::ConfigMap {
    corev1::ConfigMap {
        metadata: metav1::ObjectMeta {
            name: Some(peer_config_map_name(service_group_name)),
            namespace: Some(namespace.to_string()),
            labels: Some(pod_labels(service_group_name)),
            owner_references: Some(vec![metav1::OwnerReference {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
                name: service_group_name.to_string(),
                uid: deployment_uid.to_string(),
                ..metav1::OwnerReference::default()
            }]),
            ..metav1::ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(
            PEER_FILE_KEY.to_string(),
            leader_address.to_string(),
        )])),
        ..corev1::ConfigMap::default()
    }
}

/// The leader address recorded in a peer file config map; empty when there is no leader.
pub fn recorded_leader(config_map: &corev1::ConfigMap) -> &str {
    config_map
        .data
        .as_ref()
        .and_then(|data| data.get(PEER_FILE_KEY))
        .map_or("", String::as_str)
}
