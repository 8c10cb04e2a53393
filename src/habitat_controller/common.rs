// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::*;
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;

/// Marker label carried by every pod this controller manages.
pub const HABITAT_LABEL: &str = "habitat";
/// Label holding the name of the ServiceGroup a pod belongs to.
pub const SERVICE_GROUP_LABEL: &str = "service-group";

/// Peer group used when a ServiceGroup does not name one.
pub const DEFAULT_GROUP: &str = "default";

pub const CONTAINER_NAME: &str = "habitat-service";
/// Key of the peer file config map that holds the leader address.
pub const PEER_FILE_KEY: &str = "peer-watch-file";
/// File name of the leader address inside `PEER_FILE_MOUNT_PATH`.
pub const PEER_FILE_PATH: &str = "peer-ip";
pub const PEER_FILE_VOLUME: &str = "config";
pub const PEER_FILE_MOUNT_PATH: &str = "/habitat-operator";
pub const INITIAL_CONFIG_VOLUME: &str = "initial-config";
pub const INITIAL_CONFIG_MOUNT_PATH: &str = "/habitat-operator-config";

pub const POD_RUNNING: &str = "Running";

pub fn peer_config_map_name(service_group_name: &str) -> String {
    format!("{}-peer-file", service_group_name)
}

pub fn deployment_name(sg: &ServiceGroup) -> Option<String> {
    sg.metadata.name.clone()
}

/// The peer group the pods join: the explicit group, or `DEFAULT_GROUP` when unset or empty.
pub fn effective_group(sg: &ServiceGroup) -> &str {
    match sg.spec.habitat.group.as_deref() {
        Some(group) if !group.is_empty() => group,
        _ => DEFAULT_GROUP,
    }
}

pub fn bind_arg(bind: &Bind) -> String {
    format!("{}:{}.{}", bind.name, bind.service, bind.group)
}

/// Label selector shared by all managed pods; the pod watch is restricted to it.
pub fn managed_pod_selector() -> String {
    format!("{}=true", HABITAT_LABEL)
}

pub fn pod_labels(service_group_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (HABITAT_LABEL.to_string(), "true".to_string()),
        (SERVICE_GROUP_LABEL.to_string(), service_group_name.to_string()),
    ])
}

pub fn is_managed(pod: &Pod) -> bool {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(HABITAT_LABEL))
        .map_or(false, |value| value == "true")
}

pub fn service_group_of(pod: &Pod) -> Option<&str> {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(SERVICE_GROUP_LABEL))
        .map(String::as_str)
}

pub fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|status| status.phase.as_deref())
}

/// The pod's IP, if one has been assigned.
pub fn pod_address(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()
        .and_then(|status| status.pod_ip.as_deref())
        .filter(|ip| !ip.is_empty())
}

pub fn is_running(pod: &Pod) -> bool {
    pod_phase(pod) == Some(POD_RUNNING)
}
