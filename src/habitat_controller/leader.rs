// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::habitat_controller::common::*;
use crate::habitat_controller::error::Error;
use crate::habitat_controller::resources::*;
use crate::shim_layer::cluster_client::{APIError, ClusterClient, PodFilter};
use crate::shim_layer::controller_runtime::Data;
use crate::shim_layer::watch::WatchEvent;
use k8s_openapi::api::core::v1::Pod;
use std::cmp::Ordering;
use std::net::IpAddr;
use tracing::*;

// The leader of a service group is the address published in its peer file config map.
// New pods read it to join the ring. All leadership state lives in that config map;
// nothing is remembered in-process between events.
//
// Transitions:
//   NoLeader  --pod running-->                            Leader(pod)
//   Leader(a) --pod running, a still running-->           Leader(a)
//   Leader(a) --pod running, a gone-->                    Leader(pod)
//   Leader(a) --a deleted, running pods remain-->         Leader(lowest remaining address)
//   Leader(a) --a deleted, nothing running-->             NoLeader
//                                                         (Leader(a) if clearing is disabled)

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderState {
    NoLeader,
    Leader(String),
}

impl LeaderState {
    pub fn from_address(address: &str) -> Self {
        if address.is_empty() {
            LeaderState::NoLeader
        } else {
            LeaderState::Leader(address.to_string())
        }
    }

    /// The address to write into the peer file; empty when there is no leader.
    pub fn address(&self) -> &str {
        match self {
            LeaderState::NoLeader => "",
            LeaderState::Leader(address) => address,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger<'a> {
    Running(&'a str),
    Deleted(&'a str),
}

/// Handles one lifecycle event of a managed pod.
pub async fn reconcile_pod<C: ClusterClient>(
    data: &Data<C>,
    event: WatchEvent<Pod>,
) -> Result<(), Error> {
    match event {
        // Leadership is only decided once a pod runs or when it goes away.
        WatchEvent::Added(_) => Ok(()),
        WatchEvent::Updated(_, pod) => {
            if !is_managed(&pod) || !is_running(&pod) {
                return Ok(());
            }
            on_pod_running(data, &pod).await.map(|_| ())
        }
        WatchEvent::Deleted(pod) => {
            if !is_managed(&pod) {
                return Ok(());
            }
            on_pod_deleted(data, &pod).await.map(|_| ())
        }
    }
}

/// Publishes the address of a running pod unless a live leader is already published.
/// Returns the leadership after the event.
pub async fn on_pod_running<C: ClusterClient>(
    data: &Data<C>,
    pod: &Pod,
) -> Result<LeaderState, Error> {
    let (namespace, group) = group_of(pod)?;
    match pod_address(pod) {
        Some(address) => publish_leader(data, namespace, group, Trigger::Running(address)).await,
        None => {
            debug!("Pod {} is running without an address yet", pod_name(pod));
            current_leader(data, namespace, group).await
        }
    }
}

/// Hands leadership over to another running pod if the deleted pod was the leader.
/// Returns the leadership after the event.
pub async fn on_pod_deleted<C: ClusterClient>(
    data: &Data<C>,
    pod: &Pod,
) -> Result<LeaderState, Error> {
    let (namespace, group) = group_of(pod)?;
    match pod_address(pod) {
        Some(address) => publish_leader(data, namespace, group, Trigger::Deleted(address)).await,
        // A pod that never got an address was never published.
        None => current_leader(data, namespace, group).await,
    }
}

fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

fn group_of(pod: &Pod) -> Result<(&str, &str), Error> {
    let namespace = pod
        .metadata
        .namespace
        .as_deref()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let group = service_group_of(pod)
        .ok_or_else(|| Error::MissingLabel(pod_name(pod).to_string(), SERVICE_GROUP_LABEL))?;
    Ok((namespace, group))
}

async fn current_leader<C: ClusterClient>(
    data: &Data<C>,
    namespace: &str,
    group: &str,
) -> Result<LeaderState, Error> {
    let cm_name = peer_config_map_name(group);
    let cm = data
        .client
        .get_config_map(namespace, &cm_name)
        .await
        .map_err(|e| Error::GetPeerConfigMapFailed(cm_name, e))?;
    Ok(LeaderState::from_address(recorded_leader(&cm)))
}

// Read the peer file, decide, and write it back guarded by the resource version that was read.
// A concurrent writer makes the write fail with Conflict, in which case the decision is redone
// on fresh state.
async fn publish_leader<C: ClusterClient>(
    data: &Data<C>,
    namespace: &str,
    group: &str,
    trigger: Trigger<'_>,
) -> Result<LeaderState, Error> {
    let cm_name = peer_config_map_name(group);
    let mut attempt = 0;
    loop {
        let cm = data
            .client
            .get_config_map(namespace, &cm_name)
            .await
            .map_err(|e| Error::GetPeerConfigMapFailed(cm_name.clone(), e))?;
        let current = LeaderState::from_address(recorded_leader(&cm));

        let next = match trigger {
            Trigger::Running(address) => {
                elect_on_running(&data.client, namespace, group, &current, address).await?
            }
            Trigger::Deleted(address) => {
                elect_on_deleted(
                    &data.client,
                    namespace,
                    group,
                    &current,
                    address,
                    data.config.clear_leader_when_empty,
                )
                .await?
            }
        };
        let next = match next {
            Some(next) => next,
            None => {
                debug!("Leader of service group {}/{} unchanged: {:?}", namespace, group, current);
                return Ok(current);
            }
        };

        // The owner reference needs the uid of the current Deployment.
        let deployment = data
            .client
            .get_deployment(namespace, group)
            .await
            .map_err(|e| Error::GetDeploymentFailed(group.to_string(), e))?;
        let deployment_uid = deployment
            .metadata
            .uid
            .as_deref()
            .ok_or_else(|| Error::MissingOwnerUid(group.to_string()))?;

        let mut updated_cm = make_peer_config_map(group, namespace, deployment_uid, next.address());
        updated_cm.metadata.resource_version = cm.metadata.resource_version.clone();
        match data.client.replace_config_map(namespace, &updated_cm).await {
            Ok(_) => {
                info!(
                    "Update configmap: {} leader {:?} -> {:?}",
                    cm_name,
                    current.address(),
                    next.address()
                );
                return Ok(next);
            }
            Err(APIError::Conflict) if attempt < data.config.conflict_retries => {
                let delay = data.config.backoff(attempt);
                warn!("Configmap {} changed concurrently, re-electing after {:?}", cm_name, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(Error::UpdatePeerConfigMapFailed(cm_name, e)),
        }
    }
}

// Decides the leader after `address` started running. None keeps the peer file as it is.
async fn elect_on_running<C: ClusterClient>(
    client: &C,
    namespace: &str,
    group: &str,
    current: &LeaderState,
    address: &str,
) -> Result<Option<LeaderState>, Error> {
    match current {
        LeaderState::Leader(leader) if leader == address => Ok(None),
        LeaderState::Leader(leader) => {
            // Is the leader still running? If so, it stays.
            let filter = PodFilter::with_labels(pod_labels(group))
                .phase(POD_RUNNING)
                .pod_ip(leader);
            let running = client
                .list_pods(namespace, &filter)
                .await
                .map_err(|e| Error::ListPodsFailed(group.to_string(), e))?;
            if running.is_empty() {
                Ok(Some(LeaderState::Leader(address.to_string())))
            } else {
                Ok(None)
            }
        }
        LeaderState::NoLeader => Ok(Some(LeaderState::Leader(address.to_string()))),
    }
}

// Decides the leader after the pod at `address` was deleted. None keeps the peer file as it is.
async fn elect_on_deleted<C: ClusterClient>(
    client: &C,
    namespace: &str,
    group: &str,
    current: &LeaderState,
    address: &str,
    clear_leader_when_empty: bool,
) -> Result<Option<LeaderState>, Error> {
    match current {
        LeaderState::Leader(leader) if leader == address => {
            let filter = PodFilter::with_labels(pod_labels(group)).phase(POD_RUNNING);
            let running = client
                .list_pods(namespace, &filter)
                .await
                .map_err(|e| Error::ListPodsFailed(group.to_string(), e))?;
            let candidates = running
                .iter()
                .filter_map(pod_address)
                .filter(|candidate| *candidate != address);
            match select_leader(candidates) {
                Some(next) => Ok(Some(LeaderState::Leader(next.to_string()))),
                None if clear_leader_when_empty => Ok(Some(LeaderState::NoLeader)),
                None => Ok(None),
            }
        }
        // A follower went away.
        _ => Ok(None),
    }
}

/// Picks the next leader among candidate addresses: the lowest one in `compare_addresses` order.
pub fn select_leader<'a>(candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    candidates.into_iter().min_by(|a, b| compare_addresses(a, b))
}

/// Total order on addresses: IP addresses compare numerically (IPv4 before IPv6) and come
/// before anything that does not parse as an IP, which compares lexically.
pub fn compare_addresses(a: &str, b: &str) -> Ordering {
    match (a.parse::<IpAddr>(), b.parse::<IpAddr>()) {
        (Ok(ip_a), Ok(ip_b)) => ip_a.cmp(&ip_b).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
