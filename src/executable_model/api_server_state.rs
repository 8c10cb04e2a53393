// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::shim_layer::cluster_client::{APIError, DeletePropagation};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use std::collections::{BTreeMap, VecDeque};

/// Objects are keyed by (namespace, name) within their kind.
pub type ObjectKey = (String, String);

pub fn object_key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operation {
    CreateDeployment,
    GetDeployment,
    DeleteDeployment,
    CreateConfigMap,
    GetConfigMap,
    ReplaceConfigMap,
    ListPods,
}

pub type Interleaving = Box<dyn FnOnce(&mut ApiServerState) + Send>;

/// Everything the executable API server stores, plus the test hooks that steer it.
#[derive(Default)]
pub struct ApiServerState {
    pub deployments: BTreeMap<ObjectKey, Deployment>,
    pub config_maps: BTreeMap<ObjectKey, ConfigMap>,
    pub pods: BTreeMap<ObjectKey, Pod>,
    pub resource_version_counter: i64,
    pub uid_counter: i64,
    /// Every successful deletion with the propagation it was requested with.
    pub deletions: Vec<(ObjectKey, DeletePropagation)>,
    /// Number of successful config map replacements.
    pub config_map_writes: usize,
    /// Number of requests received, per operation.
    pub requests: BTreeMap<Operation, usize>,
    pub(crate) failures: BTreeMap<Operation, VecDeque<APIError>>,
    pub(crate) interleavings: BTreeMap<Operation, VecDeque<Interleaving>>,
}

impl ApiServerState {
    pub fn next_resource_version(&mut self) -> String {
        self.resource_version_counter += 1;
        self.resource_version_counter.to_string()
    }

    pub fn next_uid(&mut self) -> String {
        self.uid_counter += 1;
        format!("uid-{}", self.uid_counter)
    }

    /// Overwrites one data entry of a stored config map the way another writer would,
    /// bumping its resource version.
    pub fn write_config_map_entry(&mut self, namespace: &str, name: &str, key: &str, value: &str) {
        let resource_version = self.next_resource_version();
        if let Some(cm) = self.config_maps.get_mut(&object_key(namespace, name)) {
            cm.data
                .get_or_insert_with(BTreeMap::new)
                .insert(key.to_string(), value.to_string());
            cm.metadata.resource_version = Some(resource_version);
        }
    }

    // Runs pending interleavings and pops an injected failure for `op`, in that order.
    pub(crate) fn begin(&mut self, op: Operation) -> Result<(), APIError> {
        *self.requests.entry(op).or_insert(0) += 1;
        if let Some(interleave) = self.interleavings.get_mut(&op).and_then(VecDeque::pop_front) {
            interleave(self);
        }
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
