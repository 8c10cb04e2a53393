// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::executable_model::api_server_state::*;
use crate::shim_layer::cluster_client::{APIError, ClusterClient, DeletePropagation, PodFilter};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::api::ObjectMeta;
use std::sync::{Mutex, MutexGuard};

// The ExecutableApiServer is an in-memory stand-in for the Kubernetes API server covering the
// requests the controller sends. It follows the API server's admission rules for these requests:
// creation fails on an existing name, replacement fails with Conflict on a stale resource version,
// and every accepted write bumps the resource version.
// Garbage collection is not modelled: deleting a Deployment leaves its pods and dependents
// in place.
#[derive(Default)]
pub struct ExecutableApiServer {
    state: Mutex<ApiServerState>,
}

impl ExecutableApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ApiServerState>, APIError> {
        self.state.lock().map_err(|_| APIError::InternalError)
    }

    /// Runs `f` on the stored state, e.g. to seed or inspect objects.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut ApiServerState) -> T) -> Option<T> {
        self.state.lock().ok().map(|mut s| f(&mut s))
    }

    /// Makes the next request of kind `op` fail with `err`.
    pub fn fail_next(&self, op: Operation, err: APIError) {
        self.with_state(|s| s.failures.entry(op).or_default().push_back(err));
    }

    /// Runs `f` on the state right before the next request of kind `op` is served.
    pub fn interleave_before_next(
        &self,
        op: Operation,
        f: impl FnOnce(&mut ApiServerState) + Send + 'static,
    ) {
        self.with_state(|s| s.interleavings.entry(op).or_default().push_back(Box::new(f)));
    }

    /// Stores or replaces a pod as the kubelet would report it.
    pub fn put_pod(&self, pod: Pod) {
        self.with_state(|s| {
            let key = object_key(
                pod.metadata.namespace.as_deref().unwrap_or_default(),
                pod.metadata.name.as_deref().unwrap_or_default(),
            );
            let mut pod = pod;
            pod.metadata.resource_version = Some(s.next_resource_version());
            s.pods.insert(key, pod);
        });
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.with_state(|s| s.pods.remove(&object_key(namespace, name)))
            .flatten()
    }

    pub fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.with_state(|s| s.deployments.get(&object_key(namespace, name)).cloned())
            .flatten()
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.with_state(|s| s.config_maps.get(&object_key(namespace, name)).cloned())
            .flatten()
    }

    pub fn config_map_writes(&self) -> usize {
        self.with_state(|s| s.config_map_writes).unwrap_or_default()
    }

    pub fn requests(&self, op: Operation) -> usize {
        self.with_state(|s| s.requests.get(&op).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn deletions(&self) -> Vec<(ObjectKey, DeletePropagation)> {
        self.with_state(|s| s.deletions.clone()).unwrap_or_default()
    }
}

fn create_admission_check(namespace: &str, metadata: &ObjectMeta) -> Result<String, APIError> {
    let name = metadata.name.clone().ok_or(APIError::Invalid)?;
    if metadata.namespace.as_deref().map_or(false, |ns| ns != namespace) {
        return Err(APIError::BadRequest);
    }
    Ok(name)
}

fn created_metadata(s: &mut ApiServerState, namespace: &str, metadata: &ObjectMeta) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(namespace.to_string()),
        resource_version: Some(s.next_resource_version()),
        uid: Some(s.next_uid()),
        ..metadata.clone()
    }
}

#[async_trait]
impl ClusterClient for ExecutableApiServer {
    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, APIError> {
        let mut s = self.lock()?;
        s.begin(Operation::CreateDeployment)?;
        let name = create_admission_check(namespace, &deployment.metadata)?;
        let key = object_key(namespace, &name);
        if s.deployments.contains_key(&key) {
            return Err(APIError::ObjectAlreadyExists);
        }
        let created = Deployment {
            metadata: created_metadata(&mut s, namespace, &deployment.metadata),
            ..deployment.clone()
        };
        s.deployments.insert(key, created.clone());
        Ok(created)
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, APIError> {
        let mut s = self.lock()?;
        s.begin(Operation::GetDeployment)?;
        s.deployments
            .get(&object_key(namespace, name))
            .cloned()
            .ok_or(APIError::ObjectNotFound)
    }

    async fn delete_deployment(
        &self,
        namespace: &str,
        name: &str,
        propagation: DeletePropagation,
    ) -> Result<(), APIError> {
        let mut s = self.lock()?;
        s.begin(Operation::DeleteDeployment)?;
        let key = object_key(namespace, name);
        match s.deployments.remove(&key) {
            Some(_) => {
                s.resource_version_counter += 1;
                s.deletions.push((key, propagation));
                Ok(())
            }
            None => Err(APIError::ObjectNotFound),
        }
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, APIError> {
        let mut s = self.lock()?;
        s.begin(Operation::CreateConfigMap)?;
        let name = create_admission_check(namespace, &config_map.metadata)?;
        let key = object_key(namespace, &name);
        if s.config_maps.contains_key(&key) {
            return Err(APIError::ObjectAlreadyExists);
        }
        let created = ConfigMap {
            metadata: created_metadata(&mut s, namespace, &config_map.metadata),
            ..config_map.clone()
        };
        s.config_maps.insert(key, created.clone());
        Ok(created)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, APIError> {
        let mut s = self.lock()?;
        s.begin(Operation::GetConfigMap)?;
        s.config_maps
            .get(&object_key(namespace, name))
            .cloned()
            .ok_or(APIError::ObjectNotFound)
    }

    async fn replace_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, APIError> {
        let mut s = self.lock()?;
        s.begin(Operation::ReplaceConfigMap)?;
        let name = config_map.metadata.name.clone().ok_or(APIError::BadRequest)?;
        if config_map
            .metadata
            .namespace
            .as_deref()
            .map_or(false, |ns| ns != namespace)
        {
            return Err(APIError::BadRequest);
        }
        let key = object_key(namespace, &name);
        let stored = s.config_maps.get(&key).ok_or(APIError::ObjectNotFound)?;
        if config_map.metadata.resource_version.is_some()
            && config_map.metadata.resource_version != stored.metadata.resource_version
        {
            return Err(APIError::Conflict);
        }
        let uid = stored.metadata.uid.clone();
        let updated = ConfigMap {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                resource_version: Some(s.next_resource_version()),
                uid,
                ..config_map.metadata.clone()
            },
            ..config_map.clone()
        };
        s.config_maps.insert(key, updated.clone());
        s.config_map_writes += 1;
        Ok(updated)
    }

    async fn list_pods(&self, namespace: &str, filter: &PodFilter) -> Result<Vec<Pod>, APIError> {
        let mut s = self.lock()?;
        s.begin(Operation::ListPods)?;
        Ok(s.pods
            .iter()
            .filter(|((ns, _), pod)| ns == namespace && filter.matches(pod))
            .map(|(_, pod)| pod.clone())
            .collect())
    }
}

