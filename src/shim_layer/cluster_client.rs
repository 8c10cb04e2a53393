// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    Client,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::*;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum APIError {
    #[error("object not found")]
    ObjectNotFound,
    #[error("object already exists")]
    ObjectAlreadyExists,
    #[error("bad request")]
    BadRequest,
    #[error("conflict")]
    Conflict,
    #[error("invalid object")]
    Invalid,
    #[error("internal error")]
    InternalError,
    #[error("timeout")]
    Timeout,
    #[error("server timeout")]
    ServerTimeout,
    #[error("other error")]
    Other,
}

impl APIError {
    /// Whether the same request may succeed if it is sent again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            APIError::Conflict
                | APIError::InternalError
                | APIError::Timeout
                | APIError::ServerTimeout
                | APIError::Other
        )
    }
}

pub fn kube_error_to_api_error(error: &kube::Error) -> APIError {
    match error {
        kube::Error::Api(error_resp) => match error_resp.reason.as_str() {
            "NotFound" => APIError::ObjectNotFound,
            "AlreadyExists" => APIError::ObjectAlreadyExists,
            "BadRequest" => APIError::BadRequest,
            "Conflict" => APIError::Conflict,
            "Invalid" => APIError::Invalid,
            "InternalError" => APIError::InternalError,
            "Timeout" => APIError::Timeout,
            "ServerTimeout" => APIError::ServerTimeout,
            _ => APIError::Other,
        },
        _ => APIError::Other,
    }
}

/// How dependents of a deleted object are cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePropagation {
    /// Dependents are removed by the garbage collector after the owner is gone.
    Background,
}

/// Selects pods by labels and, optionally, by phase and pod IP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodFilter {
    pub labels: BTreeMap<String, String>,
    pub phase: Option<String>,
    pub pod_ip: Option<String>,
}

impl PodFilter {
    pub fn with_labels(labels: BTreeMap<String, String>) -> Self {
        PodFilter {
            labels,
            ..PodFilter::default()
        }
    }

    pub fn phase(mut self, phase: &str) -> Self {
        self.phase = Some(phase.to_string());
        self
    }

    pub fn pod_ip(mut self, pod_ip: &str) -> Self {
        self.pod_ip = Some(pod_ip.to_string());
        self
    }

    pub fn label_selector(&self) -> String {
        self.labels
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn field_selector(&self) -> String {
        let mut fields = Vec::new();
        if let Some(phase) = &self.phase {
            fields.push(format!("status.phase={}", phase));
        }
        if let Some(pod_ip) = &self.pod_ip {
            fields.push(format!("status.podIP={}", pod_ip));
        }
        fields.join(",")
    }

    pub fn matches(&self, pod: &Pod) -> bool {
        let labels = pod.metadata.labels.as_ref();
        let labels_match = self.labels.iter().all(|(key, value)| {
            labels.and_then(|labels| labels.get(key)) == Some(value)
        });
        let status = pod.status.as_ref();
        let phase_match = self.phase.as_ref().map_or(true, |phase| {
            status.and_then(|s| s.phase.as_ref()) == Some(phase)
        });
        let ip_match = self.pod_ip.as_ref().map_or(true, |pod_ip| {
            status.and_then(|s| s.pod_ip.as_ref()) == Some(pod_ip)
        });
        labels_match && phase_match && ip_match
    }
}

/// The subset of the Kubernetes API the controller reads and writes through.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, APIError>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, APIError>;

    async fn delete_deployment(
        &self,
        namespace: &str,
        name: &str,
        propagation: DeletePropagation,
    ) -> Result<(), APIError>;

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, APIError>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, APIError>;

    /// Replaces the config map. If `metadata.resourceVersion` is set, the write is rejected
    /// with `Conflict` unless it matches the stored version.
    async fn replace_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, APIError>;

    async fn list_pods(&self, namespace: &str, filter: &PodFilter) -> Result<Vec<Pod>, APIError>;
}

/// ClusterClient backed by a live API server.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        KubeClusterClient { client }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn report_api_error(
    verb: &str,
    kind: &str,
    namespace: &str,
    name: &str,
    err: kube::Error,
) -> APIError {
    debug!("{} {} {}/{} failed with error: {}", verb, kind, namespace, name, err);
    kube_error_to_api_error(&err)
}

fn object_name(meta: &kube::api::ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or_default()
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> Result<Deployment, APIError> {
        self.deployments(namespace)
            .create(&PostParams::default(), deployment)
            .await
            .map_err(|e| {
                let name = object_name(&deployment.metadata);
                report_api_error("Create", "Deployment", namespace, name, e)
            })
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, APIError> {
        self.deployments(namespace)
            .get(name)
            .await
            .map_err(|e| report_api_error("Get", "Deployment", namespace, name, e))
    }

    async fn delete_deployment(
        &self,
        namespace: &str,
        name: &str,
        propagation: DeletePropagation,
    ) -> Result<(), APIError> {
        let dp = match propagation {
            DeletePropagation::Background => DeleteParams::background(),
        };
        self.deployments(namespace)
            .delete(name, &dp)
            .await
            .map(|_| ())
            .map_err(|e| report_api_error("Delete", "Deployment", namespace, name, e))
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, APIError> {
        self.config_maps(namespace)
            .create(&PostParams::default(), config_map)
            .await
            .map_err(|e| {
                let name = object_name(&config_map.metadata);
                report_api_error("Create", "ConfigMap", namespace, name, e)
            })
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, APIError> {
        self.config_maps(namespace)
            .get(name)
            .await
            .map_err(|e| report_api_error("Get", "ConfigMap", namespace, name, e))
    }

    async fn replace_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, APIError> {
        let name = object_name(&config_map.metadata);
        self.config_maps(namespace)
            .replace(name, &PostParams::default(), config_map)
            .await
            .map_err(|e| report_api_error("Replace", "ConfigMap", namespace, name, e))
    }

    async fn list_pods(&self, namespace: &str, filter: &PodFilter) -> Result<Vec<Pod>, APIError> {
        let mut lp = ListParams::default();
        let labels = filter.label_selector();
        if !labels.is_empty() {
            lp = lp.labels(&labels);
        }
        let fields = filter.field_selector();
        if !fields.is_empty() {
            lp = lp.fields(&fields);
        }
        Api::<Pod>::namespaced(self.client.clone(), namespace)
            .list(&lp)
            .await
            .map(|list| list.items)
            .map_err(|e| report_api_error("List", "Pod", namespace, &labels, e))
    }
}
