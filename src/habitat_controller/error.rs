// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::habitat_controller::validator::ValidationError;
use crate::shim_layer::cluster_client::APIError;
use crate::shim_layer::controller_runtime::RetryableError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("ServiceGroup {0} failed validation: {1}")]
    ValidationFailed(String, #[source] ValidationError),
    #[error("Failed to create Deployment {0}: {1}")]
    CreateDeploymentFailed(String, #[source] APIError),
    #[error("Failed to get Deployment {0}: {1}")]
    GetDeploymentFailed(String, #[source] APIError),
    #[error("Failed to delete Deployment {0}: {1}")]
    DeleteDeploymentFailed(String, #[source] APIError),
    #[error("Failed to create ConfigMap {0}: {1}")]
    CreatePeerConfigMapFailed(String, #[source] APIError),
    #[error("Failed to get ConfigMap {0}: {1}")]
    GetPeerConfigMapFailed(String, #[source] APIError),
    #[error("Failed to update ConfigMap {0}: {1}")]
    UpdatePeerConfigMapFailed(String, #[source] APIError),
    #[error("Failed to list running pods of service group {0}: {1}")]
    ListPodsFailed(String, #[source] APIError),
    #[error("Deployment {0} has no uid")]
    MissingOwnerUid(String),
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
    #[error("Pod {0} misses label {1}")]
    MissingLabel(String, &'static str),
}

impl Error {
    fn api_error(&self) -> Option<APIError> {
        match self {
            Error::CreateDeploymentFailed(_, e)
            | Error::GetDeploymentFailed(_, e)
            | Error::DeleteDeploymentFailed(_, e)
            | Error::CreatePeerConfigMapFailed(_, e)
            | Error::GetPeerConfigMapFailed(_, e)
            | Error::UpdatePeerConfigMapFailed(_, e)
            | Error::ListPodsFailed(_, e) => Some(*e),
            _ => None,
        }
    }
}

impl RetryableError for Error {
    fn is_retryable(&self) -> bool {
        self.api_error().map_or(false, |e| e.is_transient())
    }
}
