// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::*;
use crate::habitat_controller::common::*;
use crate::habitat_controller::error::Error;
use crate::habitat_controller::resources::*;
use crate::habitat_controller::validator::validate_service_group;
use crate::shim_layer::cluster_client::{APIError, ClusterClient, DeletePropagation};
use crate::shim_layer::controller_runtime::Data;
use crate::shim_layer::watch::WatchEvent;
use k8s_openapi::api::apps::v1::Deployment;
use tracing::*;

/// Handles one lifecycle event of a ServiceGroup.
pub async fn reconcile_service_group<C: ClusterClient>(
    data: &Data<C>,
    event: WatchEvent<ServiceGroup>,
) -> Result<(), Error> {
    match event {
        WatchEvent::Added(sg) => create_service_group(&data.client, &sg).await,
        WatchEvent::Updated(old_sg, new_sg) => {
            // Spec changes of an existing group are reported, not applied.
            let key = format!(
                "{}/{}",
                new_sg.metadata.namespace.as_deref().unwrap_or_default(),
                new_sg.metadata.name.as_deref().unwrap_or_default()
            );
            if old_sg.spec != new_sg.spec {
                info!("ServiceGroup {} changed; updates are not reconciled", key);
            } else {
                debug!("ServiceGroup {} resynced", key);
            }
            Ok(())
        }
        WatchEvent::Deleted(sg) => delete_service_group(&data.client, &sg).await,
    }
}

/// Creates the Deployment of a new ServiceGroup, then its peer file config map with an empty
/// leader address. Objects that already exist are reused, so redelivering the same group
/// completes a creation that previously failed halfway.
pub async fn create_service_group<C: ClusterClient>(
    client: &C,
    sg: &ServiceGroup,
) -> Result<(), Error> {
    let sg_name = sg
        .metadata
        .name
        .as_ref()
        .ok_or(Error::MissingObjectKey(".metadata.name"))?;
    let sg_ns = sg
        .metadata
        .namespace
        .as_ref()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;

    validate_service_group(sg).map_err(|e| Error::ValidationFailed(sg_name.clone(), e))?;
    debug!("Validated ServiceGroup {}/{}", sg_ns, sg_name);

    let deployment = reconcile_deployment(client, sg_ns, sg).await?;
    let deployment_uid = deployment
        .metadata
        .uid
        .as_ref()
        .ok_or_else(|| Error::MissingOwnerUid(sg_name.clone()))?;

    let cm = make_peer_config_map(sg_name, sg_ns, deployment_uid, "");
    let cm_name = peer_config_map_name(sg_name);
    match client.create_config_map(sg_ns, &cm).await {
        Ok(_) => {
            info!("Create configmap: {} with empty peer address", cm_name);
            Ok(())
        }
        Err(APIError::ObjectAlreadyExists) => {
            // Keep whatever leader is already published.
            debug!("Configmap {} already exists", cm_name);
            Ok(())
        }
        Err(e) => Err(Error::CreatePeerConfigMapFailed(cm_name, e)),
    }
}

async fn reconcile_deployment<C: ClusterClient>(
    client: &C,
    sg_ns: &str,
    sg: &ServiceGroup,
) -> Result<Deployment, Error> {
    let deployment = make_deployment(sg);
    let deployment_name = deployment.metadata.name.clone().unwrap_or_default();
    match client.create_deployment(sg_ns, &deployment).await {
        Ok(created) => {
            info!("Create deployment: {}", deployment_name);
            Ok(created)
        }
        Err(APIError::ObjectAlreadyExists) => {
            debug!("Deployment {} already exists", deployment_name);
            client
                .get_deployment(sg_ns, &deployment_name)
                .await
                .map_err(|e| Error::GetDeploymentFailed(deployment_name, e))
        }
        Err(e) => Err(Error::CreateDeploymentFailed(deployment_name, e)),
    }
}

/// Deletes the Deployment of a removed ServiceGroup; its pods are removed in the background.
/// The peer file config map is not touched here.
pub async fn delete_service_group<C: ClusterClient>(
    client: &C,
    sg: &ServiceGroup,
) -> Result<(), Error> {
    let deployment_name = deployment_name(sg).ok_or(Error::MissingObjectKey(".metadata.name"))?;
    let sg_ns = sg
        .metadata
        .namespace
        .as_ref()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;

    match client
        .delete_deployment(sg_ns, &deployment_name, DeletePropagation::Background)
        .await
    {
        Ok(()) => {
            info!("Delete deployment: {}", deployment_name);
            Ok(())
        }
        Err(APIError::ObjectNotFound) => {
            debug!("Deployment {} already gone", deployment_name);
            Ok(())
        }
        Err(e) => Err(Error::DeleteDeploymentFailed(deployment_name, e)),
    }
}
