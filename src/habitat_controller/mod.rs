// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod common;
pub mod error;
pub mod group_reconciler;
pub mod leader;
pub mod resources;
pub mod validator;

use crate::config::ControllerConfig;
use crate::crds::ServiceGroup;
use crate::habitat_controller::common::managed_pod_selector;
use crate::habitat_controller::group_reconciler::reconcile_service_group;
use crate::habitat_controller::leader::reconcile_pod;
use crate::shim_layer::cluster_client::KubeClusterClient;
use crate::shim_layer::controller_runtime::{run_event_loop, shutdown_signal, Data};
use crate::shim_layer::watch::spawn_watch;
use anyhow::Result;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, ListParams},
    Client,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::*;

/// Watches ServiceGroups and managed pods and runs both event loops until SIGINT/SIGTERM.
pub async fn run_controller(client: Client, config: ControllerConfig) -> Result<()> {
    config.validate()?;

    let (sg_api, pod_api) = match &config.namespace {
        Some(ns) => (
            Api::<ServiceGroup>::namespaced(client.clone(), ns),
            Api::<Pod>::namespaced(client.clone(), ns),
        ),
        None => (
            Api::<ServiceGroup>::all(client.clone()),
            Api::<Pod>::all(client.clone()),
        ),
    };
    info!(
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        resync = ?config.resync_period(),
        "Watching ServiceGroup objects and managed pods"
    );
    let sg_events = spawn_watch(
        "service-group",
        sg_api,
        ListParams::default(),
        config.resync_period(),
    );
    let pod_events = spawn_watch(
        "pod",
        pod_api,
        ListParams::default().labels(&managed_pod_selector()),
        config.resync_period(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let data = Arc::new(Data {
        client: KubeClusterClient::new(client),
        config: config.clone(),
    });
    let sg_loop = run_event_loop(
        "service-group-reconciler",
        sg_events,
        |event| {
            let data = data.clone();
            async move { reconcile_service_group(&*data, event).await }
        },
        &config,
        shutdown_rx.clone(),
    );
    let pod_loop = run_event_loop(
        "leader-election",
        pod_events,
        |event| {
            let data = data.clone();
            async move { reconcile_pod(&*data, event).await }
        },
        &config,
        shutdown_rx,
    );
    tokio::join!(sg_loop, pod_loop);
    info!("controller terminated");
    Ok(())
}
