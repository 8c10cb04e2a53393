// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT

//! The shim layer connects the controller logic to the trusted kube-rs APIs:
//! the cluster client the handlers write through, the watch feed that turns
//! kube-rs watcher output into lifecycle events, and the event loops that drive
//! the handlers.
pub mod cluster_client;
pub mod controller_runtime;
pub mod watch;
