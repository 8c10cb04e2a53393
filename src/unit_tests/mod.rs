// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod cluster_client;
pub mod config;
pub mod controller_runtime;
pub mod validator;
