// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod config;
pub mod crds;
pub mod executable_model;
pub mod habitat_controller;
pub mod shim_layer;

#[cfg(test)]
mod unit_tests;
