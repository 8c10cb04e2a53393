// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
#[derive(
    kube::CustomResource,
    Default,
    Debug,
    Clone,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
    PartialEq,
)]
#[kube(group = "habitat.sh", version = "v1", kind = "ServiceGroup")]
#[kube(shortname = "sg", namespaced)]
pub struct ServiceGroupSpec {
    pub image: String,
    pub count: i32,
    #[serde(default)]
    pub habitat: HabitatSpec,
}

#[derive(
    Default,
    Debug,
    Clone,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
    PartialEq,
)]
pub struct HabitatSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<Vec<Bind>>,
    #[serde(rename = "configSecretName", default, skip_serializing_if = "Option::is_none")]
    pub config_secret_name: Option<String>,
}

/// A dependency on another service group's exported configuration.
#[derive(
    Default,
    Debug,
    Clone,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
    PartialEq,
)]
pub struct Bind {
    /// Bind name as declared by the local service.
    pub name: String,
    pub service: String,
    pub group: String,
}
