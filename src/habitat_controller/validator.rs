// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::*;
use thiserror::Error;

const MAX_NAME_LENGTH: usize = 63;

/// A structural problem in a ServiceGroup, naming the offending field.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid '{field}': {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// main validation
pub fn validate_service_group(sg: &ServiceGroup) -> Result<(), ValidationError> {
    validate_name(sg.metadata.name.as_deref())?;
    validate_count(&sg.spec)?;
    validate_image(&sg.spec)?;
    validate_habitat(&sg.spec.habitat)?;
    Ok(())
}

pub fn validate_name(name: Option<&str>) -> Result<(), ValidationError> {
    match name {
        None => Err(ValidationError::new("metadata.name", "must not be empty")),
        Some(name) => check_dns_label("metadata.name", name),
    }
}

pub fn validate_count(spec: &ServiceGroupSpec) -> Result<(), ValidationError> {
    if spec.count < 1 {
        return Err(ValidationError::new(
            "spec.count",
            format!("must be at least 1, got {}", spec.count),
        ));
    }
    Ok(())
}

pub fn validate_image(spec: &ServiceGroupSpec) -> Result<(), ValidationError> {
    if spec.image.trim().is_empty() {
        return Err(ValidationError::new("spec.image", "must not be empty"));
    }
    Ok(())
}

pub fn validate_habitat(habitat: &HabitatSpec) -> Result<(), ValidationError> {
    // An empty group falls back to the default one.
    if let Some(group) = habitat.group.as_deref().filter(|group| !group.is_empty()) {
        check_dns_label("spec.habitat.group", group)?;
    }
    if let Some(binds) = &habitat.bind {
        for (i, bind) in binds.iter().enumerate() {
            validate_bind(i, bind)?;
        }
    }
    if habitat.config_secret_name.as_deref() == Some("") {
        return Err(ValidationError::new(
            "spec.habitat.configSecretName",
            "must not be empty when set",
        ));
    }
    Ok(())
}

pub fn validate_bind(index: usize, bind: &Bind) -> Result<(), ValidationError> {
    let fields = [
        ("name", &bind.name),
        ("service", &bind.service),
        ("group", &bind.group),
    ];
    for (field, value) in fields {
        if value.is_empty() {
            return Err(ValidationError::new(
                format!("spec.habitat.bind[{}].{}", index, field),
                "must not be empty",
            ));
        }
    }
    Ok(())
}

// RFC 1123 label: the name ends up as a label value and as the Deployment name.
fn check_dns_label(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::new(
            field,
            format!("must be no more than {} characters", MAX_NAME_LENGTH),
        ));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ValidationError::new(
            field,
            "must consist of lower case alphanumeric characters or '-'",
        ));
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(ValidationError::new(
            field,
            "must start and end with an alphanumeric character",
        ));
    }
    Ok(())
}
