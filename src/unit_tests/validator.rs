// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::*;
use crate::habitat_controller::validator::*;
use crate::unit_tests::fixtures::*;

fn invalid_field(sg: &ServiceGroup) -> String {
    validate_service_group(sg).unwrap_err().field
}

#[test]
pub fn test_valid_service_group() {
    println!("Testing valid service group...");
    let mut sg = make_service_group("web", 3, "core/nginx");
    assert_eq!(validate_service_group(&sg), Ok(()));

    sg.spec.habitat = HabitatSpec {
        group: Some("blue".to_string()),
        bind: Some(vec![Bind {
            name: "db".to_string(),
            service: "redis".to_string(),
            group: "default".to_string(),
        }]),
        config_secret_name: Some("web-user-toml".to_string()),
    };
    assert_eq!(validate_service_group(&sg), Ok(()));
}

#[test]
pub fn test_count() {
    println!("Testing count...");
    let sg = make_service_group("web", 0, "core/nginx");
    let err = validate_service_group(&sg).unwrap_err();
    assert_eq!(err.field, "spec.count");
    assert_eq!(err.to_string(), "Invalid 'spec.count': must be at least 1, got 0");
    assert_eq!(invalid_field(&make_service_group("web", -2, "core/nginx")), "spec.count");
}

#[test]
pub fn test_image() {
    println!("Testing image...");
    assert_eq!(invalid_field(&make_service_group("web", 1, "")), "spec.image");
    assert_eq!(invalid_field(&make_service_group("web", 1, "  ")), "spec.image");
}

#[test]
pub fn test_name() {
    println!("Testing name...");
    let mut sg = make_service_group("web", 1, "core/nginx");
    sg.metadata.name = None;
    assert_eq!(invalid_field(&sg), "metadata.name");

    let too_long = "a".repeat(64);
    for name in ["Web", "web_1", "-web", "web-", too_long.as_str()] {
        assert_eq!(invalid_field(&make_service_group(name, 1, "core/nginx")), "metadata.name");
    }
    assert_eq!(validate_name(Some(&"a".repeat(63))), Ok(()));
}

#[test]
pub fn test_habitat() {
    println!("Testing habitat...");
    let mut sg = make_service_group("web", 1, "core/nginx");
    sg.spec.habitat.group = Some(String::new());
    assert_eq!(validate_service_group(&sg), Ok(()));

    sg.spec.habitat.group = Some("Blue".to_string());
    assert_eq!(invalid_field(&sg), "spec.habitat.group");

    sg.spec.habitat.group = None;
    sg.spec.habitat.config_secret_name = Some(String::new());
    assert_eq!(invalid_field(&sg), "spec.habitat.configSecretName");
}

#[test]
pub fn test_bind() {
    println!("Testing bind...");
    let mut sg = make_service_group("web", 1, "core/nginx");
    sg.spec.habitat.bind = Some(vec![
        Bind {
            name: "db".to_string(),
            service: "redis".to_string(),
            group: "default".to_string(),
        },
        Bind {
            name: "cache".to_string(),
            service: String::new(),
            group: "default".to_string(),
        },
    ]);
    assert_eq!(invalid_field(&sg), "spec.habitat.bind[1].service");
}

#[test]
pub fn test_first_failure_is_reported() {
    println!("Testing first failure is reported...");
    // Both count and image are invalid; count is checked first.
    assert_eq!(invalid_field(&make_service_group("web", 0, "")), "spec.count");
}
