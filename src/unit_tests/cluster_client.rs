// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::habitat_controller::common::*;
use crate::shim_layer::cluster_client::*;
use crate::unit_tests::fixtures::*;
use kube::core::ErrorResponse;

fn api_error(reason: &str, code: u16) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("request failed: {}", reason),
        reason: reason.to_string(),
        code,
    })
}

#[test]
pub fn test_kube_error_to_api_error() {
    println!("Testing kube error to api error...");
    let cases = [
        ("NotFound", 404, APIError::ObjectNotFound),
        ("AlreadyExists", 409, APIError::ObjectAlreadyExists),
        ("BadRequest", 400, APIError::BadRequest),
        ("Conflict", 409, APIError::Conflict),
        ("Invalid", 422, APIError::Invalid),
        ("InternalError", 500, APIError::InternalError),
        ("Timeout", 504, APIError::Timeout),
        ("ServerTimeout", 500, APIError::ServerTimeout),
        ("Forbidden", 403, APIError::Other),
    ];
    for (reason, code, expected) in cases {
        assert_eq!(kube_error_to_api_error(&api_error(reason, code)), expected);
    }
}

#[test]
pub fn test_is_transient() {
    println!("Testing is transient...");
    for err in [
        APIError::Conflict,
        APIError::InternalError,
        APIError::Timeout,
        APIError::ServerTimeout,
        APIError::Other,
    ] {
        assert!(err.is_transient(), "{:?}", err);
    }
    for err in [
        APIError::ObjectNotFound,
        APIError::ObjectAlreadyExists,
        APIError::BadRequest,
        APIError::Invalid,
    ] {
        assert!(!err.is_transient(), "{:?}", err);
    }
}

#[test]
pub fn test_pod_filter_selectors() {
    println!("Testing pod filter selectors...");
    let filter = PodFilter::with_labels(pod_labels("redis"))
        .phase(POD_RUNNING)
        .pod_ip("10.0.0.1");
    assert_eq!(filter.label_selector(), "habitat=true,service-group=redis");
    assert_eq!(filter.field_selector(), "status.phase=Running,status.podIP=10.0.0.1");

    let empty = PodFilter::default();
    assert_eq!(empty.label_selector(), "");
    assert_eq!(empty.field_selector(), "");
}

#[test]
pub fn test_pod_filter_matches() {
    println!("Testing pod filter matches...");
    let filter = PodFilter::with_labels(pod_labels("redis")).phase(POD_RUNNING);
    assert!(filter.matches(&running_pod("redis", "redis-0", "10.0.0.1")));
    assert!(!filter.matches(&running_pod("web", "web-0", "10.0.0.1")));
    assert!(!filter.matches(&make_pod("redis", "redis-1", None, "Pending")));

    let by_ip = filter.clone().pod_ip("10.0.0.2");
    assert!(!by_ip.matches(&running_pod("redis", "redis-0", "10.0.0.1")));
    assert!(by_ip.matches(&running_pod("redis", "redis-1", "10.0.0.2")));

    assert!(PodFilter::default().matches(&make_pod("web", "web-0", None, "Pending")));
}
