// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::config::*;
use clap::Parser;
use std::time::Duration;

#[derive(Parser)]
struct TestCli {
    #[command(flatten)]
    config: ControllerConfig,
}

#[test]
pub fn test_default() {
    println!("Testing default...");
    let config = ControllerConfig::default();
    assert_eq!(config.namespace, None);
    assert_eq!(config.resync_period(), Some(Duration::from_secs(60)));
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.retry_base_delay(), Duration::from_millis(500));
    assert_eq!(config.retry_max_delay(), Duration::from_secs(30));
    assert_eq!(config.conflict_retries, 5);
    assert!(config.clear_leader_when_empty);
    assert_eq!(config.validate(), Ok(()));
}

#[test]
pub fn test_parse_matches_default() {
    println!("Testing parse matches default...");
    let cli = TestCli::try_parse_from(["habitat-controller"]).unwrap();
    assert_eq!(cli.config, ControllerConfig::default());
}

#[test]
pub fn test_parse_flags() {
    println!("Testing parse flags...");
    let cli = TestCli::try_parse_from([
        "habitat-controller",
        "--namespace",
        "apps",
        "--resync-period-secs",
        "0",
        "--max-retries",
        "2",
        "--clear-leader-when-empty",
        "false",
    ])
    .unwrap();
    assert_eq!(cli.config.namespace.as_deref(), Some("apps"));
    assert_eq!(cli.config.resync_period(), None);
    assert_eq!(cli.config.max_retries, 2);
    assert!(!cli.config.clear_leader_when_empty);
}

#[test]
pub fn test_backoff() {
    println!("Testing backoff...");
    let config = ControllerConfig {
        retry_base_delay_ms: 100,
        retry_max_delay_secs: 1,
        ..ControllerConfig::default()
    };
    assert_eq!(config.backoff(0), Duration::from_millis(100));
    assert_eq!(config.backoff(1), Duration::from_millis(200));
    assert_eq!(config.backoff(3), Duration::from_millis(800));
    assert_eq!(config.backoff(4), Duration::from_secs(1));
    assert_eq!(config.backoff(40), Duration::from_secs(1));
}

#[test]
pub fn test_validate() {
    println!("Testing validate...");
    let zero_base = ControllerConfig {
        retry_base_delay_ms: 0,
        ..ControllerConfig::default()
    };
    assert_eq!(zero_base.validate(), Err(ConfigError::ZeroRetryBaseDelay));

    let max_below_base = ControllerConfig {
        retry_base_delay_ms: 5000,
        retry_max_delay_secs: 1,
        ..ControllerConfig::default()
    };
    assert_eq!(
        max_below_base.validate(),
        Err(ConfigError::RetryMaxBelowBase {
            base: Duration::from_millis(5000),
            max: Duration::from_secs(1),
        })
    );
}
