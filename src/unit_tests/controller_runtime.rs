// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::config::ControllerConfig;
use crate::shim_layer::controller_runtime::*;
use crate::shim_layer::watch::WatchEvent;
use crate::unit_tests::fixtures::*;
use k8s_openapi::api::core::v1::Pod;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Error)]
#[error("test failure (retryable: {retryable})")]
struct TestError {
    retryable: bool,
}

impl RetryableError for TestError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

type Calls = Arc<Mutex<Vec<WatchEvent<Pod>>>>;

fn call_count(calls: &Calls) -> usize {
    calls.lock().unwrap().len()
}

fn runtime_config(max_retries: u32, retry_base_delay_ms: u64) -> ControllerConfig {
    ControllerConfig {
        max_retries,
        retry_base_delay_ms,
        retry_max_delay_secs: 1,
        ..ControllerConfig::default()
    }
}

fn pod_event(ip: &str) -> WatchEvent<Pod> {
    let pod = running_pod("redis", "redis-0", ip);
    WatchEvent::Updated(pod.clone(), pod)
}

// Runs an event loop whose handler records every call and answers with `outcome`.
async fn run_with<O, R, D>(config: ControllerConfig, outcome: O, driver: R) -> Calls
where
    O: Fn(&WatchEvent<Pod>, usize) -> Result<(), TestError>,
    R: FnOnce(mpsc::Sender<WatchEvent<Pod>>, watch::Sender<bool>, Calls) -> D,
    D: std::future::Future<Output = ()>,
{
    let (event_tx, event_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let handler = |event: WatchEvent<Pod>| {
        let calls = calls.clone();
        let result = {
            let mut calls = calls.lock().unwrap();
            calls.push(event.clone());
            outcome(&event, calls.len())
        };
        async move { result }
    };
    tokio::join!(
        run_event_loop("test-controller", event_rx, handler, &config, shutdown_rx),
        driver(event_tx, shutdown_tx, calls.clone()),
    );
    calls
}

#[tokio::test]
pub async fn test_retryable_failure_is_requeued() {
    println!("Testing retryable failure is requeued...");
    let calls = run_with(
        runtime_config(5, 1),
        |_, n| match n {
            1 | 2 => Err(TestError { retryable: true }),
            _ => Ok(()),
        },
        |events, shutdown, calls| async move {
            events.send(pod_event("10.0.0.1")).await.unwrap();
            wait_until(|| call_count(&calls) == 3).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            shutdown.send(true).unwrap();
        },
    )
    .await;
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|event| *event == pod_event("10.0.0.1")));
}

#[tokio::test]
pub async fn test_terminal_failure_is_dropped() {
    println!("Testing terminal failure is dropped...");
    let calls = run_with(
        runtime_config(5, 1),
        |_, _| Err(TestError { retryable: false }),
        |events, shutdown, calls| async move {
            events.send(pod_event("10.0.0.1")).await.unwrap();
            wait_until(|| call_count(&calls) == 1).await;
            tokio::time::sleep(Duration::from_millis(30)).await;
            shutdown.send(true).unwrap();
        },
    )
    .await;
    assert_eq!(call_count(&calls), 1);
}

#[tokio::test]
pub async fn test_retries_are_bounded() {
    println!("Testing retries are bounded...");
    let calls = run_with(
        runtime_config(2, 1),
        |_, _| Err(TestError { retryable: true }),
        |events, shutdown, calls| async move {
            events.send(pod_event("10.0.0.1")).await.unwrap();
            wait_until(|| call_count(&calls) == 3).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.send(true).unwrap();
        },
    )
    .await;
    assert_eq!(call_count(&calls), 3);
}

#[tokio::test]
pub async fn test_superseded_retry_is_dropped() {
    println!("Testing superseded retry is dropped...");
    let stale = pod_event("10.0.0.1");
    let fresh = pod_event("10.0.0.2");
    let calls = run_with(
        runtime_config(5, 100),
        |event, _| {
            if *event == pod_event("10.0.0.1") {
                Err(TestError { retryable: true })
            } else {
                Ok(())
            }
        },
        |events, shutdown, calls| async move {
            events.send(stale).await.unwrap();
            wait_until(|| call_count(&calls) == 1).await;
            events.send(fresh).await.unwrap();
            wait_until(|| call_count(&calls) == 2).await;
            // Past the first retry of the stale event.
            tokio::time::sleep(Duration::from_millis(300)).await;
            shutdown.send(true).unwrap();
        },
    )
    .await;
    let calls = calls.lock().unwrap();
    assert_eq!(*calls, vec![pod_event("10.0.0.1"), pod_event("10.0.0.2")]);
}

#[tokio::test]
pub async fn test_events_for_other_objects_do_not_supersede() {
    println!("Testing events for other objects do not supersede...");
    let other = {
        let pod = running_pod("redis", "redis-1", "10.0.0.2");
        WatchEvent::Updated(pod.clone(), pod)
    };
    let calls = run_with(
        runtime_config(5, 20),
        |_, n| match n {
            1 => Err(TestError { retryable: true }),
            _ => Ok(()),
        },
        |events, shutdown, calls| async move {
            events.send(pod_event("10.0.0.1")).await.unwrap();
            events.send(other).await.unwrap();
            wait_until(|| call_count(&calls) == 3).await;
            shutdown.send(true).unwrap();
        },
    )
    .await;
    let calls = calls.lock().unwrap();
    assert_eq!(calls[2], pod_event("10.0.0.1"));
}

#[tokio::test]
pub async fn test_shutdown_stops_before_next_event() {
    println!("Testing shutdown stops before next event...");
    let (event_tx, event_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();
    event_tx.send(pod_event("10.0.0.1")).await.unwrap();

    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let handler = |event: WatchEvent<Pod>| {
        calls.lock().unwrap().push(event);
        async { Ok::<(), TestError>(()) }
    };
    run_event_loop("test-controller", event_rx, handler, &runtime_config(5, 1), shutdown_rx).await;
    assert_eq!(call_count(&calls), 0);
}

#[tokio::test]
pub async fn test_closed_feed_ends_loop() {
    println!("Testing closed feed ends loop...");
    let (event_tx, event_rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    event_tx.send(pod_event("10.0.0.1")).await.unwrap();
    drop(event_tx);

    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let handler = |event: WatchEvent<Pod>| {
        calls.lock().unwrap().push(event);
        async { Ok::<(), TestError>(()) }
    };
    run_event_loop("test-controller", event_rx, handler, &runtime_config(5, 1), shutdown_rx).await;
    assert_eq!(call_count(&calls), 1);
}
