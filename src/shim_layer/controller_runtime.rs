// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::config::ControllerConfig;
use crate::shim_layer::watch::WatchEvent;
use kube::Resource;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::{mpsc, watch};
use tracing::*;

// The runtime delivers the events of one watched kind to its handler, one at a time and in order.
// A handler failure that is worth retrying puts the event back into the loop after a backoff;
// everything else is logged and dropped.

/// Data is shared by the handlers of all event loops.
pub struct Data<C> {
    pub client: C,
    pub config: ControllerConfig,
}

/// Errors returned by event handlers tell the runtime whether to requeue the event.
pub trait RetryableError: std::error::Error + Send + Sync + 'static {
    fn is_retryable(&self) -> bool;
}

struct Requeue<K> {
    event: WatchEvent<K>,
    seq: u64,
    attempt: u32,
}

/// Runs `handler` on every event received from `events` until shutdown is signalled
/// or the feed closes. An in-flight handler always runs to completion.
///
/// A requeued event is dropped when a newer event for the same object has been received
/// since, so a retry never replays stale state over a newer observation.
pub async fn run_event_loop<K, E, F, Fut>(
    controller_name: &'static str,
    mut events: mpsc::Receiver<WatchEvent<K>>,
    handler: F,
    config: &ControllerConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    K: Resource + Clone + Send + 'static,
    E: RetryableError,
    F: Fn(WatchEvent<K>) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let (requeue_tx, mut requeue_rx) = mpsc::unbounded_channel::<Requeue<K>>();
    let mut latest: HashMap<String, u64> = HashMap::new();
    let mut next_seq: u64 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }
        let (event, seq, attempt) = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            received = events.recv() => match received {
                Some(event) => {
                    next_seq += 1;
                    latest.insert(event.key(), next_seq);
                    (event, next_seq, 0)
                }
                None => {
                    info!(controller.name = controller_name, "Event feed closed");
                    break;
                }
            },
            Some(requeued) = requeue_rx.recv() => {
                if latest.get(&requeued.event.key()) != Some(&requeued.seq) {
                    debug!(
                        controller.name = controller_name,
                        object = %requeued.event.key(),
                        "Dropping requeued event superseded by a newer one"
                    );
                    continue;
                }
                (requeued.event, requeued.seq, requeued.attempt)
            }
        };

        let key = event.key();
        let is_delete = matches!(event, WatchEvent::Deleted(_));
        let retry = event.clone();
        match handler(event).await {
            Ok(()) => {
                debug!(controller.name = controller_name, object = %key, "Handled event");
            }
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                let delay = config.backoff(attempt);
                warn!(
                    controller.name = controller_name,
                    object = %key,
                    error = &err as &dyn std::error::Error,
                    attempt = attempt + 1,
                    "Failed to handle event, requeue after {:?}",
                    delay
                );
                let requeue_tx = requeue_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    // The loop may have stopped in the meantime; the retry is abandoned then.
                    let _ = requeue_tx.send(Requeue {
                        event: retry,
                        seq,
                        attempt: attempt + 1,
                    });
                });
                continue;
            }
            Err(err) => {
                error!(
                    controller.name = controller_name,
                    object = %key,
                    error = &err as &dyn std::error::Error,
                    attempts = attempt + 1,
                    "Failed to handle event, dropping it"
                );
            }
        }
        if is_delete {
            latest.remove(&key);
        }
    }
    info!(controller.name = controller_name, "Event loop terminated");
}

/// Resolves once the process receives SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", err);
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
