// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use futures::StreamExt;
use kube::{
    api::{Api, ListParams},
    runtime::{watcher, watcher::Event},
    Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::*;

/// A lifecycle notification for one object of kind `K`.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    Added(K),
    /// Old and new state. Resync delivers the cached object as both.
    Updated(K, K),
    Deleted(K),
}

impl<K: Resource> WatchEvent<K> {
    /// The `namespace/name` key of the object the event is about.
    pub fn key(&self) -> String {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Updated(_, obj) | WatchEvent::Deleted(obj) => {
                object_key(obj)
            }
        }
    }
}

pub fn object_key<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Last known state of every watched object, used to turn watcher events into
/// added/updated/deleted notifications.
#[derive(Debug)]
pub struct EventCache<K> {
    objects: BTreeMap<String, K>,
}

impl<K> Default for EventCache<K> {
    fn default() -> Self {
        EventCache {
            objects: BTreeMap::new(),
        }
    }
}

impl<K: Resource + Clone> EventCache<K> {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn apply(&mut self, event: Event<K>) -> Vec<WatchEvent<K>> {
        match event {
            Event::Applied(obj) => vec![self.upsert(obj)],
            Event::Deleted(obj) => {
                self.objects.remove(&object_key(&obj));
                vec![WatchEvent::Deleted(obj)]
            }
            Event::Restarted(objs) => {
                let mut fresh = BTreeMap::new();
                for obj in objs {
                    fresh.insert(object_key(&obj), obj);
                }
                let stale = std::mem::take(&mut self.objects);
                let (mut kept, gone): (BTreeMap<_, _>, BTreeMap<_, _>) = stale
                    .into_iter()
                    .partition(|(key, _)| fresh.contains_key(key));
                let mut events: Vec<_> = gone.into_values().map(WatchEvent::Deleted).collect();
                for (key, obj) in fresh {
                    // Known keys are diffed against their cached state.
                    let event = match kept.remove(&key) {
                        Some(old) => WatchEvent::Updated(old, obj.clone()),
                        None => WatchEvent::Added(obj.clone()),
                    };
                    self.objects.insert(key, obj);
                    events.push(event);
                }
                events
            }
        }
    }

    pub fn resync(&self) -> Vec<WatchEvent<K>> {
        self.objects
            .values()
            .map(|obj| WatchEvent::Updated(obj.clone(), obj.clone()))
            .collect()
    }

    fn upsert(&mut self, obj: K) -> WatchEvent<K> {
        match self.objects.insert(object_key(&obj), obj.clone()) {
            Some(old) => WatchEvent::Updated(old, obj),
            None => WatchEvent::Added(obj),
        }
    }
}

/// Spawns a task that watches `api` and feeds the resulting events, plus periodic
/// resync updates, into the returned channel. The task ends when the receiver is dropped.
pub fn spawn_watch<K>(
    name: &'static str,
    api: Api<K>,
    lp: ListParams,
    resync_period: Option<Duration>,
) -> mpsc::Receiver<WatchEvent<K>>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(128);
    tokio::spawn(async move {
        let mut stream = watcher(api, lp).boxed();
        let mut cache = EventCache::<K>::default();
        let mut ticker = resync_period.map(|period| {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });
        loop {
            let events = tokio::select! {
                item = stream.next() => match item {
                    Some(Ok(event)) => cache.apply(event),
                    Some(Err(err)) => {
                        warn!(
                            watch = name,
                            error = &err as &dyn std::error::Error,
                            "Watch stream error"
                        );
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                    None => {
                        info!(watch = name, "Watch stream ended");
                        return;
                    }
                },
                _ = tick(&mut ticker) => {
                    debug!(watch = name, objects = cache.len(), "Resync");
                    cache.resync()
                }
            };
            for event in events {
                if tx.send(event).await.is_err() {
                    debug!(watch = name, "Event receiver dropped, stopping watch");
                    return;
                }
            }
        }
    });
    rx
}

async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending::<()>().await,
    }
}
