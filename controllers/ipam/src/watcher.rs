//! Kubernetes resource watcher.
//!
//! Turns the kube watch stream into create/update/delete changes, runs them
//! through the diff engine and hands the resulting operations to the
//! coordinator.

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::{self, resource_ref};
use crds::IPAM;
use futures::StreamExt;
use ipam_core::{Operation, ResourceRef};
use kube::api::ListParams;
use kube::Api;
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A classified resource change
#[derive(Debug, Clone)]
pub enum Change {
    Create(IPAM),
    Update { old: IPAM, new: IPAM },
    Delete(IPAM),
}

/// Last-seen copy of every watched resource.
///
/// First sight of an object is a create, later sightings are updates. A
/// relist that no longer contains a cached object yields a delete for it.
#[derive(Debug, Default)]
pub struct EventCache {
    seen: HashMap<ResourceRef, IPAM>,
    relisted: Option<HashSet<ResourceRef>>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_relist(&mut self) {
        self.relisted = Some(HashSet::new());
    }

    /// Object listed during a relist
    pub fn relist_apply(&mut self, rsc: IPAM) -> Option<Change> {
        if let Some(relisted) = self.relisted.as_mut() {
            relisted.insert(resource_ref(&rsc));
        }
        self.apply(rsc)
    }

    /// Cached objects that did not show up in the relist
    pub fn finish_relist(&mut self) -> Vec<Change> {
        let Some(relisted) = self.relisted.take() else {
            return Vec::new();
        };
        let gone: Vec<ResourceRef> = self.seen.keys().filter(|r| !relisted.contains(*r)).cloned().collect();
        gone.into_iter()
            .filter_map(|r| self.seen.remove(&r))
            .map(Change::Delete)
            .collect()
    }

    /// Object added or modified. `None` when the desired set did not change.
    pub fn apply(&mut self, rsc: IPAM) -> Option<Change> {
        match self.seen.insert(resource_ref(&rsc), rsc.clone()) {
            None => Some(Change::Create(rsc)),
            Some(old) if old.spec.host_specs == rsc.spec.host_specs => None,
            Some(old) => Some(Change::Update { old, new: rsc }),
        }
    }

    pub fn delete(&mut self, rsc: IPAM) -> Change {
        self.seen.remove(&resource_ref(&rsc));
        Change::Delete(rsc)
    }

    /// Every cached resource
    pub fn snapshot(&self) -> Vec<IPAM> {
        self.seen.values().cloned().collect()
    }
}

/// Watches IPAM resources in one namespace.
pub struct Watcher {
    api: Api<IPAM>,
    requests: mpsc::Sender<Operation>,
    metrics: Metrics,
    cache: EventCache,
}

impl Watcher {
    pub fn new(api: Api<IPAM>, requests: mpsc::Sender<Operation>, metrics: Metrics) -> Self {
        Self {
            api,
            requests,
            metrics,
            cache: EventCache::new(),
        }
    }

    /// Watch until the stream ends or the coordinator goes away
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Starting IPAM watcher");

        let mut stream = Box::pin(watcher(self.api.clone(), watcher::Config::default()).default_backoff());

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    warn!("IPAM watch error, retrying: {}", e);
                    continue;
                }
            };

            let changes = match event {
                watcher::Event::Init => {
                    debug!("IPAM watcher relisting");
                    self.cache.begin_relist();
                    Vec::new()
                }
                watcher::Event::InitApply(rsc) => {
                    debug!("IPAM init apply: {}", resource_ref(&rsc));
                    self.cache.relist_apply(rsc).into_iter().collect()
                }
                watcher::Event::InitDone => {
                    info!("IPAM watcher initialization complete");
                    self.metrics.set_ready(true);
                    self.cache.finish_relist()
                }
                watcher::Event::Apply(rsc) => {
                    debug!("IPAM applied: {}", resource_ref(&rsc));
                    self.cache.apply(rsc).into_iter().collect()
                }
                watcher::Event::Delete(rsc) => vec![self.cache.delete(rsc)],
            };

            for change in changes {
                self.dispatch(change).await?;
            }
        }

        Ok(())
    }

    async fn dispatch(&self, change: Change) -> Result<(), ControllerError> {
        let ops = match &change {
            Change::Create(rsc) => {
                info!("IPAM added: {}", resource_ref(rsc));
                reconciler::on_create(rsc)
            }
            Change::Update { old, new } => {
                info!("IPAM updated: {}", resource_ref(new));
                reconciler::on_update(old, new)
            }
            Change::Delete(rsc) => {
                info!("IPAM deleted: {}", resource_ref(rsc));
                let others = self.others().await;
                reconciler::on_delete(rsc, &others)
            }
        };

        for op in ops {
            debug!("Queueing {}", op);
            if self.requests.send(op).await.is_err() {
                error!("Coordinator stopped, no longer accepting operations");
                return Err(ControllerError::Watch("coordinator request queue closed".to_string()));
            }
        }
        Ok(())
    }

    /// Resources whose recorded addresses must survive a delete
    async fn others(&self) -> Vec<IPAM> {
        match self.api.list(&ListParams::default()).await {
            Ok(list) => list.items,
            Err(e) => {
                warn!("Failed to list IPAM resources, using cached copies: {}", e);
                self.cache.snapshot()
            }
        }
    }
}
