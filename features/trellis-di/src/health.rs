use std::sync::Arc;

use crate::{
    graph::{NodeMeta, Plan},
    lifecycle::{LivenessView, ReadinessView},
    store::{NodeState, NodeStore},
};

/// First failing probe, or why a component could not be probed.
#[derive(Debug, Clone)]
pub struct HealthFailure {
    pub component: &'static str,
    pub reason: String,
}

struct ProbeEntry {
    index: usize,
    name: &'static str,
    readiness: Option<ReadinessView>,
    liveness: Option<LivenessView>,
}

/// Aggregates every probe-capable component into one worst-case answer.
///
/// Works over the shared node arena, so it can be obtained from the plan
/// before startup finishes: components that are not ready yet report a
/// transient failure instead of blocking the poll.
#[derive(Clone)]
pub struct Health {
    store: Arc<NodeStore>,
    probes: Arc<[ProbeEntry]>,
}

impl Plan {
    /// Probe handle over this plan's nodes, valid before and after start
    pub fn health(&self) -> Health {
        Health::new(self.store.clone(), self.nodes.iter().map(|n| &n.meta))
    }
}

impl Health {
    pub(crate) fn new<'a>(
        store: Arc<NodeStore>,
        metas: impl Iterator<Item = &'a NodeMeta>,
    ) -> Self {
        let probes: Vec<ProbeEntry> = metas
            .enumerate()
            .filter(|(_, meta)| {
                meta.capabilities.readiness.is_some() || meta.capabilities.liveness.is_some()
            })
            .map(|(index, meta)| ProbeEntry {
                index,
                name: meta.name,
                readiness: meta.capabilities.readiness,
                liveness: meta.capabilities.liveness,
            })
            .collect();
        Health {
            store,
            probes: probes.into(),
        }
    }

    /// Poll every readiness probe, stopping at the first failure
    pub async fn readiness(&self) -> Result<(), HealthFailure> {
        for entry in self.probes.iter() {
            let Some(view) = entry.readiness else {
                continue;
            };
            let instance = self.transient_check(entry)?;
            if let Some(probe) = view(&instance) {
                if let Some(failure) = probe.probe().await {
                    tracing::warn!("readiness of '{}': {}", entry.name, failure.reason);
                    return Err(HealthFailure {
                        component: entry.name,
                        reason: failure.reason,
                    });
                }
            }
        }
        Ok(())
    }

    /// Poll every liveness probe, stopping at the first failure
    pub async fn liveness(&self) -> Result<(), HealthFailure> {
        for entry in self.probes.iter() {
            let Some(view) = entry.liveness else {
                continue;
            };
            let instance = self.transient_check(entry)?;
            if let Some(probe) = view(&instance) {
                if let Some(failure) = probe.probe().await {
                    tracing::warn!("liveness of '{}': {}", entry.name, failure.reason);
                    return Err(HealthFailure {
                        component: entry.name,
                        reason: failure.reason,
                    });
                }
            }
        }
        Ok(())
    }

    /// A probe is only polled on a ready node; anything else is an answer by
    /// itself, without blocking.
    fn transient_check(
        &self,
        entry: &ProbeEntry,
    ) -> Result<crate::types::Instance, HealthFailure> {
        let failure = |reason: &str| HealthFailure {
            component: entry.name,
            reason: reason.to_string(),
        };
        match self.store.state(entry.index) {
            NodeState::Ready => self
                .store
                .read_instance(entry.index)
                .ok()
                .flatten()
                .ok_or_else(|| failure("initializing")),
            NodeState::Unbuilt | NodeState::Building => Err(failure("initializing")),
            NodeState::Failed => Err(failure("failed")),
            NodeState::Released => Err(failure("released")),
        }
    }
}
