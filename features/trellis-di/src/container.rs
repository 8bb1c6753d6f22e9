use std::{
    any::TypeId,
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    builder::Convert,
    errors::{ResolveError, ShutdownError},
    graph::NodeMeta,
    health::Health,
    orchestrator::{by_type_table, release_node},
    store::{NodeState, NodeStore},
    types::Component,
};

/// A fully started graph.
///
/// Cheap to clone; all access to instances is read-only. Shutdown walks the
/// recorded completion order backwards, so no component outlives anything it
/// was constructed from.
#[derive(Clone)]
pub struct Container(Arc<ContainerInner>);

pub(crate) struct ContainerInner {
    store: Arc<NodeStore>,
    metas: Vec<NodeMeta>,
    by_type: HashMap<TypeId, Vec<(usize, Option<Convert>)>>,
    completion: Vec<usize>,
    release_grace: Duration,
    shutdown_started: Mutex<bool>,
}

impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_struct("Container");
        for (index, meta) in self.0.metas.iter().enumerate() {
            map.field(meta.name, &self.0.store.state(index));
        }
        map.finish()
    }
}

impl Container {
    pub(crate) fn new(
        store: Arc<NodeStore>,
        metas: Vec<NodeMeta>,
        completion: Vec<usize>,
        release_grace: Duration,
    ) -> Self {
        let by_type = by_type_table(&metas);
        Container(Arc::new(ContainerInner {
            store,
            metas,
            by_type,
            completion,
            release_grace,
            shutdown_started: Mutex::new(false),
        }))
    }

    /// Attempts to get the single instance of the requested type
    pub fn require<T: Component>(&self) -> Result<Arc<T>, ResolveError> {
        let type_name = std::any::type_name::<T>();
        let entries = match self.0.by_type.get(&TypeId::of::<T>()) {
            Some(entries) => entries,
            None => return Err(ResolveError::NoCandidate { type_name }),
        };
        let (index, convert) = match entries.as_slice() {
            [] => return Err(ResolveError::NoCandidate { type_name }),
            [single] => single,
            _ => return Err(ResolveError::Ambiguous { type_name }),
        };
        let instance = self
            .0
            .store
            .read_instance(*index)?
            .ok_or(ResolveError::Unavailable {
                component: self.0.metas[*index].name,
            })?;
        let instance = match convert {
            Some(convert) => convert(&instance)?,
            None => instance,
        };
        instance.downcast::<T>().map_err(|actual| {
            crate::errors::WiringError::TypeMismatch {
                required: type_name,
                actual,
            }
            .into()
        })
    }

    pub fn health(&self) -> Health {
        Health::new(self.0.store.clone(), self.0.metas.iter())
    }

    /// Release every ready node in reverse completion order.
    ///
    /// Each release gets the configured grace period; failures are collected
    /// and reported, never aborting the rest of the teardown. Safe to call
    /// more than once.
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        {
            let mut started = self.0.shutdown_started.lock().unwrap();
            if *started {
                return Ok(());
            }
            *started = true;
        }

        tracing::debug!("shutting down graph");
        let mut failures = Vec::new();
        for &index in self.0.completion.iter().rev() {
            if self.0.store.state(index) != NodeState::Ready {
                continue;
            }
            if let Err(failure) = release_node(
                &self.0.store,
                &self.0.metas[index],
                index,
                self.0.release_grace,
            )
            .await
            {
                tracing::error!("{failure}");
                failures.push(failure);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError { failures })
        }
    }
}
