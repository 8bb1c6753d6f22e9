use std::{
    fmt::Debug,
    sync::{Arc, OnceLock},
};

use crate::{
    builder::Convert,
    claim::DependencyClaim,
    errors::{ResolveError, WiringError},
    graph::{ClaimTarget, ResolvedTargets},
    resolver::{downcast, DepHandle, Resolve},
    store::NodeStore,
    types::Component,
};

/// Shared accessor over a target node's slot, with a per-handle cache.
struct Demand<T: Component> {
    store: Arc<NodeStore>,
    /// The node that declared the claim - only relevant while it builds,
    /// for deadlock detection
    owner: usize,
    target: usize,
    convert: Option<Convert>,
    cache: OnceLock<Arc<T>>,
}

impl<T: Component> Demand<T> {
    async fn get(&self) -> Result<Arc<T>, ResolveError> {
        if let Some(cached) = self.cache.get() {
            return Ok(cached.clone());
        }
        let instance = self.store.demand(Some(self.owner), self.target).await?;
        let instance = match &self.convert {
            Some(convert) => convert(&instance)?,
            None => instance,
        };
        let value = downcast::<T>(&instance)?;
        // A concurrent first get may have won the race, the cached value is
        // the same node instance either way
        let _ = self.cache.set(value.clone());
        Ok(value)
    }

    fn try_get(&self) -> Option<Arc<T>> {
        if let Some(cached) = self.cache.get() {
            return Some(cached.clone());
        }
        let instance = self.store.read_instance(self.target).ok().flatten()?;
        let instance = match &self.convert {
            Some(convert) => convert(&instance).ok()?,
            None => instance,
        };
        let value = instance.downcast::<T>().ok()?;
        let _ = self.cache.set(value.clone());
        Some(value)
    }

    fn from_claim(handle: &DepHandle, target: &ClaimTarget) -> Self {
        Demand {
            store: handle.store.clone(),
            owner: handle.node,
            target: target.index,
            convert: target.convert.clone(),
            cache: OnceLock::new(),
        }
    }
}

/// Lazily resolved dependency.
///
/// Safe to obtain while the target is still unbuilt; the first `get`
/// suspends until the target is ready and caches the value in the handle.
pub struct ValueOf<T: Component>(Arc<Demand<T>>);
impl<T: Component> Clone for ValueOf<T> {
    fn clone(&self) -> Self {
        ValueOf(self.0.clone())
    }
}
impl<T: Component + Debug> Debug for ValueOf<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ValueOf").field(&self.0.try_get()).finish()
    }
}

impl<T: Component> ValueOf<T> {
    pub async fn get(&self) -> Result<Arc<T>, ResolveError> {
        self.0.get().await
    }

    /// Non-suspending read, `None` while the target is not ready
    pub fn try_get(&self) -> Option<Arc<T>> {
        self.0.try_get()
    }
}

impl<T: Component> Resolve for ValueOf<T> {
    fn claim() -> DependencyClaim {
        DependencyClaim::lazy::<T>()
    }

    async fn resolve(handle: &DepHandle) -> Result<Self, ResolveError> {
        let resolved = handle.lookup(&Self::claim())?;
        let ResolvedTargets::One(target) = &resolved.targets else {
            return Err(WiringError::UndeclaredClaim {
                component: handle.store.name(handle.node),
                claim: resolved.claim.to_string(),
            }
            .into());
        };
        Ok(ValueOf(Arc::new(Demand::from_claim(handle, target))))
    }
}

/// Deferred dependency breaking a cycle.
///
/// Backed by the target node's single-assignment slot; the handle is
/// readable before the target exists, `get` suspends until the slot is
/// resolved, exactly once, when the target becomes ready.
pub struct PromiseOf<T: Component>(Arc<Demand<T>>);
impl<T: Component> Clone for PromiseOf<T> {
    fn clone(&self) -> Self {
        PromiseOf(self.0.clone())
    }
}
impl<T: Component + Debug> Debug for PromiseOf<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PromiseOf").field(&self.0.try_get()).finish()
    }
}

impl<T: Component> PromiseOf<T> {
    pub async fn get(&self) -> Result<Arc<T>, ResolveError> {
        self.0.get().await
    }

    /// Non-suspending read, `None` while the slot is unresolved
    pub fn try_get(&self) -> Option<Arc<T>> {
        self.0.try_get()
    }
}

impl<T: Component> Resolve for PromiseOf<T> {
    fn claim() -> DependencyClaim {
        DependencyClaim::deferred::<T>()
    }

    async fn resolve(handle: &DepHandle) -> Result<Self, ResolveError> {
        let resolved = handle.lookup(&Self::claim())?;
        let ResolvedTargets::One(target) = &resolved.targets else {
            return Err(WiringError::UndeclaredClaim {
                component: handle.store.name(handle.node),
                claim: resolved.claim.to_string(),
            }
            .into());
        };
        Ok(PromiseOf(Arc::new(Demand::from_claim(handle, target))))
    }
}
