use std::sync::Arc;

use crate::{
    claim::DependencyClaim,
    errors::{ResolveError, WiringError},
    graph::ResolvedTargets,
    resolver::{downcast, DepHandle, Resolve},
    types::Component,
};

/// Every matching instance of a type, in build order.
///
/// The set and its order are fixed at plan time: explicit ordering keys
/// first, registration order as the tie-break. Never re-sorted at runtime.
pub struct All<T: Component> {
    items: Vec<Arc<T>>,
}

impl<T: Component> All<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<T>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<T>> {
        self.items.get(index)
    }

    /// Pass-through convenience over all instances
    pub fn map<R>(&self, f: impl FnMut(&Arc<T>) -> R) -> Vec<R> {
        self.items.iter().map(f).collect()
    }
}

impl<T: Component> IntoIterator for All<T> {
    type Item = Arc<T>;
    type IntoIter = std::vec::IntoIter<Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T: Component> IntoIterator for &'a All<T> {
    type Item = &'a Arc<T>;
    type IntoIter = std::slice::Iter<'a, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Component> Resolve for All<T> {
    fn claim() -> DependencyClaim {
        DependencyClaim::all::<T>()
    }

    async fn resolve(handle: &DepHandle) -> Result<Self, ResolveError> {
        let resolved = handle.lookup(&Self::claim())?;
        let ResolvedTargets::Many(targets) = &resolved.targets else {
            return Err(WiringError::UndeclaredClaim {
                component: handle.store.name(handle.node),
                claim: resolved.claim.to_string(),
            }
            .into());
        };
        let mut items = Vec::with_capacity(targets.len());
        for target in targets {
            let instance = handle.demand_target(target).await?;
            items.push(downcast::<T>(&instance)?);
        }
        Ok(All { items })
    }
}
