use std::{marker::PhantomData, ops::Deref, sync::Arc};

use crate::{
    claim::{DependencyClaim, TypeToken},
    errors::{ResolveError, WiringError},
    graph::ResolvedTargets,
    resolver::{downcast, DepHandle, Resolve},
    types::Component,
};

impl<T: Component> Resolve for Arc<T> {
    fn claim() -> DependencyClaim {
        DependencyClaim::single::<T>()
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
        let instance = handle.demand_target(target).await?;
        downcast::<T>(&instance)
    }
}

impl<T: Component> Resolve for Option<Arc<T>> {
    fn claim() -> DependencyClaim {
        DependencyClaim::optional::<T>()
    }

    async fn resolve(handle: &DepHandle) -> Result<Self, ResolveError> {
        let resolved = handle.lookup(&Self::claim())?;
        let ResolvedTargets::Opt(target) = &resolved.targets else {
            return Err(WiringError::UndeclaredClaim {
                component: handle.store.name(handle.node),
                claim: resolved.claim.to_string(),
            }
            .into());
        };
        match target {
            Some(target) => {
                let instance = handle.demand_target(target).await?;
                Ok(Some(downcast::<T>(&instance)?))
            }
            None => Ok(None),
        }
    }
}

/// A single dependency qualified by a marker-type tag.
///
/// Derefs to the resolved `Arc<T>`.
pub struct Tagged<T: Component, Tag: 'static> {
    value: Arc<T>,
    _tag: PhantomData<fn() -> Tag>,
}

impl<T: Component, Tag: 'static> Tagged<T, Tag> {
    pub fn into_inner(self) -> Arc<T> {
        self.value
    }
}
impl<T: Component, Tag: 'static> Deref for Tagged<T, Tag> {
    type Target = Arc<T>;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: Component, Tag: 'static> Resolve for Tagged<T, Tag> {
    fn claim() -> DependencyClaim {
        DependencyClaim::single::<T>().with_tag::<Tag>()
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
        let instance = handle.demand_target(target).await?;
        Ok(Tagged {
            value: downcast::<T>(&instance)?,
            _tag: PhantomData,
        })
    }
}

impl<T: Component> Resolve for TypeToken<T> {
    fn claim() -> DependencyClaim {
        DependencyClaim::type_token::<T>()
    }

    async fn resolve(handle: &DepHandle) -> Result<Self, ResolveError> {
        // Only checks the claim was declared, never constructs anything
        handle.lookup(&Self::claim())?;
        Ok(TypeToken::new())
    }
}
