use std::sync::Arc;

use crate::{
    claim::DependencyClaim,
    errors::{ResolveError, WiringError},
    graph::{ClaimTarget, ResolvedClaim},
    store::NodeStore,
    types::{Component, Instance},
};

pub mod all;
pub mod arc;
pub mod lazy;

/// Allows custom behaviour on resolution.
///
/// Every resolvable type derives the claim a factory has to declare for it;
/// the two stay in sync because the factory builds its claim list from the
/// same constructors.
pub trait Resolve {
    /// The claim this resolution satisfies
    fn claim() -> DependencyClaim;

    fn resolve(
        handle: &DepHandle,
    ) -> impl std::future::Future<Output = Result<Self, ResolveError>> + Send
    where
        Self: Sized;
}

/// Handed to a factory while its node constructs.
///
/// Resolution is limited to the claims the factory declared; eager claims
/// are already satisfied by the time the factory runs, lazy and deferred
/// claims produce handles backed by the target's slot.
#[derive(Clone)]
pub struct DepHandle {
    pub(crate) node: usize,
    pub(crate) store: Arc<NodeStore>,
    pub(crate) claims: Arc<[ResolvedClaim]>,
}

impl DepHandle {
    pub fn resolve<'a, R: Resolve + 'a>(
        &'a self,
    ) -> impl std::future::Future<Output = Result<R, ResolveError>> + Send + 'a {
        R::resolve(self)
    }

    pub(crate) fn lookup(&self, wanted: &DependencyClaim) -> Result<&ResolvedClaim, ResolveError> {
        self.claims
            .iter()
            .find(|resolved| resolved.claim == *wanted)
            .ok_or_else(|| {
                WiringError::UndeclaredClaim {
                    component: self.store.name(self.node),
                    claim: wanted.to_string(),
                }
                .into()
            })
    }

    /// Read a target's instance, applying the bind conversion if any
    pub(crate) async fn demand_target(&self, target: &ClaimTarget) -> Result<Instance, ResolveError> {
        let instance = self.store.demand(Some(self.node), target.index).await?;
        match &target.convert {
            Some(convert) => Ok(convert(&instance)?),
            None => Ok(instance),
        }
    }
}

pub(crate) fn downcast<T: Component>(instance: &Instance) -> Result<Arc<T>, ResolveError> {
    instance.downcast::<T>().map_err(|actual| {
        WiringError::TypeMismatch {
            required: std::any::type_name::<T>(),
            actual,
        }
        .into()
    })
}
