use std::future::Future;

use futures::future::BoxFuture;

use crate::{
    claim::DependencyClaim,
    resolver::DepHandle,
    types::{Component, DynError, Instance, TypeInfo},
};

/// A factory producing instances of one component type.
///
/// The claims list every dependency the factory will request through the
/// handle, in declaration order; requesting anything else is a wiring error.
pub trait ComponentFactory: Send + Sync + 'static {
    type Provides: Component;

    /// Returns the typeinfo about the factory's provided type
    fn provides() -> TypeInfo {
        TypeInfo::of::<Self::Provides>()
    }

    /// Returns the dependency claims of this factory's constructor
    fn claims() -> Vec<DependencyClaim>;

    /// Constructs a new instance of the factory's provided type
    ///
    /// The factory resolves its declared claims through `deps`; eager claims
    /// are already satisfied when this runs, lazy and deferred claims hand
    /// out handles.
    fn construct(
        &mut self,
        deps: DepHandle,
    ) -> impl Future<Output = Result<Self::Provides, impl Into<DynError>>> + Send + '_;
}

/// Wrapper Trait for factories, providing erased instances
pub trait DynFactory: Send + Sync {
    fn provides(&self) -> TypeInfo;

    /// Returns the dependency claims of the factory
    fn claims(&self) -> Vec<DependencyClaim>;

    /// Constructs a new instance of the factory's provided type
    fn construct(&mut self, deps: DepHandle) -> BoxFuture<'_, Result<Instance, DynError>>;
}

// Impl DynFactory for any ComponentFactory
impl<T: Component, SpecificFactory: ComponentFactory<Provides = T>> DynFactory
    for SpecificFactory
{
    fn provides(&self) -> TypeInfo {
        SpecificFactory::provides()
    }

    fn claims(&self) -> Vec<DependencyClaim> {
        SpecificFactory::claims()
    }

    fn construct(&mut self, deps: DepHandle) -> BoxFuture<'_, Result<Instance, DynError>> {
        Box::pin(async {
            // Forward the call to the specific implementation
            SpecificFactory::construct(self, deps)
                .await
                .map(Instance::new)
                .map_err(Into::into)
        })
    }
}
