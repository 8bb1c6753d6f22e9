use std::{marker::PhantomData, sync::Arc};

use crate::{
    claim::DependencyClaim,
    errors::{BuildError, WiringError},
    factories::{ComponentFactory, DynFactory},
    graph::{self, Plan},
    lifecycle::{Capabilities, Lifecycle, LivenessProbe, ReadinessProbe},
    types::{Component, Instance, TypeInfo, TypeKey},
};

/// Conversion applied when a component is exposed under an additional key.
pub(crate) type Convert =
    Arc<dyn Fn(&Instance) -> Result<Instance, WiringError> + Send + Sync>;

/// Additional key a definition is visible under, with the conversion into
/// the aliased type.
pub(crate) struct Binding {
    pub type_info: TypeInfo,
    pub convert: Convert,
}

pub(crate) enum Produce {
    Prebuilt(Instance),
    Factory(Box<dyn DynFactory>),
}

/// One registered component: what it provides, what it claims, and the
/// contracts its instance implements. Immutable once the registry is planned.
pub struct ComponentDefinition {
    pub(crate) key: TypeKey,
    pub(crate) order: Option<i32>,
    pub(crate) claims: Vec<DependencyClaim>,
    pub(crate) produce: Produce,
    pub(crate) capabilities: Capabilities,
    pub(crate) bindings: Vec<Binding>,
}

/// Static table of component definitions, handed to the graph builder.
///
/// Registration is closed by [`Registry::plan`]; no definitions can be added
/// once the plan exists.
pub struct Registry {
    pub(crate) definitions: Vec<ComponentDefinition>,
}
impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            definitions: Vec::new(),
        }
    }

    /// Register an already created instance with no claims
    pub fn add_instance<T: Component>(self, instance: T) -> Self {
        self.register_instance(instance).done()
    }

    /// Register a factory with no tag or extra contracts
    pub fn add_factory<Factory: ComponentFactory>(self, factory: Factory) -> Self {
        self.register(factory).done()
    }

    /// Register a factory, returning a builder for tags, ordering and
    /// contract declarations
    pub fn register<Factory: ComponentFactory>(
        self,
        factory: Factory,
    ) -> DefinitionBuilder<Factory::Provides> {
        DefinitionBuilder {
            registry: self,
            definition: ComponentDefinition {
                key: TypeKey::of::<Factory::Provides>(),
                order: None,
                claims: Factory::claims(),
                produce: Produce::Factory(Box::new(factory)),
                capabilities: Capabilities::default(),
                bindings: Vec::new(),
            },
            _provides: PhantomData,
        }
    }

    /// Register an already created instance, returning a builder
    pub fn register_instance<T: Component>(self, instance: T) -> DefinitionBuilder<T> {
        DefinitionBuilder {
            registry: self,
            definition: ComponentDefinition {
                key: TypeKey::of::<T>(),
                order: None,
                claims: Vec::new(),
                produce: Produce::Prebuilt(Instance::new(instance)),
                capabilities: Capabilities::default(),
                bindings: Vec::new(),
            },
            _provides: PhantomData,
        }
    }

    /// Resolve all claims and compute the execution plan
    pub fn plan(self) -> Result<Plan, BuildError> {
        graph::build(self.definitions)
    }
}

/// Builder for one definition, returned by [`Registry::register`].
pub struct DefinitionBuilder<P: Component> {
    registry: Registry,
    definition: ComponentDefinition,
    _provides: PhantomData<fn() -> P>,
}

impl<P: Component> DefinitionBuilder<P> {
    /// Qualify this definition with a marker-type tag
    pub fn tagged<Tag: 'static>(mut self) -> Self {
        self.definition.key.tag = Some(TypeInfo::of::<Tag>());
        self
    }

    /// Explicit ordering key among same-type candidates (smaller first)
    pub fn ordered(mut self, order: i32) -> Self {
        self.definition.order = Some(order);
        self
    }

    /// Declare that the instance implements [`Lifecycle`]
    pub fn with_lifecycle(mut self) -> Self
    where
        P: Lifecycle,
    {
        self.definition.capabilities.lifecycle =
            Some(|instance| instance.downcast::<P>().ok().map(|i| i as Arc<dyn Lifecycle>));
        self
    }

    /// Declare that the instance implements [`ReadinessProbe`]
    pub fn with_readiness(mut self) -> Self
    where
        P: ReadinessProbe,
    {
        self.definition.capabilities.readiness = Some(|instance| {
            instance
                .downcast::<P>()
                .ok()
                .map(|i| i as Arc<dyn ReadinessProbe>)
        });
        self
    }

    /// Declare that the instance implements [`LivenessProbe`]
    pub fn with_liveness(mut self) -> Self
    where
        P: LivenessProbe,
    {
        self.definition.capabilities.liveness = Some(|instance| {
            instance
                .downcast::<P>()
                .ok()
                .map(|i| i as Arc<dyn LivenessProbe>)
        });
        self
    }

    /// Expose the component under an additional type, typically a trait
    /// object like `Arc<dyn Service>`. Claims for `B` resolve to this
    /// definition through the given conversion.
    pub fn binds<B: Component>(
        mut self,
        convert: impl Fn(Arc<P>) -> B + Send + Sync + 'static,
    ) -> Self {
        let convert: Convert = Arc::new(move |instance: &Instance| {
            let typed = instance
                .downcast::<P>()
                .map_err(|actual| WiringError::TypeMismatch {
                    required: std::any::type_name::<P>(),
                    actual,
                })?;
            Ok(Instance::new(convert(typed)))
        });
        self.definition.bindings.push(Binding {
            type_info: TypeInfo::of::<B>(),
            convert,
        });
        self
    }

    pub fn done(mut self) -> Registry {
        self.registry.definitions.push(self.definition);
        self.registry
    }
}
