//! Trellis DI builds and runs an application as a graph of long-lived
//! components: registered once, constructed in dependency order, started
//! asynchronously and torn down in reverse on shutdown.
//!
//! The crate is split into four major parts:
//! 1. [`Registry`]: the static table of component definitions and their
//!    dependency claims
//! 2. [`Plan`]: the ordered, acyclic execution plan computed from the
//!    registry, with cycle detection and lazy/deferred cycle breaking
//! 3. [`Container`]: the started graph - instance lookup, health probing
//!    and reverse-order shutdown
//! 4. Resolution types: [`Arc<T>`], `Option<Arc<T>>`, [`All`], [`Tagged`],
//!    [`ValueOf`], [`PromiseOf`] and [`TypeToken`], one per claim kind
//!
//! # Examples
//!
//! ```rust,ignore
//! struct Database { url: String }
//! struct Server { db: Arc<Database> }
//!
//! struct ServerFactory;
//! impl ComponentFactory for ServerFactory {
//!     type Provides = Server;
//!
//!     fn claims() -> Vec<DependencyClaim> {
//!         vec![DependencyClaim::single::<Database>()]
//!     }
//!
//!     async fn construct(&mut self, deps: DepHandle) -> Result<Server, DynError> {
//!         Ok(Server { db: deps.resolve().await? })
//!     }
//! }
//!
//! let plan = Registry::new()
//!     .add_instance(Database { url: "localhost".into() })
//!     .add_factory(ServerFactory)
//!     .plan()?;
//! let container = plan.start(StartOptions::default()).await?;
//! let server = container.require::<Server>()?;
//! container.shutdown().await?;
//! ```
//!
//! Cycles are legal when at least one edge of the cycle is claimed as
//! [`ValueOf`] (lazy) or [`PromiseOf`] (deferred); those edges do not
//! constrain the construction order and hand out handles instead.
//!
//! [`Arc<T>`]: std::sync::Arc

pub mod builder;
pub mod claim;
pub mod container;
pub mod errors;
pub mod factories;
pub mod graph;
pub mod health;
pub mod lifecycle;
pub mod orchestrator;
pub mod resolver;
mod store;
pub mod types;

pub use builder::{DefinitionBuilder, Registry};
pub use claim::{Cardinality, DependencyClaim, TagFilter, TypeToken};
pub use container::Container;
pub use errors::{
    BuildError, ReleaseFailure, ResolveError, ShutdownError, StartError, WiringError,
};
pub use factories::ComponentFactory;
pub use graph::Plan;
pub use health::{Health, HealthFailure};
pub use lifecycle::{Lifecycle, LivenessProbe, ProbeFailure, ReadinessProbe, Wrapped};
pub use orchestrator::StartOptions;
pub use resolver::{
    all::All,
    arc::Tagged,
    lazy::{PromiseOf, ValueOf},
    DepHandle, Resolve,
};
pub use types::{Component, DynError, Instance, TypeInfo, TypeKey};
