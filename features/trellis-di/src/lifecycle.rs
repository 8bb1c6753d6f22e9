use std::sync::Arc;

use futures::future::BoxFuture;

use crate::types::{DynError, Instance};

/// Lifecycle contract of a component.
///
/// `init` runs after the factory produced the instance and before the node
/// is marked ready; `release` runs during teardown, in reverse completion
/// order. Each is invoked exactly once.
pub trait Lifecycle: Send + Sync {
    fn init(&self) -> BoxFuture<'_, Result<(), DynError>>;

    fn release(&self) -> BoxFuture<'_, Result<(), DynError>>;
}

/// A component wrapping a raw resource (connection pool handle, listener, …)
/// that adapters want direct access to. Usually claimed as a trait object,
/// so the bound carries `'static`.
pub trait Wrapped<T>: Send + Sync + 'static {
    fn value(&self) -> T;
}

/// Reported by a probe that is not healthy.
#[derive(Debug, Clone)]
pub struct ProbeFailure {
    pub reason: String,
}
impl ProbeFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        ProbeFailure {
            reason: reason.into(),
        }
    }
}

/// Readiness contract - `None` means healthy.
pub trait ReadinessProbe: Send + Sync {
    fn probe(&self) -> BoxFuture<'_, Option<ProbeFailure>>;
}

/// Liveness contract - `None` means healthy.
pub trait LivenessProbe: Send + Sync {
    fn probe(&self) -> BoxFuture<'_, Option<ProbeFailure>>;
}

pub(crate) type LifecycleView = fn(&Instance) -> Option<Arc<dyn Lifecycle>>;
pub(crate) type ReadinessView = fn(&Instance) -> Option<Arc<dyn ReadinessProbe>>;
pub(crate) type LivenessView = fn(&Instance) -> Option<Arc<dyn LivenessProbe>>;

/// Capability views recorded at registration time.
///
/// Plain fn pointers produced by the typed builder, so the orchestrator never
/// needs runtime type introspection to find a contract implementation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Capabilities {
    pub lifecycle: Option<LifecycleView>,
    pub readiness: Option<ReadinessView>,
    pub liveness: Option<LivenessView>,
}
