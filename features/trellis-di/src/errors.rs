use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::types::DynError;

/// Errors detected while turning a set of definitions into a [`Plan`].
///
/// These are always fatal - there is no partial graph.
///
/// [`Plan`]: crate::graph::Plan
#[derive(Error, Debug, Clone)]
pub enum BuildError {
    /// A claim that requires an instance has no matching definition
    #[error("no candidate for claim {claim} required by '{required_by}'")]
    NoCandidate {
        claim: String,
        required_by: &'static str,
    },
    /// A single-valued claim matched several definitions
    #[error("ambiguous candidates for claim {claim} required by '{required_by}': {candidates:?} - consider a tag")]
    AmbiguousCandidates {
        claim: String,
        required_by: &'static str,
        candidates: Vec<&'static str>,
    },
    /// A dependency cycle exists with no lazy or deferred edge to cut
    #[error("unbreakable dependency cycle through {chain:?} - consider `ValueOf` or `PromiseOf` for one edge")]
    UnbreakableCycle { chain: Vec<&'static str> },
}

/// Structural bugs in the wiring, detected at runtime.
///
/// Never transient and never retried.
#[derive(Error, Debug, Clone)]
pub enum WiringError {
    /// The single-assignment slot of a node was resolved a second time
    #[error("deferred slot of '{component}' resolved more than once")]
    PromiseAlreadyResolved { component: &'static str },
    /// A handle read can only complete after the reader itself completes
    #[error("resolution deadlock through {path:?}")]
    ResolutionDeadlock { path: Vec<&'static str> },
    /// An erased instance did not hold the claimed type
    #[error("type mismatch, required '{required}' actual '{actual}'")]
    TypeMismatch {
        required: &'static str,
        actual: &'static str,
    },
    /// A factory requested a dependency missing from its declared claims
    #[error("'{component}' requested an undeclared dependency: {claim}")]
    UndeclaredClaim {
        component: &'static str,
        claim: String,
    },
}

/// Errors when resolving a dependency or requiring an instance
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error(transparent)]
    Wiring(#[from] WiringError),
    /// Startup failed while this resolution was pending
    #[error("graph startup was aborted")]
    Aborted,
    /// The target node is released or failed
    #[error("component '{component}' is no longer available")]
    Unavailable { component: &'static str },
    /// No definition for the required type
    #[error("no component registered for '{type_name}'")]
    NoCandidate { type_name: &'static str },
    /// Several definitions for the required type
    #[error("multiple components registered for '{type_name}'")]
    Ambiguous { type_name: &'static str },
}

/// Errors while starting the graph
#[derive(Error, Debug, Clone)]
pub enum StartError {
    /// A factory or a `Lifecycle::init` failed
    #[error("construction of '{component}' failed: {error}")]
    Construction {
        component: &'static str,
        error: Arc<DynError>,
    },
    #[error(transparent)]
    Wiring(#[from] WiringError),
    /// Startup did not finish within the configured timeout
    #[error("graph startup timed out")]
    Timeout,
}

/// A single release that went wrong during teardown
#[derive(Error, Debug, Clone)]
pub enum ReleaseFailure {
    #[error("release of '{component}' failed: {error}")]
    Failed {
        component: &'static str,
        error: Arc<DynError>,
    },
    #[error("release of '{component}' timed out after {grace:?}")]
    TimedOut {
        component: &'static str,
        grace: Duration,
    },
}

/// Teardown completed, but some releases failed.
///
/// Best effort: every node was still given its release call.
#[derive(Error, Debug, Clone)]
pub struct ShutdownError {
    pub failures: Vec<ReleaseFailure>,
}
impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("graph shutdown had one or more failures:".to_string());
        for failure in &self.failures {
            display.push(format!("- {failure}"));
        }
        f.write_str(&display.join("\n"))
    }
}
