use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures::{executor::block_on, future::BoxFuture};
use trellis_di::{LivenessProbe, ProbeFailure, ReadinessProbe, Registry, StartOptions};

struct Gate {
    closed: Arc<AtomicBool>,
}
impl ReadinessProbe for Gate {
    fn probe(&self) -> BoxFuture<'_, Option<ProbeFailure>> {
        Box::pin(async move {
            self.closed
                .load(Ordering::SeqCst)
                .then(|| ProbeFailure::new("gate closed"))
        })
    }
}
impl LivenessProbe for Gate {
    fn probe(&self) -> BoxFuture<'_, Option<ProbeFailure>> {
        Box::pin(async move { None })
    }
}

#[test]
fn readiness_follows_the_component_lifecycle() {
    let closed = Arc::new(AtomicBool::new(false));
    let plan = Registry::new()
        .register_instance(Gate {
            closed: closed.clone(),
        })
        .with_readiness()
        .with_liveness()
        .done()
        .plan()
        .unwrap();
    let health = plan.health();

    // Probing is legal before startup
    let early = block_on(health.readiness()).unwrap_err();
    assert_eq!(early.reason, "initializing");

    let container = block_on(plan.start(StartOptions::default())).unwrap();
    assert!(block_on(health.readiness()).is_ok());
    assert!(block_on(health.liveness()).is_ok());

    closed.store(true, Ordering::SeqCst);
    let failing = block_on(container.health().readiness()).unwrap_err();
    assert_eq!(failing.reason, "gate closed");
    assert!(block_on(health.liveness()).is_ok());

    block_on(container.shutdown()).unwrap();
    let released = block_on(health.readiness()).unwrap_err();
    assert_eq!(released.reason, "released");
}

#[test]
fn components_without_probes_are_always_ready() {
    let plan = Registry::new()
        .add_instance("config".to_string())
        .plan()
        .unwrap();
    let health = plan.health();
    assert!(block_on(health.readiness()).is_ok());

    let container = block_on(plan.start(StartOptions::default())).unwrap();
    assert!(block_on(container.health().liveness()).is_ok());
}
