use std::sync::Arc;

use futures::executor::block_on;
use trellis_di::{
    All, ComponentFactory, Container, DepHandle, DependencyClaim, DynError, PromiseOf, Registry,
    ResolveError, StartError, StartOptions, Tagged, TypeToken, ValueOf, Wrapped,
};

fn start(registry: Registry) -> Container {
    let plan = registry.plan().unwrap();
    block_on(plan.start(StartOptions::default())).unwrap()
}

struct Metrics;

struct Service {
    metrics: Option<Arc<Metrics>>,
}
struct ServiceFactory;
impl ComponentFactory for ServiceFactory {
    type Provides = Service;

    fn claims() -> Vec<DependencyClaim> {
        vec![DependencyClaim::optional::<Metrics>()]
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Service, DynError> {
        Ok(Service {
            metrics: deps.resolve().await?,
        })
    }
}

#[test]
fn optional_resolves_to_none_when_absent() {
    let container = start(Registry::new().add_factory(ServiceFactory));
    let service = container.require::<Service>().unwrap();
    assert!(service.metrics.is_none());
}

#[test]
fn optional_resolves_when_present() {
    let container = start(
        Registry::new()
            .add_instance(Metrics)
            .add_factory(ServiceFactory),
    );
    let service = container.require::<Service>().unwrap();
    assert!(service.metrics.is_some());
}

struct Handler {
    label: &'static str,
}

// Tags
struct First;
struct Second;
struct Third;

struct Mux {
    handlers: All<Handler>,
}
struct MuxFactory;
impl ComponentFactory for MuxFactory {
    type Provides = Mux;

    fn claims() -> Vec<DependencyClaim> {
        vec![DependencyClaim::all::<Handler>()]
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Mux, DynError> {
        Ok(Mux {
            handlers: deps.resolve().await?,
        })
    }
}

#[test]
fn all_collects_every_instance_in_order() {
    let container = start(
        Registry::new()
            .register_instance(Handler { label: "second" })
            .tagged::<Second>()
            .ordered(5)
            .done()
            .register_instance(Handler { label: "first" })
            .tagged::<First>()
            .ordered(-1)
            .done()
            .register_instance(Handler { label: "third" })
            .tagged::<Third>()
            .ordered(9)
            .done()
            .add_factory(MuxFactory),
    );
    let mux = container.require::<Mux>().unwrap();
    assert_eq!(mux.handlers.len(), 3);
    let labels = mux.handlers.map(|h| h.label);
    assert_eq!(labels, ["first", "second", "third"]);
}

struct Conn {
    url: &'static str,
}

struct Primary;
struct Replica;

struct Writer {
    conn: Tagged<Conn, Primary>,
}
struct WriterFactory;
impl ComponentFactory for WriterFactory {
    type Provides = Writer;

    fn claims() -> Vec<DependencyClaim> {
        vec![DependencyClaim::single::<Conn>().with_tag::<Primary>()]
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Writer, DynError> {
        Ok(Writer {
            conn: deps.resolve().await?,
        })
    }
}

#[test]
fn tagged_claim_selects_the_matching_definition() {
    let container = start(
        Registry::new()
            .register_instance(Conn { url: "primary" })
            .tagged::<Primary>()
            .done()
            .register_instance(Conn { url: "replica" })
            .tagged::<Replica>()
            .done()
            .add_factory(WriterFactory),
    );
    let writer = container.require::<Writer>().unwrap();
    assert_eq!(writer.conn.url, "primary");
}

struct Config {
    value: u32,
}

struct Late {
    config: ValueOf<Config>,
}
struct LateFactory;
impl ComponentFactory for LateFactory {
    type Provides = Late;

    fn claims() -> Vec<DependencyClaim> {
        vec![DependencyClaim::lazy::<Config>()]
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Late, DynError> {
        Ok(Late {
            config: deps.resolve().await?,
        })
    }
}

#[test]
fn lazy_handle_reads_after_startup() {
    let container = start(
        Registry::new()
            .add_factory(LateFactory)
            .add_instance(Config { value: 7 }),
    );
    let late = container.require::<Late>().unwrap();
    assert_eq!(block_on(late.config.get()).unwrap().value, 7);
    assert!(late.config.try_get().is_some());
}

struct Frontend {
    backend: Arc<Backend>,
}
struct FrontendFactory;
impl ComponentFactory for FrontendFactory {
    type Provides = Frontend;

    fn claims() -> Vec<DependencyClaim> {
        vec![DependencyClaim::single::<Backend>()]
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Frontend, DynError> {
        Ok(Frontend {
            backend: deps.resolve().await?,
        })
    }
}

struct Backend {
    frontend: PromiseOf<Frontend>,
}
struct BackendFactory;
impl ComponentFactory for BackendFactory {
    type Provides = Backend;

    fn claims() -> Vec<DependencyClaim> {
        vec![DependencyClaim::deferred::<Frontend>()]
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Backend, DynError> {
        Ok(Backend {
            frontend: deps.resolve().await?,
        })
    }
}

#[test]
fn deferred_cycle_resolves_after_startup() {
    let container = start(
        Registry::new()
            .add_factory(FrontendFactory)
            .add_factory(BackendFactory),
    );
    let backend = container.require::<Backend>().unwrap();
    let frontend = block_on(backend.frontend.get()).unwrap();
    assert!(Arc::ptr_eq(
        &frontend.backend,
        &container.require::<Backend>().unwrap()
    ));
}

struct Ping;
struct PingFactory;
impl ComponentFactory for PingFactory {
    type Provides = Ping;

    fn claims() -> Vec<DependencyClaim> {
        vec![DependencyClaim::lazy::<Pong>()]
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Ping, DynError> {
        let pong: ValueOf<Pong> = deps.resolve().await?;
        pong.get().await?;
        Ok(Ping)
    }
}

struct Pong;
struct PongFactory;
impl ComponentFactory for PongFactory {
    type Provides = Pong;

    fn claims() -> Vec<DependencyClaim> {
        vec![DependencyClaim::lazy::<Ping>()]
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Pong, DynError> {
        let ping: ValueOf<Ping> = deps.resolve().await?;
        ping.get().await?;
        Ok(Pong)
    }
}

struct Fan;
struct FanFactory;
impl ComponentFactory for FanFactory {
    type Provides = Fan;

    fn claims() -> Vec<DependencyClaim> {
        vec![
            DependencyClaim::lazy::<Echo>(),
            DependencyClaim::lazy::<Relay>(),
        ]
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Fan, DynError> {
        let echo: ValueOf<Echo> = deps.resolve().await?;
        let relay: ValueOf<Relay> = deps.resolve().await?;
        let (echo, relay) = futures::join!(echo.get(), relay.get());
        echo?;
        relay?;
        Ok(Fan)
    }
}

struct Echo;
struct EchoFactory;
impl ComponentFactory for EchoFactory {
    type Provides = Echo;

    fn claims() -> Vec<DependencyClaim> {
        vec![DependencyClaim::lazy::<Fan>()]
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Echo, DynError> {
        let fan: ValueOf<Fan> = deps.resolve().await?;
        fan.get().await?;
        Ok(Echo)
    }
}

struct Relay;
struct RelayFactory;
impl ComponentFactory for RelayFactory {
    type Provides = Relay;

    fn claims() -> Vec<DependencyClaim> {
        Vec::new()
    }

    async fn construct(&mut self, _deps: DepHandle) -> Result<Relay, DynError> {
        Ok(Relay)
    }
}

#[test]
fn concurrent_lazy_waits_still_detect_a_deadlock() {
    // Fan awaits Echo and Relay at once; the mutual Fan/Echo wait must be
    // reported even though Fan's wait on Relay is legitimate
    let plan = Registry::new()
        .add_factory(FanFactory)
        .add_factory(EchoFactory)
        .add_factory(RelayFactory)
        .plan()
        .unwrap();
    let err = block_on(plan.start(StartOptions::default())).unwrap_err();
    match err {
        StartError::Construction { error, .. } => {
            assert!(error.to_string().contains("deadlock"), "got: {error}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn mutual_waits_fail_as_a_deadlock() {
    let plan = Registry::new()
        .add_factory(PingFactory)
        .add_factory(PongFactory)
        .plan()
        .unwrap();
    let err = block_on(plan.start(StartOptions::default())).unwrap_err();
    match err {
        StartError::Construction { error, .. } => {
            assert!(error.to_string().contains("deadlock"), "got: {error}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

trait Notifier: Send + Sync + 'static {
    fn channel(&self) -> &'static str;
}

struct Email;
impl Notifier for Email {
    fn channel(&self) -> &'static str {
        "email"
    }
}

struct Alerts {
    notifier: Arc<dyn Notifier>,
}
struct AlertsFactory;
impl ComponentFactory for AlertsFactory {
    type Provides = Alerts;

    fn claims() -> Vec<DependencyClaim> {
        vec![DependencyClaim::single::<Arc<dyn Notifier>>()]
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Alerts, DynError> {
        let notifier: Arc<Arc<dyn Notifier>> = deps.resolve().await?;
        Ok(Alerts {
            notifier: (*notifier).clone(),
        })
    }
}

#[test]
fn binds_serve_trait_object_claims() {
    let container = start(
        Registry::new()
            .register_instance(Email)
            .binds::<Arc<dyn Notifier>>(|email| email as Arc<dyn Notifier>)
            .done()
            .add_factory(AlertsFactory),
    );
    let alerts = container.require::<Alerts>().unwrap();
    assert_eq!(alerts.notifier.channel(), "email");

    // The bind key is also visible to direct lookup
    let direct = container.require::<Arc<dyn Notifier>>().unwrap();
    assert_eq!(direct.channel(), "email");
}

struct Payload;

struct Dispatcher {
    token: TypeToken<Payload>,
}
struct DispatcherFactory;
impl ComponentFactory for DispatcherFactory {
    type Provides = Dispatcher;

    fn claims() -> Vec<DependencyClaim> {
        vec![DependencyClaim::type_token::<Payload>()]
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Dispatcher, DynError> {
        Ok(Dispatcher {
            token: deps.resolve().await?,
        })
    }
}

#[test]
fn type_token_resolves_without_a_definition() {
    let container = start(Registry::new().add_factory(DispatcherFactory));
    let dispatcher = container.require::<Dispatcher>().unwrap();
    assert!(dispatcher.token.type_name().ends_with("::Payload"));
}

struct Sneaky;
struct SneakyFactory;
impl ComponentFactory for SneakyFactory {
    type Provides = Sneaky;

    fn claims() -> Vec<DependencyClaim> {
        Vec::new()
    }

    async fn construct(&mut self, deps: DepHandle) -> Result<Sneaky, DynError> {
        let _config: Arc<Config> = deps.resolve().await?;
        Ok(Sneaky)
    }
}

#[test]
fn undeclared_requests_are_rejected() {
    let plan = Registry::new()
        .add_instance(Config { value: 1 })
        .add_factory(SneakyFactory)
        .plan()
        .unwrap();
    let err = block_on(plan.start(StartOptions::default())).unwrap_err();
    match err {
        StartError::Construction { component, error } => {
            assert!(component.ends_with("::Sneaky"));
            assert!(error.to_string().contains("undeclared"), "got: {error}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

struct Listener {
    port: u16,
}
impl Wrapped<u16> for Listener {
    fn value(&self) -> u16 {
        self.port
    }
}

#[test]
fn wrapped_components_expose_their_resource() {
    let container = start(
        Registry::new()
            .register_instance(Listener { port: 8080 })
            .binds::<Arc<dyn Wrapped<u16>>>(|listener| listener as Arc<dyn Wrapped<u16>>)
            .done(),
    );
    let raw = container.require::<Arc<dyn Wrapped<u16>>>().unwrap();
    assert_eq!(raw.value(), 8080);
}

#[test]
fn require_reports_missing_and_ambiguous_types() {
    let container = start(
        Registry::new()
            .register_instance(Handler { label: "a" })
            .tagged::<First>()
            .done()
            .register_instance(Handler { label: "b" })
            .tagged::<Second>()
            .done(),
    );
    assert!(matches!(
        container.require::<Config>(),
        Err(ResolveError::NoCandidate { .. })
    ));
    assert!(matches!(
        container.require::<Handler>(),
        Err(ResolveError::Ambiguous { .. })
    ));
}
