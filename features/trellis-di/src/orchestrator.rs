use std::{
    any::TypeId,
    collections::HashMap,
    sync::Arc,
    thread,
    time::Duration,
};

use futures::{
    future::{BoxFuture, Fuse},
    stream::FuturesUnordered,
    FutureExt, StreamExt,
};
use futures_channel::oneshot;

use crate::{
    builder::{Convert, Produce},
    container::Container,
    errors::{ReleaseFailure, StartError},
    graph::{NodeMeta, Plan, ResolvedClaim},
    resolver::DepHandle,
    store::{NodeState, NodeStore},
    types::{DynError, Instance},
};

/// Startup knobs.
pub struct StartOptions {
    /// Overall limit for the whole startup
    pub timeout: Option<Duration>,
    /// How long each release may take before it is abandoned
    pub release_grace: Duration,
}
impl Default for StartOptions {
    fn default() -> Self {
        StartOptions {
            timeout: None,
            release_grace: Duration::from_secs(10),
        }
    }
}

/// Fires once after the given duration.
///
/// We don't join the thread - it will just die after the timeout.
pub(crate) fn delay(duration: Duration) -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        thread::sleep(duration);
        let _ = tx.send(());
    });
    rx
}

type NodeResult = (usize, Result<Instance, DynError>);
type Running = FuturesUnordered<BoxFuture<'static, NodeResult>>;

impl Plan {
    /// Initialize every node, dependencies before dependents.
    ///
    /// Nodes without a hard path between them construct concurrently. On the
    /// first factory or `init` failure no further nodes are issued, in-flight
    /// ones settle, everything that reached ready is released in reverse
    /// completion order and the original error is returned.
    pub async fn start(self, options: StartOptions) -> Result<Container, StartError> {
        let Plan {
            nodes,
            dependents,
            mut indegree,
            store,
        } = self;
        let count = nodes.len();

        let mut metas = Vec::with_capacity(count);
        let mut produces: Vec<Option<(Produce, Arc<[ResolvedClaim]>)>> =
            Vec::with_capacity(count);
        for node in nodes {
            metas.push(node.meta);
            produces.push(Some((node.produce, node.resolved)));
        }

        tracing::debug!("initializing graph with {count} components");

        let mut running: Running = FuturesUnordered::new();
        let mut scheduled = vec![false; count];
        let mut completion: Vec<usize> = Vec::with_capacity(count);

        let mut schedule = |index: usize, running: &mut Running| {
            scheduled[index] = true;
            let (produce, claims) = match produces[index].take() {
                Some(taken) => taken,
                None => return,
            };
            store.set_building(index);
            tracing::debug!("constructing '{}'", metas[index].name);
            let handle = DepHandle {
                node: index,
                store: store.clone(),
                claims,
            };
            let lifecycle = metas[index].capabilities.lifecycle;
            running.push(Box::pin(async move {
                let result: Result<Instance, DynError> = async {
                    let instance = match produce {
                        Produce::Prebuilt(instance) => instance,
                        Produce::Factory(mut factory) => factory.construct(handle).await?,
                    };
                    if let Some(view) = lifecycle {
                        if let Some(lifecycle) = view(&instance) {
                            lifecycle.init().await?;
                        }
                    }
                    Ok(instance)
                }
                .await;
                (index, result)
            }));
        };

        for index in 0..count {
            if indegree[index] == 0 {
                schedule(index, &mut running);
            }
        }

        let mut timeout = match options.timeout {
            Some(duration) => delay(duration).fuse(),
            None => Fuse::terminated(),
        };

        let mut failure: Option<StartError> = None;
        while !running.is_empty() {
            futures::select! {
                completed = running.select_next_some() => {
                    let (index, result) = completed;
                    match result {
                        Ok(instance) => {
                            if let Err(wiring) = store.make_ready(index, instance) {
                                failure = Some(wiring.into());
                                break;
                            }
                            completion.push(index);
                            tracing::debug!(
                                "'{}' is ready [{} of {count}]",
                                metas[index].name,
                                completion.len(),
                            );
                            for &dependent in &dependents[index] {
                                indegree[dependent] -= 1;
                                if indegree[dependent] == 0 {
                                    schedule(dependent, &mut running);
                                }
                            }
                        }
                        Err(error) => {
                            tracing::error!(
                                "construction of '{}' failed: {error}",
                                metas[index].name
                            );
                            store.fail(index);
                            failure = Some(StartError::Construction {
                                component: metas[index].name,
                                error: Arc::new(error),
                            });
                            break;
                        }
                    }
                }
                _ = timeout => {
                    tracing::error!("graph startup timed out");
                    failure = Some(StartError::Timeout);
                    break;
                }
            }
        }
        drop(schedule);

        if let Some(error) = failure {
            // Stop issuing work and wake everything suspended on a node that
            // will never come
            for index in 0..count {
                if !scheduled[index] {
                    store.fail(index);
                }
            }
            match &error {
                StartError::Timeout => {
                    // In-flight factories may hang forever, cancel them
                    running.clear();
                    for index in 0..count {
                        if store.state(index) == NodeState::Building {
                            store.fail(index);
                        }
                    }
                }
                _ => settle_in_flight(&mut running, &store, &metas, &mut completion).await,
            }
            rollback(&store, &metas, &completion, options.release_grace).await;
            return Err(error);
        }

        tracing::debug!("all components ready");
        Ok(Container::new(
            store,
            metas,
            completion,
            options.release_grace,
        ))
    }
}

/// Wait for already issued constructions to settle after a failure.
///
/// Nodes that still finish reach ready and are rolled back with the rest.
async fn settle_in_flight(
    running: &mut Running,
    store: &NodeStore,
    metas: &[NodeMeta],
    completion: &mut Vec<usize>,
) {
    while let Some((index, result)) = running.next().await {
        match result {
            Ok(instance) => match store.make_ready(index, instance) {
                Ok(()) => completion.push(index),
                Err(wiring) => tracing::error!("{wiring}"),
            },
            Err(error) => {
                store.fail(index);
                tracing::warn!(
                    "'{}' settled with an error during abort: {error}",
                    metas[index].name
                );
            }
        }
    }
}

async fn rollback(
    store: &NodeStore,
    metas: &[NodeMeta],
    completion: &[usize],
    grace: Duration,
) {
    for &index in completion.iter().rev() {
        if let Err(failure) = release_node(store, &metas[index], index, grace).await {
            tracing::error!("rollback: {failure}");
        }
    }
}

/// Release one ready node, bounded by the grace period.
///
/// The store's instance reference is dropped regardless of the outcome.
pub(crate) async fn release_node(
    store: &NodeStore,
    meta: &NodeMeta,
    index: usize,
    grace: Duration,
) -> Result<(), ReleaseFailure> {
    let result = match meta.capabilities.lifecycle {
        Some(view) => {
            let lifecycle = store
                .read_instance(index)
                .ok()
                .flatten()
                .and_then(|instance| view(&instance));
            match lifecycle {
                Some(lifecycle) => {
                    let mut release = lifecycle.release().fuse();
                    let mut timer = delay(grace);
                    futures::select! {
                        released = release => released.map_err(|error| ReleaseFailure::Failed {
                            component: meta.name,
                            error: Arc::new(error),
                        }),
                        _ = timer => Err(ReleaseFailure::TimedOut {
                            component: meta.name,
                            grace,
                        }),
                    }
                }
                None => Ok(()),
            }
        }
        None => Ok(()),
    };
    store.mark_released(index);
    tracing::debug!("released '{}'", meta.name);
    result
}

/// Keyed lookup table for [`Container::require`], primary keys plus binds.
pub(crate) fn by_type_table(
    metas: &[NodeMeta],
) -> HashMap<TypeId, Vec<(usize, Option<Convert>)>> {
    let mut table: HashMap<TypeId, Vec<(usize, Option<Convert>)>> = HashMap::new();
    for (index, meta) in metas.iter().enumerate() {
        table
            .entry(meta.key.type_info.type_id)
            .or_default()
            .push((index, None));
        for (info, convert) in &meta.bindings {
            table
                .entry(info.type_id)
                .or_default()
                .push((index, Some(convert.clone())));
        }
    }
    table
}
