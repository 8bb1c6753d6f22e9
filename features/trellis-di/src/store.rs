use std::{
    collections::HashMap,
    sync::Mutex,
};

use futures_channel::oneshot;

use crate::{
    errors::{ResolveError, WiringError},
    types::Instance,
};

/// Construction state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    Unbuilt,
    Building,
    Ready,
    Failed,
    Released,
}

enum SlotState {
    /// Not resolved yet, waiters are woken on any transition
    Pending { waiters: Vec<oneshot::Sender<()>> },
    Resolved(Instance),
    /// Startup failed before this slot was resolved
    Aborted,
    /// Resolved once, then released
    Cleared,
}

/// Single-assignment cell holding a node's instance.
///
/// This is also the backing store of every deferred handle pointing at the
/// node: readers may obtain the cell long before resolution and suspend on
/// [`NodeSlot::wait`] until the instance arrives.
pub(crate) struct NodeSlot {
    state: Mutex<SlotState>,
}

impl NodeSlot {
    fn new() -> Self {
        NodeSlot {
            state: Mutex::new(SlotState::Pending {
                waiters: Vec::new(),
            }),
        }
    }

    /// Assign the instance, waking every waiter. Fails on a second call.
    fn resolve(&self, component: &'static str, instance: Instance) -> Result<(), WiringError> {
        let mut state = self.state.lock().unwrap();
        match std::mem::replace(&mut *state, SlotState::Resolved(instance)) {
            SlotState::Pending { waiters } => {
                for waiter in waiters {
                    let _ = waiter.send(());
                }
                Ok(())
            }
            SlotState::Aborted => {
                // Startup already failed, the value is dropped with the slot
                *state = SlotState::Aborted;
                Ok(())
            }
            previous @ (SlotState::Resolved(_) | SlotState::Cleared) => {
                *state = previous;
                Err(WiringError::PromiseAlreadyResolved { component })
            }
        }
    }

    fn abort(&self) {
        let mut state = self.state.lock().unwrap();
        match std::mem::replace(&mut *state, SlotState::Aborted) {
            SlotState::Pending { waiters } => {
                for waiter in waiters {
                    let _ = waiter.send(());
                }
            }
            // Only a pending slot can be aborted
            previous => *state = previous,
        }
    }

    fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, SlotState::Resolved(_)) {
            *state = SlotState::Cleared;
        }
    }

    fn read(&self, component: &'static str) -> Result<Option<Instance>, ResolveError> {
        match &*self.state.lock().unwrap() {
            SlotState::Pending { .. } => Ok(None),
            SlotState::Resolved(instance) => Ok(Some(instance.clone())),
            SlotState::Aborted => Err(ResolveError::Aborted),
            SlotState::Cleared => Err(ResolveError::Unavailable { component }),
        }
    }

    async fn wait(&self, component: &'static str) -> Result<Instance, ResolveError> {
        loop {
            let rx = {
                let mut state = self.state.lock().unwrap();
                match &mut *state {
                    SlotState::Resolved(instance) => return Ok(instance.clone()),
                    SlotState::Aborted => return Err(ResolveError::Aborted),
                    SlotState::Cleared => return Err(ResolveError::Unavailable { component }),
                    SlotState::Pending { waiters } => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        rx
                    }
                }
            };
            // A cancellation also wakes us, the loop re-reads the state
            let _ = rx.await;
        }
    }
}

struct NodeEntry {
    name: &'static str,
    state: Mutex<NodeState>,
    slot: NodeSlot,
}

/// Arena of runtime node records, addressed by plan index.
///
/// Only the store transitions node states; everything else reads. It also
/// tracks which other nodes each building node currently awaits, so that a
/// handle read that can never complete is reported instead of hanging.
pub(crate) struct NodeStore {
    nodes: Vec<NodeEntry>,
    hard_deps: Vec<Vec<usize>>,
    wait_edges: Mutex<HashMap<usize, Vec<usize>>>,
}

impl NodeStore {
    pub fn new(names: Vec<&'static str>, hard_deps: Vec<Vec<usize>>) -> Self {
        let nodes = names
            .into_iter()
            .map(|name| NodeEntry {
                name,
                state: Mutex::new(NodeState::Unbuilt),
                slot: NodeSlot::new(),
            })
            .collect();
        NodeStore {
            nodes,
            hard_deps,
            wait_edges: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self, index: usize) -> &'static str {
        self.nodes[index].name
    }

    pub fn state(&self, index: usize) -> NodeState {
        *self.nodes[index].state.lock().unwrap()
    }

    pub fn set_building(&self, index: usize) {
        *self.nodes[index].state.lock().unwrap() = NodeState::Building;
    }

    /// Cache the instance and mark the node ready, exactly once.
    pub fn make_ready(&self, index: usize, instance: Instance) -> Result<(), WiringError> {
        let entry = &self.nodes[index];
        entry.slot.resolve(entry.name, instance)?;
        *entry.state.lock().unwrap() = NodeState::Ready;
        Ok(())
    }

    /// Mark a node failed and wake everything suspended on it.
    pub fn fail(&self, index: usize) {
        let entry = &self.nodes[index];
        *entry.state.lock().unwrap() = NodeState::Failed;
        entry.slot.abort();
    }

    /// Drop the store's instance reference after release.
    pub fn mark_released(&self, index: usize) {
        let entry = &self.nodes[index];
        *entry.state.lock().unwrap() = NodeState::Released;
        entry.slot.clear();
    }

    pub fn read_instance(&self, index: usize) -> Result<Option<Instance>, ResolveError> {
        let entry = &self.nodes[index];
        entry.slot.read(entry.name)
    }

    /// Obtain the target's instance, suspending until it is ready.
    ///
    /// `requester` is the node whose claim is being resolved. While that node
    /// is still building, the wait is recorded and checked against the
    /// blocking structure of the graph first: if the target can only become
    /// ready after the requester itself, the wiring is broken and we fail
    /// fast instead of suspending forever.
    pub async fn demand(
        &self,
        requester: Option<usize>,
        target: usize,
    ) -> Result<Instance, ResolveError> {
        let entry = &self.nodes[target];
        if let Some(instance) = entry.slot.read(entry.name)? {
            return Ok(instance);
        }

        let guard = match requester {
            Some(requester) if self.state(requester) == NodeState::Building => {
                if let Some(path) = self.find_block_path(requester, target) {
                    return Err(WiringError::ResolutionDeadlock { path }.into());
                }
                // A building node can await several handles at once, each
                // registers its own edge
                self.wait_edges
                    .lock()
                    .unwrap()
                    .entry(requester)
                    .or_default()
                    .push(target);
                Some(WaitEdgeGuard {
                    store: self,
                    requester,
                    target,
                })
            }
            _ => None,
        };

        let result = entry.slot.wait(entry.name).await;
        drop(guard);
        result
    }

    /// Walk everything that keeps `target` from becoming ready - unfinished
    /// hard dependencies and every outstanding wait of any building node -
    /// looking for a path back to `requester`.
    fn find_block_path(&self, requester: usize, target: usize) -> Option<Vec<&'static str>> {
        let wait_edges = self.wait_edges.lock().unwrap();

        let mut previous: HashMap<usize, usize> = HashMap::new();
        let mut stack = vec![target];
        while let Some(node) = stack.pop() {
            if node == requester {
                // Rebuild requester -> target -> ... -> requester
                let mut path = vec![node];
                let mut current = node;
                while let Some(&from) = previous.get(&current) {
                    path.push(from);
                    current = from;
                }
                path.push(requester);
                path.reverse();
                return Some(path.iter().map(|&i| self.name(i)).collect());
            }

            let mut visit = |next: usize| {
                if next != target && !previous.contains_key(&next) {
                    previous.insert(next, node);
                    stack.push(next);
                }
            };
            if self.state(node) != NodeState::Ready {
                for &dep in &self.hard_deps[node] {
                    if self.state(dep) != NodeState::Ready {
                        visit(dep);
                    }
                }
            }
            if let Some(awaited) = wait_edges.get(&node) {
                for &next in awaited {
                    visit(next);
                }
            }
        }
        None
    }
}

/// Removes exactly the edge its demand registered, leaving the requester's
/// other outstanding waits in place.
struct WaitEdgeGuard<'a> {
    store: &'a NodeStore,
    requester: usize,
    target: usize,
}
impl Drop for WaitEdgeGuard<'_> {
    fn drop(&mut self) {
        let mut edges = self.store.wait_edges.lock().unwrap();
        if let Some(waits) = edges.get_mut(&self.requester) {
            if let Some(position) = waits.iter().position(|&t| t == self.target) {
                waits.swap_remove(position);
            }
            if waits.is_empty() {
                edges.remove(&self.requester);
            }
        }
    }
}
