use std::{
    any::TypeId,
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use crate::{
    builder::{ComponentDefinition, Convert, Produce},
    claim::{Cardinality, DependencyClaim},
    errors::BuildError,
    lifecycle::Capabilities,
    store::NodeStore,
    types::{TypeInfo, TypeKey},
};

/// One build-time resolved target of a claim.
#[derive(Clone)]
pub(crate) struct ClaimTarget {
    pub index: usize,
    pub convert: Option<Convert>,
}

/// Targets of a claim, fixed when the plan is computed.
#[derive(Clone)]
pub(crate) enum ResolvedTargets {
    One(ClaimTarget),
    Opt(Option<ClaimTarget>),
    Many(Vec<ClaimTarget>),
    Token,
}

#[derive(Clone)]
pub(crate) struct ResolvedClaim {
    pub claim: DependencyClaim,
    pub targets: ResolvedTargets,
}

/// Static facts about a node, shared with the container and health handles.
#[derive(Clone)]
pub(crate) struct NodeMeta {
    pub key: TypeKey,
    pub name: &'static str,
    pub capabilities: Capabilities,
    pub bindings: Vec<(TypeInfo, Convert)>,
}

pub(crate) struct PlanNode {
    pub meta: NodeMeta,
    pub produce: Produce,
    pub resolved: Arc<[ResolvedClaim]>,
    pub hard_deps: Vec<usize>,
}

/// The ordered, acyclic execution plan.
///
/// Node index equals plan position; initialization walks indices upwards,
/// release runs in reverse of the recorded completion order. The plan owns
/// the node arena, so health can be probed before startup finishes.
pub struct Plan {
    pub(crate) nodes: Vec<PlanNode>,
    pub(crate) dependents: Vec<Vec<usize>>,
    pub(crate) indegree: Vec<usize>,
    pub(crate) store: Arc<NodeStore>,
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan").field("order", &self.order()).finish()
    }
}

impl Plan {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names in initialization order, mostly for logging and diagnostics
    pub fn order(&self) -> Vec<&'static str> {
        self.nodes.iter().map(|n| n.meta.name).collect()
    }
}

struct Candidate {
    def: usize,
    name: &'static str,
    tag: Option<TypeInfo>,
    order: i32,
    convert: Option<Convert>,
}

/// Resolve every claim, split hard from soft edges, and order the graph.
pub(crate) fn build(definitions: Vec<ComponentDefinition>) -> Result<Plan, BuildError> {
    let count = definitions.len();

    // Keyed candidate table: primary keys plus bind aliases
    let mut candidates: HashMap<TypeId, Vec<Candidate>> = HashMap::new();
    for (index, definition) in definitions.iter().enumerate() {
        let primary = Candidate {
            def: index,
            name: definition.key.type_info.type_name,
            tag: definition.key.tag,
            order: definition.order.unwrap_or(0),
            convert: None,
        };
        candidates
            .entry(definition.key.type_info.type_id)
            .or_default()
            .push(primary);
        for binding in &definition.bindings {
            candidates
                .entry(binding.type_info.type_id)
                .or_default()
                .push(Candidate {
                    def: index,
                    name: definition.key.type_info.type_name,
                    tag: definition.key.tag,
                    order: definition.order.unwrap_or(0),
                    convert: Some(binding.convert.clone()),
                });
        }
    }

    // Match claims to candidates; soft claims never become ordering edges
    let mut resolved: Vec<Vec<ResolvedClaim>> = Vec::with_capacity(count);
    let mut hard: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (index, definition) in definitions.iter().enumerate() {
        let required_by = definition.key.type_info.type_name;
        let mut claims = Vec::with_capacity(definition.claims.len());
        for claim in &definition.claims {
            let matches: Vec<&Candidate> = candidates
                .get(&claim.type_info.type_id)
                .map(|all| all.iter().filter(|c| claim.accepts(c.tag)).collect())
                .unwrap_or_default();

            let targets = match claim.cardinality {
                Cardinality::Single | Cardinality::Lazy | Cardinality::Deferred => {
                    ResolvedTargets::One(expect_single(claim, required_by, &matches)?)
                }
                Cardinality::Optional => match matches.len() {
                    0 => ResolvedTargets::Opt(None),
                    1 => ResolvedTargets::Opt(Some(target_of(matches[0]))),
                    _ => return Err(ambiguous(claim, required_by, &matches)),
                },
                Cardinality::All => {
                    let mut sorted: Vec<&Candidate> = matches.clone();
                    sorted.sort_by_key(|c| (c.order, c.def));
                    ResolvedTargets::Many(sorted.into_iter().map(target_of).collect())
                }
                Cardinality::TypeToken => ResolvedTargets::Token,
            };

            if matches!(
                claim.cardinality,
                Cardinality::Single | Cardinality::Optional | Cardinality::All
            ) {
                match &targets {
                    ResolvedTargets::One(t) => hard[index].push(t.index),
                    ResolvedTargets::Opt(Some(t)) => hard[index].push(t.index),
                    ResolvedTargets::Many(many) => {
                        hard[index].extend(many.iter().map(|t| t.index))
                    }
                    _ => {}
                }
            }

            claims.push(ResolvedClaim {
                claim: *claim,
                targets,
            });
        }
        resolved.push(claims);
    }

    for deps in &mut hard {
        deps.sort_unstable();
        deps.dedup();
    }

    // Deterministic Kahn sort over hard edges, ties by registration order
    let mut indegree: Vec<usize> = hard.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (index, deps) in hard.iter().enumerate() {
        for &dep in deps {
            dependents[dep].push(index);
        }
    }
    let mut ready: BTreeSet<usize> = (0..count).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        order.push(next);
        for &dependent in &dependents[next] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < count {
        let remaining: HashSet<usize> = (0..count).filter(|i| !order.contains(i)).collect();
        let chain = cycle_chain(&hard, &remaining);
        return Err(BuildError::UnbreakableCycle {
            chain: chain
                .iter()
                .map(|&i| definitions[i].key.type_info.type_name)
                .collect(),
        });
    }

    // Node index = plan position; remap everything accordingly
    let mut position = vec![0usize; count];
    for (new, &old) in order.iter().enumerate() {
        position[old] = new;
    }

    let mut slots: Vec<Option<ComponentDefinition>> =
        definitions.into_iter().map(Some).collect();
    let mut nodes = Vec::with_capacity(count);
    for &old in &order {
        let definition = slots[old].take().expect("each node appears once in the order");
        let mut claims = resolved[old].clone();
        for claim in &mut claims {
            remap(&mut claim.targets, &position);
        }
        let mut hard_deps: Vec<usize> = hard[old].iter().map(|&d| position[d]).collect();
        hard_deps.sort_unstable();
        nodes.push(PlanNode {
            meta: NodeMeta {
                key: definition.key,
                name: definition.key.type_info.type_name,
                capabilities: definition.capabilities,
                bindings: definition
                    .bindings
                    .into_iter()
                    .map(|b| (b.type_info, b.convert))
                    .collect(),
            },
            produce: definition.produce,
            resolved: claims.into(),
            hard_deps,
        });
    }

    let indegree: Vec<usize> = nodes.iter().map(|n| n.hard_deps.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (index, node) in nodes.iter().enumerate() {
        for &dep in &node.hard_deps {
            dependents[dep].push(index);
        }
    }

    let store = Arc::new(NodeStore::new(
        nodes.iter().map(|n| n.meta.name).collect(),
        nodes.iter().map(|n| n.hard_deps.clone()).collect(),
    ));

    tracing::debug!(
        nodes = count,
        "computed execution plan: {:?}",
        nodes.iter().map(|n| n.meta.name).collect::<Vec<_>>()
    );

    return Ok(Plan {
        nodes,
        dependents,
        indegree,
        store,
    });

    fn target_of(candidate: &Candidate) -> ClaimTarget {
        ClaimTarget {
            index: candidate.def,
            convert: candidate.convert.clone(),
        }
    }

    fn expect_single(
        claim: &DependencyClaim,
        required_by: &'static str,
        matches: &[&Candidate],
    ) -> Result<ClaimTarget, BuildError> {
        match matches {
            [] => Err(BuildError::NoCandidate {
                claim: claim.to_string(),
                required_by,
            }),
            [single] => Ok(target_of(single)),
            _ => Err(ambiguous(claim, required_by, matches)),
        }
    }

    fn ambiguous(
        claim: &DependencyClaim,
        required_by: &'static str,
        matches: &[&Candidate],
    ) -> BuildError {
        BuildError::AmbiguousCandidates {
            claim: claim.to_string(),
            required_by,
            candidates: matches.iter().map(|c| c.name).collect(),
        }
    }

    fn remap(targets: &mut ResolvedTargets, position: &[usize]) {
        match targets {
            ResolvedTargets::One(t) => t.index = position[t.index],
            ResolvedTargets::Opt(Some(t)) => t.index = position[t.index],
            ResolvedTargets::Many(many) => {
                for t in many {
                    t.index = position[t.index];
                }
            }
            _ => {}
        }
    }

    /// Walk unfinished hard dependencies until a node repeats.
    ///
    /// Every node left over by the sort has at least one unfinished
    /// dependency, so the walk always closes a cycle.
    fn cycle_chain(hard: &[Vec<usize>], remaining: &HashSet<usize>) -> Vec<usize> {
        let mut seen: HashMap<usize, usize> = HashMap::new();
        let mut path = Vec::new();
        let mut current = *remaining.iter().min().unwrap_or(&0);
        loop {
            if let Some(&first) = seen.get(&current) {
                path.push(current);
                return path[first..].to_vec();
            }
            seen.insert(current, path.len());
            path.push(current);
            current = hard[current]
                .iter()
                .copied()
                .find(|d| remaining.contains(d))
                .unwrap_or(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ResolvedTargets;
    use crate::{
        builder::Registry,
        claim::DependencyClaim,
        errors::BuildError,
        factories::ComponentFactory,
        resolver::DepHandle,
        types::{DynError, TypeInfo},
    };

    macro_rules! factory {
        ($factory:ident -> $provides:ident, [$($claim:expr),* $(,)?]) => {
            struct $factory;
            impl ComponentFactory for $factory {
                type Provides = $provides;

                fn claims() -> Vec<DependencyClaim> {
                    vec![$($claim),*]
                }

                async fn construct(
                    &mut self,
                    _deps: DepHandle,
                ) -> Result<$provides, DynError> {
                    Ok($provides)
                }
            }
        };
    }

    struct Db;
    struct Cache;
    struct Api;
    struct Left;
    struct Right;
    struct Handler;
    struct Reader;
    struct Fanout;
    struct TokenUser;
    struct MaybeUser;
    struct Missing;

    // Tags
    struct Primary;
    struct Replica;
    struct Blue;
    struct Green;
    struct Red;

    factory!(DbFactory -> Db, []);
    factory!(CacheFactory -> Cache, [DependencyClaim::single::<Db>()]);
    factory!(ApiFactory -> Api, [
        DependencyClaim::single::<Cache>(),
        DependencyClaim::single::<Db>(),
    ]);
    factory!(LeftFactory -> Left, [DependencyClaim::single::<Right>()]);
    factory!(RightFactory -> Right, [DependencyClaim::single::<Left>()]);
    factory!(RightLazyFactory -> Right, [DependencyClaim::lazy::<Left>()]);
    factory!(LeftDeferredFactory -> Left, [DependencyClaim::deferred::<Right>()]);
    factory!(ReaderFactory -> Reader, [
        DependencyClaim::single::<Db>().with_tag::<Primary>(),
    ]);
    factory!(FanoutFactory -> Fanout, [DependencyClaim::all::<Handler>()]);
    factory!(TokenUserFactory -> TokenUser, [DependencyClaim::type_token::<Missing>()]);
    factory!(MaybeUserFactory -> MaybeUser, [DependencyClaim::optional::<Missing>()]);

    fn position(order: &[&'static str], suffix: &str) -> usize {
        order
            .iter()
            .position(|name| name.ends_with(suffix))
            .unwrap_or_else(|| panic!("{suffix} not found in {order:?}"))
    }

    #[test]
    fn dependencies_come_before_dependents() {
        let plan = Registry::new()
            .add_factory(ApiFactory)
            .add_factory(CacheFactory)
            .add_factory(DbFactory)
            .plan()
            .unwrap();
        let order = plan.order();
        assert!(position(&order, "::Db") < position(&order, "::Cache"));
        assert!(position(&order, "::Cache") < position(&order, "::Api"));
    }

    #[test]
    fn independent_nodes_keep_registration_order() {
        let plan = Registry::new()
            .add_instance(Cache)
            .add_instance(Api)
            .add_instance(Db)
            .plan()
            .unwrap();
        let order = plan.order();
        assert_eq!(position(&order, "::Cache"), 0);
        assert_eq!(position(&order, "::Api"), 1);
        assert_eq!(position(&order, "::Db"), 2);
    }

    #[test]
    fn missing_dependency_is_reported() {
        let err = Registry::new().add_factory(CacheFactory).plan().unwrap_err();
        match err {
            BuildError::NoCandidate { claim, required_by } => {
                assert!(required_by.ends_with("::Cache"));
                assert!(claim.contains("Db"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_candidates_are_ambiguous() {
        let err = Registry::new()
            .add_instance(Db)
            .add_instance(Db)
            .add_factory(CacheFactory)
            .plan()
            .unwrap_err();
        match err {
            BuildError::AmbiguousCandidates { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn tags_disambiguate_same_type() {
        let plan = Registry::new()
            .register_instance(Db)
            .tagged::<Primary>()
            .done()
            .register_instance(Db)
            .tagged::<Replica>()
            .done()
            .add_factory(ReaderFactory)
            .plan()
            .unwrap();
        let reader = position(&plan.order(), "::Reader");
        let ResolvedTargets::One(target) = &plan.nodes[reader].resolved[0].targets else {
            panic!("expected a single target");
        };
        assert_eq!(
            plan.nodes[target.index].meta.key.tag,
            Some(TypeInfo::of::<Primary>())
        );
    }

    #[test]
    fn untagged_claim_does_not_match_tagged_definitions() {
        let err = Registry::new()
            .register_instance(Db)
            .tagged::<Primary>()
            .done()
            .add_factory(CacheFactory)
            .plan()
            .unwrap_err();
        assert!(matches!(err, BuildError::NoCandidate { .. }));
    }

    #[test]
    fn hard_cycle_is_rejected() {
        let err = Registry::new()
            .add_factory(LeftFactory)
            .add_factory(RightFactory)
            .plan()
            .unwrap_err();
        match err {
            BuildError::UnbreakableCycle { chain } => {
                assert!(chain.iter().any(|name| name.ends_with("::Left")));
                assert!(chain.iter().any(|name| name.ends_with("::Right")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lazy_edge_breaks_a_cycle() {
        let plan = Registry::new()
            .add_factory(LeftFactory)
            .add_factory(RightLazyFactory)
            .plan()
            .unwrap();
        let order = plan.order();
        assert!(position(&order, "::Right") < position(&order, "::Left"));
    }

    #[test]
    fn deferred_edge_breaks_a_cycle() {
        let plan = Registry::new()
            .add_factory(LeftDeferredFactory)
            .add_factory(RightFactory)
            .plan()
            .unwrap();
        let order = plan.order();
        assert!(position(&order, "::Left") < position(&order, "::Right"));
    }

    #[test]
    fn all_orders_by_key_then_registration() {
        let plan = Registry::new()
            .register_instance(Handler)
            .tagged::<Blue>()
            .ordered(2)
            .done()
            .register_instance(Handler)
            .tagged::<Green>()
            .ordered(1)
            .done()
            .register_instance(Handler)
            .tagged::<Red>()
            .done()
            .add_factory(FanoutFactory)
            .plan()
            .unwrap();
        let fanout = position(&plan.order(), "::Fanout");
        let ResolvedTargets::Many(targets) = &plan.nodes[fanout].resolved[0].targets else {
            panic!("expected a collection");
        };
        let tags: Vec<&'static str> = targets
            .iter()
            .map(|t| plan.nodes[t.index].meta.key.tag.unwrap().type_name)
            .collect();
        assert!(tags[0].ends_with("::Red"));
        assert!(tags[1].ends_with("::Green"));
        assert!(tags[2].ends_with("::Blue"));
    }

    #[test]
    fn type_token_needs_no_definition() {
        let plan = Registry::new().add_factory(TokenUserFactory).plan().unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn optional_claim_tolerates_absence() {
        let plan = Registry::new().add_factory(MaybeUserFactory).plan().unwrap();
        let node = position(&plan.order(), "::MaybeUser");
        assert!(matches!(
            plan.nodes[node].resolved[0].targets,
            ResolvedTargets::Opt(None)
        ));
    }
}
