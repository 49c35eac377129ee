//! Graph declarations and the builder that resolves them into actors.
//!
//! Every wiring string is parsed and every target resolved exactly once, here.
//! Malformed or unresolvable wiring is logged and left out of the graph,
//! only declarations that cannot be told apart or addressed make the build fail.

use super::*;
use crate::{
    actors::{Actor, FilterActor, NodeActor, OutputEntry, Scope, Target},
    cell::{CellFactory, FilterFactory},
    config::ConfigError,
    messaging::{ActorId, DispatchIndex},
    wiring::{self, TargetSpec},
};
use hocon::{Hocon, HoconLoader};
use rustc_hash::FxHashMap;
use std::{error, fmt, rc::Rc};

/// Debug token that turns on per-message logging for a node.
pub const LOG_MESSAGES_FLAG: &str = "log";

/// Debug settings of a node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebugSettings {
    /// Debug tokens.
    pub flags: Vec<String>,
}

impl DebugSettings {
    /// Parse whitespace or comma separated tokens.
    pub fn from_flags(flags: &str) -> DebugSettings {
        let flags = flags
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        DebugSettings { flags }
    }

    /// Whether every message dispatched to the node should be logged.
    pub fn log_messages(&self) -> bool {
        self.flags.iter().any(|f| f == LOG_MESSAGES_FLAG)
    }
}

/// The declaration of a node.
#[derive(Clone, Debug)]
pub struct NodeDecl {
    /// The human readable name, also used for wireless lookups.
    pub name: String,
    /// The unique id, used by wiring strings.
    pub uid: String,
    /// Builds the node's cell.
    pub factory: CellFactory,
    /// Input descriptors such as `"=> pin"`.
    pub inputs: Vec<String>,
    /// Output descriptors such as `"out -> pin @ node (uid)"`.
    pub outputs: Vec<String>,
    /// Settings handed to the cell.
    pub sx: Hocon,
    /// Debug settings.
    pub dx: DebugSettings,
}

impl NodeDecl {
    /// Declare a node without any pins.
    pub fn new<N, U>(name: N, uid: U, factory: CellFactory) -> NodeDecl
    where
        N: Into<String>,
        U: Into<String>,
    {
        NodeDecl {
            name: name.into(),
            uid: uid.into(),
            factory,
            inputs: Vec::new(),
            outputs: Vec::new(),
            sx: Hocon::Null,
            dx: DebugSettings::default(),
        }
    }

    /// Add an input descriptor.
    pub fn input<S: Into<String>>(mut self, descriptor: S) -> Self {
        self.inputs.push(descriptor.into());
        self
    }

    /// Add an output descriptor.
    pub fn output<S: Into<String>>(mut self, descriptor: S) -> Self {
        self.outputs.push(descriptor.into());
        self
    }

    /// Replace the settings.
    pub fn settings(mut self, sx: Hocon) -> Self {
        self.sx = sx;
        self
    }

    /// Replace the settings with a parsed HOCON string.
    pub fn settings_str(self, sx: &str) -> Result<Self, ConfigError> {
        let hocon = HoconLoader::new().load_str(sx)?.hocon()?;
        Ok(self.settings(hocon))
    }

    /// Replace the debug flags.
    pub fn debug_flags(mut self, flags: &str) -> Self {
        self.dx = DebugSettings::from_flags(flags);
        self
    }
}

/// The declaration of a filter.
#[derive(Clone, Debug)]
pub struct FilterDecl {
    /// The human readable name, also used for wireless lookups.
    pub name: String,
    /// The unique id, used by wiring strings.
    pub uid: String,
    /// Builds the filter's cell, broadcasting if absent.
    pub filter: Option<FilterFactory>,
    /// Routing table lines such as `topic : "pin @ node (uid)"`.
    pub table: Vec<String>,
}

impl FilterDecl {
    /// Declare a broadcasting filter with an empty routing table.
    pub fn new<N, U>(name: N, uid: U) -> FilterDecl
    where
        N: Into<String>,
        U: Into<String>,
    {
        FilterDecl {
            name: name.into(),
            uid: uid.into(),
            filter: None,
            table: Vec::new(),
        }
    }

    /// Use `factory` for the filter cell.
    pub fn filter(mut self, factory: FilterFactory) -> Self {
        self.filter = Some(factory);
        self
    }

    /// Add a routing table line.
    pub fn route<S: Into<String>>(mut self, line: S) -> Self {
        self.table.push(line.into());
        self
    }
}

/// Declarations that cannot be turned into a graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphError {
    /// Two actors share a unique id.
    DuplicateUid(String),
    /// The actor called `name` has an empty unique id.
    EmptyUid {
        /// The actor's name.
        name: String,
    },
    /// The actor with this unique id has an empty name.
    EmptyName {
        /// The actor's unique id.
        uid: String,
    },
    /// An actor declares more pins or scopes than a dispatch index can address.
    TooManySlots {
        /// The actor's unique id.
        uid: String,
        /// The number of declared pins or scopes.
        count: usize,
    },
}

impl error::Error for GraphError {}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DuplicateUid(uid) => write!(f, "The uid '{}' is declared more than once.", uid),
            GraphError::EmptyUid { name } => write!(f, "Actor '{}' has an empty uid.", name),
            GraphError::EmptyName { uid } => write!(f, "Actor with uid '{}' has an empty name.", uid),
            GraphError::TooManySlots { uid, count } => write!(
                f,
                "Actor '{}' declares {} pins, at most {} are supported.",
                uid,
                count,
                DispatchIndex::MAX_SLOT + 1
            ),
        }
    }
}

/// A fully resolved actor graph.
pub struct Graph {
    actors: Vec<Actor>,
    by_uid: FxHashMap<String, ActorId>,
    by_name: FxHashMap<String, ActorId>,
}

impl Graph {
    /// Resolve `nodes` and `filters` into a graph.
    ///
    /// Nodes get the ids `0..nodes.len()`, filters the ones after, both in declaration order.
    pub fn build(
        nodes: &[NodeDecl],
        filters: &[FilterDecl],
        logger: &CellflowLogger,
    ) -> Result<Graph, GraphError> {
        let mut by_uid = FxHashMap::default();
        let mut by_name = FxHashMap::default();
        let declared = nodes
            .iter()
            .map(|n| (&n.name, &n.uid))
            .chain(filters.iter().map(|f| (&f.name, &f.uid)));
        for (index, (name, uid)) in declared.enumerate() {
            if uid.trim().is_empty() {
                return Err(GraphError::EmptyUid { name: name.clone() });
            }
            if name.trim().is_empty() {
                return Err(GraphError::EmptyName { uid: uid.clone() });
            }
            if by_uid.insert(uid.clone(), ActorId(index)).is_some() {
                return Err(GraphError::DuplicateUid(uid.clone()));
            }
            let key = name.to_lowercase();
            if by_name.contains_key(&key) {
                debug!(logger, "Name is not unique, wireless lookups find the first actor"; "name" => name.as_str());
            } else {
                by_name.insert(key, ActorId(index));
            }
        }

        // First pass: actors with their own pins, wiring still unresolved.
        let mut actors: Vec<Actor> = Vec::with_capacity(nodes.len() + filters.len());
        for decl in nodes {
            let node_logger = logger.new(o!("node" => decl.name.clone(), "uid" => decl.uid.clone()));
            let inputs = decl
                .inputs
                .iter()
                .filter_map(|descriptor| {
                    let input = wiring::parse_input(descriptor);
                    if input.is_none() {
                        warn!(node_logger, "Ignoring malformed input descriptor"; "descriptor" => descriptor.as_str());
                    }
                    input
                })
                .collect::<Vec<_>>();
            check_slots(&decl.uid, inputs.len())?;
            actors.push(Actor::Node(NodeActor {
                name: decl.name.clone(),
                uid: decl.uid.clone(),
                factory: decl.factory.clone(),
                inputs,
                outputs: Vec::new(),
                settings: decl.sx.clone(),
                log_messages: decl.dx.log_messages(),
                logger: node_logger,
            }));
        }
        let mut tables = Vec::with_capacity(filters.len());
        for decl in filters {
            let filter_logger =
                logger.new(o!("filter" => decl.name.clone(), "uid" => decl.uid.clone()));
            let specs: Vec<wiring::ScopeSpec> = decl
                .table
                .iter()
                .filter_map(|line| {
                    let scope = wiring::parse_scope(line);
                    if scope.is_none() {
                        warn!(filter_logger, "Ignoring malformed routing table line"; "line" => line.as_str());
                    }
                    scope
                })
                .collect();
            check_slots(&decl.uid, specs.len())?;
            let scopes = specs
                .iter()
                .map(|spec| Scope {
                    selector: spec.selector.clone(),
                    destinations: Vec::new(),
                })
                .collect();
            actors.push(Actor::Filter(FilterActor {
                name: decl.name.clone(),
                uid: decl.uid.clone(),
                factory: decl.filter.clone().unwrap_or_default(),
                scopes,
                logger: filter_logger,
            }));
            tables.push(specs);
        }

        let mut graph = Graph {
            actors,
            by_uid,
            by_name,
        };

        // Second pass: resolve every target against the complete actor list.
        for (index, decl) in nodes.iter().enumerate() {
            let outputs = decl
                .outputs
                .iter()
                .filter_map(|descriptor| graph.resolve_output(ActorId(index), descriptor))
                .collect();
            if let Some(Actor::Node(node)) = graph.actors.get_mut(index) {
                node.outputs = outputs;
            }
        }
        for (offset, specs) in tables.into_iter().enumerate() {
            let id = ActorId(nodes.len() + offset);
            let resolved: Vec<Vec<(String, Target)>> = specs
                .iter()
                .map(|spec| {
                    let targets: Vec<(&TargetSpec, Target)> = spec
                        .targets
                        .iter()
                        .filter_map(|target| {
                            graph
                                .resolve_target(id, target, None)
                                .map(|t| (target, t))
                        })
                        .collect();
                    name_destinations(&spec.selector, targets, graph.actors[id.0].logger())
                })
                .collect();
            if let Some(Actor::Filter(filter)) = graph.actors.get_mut(id.0) {
                for (scope, destinations) in filter.scopes.iter_mut().zip(resolved) {
                    scope.destinations = destinations;
                }
            }
        }
        Ok(graph)
    }

    fn resolve_output(&self, source: ActorId, descriptor: &str) -> Option<OutputEntry> {
        match wiring::parse_output(descriptor) {
            Some(spec) => {
                let targets = spec
                    .targets
                    .iter()
                    .filter_map(|target| self.resolve_target(source, target, Some(spec.channel)))
                    .collect();
                Some(OutputEntry {
                    name: spec.name,
                    channel: spec.channel,
                    targets,
                })
            }
            None => {
                warn!(self.actors[source.0].logger(), "Ignoring malformed output descriptor"; "descriptor" => descriptor);
                None
            }
        }
    }

    /// Resolve `spec` as seen from `source`.
    ///
    /// `output_channel` is the channel flag of the output pin, `None` for routing table entries.
    fn resolve_target(
        &self,
        source: ActorId,
        spec: &TargetSpec,
        output_channel: Option<bool>,
    ) -> Option<Target> {
        let logger = self.actors[source.0].logger();
        let actor = match self.by_uid.get(&spec.uid) {
            Some(actor) => *actor,
            None => {
                warn!(logger, "Dropping target with unknown uid"; "target" => %spec);
                return None;
            }
        };
        let destination = &self.actors[actor.0];
        if destination.name() != spec.node {
            debug!(logger, "Target names a different node than its uid"; "target" => %spec, "actual" => destination.name());
        }
        match destination.resolve_pin(&spec.pin) {
            Some((index, input_channel)) => {
                let channel = match (destination, output_channel) {
                    (Actor::Node(_), Some(output)) => output && input_channel,
                    (Actor::Node(_), None) => input_channel,
                    (Actor::Filter(_), Some(output)) => output,
                    (Actor::Filter(_), None) => true,
                };
                Some(Target {
                    actor,
                    uid: spec.uid.clone(),
                    pin: Rc::from(spec.pin.as_str()),
                    channel,
                    index,
                })
            }
            None => {
                warn!(logger, "Dropping target with unknown pin"; "target" => %spec);
                None
            }
        }
    }

    /// All actors, indexed by [ActorId].
    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    /// The number of actors.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Whether the graph has no actors.
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// The actor with the given id.
    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(id.0)
    }

    /// The node with the given id, if that actor is a node.
    pub fn node(&self, id: ActorId) -> Option<&NodeActor> {
        match self.actors.get(id.0) {
            Some(Actor::Node(node)) => Some(node),
            _ => None,
        }
    }

    /// The filter with the given id, if that actor is a filter.
    pub fn filter(&self, id: ActorId) -> Option<&FilterActor> {
        match self.actors.get(id.0) {
            Some(Actor::Filter(filter)) => Some(filter),
            _ => None,
        }
    }

    /// The actor with unique id `uid`.
    pub fn by_uid(&self, uid: &str) -> Option<ActorId> {
        self.by_uid.get(uid).copied()
    }

    /// The first declared actor called `name`, ignoring case.
    pub fn by_name(&self, name: &str) -> Option<ActorId> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    /// Find an actor by uid first, then by name.
    pub fn lookup(&self, key: &str) -> Option<ActorId> {
        self.by_uid(key).or_else(|| self.by_name(key))
    }
}

fn check_slots(uid: &str, count: usize) -> Result<(), GraphError> {
    if count > DispatchIndex::MAX_SLOT + 1 {
        Err(GraphError::TooManySlots {
            uid: uid.to_string(),
            count,
        })
    } else {
        Ok(())
    }
}

/// Name the destinations of one scope.
///
/// A destination is called after its node. Where several destinations of the scope
/// share a node name, each of them is called by its full target text instead.
/// Repeated targets are dropped.
fn name_destinations(
    selector: &str,
    targets: Vec<(&TargetSpec, Target)>,
    logger: &CellflowLogger,
) -> Vec<(String, Target)> {
    let mut named: Vec<(String, Target)> = Vec::with_capacity(targets.len());
    for (spec, target) in targets.iter() {
        let shared = targets
            .iter()
            .filter(|(other, _)| other.node == spec.node)
            .count()
            > 1;
        let name = if shared {
            spec.to_string()
        } else {
            spec.node.clone()
        };
        if named.iter().any(|(n, _)| *n == name) {
            warn!(logger, "Dropping repeated scope destination"; "scope" => selector, "target" => %spec);
            continue;
        }
        named.push((name, target.clone()));
    }
    named
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cell::{Handlers, NodeCell},
        messaging::{DispatchKind, Payload},
        runtime::{default_logger, Tx},
    };

    #[derive(Default)]
    struct Sink;

    impl Sink {
        fn take(&mut self, _tx: &mut Tx<'_>, _msg: Payload) {}
    }

    impl NodeCell for Sink {
        fn register(handlers: &mut Handlers<Self>) {
            handlers.on("onIn", Sink::take);
        }
    }

    fn sink(name: &str, uid: &str) -> NodeDecl {
        NodeDecl::new(name, uid, CellFactory::of_type::<Sink>())
    }

    #[test]
    fn resolves_targets_once() {
        let nodes = vec![
            sink("X", "x")
                .output("go -> [ \"in @ Y (y)\" \"in @ Z (z)\" ]")
                .output("ask => [ \"in @ Y (y)\" \"ask @ Z (z)\" \"topic @ R (r)\" ]")
                .output("broken -> [ \"in @ Nobody (nope)\" \"nope @ Y (y)\" ]"),
            sink("Y", "y").input("-> in"),
            sink("Z", "z").input("-> in").input("=> ask"),
        ];
        let filters = vec![FilterDecl::new("R", "r").route("topic : \"in @ Y (y)\"")];
        let graph = Graph::build(&nodes, &filters, default_logger()).expect("graph");
        assert_eq!(4, graph.len());

        let x = graph.node(ActorId(0)).expect("x");
        let go = x.output("go").expect("go");
        assert_eq!(2, go.targets.len());
        assert!(go.targets.iter().all(|t| !t.channel));

        let ask = x.output("ask").expect("ask");
        let channels: Vec<bool> = ask.targets.iter().map(|t| t.channel).collect();
        assert_eq!(vec![false, true, true], channels);
        assert_eq!(2, ask.channel_count());
        assert_eq!(DispatchKind::Handler, ask.targets[1].index.kind());
        assert_eq!(1, ask.targets[1].index.slot());
        assert_eq!(DispatchKind::Router, ask.targets[2].index.kind());
        assert_eq!(ActorId(3), ask.targets[2].actor);

        assert!(x.output("broken").expect("broken").targets.is_empty());

        let r = graph.filter(ActorId(3)).expect("r");
        assert_eq!(vec!["Y"], r.scopes()[0].names());
    }

    #[test]
    fn malformed_output_yields_no_targets() {
        let nodes = vec![sink("X", "x").output("out -> nodeWithoutUid")];
        let graph = Graph::build(&nodes, &[], default_logger()).expect("graph");
        let x = graph.node(ActorId(0)).expect("x");
        assert!(x.output("out").expect("out").targets.is_empty());
    }

    #[test]
    fn lookups() {
        let nodes = vec![sink("Alpha", "a"), sink("alpha", "b")];
        let graph = Graph::build(&nodes, &[], default_logger()).expect("graph");
        assert_eq!(Some(ActorId(0)), graph.by_name("ALPHA"));
        assert_eq!(Some(ActorId(1)), graph.lookup("b"));
        assert_eq!(None, graph.lookup("c"));
    }

    #[test]
    fn rejects_ambiguous_declarations() {
        let nodes = vec![sink("A", "same"), sink("B", "same")];
        assert_eq!(
            Some(GraphError::DuplicateUid("same".to_string())),
            Graph::build(&nodes, &[], default_logger()).err()
        );
        let nodes = vec![sink("A", " ")];
        assert!(matches!(
            Graph::build(&nodes, &[], default_logger()),
            Err(GraphError::EmptyUid { .. })
        ));
        let filters = vec![FilterDecl::new("", "f")];
        assert!(matches!(
            Graph::build(&[], &filters, default_logger()),
            Err(GraphError::EmptyName { .. })
        ));
    }

    #[test]
    fn scope_destinations_on_one_node_are_told_apart() {
        let nodes = vec![
            sink("A", "a1").input("-> a").input("-> b"),
            sink("B", "b1").input("-> in"),
        ];
        let filters = vec![FilterDecl::new("F", "f").route(
            "t : \"a @ A (a1)\" \"b @ A (a1)\" \"in @ B (b1)\" \"a @ A (a1)\"",
        )];
        let graph = Graph::build(&nodes, &filters, default_logger()).expect("graph");
        let scope = &graph.filter(ActorId(2)).expect("f").scopes()[0];
        assert_eq!(vec!["a @ A (a1)", "b @ A (a1)", "B"], scope.names());
        let b = scope.destination("b @ A (a1)").expect("pin b");
        assert_eq!(ActorId(0), b.actor);
        assert_eq!(1, b.index.slot());
        assert!(scope.destination("A").is_none());
    }

    #[test]
    fn slot_counts_are_bounded() {
        assert_eq!(Ok(()), check_slots("x", DispatchIndex::MAX_SLOT + 1));
        assert_eq!(
            Err(GraphError::TooManySlots {
                uid: "x".to_string(),
                count: DispatchIndex::MAX_SLOT + 2,
            }),
            check_slots("x", DispatchIndex::MAX_SLOT + 2)
        );
    }

    #[test]
    fn debug_flags() {
        assert!(DebugSettings::from_flags("trace, log").log_messages());
        assert!(!DebugSettings::from_flags("logging").log_messages());
    }
}
