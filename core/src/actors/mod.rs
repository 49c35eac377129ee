//! Node and filter actors with their resolved wiring tables.
//!
//! Actors are created by the graph builder and never change afterwards.
//! The cells they wrap live in the scheduler, indexed by [ActorId].

use super::*;
use crate::{
    cell::{CellFactory, FilterFactory},
    messaging::{ActorId, DispatchIndex},
    wiring::InputPin,
};
use hocon::Hocon;
use std::rc::Rc;

/// A resolved wiring endpoint.
#[derive(Clone, Debug)]
pub struct Target {
    /// The destination actor.
    pub actor: ActorId,
    /// The unique id of the destination.
    pub uid: String,
    /// The pin (or router selector) on the destination.
    pub pin: Rc<str>,
    /// Whether the destination can answer requests through this endpoint.
    pub channel: bool,
    /// How the destination handles messages arriving through this endpoint.
    pub index: DispatchIndex,
}

/// An output pin with its fan-out list.
#[derive(Clone, Debug)]
pub struct OutputEntry {
    /// The output pin name.
    pub name: String,
    /// Whether the pin was declared with a channel arrow.
    pub channel: bool,
    /// Every destination that could be resolved, in declaration order.
    pub targets: Vec<Target>,
}

impl OutputEntry {
    /// The number of destinations that can answer a request.
    pub fn channel_count(&self) -> usize {
        self.targets.iter().filter(|t| t.channel).count()
    }
}

/// One selector of a filter's routing table.
#[derive(Clone, Debug)]
pub struct Scope {
    /// The selector text.
    pub selector: String,
    /// Destination names, unique within the scope, and their targets in declaration order.
    pub destinations: Vec<(String, Target)>,
}

impl Scope {
    /// The destination names, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.destinations
            .iter()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// The destination called `name`.
    ///
    /// Destinations are named after their node, or after their full target text
    /// where several of them share a node name.
    pub fn destination(&self, name: &str) -> Option<&Target> {
        self.destinations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, target)| target)
    }
}

/// An actor wrapping a node cell.
pub struct NodeActor {
    pub(crate) name: String,
    pub(crate) uid: String,
    pub(crate) factory: CellFactory,
    pub(crate) inputs: Vec<InputPin>,
    pub(crate) outputs: Vec<OutputEntry>,
    pub(crate) settings: Hocon,
    pub(crate) log_messages: bool,
    pub(crate) logger: CellflowLogger,
}

impl NodeActor {
    /// The human readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unique id.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The declared input pins, indexed by handler slot.
    pub fn inputs(&self) -> &[InputPin] {
        &self.inputs
    }

    /// The output table.
    pub fn outputs(&self) -> &[OutputEntry] {
        &self.outputs
    }

    /// The output pin called `name`.
    pub fn output(&self, name: &str) -> Option<&OutputEntry> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// The handler slot of the input pin called `name`.
    pub fn input_slot(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|i| i.name == name)
    }

    pub(crate) fn input_names(&self) -> Vec<String> {
        self.inputs.iter().map(|i| i.name.clone()).collect()
    }
}

/// An actor wrapping a filter cell.
pub struct FilterActor {
    pub(crate) name: String,
    pub(crate) uid: String,
    pub(crate) factory: FilterFactory,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) logger: CellflowLogger,
}

impl FilterActor {
    /// The human readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unique id.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The routing table.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// The slot of the scope that handles messages sent to `pin`.
    ///
    /// An exact selector match wins over the catch-all selector `*`.
    pub fn scope_slot(&self, pin: &str) -> Option<usize> {
        self.scopes
            .iter()
            .position(|s| s.selector == pin)
            .or_else(|| self.scopes.iter().position(|s| s.selector == "*"))
    }
}

/// Either kind of actor.
pub enum Actor {
    /// A node.
    Node(NodeActor),
    /// A filter.
    Filter(FilterActor),
}

impl Actor {
    /// The human readable name.
    pub fn name(&self) -> &str {
        match self {
            Actor::Node(node) => &node.name,
            Actor::Filter(filter) => &filter.name,
        }
    }

    /// The unique id.
    pub fn uid(&self) -> &str {
        match self {
            Actor::Node(node) => &node.uid,
            Actor::Filter(filter) => &filter.uid,
        }
    }

    pub(crate) fn logger(&self) -> &CellflowLogger {
        match self {
            Actor::Node(node) => &node.logger,
            Actor::Filter(filter) => &filter.logger,
        }
    }

    /// Resolve `pin` on this actor to a dispatch index and a channel flag.
    ///
    /// For nodes `pin` is an input pin, for filters a selector.
    /// Router endpoints always accept requests, whether the request ends up answered
    /// depends on where the filter forwards it.
    pub fn resolve_pin(&self, pin: &str) -> Option<(DispatchIndex, bool)> {
        match self {
            Actor::Node(node) => node
                .input_slot(pin)
                .map(|slot| (DispatchIndex::handler(slot), node.inputs[slot].channel)),
            Actor::Filter(filter) => filter
                .scope_slot(pin)
                .map(|slot| (DispatchIndex::router(slot), true)),
        }
    }
}
