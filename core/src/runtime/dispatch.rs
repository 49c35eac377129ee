use super::*;
use crate::{
    actors::Target,
    cell::Selection,
    graph::Graph,
    messaging::{ActorId, DispatchKind, Envelope},
    runtime::scheduler::CellSlot,
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    time::Instant,
};

impl Scheduler {
    /// Dispatch a single message according to its dispatch kind.
    pub(crate) fn dispatch(&mut self, envelope: Envelope, now: Instant) {
        match envelope.index.kind() {
            DispatchKind::Handler => self.deliver(envelope, now),
            DispatchKind::Reply => self.settle_reply(envelope),
            DispatchKind::Router => self.route(envelope, now),
        }
    }

    fn settle_reply(&mut self, envelope: Envelope) {
        if let Some(node) = self.graph.node(envelope.to) {
            if node.log_messages {
                info!(node.logger, "Received reply"; "txn" => envelope.reply_to, "from" => ?envelope.from, "payload" => envelope.payload.type_name());
            }
        }
        let txn = envelope.reply_to;
        if !self.mailbox.pending.settle_one(txn, envelope.payload) {
            debug!(self.logger, "Dropping reply to a request that is no longer outstanding"; "txn" => txn, "to" => %envelope.to);
        }
    }

    /// Call the bound handler of the destination node.
    fn deliver(&mut self, envelope: Envelope, now: Instant) {
        let id = envelope.to;
        let node = match self.graph.node(id) {
            Some(node) => node,
            None => {
                error!(self.logger, "Dropping message for an actor that is not a node"; "to" => %id, "pin" => &*envelope.pin);
                return;
            }
        };
        if node.log_messages {
            info!(node.logger, "Handling message"; "pin" => &*envelope.pin, "from" => ?envelope.from, "txn" => envelope.txn, "payload" => envelope.payload.type_name());
        } else {
            trace!(node.logger, "Handling message"; "pin" => &*envelope.pin, "txn" => envelope.txn);
        }
        let cell = match self.cells.get_mut(id.0) {
            Some(CellSlot::Node(cell)) => cell,
            _ => {
                warn!(node.logger, "Dropping message for a node without cell"; "pin" => &*envelope.pin);
                return;
            }
        };
        let slot = envelope.index.slot();
        let payload = envelope.payload.clone();
        let result = {
            let mut tx = Tx::new(&self.graph, id, node, &mut self.mailbox, Some(&envelope), now);
            panic::catch_unwind(AssertUnwindSafe(|| cell.invoke(slot, &mut tx, payload)))
        };
        if let Err(cause) = result {
            discard_cell(&self.graph, &mut self.cells, id, "handler", cause);
        }
    }

    /// Forward a message through the matched scope of the destination filter.
    ///
    /// Node destinations are called right away, further filters get the message on the next tick.
    fn route(&mut self, envelope: Envelope, now: Instant) {
        let id = envelope.to;
        let filter = match self.graph.filter(id) {
            Some(filter) => filter,
            None => {
                error!(self.logger, "Dropping message for an actor that is not a filter"; "to" => %id, "pin" => &*envelope.pin);
                return;
            }
        };
        let scope = match filter.scopes.get(envelope.index.slot()) {
            Some(scope) => scope,
            None => {
                error!(filter.logger, "Dropping message without scope"; "pin" => &*envelope.pin);
                return;
            }
        };
        let names = scope.names();
        let chosen = match self.cells.get_mut(id.0) {
            Some(CellSlot::Filter(cell)) => {
                panic::catch_unwind(AssertUnwindSafe(|| cell.choose(&names, &envelope)))
            }
            _ => {
                warn!(filter.logger, "Dropping message for a filter without cell"; "pin" => &*envelope.pin);
                return;
            }
        };
        let selection = match chosen {
            Ok(selection) => selection,
            Err(cause) => {
                discard_cell(&self.graph, &mut self.cells, id, "select", cause);
                return;
            }
        };
        let targets: Vec<&Target> = match selection {
            Selection::All => scope.destinations.iter().map(|(_, t)| t).collect(),
            Selection::One(name) => lookup_destination(scope, &name, &filter.logger)
                .into_iter()
                .collect(),
            Selection::Many(names) => names
                .iter()
                .filter_map(|name| lookup_destination(scope, name, &filter.logger))
                .collect(),
            Selection::Nothing => Vec::new(),
        };
        if envelope.expects_reply() {
            let channels = targets.iter().filter(|t| t.channel).count();
            if !self.mailbox.pending.fan_out(envelope.txn, channels) {
                debug!(filter.logger, "Forwarding a request that is no longer outstanding"; "txn" => envelope.txn);
            }
        }
        let forwarded: Vec<Envelope> = targets
            .iter()
            .map(|target| Envelope {
                from: envelope.from,
                txn: if target.channel { envelope.txn } else { 0 },
                to: target.actor,
                reply_to: 0,
                index: target.index,
                pin: target.pin.clone(),
                payload: envelope.payload.clone(),
            })
            .collect();
        trace!(filter.logger, "Routing message"; "scope" => scope.selector.as_str(), "destinations" => forwarded.len());
        for next in forwarded {
            match next.index.kind() {
                DispatchKind::Router => self.mailbox.enqueue(next),
                _ => self.deliver(next, now),
            }
        }
    }

    /// Run all queued continuations with their requesting cells.
    ///
    /// Continuations of cells that are gone pass their outcome through unchanged.
    pub(crate) fn drain_firings(&mut self, now: Instant) {
        loop {
            let next = self.mailbox.firings.borrow_mut().pop_front();
            let firing = match next {
                Some(firing) => firing,
                None => break,
            };
            let owner = firing.owner();
            match (self.graph.node(owner), self.cells.get_mut(owner.0)) {
                (Some(node), Some(CellSlot::Node(cell))) => {
                    let result = {
                        let mut tx = Tx::new(&self.graph, owner, node, &mut self.mailbox, None, now);
                        panic::catch_unwind(AssertUnwindSafe(|| {
                            firing.fire(cell.as_any_mut(), &mut tx)
                        }))
                    };
                    if let Err(cause) = result {
                        discard_cell(&self.graph, &mut self.cells, owner, "continuation", cause);
                    }
                }
                _ => firing.abandon(),
            }
        }
    }
}

fn lookup_destination<'s>(
    scope: &'s crate::actors::Scope,
    name: &str,
    logger: &CellflowLogger,
) -> Option<&'s Target> {
    let target = scope.destination(name);
    if target.is_none() {
        warn!(logger, "Filter selected an unknown destination"; "scope" => scope.selector.as_str(), "name" => name);
    }
    target
}

/// Drop the cell of `id` after it panicked, leaving the actor inert.
pub(crate) fn discard_cell(
    graph: &Graph,
    cells: &mut [CellSlot],
    id: ActorId,
    stage: &str,
    cause: Box<dyn Any + Send>,
) {
    let reason = panic_message(cause.as_ref());
    match graph.actor(id) {
        Some(actor) => {
            crit!(actor.logger(), "Cell panicked and was discarded"; "stage" => stage, "reason" => reason);
        }
        None => {
            crit!(default_logger(), "Cell of unknown actor panicked"; "actor" => %id, "reason" => reason);
        }
    }
    if let Some(slot) = cells.get_mut(id.0) {
        *slot = CellSlot::Empty;
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.clone()
    } else {
        "<unknown>".to_string()
    }
}
