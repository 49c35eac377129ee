use super::*;
use crate::{
    actors::{NodeActor, Target},
    completion::{CompletionGroup, RequestError},
    graph::Graph,
    messaging::{ActorId, DispatchIndex, Envelope, Payload},
    runtime::queues::Mailbox,
};
use hocon::Hocon;
use std::{rc::Rc, time::Duration, time::Instant};

/// The capabilities a node cell has while it runs.
///
/// A fresh `Tx` is handed to every handler invocation, start hook and continuation.
/// Everything it produces is delivered on the next tick.
pub struct Tx<'a> {
    graph: &'a Graph,
    actor: ActorId,
    node: &'a NodeActor,
    mailbox: &'a mut Mailbox,
    current: Option<&'a Envelope>,
    now: Instant,
    replied: bool,
    rescheduled: bool,
}

impl<'a> Tx<'a> {
    pub(crate) fn new(
        graph: &'a Graph,
        actor: ActorId,
        node: &'a NodeActor,
        mailbox: &'a mut Mailbox,
        current: Option<&'a Envelope>,
        now: Instant,
    ) -> Tx<'a> {
        Tx {
            graph,
            actor,
            node,
            mailbox,
            current,
            now,
            replied: false,
            rescheduled: false,
        }
    }

    /// Send `payload` to every destination of the output pin `pin`.
    ///
    /// Returns the number of messages sent, `0` if the pin is unknown or unwired.
    pub fn send(&mut self, pin: &str, payload: Payload) -> usize {
        let node = self.node;
        match node.output(pin) {
            Some(output) => {
                for target in output.targets.iter() {
                    let envelope = self.envelope(target, 0, payload.clone());
                    self.mailbox.enqueue(envelope);
                }
                output.targets.len()
            }
            None => {
                warn!(self.log(), "Sending on undeclared output pin"; "pin" => pin);
                0
            }
        }
    }

    /// Send `payload` to every destination of `pin` and expect one reply from each
    /// destination that has a return channel.
    ///
    /// If none has, the message is still sent, but the returned group is already
    /// rejected with [NoChannel](RequestError::NoChannel). Otherwise the group rejects
    /// with a [Timeout](RequestError::Timeout) if not all replies arrive within `timeout`.
    pub fn request(&mut self, pin: &str, payload: Payload, timeout: Duration) -> CompletionGroup {
        let node = self.node;
        let output = match node.output(pin) {
            Some(output) => output,
            None => {
                warn!(self.log(), "Requesting on undeclared output pin"; "pin" => pin);
                return self.no_channel(pin);
            }
        };
        let channels = output.channel_count();
        if channels == 0 {
            for target in output.targets.iter() {
                let envelope = self.envelope(target, 0, payload.clone());
                self.mailbox.enqueue(envelope);
            }
            return self.no_channel(pin);
        }
        let group = self.register(timeout, channels);
        for target in output.targets.iter() {
            let txn = if target.channel { group.txn() } else { 0 };
            let envelope = self.envelope(target, txn, payload.clone());
            self.mailbox.enqueue(envelope);
        }
        group
    }

    /// Answer the request currently being handled.
    ///
    /// Returns `false` and does nothing if there is no such request,
    /// or if it has been answered already.
    pub fn reply(&mut self, payload: Payload) -> bool {
        let current = match self.current {
            Some(current) if current.expects_reply() => current,
            _ => {
                debug!(self.log(), "Ignoring reply outside of a request");
                return false;
            }
        };
        let requester = match current.from {
            Some(requester) => requester,
            None => return false,
        };
        if self.replied {
            warn!(self.log(), "Ignoring second reply"; "txn" => current.txn);
            return false;
        }
        self.replied = true;
        self.mailbox.enqueue(Envelope {
            from: Some(self.actor),
            txn: 0,
            to: requester,
            reply_to: current.txn,
            index: DispatchIndex::reply(),
            pin: current.pin.clone(),
            payload,
        });
        true
    }

    /// Deliver the message currently being handled again on the next tick.
    ///
    /// Returns `false` if there is no current message or it was already rescheduled.
    pub fn reschedule(&mut self) -> bool {
        match self.current {
            Some(current) if !self.rescheduled => {
                self.rescheduled = true;
                self.mailbox.enqueue(current.clone());
                true
            }
            _ => false,
        }
    }

    /// Address the actor called `name` (ignoring case) without static wiring.
    pub fn wireless<'t>(&'t mut self, name: &str) -> Option<Wireless<'t, 'a>> {
        match self.graph.by_name(name) {
            Some(to) => Some(Wireless { tx: self, to }),
            None => {
                warn!(self.log(), "No actor for wireless lookup"; "name" => name);
                None
            }
        }
    }

    /// The logger of this node.
    pub fn log(&self) -> &CellflowLogger {
        &self.node.logger
    }

    /// The settings this node was declared with.
    pub fn settings(&self) -> &Hocon {
        &self.node.settings
    }

    /// The name of this node.
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// The unique id of this node.
    pub fn uid(&self) -> &str {
        &self.node.uid
    }

    /// The id of this node in its graph.
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// The message being handled, `None` in start hooks and continuations.
    pub fn current(&self) -> Option<&Envelope> {
        self.current
    }

    /// The time of the tick this `Tx` belongs to.
    pub fn now(&self) -> Instant {
        self.now
    }

    fn envelope(&self, target: &Target, txn: u64, payload: Payload) -> Envelope {
        Envelope {
            from: Some(self.actor),
            txn,
            to: target.actor,
            reply_to: 0,
            index: target.index,
            pin: target.pin.clone(),
            payload,
        }
    }

    fn register(&mut self, timeout: Duration, expected: usize) -> CompletionGroup {
        let txn = self.mailbox.next_txn();
        self.mailbox.pending.register(
            txn,
            self.actor,
            &self.mailbox.firings,
            timeout,
            expected,
            self.now,
        )
    }

    fn no_channel(&self, pin: &str) -> CompletionGroup {
        CompletionGroup::rejected(
            self.actor,
            &self.mailbox.firings,
            RequestError::NoChannel {
                pin: pin.to_string(),
            },
        )
    }
}

/// Sending and requesting towards an actor found by name.
pub struct Wireless<'t, 'a> {
    tx: &'t mut Tx<'a>,
    to: ActorId,
}

impl<'t, 'a> Wireless<'t, 'a> {
    /// The addressed actor.
    pub fn actor(&self) -> ActorId {
        self.to
    }

    fn resolve(&self, pin: &str) -> Option<(DispatchIndex, bool)> {
        let resolved = self
            .tx
            .graph
            .actor(self.to)
            .and_then(|actor| actor.resolve_pin(pin));
        if resolved.is_none() {
            warn!(self.tx.log(), "Wireless destination has no such pin"; "pin" => pin, "to" => %self.to);
        }
        resolved
    }

    fn envelope(&self, pin: &str, index: DispatchIndex, txn: u64, payload: Payload) -> Envelope {
        Envelope {
            from: Some(self.tx.actor),
            txn,
            to: self.to,
            reply_to: 0,
            index,
            pin: Rc::from(pin),
            payload,
        }
    }

    /// Send `payload` to `pin` on the addressed actor.
    ///
    /// Returns the number of messages sent, `0` or `1`.
    pub fn send(&mut self, pin: &str, payload: Payload) -> usize {
        match self.resolve(pin) {
            Some((index, _)) => {
                let envelope = self.envelope(pin, index, 0, payload);
                self.tx.mailbox.enqueue(envelope);
                1
            }
            None => 0,
        }
    }

    /// Send `payload` to `pin` on the addressed actor and expect one reply.
    pub fn request(&mut self, pin: &str, payload: Payload, timeout: Duration) -> CompletionGroup {
        match self.resolve(pin) {
            Some((index, true)) => {
                let group = self.tx.register(timeout, 1);
                let envelope = self.envelope(pin, index, group.txn(), payload);
                self.tx.mailbox.enqueue(envelope);
                group
            }
            Some((index, false)) => {
                let envelope = self.envelope(pin, index, 0, payload);
                self.tx.mailbox.enqueue(envelope);
                self.tx.no_channel(pin)
            }
            None => self.tx.no_channel(pin),
        }
    }
}
