use super::*;
use crate::{
    actors::Actor,
    cell::{CellInstance, FilterInstance},
    graph::{FilterDecl, Graph, NodeDecl},
    messaging::{ActorId, DispatchIndex, Envelope, Payload},
    runtime::{dispatch::discard_cell, queues::Mailbox},
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
    time::{Duration, Instant},
};

/// The cell of one actor, indexed by [ActorId].
pub(crate) enum CellSlot {
    /// Not instantiated, or discarded after a panic.
    Empty,
    Node(Box<dyn CellInstance>),
    Filter(Box<dyn FilterInstance>),
}

/// Adaptive tick pacing.
///
/// After `threshold` consecutive idle ticks the slow delay is used,
/// until the next tick that delivers messages.
#[derive(Clone, Debug)]
pub struct Pacing {
    fast: Duration,
    slow: Duration,
    threshold: usize,
    idle_ticks: usize,
}

impl Pacing {
    /// Create a pacing that starts in the fast regime.
    pub fn new(fast: Duration, slow: Duration, threshold: usize) -> Pacing {
        Pacing {
            fast,
            slow,
            threshold,
            idle_ticks: 0,
        }
    }

    fn record(&mut self, idle: bool) {
        if idle {
            self.idle_ticks = self.idle_ticks.saturating_add(1);
        } else {
            self.idle_ticks = 0;
        }
    }

    fn reset(&mut self) {
        self.idle_ticks = 0;
    }

    /// The number of consecutive idle ticks so far.
    pub fn idle_ticks(&self) -> usize {
        self.idle_ticks
    }

    /// Whether the slow regime is in effect.
    pub fn is_slow(&self) -> bool {
        self.idle_ticks >= self.threshold
    }

    /// The delay until the next tick.
    pub fn delay(&self) -> Duration {
        if self.is_slow() {
            self.slow
        } else {
            self.fast
        }
    }
}

/// What a call to [tick](Scheduler::tick) did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The scheduler is not running.
    Stopped,
    /// Nothing was queued. Expired requests were rejected.
    Idle {
        /// The number of requests that timed out.
        expired: usize,
    },
    /// A batch of messages was dispatched.
    Busy {
        /// The number of messages in the batch.
        dispatched: usize,
    },
}

/// The single-threaded core that owns a graph and all of its cells.
///
/// A scheduler does not keep time by itself. The embedding program (or [Runtime])
/// calls [tick](Scheduler::tick) whenever [next_delay](Scheduler::next_delay) has passed.
pub struct Scheduler {
    pub(crate) settings: RuntimeSettings,
    pub(crate) graph: Graph,
    pub(crate) cells: Vec<CellSlot>,
    pub(crate) mailbox: Mailbox,
    pacing: Pacing,
    running: bool,
    pub(crate) logger: CellflowLogger,
}

impl Scheduler {
    /// Resolve `config` and build the graph from `nodes` and `filters`.
    ///
    /// No cells are instantiated until [start](Scheduler::start).
    pub fn new(
        config: &RuntimeConfig,
        nodes: &[NodeDecl],
        filters: &[FilterDecl],
    ) -> Result<Scheduler, RuntimeError> {
        let settings = config.resolve()?;
        let scheduler = Scheduler::with_settings(settings, nodes, filters)?;
        Ok(scheduler)
    }

    pub(crate) fn with_settings(
        settings: RuntimeSettings,
        nodes: &[NodeDecl],
        filters: &[FilterDecl],
    ) -> Result<Scheduler, GraphError> {
        let logger = settings.logger.clone();
        let graph = Graph::build(nodes, filters, &logger)?;
        debug!(logger, "Built graph"; "nodes" => nodes.len(), "filters" => filters.len());
        Ok(Scheduler {
            mailbox: Mailbox::new(settings.min_request_timeout),
            pacing: Pacing::new(
                settings.fast_delay,
                settings.slow_delay,
                settings.idle_threshold,
            ),
            settings,
            graph,
            cells: Vec::new(),
            running: false,
            logger,
        })
    }

    /// Reset all queues and counters, instantiate every cell, and run their start hooks.
    ///
    /// A running scheduler is stopped first.
    pub fn start(&mut self, now: Instant) {
        if self.running {
            self.stop();
        }
        self.mailbox.reset();
        self.pacing.reset();
        self.cells = (0..self.graph.len()).map(|_| CellSlot::Empty).collect();
        for (index, actor) in self.graph.actors().iter().enumerate() {
            let built = panic::catch_unwind(AssertUnwindSafe(|| match actor {
                Actor::Node(node) => {
                    CellSlot::Node(node.factory.build(&node.settings, &node.input_names()))
                }
                Actor::Filter(filter) => CellSlot::Filter(filter.factory.build()),
            }));
            match built {
                Ok(slot) => {
                    if let CellSlot::Node(ref cell) = slot {
                        for pin in cell.unbound() {
                            warn!(actor.logger(), "Input pin has no handler, its messages will be dropped"; "pin" => pin, "cell" => cell.type_name());
                        }
                    }
                    self.cells[index] = slot;
                }
                Err(cause) => discard_cell(&self.graph, &mut self.cells, ActorId(index), "construction", cause),
            }
        }
        self.running = true;
        for index in 0..self.graph.len() {
            let id = ActorId(index);
            if let (Some(node), Some(CellSlot::Node(cell))) =
                (self.graph.node(id), self.cells.get_mut(index))
            {
                let result = {
                    let mut tx = Tx::new(&self.graph, id, node, &mut self.mailbox, None, now);
                    panic::catch_unwind(AssertUnwindSafe(|| cell.start(&mut tx)))
                };
                if let Err(cause) = result {
                    discard_cell(&self.graph, &mut self.cells, id, "start", cause);
                }
            }
            self.drain_firings(now);
        }
        info!(self.logger, "Started"; "actors" => self.graph.len());
    }

    /// Discard all cells and queued messages.
    ///
    /// Outstanding requests are forgotten without settling their handles.
    pub fn stop(&mut self) {
        if self.running {
            info!(self.logger, "Stopping"; "queued" => self.mailbox.outgoing.len(), "pending" => self.mailbox.pending.len());
        }
        self.running = false;
        self.cells.clear();
        self.mailbox.reset();
        self.pacing.reset();
    }

    /// Run one scheduler iteration at time `now`.
    ///
    /// If nothing was produced since the last tick, expired requests are rejected.
    /// Otherwise everything produced since the last tick is dispatched, in order.
    /// Messages produced during this tick wait for the next one.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if !self.running {
            return TickOutcome::Stopped;
        }
        if self.mailbox.outgoing.is_empty() {
            self.pacing.record(true);
            let expired = self.mailbox.pending.sweep_expired(now);
            if !expired.is_empty() {
                debug!(self.logger, "Requests timed out"; "txns" => ?expired);
            }
            self.drain_firings(now);
            TickOutcome::Idle {
                expired: expired.len(),
            }
        } else {
            self.pacing.record(false);
            self.mailbox.swap();
            let mut dispatched = 0;
            while let Some(envelope) = self.mailbox.incoming.pop_front() {
                self.dispatch(envelope, now);
                self.drain_firings(now);
                dispatched += 1;
            }
            trace!(self.logger, "Tick"; "dispatched" => dispatched);
            TickOutcome::Busy { dispatched }
        }
    }

    /// Deliver `payload` to `pin` on the actor with uid or name `actor` on the next tick.
    ///
    /// Returns `false` if the scheduler is not running or the destination cannot be resolved.
    pub fn inject(&mut self, actor: &str, pin: &str, payload: Payload) -> bool {
        if !self.running {
            warn!(self.logger, "Dropping injected message, the scheduler is not running"; "to" => actor, "pin" => pin);
            return false;
        }
        let to = match self.graph.lookup(actor) {
            Some(to) => to,
            None => {
                warn!(self.logger, "Dropping injected message for unknown actor"; "to" => actor, "pin" => pin);
                return false;
            }
        };
        let index: DispatchIndex = match self.graph.actor(to).and_then(|a| a.resolve_pin(pin)) {
            Some((index, _)) => index,
            None => {
                warn!(self.logger, "Dropping injected message for unknown pin"; "to" => actor, "pin" => pin);
                return false;
            }
        };
        self.mailbox.enqueue(Envelope {
            from: None,
            txn: 0,
            to,
            reply_to: 0,
            index,
            pin: Rc::from(pin),
            payload,
        });
        true
    }

    /// Run `f` on the cell of the actor with uid or name `actor`, if it is a `C`.
    pub fn on_cell<C, R, F>(&mut self, actor: &str, f: F) -> Option<R>
    where
        C: Any,
        F: FnOnce(&mut C) -> R,
    {
        let id = self.graph.lookup(actor)?;
        let cell: &mut dyn Any = match self.cells.get_mut(id.0)? {
            CellSlot::Node(cell) => cell.as_any_mut(),
            CellSlot::Filter(cell) => cell.as_any_mut(),
            CellSlot::Empty => return None,
        };
        cell.downcast_mut::<C>().map(f)
    }

    /// Whether the actor with uid or name `actor` has a live cell.
    pub fn is_alive(&self, actor: &str) -> bool {
        self.graph
            .lookup(actor)
            .and_then(|id| self.cells.get(id.0))
            .map_or(false, |slot| !matches!(slot, CellSlot::Empty))
    }

    /// The delay until the next tick is due.
    pub fn next_delay(&self) -> Duration {
        self.pacing.delay()
    }

    /// The current pacing state.
    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    /// The number of messages waiting for the next tick.
    pub fn queued(&self) -> usize {
        self.mailbox.outgoing.len()
    }

    /// The transaction references of all outstanding requests, oldest first.
    pub fn pending_transactions(&self) -> Vec<u64> {
        self.mailbox.pending.transactions()
    }

    /// The number of replies the request `txn` expects in total, if it is outstanding.
    pub fn expected_replies(&self, txn: u64) -> Option<usize> {
        self.mailbox.pending.expected(txn)
    }

    /// Whether [start](Scheduler::start) was called without a later [stop](Scheduler::stop).
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The resolved graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The settings this scheduler was built with.
    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// The runtime's logger.
    pub fn logger(&self) -> &CellflowLogger {
        &self.logger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_switches_regimes() {
        let fast = Duration::from_millis(1);
        let slow = Duration::from_millis(50);
        let mut pacing = Pacing::new(fast, slow, 3);
        assert_eq!(fast, pacing.delay());
        pacing.record(true);
        pacing.record(true);
        assert_eq!(fast, pacing.delay());
        pacing.record(true);
        assert!(pacing.is_slow());
        assert_eq!(slow, pacing.delay());
        pacing.record(true);
        assert_eq!(slow, pacing.delay());
        pacing.record(false);
        assert_eq!(0, pacing.idle_ticks());
        assert_eq!(fast, pacing.delay());
    }
}
