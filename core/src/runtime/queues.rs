use crate::{
    completion::{FiringQueue, PendingRequests},
    messaging::Envelope,
};
use std::{cell::RefCell, collections::VecDeque, rc::Rc, time::Duration};

/// All mutable scheduler state that cells can reach through their [Tx](super::Tx).
///
/// `outgoing` collects everything produced during a tick, `incoming` holds the
/// batch being dispatched. The two swap places at the start of every busy tick.
pub(crate) struct Mailbox {
    pub(crate) outgoing: VecDeque<Envelope>,
    pub(crate) incoming: VecDeque<Envelope>,
    pub(crate) pending: PendingRequests,
    pub(crate) firings: FiringQueue,
    next_txn: u64,
}

impl Mailbox {
    pub(crate) fn new(min_request_timeout: Duration) -> Mailbox {
        Mailbox {
            outgoing: VecDeque::new(),
            incoming: VecDeque::new(),
            pending: PendingRequests::new(min_request_timeout),
            firings: Rc::new(RefCell::new(VecDeque::new())),
            next_txn: 1,
        }
    }

    /// Hand out a fresh transaction reference, never `0`.
    pub(crate) fn next_txn(&mut self) -> u64 {
        let txn = self.next_txn;
        self.next_txn += 1;
        txn
    }

    pub(crate) fn enqueue(&mut self, envelope: Envelope) {
        self.outgoing.push_back(envelope);
    }

    /// Make everything produced so far the next batch to dispatch.
    pub(crate) fn swap(&mut self) {
        debug_assert!(self.incoming.is_empty(), "Swapping before the batch was drained");
        std::mem::swap(&mut self.outgoing, &mut self.incoming);
    }

    /// Forget all messages, requests and queued continuations.
    pub(crate) fn reset(&mut self) {
        self.outgoing.clear();
        self.incoming.clear();
        self.pending.clear();
        self.firings.borrow_mut().clear();
        self.next_txn = 1;
    }
}
