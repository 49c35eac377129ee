//! Settle-once completion handles and resizable groups of them.
//!
//! A [Completion] is fulfilled or rejected exactly once; later attempts are ignored.
//! A [CompletionGroup] bundles the handles of one request (one per expected reply)
//! and lets the requesting cell attach continuations to all of them at once.
//!
//! Continuations never run inline. Settling a handle queues a firing that the
//! scheduler runs with the requesting cell once the current handler has returned.

use crate::{
    messaging::{ActorId, Payload},
    runtime::Tx,
};
use std::{any::Any, cell::RefCell, collections::VecDeque, error, fmt, rc::Rc, time::Duration};

mod pending;
pub(crate) use pending::PendingRequests;

/// The ways a request can fail, as seen by the requesting cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestError {
    /// Not all expected replies arrived before the deadline.
    Timeout {
        /// The transaction reference of the request.
        txn: u64,
        /// Time between issuing the request and noticing the expiry.
        elapsed: Duration,
    },
    /// None of the destinations of the pin has a return channel.
    NoChannel {
        /// The output pin the request was issued on.
        pin: String,
    },
    /// The handle was dropped from its group before it could settle.
    Superseded {
        /// The transaction reference of the request.
        txn: u64,
    },
    /// A continuation was attached for a different cell type than the requester's.
    CellMismatch {
        /// The cell type the continuation expected.
        expected: &'static str,
    },
}

impl RequestError {
    /// Whether this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout { .. })
    }

    /// The transaction reference this error belongs to, if any.
    pub fn txn(&self) -> Option<u64> {
        match self {
            RequestError::Timeout { txn, .. } | RequestError::Superseded { txn } => Some(*txn),
            _ => None,
        }
    }
}

impl error::Error for RequestError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        None
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Timeout { txn, elapsed } => write!(
                f,
                "Request {} timed out after {}ms.",
                txn,
                elapsed.as_millis()
            ),
            RequestError::NoChannel { pin } => write!(
                f,
                "Output pin '{}' has no destination with a return channel.",
                pin
            ),
            RequestError::Superseded { txn } => write!(
                f,
                "Request {} no longer expects this reply, the handle was dropped from its group.",
                txn
            ),
            RequestError::CellMismatch { expected } => write!(
                f,
                "The continuation expected a cell of type {}, but the requester is a different cell.",
                expected
            ),
        }
    }
}

/// The final state of a completion handle.
pub type Settled = Result<Payload, RequestError>;

pub(crate) type Reaction = Rc<dyn Fn(&mut dyn Any, &mut Tx<'_>, Settled) -> Settled>;
pub(crate) type FiringQueue = Rc<RefCell<VecDeque<Firing>>>;

fn boxed_reaction<F>(f: F) -> Reaction
where
    F: Fn(&mut dyn Any, &mut Tx<'_>, Settled) -> Settled + 'static,
{
    Rc::new(f)
}

/// A continuation that is ready to run with the requesting cell.
pub(crate) struct Firing {
    owner: ActorId,
    reaction: Reaction,
    outcome: Settled,
    downstream: Completion,
}

impl Firing {
    pub(crate) fn owner(&self) -> ActorId {
        self.owner
    }

    pub(crate) fn fire(self, cell: &mut dyn Any, tx: &mut Tx<'_>) {
        let result = (self.reaction)(cell, tx, self.outcome);
        self.downstream.settle(result);
    }

    /// Pass the outcome through unchanged, because the owning cell is gone.
    pub(crate) fn abandon(self) {
        self.downstream.settle(self.outcome);
    }
}

struct HandleState {
    owner: ActorId,
    outcome: Option<Settled>,
    reactions: Vec<(Reaction, Completion)>,
    firings: FiringQueue,
}

/// A single-settle handle for one expected reply.
#[derive(Clone)]
pub struct Completion {
    state: Rc<RefCell<HandleState>>,
}

impl Completion {
    pub(crate) fn pending(owner: ActorId, firings: &FiringQueue) -> Completion {
        Completion {
            state: Rc::new(RefCell::new(HandleState {
                owner,
                outcome: None,
                reactions: Vec::new(),
                firings: firings.clone(),
            })),
        }
    }

    /// Settle this handle.
    ///
    /// Returns `false` and does nothing if it was already settled.
    pub(crate) fn settle(&self, outcome: Settled) -> bool {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if state.outcome.is_some() {
            return false;
        }
        let reactions = std::mem::take(&mut state.reactions);
        for (reaction, downstream) in reactions {
            let firing = Firing {
                owner: state.owner,
                reaction,
                outcome: outcome.clone(),
                downstream,
            };
            state.firings.borrow_mut().push_back(firing);
        }
        state.outcome = Some(outcome);
        true
    }

    fn react(&self, reaction: Reaction) -> Completion {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let downstream = Completion::pending(state.owner, &state.firings);
        match state.outcome {
            Some(ref outcome) => {
                let firing = Firing {
                    owner: state.owner,
                    reaction,
                    outcome: outcome.clone(),
                    downstream: downstream.clone(),
                };
                state.firings.borrow_mut().push_back(firing);
            }
            None => state.reactions.push((reaction, downstream.clone())),
        }
        downstream
    }

    /// Whether this handle has not settled yet.
    pub fn is_pending(&self) -> bool {
        self.state.borrow().outcome.is_none()
    }

    /// Whether this handle was fulfilled with a value.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self.state.borrow().outcome, Some(Ok(_)))
    }

    /// Whether this handle was rejected with an error.
    pub fn is_rejected(&self) -> bool {
        matches!(self.state.borrow().outcome, Some(Err(_)))
    }

    /// A copy of the outcome, if settled.
    pub fn outcome(&self) -> Option<Settled> {
        self.state.borrow().outcome.clone()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.borrow().outcome {
            None => write!(f, "Completion(pending)"),
            Some(Ok(ref value)) => write!(f, "Completion(fulfilled: {:?})", value),
            Some(Err(ref error)) => write!(f, "Completion(rejected: {})", error),
        }
    }
}

struct GroupState {
    owner: ActorId,
    txn: u64,
    firings: FiringQueue,
    members: Vec<Completion>,
    links: Vec<(Reaction, CompletionGroup)>,
}

/// An ordered group of completion handles that behaves like a single one.
///
/// Continuations attached with [then](CompletionGroup::then) or
/// [catch](CompletionGroup::catch) apply to every member, including members added
/// later, and produce a new group with one derived member per original member.
#[derive(Clone)]
pub struct CompletionGroup {
    state: Rc<RefCell<GroupState>>,
}

impl CompletionGroup {
    pub(crate) fn new(
        owner: ActorId,
        txn: u64,
        firings: &FiringQueue,
        count: usize,
    ) -> CompletionGroup {
        let members = (0..count)
            .map(|_| Completion::pending(owner, firings))
            .collect();
        CompletionGroup::from_members(owner, txn, firings, members)
    }

    fn from_members(
        owner: ActorId,
        txn: u64,
        firings: &FiringQueue,
        members: Vec<Completion>,
    ) -> CompletionGroup {
        CompletionGroup {
            state: Rc::new(RefCell::new(GroupState {
                owner,
                txn,
                firings: firings.clone(),
                members,
                links: Vec::new(),
            })),
        }
    }

    /// A group with a single, already rejected member.
    pub(crate) fn rejected(
        owner: ActorId,
        firings: &FiringQueue,
        error: RequestError,
    ) -> CompletionGroup {
        let group = CompletionGroup::new(owner, 0, firings, 1);
        group.reject_pending(error);
        group
    }

    /// The transaction reference of the request, `0` if it was never registered.
    pub fn txn(&self) -> u64 {
        self.state.borrow().txn
    }

    /// The number of members.
    pub fn len(&self) -> usize {
        self.state.borrow().members.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The members, in order.
    pub fn members(&self) -> Vec<Completion> {
        self.state.borrow().members.clone()
    }

    /// The number of members that have not settled yet.
    pub fn pending_count(&self) -> usize {
        self.state
            .borrow()
            .members
            .iter()
            .filter(|m| m.is_pending())
            .count()
    }

    /// Whether every member has settled.
    pub fn is_settled(&self) -> bool {
        self.pending_count() == 0
    }

    /// Run `f` with the requesting cell for every member that is fulfilled.
    ///
    /// Rejections pass through to the returned group untouched.
    pub fn then<C, F>(&self, f: F) -> CompletionGroup
    where
        C: Any,
        F: Fn(&mut C, &mut Tx<'_>, Payload) -> Payload + 'static,
    {
        let reaction = boxed_reaction(move |cell, tx, settled| {
            let value = settled?;
            match cell.downcast_mut::<C>() {
                Some(cell) => Ok(f(cell, tx, value)),
                None => Err(RequestError::CellMismatch {
                    expected: std::any::type_name::<C>(),
                }),
            }
        });
        self.link(reaction)
    }

    /// Run `f` with the requesting cell for every member that is rejected.
    ///
    /// The value returned by `f` fulfils the corresponding member of the returned group.
    pub fn catch<C, F>(&self, f: F) -> CompletionGroup
    where
        C: Any,
        F: Fn(&mut C, &mut Tx<'_>, RequestError) -> Payload + 'static,
    {
        let reaction = boxed_reaction(move |cell, tx, settled| {
            match settled {
                Ok(value) => Ok(value),
                Err(error) => match cell.downcast_mut::<C>() {
                    Some(cell) => Ok(f(cell, tx, error)),
                    None => Err(RequestError::CellMismatch {
                        expected: std::any::type_name::<C>(),
                    }),
                },
            }
        });
        self.link(reaction)
    }

    fn link(&self, reaction: Reaction) -> CompletionGroup {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let members = state
            .members
            .iter()
            .map(|m| m.react(reaction.clone()))
            .collect();
        let downstream = CompletionGroup::from_members(state.owner, state.txn, &state.firings, members);
        state.links.push((reaction, downstream.clone()));
        downstream
    }

    fn adopt(&self, member: Completion) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        for (reaction, downstream) in state.links.iter() {
            downstream.adopt(member.react(reaction.clone()));
        }
        state.members.push(member);
    }

    /// Grow or shrink the group to `count` members.
    ///
    /// New members are unsettled and inherit all attached continuations.
    /// Dropped trailing members are rejected as [superseded](RequestError::Superseded),
    /// and so are their counterparts in derived groups.
    pub(crate) fn resize(&self, count: usize) {
        let (len, owner, txn, firings) = {
            let state = self.state.borrow();
            (state.members.len(), state.owner, state.txn, state.firings.clone())
        };
        if count > len {
            for _ in len..count {
                self.adopt(Completion::pending(owner, &firings));
            }
        } else if count < len {
            let (dropped, derived): (Vec<Completion>, Vec<CompletionGroup>) = {
                let mut state = self.state.borrow_mut();
                let dropped = state.members.drain(count..).collect();
                let derived = state.links.iter().map(|(_, d)| d.clone()).collect();
                (dropped, derived)
            };
            for member in dropped {
                member.settle(Err(RequestError::Superseded { txn }));
            }
            for group in derived {
                group.resize(count);
            }
        }
    }

    /// Settle the first unsettled member with `outcome`.
    ///
    /// Returns `false` if every member had already settled.
    pub(crate) fn settle_next(&self, outcome: Settled) -> bool {
        let next = self
            .state
            .borrow()
            .members
            .iter()
            .find(|m| m.is_pending())
            .cloned();
        match next {
            Some(member) => member.settle(outcome),
            None => false,
        }
    }

    /// Reject every unsettled member with `error` and return how many there were.
    pub(crate) fn reject_pending(&self, error: RequestError) -> usize {
        self.members()
            .iter()
            .filter(|m| m.settle(Err(error.clone())))
            .count()
    }
}

impl fmt::Debug for CompletionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CompletionGroup(txn={}, members={}, pending={})",
            self.txn(),
            self.len(),
            self.pending_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> FiringQueue {
        Rc::new(RefCell::new(VecDeque::new()))
    }

    const OWNER: ActorId = ActorId(0);

    #[test]
    fn settles_exactly_once() {
        let firings = queue();
        let c = Completion::pending(OWNER, &firings);
        assert!(c.is_pending());
        assert!(c.settle(Ok(Payload::new(1u8))));
        assert!(!c.settle(Ok(Payload::new(2u8))));
        assert!(!c.settle(Err(RequestError::Superseded { txn: 1 })));
        assert!(c.is_fulfilled());
        let value = c.outcome().expect("settled").expect("fulfilled");
        assert_eq!(Some(&1u8), value.get::<u8>());
    }

    #[test]
    fn continuations_queue_one_firing_per_member() {
        let firings = queue();
        let group = CompletionGroup::new(OWNER, 7, &firings, 2);
        let derived = group.then::<u32, _>(|_cell, _tx, value| value);
        assert_eq!(2, derived.len());
        assert_eq!(7, derived.txn());
        assert!(firings.borrow().is_empty());

        assert!(group.settle_next(Ok(Payload::unit())));
        assert_eq!(1, firings.borrow().len());
        assert!(group.settle_next(Ok(Payload::unit())));
        assert_eq!(2, firings.borrow().len());
        assert!(!group.settle_next(Ok(Payload::unit())));
        assert!(group.is_settled());
        assert!(!derived.is_settled());
    }

    #[test]
    fn late_continuations_fire_immediately() {
        let firings = queue();
        let group = CompletionGroup::rejected(
            OWNER,
            &firings,
            RequestError::NoChannel {
                pin: "ask".to_string(),
            },
        );
        assert!(group.is_settled());
        assert_eq!(0, group.txn());
        let _ = group.catch::<u32, _>(|_cell, _tx, _error| Payload::unit());
        assert_eq!(1, firings.borrow().len());
    }

    #[test]
    fn resize_to_current_length_is_a_noop() {
        let firings = queue();
        let group = CompletionGroup::new(OWNER, 3, &firings, 2);
        let before = group.members();
        group.resize(2);
        let after = group.members();
        assert_eq!(2, after.len());
        assert!(after.iter().all(|m| m.is_pending()));
        assert!(Rc::ptr_eq(&before[1].state, &after[1].state));
    }

    #[test]
    fn growing_inherits_continuations() {
        let firings = queue();
        let group = CompletionGroup::new(OWNER, 3, &firings, 1);
        let derived = group.then::<u32, _>(|_cell, _tx, value| value);
        let twice = derived.then::<u32, _>(|_cell, _tx, value| value);
        group.resize(3);
        assert_eq!(3, group.len());
        assert_eq!(3, derived.len());
        assert_eq!(3, twice.len());

        group.settle_next(Ok(Payload::unit()));
        group.settle_next(Ok(Payload::unit()));
        group.settle_next(Ok(Payload::unit()));
        assert_eq!(3, firings.borrow().len());
    }

    #[test]
    fn shrinking_rejects_dropped_members() {
        let firings = queue();
        let group = CompletionGroup::new(OWNER, 9, &firings, 3);
        let derived = group.then::<u32, _>(|_cell, _tx, value| value);
        let members = group.members();
        group.resize(1);
        assert_eq!(1, group.len());
        assert_eq!(1, derived.len());
        assert!(members[0].is_pending());
        for dropped in &members[1..] {
            match dropped.outcome() {
                Some(Err(error)) => assert_eq!(RequestError::Superseded { txn: 9 }, error),
                other => panic!("expected a superseded rejection, got {:?}", other),
            }
        }
        assert_eq!(2, firings.borrow().len());
    }
}
