use super::*;

use std::{collections::BTreeMap, time::Instant};

struct PendingEntry {
    group: CompletionGroup,
    start: Instant,
    duration: Duration,
}

impl PendingEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.start) >= self.duration
    }
}

/// Outstanding requests, keyed by transaction reference.
///
/// Transaction references are handed out in increasing order,
/// so the map iterates in insertion order.
/// Only the scheduler touches this table.
pub(crate) struct PendingRequests {
    entries: BTreeMap<u64, PendingEntry>,
    min_timeout: Duration,
}

impl PendingRequests {
    pub(crate) fn new(min_timeout: Duration) -> PendingRequests {
        PendingRequests {
            entries: BTreeMap::new(),
            min_timeout,
        }
    }

    /// Record a new request expecting `expected` replies and return its group.
    ///
    /// `timeout` is raised to the configured floor if it is shorter.
    pub(crate) fn register(
        &mut self,
        txn: u64,
        owner: ActorId,
        firings: &FiringQueue,
        timeout: Duration,
        expected: usize,
        now: Instant,
    ) -> CompletionGroup {
        let group = CompletionGroup::new(owner, txn, firings, std::cmp::max(1, expected));
        let entry = PendingEntry {
            group: group.clone(),
            start: now,
            duration: std::cmp::max(timeout, self.min_timeout),
        };
        self.entries.insert(txn, entry);
        group
    }

    /// Resize the group of `txn` to `count` members.
    ///
    /// Returns `false` if there is no such request.
    pub(crate) fn resize(&mut self, txn: u64, count: usize) -> bool {
        match self.entries.get(&txn) {
            Some(entry) => {
                entry.group.resize(count);
                self.remove_if_settled(txn);
                true
            }
            None => false,
        }
    }

    /// Replace one expected reply of `txn` with `destinations` expected replies.
    ///
    /// Used when a router forwards a request to a number of channel-capable destinations.
    pub(crate) fn fan_out(&mut self, txn: u64, destinations: usize) -> bool {
        match self.entries.get(&txn) {
            Some(entry) => {
                let count = (entry.group.len() + destinations).saturating_sub(1);
                self.resize(txn, count)
            }
            None => false,
        }
    }

    /// Fulfil the next unsettled member of `txn` with `value`.
    ///
    /// The request is forgotten once all its members have settled.
    /// Returns `false` if there is no such request.
    pub(crate) fn settle_one(&mut self, txn: u64, value: Payload) -> bool {
        let settled = match self.entries.get(&txn) {
            Some(entry) => entry.group.settle_next(Ok(value)),
            None => return false,
        };
        self.remove_if_settled(txn);
        settled
    }

    /// Reject every unsettled member of every expired request with a timeout.
    ///
    /// Returns the transaction references of the expired requests.
    pub(crate) fn sweep_expired(&mut self, now: Instant) -> Vec<u64> {
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(txn, _)| *txn)
            .collect();
        for txn in expired.iter() {
            if let Some(entry) = self.entries.remove(txn) {
                let error = RequestError::Timeout {
                    txn: *txn,
                    elapsed: now.saturating_duration_since(entry.start),
                };
                entry.group.reject_pending(error);
            }
        }
        expired
    }

    fn remove_if_settled(&mut self, txn: u64) {
        let settled = self
            .entries
            .get(&txn)
            .map(|entry| entry.group.is_settled())
            .unwrap_or(false);
        if settled {
            self.entries.remove(&txn);
        }
    }

    /// The number of replies `txn` currently expects in total.
    pub(crate) fn expected(&self, txn: u64) -> Option<usize> {
        self.entries.get(&txn).map(|entry| entry.group.len())
    }

    pub(crate) fn transactions(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: ActorId = ActorId(1);
    const FLOOR: Duration = Duration::from_millis(10);

    fn setup() -> (PendingRequests, FiringQueue) {
        (
            PendingRequests::new(FLOOR),
            Rc::new(RefCell::new(VecDeque::new())),
        )
    }

    #[test]
    fn k_settles_drain_an_entry() {
        let (mut pending, firings) = setup();
        let now = Instant::now();
        let group = pending.register(1, OWNER, &firings, Duration::from_millis(100), 3, now);
        assert_eq!(Some(3), pending.expected(1));

        assert!(pending.settle_one(1, Payload::new(1u8)));
        assert!(pending.settle_one(1, Payload::new(2u8)));
        assert_eq!(1, pending.len());
        assert!(pending.settle_one(1, Payload::new(3u8)));
        assert_eq!(0, pending.len());
        assert!(group.is_settled());

        assert!(!pending.settle_one(1, Payload::new(4u8)));
        let values: Vec<u8> = group
            .members()
            .iter()
            .filter_map(|m| m.outcome())
            .filter_map(|o| o.ok())
            .filter_map(|p| p.get::<u8>().copied())
            .collect();
        assert_eq!(vec![1, 2, 3], values);
    }

    #[test]
    fn expired_requests_reject_with_their_txn() {
        let (mut pending, firings) = setup();
        let start = Instant::now();
        let group = pending.register(5, OWNER, &firings, Duration::from_millis(50), 2, start);
        pending.settle_one(5, Payload::unit());

        assert!(pending
            .sweep_expired(start + Duration::from_millis(49))
            .is_empty());
        assert_eq!(
            vec![5],
            pending.sweep_expired(start + Duration::from_millis(60))
        );
        assert_eq!(0, pending.len());

        let members = group.members();
        assert!(members[0].is_fulfilled());
        match members[1].outcome() {
            Some(Err(RequestError::Timeout { txn, elapsed })) => {
                assert_eq!(5, txn);
                assert_eq!(Duration::from_millis(60), elapsed);
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[test]
    fn timeouts_are_clamped_to_the_floor() {
        let (mut pending, firings) = setup();
        let start = Instant::now();
        pending.register(2, OWNER, &firings, Duration::from_millis(1), 1, start);
        assert!(pending
            .sweep_expired(start + Duration::from_millis(5))
            .is_empty());
        assert_eq!(vec![2], pending.sweep_expired(start + FLOOR));
    }

    #[test]
    fn fan_out_replaces_one_expected_reply() {
        let (mut pending, firings) = setup();
        let now = Instant::now();
        pending.register(3, OWNER, &firings, Duration::from_secs(1), 1, now);
        assert!(pending.fan_out(3, 2));
        assert_eq!(Some(2), pending.expected(3));
        assert!(pending.fan_out(3, 3));
        assert_eq!(Some(4), pending.expected(3));
        assert!(!pending.fan_out(99, 2));
    }

    #[test]
    fn fan_out_to_nothing_supersedes_the_reply() {
        let (mut pending, firings) = setup();
        let now = Instant::now();
        let group = pending.register(4, OWNER, &firings, Duration::from_secs(1), 1, now);
        let member = group.members().remove(0);
        assert!(pending.fan_out(4, 0));
        assert_eq!(None, pending.expected(4));
        assert_eq!(
            Some(RequestError::Superseded { txn: 4 }),
            member.outcome().and_then(|o| o.err())
        );
    }

    #[test]
    fn resize_to_same_length_keeps_the_entry() {
        let (mut pending, firings) = setup();
        let now = Instant::now();
        pending.register(6, OWNER, &firings, Duration::from_secs(1), 2, now);
        assert!(pending.resize(6, 2));
        assert_eq!(Some(2), pending.expected(6));
        assert_eq!(vec![6], pending.transactions());
    }
}
