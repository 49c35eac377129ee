use std::fmt;

const KIND_SHIFT: u32 = 30;
const HANDLER: u32 = 0u32;
const REPLY: u32 = 1u32 << KIND_SHIFT;
const ROUTER: u32 = 2u32 << KIND_SHIFT;

const SLOT_MASK: u32 = u32::MAX >> 2;
const KIND_MASK: u32 = !SLOT_MASK;

/// How a destination handles a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    /// Call a bound input handler on the destination's cell.
    Handler,
    /// Settle a pending request.
    Reply,
    /// Forward through a router's scope.
    Router,
}

/// A dispatch kind tag in the top two bits and a slot in the remaining bits.
///
/// The slot indexes the destination's input table for handlers
/// and its scope table for routers. It is unused for replies.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchIndex(u32);

impl DispatchIndex {
    /// The largest representable slot.
    pub const MAX_SLOT: usize = SLOT_MASK as usize;

    /// Index of the input handler at `slot`.
    pub fn handler(slot: usize) -> DispatchIndex {
        DispatchIndex(HANDLER | Self::checked_slot(slot))
    }

    /// Index for replies.
    pub fn reply() -> DispatchIndex {
        DispatchIndex(REPLY)
    }

    /// Index of the router scope at `slot`.
    pub fn router(slot: usize) -> DispatchIndex {
        DispatchIndex(ROUTER | Self::checked_slot(slot))
    }

    // the graph builder rejects actors with more slots than fit
    fn checked_slot(slot: usize) -> u32 {
        debug_assert!(
            slot <= Self::MAX_SLOT,
            "Slot {} does not fit into a dispatch index",
            slot
        );
        (slot as u32) & SLOT_MASK
    }

    /// The kind encoded in this index.
    pub fn kind(&self) -> DispatchKind {
        match self.0 & KIND_MASK {
            HANDLER => DispatchKind::Handler,
            REPLY => DispatchKind::Reply,
            _ => DispatchKind::Router,
        }
    }

    /// The slot encoded in this index.
    pub fn slot(&self) -> usize {
        (self.0 & SLOT_MASK) as usize
    }
}

impl fmt::Debug for DispatchIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DispatchIndex({:?}, {})", self.kind(), self.slot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_slot_are_independent() {
        let h = DispatchIndex::handler(7);
        assert_eq!(DispatchKind::Handler, h.kind());
        assert_eq!(7, h.slot());

        let r = DispatchIndex::router(DispatchIndex::MAX_SLOT);
        assert_eq!(DispatchKind::Router, r.kind());
        assert_eq!(DispatchIndex::MAX_SLOT, r.slot());

        let reply = DispatchIndex::reply();
        assert_eq!(DispatchKind::Reply, reply.kind());
        assert_eq!(0, reply.slot());
    }

    #[test]
    fn handler_zero_is_plain_zero() {
        assert_eq!(0u32, DispatchIndex::handler(0).0);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic)]
    fn oversized_slot_never_changes_the_kind() {
        let index = DispatchIndex::handler(DispatchIndex::MAX_SLOT + 1);
        assert_eq!(DispatchKind::Handler, index.kind());
        assert_eq!(0, index.slot());
    }
}
