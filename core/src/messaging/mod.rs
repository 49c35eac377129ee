//! Message envelopes and the values they carry.

use std::{any::Any, fmt, rc::Rc};

mod dispatch_index;
pub use dispatch_index::*;

/// Index of an actor within its graph.
///
/// Ids are assigned once at graph-build time and stay valid for the lifetime of the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub(crate) usize);

impl ActorId {
    /// The position of this actor in its graph.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An opaque, cheaply clonable message value.
///
/// Fan-out hands the same value to every destination, so payloads are shared
/// rather than copied. Cells recover the concrete type with [get](Payload::get).
#[derive(Clone)]
pub struct Payload {
    value: Rc<dyn Any>,
    type_name: &'static str,
}

impl Payload {
    /// Wrap `value` into a payload.
    pub fn new<T: Any>(value: T) -> Payload {
        Payload {
            value: Rc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The empty payload.
    pub fn unit() -> Payload {
        Payload::new(())
    }

    pub(crate) fn from_boxed(value: Box<dyn Any + Send>, type_name: &'static str) -> Payload {
        let value: Box<dyn Any> = value;
        Payload {
            value: Rc::from(value),
            type_name,
        }
    }

    /// Borrow the value as a `T`, if that is what it is.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Whether the value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// The type name of the wrapped value, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::unit()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload<{}>", self.type_name)
    }
}

/// A message in flight between two actors.
///
/// Envelopes are created by `send`, `request` and `reply` and consumed once by dispatch.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// The actor that produced the message, `None` for messages injected by the embedding program.
    pub from: Option<ActorId>,
    /// Transaction reference of a request, `0` if no reply is expected.
    pub txn: u64,
    /// The destination actor.
    pub to: ActorId,
    /// Transaction reference this message answers, `0` if it is not a reply.
    pub reply_to: u64,
    /// How and where the destination handles the message.
    pub index: DispatchIndex,
    /// The destination pin (or router selector).
    pub pin: Rc<str>,
    /// The message value.
    pub payload: Payload,
}

impl Envelope {
    /// Whether the sender of this message expects a reply.
    pub fn expects_reply(&self) -> bool {
        self.txn > 0
    }

    /// Whether this message is a reply to an earlier request.
    pub fn is_reply(&self) -> bool {
        self.reply_to > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_downcast() {
        let p = Payload::new(42u32);
        assert!(p.is::<u32>());
        assert_eq!(Some(&42u32), p.get::<u32>());
        assert_eq!(None, p.get::<i64>());
        assert_eq!("u32", p.type_name());

        let shared = p.clone();
        assert_eq!(Some(&42u32), shared.get::<u32>());
    }

    #[test]
    fn boxed_payloads_keep_their_type() {
        let boxed: Box<dyn Any + Send> = Box::new(String::from("hello"));
        let p = Payload::from_boxed(boxed, std::any::type_name::<String>());
        assert_eq!(Some("hello"), p.get::<String>().map(|s| s.as_str()));
        assert!(format!("{:?}", p).contains("String"));
    }
}
