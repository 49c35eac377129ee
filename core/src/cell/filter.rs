use crate::messaging::Envelope;
use std::{any::Any, fmt, sync::Arc};

/// The destinations a filter forwards one message to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// Every destination of the scope.
    All,
    /// The destination with the given name.
    One(String),
    /// The destinations with the given names, in this order.
    Many(Vec<String>),
    /// Drop the message.
    Nothing,
}

impl Selection {
    /// Select the single destination `name`.
    pub fn one<S: Into<String>>(name: S) -> Selection {
        Selection::One(name.into())
    }
}

/// The behaviour of a filter.
///
/// The default implementation broadcasts every message to all destinations of the matched scope.
pub trait FilterCell: 'static {
    /// Pick the destinations for `message` among the names of the matched scope.
    fn select(&mut self, _destinations: &[&str], _message: &Envelope) -> Selection {
        Selection::All
    }
}

/// A filter cell that forwards every message to all destinations.
#[derive(Clone, Copy, Debug, Default)]
pub struct Broadcast;

impl FilterCell for Broadcast {}

pub(crate) trait FilterInstance {
    fn choose(&mut self, destinations: &[&str], message: &Envelope) -> Selection;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: FilterCell> FilterInstance for C {
    fn choose(&mut self, destinations: &[&str], message: &Envelope) -> Selection {
        self.select(destinations, message)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Builds the cells of the filters that are declared with it.
#[derive(Clone)]
pub struct FilterFactory {
    type_name: &'static str,
    build: Arc<dyn Fn() -> Box<dyn FilterInstance> + Send + Sync>,
}

impl FilterFactory {
    /// A factory that calls `f` for every new filter cell.
    pub fn new<C, F>(f: F) -> FilterFactory
    where
        C: FilterCell,
        F: Fn() -> C + Send + Sync + 'static,
    {
        FilterFactory {
            type_name: std::any::type_name::<C>(),
            build: Arc::new(move || Box::new(f()) as Box<dyn FilterInstance>),
        }
    }

    /// A factory that builds `C::default()`.
    pub fn of_type<C>() -> FilterFactory
    where
        C: FilterCell + Default,
    {
        FilterFactory::new(C::default)
    }

    /// A factory for [Broadcast] cells.
    pub fn broadcast() -> FilterFactory {
        FilterFactory::of_type::<Broadcast>()
    }

    /// The type name of the cells this factory builds.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn build(&self) -> Box<dyn FilterInstance> {
        (self.build)()
    }
}

impl Default for FilterFactory {
    fn default() -> Self {
        FilterFactory::broadcast()
    }
}

impl fmt::Debug for FilterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterFactory({})", self.type_name)
    }
}
