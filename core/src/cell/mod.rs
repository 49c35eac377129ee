//! User cells, their handler tables, and the factories that build them.
//!
//! A node cell declares which of its methods handle which input pins by
//! implementing [NodeCell::register]. The table is collected once per cell type,
//! when a [CellFactory] for it is created, and bound to the input pins of every
//! node that uses the factory when the node's cell is instantiated.

use super::*;
use crate::{messaging::Payload, runtime::Tx, wiring::parse_input};
use hocon::Hocon;
use std::{any::Any, fmt, sync::Arc};

mod filter;
pub use filter::*;

/// A handler for messages arriving on one input pin.
pub type Handler<C> = fn(&mut C, &mut Tx<'_>, Payload);

/// The behaviour of a node.
///
/// # Example
///
/// ```
/// use cellflow::prelude::*;
///
/// #[derive(Default)]
/// struct Counter {
///     count: u64,
/// }
///
/// impl Counter {
///     fn increment(&mut self, _tx: &mut Tx<'_>, _msg: Payload) {
///         self.count += 1;
///     }
///
///     fn get(&mut self, tx: &mut Tx<'_>, _msg: Payload) {
///         tx.reply(Payload::new(self.count));
///     }
/// }
///
/// impl NodeCell for Counter {
///     fn register(handlers: &mut Handlers<Self>) {
///         handlers
///             .on("onIncrement", Counter::increment)
///             .on("=> get", Counter::get);
///     }
/// }
/// ```
pub trait NodeCell: Any + Sized {
    /// Declare the handlers of this cell type.
    fn register(handlers: &mut Handlers<Self>);

    /// Called once after every cell of the graph has been instantiated.
    fn on_start(&mut self, _tx: &mut Tx<'_>) {}
}

/// An ordered table of named handlers for cells of type `C`.
///
/// Names can be given as the plain pin name (`"get value"`), in the legacy
/// arrow form (`"=> get value"`), or in the canonical form (`"onGetValue"`).
pub struct Handlers<C> {
    entries: Vec<(String, Handler<C>)>,
}

impl<C> Handlers<C> {
    fn new() -> Handlers<C> {
        Handlers {
            entries: Vec::new(),
        }
    }

    /// Register `handler` under `name`.
    pub fn on<S>(&mut self, name: S, handler: Handler<C>) -> &mut Self
    where
        S: Into<String>,
    {
        self.entries.push((name.into(), handler));
        self
    }

    /// The number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first handler whose name matches `pin`.
    pub fn find(&self, pin: &str) -> Option<Handler<C>> {
        self.entries
            .iter()
            .find(|(name, _)| handler_matches(name, pin))
            .map(|(_, handler)| *handler)
    }
}

impl<C: NodeCell> Handlers<C> {
    fn collect() -> Handlers<C> {
        let mut handlers = Handlers::new();
        C::register(&mut handlers);
        handlers
    }
}

/// The canonical handler name for `pin`: `"get value"` becomes `"onGetValue"`.
pub fn canonical_handler_name(pin: &str) -> String {
    let mut name = String::from("on");
    let mut word_start = true;
    for c in pin.chars() {
        if c.is_alphanumeric() {
            if word_start {
                name.extend(c.to_uppercase());
            } else {
                name.push(c);
            }
            word_start = false;
        } else {
            word_start = true;
        }
    }
    name
}

fn handler_matches(name: &str, pin: &str) -> bool {
    let name = name.trim();
    name == pin
        || parse_input(name).map_or(false, |input| input.name == pin)
        || name == canonical_handler_name(pin)
}

/// How a [CellFactory] produces its cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactoryKind {
    /// A user function builds the cell from the node settings.
    Function,
    /// The cell is the `Default` value of its type.
    Type,
}

type BuildFn = dyn Fn(&Hocon, &[String]) -> Box<dyn CellInstance> + Send + Sync;

/// Builds the cells of the nodes that are declared with it.
#[derive(Clone)]
pub struct CellFactory {
    kind: FactoryKind,
    type_name: &'static str,
    build: Arc<BuildFn>,
}

impl CellFactory {
    /// A factory that calls `f` with the node settings.
    pub fn function<C, F>(f: F) -> CellFactory
    where
        C: NodeCell,
        F: Fn(&Hocon) -> C + Send + Sync + 'static,
    {
        let handlers = Arc::new(Handlers::<C>::collect());
        CellFactory {
            kind: FactoryKind::Function,
            type_name: std::any::type_name::<C>(),
            build: Arc::new(move |settings, pins| {
                Box::new(BoundCell::bind(f(settings), &handlers, pins)) as Box<dyn CellInstance>
            }),
        }
    }

    /// A factory that builds `C::default()`.
    pub fn of_type<C>() -> CellFactory
    where
        C: NodeCell + Default,
    {
        let handlers = Arc::new(Handlers::<C>::collect());
        CellFactory {
            kind: FactoryKind::Type,
            type_name: std::any::type_name::<C>(),
            build: Arc::new(move |_settings, pins| {
                Box::new(BoundCell::bind(C::default(), &handlers, pins)) as Box<dyn CellInstance>
            }),
        }
    }

    /// How this factory builds its cells.
    pub fn kind(&self) -> FactoryKind {
        self.kind
    }

    /// The type name of the cells this factory builds.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Build a cell and bind its handlers to `pins`, in order.
    pub(crate) fn build(&self, settings: &Hocon, pins: &[String]) -> Box<dyn CellInstance> {
        (self.build)(settings, pins)
    }
}

impl fmt::Debug for CellFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellFactory({:?}, {})", self.kind, self.type_name)
    }
}

/// A cell of any type, with its handlers bound to input slots.
pub(crate) trait CellInstance {
    fn invoke(&mut self, slot: usize, tx: &mut Tx<'_>, payload: Payload);
    fn start(&mut self, tx: &mut Tx<'_>);
    fn unbound(&self) -> Vec<&str>;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_name(&self) -> &'static str;
}

enum Binding<C> {
    Handler(Handler<C>),
    Missing(String),
}

struct BoundCell<C> {
    cell: C,
    bindings: Vec<Binding<C>>,
}

impl<C: NodeCell> BoundCell<C> {
    fn bind(cell: C, handlers: &Handlers<C>, pins: &[String]) -> BoundCell<C> {
        let bindings = pins
            .iter()
            .map(|pin| match handlers.find(pin) {
                Some(handler) => Binding::Handler(handler),
                None => Binding::Missing(pin.clone()),
            })
            .collect();
        BoundCell { cell, bindings }
    }
}

impl<C: NodeCell> CellInstance for BoundCell<C> {
    fn invoke(&mut self, slot: usize, tx: &mut Tx<'_>, payload: Payload) {
        match self.bindings.get(slot) {
            Some(Binding::Handler(handler)) => handler(&mut self.cell, tx, payload),
            Some(Binding::Missing(pin)) => {
                warn!(tx.log(), "Dropping message on pin without handler"; "pin" => pin, "payload" => payload.type_name());
            }
            None => {
                error!(tx.log(), "Dropping message for unknown input slot"; "slot" => slot);
            }
        }
    }

    fn start(&mut self, tx: &mut Tx<'_>) {
        self.cell.on_start(tx);
    }

    fn unbound(&self) -> Vec<&str> {
        self.bindings
            .iter()
            .filter_map(|binding| match binding {
                Binding::Missing(pin) => Some(pin.as_str()),
                Binding::Handler(_) => None,
            })
            .collect()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        &mut self.cell
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<C>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Probe;

    impl Probe {
        fn first(&mut self, _tx: &mut Tx<'_>, _msg: Payload) {}
        fn second(&mut self, _tx: &mut Tx<'_>, _msg: Payload) {}
    }

    impl NodeCell for Probe {
        fn register(handlers: &mut Handlers<Self>) {
            handlers
                .on("onGetValue", Probe::first)
                .on("get value", Probe::second)
                .on("-> ping", Probe::second)
                .on("set-value", Probe::first);
        }
    }

    #[test]
    fn canonical_names() {
        assert_eq!("onPing", canonical_handler_name("ping"));
        assert_eq!("onGetValue", canonical_handler_name("get value"));
        assert_eq!("onSetValue", canonical_handler_name("set-value"));
        assert_eq!("onAlreadyCamel", canonical_handler_name("alreadyCamel"));
    }

    #[test]
    fn first_matching_handler_wins() {
        let handlers = Handlers::<Probe>::collect();
        assert_eq!(4, handlers.len());
        let found = handlers.find("get value").expect("handler");
        assert_eq!(Probe::first as Handler<Probe> as usize, found as usize);
        assert!(handlers.find("ping").is_some());
        assert!(handlers.find("set-value").is_some());
        assert!(handlers.find("pong").is_none());
    }

    #[test]
    fn unmatched_pins_stay_visible() {
        let factory = CellFactory::of_type::<Probe>();
        assert_eq!(FactoryKind::Type, factory.kind());
        let pins = vec!["ping".to_string(), "missing".to_string()];
        let cell = factory.build(&Hocon::Null, &pins);
        assert_eq!(vec!["missing"], cell.unbound());
        assert!(cell.type_name().contains("Probe"));
    }
}
