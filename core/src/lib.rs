//! Cellflow executes wired graphs of independently written cells.
//!
//! A graph consists of nodes, which wrap user-defined [cells](cell::NodeCell) with
//! named input and output pins, and filters, which route messages between them
//! by content. Wiring is declared with compact strings such as
//! `"out => [ \"in @ Worker (w1)\" ]"` and resolved once, when the graph is built.
//!
//! All cells of a graph run on a single thread, driven by a double-buffered
//! [Scheduler](runtime::Scheduler): every message produced during one tick is
//! delivered during the next one. Requests carry a transaction reference and
//! settle [completion groups](completion::CompletionGroup) when replies arrive,
//! or reject them when they time out.
//!
//! To get all cellflow related things into scope import `use cellflow::prelude::*;`.

use slog::{crit, debug, error, info, o, trace, warn, Drain, Fuse, Logger};
use slog_async::Async;
use std::sync::Arc;

pub mod actors;
pub mod cell;
pub mod completion;
pub mod config;
pub mod graph;
pub mod messaging;
pub mod runtime;
pub mod wiring;

/// To get all cellflow related things into scope import `use cellflow::prelude::*`.
pub mod prelude {
    pub use slog::{crit, debug, error, info, o, trace, warn, Drain, Fuse, Logger};

    pub use std::{any::Any, time::Duration};

    pub use hocon::Hocon;

    pub use crate::{
        cell::{
            Broadcast,
            CellFactory,
            FactoryKind,
            FilterCell,
            FilterFactory,
            Handler,
            Handlers,
            NodeCell,
            Selection,
        },
        completion::{Completion, CompletionGroup, RequestError, Settled},
        config::ConfigError,
        graph::{DebugSettings, FilterDecl, GraphError, NodeDecl},
        messaging::{ActorId, Envelope, Payload},
        runtime::{
            Runtime,
            RuntimeConfig,
            RuntimeError,
            Scheduler,
            TickOutcome,
            Tx,
            Wireless,
        },
        CellflowLogger,
    };
}

/// The logger type used throughout the runtime.
pub type CellflowLogger = Logger<Arc<Fuse<Async>>>;
