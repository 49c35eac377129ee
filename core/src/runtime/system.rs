use super::*;

use crate::{
    graph::{FilterDecl, NodeDecl},
    messaging::Payload,
    runtime::lifecycle,
};
use crossbeam_channel::{self as channel, select, Receiver, Sender};
use std::{
    any::Any,
    thread,
    time::Instant,
};
use uuid::Uuid;

enum Control {
    Halt,
    Resume,
    Inject {
        actor: String,
        pin: String,
        value: Box<dyn Any + Send>,
        type_name: &'static str,
    },
    Stop,
}

struct RuntimeThread {
    control: Sender<Control>,
    thread: thread::JoinHandle<()>,
    logger: CellflowLogger,
}

/// A graph driven by a [Scheduler] on a dedicated thread.
///
/// The thread ticks at the scheduler's current pacing delay,
/// and reacts to control commands in between ticks.
///
/// # Example
///
/// ```
/// use cellflow::prelude::*;
///
/// #[derive(Default)]
/// struct Sink;
///
/// impl Sink {
///     fn on_data(&mut self, tx: &mut Tx<'_>, msg: Payload) {
///         info!(tx.log(), "Got {:?}", msg.get::<u32>());
///     }
/// }
///
/// impl NodeCell for Sink {
///     fn register(handlers: &mut Handlers<Self>) {
///         handlers.on("data", Sink::on_data);
///     }
/// }
///
/// let sink = NodeDecl::new("sink", "s1", CellFactory::of_type::<Sink>()).input("-> data");
/// let mut runtime = Runtime::new(RuntimeConfig::new(), vec![sink], Vec::new());
/// runtime.start().expect("start");
/// runtime.inject("sink", "data", 42u32).expect("inject");
/// runtime.stop().expect("stop");
/// ```
pub struct Runtime {
    id: Uuid,
    config: RuntimeConfig,
    nodes: Vec<NodeDecl>,
    filters: Vec<FilterDecl>,
    state: Arc<AtomicUsize>,
    thread: Option<RuntimeThread>,
}

impl Runtime {
    /// Create a stopped runtime for the given declarations.
    pub fn new(config: RuntimeConfig, nodes: Vec<NodeDecl>, filters: Vec<FilterDecl>) -> Runtime {
        Runtime {
            id: Uuid::new_v4(),
            config,
            nodes,
            filters,
            state: Arc::new(lifecycle::initial_state()),
            thread: None,
        }
    }

    /// The unique id of this runtime, also part of its logger context.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Build the graph on a new scheduler thread and start ticking.
    ///
    /// Configuration and graph build errors are reported here,
    /// before any cell is instantiated.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.thread.is_some() {
            return Err(RuntimeError::AlreadyRunning);
        }
        let mut settings = self.config.resolve()?;
        settings.logger = settings.logger.new(o!("id" => self.id.to_string()));
        let logger = settings.logger.clone();
        let (control, commands) = channel::unbounded();
        let (report, built) = channel::bounded(1);
        let nodes = self.nodes.clone();
        let filters = self.filters.clone();
        let state = self.state.clone();
        let spawned = thread::Builder::new()
            .name(format!("cellflow-{}", settings.label))
            .spawn(move || {
                let scheduler = match Scheduler::with_settings(settings, &nodes, &filters) {
                    Ok(scheduler) => {
                        let _ = report.send(Ok(()));
                        scheduler
                    }
                    Err(e) => {
                        let _ = report.send(Err(e));
                        return;
                    }
                };
                run(scheduler, commands, state);
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!(logger, "Could not spawn the scheduler thread: {}", e);
                return Err(RuntimeError::Disconnected);
            }
        };
        match built.recv() {
            Ok(Ok(())) => {
                debug!(logger, "Runtime started");
                lifecycle::set_active(&self.state);
                self.thread = Some(RuntimeThread {
                    control,
                    thread: handle,
                    logger,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(logger, "Could not build the graph: {}", e);
                let _ = handle.join();
                Err(RuntimeError::Build(e))
            }
            Err(_) => {
                let _ = handle.join();
                lifecycle::set_faulty(&self.state);
                Err(RuntimeError::ThreadPanicked)
            }
        }
    }

    /// Stop ticking, discard all cells, and join the scheduler thread.
    pub fn stop(&mut self) -> Result<(), RuntimeError> {
        let runtime_thread = self.thread.take().ok_or(RuntimeError::NotRunning)?;
        // the thread may already be gone, which join reports below
        let _ = runtime_thread.control.send(Control::Stop);
        match runtime_thread.thread.join() {
            Ok(()) => {
                lifecycle::set_stopped(&self.state);
                debug!(runtime_thread.logger, "Runtime stopped");
                Ok(())
            }
            Err(_) => {
                crit!(runtime_thread.logger, "Scheduler thread panicked");
                lifecycle::set_faulty(&self.state);
                Err(RuntimeError::ThreadPanicked)
            }
        }
    }

    /// Pause ticking. Queued messages and outstanding requests are kept.
    pub fn halt(&self) -> Result<(), RuntimeError> {
        self.command(Control::Halt)
    }

    /// Continue ticking after [halt](Runtime::halt).
    pub fn resume(&self) -> Result<(), RuntimeError> {
        self.command(Control::Resume)
    }

    /// Deliver `value` to `pin` on the actor with uid or name `actor`.
    ///
    /// Unknown destinations are logged and dropped by the scheduler thread.
    pub fn inject<T>(&self, actor: &str, pin: &str, value: T) -> Result<(), RuntimeError>
    where
        T: Any + Send,
    {
        self.command(Control::Inject {
            actor: actor.to_string(),
            pin: pin.to_string(),
            value: Box::new(value),
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Whether the scheduler thread is up, ticking or halted.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
            && (lifecycle::is_active(&self.state) || lifecycle::is_halted(&self.state))
    }

    /// Whether ticking is currently paused.
    pub fn is_halted(&self) -> bool {
        self.thread.is_some() && lifecycle::is_halted(&self.state)
    }

    /// Whether the scheduler thread died or could not be joined.
    ///
    /// A faulty runtime can be started again.
    pub fn is_faulty(&self) -> bool {
        lifecycle::is_faulty(&self.state)
    }

    fn command(&self, command: Control) -> Result<(), RuntimeError> {
        let runtime_thread = self.thread.as_ref().ok_or(RuntimeError::NotRunning)?;
        runtime_thread
            .control
            .send(command)
            .map_err(|_| RuntimeError::Disconnected)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.stop() {
                eprintln!("Error stopping runtime {} on drop: {}", self.id, e);
            }
        }
    }
}

fn run(mut scheduler: Scheduler, commands: Receiver<Control>, state: Arc<AtomicUsize>) {
    let logger = scheduler.logger().clone();
    scheduler.start(Instant::now());
    lifecycle::set_active(&state);
    let mut halted = false;
    let mut next_tick = Instant::now() + scheduler.next_delay();
    loop {
        let timer = if halted {
            channel::never()
        } else {
            channel::at(next_tick)
        };
        select! {
            recv(commands) -> command => match command {
                Ok(Control::Halt) => {
                    halted = true;
                    lifecycle::set_halted(&state);
                    debug!(logger, "Halted");
                }
                Ok(Control::Resume) => {
                    if halted {
                        halted = false;
                        next_tick = Instant::now();
                        lifecycle::set_active(&state);
                        debug!(logger, "Resumed");
                    }
                }
                Ok(Control::Inject { actor, pin, value, type_name }) => {
                    scheduler.inject(&actor, &pin, Payload::from_boxed(value, type_name));
                }
                Ok(Control::Stop) | Err(_) => break,
            },
            recv(timer) -> _ => {
                scheduler.tick(Instant::now());
                next_tick = Instant::now() + scheduler.next_delay();
            }
        }
    }
    scheduler.stop();
    lifecycle::set_stopped(&state);
}
