use cellflow::prelude::*;
use crossbeam_channel::{unbounded, Sender};

const WAIT: Duration = Duration::from_secs(5);

struct Forwarder {
    out: Sender<u32>,
}

impl Forwarder {
    fn on_in(&mut self, tx: &mut Tx<'_>, msg: Payload) {
        if let Some(value) = msg.get::<u32>() {
            if self.out.send(*value).is_err() {
                warn!(tx.log(), "Test receiver is gone");
            }
        }
    }
}

impl NodeCell for Forwarder {
    fn register(handlers: &mut Handlers<Self>) {
        handlers.on("in", Forwarder::on_in);
    }
}

fn forwarder(out: Sender<u32>) -> NodeDecl {
    NodeDecl::new(
        "Forwarder",
        "fwd",
        CellFactory::function(move |_sx| Forwarder { out: out.clone() }),
    )
    .input("-> in")
}

#[test]
fn runtime_delivers_injected_messages() {
    let (out, received) = unbounded();
    let mut runtime = Runtime::new(RuntimeConfig::new(), vec![forwarder(out)], Vec::new());
    assert!(!runtime.is_running());
    runtime.start().expect("start");
    assert!(runtime.is_running());
    assert!(!runtime.is_faulty());
    assert_eq!(Err(RuntimeError::AlreadyRunning), runtime.start());

    runtime.inject("forwarder", "in", 7u32).expect("inject");
    assert_eq!(Ok(7), received.recv_timeout(WAIT));

    runtime.stop().expect("stop");
    assert!(!runtime.is_running());
    assert!(!runtime.is_faulty());
    assert_eq!(Err(RuntimeError::NotRunning), runtime.stop());
    assert_eq!(
        Err(RuntimeError::NotRunning),
        runtime.inject("fwd", "in", 8u32)
    );
}

#[test]
fn halted_runtime_keeps_messages_until_resumed() {
    let (out, received) = unbounded();
    let mut conf = RuntimeConfig::new();
    conf.label("halting");
    let mut runtime = Runtime::new(conf, vec![forwarder(out)], Vec::new());
    runtime.start().expect("start");

    runtime.halt().expect("halt");
    runtime.inject("fwd", "in", 1u32).expect("inject");
    assert!(received.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(runtime.is_halted());
    assert!(runtime.is_running());

    runtime.resume().expect("resume");
    assert_eq!(Ok(1), received.recv_timeout(WAIT));
    assert!(!runtime.is_halted());
    runtime.stop().expect("stop");
}

#[test]
fn runtime_can_be_restarted() {
    let (out, received) = unbounded();
    let mut runtime = Runtime::new(RuntimeConfig::new(), vec![forwarder(out)], Vec::new());
    for round in 0..2u32 {
        runtime.start().expect("start");
        runtime.inject("fwd", "in", round).expect("inject");
        assert_eq!(Ok(round), received.recv_timeout(WAIT));
        runtime.stop().expect("stop");
    }
}

#[test]
fn build_errors_are_reported_by_start() {
    let (out, _received) = unbounded();
    let nodes = vec![forwarder(out.clone()), forwarder(out)];
    let mut runtime = Runtime::new(RuntimeConfig::new(), nodes, Vec::new());
    assert_eq!(
        Err(RuntimeError::Build(GraphError::DuplicateUid("fwd".to_string()))),
        runtime.start()
    );
    assert!(!runtime.is_running());
    assert!(!runtime.is_faulty());
}

#[test]
fn invalid_config_is_reported_by_start() {
    let mut conf = RuntimeConfig::new();
    conf.idle_threshold(0);
    let mut runtime = Runtime::new(conf, Vec::new(), Vec::new());
    assert!(matches!(
        runtime.start(),
        Err(RuntimeError::Config(ConfigError::InvalidValue(_)))
    ));
}

#[test]
fn dropping_a_running_runtime_stops_it() {
    let (out, received) = unbounded();
    {
        let mut runtime = Runtime::new(RuntimeConfig::new(), vec![forwarder(out)], Vec::new());
        runtime.start().expect("start");
        runtime.inject("fwd", "in", 3u32).expect("inject");
        assert_eq!(Ok(3), received.recv_timeout(WAIT));
    }
    // the cell, and with it the last sender, is gone
    assert!(received.recv_timeout(WAIT).is_err());
}
