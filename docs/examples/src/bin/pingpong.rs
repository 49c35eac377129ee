use cellflow::prelude::*;
use crossbeam_channel::{bounded, Sender};

const ROUNDS: u64 = 10;

#[derive(Debug, Clone, Copy)]
struct Ping(u64);

#[derive(Debug, Clone, Copy)]
struct Pong(u64);

struct Pinger {
    pongs: u64,
    done: Sender<u64>,
}

impl Pinger {
    fn new(done: Sender<u64>) -> Self {
        Pinger { pongs: 0, done }
    }

    fn ping(&mut self, tx: &mut Tx<'_>) {
        tx.request("ping", Payload::new(Ping(self.pongs)), Duration::from_millis(500))
            .then::<Pinger, _>(|pinger, tx, reply| {
                pinger.on_pong(tx, &reply);
                reply
            })
            .catch::<Pinger, _>(|_pinger, tx, error| {
                error!(tx.log(), "Ping failed: {}", error);
                Payload::unit()
            });
    }

    fn on_pong(&mut self, tx: &mut Tx<'_>, reply: &Payload) {
        if let Some(Pong(n)) = reply.get::<Pong>() {
            info!(tx.log(), "Got pong #{}", n);
            self.pongs += 1;
            if self.pongs < ROUNDS {
                self.ping(tx);
            } else if self.done.send(self.pongs).is_err() {
                warn!(tx.log(), "Nobody is waiting for the result");
            }
        }
    }
}

impl NodeCell for Pinger {
    fn register(_handlers: &mut Handlers<Self>) {}

    fn on_start(&mut self, tx: &mut Tx<'_>) {
        self.ping(tx);
    }
}

#[derive(Default)]
struct Ponger;

impl Ponger {
    fn on_ping(&mut self, tx: &mut Tx<'_>, msg: Payload) {
        if let Some(Ping(n)) = msg.get::<Ping>() {
            info!(tx.log(), "Got ping #{}", n);
            tx.reply(Payload::new(Pong(*n)));
        }
    }
}

impl NodeCell for Ponger {
    fn register(handlers: &mut Handlers<Self>) {
        handlers.on("=> ping", Ponger::on_ping);
    }
}

pub fn main() {
    let (done, finished) = bounded(1);
    let pinger = NodeDecl::new(
        "Pinger",
        "pinger",
        CellFactory::function(move |_sx| Pinger::new(done.clone())),
    )
    .output("ping => ping @ Ponger (ponger)");
    let ponger = NodeDecl::new("Ponger", "ponger", CellFactory::of_type::<Ponger>())
        .input("=> ping")
        .debug_flags("log");
    let mut runtime = Runtime::new(RuntimeConfig::default(), vec![pinger, ponger], Vec::new());
    runtime.start().expect("start");
    let rounds = finished
        .recv_timeout(Duration::from_secs(10))
        .expect("ping pong rounds");
    assert_eq!(ROUNDS, rounds);
    runtime.stop().expect("stop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pingpong() {
        main();
    }
}
