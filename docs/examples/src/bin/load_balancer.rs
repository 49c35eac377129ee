use cellflow::prelude::*;
use crossbeam_channel::{unbounded, Sender};
use rand::{rngs::SmallRng, Rng, SeedableRng};

const REQUESTS: usize = 12;

#[derive(Debug, Clone)]
struct Work(usize);

#[derive(Debug, Clone)]
struct Done {
    work: usize,
    worker: String,
}

struct Client {
    results: Sender<Done>,
}

impl NodeCell for Client {
    fn register(_handlers: &mut Handlers<Self>) {}

    fn on_start(&mut self, tx: &mut Tx<'_>) {
        for i in 0..REQUESTS {
            tx.request("work", Payload::new(Work(i)), Duration::from_secs(1))
                .then::<Client, _>(|client, tx, reply| {
                    if let Some(done) = reply.get::<Done>() {
                        debug!(tx.log(), "Work #{} was done by {}", done.work, done.worker);
                        if client.results.send(done.clone()).is_err() {
                            warn!(tx.log(), "Nobody is collecting results");
                        }
                    }
                    reply
                });
        }
    }
}

struct Worker {
    name: String,
}

impl Worker {
    fn from_settings(sx: &Hocon) -> Worker {
        Worker {
            name: sx["name"].as_string().unwrap_or_else(|| "anonymous".to_string()),
        }
    }

    fn on_work(&mut self, tx: &mut Tx<'_>, msg: Payload) {
        if let Some(Work(n)) = msg.get::<Work>() {
            tx.reply(Payload::new(Done {
                work: *n,
                worker: self.name.clone(),
            }));
        }
    }
}

impl NodeCell for Worker {
    fn register(handlers: &mut Handlers<Self>) {
        handlers.on("onWork", Worker::on_work);
    }
}

/// Picks a random worker for every message.
struct RandomPick {
    rng: SmallRng,
}

impl Default for RandomPick {
    fn default() -> Self {
        RandomPick {
            rng: SmallRng::from_entropy(),
        }
    }
}

impl FilterCell for RandomPick {
    fn select(&mut self, destinations: &[&str], _message: &Envelope) -> Selection {
        if destinations.is_empty() {
            Selection::Nothing
        } else {
            let index = self.rng.gen_range(0..destinations.len());
            Selection::one(destinations[index])
        }
    }
}

pub fn main() {
    let (results, collected) = unbounded();
    let client = NodeDecl::new(
        "Client",
        "client",
        CellFactory::function(move |_sx| Client {
            results: results.clone(),
        }),
    )
    .output("work => work @ Balancer (lb)");
    let workers: Vec<NodeDecl> = (1..=3)
        .map(|i| {
            NodeDecl::new(
                format!("Worker{}", i),
                format!("w{}", i),
                CellFactory::function(Worker::from_settings),
            )
            .input("=> work")
            .settings_str(&format!("name = \"worker-{}\"", i))
            .expect("worker settings")
        })
        .collect();
    let balancer = FilterDecl::new("Balancer", "lb")
        .filter(FilterFactory::of_type::<RandomPick>())
        .route(r#"work : "work @ Worker1 (w1)" "work @ Worker2 (w2)" "work @ Worker3 (w3)""#);

    let mut nodes = vec![client];
    nodes.extend(workers);
    let mut runtime = Runtime::new(RuntimeConfig::default(), nodes, vec![balancer]);
    runtime.start().expect("start");
    let mut done: Vec<Done> = Vec::with_capacity(REQUESTS);
    for _ in 0..REQUESTS {
        done.push(
            collected
                .recv_timeout(Duration::from_secs(5))
                .expect("result"),
        );
    }
    runtime.stop().expect("stop");

    done.sort_by_key(|d| d.work);
    for d in done.iter() {
        println!("Work #{} was done by {}", d.work, d.worker);
    }
    assert!(done.iter().map(|d| d.work).eq(0..REQUESTS));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_balancer() {
        main();
    }
}
