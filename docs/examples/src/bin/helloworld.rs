// ANCHOR: cell
use cellflow::prelude::*;

#[derive(Default)]
struct HelloWorld;

// ANCHOR: lifecycle
impl NodeCell for HelloWorld {
    fn register(_handlers: &mut Handlers<Self>) {}

    fn on_start(&mut self, tx: &mut Tx<'_>) {
        info!(tx.log(), "Hello World!");
    }
}
// ANCHOR_END: lifecycle
// ANCHOR_END: cell

// ANCHOR: main
pub fn main() {
    // ANCHOR: declare
    let hello = NodeDecl::new("hello", "hello-1", CellFactory::of_type::<HelloWorld>());
    // ANCHOR_END: declare
    let mut runtime = Runtime::new(RuntimeConfig::default(), vec![hello], Vec::new());
    runtime.start().expect("start");
    // logging is asynchronous, give it a moment before shutting down
    std::thread::sleep(Duration::from_millis(100));
    runtime.stop().expect("stop");
}
// ANCHOR_END: main
