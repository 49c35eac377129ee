use cellflow::prelude::*;
use std::{fs::OpenOptions, sync::Arc};

const FILE_NAME: &str = "/tmp/cellflow-logging-file";

#[derive(Default)]
struct Chatty;

impl Chatty {
    fn on_say(&mut self, tx: &mut Tx<'_>, msg: Payload) {
        if let Some(text) = msg.get::<&'static str>() {
            info!(tx.log(), "Saying: {}", text);
        }
    }
}

impl NodeCell for Chatty {
    fn register(handlers: &mut Handlers<Self>) {
        handlers.on("say", Chatty::on_say);
    }
}

// ANCHOR: main
pub fn main() {
    let mut conf = RuntimeConfig::default();
    let logger = {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(FILE_NAME)
            .expect("logging file");

        // create logger
        let decorator = slog_term::PlainSyncDecorator::new(file);
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).chan_size(2048).build().fuse();
        slog::Logger::root_typed(
            Arc::new(drain),
            o!(
            "location" => slog::PushFnValue(|r: &slog::Record<'_>, ser: slog::PushFnValueSerializer<'_>| {
                ser.emit(format_args!("{}:{}", r.file(), r.line()))
            })),
        )
    };
    conf.label("custom-logging").logger(logger);

    // every message to this node is logged at info, because of the "log" flag
    let chatty = NodeDecl::new("Chatty", "chatty", CellFactory::of_type::<Chatty>())
        .input("-> say")
        .debug_flags("log");
    let mut runtime = Runtime::new(conf, vec![chatty], Vec::new());
    runtime.start().expect("start");
    for text in ["one", "two", "three"] {
        runtime.inject("chatty", "say", text).expect("inject");
    }

    // remember that logging is asynchronous and won't happen if the runtime is stopped already
    std::thread::sleep(Duration::from_millis(1000));
    runtime.stop().expect("stop");
}
// ANCHOR_END: main

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging() {
        main();
        std::fs::remove_file(FILE_NAME).expect("remove log file");
    }
}
