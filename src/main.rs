mod cmd;
mod opt;
mod repl;

use std::{
    io,
    process,
    sync::{Arc, atomic::AtomicBool},
    thread,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use lambded::Session;

// nested calls recurse on the native stack.
const STACK_SIZE: usize = 256 * 1024 * 1024;

fn main() {
    init_logging();
    let options = match opt::parse_cmdline_options() {
        None => return,
        Some(options) => options,
    };
    let runner = thread::Builder::new()
        .name("lambded".to_string())
        .stack_size(STACK_SIZE)
        .spawn(move || run(options));
    let code = match runner.map(|handle| handle.join()) {
        Ok(Ok(code)) => code,
        Ok(Err(_)) => 101,
        Err(e) => {
            eprintln!("failed to start evaluator thread: {}", e);
            1
        },
    };
    process::exit(code);
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("LAMBDED_LOG")
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(options: opt::Options) -> i32 {
    let interrupt = Arc::new(AtomicBool::new(false));
    if options.interactive {
        if let Err(e) = signal_hook::flag::register(signal_hook::SIGINT, Arc::clone(&interrupt)) {
            warn!("failed to install SIGINT handler: {}", e);
        }
    }
    let mut session = Session::new(options.limits, Some(Arc::clone(&interrupt)));

    for file in &options.files {
        if !opt::load_file(Some(file), &mut session) {
            return 1;
        }
    }
    if !options.interactive {
        // never start the prompt when -n is used
        if options.files.is_empty() && !opt::load_file(None, &mut session) {
            return 1;
        }
        return 0;
    }
    repl::read_eval_print_loop(session, interrupt);
    0
}
