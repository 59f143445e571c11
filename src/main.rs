// src/main.rs

use taskgraph::engine::GraphOutcome;
use taskgraph::{cli, logging, run};

fn main() {
    match run_main() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("taskgraph error: {err:?}");
            std::process::exit(1);
        }
    }
}

/// The main thread doubles as the coordinator thread, so no async runtime
/// is installed here; the executor owns its own.
fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    let code = match run(args)? {
        Some(GraphOutcome::Canceled(_)) => 1,
        _ => 0,
    };
    Ok(code)
}
