use std::process::ExitCode;

use grab_core::logging;

mod cli;

use crate::cli::Cli;

fn main() -> ExitCode {
    // Log to the XDG state file; fall back to stderr so the CLI still runs.
    if let Err(err) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable, using stderr: {:#}", err);
    }

    match Cli::run_from_args() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("grab error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
