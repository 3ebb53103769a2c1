//! Entry point for the `beacond` binary.

use std::process::ExitCode;

#[expect(
    clippy::print_stderr,
    reason = "bootstrap failures may precede telemetry installation"
)]
fn main() -> ExitCode {
    match beacond::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("beacond: {error}");
            ExitCode::FAILURE
        }
    }
}
