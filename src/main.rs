//! Binary entrypoint that launches the Drishti terminal client.

use std::process::ExitCode;

use drishti_client::start_drishti_client;

/// Start the client with configuration taken from the environment.
fn main() -> ExitCode {
    start_drishti_client::run()
}
