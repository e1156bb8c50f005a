//! ipxe-serve
//!
//! Serves iPXE binaries to network-booting machines over TFTP and HTTP.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGINT/SIGTERM/SIGHUP ──▶ lifetime ──┐
//!                                        ▼
//!   args ──▶ cli::execute ──▶ config ──▶ Server::listen_and_serve
//!                              │              ├──▶ TFTP task (udp :69)
//!                              │              └──▶ HTTP task (tcp :8080)
//!                              └──▶ logging, metrics, binaries dir
//! ```
//!
//! Exit status is 0 after a signal-initiated shutdown, 2 on usage errors and
//! 1 on any other failure.

use std::process::ExitCode;

use ipxe_serve::cli::{self, CliError};
use ipxe_serve::lifecycle::{spawn_signal_listener, Shutdown};

#[tokio::main]
async fn main() -> ExitCode {
    let lifetime = Shutdown::new();
    let _signals = spawn_signal_listener(lifetime.clone());

    match cli::execute(&lifetime, std::env::args_os()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(e)) => {
            let _ = e.print();
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("ipxe-serve: {e}");
            ExitCode::FAILURE
        }
    }
}
