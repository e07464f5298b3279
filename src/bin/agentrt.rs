//! `agentrt` — the agent runtime's CLI entrypoint (spec §6 "CLI surface").
//!
//! Drives `agentrt::cli::dispatch` against an on-disk `.agent/` directory,
//! installs a `ctrlc` handler so an in-flight run can be cancelled, and
//! exits with the code the CLI surface decided: `0` on success, `1` on a
//! loader error, validation error, or a run that completed with
//! `success=false`.
//!
//! # Usage
//!
//! ```bash
//! agentrt --list
//! agentrt --init --agent fix-issue
//! agentrt --agent fix-issue --issue 42 --cwd /path/to/repo
//! ```
//!
//! Agents are looked up under `AGENTRT_AGENTS_DIR` (default `.agent`).

use std::path::PathBuf;

use agentrt::cli::{dispatch, install_cancel_handler, parse_args};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw_args);

    let agents_root = std::env::var("AGENTRT_AGENTS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".agent"));

    let cancel = install_cancel_handler();
    let outcome = dispatch(args, &agents_root, cancel).await;

    if outcome.exit_code == 0 {
        println!("{}", outcome.message);
    } else {
        eprintln!("{}", outcome.message);
    }
    std::process::exit(outcome.exit_code);
}
