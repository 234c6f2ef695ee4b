#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Command-line host for the drum sequencer.
//!
//! Reads one RON-encoded `Command` per line from stdin, for example:
//!
//! ```text
//! Toggle(track: 1, step: 1)
//! Toggle(track: 2, step: 5)
//! Play
//! Run(Steps(16))
//! Export("beat.mid")
//! ```
//!
//! An optional first argument is the path to a RON config file (see `drum_sequencer::Config`).
//! Triggers and other output go to stdout, errors and logs go to stderr. Set `RUST_LOG` to change
//! the log level.

use drum_sequencer::{session::Session, Config};
use std::{
    env,
    io::{self, BufRead},
    path::Path,
    process,
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = match env::args_os().nth(1) {
        Some(path) => match Config::load(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    let mut session = Session::new(config);

    let stdin = io::stdin();
    let stdin = stdin.lock();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    for line in stdin.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("{}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let cmd = match ron::from_str(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        if let Err(e) = session.update(cmd, &mut stdout) {
            eprintln!("{}", e);
        }
    }
}
