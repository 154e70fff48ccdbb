//! Line-oriented control from stdin.

use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use orbitfarm_dispatch::Coordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Save, then shut down.
    Quit,
    Sleep,
    Wake,
    Help,
}

impl ConsoleCommand {
    /// Only the first non-blank character counts, case-insensitive.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim_start().chars().next()?.to_ascii_lowercase() {
            'q' => Some(Self::Quit),
            's' => Some(Self::Sleep),
            'w' => Some(Self::Wake),
            '?' => Some(Self::Help),
            _ => None,
        }
    }
}

const HELP: &str = "Commands: q = save and quit, s = sleep, w = wake up, ? = help";

/// Apply one command to the running coordinator.
pub fn apply(command: ConsoleCommand, coordinator: &Coordinator) {
    match command {
        ConsoleCommand::Quit => coordinator.request_clean_stop(),
        ConsoleCommand::Sleep => coordinator.sleep(),
        ConsoleCommand::Wake => coordinator.wakeup(),
        ConsoleCommand::Help => info!("{HELP}"),
    }
}

/// Read `input` line by line until it closes or fails.
pub fn drive<R: BufRead>(input: R, coordinator: &Coordinator) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Ignoring console input: {e}");
                return;
            }
        };
        match ConsoleCommand::parse(&line) {
            Some(command) => {
                debug!(?command, "Console command");
                apply(command, coordinator);
            }
            None if line.trim().is_empty() => {}
            None => info!("Unknown command {:?}. {HELP}", line.trim()),
        }
    }
    warn!("Ignoring console input: stdin closed");
}

/// Start the detached stdin control thread.
pub fn spawn(coordinator: Arc<Coordinator>) {
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            info!("{HELP}");
            drive(std::io::stdin().lock(), &coordinator);
        })
        .expect("Failed to spawn console thread");
}
