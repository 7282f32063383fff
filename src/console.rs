use std::io::BufRead;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::leds::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Quit,
    Press(Color),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "" => None,
            "exit" | "quit" => Some(ConsoleCommand::Quit),
            word => word.parse().ok().map(ConsoleCommand::Press),
        }
    }
}

/// Read commands from stdin. Runs on a plain thread so a pending read never
/// holds up runtime shutdown.
pub fn spawn() -> mpsc::Receiver<ConsoleCommand> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match ConsoleCommand::parse(&line) {
                Some(cmd) => {
                    if tx.blocking_send(cmd).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("Unknown command '{}': type red, green, blue or exit", line.trim()),
            }
        }
        debug!("Console input closed");
    });
    rx
}
