use tokio::sync::mpsc;
use tracing::info;

use crate::config::Behavior;
use crate::console::ConsoleCommand;
use crate::error::Error;
use crate::gpio::{Board, ButtonEvent, LedMode};
use crate::leds::Color;

/// Apply one button edge to the LEDs.
pub fn handle_button(
    board: &mut dyn Board,
    behavior: Behavior,
    event: ButtonEvent,
) -> Result<(), Error> {
    match (behavior, event.pressed) {
        (Behavior::Toggle, true) => toggle(board, event.color),
        (Behavior::Scramble, true) => toggle(board, Color::ALL[fastrand::usize(..Color::ALL.len())]),
        (Behavior::Momentary, pressed) => {
            let mode = if pressed { LedMode::On } else { LedMode::Off };
            board.drive(event.color, mode)
        }
        (_, false) => Ok(()),
    }
}

fn toggle(board: &mut dyn Board, color: Color) -> Result<(), Error> {
    let mode = if board.mode(color).is_lit() {
        LedMode::Off
    } else {
        LedMode::On
    };
    board.drive(color, mode)
}

/// Drive the LEDs from the buttons until told to stop.
pub async fn run(
    mut board: Box<dyn Board>,
    behavior: Behavior,
    mut buttons: mpsc::Receiver<ButtonEvent>,
    mut console: mpsc::Receiver<ConsoleCommand>,
) -> Result<(), Error> {
    for color in Color::ALL {
        board.drive(color, LedMode::Off)?;
    }
    info!("Local {:?} mode; press a button, or type exit to quit", behavior);

    loop {
        tokio::select! {
            Some(event) = buttons.recv() => {
                handle_button(board.as_mut(), behavior, event)?;
            }
            Some(cmd) = console.recv() => match cmd {
                ConsoleCommand::Quit => {
                    info!("User has quit");
                    return Ok(());
                }
                // stdin has no release, so a typed press always toggles
                ConsoleCommand::Press(color) => toggle(board.as_mut(), color)?,
            },
            signal = crate::shutdown_signal() => {
                info!("Received {}, shutting down", signal);
                return Ok(());
            }
        }
    }
}
