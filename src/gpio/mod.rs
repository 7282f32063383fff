pub mod pi;

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::Wiring;
use crate::error::Error;
use crate::leds::{Color, LedState};

/// What an LED output is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Off,
    On,
    /// Flashing to show a requested state that has not been confirmed yet.
    Blinking,
}

impl LedMode {
    pub fn is_lit(self) -> bool {
        self != LedMode::Off
    }
}

/// A button edge, already debounced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub color: Color,
    pub pressed: bool,
}

/// Three LED outputs, one per color.
pub trait Board: Send {
    fn drive(&mut self, color: Color, mode: LedMode) -> Result<(), Error>;

    fn mode(&self, color: Color) -> LedMode;
}

/// Set every LED to match `state`. With `pending`, lit LEDs blink instead
/// of staying steady. Returns the state now shown, blinking counted as lit.
pub fn show(board: &mut dyn Board, state: &LedState, pending: bool) -> Result<LedState, Error> {
    debug!("Setting LEDs to {} (pending: {})", state, pending);
    for color in Color::ALL {
        let mode = match (state.get(color), pending) {
            (false, _) => LedMode::Off,
            (true, false) => LedMode::On,
            (true, true) => LedMode::Blinking,
        };
        board.drive(color, mode)?;
    }
    Ok(current(board))
}

/// Read the LED state back from the board.
pub fn current(board: &dyn Board) -> LedState {
    let mut state = LedState::default();
    for color in Color::ALL {
        state.set(color, board.mode(color).is_lit());
    }
    state
}

/// In-memory board for running without GPIO hardware. LED changes are logged.
#[derive(Debug, Default)]
pub struct VirtualBoard {
    modes: HashMap<Color, LedMode>,
}

impl VirtualBoard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Board for VirtualBoard {
    fn drive(&mut self, color: Color, mode: LedMode) -> Result<(), Error> {
        if self.mode(color) != mode {
            info!("LED {}: {:?}", color, mode);
        }
        self.modes.insert(color, mode);
        Ok(())
    }

    fn mode(&self, color: Color) -> LedMode {
        self.modes.get(&color).copied().unwrap_or(LedMode::Off)
    }
}

/// Open the board described by `wiring`. Button events are delivered on the
/// returned channel; the virtual board never produces any.
pub fn open(wiring: &Wiring) -> Result<(Box<dyn Board>, mpsc::Receiver<ButtonEvent>), Error> {
    let (button_tx, button_rx) = mpsc::channel(32);
    let board: Box<dyn Board> = if wiring.virtual_gpio {
        info!("Using virtual GPIO; type red, green or blue to press a button");
        drop(button_tx);
        Box::new(VirtualBoard::new())
    } else {
        Box::new(pi::PiBoard::open(wiring, button_tx)?)
    };
    Ok((board, button_rx))
}
