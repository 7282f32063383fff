use rppal::gpio::{Event, Gpio, InputPin, OutputPin, Trigger};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Wiring;
use crate::error::Error;
use crate::leds::Color;

use super::{Board, ButtonEvent, LedMode};

/// 50 ms on, 50 ms off.
const BLINK_HZ: f64 = 10.0;
const BLINK_DUTY: f64 = 0.5;

struct Led {
    pin: OutputPin,
    mode: LedMode,
}

/// Raspberry Pi header: LEDs are active high, buttons pull the line low.
pub struct PiBoard {
    leds: Vec<Led>,
    // Held so the interrupt callbacks stay registered.
    _buttons: Vec<InputPin>,
}

impl PiBoard {
    pub fn open(wiring: &Wiring, button_tx: mpsc::Sender<ButtonEvent>) -> Result<Self, Error> {
        let gpio = Gpio::new()?;

        let mut leds = Vec::with_capacity(Color::ALL.len());
        for color in Color::ALL {
            let bcm = wiring.led_pins[color.index()];
            let mut pin = gpio.get(bcm)?.into_output_low();
            pin.set_reset_on_drop(true);
            debug!("LED {} on GPIO {}", color, bcm);
            leds.push(Led {
                pin,
                mode: LedMode::Off,
            });
        }

        let mut buttons = Vec::with_capacity(Color::ALL.len());
        for color in Color::ALL {
            let bcm = wiring.button_pins[color.index()];
            let mut pin = gpio.get(bcm)?.into_input_pullup();
            let tx = button_tx.clone();
            pin.set_async_interrupt(Trigger::Both, Some(wiring.debounce), move |event: Event| {
                let pressed = event.trigger == Trigger::FallingEdge;
                if tx.try_send(ButtonEvent { color, pressed }).is_err() {
                    warn!("Dropped {} button event, channel full or closed", color);
                }
            })?;
            debug!("Button {} on GPIO {}", color, bcm);
            buttons.push(pin);
        }

        info!(
            "GPIO ready (LEDs {:?}, buttons {:?})",
            wiring.led_pins, wiring.button_pins
        );

        Ok(Self {
            leds,
            _buttons: buttons,
        })
    }
}

impl Board for PiBoard {
    fn drive(&mut self, color: Color, mode: LedMode) -> Result<(), Error> {
        let led = &mut self.leds[color.index()];
        if led.mode == mode {
            return Ok(());
        }
        if led.mode == LedMode::Blinking {
            led.pin.clear_pwm()?;
        }
        match mode {
            LedMode::Off => led.pin.set_low(),
            LedMode::On => led.pin.set_high(),
            LedMode::Blinking => led.pin.set_pwm_frequency(BLINK_HZ, BLINK_DUTY)?,
        }
        led.mode = mode;
        Ok(())
    }

    fn mode(&self, color: Color) -> LedMode {
        self.leds[color.index()].mode
    }
}
