use tracing::{debug, info};

use crate::config::DeviceTopics;
use crate::error::Error;
use crate::gpio::{self, Board};
use crate::leds::{Color, LedState};
use crate::mqtt::MqttMessage;

use super::{Demo, parse};

/// Plain publish/subscribe: a button press asks for its LED to be lit, and
/// every device following the button device lights its LEDs to match, then
/// reports what it shows.
pub struct PubSubDemo {
    board: Box<dyn Board>,
    own: DeviceTopics,
    button_desired: String,
}

impl PubSubDemo {
    pub fn new(board: Box<dyn Board>, client_id: &str, button_client: &str) -> Self {
        Self {
            board,
            own: DeviceTopics::new(client_id),
            button_desired: DeviceTopics::new(button_client).led_state_desired(),
        }
    }
}

impl Demo for PubSubDemo {
    fn subscriptions(&self) -> Vec<String> {
        vec![self.button_desired.clone()]
    }

    fn on_ready(&mut self) -> Result<Vec<MqttMessage>, Error> {
        info!("Waiting for messages on '{}'", self.button_desired);
        Ok(Vec::new())
    }

    fn on_message(&mut self, msg: &MqttMessage) -> Result<Vec<MqttMessage>, Error> {
        if msg.topic != self.button_desired {
            debug!("Ignoring message on {}", msg.topic);
            return Ok(Vec::new());
        }
        let desired: LedState = parse(msg)?;
        let shown = gpio::show(self.board.as_mut(), &desired, false)?;
        info!("LED state set to {}", shown);
        Ok(vec![MqttMessage::json(self.own.led_state_reported(), &shown)?])
    }

    fn on_button(&mut self, color: Color) -> Result<Vec<MqttMessage>, Error> {
        let desired = LedState::only(color);
        info!("Button pressed: {}, desired state {}", color, desired);
        Ok(vec![MqttMessage::json(self.own.led_state_desired(), &desired)?])
    }
}
