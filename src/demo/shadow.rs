use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{DeviceTopics, Role, ShadowConfig};
use crate::error::Error;
use crate::gpio::{self, Board};
use crate::leds::{Color, LedState};
use crate::mqtt::MqttMessage;
use crate::shadow::{
    self, DeltaEvent, ErrorResponse, ReportRequest, ShadowDocument, ShadowTopics, Source,
};

use super::{Demo, parse};

/// `led_state/reported` payload, republished by the `On_shadow_updated` rule.
#[derive(Debug, Deserialize)]
struct ReportedMessage {
    reported: LedState,
}

/// Device Shadow demo. The buttons device asks for a state, topic rules turn
/// that into a pending notice and a desired shadow state, the LED device
/// applies the delta and reports, and the report comes back to the buttons
/// device as confirmation.
pub struct ShadowDemo {
    board: Box<dyn Board>,
    role: Role,
    own: DeviceTopics,
    /// Shadow this device reports to.
    shadow: ShadowTopics,
    /// Shadow read on startup; belongs to the LED device.
    led_shadow: ShadowTopics,
    /// A delta arrived after the last get request was sent.
    delta_applied: bool,
}

impl ShadowDemo {
    pub fn new(board: Box<dyn Board>, config: &ShadowConfig, client_id: &str) -> Self {
        Self {
            board,
            role: config.role,
            own: DeviceTopics::new(client_id),
            shadow: ShadowTopics::new(&config.thing_name),
            led_shadow: ShadowTopics::new(&config.led_thing_name),
            delta_applied: false,
        }
    }

    /// Show `state` steadily and report it.
    fn apply(&mut self, state: &LedState) -> Result<Vec<MqttMessage>, Error> {
        let shown = gpio::show(self.board.as_mut(), state, false)?;
        info!("LED state set to {}", shown);
        Ok(self.report()?.into_iter().collect())
    }

    /// Only the LED device writes `reported` to the shadow.
    fn report(&self) -> Result<Option<MqttMessage>, Error> {
        if self.role != Role::Leds {
            debug!("Not reporting to the shadow from a buttons device");
            return Ok(None);
        }
        let state = gpio::current(self.board.as_ref());
        info!("Updating reported shadow value to {}", state);
        MqttMessage::json(self.shadow.update(), &ReportRequest::new(state)).map(Some)
    }

    fn on_get_accepted(&mut self, msg: &MqttMessage) -> Result<Vec<MqttMessage>, Error> {
        let document: ShadowDocument = parse(msg)?;
        if self.delta_applied {
            info!("Ignoring shadow document, a delta event was already applied");
            return Ok(Vec::new());
        }
        debug!("Shadow document version {:?}", document.version);
        let (state, source) = shadow::initial_state(&document);
        match source {
            Source::Desired => info!("Shadow contains desired value {}", state),
            Source::Reported => info!("Shadow contains reported value {}", state),
            Source::Default => info!("Shadow holds no LED state, setting defaults"),
        }
        self.apply(&state)
    }

    fn on_get_rejected(&mut self, msg: &MqttMessage) -> Result<Vec<MqttMessage>, Error> {
        let error: ErrorResponse = parse(msg)?;
        if error.code != shadow::NOT_FOUND {
            return Err(Error::ShadowRejected {
                operation: "get",
                code: error.code,
                message: error.message,
            });
        }
        info!("Thing has no shadow document, creating one with defaults");
        self.apply(&LedState::default())
    }

    fn on_delta(&mut self, msg: &MqttMessage) -> Result<Vec<MqttMessage>, Error> {
        let delta: DeltaEvent = parse(msg)?;
        debug!("Delta for shadow version {:?}", delta.version);
        self.delta_applied = true;
        let state = match delta.state.filter(|patch| !patch.is_empty()) {
            Some(patch) => {
                info!("Delta reports desired value {}", patch);
                LedState::default().merged(&patch)
            }
            None => {
                info!("Delta holds no LED state, resetting defaults");
                LedState::default()
            }
        };
        self.apply(&state)
    }

    fn on_update_accepted(&mut self, msg: &MqttMessage) -> Result<Vec<MqttMessage>, Error> {
        let document: ShadowDocument = parse(msg)?;
        match document.state {
            Some(state) => {
                if let Some(reported) = state.reported {
                    info!("Shadow update accepted, reported {}", reported);
                }
                if let Some(desired) = state.desired {
                    info!("Shadow update accepted, desired {}", desired);
                }
            }
            None => warn!("Shadow update response is missing the state"),
        }
        Ok(Vec::new())
    }

    fn on_update_rejected(&mut self, msg: &MqttMessage) -> Result<Vec<MqttMessage>, Error> {
        let error: ErrorResponse = parse(msg)?;
        Err(Error::ShadowRejected {
            operation: "update",
            code: error.code,
            message: error.message,
        })
    }

    fn on_pending(&mut self, msg: &MqttMessage) -> Result<Vec<MqttMessage>, Error> {
        let pending: LedState = parse(msg)?;
        let shown = gpio::show(self.board.as_mut(), &pending, true)?;
        info!("LED pending state set to {}", shown);
        Ok(Vec::new())
    }

    fn on_reported(&mut self, msg: &MqttMessage) -> Result<Vec<MqttMessage>, Error> {
        let Ok(message) = serde_json::from_str::<ReportedMessage>(&msg.payload) else {
            warn!("Payload not recognized on {}: {}", msg.topic, msg.payload);
            return Ok(Vec::new());
        };
        let shown = gpio::show(self.board.as_mut(), &message.reported, false)?;
        info!("LED state confirmed as {}", shown);
        Ok(vec![MqttMessage::json(self.own.button_state_reported(), &shown)?])
    }
}

impl Demo for ShadowDemo {
    fn subscriptions(&self) -> Vec<String> {
        let mut topics = match self.role {
            Role::Buttons => vec![self.own.led_state_reported(), self.own.led_state_pending()],
            Role::Leds => vec![
                self.shadow.update_delta(),
                self.shadow.update_accepted(),
                self.shadow.update_rejected(),
            ],
        };
        topics.push(self.led_shadow.get_accepted());
        topics.push(self.led_shadow.get_rejected());
        topics
    }

    fn on_ready(&mut self) -> Result<Vec<MqttMessage>, Error> {
        self.delta_applied = false;
        info!("Requesting current shadow state from {}", self.led_shadow.get());
        Ok(vec![MqttMessage::new(self.led_shadow.get(), "{}")])
    }

    fn on_message(&mut self, msg: &MqttMessage) -> Result<Vec<MqttMessage>, Error> {
        let topic = msg.topic.as_str();
        if topic == self.led_shadow.get_accepted() {
            self.on_get_accepted(msg)
        } else if topic == self.led_shadow.get_rejected() {
            self.on_get_rejected(msg)
        } else if self.role == Role::Leds && topic == self.shadow.update_delta() {
            self.on_delta(msg)
        } else if self.role == Role::Leds && topic == self.shadow.update_accepted() {
            self.on_update_accepted(msg)
        } else if self.role == Role::Leds && topic == self.shadow.update_rejected() {
            self.on_update_rejected(msg)
        } else if self.role == Role::Buttons && topic == self.own.led_state_pending() {
            self.on_pending(msg)
        } else if self.role == Role::Buttons && topic == self.own.led_state_reported() {
            self.on_reported(msg)
        } else {
            debug!("Ignoring message on {}", topic);
            Ok(Vec::new())
        }
    }

    fn on_button(&mut self, color: Color) -> Result<Vec<MqttMessage>, Error> {
        let desired = LedState::only(color);
        info!("Button pressed: {}", color);
        if desired == gpio::current(self.board.as_ref()) {
            info!("The {} LED is already lit, no message sent", color);
            return Ok(Vec::new());
        }
        info!("Desired state: {}", desired);
        Ok(vec![MqttMessage::json(self.own.led_state_desired(), &desired)?])
    }
}
