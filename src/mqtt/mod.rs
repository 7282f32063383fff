pub mod client;

use crate::error::Error;

/// A message received from, or to be published to, AWS IoT Core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
}

impl MqttMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Serialize `value` as the JSON payload.
    pub fn json<T: serde::Serialize>(topic: impl Into<String>, value: &T) -> Result<Self, Error> {
        Ok(Self::new(topic, serde_json::to_string(value)?))
    }
}

/// What the connection task reports to the main loop.
#[derive(Debug)]
pub enum MqttEvent {
    /// Connected and every subscription was acknowledged.
    Ready,
    Message(MqttMessage),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::leds::{Color, LedState};

    #[test]
    fn json_payload() {
        let msg = MqttMessage::json("demo_device/leds/led_state/reported", &LedState::only(Color::Red))
            .unwrap();
        assert_eq!(msg.payload, r#"{"Red":1,"Green":0,"Blue":0}"#);
    }

    #[test]
    fn unserializable_payload_is_an_error() {
        // JSON object keys must be strings.
        let value = BTreeMap::from([((1u8, 2u8), true)]);
        let err = MqttMessage::json("demo_device/leds/led_state/reported", &value).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }
}
