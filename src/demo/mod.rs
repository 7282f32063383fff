pub mod pubsub;
pub mod shadow;

use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::leds::Color;
use crate::mqtt::MqttMessage;

/// Message handling for one connected demo. Handlers return the messages
/// to publish in response.
pub trait Demo: Send {
    /// Topics to subscribe to on every fresh session.
    fn subscriptions(&self) -> Vec<String>;

    /// Called once all subscriptions are acknowledged.
    fn on_ready(&mut self) -> Result<Vec<MqttMessage>, Error>;

    fn on_message(&mut self, msg: &MqttMessage) -> Result<Vec<MqttMessage>, Error>;

    fn on_button(&mut self, color: Color) -> Result<Vec<MqttMessage>, Error>;
}

fn parse<T: DeserializeOwned>(msg: &MqttMessage) -> Result<T, Error> {
    serde_json::from_str(&msg.payload).map_err(|source| Error::Payload {
        topic: msg.topic.clone(),
        source,
    })
}
