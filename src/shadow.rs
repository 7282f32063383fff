//! AWS IoT Device Shadow topics and documents for the classic (unnamed)
//! shadow of a thing.

use serde::{Deserialize, Serialize};

use crate::leds::{LedPatch, LedState};

/// Code returned on `get/rejected` when the thing has no shadow yet.
pub const NOT_FOUND: u16 = 404;

#[derive(Debug, Clone)]
pub struct ShadowTopics {
    prefix: String,
}

impl ShadowTopics {
    pub fn new(thing_name: &str) -> Self {
        Self {
            prefix: format!("$aws/things/{thing_name}/shadow"),
        }
    }

    pub fn get(&self) -> String {
        format!("{}/get", self.prefix)
    }

    pub fn get_accepted(&self) -> String {
        format!("{}/get/accepted", self.prefix)
    }

    pub fn get_rejected(&self) -> String {
        format!("{}/get/rejected", self.prefix)
    }

    pub fn update(&self) -> String {
        format!("{}/update", self.prefix)
    }

    pub fn update_accepted(&self) -> String {
        format!("{}/update/accepted", self.prefix)
    }

    pub fn update_rejected(&self) -> String {
        format!("{}/update/rejected", self.prefix)
    }

    pub fn update_delta(&self) -> String {
        format!("{}/update/delta", self.prefix)
    }
}

/// Body of `get/accepted` and `update/accepted`.
#[derive(Debug, Default, Deserialize)]
pub struct ShadowDocument {
    #[serde(default)]
    pub state: Option<ShadowState>,
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShadowState {
    #[serde(default)]
    pub desired: Option<LedPatch>,
    #[serde(default)]
    pub reported: Option<LedPatch>,
}

/// Body of `update/delta`: the desired keys that differ from reported.
#[derive(Debug, Default, Deserialize)]
pub struct DeltaEvent {
    #[serde(default)]
    pub state: Option<LedPatch>,
    #[serde(default)]
    pub version: Option<u64>,
}

/// Body of `get/rejected` and `update/rejected`.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

/// Request published to `update` to report the device state.
#[derive(Debug, Serialize)]
pub struct ReportRequest {
    pub state: Reported,
}

#[derive(Debug, Serialize)]
pub struct Reported {
    pub reported: LedState,
}

impl ReportRequest {
    pub fn new(reported: LedState) -> Self {
        Self {
            state: Reported { reported },
        }
    }
}

/// Where the initial device state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A requested change that has not been applied.
    Desired,
    /// The last state a device reported.
    Reported,
    /// The shadow holds no LED state.
    Default,
}

/// Pick the state a device should show on startup: a pending desired state
/// wins over the last reported one; an empty shadow means all LEDs off.
pub fn initial_state(document: &ShadowDocument) -> (LedState, Source) {
    let non_empty = |patch: &Option<LedPatch>| patch.filter(|p| !p.is_empty());

    if let Some(state) = &document.state {
        if let Some(desired) = non_empty(&state.desired) {
            return (LedState::default().merged(&desired), Source::Desired);
        }
        if let Some(reported) = non_empty(&state.reported) {
            return (LedState::default().merged(&reported), Source::Reported);
        }
    }
    (LedState::default(), Source::Default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leds::Color;

    fn document(json: &str) -> ShadowDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn topics_for_thing() {
        let topics = ShadowTopics::new("leds_demo_device");
        assert_eq!(topics.get(), "$aws/things/leds_demo_device/shadow/get");
        assert_eq!(topics.get_accepted(), "$aws/things/leds_demo_device/shadow/get/accepted");
        assert_eq!(topics.get_rejected(), "$aws/things/leds_demo_device/shadow/get/rejected");
        assert_eq!(topics.update(), "$aws/things/leds_demo_device/shadow/update");
        assert_eq!(
            topics.update_accepted(),
            "$aws/things/leds_demo_device/shadow/update/accepted"
        );
        assert_eq!(
            topics.update_rejected(),
            "$aws/things/leds_demo_device/shadow/update/rejected"
        );
        assert_eq!(topics.update_delta(), "$aws/things/leds_demo_device/shadow/update/delta");
    }

    #[test]
    fn desired_wins_over_reported() {
        let doc = document(
            r#"{"state":{"desired":{"Red":0,"Green":1,"Blue":0},
                         "reported":{"Red":1,"Green":0,"Blue":0},
                         "delta":{"Red":0,"Green":1}},
                "version":7,"timestamp":1700000000}"#,
        );
        assert_eq!(initial_state(&doc), (LedState::only(Color::Green), Source::Desired));
        assert_eq!(doc.version, Some(7));
    }

    #[test]
    fn reported_used_without_desired() {
        let doc = document(r#"{"state":{"reported":{"Red":0,"Green":0,"Blue":1}}}"#);
        assert_eq!(initial_state(&doc), (LedState::only(Color::Blue), Source::Reported));

        let doc = document(r#"{"state":{"desired":{},"reported":{"Blue":true}}}"#);
        assert_eq!(initial_state(&doc), (LedState::only(Color::Blue), Source::Reported));
    }

    #[test]
    fn empty_shadow_defaults_to_all_off() {
        assert_eq!(initial_state(&document("{}")), (LedState::default(), Source::Default));
        assert_eq!(
            initial_state(&document(r#"{"state":{"desired":{"color":"red"}}}"#)),
            (LedState::default(), Source::Default)
        );
    }

    #[test]
    fn error_response_fields() {
        let err: ErrorResponse =
            serde_json::from_str(r#"{"code":404,"message":"No shadow exists with name: 'leds'","clientToken":"abc"}"#)
                .unwrap();
        assert_eq!(err.code, NOT_FOUND);
        assert!(err.message.starts_with("No shadow exists"));
    }

    #[test]
    fn report_request_shape() {
        let json = serde_json::to_string(&ReportRequest::new(LedState::only(Color::Red))).unwrap();
        assert_eq!(json, r#"{"state":{"reported":{"Red":1,"Green":0,"Blue":0}}}"#);
    }
}
