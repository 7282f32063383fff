use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the three LED/button pairs wired to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Red,
    Green,
    Blue,
}

impl Color {
    pub const ALL: [Color; 3] = [Color::Red, Color::Green, Color::Blue];

    /// Position in pin lists given as `red,green,blue`.
    pub fn index(self) -> usize {
        match self {
            Color::Red => 0,
            Color::Green => 1,
            Color::Blue => 2,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Color::Red => "Red",
            Color::Green => "Green",
            Color::Blue => "Blue",
        })
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" | "r" => Ok(Color::Red),
            "green" | "g" => Ok(Color::Green),
            "blue" | "b" => Ok(Color::Blue),
            other => Err(format!("unknown color '{other}'")),
        }
    }
}

/// The on/off state of all three LEDs, as carried in MQTT payloads:
/// `{"Red": 1, "Green": 0, "Blue": 0}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LedState {
    #[serde(with = "lamp")]
    pub red: bool,
    #[serde(with = "lamp")]
    pub green: bool,
    #[serde(with = "lamp")]
    pub blue: bool,
}

impl LedState {
    /// State with only `color` lit, as requested by a button press.
    pub fn only(color: Color) -> Self {
        let mut state = Self::default();
        state.set(color, true);
        state
    }

    pub fn get(&self, color: Color) -> bool {
        match color {
            Color::Red => self.red,
            Color::Green => self.green,
            Color::Blue => self.blue,
        }
    }

    pub fn set(&mut self, color: Color, lit: bool) {
        match color {
            Color::Red => self.red = lit,
            Color::Green => self.green = lit,
            Color::Blue => self.blue = lit,
        }
    }

    /// Overlay the keys present in `patch`.
    pub fn merged(mut self, patch: &LedPatch) -> Self {
        for color in Color::ALL {
            if let Some(lit) = patch.get(color) {
                self.set(color, lit);
            }
        }
        self
    }
}

impl fmt::Display for LedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// A partial LED state, as found in shadow `desired`, `reported` and
/// `delta` objects. Keys other than the three colors are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LedPatch {
    #[serde(default, with = "lamp::opt", skip_serializing_if = "Option::is_none")]
    pub red: Option<bool>,
    #[serde(default, with = "lamp::opt", skip_serializing_if = "Option::is_none")]
    pub green: Option<bool>,
    #[serde(default, with = "lamp::opt", skip_serializing_if = "Option::is_none")]
    pub blue: Option<bool>,
}

impl LedPatch {
    pub fn get(&self, color: Color) -> Option<bool> {
        match color {
            Color::Red => self.red,
            Color::Green => self.green,
            Color::Blue => self.blue,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.red.is_none() && self.green.is_none() && self.blue.is_none()
    }
}

impl fmt::Display for LedPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Lamp values are written as `0`/`1`. Other devices and the shadow console
/// may send booleans or any number, so reading is lenient.
mod lamp {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Float(f64),
    }

    impl Raw {
        fn lit(self) -> bool {
            match self {
                Raw::Bool(b) => b,
                Raw::Int(n) => n != 0,
                Raw::Float(f) => f != 0.0,
            }
        }
    }

    pub fn serialize<S: Serializer>(lit: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*lit))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Raw::deserialize(deserializer).map(Raw::lit)
    }

    pub mod opt {
        use serde::{Deserialize, Deserializer, Serializer};

        use super::Raw;

        pub fn serialize<S: Serializer>(
            lit: &Option<bool>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match lit {
                Some(lit) => super::serialize(lit, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<bool>, D::Error> {
            Ok(Option::<Raw>::deserialize(deserializer)?.map(Raw::lit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_and_boolean_values() {
        let state: LedState = serde_json::from_str(r#"{"Red": 1, "Green": false, "Blue": 0}"#).unwrap();
        assert_eq!(state, LedState::only(Color::Red));

        let state: LedState = serde_json::from_str(r#"{"Red": 0, "Green": true, "Blue": 2}"#).unwrap();
        assert!(!state.red && state.green && state.blue);
    }

    #[test]
    fn full_state_requires_every_color() {
        assert!(serde_json::from_str::<LedState>(r#"{"Red": 1, "Green": 0}"#).is_err());
    }

    #[test]
    fn serializes_as_zero_and_one() {
        let json = serde_json::to_string(&LedState::only(Color::Blue)).unwrap();
        assert_eq!(json, r#"{"Red":0,"Green":0,"Blue":1}"#);
    }

    #[test]
    fn patch_accepts_missing_and_unknown_keys() {
        let patch: LedPatch = serde_json::from_str(r#"{"Green": 1, "color": "yellow"}"#).unwrap();
        assert_eq!(patch.get(Color::Green), Some(true));
        assert_eq!(patch.get(Color::Red), None);
        assert!(!patch.is_empty());
        assert!(serde_json::from_str::<LedPatch>("{}").unwrap().is_empty());
    }

    #[test]
    fn merge_overlays_present_keys_only() {
        let patch = LedPatch {
            red: Some(false),
            green: Some(true),
            blue: None,
        };
        let merged = LedState::only(Color::Red).merged(&patch);
        assert_eq!(merged, LedState::only(Color::Green));

        let merged = LedState::only(Color::Blue).merged(&patch);
        assert!(merged.green && merged.blue && !merged.red);
    }

    #[test]
    fn colors_parse_from_console_words() {
        assert_eq!("red".parse::<Color>(), Ok(Color::Red));
        assert_eq!(" G ".parse::<Color>(), Ok(Color::Green));
        assert_eq!("Blue".parse::<Color>(), Ok(Color::Blue));
        assert!("purple".parse::<Color>().is_err());
    }
}
