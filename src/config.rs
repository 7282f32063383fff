use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::error::Error;

/// Highest BCM line exposed on the 40-pin header.
const MAX_BCM_PIN: u8 = 27;

const BUTTONS_PREFIX: &str = "buttons";
const LEDS_PREFIX: &str = "leds";

#[derive(Debug, Parser)]
#[command(name = "pi-iot-leds", version, about = "Raspberry Pi LED and button demos for AWS IoT Core")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Drive the LEDs straight from the buttons, without any network
    Local(LocalArgs),
    /// Publish a desired LED state on button press and light LEDs from received states
    Pubsub(PubSubArgs),
    /// Keep the LEDs in sync with an AWS IoT Device Shadow
    Shadow(ShadowArgs),
    /// Print the AWS IoT topic rules the shadow demo relies on
    Rules(RulesArgs),
    /// Print the AWS IoT policy document for a demo device
    Policy(PolicyArgs),
}

#[derive(Debug, Clone, Args)]
pub struct WiringArgs {
    /// BCM pins of the Red, Green and Blue LEDs
    #[arg(long, value_delimiter = ',', default_values_t = [16u8, 20, 21])]
    pub led_pins: Vec<u8>,

    /// BCM pins of the Red, Green and Blue buttons
    #[arg(long, value_delimiter = ',', default_values_t = [5u8, 6, 13])]
    pub button_pins: Vec<u8>,

    /// Button debounce time in milliseconds
    #[arg(long, default_value_t = 100)]
    pub debounce_ms: u64,

    /// Keep LEDs in memory and take button presses from stdin
    #[arg(long, env = "PI_IOT_VIRTUAL_GPIO")]
    pub virtual_gpio: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// AWS IoT data endpoint, without port (e.g. abcd123456wxyz-ats.iot.us-east-1.amazonaws.com)
    #[arg(long, env = "AWS_IOT_ENDPOINT")]
    pub endpoint: String,

    /// MQTT port; 443 negotiates MQTT through ALPN
    #[arg(long, default_value_t = 8883)]
    pub port: u16,

    /// Client certificate, PEM
    #[arg(long, env = "AWS_IOT_CERT")]
    pub cert: PathBuf,

    /// Client private key, PEM
    #[arg(long, env = "AWS_IOT_KEY")]
    pub key: PathBuf,

    /// Root certificate authority, PEM (AmazonRootCA1.pem)
    #[arg(long, env = "AWS_IOT_ROOT_CA")]
    pub root_ca: PathBuf,

    /// MQTT client id; must be unique in the account and region
    #[arg(long, env = "AWS_IOT_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, default_value_t = 30)]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Behavior {
    /// Each press flips its LED
    Toggle,
    /// The LED is lit while its button is held
    Momentary,
    /// Each press flips a random LED
    Scramble,
}

#[derive(Debug, Clone, Args)]
pub struct LocalArgs {
    #[arg(long, value_enum, default_value_t = Behavior::Toggle)]
    pub behavior: Behavior,

    #[command(flatten)]
    pub wiring: WiringArgs,
}

#[derive(Debug, Clone, Args)]
pub struct PubSubArgs {
    /// Client id of the device whose buttons set the LED state
    #[arg(long, default_value = BUTTONS_PREFIX)]
    pub button_client: String,

    /// Thing this device was provisioned as; used as the default client id
    #[arg(long, env = "AWS_IOT_THING_NAME")]
    pub thing_name: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub wiring: WiringArgs,
}

impl PubSubArgs {
    /// Client id to fall back on: the provisioned thing name, if any.
    pub fn default_client_id(&self) -> Option<&str> {
        self.thing_name.as_deref().filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, Args)]
pub struct ShadowArgs {
    /// Thing name; must start with "buttons" or "leds"
    #[arg(long, env = "AWS_IOT_THING_NAME")]
    pub thing_name: String,

    /// Thing name of the LED device whose shadow holds the state (defaults to --thing-name)
    #[arg(long)]
    pub led_thing_name: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub wiring: WiringArgs,
}

#[derive(Debug, Clone, Args)]
pub struct RulesArgs {
    /// Client id of the buttons device
    #[arg(long, default_value = BUTTONS_PREFIX)]
    pub button_client: String,

    /// Thing name of the LED device
    #[arg(long)]
    pub led_thing_name: String,

    /// IAM role the rules assume to republish
    #[arg(long)]
    pub role_arn: String,

    /// CloudWatch Logs group for rule errors
    #[arg(long)]
    pub log_group: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct PolicyArgs {
    #[arg(long)]
    pub thing_name: String,

    /// Additional thing whose shadow this device reads
    #[arg(long)]
    pub led_thing_name: Option<String>,

    /// Defaults to the thing name
    #[arg(long)]
    pub client_id: Option<String>,

    #[arg(long, default_value = "*")]
    pub region: String,

    #[arg(long, default_value = "*")]
    pub account_id: String,
}

/// GPIO wiring, with pins indexed by `Color::index`.
#[derive(Debug, Clone)]
pub struct Wiring {
    pub led_pins: [u8; 3],
    pub button_pins: [u8; 3],
    pub debounce: Duration,
    pub virtual_gpio: bool,
}

impl Wiring {
    pub fn from_args(args: &WiringArgs) -> Result<Self, Error> {
        let wiring = Self {
            led_pins: three_pins("--led-pins", &args.led_pins)?,
            button_pins: three_pins("--button-pins", &args.button_pins)?,
            debounce: Duration::from_millis(args.debounce_ms),
            virtual_gpio: args.virtual_gpio,
        };
        wiring.validate()?;
        Ok(wiring)
    }

    fn validate(&self) -> Result<(), Error> {
        let mut seen = HashSet::new();
        for pin in self.led_pins.iter().chain(&self.button_pins) {
            if *pin > MAX_BCM_PIN {
                return Err(Error::Config(format!("GPIO {pin} is not on the header")));
            }
            if !seen.insert(*pin) {
                return Err(Error::Config(format!("GPIO {pin} is assigned twice")));
            }
        }
        Ok(())
    }
}

fn three_pins(flag: &str, pins: &[u8]) -> Result<[u8; 3], Error> {
    pins.try_into().map_err(|_| {
        Error::Config(format!(
            "{flag} takes exactly three pins (red,green,blue), got {}",
            pins.len()
        ))
    })
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub endpoint: String,
    pub port: u16,
    pub client_id: String,
    pub cert: PathBuf,
    pub key: PathBuf,
    pub root_ca: PathBuf,
    pub keep_alive: Duration,
}

impl MqttConfig {
    /// `default_client_id` is used when `--client-id` is not given.
    pub fn from_args(args: &ConnectionArgs, default_client_id: Option<&str>) -> Result<Self, Error> {
        let client_id = match (&args.client_id, default_client_id) {
            (Some(id), _) => id.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => format!("test-{}", uuid::Uuid::new_v4()),
        };
        let config = Self {
            endpoint: args.endpoint.trim().to_string(),
            port: args.port,
            client_id,
            cert: args.cert.clone(),
            key: args.key.clone(),
            root_ca: args.root_ca.clone(),
            keep_alive: Duration::from_secs(args.keep_alive_secs),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.endpoint.is_empty() {
            return Err(Error::Config("--endpoint must not be empty".into()));
        }
        if self.endpoint.contains(':') || self.endpoint.contains('/') {
            return Err(Error::Config(format!(
                "--endpoint takes a host name only, got '{}'",
                self.endpoint
            )));
        }
        if self.client_id.is_empty() {
            return Err(Error::Config("--client-id must not be empty".into()));
        }
        if self.keep_alive.is_zero() {
            return Err(Error::Config("--keep-alive-secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Which part of the shadow demo this device plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Publishes desired states and shows pending/reported ones.
    Buttons,
    /// Applies shadow deltas and reports its LED state.
    Leds,
}

impl Role {
    pub fn from_thing_name(thing_name: &str) -> Result<Self, Error> {
        if thing_name.starts_with(BUTTONS_PREFIX) {
            Ok(Role::Buttons)
        } else if thing_name.starts_with(LEDS_PREFIX) {
            Ok(Role::Leds)
        } else {
            Err(Error::Config(format!(
                "device type not recognized for thing '{thing_name}': \
                 names must start with '{BUTTONS_PREFIX}' or '{LEDS_PREFIX}'"
            )))
        }
    }
}

/// Resolved settings for the shadow demo.
#[derive(Debug, Clone)]
pub struct ShadowConfig {
    pub role: Role,
    pub thing_name: String,
    pub led_thing_name: String,
}

impl ShadowConfig {
    pub fn from_args(args: &ShadowArgs) -> Result<Self, Error> {
        let role = Role::from_thing_name(&args.thing_name)?;
        let led_thing_name = args
            .led_thing_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| args.thing_name.clone());
        Ok(Self {
            role,
            thing_name: args.thing_name.clone(),
            led_thing_name,
        })
    }
}

/// `demo_device/<client_id>/...` topics owned by one device.
#[derive(Debug, Clone)]
pub struct DeviceTopics {
    base: String,
}

impl DeviceTopics {
    pub fn new(client_id: &str) -> Self {
        Self {
            base: format!("demo_device/{client_id}"),
        }
    }

    pub fn led_state_desired(&self) -> String {
        format!("{}/led_state/desired", self.base)
    }

    pub fn led_state_pending(&self) -> String {
        format!("{}/led_state/pending", self.base)
    }

    pub fn led_state_reported(&self) -> String {
        format!("{}/led_state/reported", self.base)
    }

    pub fn button_state_reported(&self) -> String {
        format!("{}/button_state/reported", self.base)
    }
}
