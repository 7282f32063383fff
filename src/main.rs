mod config;
mod console;
mod demo;
mod error;
mod gpio;
mod leds;
mod local;
mod mqtt;
mod rules;
mod shadow;

use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use config::{Cli, Command, MqttConfig, ShadowConfig, Wiring};
use demo::Demo;
use error::Error;
use gpio::ButtonEvent;
use mqtt::MqttEvent;
use mqtt::client::MqttClient;

/// How long to wait for the DISCONNECT to reach the broker on shutdown.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<(), Error> {
    match command {
        Command::Local(args) => {
            let wiring = Wiring::from_args(&args.wiring)?;
            let (board, buttons) = gpio::open(&wiring)?;
            local::run(board, args.behavior, buttons, console::spawn()).await
        }
        Command::Pubsub(args) => {
            let wiring = Wiring::from_args(&args.wiring)?;
            let mqtt = MqttConfig::from_args(&args.connection, args.default_client_id())?;
            let (board, buttons) = gpio::open(&wiring)?;
            let demo = demo::pubsub::PubSubDemo::new(board, &mqtt.client_id, &args.button_client);
            run_connected(Box::new(demo), &mqtt, buttons).await
        }
        Command::Shadow(args) => {
            let shadow = ShadowConfig::from_args(&args)?;
            let wiring = Wiring::from_args(&args.wiring)?;
            let mqtt = MqttConfig::from_args(&args.connection, Some(&shadow.thing_name))?;
            info!(
                "Thing {} is a {:?} device (shadow: {})",
                shadow.thing_name, shadow.role, shadow.led_thing_name
            );
            let (board, buttons) = gpio::open(&wiring)?;
            let demo = demo::shadow::ShadowDemo::new(board, &shadow, &mqtt.client_id);
            run_connected(Box::new(demo), &mqtt, buttons).await
        }
        Command::Rules(args) => {
            for rule in rules::topic_rules(&args) {
                print_json(&rule)?;
            }
            Ok(())
        }
        Command::Policy(args) => print_json(&rules::policy(&args)),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Connect to AWS IoT and feed the demo with broker messages, button presses
/// and console commands until shutdown.
async fn run_connected(
    mut demo: Box<dyn Demo>,
    config: &MqttConfig,
    mut buttons: mpsc::Receiver<ButtonEvent>,
) -> Result<(), Error> {
    info!(
        "Connecting to {}:{} with client ID '{}'",
        config.endpoint, config.port, config.client_id
    );

    let client = MqttClient::new(config, demo.subscriptions())?;
    let publisher = client.handle();
    let (event_tx, mut event_rx) = mpsc::channel::<MqttEvent>(100);
    let mut mqtt_handle = tokio::spawn(client.run(event_tx));
    let mut console = console::spawn();

    info!("Waiting for messages. Enter 'exit' to end program.");

    let result = loop {
        let outgoing = tokio::select! {
            Some(event) = event_rx.recv() => match event {
                MqttEvent::Ready => demo.on_ready(),
                MqttEvent::Message(msg) => {
                    info!("Received message from topic '{}': {}", msg.topic, msg.payload);
                    demo.on_message(&msg)
                }
            },
            Some(event) = buttons.recv() => {
                if !event.pressed {
                    continue;
                }
                demo.on_button(event.color)
            }
            Some(cmd) = console.recv() => match cmd {
                console::ConsoleCommand::Quit => {
                    info!("User has quit");
                    break Ok(());
                }
                console::ConsoleCommand::Press(color) => demo.on_button(color),
            },
            joined = &mut mqtt_handle => {
                // The connection task only ends on its own when it failed.
                return match joined {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(Error::Task(e.to_string())),
                };
            }
            signal = shutdown_signal() => {
                info!("Received {}, shutting down", signal);
                break Ok(());
            }
        };

        match outgoing {
            Ok(messages) => {
                for msg in messages {
                    if let Err(e) = mqtt::client::publish(&publisher, msg) {
                        warn!("Failed to publish: {}", e);
                    }
                }
            }
            Err(e) if e.is_fatal() => break Err(e),
            Err(e) => warn!("{}", e),
        }
    };

    info!("Disconnecting...");
    if let Err(e) = publisher.try_disconnect() {
        warn!("Failed to request disconnect: {}", e);
    }
    if tokio::time::timeout(DISCONNECT_GRACE, &mut mqtt_handle).await.is_err() {
        mqtt_handle.abort();
    }
    result
}

/// Resolve on SIGINT or SIGTERM, naming the signal.
pub(crate) async fn shutdown_signal() -> &'static str {
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm => "SIGTERM",
    }
}
