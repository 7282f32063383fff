use std::path::Path;
use std::time::Duration;

use rumqttc::{
    AsyncClient, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS, SubscribeReasonCode,
    Transport,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;
use crate::error::Error;

use super::{MqttEvent, MqttMessage};

/// ALPN protocol that lets AWS IoT Core accept MQTT on port 443.
const AWS_MQTT_ALPN: &[u8] = b"x-amzn-mqtt-ca";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct MqttClient {
    client: AsyncClient,
    eventloop: EventLoop,
    subscriptions: Vec<String>,
}

impl MqttClient {
    pub fn new(config: &MqttConfig, subscriptions: Vec<String>) -> Result<Self, Error> {
        let mut mqttopts = MqttOptions::new(&config.client_id, &config.endpoint, config.port);
        mqttopts.set_keep_alive(config.keep_alive);
        // Persistent session: the broker keeps our subscriptions across reconnects.
        mqttopts.set_clean_session(false);

        let ca = read_pem(&config.root_ca)?;
        let cert = read_pem(&config.cert)?;
        let key = read_pem(&config.key)?;
        let alpn = (config.port == 443).then(|| vec![AWS_MQTT_ALPN.to_vec()]);
        mqttopts.set_transport(Transport::tls(ca, Some((cert, key)), alpn));

        Ok(Self::with_options(mqttopts, subscriptions))
    }

    fn with_options(mqttopts: MqttOptions, subscriptions: Vec<String>) -> Self {
        let (client, eventloop) = AsyncClient::new(mqttopts, 100);
        Self {
            client,
            eventloop,
            subscriptions,
        }
    }

    /// Handle for publishing while `run` drives the connection.
    pub fn handle(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Run the MQTT event loop. Subscribes on every fresh session, reports
    /// `Ready` once the broker acknowledged all subscriptions, and forwards
    /// incoming publishes through `event_tx`. A session the broker kept from
    /// an earlier run is `Ready` straight away on the first connect. Returns
    /// after a DISCONNECT has been sent or when the receiving side is gone.
    pub async fn run(mut self, event_tx: mpsc::Sender<MqttEvent>) -> Result<(), Error> {
        let mut pending_subacks = 0usize;
        let mut first_connect = true;

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                    info!("Connected to AWS IoT (session present: {})", ack.session_present);
                    let first = std::mem::replace(&mut first_connect, false);
                    if ack.session_present {
                        info!("Session persisted, keeping existing subscriptions");
                        if first && event_tx.send(MqttEvent::Ready).await.is_err() {
                            return Ok(());
                        }
                        continue;
                    }

                    pending_subacks = self.subscriptions.len();
                    for topic in &self.subscriptions {
                        info!("Subscribing to topic '{}'", topic);
                        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
                    }
                    if pending_subacks == 0 && event_tx.send(MqttEvent::Ready).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(Error::SubscribeRejected { pkid: ack.pkid });
                    }
                    debug!("Subscription {} acknowledged", ack.pkid);
                    if pending_subacks > 0 {
                        pending_subacks -= 1;
                        if pending_subacks == 0 {
                            info!("Subscribed to {} topics", self.subscriptions.len());
                            if event_tx.send(MqttEvent::Ready).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    let msg = MqttMessage {
                        topic: publish.topic.clone(),
                        payload: String::from_utf8_lossy(&publish.payload).to_string(),
                    };
                    if event_tx.send(MqttEvent::Message(msg)).await.is_err() {
                        warn!("Event channel closed");
                        return Ok(());
                    }
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("Disconnected");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {}. Reconnecting...", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

/// Queue `msg` for publishing at QoS 1 without waiting on the event loop.
pub fn publish(client: &AsyncClient, msg: MqttMessage) -> Result<(), Error> {
    info!("Publishing message to topic '{}': {}", msg.topic, msg.payload);
    client.try_publish(msg.topic, QoS::AtLeastOnce, false, msg.payload)?;
    Ok(())
}

fn read_pem(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|source| Error::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    use super::*;

    const WAIT: Duration = Duration::from_secs(3);
    const CONNACK_FRESH: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
    const CONNACK_SESSION_PRESENT: [u8; 4] = [0x20, 0x02, 0x01, 0x00];
    const SUBACK_GRANTED_QOS1: u8 = 0x01;
    const SUBACK_FAILURE: u8 = 0x80;

    #[test]
    fn missing_certificate_names_the_file() {
        let config = MqttConfig {
            endpoint: "abc-ats.iot.us-east-1.amazonaws.com".into(),
            port: 8883,
            client_id: "buttons".into(),
            cert: PathBuf::from("/nonexistent/device.pem.crt"),
            key: PathBuf::from("/nonexistent/private.pem.key"),
            root_ca: PathBuf::from("/nonexistent/AmazonRootCA1.pem"),
            keep_alive: Duration::from_secs(30),
        };
        let err = MqttClient::new(&config, Vec::new()).err().unwrap();
        assert!(matches!(err, Error::ReadFile { .. }));
        assert!(err.to_string().contains("AmazonRootCA1.pem"));
    }

    /// Read one MQTT packet: fixed header byte and body.
    async fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let header = stream.read_u8().await.unwrap();
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await.unwrap();
            len |= usize::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; len];
        stream.read_exact(&mut body).await.unwrap();
        (header, body)
    }

    /// Read a SUBSCRIBE and return its packet id.
    async fn read_subscribe(stream: &mut TcpStream) -> u16 {
        let (header, body) = read_packet(stream).await;
        assert_eq!(header, 0x82, "expected SUBSCRIBE");
        u16::from_be_bytes([body[0], body[1]])
    }

    async fn send_suback(stream: &mut TcpStream, pkid: u16, code: u8) {
        let [hi, lo] = pkid.to_be_bytes();
        stream.write_all(&[0x90, 0x03, hi, lo, code]).await.unwrap();
    }

    /// Accept the client's CONNECT and answer with `connack`.
    async fn accept(listener: &TcpListener, connack: [u8; 4]) -> TcpStream {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (header, _) = read_packet(&mut stream).await;
        assert_eq!(header, 0x10, "expected CONNECT");
        stream.write_all(&connack).await.unwrap();
        stream
    }

    async fn start(
        topics: &[&str],
    ) -> (
        TcpListener,
        AsyncClient,
        mpsc::Receiver<MqttEvent>,
        JoinHandle<Result<(), Error>>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut mqttopts = MqttOptions::new("leds_demo_device", "127.0.0.1", port);
        mqttopts.set_keep_alive(Duration::from_secs(30));
        mqttopts.set_clean_session(false);
        let client = MqttClient::with_options(mqttopts, topics.iter().map(|t| t.to_string()).collect());
        let handle = client.handle();

        let (event_tx, event_rx) = mpsc::channel(10);
        let task = tokio::spawn(client.run(event_tx));
        (listener, handle, event_rx, task)
    }

    #[tokio::test]
    async fn ready_after_the_last_suback() {
        let (listener, _client, mut events, task) = start(&["a/desired", "a/pending"]).await;
        let mut broker = accept(&listener, CONNACK_FRESH).await;

        let first = read_subscribe(&mut broker).await;
        let second = read_subscribe(&mut broker).await;
        send_suback(&mut broker, first, SUBACK_GRANTED_QOS1).await;
        assert!(
            timeout(Duration::from_millis(300), events.recv()).await.is_err(),
            "ready before every subscription was acknowledged"
        );

        send_suback(&mut broker, second, SUBACK_GRANTED_QOS1).await;
        let event = timeout(WAIT, events.recv()).await.unwrap();
        assert!(matches!(event, Some(MqttEvent::Ready)));
        task.abort();
    }

    #[tokio::test]
    async fn refused_subscription_ends_the_connection() {
        let (listener, _client, _events, task) = start(&["a/desired"]).await;
        let mut broker = accept(&listener, CONNACK_FRESH).await;

        let pkid = read_subscribe(&mut broker).await;
        send_suback(&mut broker, pkid, SUBACK_FAILURE).await;

        let result = timeout(WAIT, task).await.unwrap().unwrap();
        assert!(matches!(result, Err(Error::SubscribeRejected { pkid: p }) if p == pkid));
    }

    #[tokio::test]
    async fn kept_session_is_ready_without_subscribing() {
        let (listener, _client, mut events, task) = start(&["a/desired"]).await;
        let mut broker = accept(&listener, CONNACK_SESSION_PRESENT).await;

        let event = timeout(WAIT, events.recv()).await.unwrap();
        assert!(matches!(event, Some(MqttEvent::Ready)));
        assert!(
            timeout(Duration::from_millis(300), read_packet(&mut broker)).await.is_err(),
            "subscribed again on a kept session"
        );
        task.abort();
    }

    #[tokio::test]
    async fn publishes_are_forwarded_and_disconnect_ends_the_loop() {
        let (listener, client, mut events, task) = start(&[]).await;
        let mut broker = accept(&listener, CONNACK_FRESH).await;
        assert!(matches!(timeout(WAIT, events.recv()).await.unwrap(), Some(MqttEvent::Ready)));

        // QoS 0 PUBLISH of `{"Red":1}` on `a/b`.
        let mut publish = vec![0x30, 0x0e, 0x00, 0x03];
        publish.extend_from_slice(b"a/b");
        publish.extend_from_slice(br#"{"Red":1}"#);
        broker.write_all(&publish).await.unwrap();
        let event = timeout(WAIT, events.recv()).await.unwrap();
        let Some(MqttEvent::Message(msg)) = event else {
            panic!("expected a message, got {event:?}");
        };
        assert_eq!(msg, MqttMessage::new("a/b", r#"{"Red":1}"#));

        client.try_disconnect().unwrap();
        let result = timeout(WAIT, task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
