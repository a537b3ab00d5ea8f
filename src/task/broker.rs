//! MQTT Session
//!
//! The broker session runs in its own task on top of `rust-mqtt`. The telemetry
//! link talks to it through [`MqttTransport`], which only exchanges messages with
//! the task, so every link call can be cut off and repeated without disturbing the
//! byte stream.
//!
//! # Session
//! - A connect request tears down any previous session, resolves the broker host,
//!   opens a fresh TCP socket and performs the MQTT handshake with a clean start
//! - Subscriptions and publishes are queued requests; publishes are QoS 0
//! - Inbound messages are read only when the socket already holds data and are
//!   queued for the link's next dispatch
//! - A PING goes out when nothing was sent for half the keep-alive period

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use deafnav_wristband::system::config::BrokerConfig;
use deafnav_wristband::system::link::{CommandHandler, Transport, TransportError};
use defmt::{debug, info, warn, Debug2Format};
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::{self, TcpSocket};
use embassy_net::{IpAddress, Ipv4Address, Stack};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Instant};
use heapless::{String, Vec};
use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::packet::v5::reason_codes::ReasonCode;
use rust_mqtt::utils::rng_generator::CountingRng;

/// Socket buffer sizes; telemetry records are well under 100 bytes
const SOCKET_RX_SIZE: usize = 1024;
const SOCKET_TX_SIZE: usize = 1024;

/// Largest single MQTT packet handled in either direction
const PACKET_SIZE: usize = 256;

/// MQTT v5 properties kept per packet
const MAX_PROPERTIES: usize = 5;

const TOPIC_SIZE: usize = 64;
const PAYLOAD_SIZE: usize = 128;

/// How long the session waits for a request before checking the socket
const POLL_INTERVAL: Duration = Duration::from_millis(10);

type Topic = String<TOPIC_SIZE>;
type Payload = Vec<u8, PAYLOAD_SIZE>;

enum Request {
    Connect(BrokerConfig),
    Subscribe(Topic),
    Publish(Topic, Payload),
}

/// Requests from the link to the session task
static REQUESTS: Channel<CriticalSectionRawMutex, Request, 4> = Channel::new();

/// Outcome of the last connect or subscribe request
static OUTCOME: Signal<CriticalSectionRawMutex, Result<(), TransportError>> = Signal::new();

/// Messages received on subscribed topics, waiting for dispatch
static INBOUND: Channel<CriticalSectionRawMutex, (Topic, Payload), 4> = Channel::new();

static SESSION_UP: AtomicBool = AtomicBool::new(false);

/// Why a session stopped
enum SessionEnd {
    /// The link asked for a new session
    Reconnect(BrokerConfig),
    Failed(TransportError),
}

/// Gives the MQTT client the byte stream while the session keeps access to the
/// socket state between client calls
struct SessionStream<'a, 'b>(&'a RefCell<TcpSocket<'b>>);

impl embedded_io_async::ErrorType for SessionStream<'_, '_> {
    type Error = tcp::Error;
}

// The session only inspects the socket while no client call is in flight
#[allow(clippy::await_holding_refcell_ref)]
impl embedded_io_async::Read for SessionStream<'_, '_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.0.borrow_mut().read(buf).await
    }
}

#[allow(clippy::await_holding_refcell_ref)]
impl embedded_io_async::Write for SessionStream<'_, '_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.borrow_mut().write(buf).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().flush().await
    }
}

fn session_error(code: ReasonCode) -> TransportError {
    match code {
        ReasonCode::NetworkError => TransportError::Io,
        _ => TransportError::Protocol,
    }
}

async fn resolve(stack: Stack<'static>, host: &str) -> Result<IpAddress, TransportError> {
    if let Ok(address) = host.parse::<Ipv4Address>() {
        return Ok(IpAddress::Ipv4(address));
    }

    let addresses = stack.dns_query(host, DnsQueryType::A).await.map_err(|e| {
        warn!("DNS lookup for {} failed: {}", host, e);
        TransportError::Unreachable
    })?;
    addresses.first().copied().ok_or(TransportError::Unreachable)
}

/// Buffers reused by every session
struct SessionBuffers {
    socket_rx: [u8; SOCKET_RX_SIZE],
    socket_tx: [u8; SOCKET_TX_SIZE],
    mqtt_rx: [u8; PACKET_SIZE],
    mqtt_tx: [u8; PACKET_SIZE],
}

/// Runs one broker session until it fails or the link asks for a new one
async fn run_session(stack: Stack<'static>, broker: &BrokerConfig, buffers: &mut SessionBuffers) -> SessionEnd {
    let address = match resolve(stack, broker.host).await {
        Ok(address) => address,
        Err(e) => return refuse(e),
    };

    let keep_alive = Duration::from_secs(u64::from(broker.keep_alive_secs));
    let mut socket = TcpSocket::new(stack, &mut buffers.socket_rx, &mut buffers.socket_tx);
    // The broker drops us after 1.5x keep-alive; do the same for a dead broker
    socket.set_timeout(Some(keep_alive * 3 / 2));
    socket.set_keep_alive(Some(keep_alive / 2));
    if let Err(e) = socket.connect((address, broker.port)).await {
        warn!("TCP connect to {}:{} failed: {}", broker.host, broker.port, e);
        return refuse(TransportError::Unreachable);
    }
    let socket = RefCell::new(socket);

    let mut config = ClientConfig::<MAX_PROPERTIES, _>::new(MqttVersion::MQTTv5, CountingRng(20_000));
    config.add_client_id(broker.client_id);
    config.keep_alive = broker.keep_alive_secs;
    config.max_packet_size = PACKET_SIZE as u32;
    let mut client = MqttClient::<_, MAX_PROPERTIES, _>::new(
        SessionStream(&socket),
        &mut buffers.mqtt_tx,
        PACKET_SIZE,
        &mut buffers.mqtt_rx,
        PACKET_SIZE,
        config,
    );

    if let Err(code) = client.connect_to_broker().await {
        warn!("broker refused connection: {}", Debug2Format(&code));
        return refuse(session_error(code));
    }
    info!("MQTT session accepted as {}", broker.client_id);
    SESSION_UP.store(true, Ordering::Release);
    OUTCOME.signal(Ok(()));

    let mut last_sent = Instant::now();
    loop {
        if let Ok(request) = with_timeout(POLL_INTERVAL, REQUESTS.receive()).await {
            match request {
                Request::Connect(next) => return SessionEnd::Reconnect(next),
                Request::Subscribe(topic) => {
                    let outcome = client.subscribe_to_topic(&topic).await;
                    if let Err(code) = outcome {
                        warn!("subscription to {} refused: {}", topic.as_str(), Debug2Format(&code));
                        return refuse(session_error(code));
                    }
                    info!("subscribed to {}", topic.as_str());
                    OUTCOME.signal(Ok(()));
                }
                Request::Publish(topic, payload) => {
                    if let Err(code) = client.send_message(&topic, &payload, QualityOfService::QoS0, false).await {
                        warn!("publish failed: {}", Debug2Format(&code));
                        return SessionEnd::Failed(session_error(code));
                    }
                }
            }
            last_sent = Instant::now();
        }

        if socket.borrow().can_recv() {
            match client.receive_message().await {
                Ok((topic, payload)) => forward(topic, payload),
                Err(code) => return SessionEnd::Failed(session_error(code)),
            }
        }

        if last_sent.elapsed() >= keep_alive / 2 {
            debug!("sending PING");
            if let Err(code) = client.send_ping().await {
                return SessionEnd::Failed(session_error(code));
            }
            last_sent = Instant::now();
        }
    }
}

/// Reports a failed connect or subscribe back to the waiting link
fn refuse(error: TransportError) -> SessionEnd {
    OUTCOME.signal(Err(error));
    SessionEnd::Failed(error)
}

fn forward(topic: &str, payload: &[u8]) {
    let (Ok(topic), Ok(payload)) = (Topic::try_from(topic), Payload::from_slice(payload)) else {
        warn!("dropping oversized message on {}", topic);
        return;
    };
    if INBOUND.try_send((topic, payload)).is_err() {
        warn!("inbound queue full, dropping command");
    }
}

/// Owns the broker connection; started once at boot
#[embassy_executor::task]
pub async fn mqtt_session(stack: Stack<'static>) -> ! {
    let mut buffers = SessionBuffers {
        socket_rx: [0; SOCKET_RX_SIZE],
        socket_tx: [0; SOCKET_TX_SIZE],
        mqtt_rx: [0; PACKET_SIZE],
        mqtt_tx: [0; PACKET_SIZE],
    };
    let mut next = None;

    loop {
        let broker = match next.take() {
            Some(broker) => broker,
            None => match REQUESTS.receive().await {
                Request::Connect(broker) => broker,
                // Leftovers from a session that is already gone
                Request::Subscribe(_) => {
                    OUTCOME.signal(Err(TransportError::NotConnected));
                    continue;
                }
                Request::Publish(..) => continue,
            },
        };

        match run_session(stack, &broker, &mut buffers).await {
            SessionEnd::Reconnect(broker) => next = Some(broker),
            SessionEnd::Failed(e) => warn!("MQTT session ended: {}", e),
        }
        SESSION_UP.store(false, Ordering::Release);
    }
}

/// Which request the link is waiting on
#[derive(Clone, Copy, PartialEq, Eq)]
enum Pending {
    Connect,
    Subscribe,
}

/// Transport collaborator for the telemetry link, backed by [`mqtt_session`]
#[derive(Default)]
pub struct MqttTransport {
    pending: Option<Pending>,
}

impl MqttTransport {
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Sends `request` unless it is already outstanding, then waits for its outcome
    async fn request(&mut self, kind: Pending, request: Request) -> Result<(), TransportError> {
        if self.pending != Some(kind) {
            OUTCOME.reset();
            REQUESTS.try_send(request).map_err(|_| TransportError::Io)?;
            self.pending = Some(kind);
        }
        let outcome = OUTCOME.wait().await;
        self.pending = None;
        outcome
    }
}

impl Transport for MqttTransport {
    async fn connect(&mut self, broker: &BrokerConfig) -> Result<(), TransportError> {
        self.request(Pending::Connect, Request::Connect(*broker)).await
    }

    fn is_connected(&self) -> bool {
        SESSION_UP.load(Ordering::Acquire)
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let topic = Topic::try_from(topic).map_err(|_| TransportError::BufferTooSmall)?;
        self.request(Pending::Subscribe, Request::Subscribe(topic)).await
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let topic = Topic::try_from(topic).map_err(|_| TransportError::BufferTooSmall)?;
        let payload = Payload::from_slice(payload).map_err(|_| TransportError::BufferTooSmall)?;
        // A full queue means the session stopped draining it
        REQUESTS
            .try_send(Request::Publish(topic, payload))
            .map_err(|_| TransportError::Io)
    }

    async fn dispatch_incoming(
        &mut self,
        handler: &mut dyn CommandHandler,
        limit: usize,
    ) -> Result<usize, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let mut delivered = 0;
        while delivered < limit {
            let Ok((topic, payload)) = INBOUND.try_receive() else {
                break;
            };
            handler.on_command(&topic, &payload);
            delivered += 1;
        }
        Ok(delivered)
    }
}
