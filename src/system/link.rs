//! Telemetry Link
//!
//! Owns the publish/subscribe session with the broker and keeps it alive across
//! network loss.
//!
//! # Connection States
//! ```text
//! Disconnected --(retry due, associated)--> Connecting --(connect + subscribe)--> Connected
//!      ^                                        |                                    |
//!      +----------------(failure, backoff)------+<-------(transport or AP lost)------+
//! ```
//!
//! # Polling
//! [`TelemetryLink::ensure_connected`] runs once per control tick and performs at
//! most one recovery step, so sensing and actuation keep running while the link
//! recovers. Every call into the collaborators is cut off after
//! `LinkConfig::step_budget`; an unfinished step is picked up again on the next
//! tick. A whole attempt (association, broker connect and subscription) fails with
//! [`LinkError::Timeout`] once it has been running for `LinkConfig::connect_timeout`.
//!
//! Collaborators must therefore tolerate being cancelled and called again: the
//! firmware runs association and the broker session in their own tasks and only
//! waits for them here.
//!
//! # Delivery
//! Publishing is fire-and-forget (QoS 0). Records offered while the link is not
//! connected are dropped, never queued, so delivery is at-most-once.

use core::fmt;

use embassy_time::{with_timeout, Instant};

use crate::system::backoff::BackoffPolicy;
use crate::system::config::{BrokerConfig, LinkConfig};
use crate::system::telemetry::TelemetryRecord;

/// Failures reported by the network and transport collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    #[error("broker unreachable")]
    Unreachable,
    #[error("broker refused the request (code {0})")]
    Refused(u8),
    #[error("connection I/O failed")]
    Io,
    #[error("unexpected packet from broker")]
    Protocol,
    #[error("message does not fit the transport buffer")]
    BufferTooSmall,
    #[error("not connected")]
    NotConnected,
}

/// Why a connection step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    #[error("association failed: {0}")]
    Association(TransportError),
    #[error("broker connect failed: {0}")]
    Connect(TransportError),
    #[error("command subscription failed: {0}")]
    Subscribe(TransportError),
    #[error("connection attempt timed out")]
    Timeout,
}

/// Access point association
#[allow(async_fn_in_trait)]
pub trait Network {
    fn is_associated(&self) -> bool;

    /// Joins the configured access point and waits for an address
    async fn associate(&mut self) -> Result<(), TransportError>;
}

/// Publish/subscribe session over a reliable byte stream
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn connect(&mut self, broker: &BrokerConfig) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Hands already-received messages to `handler` without waiting for new ones.
    /// Delivers at most `limit` messages and returns how many were delivered.
    async fn dispatch_incoming(
        &mut self,
        handler: &mut dyn CommandHandler,
        limit: usize,
    ) -> Result<usize, TransportError>;
}

/// Receiver for messages on the command topic
pub trait CommandHandler {
    fn on_command(&mut self, topic: &str, payload: &[u8]);
}

/// Default handler: commands are received but not acted upon
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardCommands;

impl CommandHandler for DiscardCommands {
    fn on_command(&mut self, topic: &str, payload: &[u8]) {
        debug!("discarding command on {} ({} bytes)", topic, payload.len());
    }
}

/// Link state, owned by [`TelemetryLink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    /// Associated with the access point, broker session not yet up
    Connecting,
    Connected,
}

impl ConnectionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of offering a record to the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PublishOutcome {
    Sent,
    Dropped,
}

/// Link counters since boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    pub published: u32,
    pub dropped: u32,
    /// Successful broker sessions, including the first
    pub connections: u32,
    pub failed_attempts: u32,
}

/// Broker session with polled recovery
pub struct TelemetryLink<N, T, B> {
    network: N,
    transport: T,
    backoff: B,
    broker: BrokerConfig,
    config: LinkConfig,
    state: ConnectionState,
    /// Consecutive failures since the last successful connect
    failures: u32,
    retry_at: Instant,
    /// Deadline of the attempt in progress, if any
    attempt_deadline: Option<Instant>,
    last_error: Option<LinkError>,
    stats: LinkStats,
}

impl<N, T, B> TelemetryLink<N, T, B>
where
    N: Network,
    T: Transport,
    B: BackoffPolicy,
{
    pub fn new(network: N, transport: T, backoff: B, broker: BrokerConfig, config: LinkConfig) -> Self {
        Self {
            network,
            transport,
            backoff,
            broker,
            config,
            state: ConnectionState::Disconnected,
            failures: 0,
            retry_at: Instant::MIN,
            attempt_deadline: None,
            last_error: None,
            stats: LinkStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn last_error(&self) -> Option<LinkError> {
        self.last_error
    }

    /// When the next connection attempt is due, if the link is down
    pub fn next_attempt_at(&self) -> Option<Instant> {
        match self.state {
            ConnectionState::Disconnected => Some(self.retry_at),
            _ => None,
        }
    }

    /// Advances the connection state machine by at most one step
    pub async fn ensure_connected(&mut self, now: Instant) -> ConnectionState {
        match self.state {
            ConnectionState::Connected => {
                if !self.transport.is_connected() || !self.network.is_associated() {
                    warn!("telemetry link lost");
                    self.connection_lost();
                }
            }
            ConnectionState::Disconnected if now >= self.retry_at => {
                if self.attempt_deadline.is_none() {
                    let deadline = now.checked_add(self.config.connect_timeout).unwrap_or(Instant::MAX);
                    self.attempt_deadline = Some(deadline);
                }
                if self.network.is_associated() {
                    self.transition(ConnectionState::Connecting);
                    self.connect_broker(now).await;
                } else {
                    self.associate(now).await;
                }
            }
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting => self.connect_broker(now).await,
        }
        self.state
    }

    /// Publishes one record, or drops it when the link is down
    pub async fn publish(&mut self, record: &TelemetryRecord) -> PublishOutcome {
        if self.state != ConnectionState::Connected {
            self.stats.dropped = self.stats.dropped.wrapping_add(1);
            debug!("link {}, dropping record", self.state);
            return PublishOutcome::Dropped;
        }

        let Ok(payload) = record.encode() else {
            self.stats.dropped = self.stats.dropped.wrapping_add(1);
            warn!("telemetry record does not fit, dropping");
            return PublishOutcome::Dropped;
        };

        let topic = self.broker.telemetry_topic;
        match with_timeout(self.config.step_budget, self.transport.publish(topic, payload.as_bytes())).await {
            Ok(Ok(())) => {
                self.stats.published = self.stats.published.wrapping_add(1);
                PublishOutcome::Sent
            }
            Ok(Err(e)) => {
                warn!("publish failed: {}", e);
                self.stats.dropped = self.stats.dropped.wrapping_add(1);
                self.connection_lost();
                PublishOutcome::Dropped
            }
            Err(_) => {
                warn!("publish timed out");
                self.stats.dropped = self.stats.dropped.wrapping_add(1);
                self.connection_lost();
                PublishOutcome::Dropped
            }
        }
    }

    /// Pumps pending inbound commands to `handler`; returns how many were delivered
    pub async fn dispatch_incoming(&mut self, handler: &mut dyn CommandHandler) -> usize {
        if self.state != ConnectionState::Connected {
            return 0;
        }

        let limit = self.config.max_inbound_per_tick;
        match with_timeout(self.config.step_budget, self.transport.dispatch_incoming(handler, limit)).await {
            Ok(Ok(delivered)) => delivered,
            Ok(Err(e)) => {
                warn!("inbound dispatch failed: {}", e);
                self.connection_lost();
                0
            }
            Err(_) => {
                // A cut-off read can leave the stream mid-packet
                warn!("inbound dispatch timed out");
                self.connection_lost();
                0
            }
        }
    }

    async fn associate(&mut self, now: Instant) {
        debug!("associating with access point");
        match with_timeout(self.config.step_budget, self.network.associate()).await {
            Ok(Ok(())) => {
                info!("access point associated");
                self.transition(ConnectionState::Connecting);
            }
            Ok(Err(e)) => self.attempt_failed(now, LinkError::Association(e)),
            Err(_) => self.step_unfinished(now, "association"),
        }
    }

    async fn connect_broker(&mut self, now: Instant) {
        let broker = self.broker;
        let transport = &mut self.transport;
        let session = async {
            transport.connect(&broker).await.map_err(LinkError::Connect)?;
            transport
                .subscribe(broker.command_topic)
                .await
                .map_err(LinkError::Subscribe)
        };

        match with_timeout(self.config.step_budget, session).await {
            Ok(Ok(())) => {
                self.failures = 0;
                self.attempt_deadline = None;
                self.last_error = None;
                self.stats.connections = self.stats.connections.wrapping_add(1);
                info!(
                    "broker session up at {}:{} (connection #{})",
                    broker.host, broker.port, self.stats.connections
                );
                self.transition(ConnectionState::Connected);
            }
            Ok(Err(e)) => self.attempt_failed(now, e),
            Err(_) => self.step_unfinished(now, "broker session"),
        }
    }

    /// The step ran out of budget; the attempt resumes next tick until its deadline
    fn step_unfinished(&mut self, now: Instant, step: &str) {
        match self.attempt_deadline {
            Some(deadline) if now < deadline => trace!("{} still in progress", step),
            _ => self.attempt_failed(now, LinkError::Timeout),
        }
    }

    fn attempt_failed(&mut self, now: Instant, error: LinkError) {
        self.failures = self.failures.saturating_add(1);
        self.stats.failed_attempts = self.stats.failed_attempts.wrapping_add(1);
        self.last_error = Some(error);

        let delay = self.backoff.next_delay(self.failures);
        self.retry_at = now.checked_add(delay).unwrap_or(Instant::MAX);
        self.attempt_deadline = None;
        warn!(
            "connection attempt {} failed: {}; retrying in {} ms",
            self.failures,
            error,
            delay.as_millis()
        );
        self.transition(ConnectionState::Disconnected);
    }

    /// The first attempt after losing an established session is immediate
    fn connection_lost(&mut self) {
        self.failures = 0;
        self.retry_at = Instant::MIN;
        self.attempt_deadline = None;
        self.transition(ConnectionState::Disconnected);
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            info!(
                "telemetry link {} -> {} (published {}, dropped {}, failed attempts {})",
                self.state,
                next,
                self.stats.published,
                self.stats.dropped,
                self.stats.failed_attempts
            );
            self.state = next;
        }
    }
}
