//! Test doubles for the collaborator traits

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use embassy_time::Duration;
use embedded_hal::pwm::{ErrorKind, ErrorType, SetDutyCycle};

use crate::device::{PulseSensor, RangeSensor};
use crate::system::backoff::BackoffPolicy;
use crate::system::config::{BrokerConfig, LinkConfig};
use crate::system::link::{CommandHandler, Network, TelemetryLink, Transport, TransportError};
use crate::system::reading::{DistanceReading, PulseReading};

/// Shared state behind [`MockNetwork`] and [`MockTransport`]
pub struct MockBroker {
    pub associated: Cell<bool>,
    pub association_hangs: Cell<bool>,
    pub reachable: Cell<bool>,
    pub connect_hangs: Cell<bool>,
    pub dispatch_hangs: Cell<bool>,
    pub reject_subscribe: Cell<bool>,
    pub fail_publish: Cell<bool>,
    pub session: Cell<bool>,
    pub associate_calls: Cell<u32>,
    pub connect_calls: Cell<u32>,
    pub publish_calls: Cell<u32>,
    subscriptions: RefCell<Vec<String>>,
    published: RefCell<Vec<(String, String)>>,
    inbound: RefCell<VecDeque<(String, Vec<u8>)>>,
}

impl MockBroker {
    /// Associated, reachable, no session yet
    pub fn online() -> Self {
        Self {
            associated: Cell::new(true),
            association_hangs: Cell::new(false),
            reachable: Cell::new(true),
            connect_hangs: Cell::new(false),
            dispatch_hangs: Cell::new(false),
            reject_subscribe: Cell::new(false),
            fail_publish: Cell::new(false),
            session: Cell::new(false),
            associate_calls: Cell::new(0),
            connect_calls: Cell::new(0),
            publish_calls: Cell::new(0),
            subscriptions: RefCell::new(Vec::new()),
            published: RefCell::new(Vec::new()),
            inbound: RefCell::new(VecDeque::new()),
        }
    }

    pub fn link<B: BackoffPolicy>(
        &self,
        backoff: B,
        config: LinkConfig,
    ) -> TelemetryLink<MockNetwork<'_>, MockTransport<'_>, B> {
        TelemetryLink::new(
            MockNetwork { broker: self },
            MockTransport { broker: self },
            backoff,
            BrokerConfig::default(),
            config,
        )
    }

    /// Broker goes away: the current session ends and new connects fail
    pub fn go_offline(&self) {
        self.reachable.set(false);
        self.session.set(false);
    }

    /// Session ends, broker stays reachable
    pub fn drop_session(&self) {
        self.session.set(false);
    }

    pub fn push_command(&self, payload: &str) {
        self.inbound
            .borrow_mut()
            .push_back(("deafnav/cmd".to_string(), payload.as_bytes().to_vec()));
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.borrow().clone()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.borrow().clone()
    }
}

pub struct MockNetwork<'a> {
    broker: &'a MockBroker,
}

impl Network for MockNetwork<'_> {
    fn is_associated(&self) -> bool {
        self.broker.associated.get()
    }

    async fn associate(&mut self) -> Result<(), TransportError> {
        self.broker.associate_calls.set(self.broker.associate_calls.get() + 1);
        if self.broker.association_hangs.get() {
            core::future::pending::<()>().await;
        }
        self.broker.associated.set(true);
        Ok(())
    }
}

pub struct MockTransport<'a> {
    broker: &'a MockBroker,
}

impl Transport for MockTransport<'_> {
    async fn connect(&mut self, _broker: &BrokerConfig) -> Result<(), TransportError> {
        self.broker.connect_calls.set(self.broker.connect_calls.get() + 1);
        if self.broker.connect_hangs.get() {
            core::future::pending::<()>().await;
        }
        if !self.broker.reachable.get() {
            return Err(TransportError::Unreachable);
        }
        self.broker.session.set(true);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.broker.session.get()
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if !self.broker.session.get() {
            return Err(TransportError::NotConnected);
        }
        if self.broker.reject_subscribe.get() {
            return Err(TransportError::Refused(0x80));
        }
        self.broker.subscriptions.borrow_mut().push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.broker.publish_calls.set(self.broker.publish_calls.get() + 1);
        if !self.broker.session.get() {
            return Err(TransportError::NotConnected);
        }
        if self.broker.fail_publish.get() {
            self.broker.session.set(false);
            return Err(TransportError::Io);
        }
        self.broker.published.borrow_mut().push((
            topic.to_string(),
            String::from_utf8(payload.to_vec()).unwrap(),
        ));
        Ok(())
    }

    async fn dispatch_incoming(
        &mut self,
        handler: &mut dyn CommandHandler,
        limit: usize,
    ) -> Result<usize, TransportError> {
        if self.broker.dispatch_hangs.get() {
            core::future::pending::<()>().await;
        }
        let mut delivered = 0;
        while delivered < limit {
            let Some((topic, payload)) = self.broker.inbound.borrow_mut().pop_front() else {
                break;
            };
            handler.on_command(&topic, &payload);
            delivered += 1;
        }
        Ok(delivered)
    }
}

/// Records every command it receives
#[derive(Default)]
pub struct RecordingHandler {
    received: Vec<(String, Vec<u8>)>,
}

impl RecordingHandler {
    pub fn payloads(&self) -> Vec<String> {
        self.received
            .iter()
            .map(|(_, payload)| String::from_utf8(payload.clone()).unwrap())
            .collect()
    }
}

impl CommandHandler for RecordingHandler {
    fn on_command(&mut self, topic: &str, payload: &[u8]) {
        self.received.push((topic.to_string(), payload.to_vec()));
    }
}

/// Ranger that replays a fixed list of readings, then reports no echo
pub struct ScriptedRange {
    readings: VecDeque<DistanceReading>,
}

impl ScriptedRange {
    pub fn new(readings: impl IntoIterator<Item = DistanceReading>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
        }
    }

    /// The same obstacle distance on every tick
    pub fn constant(cm: f32, ticks: usize) -> Self {
        Self::new(core::iter::repeat(DistanceReading::Centimeters(cm)).take(ticks))
    }
}

impl RangeSensor for ScriptedRange {
    async fn measure(&mut self) -> DistanceReading {
        self.readings.pop_front().unwrap_or(DistanceReading::NoEcho)
    }
}

/// Pulse sensor returning a constant sample
pub struct FixedPulse(pub u16);

impl PulseSensor for FixedPulse {
    async fn sample(&mut self) -> PulseReading {
        PulseReading::clamped(self.0, crate::system::reading::AdcResolution::Bits12)
    }
}

/// PWM channel that records the last duty cycle written
pub struct MockPwm<'a> {
    pub duty: &'a Cell<u16>,
    pub writes: &'a Cell<u32>,
    pub fail: bool,
}

/// Full-scale duty for [`MockPwm`]
pub const MOCK_PWM_MAX_DUTY: u16 = 1000;

impl ErrorType for MockPwm<'_> {
    type Error = ErrorKind;
}

impl SetDutyCycle for MockPwm<'_> {
    fn max_duty_cycle(&self) -> u16 {
        MOCK_PWM_MAX_DUTY
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        if self.fail {
            return Err(ErrorKind::Other);
        }
        self.duty.set(duty);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

/// Short step budget so hung collaborators do not slow tests down
pub fn fast_link_config() -> LinkConfig {
    LinkConfig {
        step_budget: Duration::from_millis(5),
        ..LinkConfig::default()
    }
}
