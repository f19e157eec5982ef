//! Owns the transport and drives it through the connection state machine.

use std::time::Duration;

use caatuu_core::protocol::{ClientMessage, ServerMessage};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep};
use tracing::{debug, info, warn};

use super::backoff::ReconnectPolicy;
use super::machine::{ConnectionState, Effect, Machine, Signal};
use super::transport::{LinkEvent, Transport, TransportEvent};
use crate::config::Config;
use crate::simulator::OfflineSimulator;

/// Receiving ends handed to whoever runs the event loop.
pub struct ManagerChannels {
    /// Transport and timer events; feed each into
    /// [`ConnectionManager::handle_link_event`].
    pub link_rx: UnboundedReceiver<LinkEvent>,
    /// Parsed replies, live or simulated.
    pub inbound_rx: UnboundedReceiver<ServerMessage>,
}

/// Keeps the client talking to the tutor, or to the simulator when it can't.
///
/// All methods are synchronous and must be called from a single task; timers
/// and the transport report back through the link channel.
pub struct ConnectionManager {
    url: String,
    machine: Machine,
    transport: Box<dyn Transport>,
    simulator: OfflineSimulator,
    generation: u64,
    connect_timeout: Duration,
    heartbeat_interval: Duration,
    connect_timer: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    last_backoff: Option<Duration>,
    link_tx: UnboundedSender<LinkEvent>,
    inbound_tx: UnboundedSender<ServerMessage>,
}

impl ConnectionManager {
    pub fn new(
        config: &Config,
        transport: Box<dyn Transport>,
        simulator: OfflineSimulator,
    ) -> (Self, ManagerChannels) {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let manager = Self {
            url: config.ws_url.clone(),
            machine: Machine::new(ReconnectPolicy::from_config(config)),
            transport,
            simulator,
            generation: 0,
            connect_timeout: config.connect_timeout,
            heartbeat_interval: config.heartbeat_interval,
            connect_timer: None,
            reconnect_timer: None,
            heartbeat: None,
            last_backoff: None,
            link_tx,
            inbound_tx,
        };
        (
            manager,
            ManagerChannels {
                link_rx,
                inbound_rx,
            },
        )
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn attempt(&self) -> u32 {
        self.machine.attempt()
    }

    /// Generation of the most recently opened transport.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Delay of the most recently scheduled reconnect.
    pub fn last_backoff(&self) -> Option<Duration> {
        self.last_backoff
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Starts connecting. No-op while connecting or connected.
    pub fn connect(&mut self) {
        self.apply(Signal::Connect);
    }

    /// Reacts to the host going online (reconnect now) or offline (fall back).
    pub fn network(&mut self, online: bool) {
        info!(online, "Network status changed");
        self.apply(if online {
            Signal::WentOnline
        } else {
            Signal::WentOffline
        });
    }

    pub fn shutdown(&mut self) {
        self.apply(Signal::Shutdown);
    }

    /// Sends `message` to the service, or answers it locally when there is no
    /// live connection. Never fails from the caller's point of view.
    pub fn send(&mut self, message: ClientMessage) {
        if self.state() == ConnectionState::Connected {
            match self.send_live(&message) {
                Ok(()) => return,
                Err(e) => warn!(kind = message.kind(), error = %e, "Live send failed, using simulator"),
            }
        }
        self.simulator.dispatch(&message, &self.inbound_tx);
    }

    fn send_live(&mut self, message: &ClientMessage) -> anyhow::Result<()> {
        let text = serde_json::to_string(message)?;
        self.transport.send_text(text)?;
        debug!(kind = message.kind(), "Sent");
        Ok(())
    }

    /// Applies one event from [`ManagerChannels::link_rx`].
    pub fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Transport { generation, event } => {
                if generation != self.generation {
                    debug!(generation, current = self.generation, "Ignoring stale transport event");
                    return;
                }
                match event {
                    TransportEvent::Opened => self.apply(Signal::Opened),
                    TransportEvent::Message(text) => self.forward(&text),
                    TransportEvent::Closed { code } => {
                        info!(?code, "Transport closed");
                        self.apply(Signal::Closed { code });
                    }
                    TransportEvent::Error(error) => {
                        debug!(%error, "Transport error");
                        self.apply(Signal::Errored);
                    }
                }
            }
            LinkEvent::ConnectTimeout { generation } => {
                if generation == self.generation {
                    warn!(generation, "Connect timed out");
                    self.apply(Signal::ConnectTimedOut);
                }
            }
            LinkEvent::ReconnectDue => self.apply(Signal::ReconnectDue),
            LinkEvent::Heartbeat => {
                if self.state() == ConnectionState::Connected {
                    if let Err(e) = self.send_live(&ClientMessage::Ping) {
                        debug!(error = %e, "Heartbeat not sent");
                    }
                }
            }
        }
    }

    fn forward(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => {
                let _ = self.inbound_tx.send(message);
            }
            Err(e) => debug!(error = %e, "Dropping malformed message"),
        }
    }

    fn apply(&mut self, signal: Signal) {
        let before = self.machine.state();
        let effects = self.machine.step(signal, rand::random::<f64>());
        let after = self.machine.state();
        if before != after {
            info!(from = %before, to = %after, ?signal, "Connection state changed");
        }
        for effect in effects {
            self.run(effect);
        }
    }

    fn run(&mut self, effect: Effect) {
        match effect {
            Effect::OpenTransport => {
                self.generation += 1;
                debug!(generation = self.generation, url = %self.url, "Opening transport");
                self.transport
                    .open(&self.url, self.generation, self.link_tx.clone());
            }
            Effect::ArmConnectTimeout => {
                let (tx, generation, timeout) =
                    (self.link_tx.clone(), self.generation, self.connect_timeout);
                replace_task(
                    &mut self.connect_timer,
                    tokio::spawn(async move {
                        sleep(timeout).await;
                        let _ = tx.send(LinkEvent::ConnectTimeout { generation });
                    }),
                );
            }
            Effect::DisarmConnectTimeout => cancel_task(&mut self.connect_timer),
            Effect::StartHeartbeat => {
                let (tx, period) = (self.link_tx.clone(), self.heartbeat_interval);
                replace_task(
                    &mut self.heartbeat,
                    tokio::spawn(async move {
                        let mut ticker = interval_at(Instant::now() + period, period);
                        loop {
                            ticker.tick().await;
                            if tx.send(LinkEvent::Heartbeat).is_err() {
                                break;
                            }
                        }
                    }),
                );
            }
            Effect::StopHeartbeat => cancel_task(&mut self.heartbeat),
            Effect::CancelReconnect => cancel_task(&mut self.reconnect_timer),
            Effect::CloseTransport => self.transport.close(),
            Effect::ActivateSimulator => self.simulator.activate(),
            Effect::ScheduleReconnect(delay) => {
                self.last_backoff = Some(delay);
                info!(
                    attempt = self.machine.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "Reconnect scheduled"
                );
                let tx = self.link_tx.clone();
                replace_task(
                    &mut self.reconnect_timer,
                    tokio::spawn(async move {
                        sleep(delay).await;
                        let _ = tx.send(LinkEvent::ReconnectDue);
                    }),
                );
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        cancel_task(&mut self.connect_timer);
        cancel_task(&mut self.reconnect_timer);
        cancel_task(&mut self.heartbeat);
    }
}

fn replace_task(slot: &mut Option<JoinHandle<()>>, task: JoinHandle<()>) {
    cancel_task(slot);
    *slot = Some(task);
}

fn cancel_task(slot: &mut Option<JoinHandle<()>>) {
    if let Some(task) = slot.take() {
        task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::transport::{MockTransport, TransportError};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn manager_with(transport: MockTransport) -> (ConnectionManager, ManagerChannels) {
        let config = Config::default();
        let simulator = OfflineSimulator::with_rng(&config, StdRng::seed_from_u64(11));
        ConnectionManager::new(&config, Box::new(transport), simulator)
    }

    fn permissive_transport() -> MockTransport {
        let mut transport = MockTransport::new();
        transport.expect_open().returning(|_, _, _| ());
        transport.expect_close().returning(|| ());
        transport
    }

    fn transport_event(manager: &mut ConnectionManager, event: TransportEvent) {
        let generation = manager.generation();
        manager.handle_link_event(LinkEvent::Transport { generation, event });
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_open_close_falls_back_to_simulator() {
        let mut transport = MockTransport::new();
        transport.expect_open().times(1).returning(|_, _, _| ());
        transport.expect_close().returning(|| ());
        transport.expect_send_text().never();
        let (mut manager, mut channels) = manager_with(transport);

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Connecting);

        transport_event(&mut manager, TransportEvent::Opened);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.attempt(), 0);

        transport_event(&mut manager, TransportEvent::Closed { code: Some(1006) });
        assert_eq!(manager.state(), ConnectionState::Reconnecting);

        let started = Instant::now();
        manager.send(ClientMessage::NewChallenge { difficulty: None });
        let reply = channels.inbound_rx.recv().await.expect("simulated reply");
        let elapsed = started.elapsed();

        assert!(matches!(reply, ServerMessage::Challenge { .. }));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed <= Duration::from_millis(450));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_closes_back_off() {
        let (mut manager, _channels) = manager_with(permissive_transport());
        let cap = Config::default().reconnect_cap;

        manager.connect();
        let mut delays = Vec::new();
        for _ in 0..3 {
            transport_event(&mut manager, TransportEvent::Closed { code: Some(1006) });
            delays.push(manager.last_backoff().expect("reconnect scheduled"));
            manager.handle_link_event(LinkEvent::ReconnectDue);
            assert_eq!(manager.state(), ConnectionState::Connecting);
        }

        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= cap));
        assert_eq!(manager.generation(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_is_ignored() {
        let (mut manager, _channels) = manager_with(permissive_transport());

        manager.connect();
        let first = manager.generation();
        transport_event(&mut manager, TransportEvent::Error("refused".into()));
        manager.handle_link_event(LinkEvent::ReconnectDue);
        assert_eq!(manager.generation(), first + 1);

        manager.handle_link_event(LinkEvent::Transport {
            generation: first,
            event: TransportEvent::Opened,
        });
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.handle_link_event(LinkEvent::ConnectTimeout { generation: first });
        assert_eq!(manager.state(), ConnectionState::Connecting);

        transport_event(&mut manager, TransportEvent::Opened);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_fires() {
        let (mut manager, mut channels) = manager_with(permissive_transport());
        manager.connect();

        let event = channels.link_rx.recv().await.expect("timer event");
        assert_eq!(
            event,
            LinkEvent::ConnectTimeout {
                generation: manager.generation()
            }
        );
        manager.handle_link_event(event);
        assert_eq!(manager.state(), ConnectionState::Reconnecting);
        assert_eq!(manager.last_backoff().map(|d| d >= Duration::from_secs(1)), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_send_and_heartbeat() {
        let mut transport = permissive_transport();
        transport
            .expect_send_text()
            .withf(|text| text.contains("\"type\":\"hint\""))
            .times(1)
            .returning(|_| Ok(()));
        transport
            .expect_send_text()
            .withf(|text| text == r#"{"type":"ping"}"#)
            .times(1)
            .returning(|_| Ok(()));
        let (mut manager, mut channels) = manager_with(transport);

        manager.connect();
        transport_event(&mut manager, TransportEvent::Opened);
        manager.send(ClientMessage::Hint {
            challenge_id: "c1".into(),
        });

        let event = channels.link_rx.recv().await.expect("heartbeat");
        assert_eq!(event, LinkEvent::Heartbeat);
        manager.handle_link_event(event);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_live_send_uses_simulator() {
        let mut transport = permissive_transport();
        transport
            .expect_send_text()
            .returning(|_| Err(TransportError::Closed));
        let (mut manager, mut channels) = manager_with(transport);

        manager.connect();
        transport_event(&mut manager, TransportEvent::Opened);
        manager.send(ClientMessage::TranslateInput { text: "你好".into() });

        let reply = channels.inbound_rx.recv().await.expect("simulated reply");
        assert!(matches!(reply, ServerMessage::Translate { ref text, .. } if text == "你好"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_messages_are_parsed() {
        let (mut manager, mut channels) = manager_with(permissive_transport());
        manager.connect();
        transport_event(&mut manager, TransportEvent::Opened);

        transport_event(&mut manager, TransportEvent::Message("not json".into()));
        transport_event(
            &mut manager,
            TransportEvent::Message(r#"{"type":"hint","text":"先写主语"}"#.into()),
        );

        let reply = channels.inbound_rx.recv().await.expect("parsed reply");
        assert_eq!(
            reply,
            ServerMessage::Hint {
                text: "先写主语".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_signals() {
        let (mut manager, _channels) = manager_with(permissive_transport());
        manager.connect();
        transport_event(&mut manager, TransportEvent::Opened);

        manager.network(false);
        assert_eq!(manager.state(), ConnectionState::Reconnecting);

        manager.network(true);
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.shutdown();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
