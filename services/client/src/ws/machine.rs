//! The connection lifecycle as a pure transition function.
//!
//! [`Machine::step`] consumes one [`Signal`] and returns the [`Effect`]s the
//! caller must carry out (open a transport, arm timers, fall back to the
//! simulator). It performs no I/O and reads no clock, so every transition is
//! testable in isolation.

use std::fmt;
use std::time::Duration;

use super::backoff::ReconnectPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Explicit request to connect.
    Connect,
    /// The current transport finished its handshake.
    Opened,
    /// The current transport closed.
    Closed { code: Option<u16> },
    /// The current transport reported an error.
    Errored,
    ConnectTimedOut,
    ReconnectDue,
    WentOnline,
    WentOffline,
    Shutdown,
}

/// Side effects requested by a transition, in the order they must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    OpenTransport,
    ArmConnectTimeout,
    DisarmConnectTimeout,
    StartHeartbeat,
    StopHeartbeat,
    CancelReconnect,
    CloseTransport,
    ActivateSimulator,
    ScheduleReconnect(Duration),
}

#[derive(Debug, Clone)]
pub struct Machine {
    state: ConnectionState,
    attempt: u32,
    policy: ReconnectPolicy,
}

impl Machine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of reconnects scheduled since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Applies `signal`. `jitter_unit` in `[0, 1]` scales the jitter of any
    /// reconnect delay scheduled by this step.
    pub fn step(&mut self, signal: Signal, jitter_unit: f64) -> Vec<Effect> {
        use ConnectionState::*;

        match (self.state, signal) {
            (Disconnected | Reconnecting, Signal::Connect | Signal::WentOnline)
            | (Reconnecting, Signal::ReconnectDue) => {
                self.state = Connecting;
                vec![
                    Effect::CancelReconnect,
                    Effect::OpenTransport,
                    Effect::ArmConnectTimeout,
                ]
            }
            (Connecting, Signal::Opened) => {
                self.state = Connected;
                self.attempt = 0;
                vec![
                    Effect::DisarmConnectTimeout,
                    Effect::CancelReconnect,
                    Effect::StartHeartbeat,
                ]
            }
            (
                Connecting,
                Signal::Closed { .. }
                | Signal::Errored
                | Signal::ConnectTimedOut
                | Signal::WentOffline,
            )
            | (Connected, Signal::Closed { .. } | Signal::WentOffline) => {
                self.enter_reconnecting(jitter_unit)
            }
            // Nothing to tear down or retry; a later `WentOnline` connects.
            (Disconnected, Signal::WentOffline) => vec![Effect::ActivateSimulator],
            (_, Signal::Shutdown) => {
                self.state = Disconnected;
                self.attempt = 0;
                vec![
                    Effect::DisarmConnectTimeout,
                    Effect::CancelReconnect,
                    Effect::StopHeartbeat,
                    Effect::CloseTransport,
                ]
            }
            _ => Vec::new(),
        }
    }

    fn enter_reconnecting(&mut self, jitter_unit: f64) -> Vec<Effect> {
        let delay = self.policy.delay(self.attempt, jitter_unit);
        self.attempt = self.attempt.saturating_add(1);
        self.state = ConnectionState::Reconnecting;
        vec![
            Effect::DisarmConnectTimeout,
            Effect::StopHeartbeat,
            Effect::CloseTransport,
            Effect::ActivateSimulator,
            Effect::ScheduleReconnect(delay),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> Machine {
        Machine::new(ReconnectPolicy::default())
    }

    fn scheduled(effects: &[Effect]) -> Option<Duration> {
        effects.iter().find_map(|e| match e {
            Effect::ScheduleReconnect(delay) => Some(*delay),
            _ => None,
        })
    }

    #[test]
    fn test_connect_then_open() {
        let mut m = machine();
        assert_eq!(m.state(), ConnectionState::Disconnected);

        let effects = m.step(Signal::Connect, 0.0);
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert!(effects.contains(&Effect::OpenTransport));
        assert!(effects.contains(&Effect::ArmConnectTimeout));

        let effects = m.step(Signal::Opened, 0.0);
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(m.attempt(), 0);
        assert!(effects.contains(&Effect::StartHeartbeat));
    }

    #[test]
    fn test_connect_is_idempotent_while_active() {
        let mut m = machine();
        m.step(Signal::Connect, 0.0);
        assert!(m.step(Signal::Connect, 0.0).is_empty());
        assert_eq!(m.state(), ConnectionState::Connecting);

        m.step(Signal::Opened, 0.0);
        assert!(m.step(Signal::Connect, 0.0).is_empty());
        assert_eq!(m.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_close_falls_back_and_schedules() {
        let mut m = machine();
        m.step(Signal::Connect, 0.0);
        m.step(Signal::Opened, 0.0);

        let effects = m.step(Signal::Closed { code: Some(1006) }, 0.0);
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert!(effects.contains(&Effect::StopHeartbeat));
        assert!(effects.contains(&Effect::ActivateSimulator));
        assert_eq!(scheduled(&effects), Some(Duration::from_secs(1)));
        assert_eq!(m.attempt(), 1);
    }

    #[test]
    fn test_errors_only_matter_before_open() {
        let mut m = machine();
        m.step(Signal::Connect, 0.0);
        m.step(Signal::Opened, 0.0);
        assert!(m.step(Signal::Errored, 0.0).is_empty());
        assert_eq!(m.state(), ConnectionState::Connected);

        let mut m = machine();
        m.step(Signal::Connect, 0.0);
        let effects = m.step(Signal::Errored, 0.0);
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert!(scheduled(&effects).is_some());
    }

    #[test]
    fn test_connect_timeout_falls_back() {
        let mut m = machine();
        m.step(Signal::Connect, 0.0);
        let effects = m.step(Signal::ConnectTimedOut, 0.0);
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert!(effects.contains(&Effect::CloseTransport));
    }

    #[test]
    fn test_consecutive_failures_back_off() {
        let mut m = machine();
        m.step(Signal::Connect, 0.0);
        let cap = ReconnectPolicy::default().cap;

        let mut delays = Vec::new();
        for _ in 0..3 {
            let effects = m.step(Signal::Closed { code: Some(1006) }, 0.0);
            delays.push(scheduled(&effects).expect("reconnect scheduled"));
            m.step(Signal::ReconnectDue, 0.0);
        }
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= cap));
        assert_eq!(m.attempt(), 3);
    }

    #[test]
    fn test_successful_open_resets_attempts() {
        let mut m = machine();
        m.step(Signal::Connect, 0.0);
        m.step(Signal::Closed { code: None }, 0.0);
        m.step(Signal::ReconnectDue, 0.0);
        m.step(Signal::Closed { code: None }, 0.0);
        assert_eq!(m.attempt(), 2);

        m.step(Signal::ReconnectDue, 0.0);
        m.step(Signal::Opened, 0.0);
        assert_eq!(m.attempt(), 0);
    }

    #[test]
    fn test_online_skips_the_wait() {
        let mut m = machine();
        m.step(Signal::Connect, 0.0);
        m.step(Signal::Closed { code: None }, 0.0);

        let effects = m.step(Signal::WentOnline, 0.0);
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(effects[0], Effect::CancelReconnect);
    }

    #[test]
    fn test_offline_forces_fallback() {
        let mut m = machine();
        m.step(Signal::Connect, 0.0);
        m.step(Signal::Opened, 0.0);
        let effects = m.step(Signal::WentOffline, 0.0);
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert!(effects.contains(&Effect::ActivateSimulator));

        let mut idle = machine();
        assert_eq!(idle.step(Signal::WentOffline, 0.0), vec![Effect::ActivateSimulator]);
        assert_eq!(idle.state(), ConnectionState::Disconnected);
        assert_eq!(idle.attempt(), 0);
        assert_eq!(
            idle.step(Signal::WentOnline, 0.0),
            vec![
                Effect::CancelReconnect,
                Effect::OpenTransport,
                Effect::ArmConnectTimeout,
            ]
        );
    }

    #[test]
    fn test_stray_signals_are_ignored() {
        let mut m = machine();
        assert!(m.step(Signal::Opened, 0.0).is_empty());
        assert!(m.step(Signal::ReconnectDue, 0.0).is_empty());
        assert!(m.step(Signal::Closed { code: None }, 0.0).is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_shutdown_disconnects() {
        let mut m = machine();
        m.step(Signal::Connect, 0.0);
        m.step(Signal::Opened, 0.0);
        let effects = m.step(Signal::Shutdown, 0.0);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(effects.contains(&Effect::CloseTransport));
    }
}
