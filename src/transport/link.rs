//! Connection state machine
//!
//! Pure reducer over the link lifecycle: all transitions go through
//! [`reduce`], which returns the next state and a list of effects for the
//! transport actor to execute. Keeping the machine free of sockets and
//! timers makes every transition unit-testable.
//!
//! Lifecycle: Idle -> Connecting -> Open -> {Closing -> Closed, or abrupt
//! Closed on error} -> Reconnecting -> Connecting. Reconnecting is entered
//! automatically on any unexpected close; a deliberate stop lands in Closed
//! and suppresses further reconnection.

/// Connection state. Exactly one instance, owned by the transport actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Reconnecting,
}

/// Lifecycle events fed to the reducer by the transport actor.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Caller asked for a connection. Idempotent while Connecting/Open.
    StartRequested,
    /// The WebSocket handshake completed.
    ConnectSucceeded,
    /// The connection attempt failed before opening.
    ConnectFailed { reason: String },
    /// An open socket closed or errored.
    SocketClosed { reason: String },
    /// Deliberate shutdown; suppresses reconnection.
    StopRequested,
    /// The fixed reconnect delay elapsed.
    RetryElapsed,
}

/// Effects for the actor to execute after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEffect {
    /// Begin a WebSocket handshake.
    OpenSocket,
    /// Send all buffered media frames, FIFO, before anything new.
    FlushBuffered,
    /// Close the active socket cleanly.
    CloseSocket,
    /// Arm the fixed-delay reconnect timer.
    ScheduleRetry,
    /// Surface a transient "disconnected" notice to the user.
    NotifyOffline,
}

/// Reducer: (state, event) -> (next_state, effects).
///
/// Connectivity failures never escape this machine; they only steer it
/// toward Reconnecting. Events that make no sense in the current state are
/// dropped without a transition.
pub fn reduce(state: LinkState, event: &LinkEvent) -> (LinkState, Vec<LinkEffect>) {
    use LinkEffect::*;
    use LinkEvent::*;
    use LinkState::*;

    match (state, event) {
        (Idle | Closed, StartRequested) => (Connecting, vec![OpenSocket]),
        // Already on the way up (or a retry is armed): no-op
        (Connecting | Open | Reconnecting, StartRequested) => (state, vec![]),
        (Closing, StartRequested) => (state, vec![]),

        (Connecting, ConnectSucceeded) => (Open, vec![FlushBuffered]),
        // Failed attempts retry quietly; the user was already notified when
        // the open connection dropped (or never had one to lose).
        (Connecting, ConnectFailed { reason }) => {
            log::warn!("Connection attempt failed: {}", reason);
            (Reconnecting, vec![ScheduleRetry])
        }

        (Open, SocketClosed { reason }) => {
            log::warn!("Connection lost: {}", reason);
            (Reconnecting, vec![ScheduleRetry, NotifyOffline])
        }
        (Closing, SocketClosed { .. }) => (Closed, vec![]),

        (Open, StopRequested) => (Closing, vec![CloseSocket]),
        (Idle | Connecting | Reconnecting | Closed, StopRequested) => (Closed, vec![]),
        (Closing, StopRequested) => (Closing, vec![]),

        (Reconnecting, RetryElapsed) => (Connecting, vec![OpenSocket]),
        // Stale timer (stopped or already reconnected): ignore
        (_, RetryElapsed) => (state, vec![]),

        // Late socket results after stop or state change: ignore
        _ => (state, vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(reason: &str) -> LinkEvent {
        LinkEvent::SocketClosed {
            reason: reason.to_string(),
        }
    }

    #[test]
    fn idle_start_opens_socket() {
        let (next, effects) = reduce(LinkState::Idle, &LinkEvent::StartRequested);
        assert_eq!(next, LinkState::Connecting);
        assert_eq!(effects, vec![LinkEffect::OpenSocket]);
    }

    #[test]
    fn start_is_idempotent_while_connecting_or_open() {
        for state in [LinkState::Connecting, LinkState::Open] {
            let (next, effects) = reduce(state, &LinkEvent::StartRequested);
            assert_eq!(next, state);
            assert!(effects.is_empty());
        }
    }

    #[test]
    fn successful_connect_flushes_buffer() {
        let (next, effects) = reduce(LinkState::Connecting, &LinkEvent::ConnectSucceeded);
        assert_eq!(next, LinkState::Open);
        assert_eq!(effects, vec![LinkEffect::FlushBuffered]);
    }

    #[test]
    fn unexpected_close_goes_straight_to_reconnecting() {
        let (next, effects) = reduce(LinkState::Open, &closed("peer reset"));
        assert_eq!(next, LinkState::Reconnecting);
        assert!(effects.contains(&LinkEffect::ScheduleRetry));
        assert!(effects.contains(&LinkEffect::NotifyOffline));
    }

    #[test]
    fn failed_connect_schedules_retry() {
        let event = LinkEvent::ConnectFailed {
            reason: "refused".to_string(),
        };
        let (next, effects) = reduce(LinkState::Connecting, &event);
        assert_eq!(next, LinkState::Reconnecting);
        assert!(effects.contains(&LinkEffect::ScheduleRetry));
    }

    #[test]
    fn retry_elapsed_reconnects() {
        let (next, effects) = reduce(LinkState::Reconnecting, &LinkEvent::RetryElapsed);
        assert_eq!(next, LinkState::Connecting);
        assert_eq!(effects, vec![LinkEffect::OpenSocket]);
    }

    #[test]
    fn deliberate_stop_closes_and_suppresses_reconnection() {
        let (next, effects) = reduce(LinkState::Open, &LinkEvent::StopRequested);
        assert_eq!(next, LinkState::Closing);
        assert_eq!(effects, vec![LinkEffect::CloseSocket]);

        let (next, effects) = reduce(next, &closed("client close"));
        assert_eq!(next, LinkState::Closed);
        assert!(effects.is_empty());

        // A stale retry timer firing after stop must not reconnect
        let (next, effects) = reduce(next, &LinkEvent::RetryElapsed);
        assert_eq!(next, LinkState::Closed);
        assert!(effects.is_empty());
    }

    #[test]
    fn stop_while_reconnecting_cancels_retry_cycle() {
        let (next, _) = reduce(LinkState::Reconnecting, &LinkEvent::StopRequested);
        assert_eq!(next, LinkState::Closed);

        let (next, effects) = reduce(next, &LinkEvent::RetryElapsed);
        assert_eq!(next, LinkState::Closed);
        assert!(effects.is_empty());
    }

    #[test]
    fn start_after_stop_reconnects() {
        let (next, effects) = reduce(LinkState::Closed, &LinkEvent::StartRequested);
        assert_eq!(next, LinkState::Connecting);
        assert_eq!(effects, vec![LinkEffect::OpenSocket]);
    }

    #[test]
    fn late_socket_close_in_reconnecting_is_ignored() {
        // Socket error signal arriving after the reducer already reacted
        let (next, effects) = reduce(LinkState::Reconnecting, &closed("late"));
        assert_eq!(next, LinkState::Reconnecting);
        assert!(effects.is_empty());
    }

    #[test]
    fn every_close_sequence_reaches_reconnecting_or_closed() {
        // Unexpected close from any live state resolves to a retry; a
        // deliberate stop always resolves to Closed.
        for state in [LinkState::Connecting, LinkState::Open] {
            let event = if state == LinkState::Connecting {
                LinkEvent::ConnectFailed {
                    reason: "down".to_string(),
                }
            } else {
                closed("down")
            };
            let (next, _) = reduce(state, &event);
            assert_eq!(next, LinkState::Reconnecting);
        }
    }
}
