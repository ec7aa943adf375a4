//! Worker connection lifecycle state machine.

/// Lifecycle state of a worker's connection.
///
/// A publisher cycles within `Subscribed` once the handshake is done; a
/// subscriber advances to `Active` when it enters its receive loop. `Failed`
/// is terminal: the harness never reconnects a worker mid-session, since a
/// reconnect would corrupt the measurements in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum WorkerState {
    /// No transport yet.
    #[default]
    Disconnected,
    /// Dialing the endpoint (includes upgrade, retried on failure).
    Connecting,
    /// Transport established, application handshake not yet done.
    Connected,
    /// Connect and subscribe acknowledged.
    Subscribed,
    /// Receive loop running (subscribers only).
    Active,
    /// Fatal I/O or protocol error; the connection is unusable.
    Failed,
}

impl WorkerState {
    /// Check if the transport is up and usable.
    #[must_use]
    #[inline]
    pub const fn is_established(&self) -> bool {
        matches!(
            self,
            WorkerState::Connected | WorkerState::Subscribed | WorkerState::Active
        )
    }

    /// Check if this connection has failed terminally.
    #[must_use]
    #[inline]
    pub const fn is_failed(&self) -> bool {
        matches!(self, WorkerState::Failed)
    }

    /// Check if the worker may take part in rounds.
    #[must_use]
    #[inline]
    pub const fn can_participate(&self) -> bool {
        matches!(self, WorkerState::Subscribed | WorkerState::Active)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Disconnected => write!(f, "Disconnected"),
            WorkerState::Connecting => write!(f, "Connecting"),
            WorkerState::Connected => write!(f, "Connected"),
            WorkerState::Subscribed => write!(f, "Subscribed"),
            WorkerState::Active => write!(f, "Active"),
            WorkerState::Failed => write!(f, "Failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert_eq!(WorkerState::default(), WorkerState::Disconnected);
    }

    #[test]
    fn test_is_established_in_each_state() {
        assert!(!WorkerState::Disconnected.is_established());
        assert!(!WorkerState::Connecting.is_established());
        assert!(WorkerState::Connected.is_established());
        assert!(WorkerState::Subscribed.is_established());
        assert!(WorkerState::Active.is_established());
        assert!(!WorkerState::Failed.is_established());
    }

    #[test]
    fn test_can_participate() {
        assert!(!WorkerState::Connected.can_participate());
        assert!(WorkerState::Subscribed.can_participate());
        assert!(WorkerState::Active.can_participate());
        assert!(!WorkerState::Failed.can_participate());
    }

    #[test]
    fn test_failed_is_terminal_flag() {
        assert!(WorkerState::Failed.is_failed());
        assert!(!WorkerState::Active.is_failed());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(WorkerState::Subscribed.to_string(), "Subscribed");
        assert_eq!(WorkerState::Failed.to_string(), "Failed");
    }
}
