//! Worker role (publisher or subscriber).

/// Role a worker's connection plays in the measurement.
///
/// Both roles are client-side connections to the endpoint; the role decides
/// what the owning task does with the connection, not how frames are framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The single connection that emits one publish request per round.
    Publisher,
    /// One of N connections that receive the fan-out.
    Subscriber,
}

impl Role {
    /// Check if this is the publishing role.
    #[inline]
    #[must_use]
    pub const fn is_publisher(&self) -> bool {
        matches!(self, Role::Publisher)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Publisher => write!(f, "Publisher"),
            Role::Subscriber => write!(f, "Subscriber"),
        }
    }
}
