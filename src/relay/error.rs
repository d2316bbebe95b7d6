use crate::coordinate::CoordinateError;
use crate::peer::PeerError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The actor was never created. Not retryable.
    #[error("Actor not found")]
    ActorNotFound,

    /// A live frame could not be delivered to the leader it was addressed to. The socket it
    /// belongs to should be closed.
    #[error("Actor leader changed: {0}")]
    LeaderChanged(String),

    // No live lease. Usually clears up within one lease check interval.
    #[error("Actor not leased, leadership may be transferring")]
    LeaderTransferring,

    #[error("Ack timed out")]
    AckTimeout,

    #[error("Aborted")]
    Aborted,

    #[error("Relay connection already disconnected")]
    Disposed,

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Actor peer failure: {0}")]
    Peer(PeerError),

    #[error("Coordination store failure: {0}")]
    Coordinate(#[from] CoordinateError),
}

impl From<PeerError> for RelayError {
    fn from(e: PeerError) -> Self {
        match e {
            PeerError::ActorNotFound => RelayError::ActorNotFound,
            other => RelayError::Peer(other),
        }
    }
}

impl RelayError {
    /// Whether a retrying publish should give up immediately.
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, RelayError::ActorNotFound | RelayError::Aborted | RelayError::Disposed)
    }

    /// Live frames are never retried. Any failure other than an abort means the socket can no
    /// longer trust its leader.
    pub(crate) fn into_leader_changed(self) -> RelayError {
        match self {
            RelayError::ActorNotFound => leader_changed("Actor not found"),
            RelayError::LeaderTransferring => leader_changed("Leader is changing"),
            RelayError::AckTimeout => leader_changed("Leader not responding"),
            RelayError::Coordinate(e) => RelayError::LeaderChanged(e.to_string()),
            other => other,
        }
    }
}

fn leader_changed(reason: &str) -> RelayError {
    RelayError::LeaderChanged(reason.to_string())
}
