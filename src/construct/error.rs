use thiserror::Error;

use super::traits::Collective;

/// Failures raised by a [`CommBroker`](crate::CommBroker).
///
/// There is no recovery from any of these: ranks that disagree on the
/// sequence of collectives cannot resynchronize.
#[derive(Debug, Error)]
pub enum CommError {
    #[error("rank {peer} left the communicator")]
    PeerDisconnected { peer: usize },

    #[error(
        "rank {peer} issued {found:?} as collective #{found_seq} while {expected:?} #{expected_seq} was expected"
    )]
    CollectiveMismatch {
        peer: usize,
        expected: Collective,
        expected_seq: u64,
        found: Collective,
        found_seq: u64,
    },

    #[error("rank {peer} sent a payload of an unexpected type")]
    PayloadType { peer: usize },

    #[error("rank {peer} sent {actual} items but {expected} were announced")]
    CountMismatch {
        peer: usize,
        expected: usize,
        actual: usize,
    },

    #[error("buffer describes {actual} ranks but the communicator has {expected}")]
    BufferShape { expected: usize, actual: usize },

    #[error("ranks disagree on {0}")]
    Divergent(String),
}

#[derive(Debug, Error)]
pub enum GraphError {
    /// Malformed input detected before (or, for the expensive checks, during)
    /// construction
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Ranks did not participate identically; fatal for every rank
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] CommError),

    /// A staging or adjacency buffer does not fit in the memory budget
    #[error("cannot allocate {requested} bytes, {available} bytes available")]
    ResourceExhaustion { requested: usize, available: usize },

    /// Renumber map lookup for an id that is not known here
    #[error("vertex id {0} was never observed")]
    InvalidId(u64),
}

impl GraphError {
    pub fn divergent(what: impl Into<String>) -> Self {
        Self::ProtocolViolation(CommError::Divergent(what.into()))
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
