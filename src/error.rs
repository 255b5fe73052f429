use thiserror::Error;

use crate::circuit::WireId;

/// Errors surfaced by the protocol library.
///
/// Failed row decryptions during evaluation are *not* represented here; they
/// are an expected part of probing garbled tables and stay internal to the
/// evaluator (see [`crate::cipher::DecryptError`]). Everything below
/// terminates the current circuit.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed circuit file or a circuit violating its structural invariants.
    #[error("invalid circuit: {0}")]
    Config(String),

    /// Channel failure or a malformed message envelope.
    #[error("transport: {0}")]
    Transport(String),

    /// The peer closed the connection at a message boundary.
    #[error("peer disconnected")]
    Disconnected,

    /// The expected garbled-table row did not decrypt under the held labels,
    /// which means the tables and labels do not belong together.
    #[error("evaluation failed at gate {gate}: garbled row did not decrypt")]
    Evaluation {
        /// Output wire id of the gate whose row was rejected.
        gate: WireId,
    },

    /// Oblivious-transfer failure: bad group parameters or mismatched
    /// message sizes.
    #[error("oblivious transfer: {0}")]
    Ot(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::Disconnected,
            _ => Error::Transport(err.to_string()),
        }
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;
