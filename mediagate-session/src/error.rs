use mediagate_core::models::ChannelId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Channel already connected: {0}")]
    AlreadyConnected(ChannelId),

    #[error("Server at capacity ({0} channels)")]
    AtCapacity(usize),
}

/// Illegal progress transition
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressError {
    #[error("Retrieval has not started")]
    NotStarted,

    #[error("Retrieval already started")]
    AlreadyStarted,

    #[error("Progress cannot go back from {from}% to {to}%")]
    Regressed { from: u8, to: u8 },

    #[error("Progress {0}% is out of range")]
    OutOfRange(u8),
}
