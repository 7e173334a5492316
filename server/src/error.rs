use crate::config::ConfigError;
use shared::ProtocolError;
use std::io;
use thiserror::Error;

/// Errors raised by the networking side of the server.
///
/// Everything except `Bind` and `Config` is scoped to a single connection:
/// the connection is torn down and the server keeps running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("client did not send JOIN in time")]
    HandshakeTimeout,

    #[error("unexpected {0} message")]
    UnexpectedMessage(&'static str),

    #[error("server is full ({0} players)")]
    ServerFull(usize),

    #[error("invalid player name")]
    InvalidName,

    #[error("connection closed before the handshake completed")]
    ConnectionClosed,

    #[error("simulation loop is not running")]
    GameLoopStopped,
}
