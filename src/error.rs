//! The crate-wide error taxonomy.
//!
//! Every fallible operation in the core (peer session, wire codec, piece
//! verifier, orchestrator) as well as the ambient metainfo/tracker glue
//! returns [`Result`], whose error variants are grouped by how the caller is
//! expected to react: some are per-piece and recoverable by requeueing the
//! work, others are fatal and abort the whole download.

use std::{fmt, io};

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy described in the design document.
#[derive(Debug)]
pub enum Error {
    /// A connect, read, write, or timeout failure on a TCP connection.
    Io(io::Error),
    /// A malformed or unexpected wire message: a short frame, an unknown
    /// message id where a specific one was required, an index/length
    /// mismatch, or a handshake whose info hash doesn't match ours.
    Protocol(ProtocolError),
    /// The metainfo file or the command line arguments are malformed or
    /// incomplete.
    Config(ConfigError),
    /// The tracker couldn't be reached or sent back something we can't
    /// parse.
    Tracker(TrackerError),
}

/// The specific ways a wire message can be malformed or unexpected.
#[derive(Debug)]
pub enum ProtocolError {
    /// The handshake's `pstrlen` was zero.
    InvalidHandshake,
    /// The peer's handshake carried a different info hash than ours.
    InfoHashMismatch,
    /// We expected a `Bitfield` message right after the handshake but got
    /// something else (or nothing).
    MissingBitfield,
    /// A message's payload was shorter than its id requires.
    ShortPayload,
    /// A `Piece` message's `index` didn't match the piece we requested.
    PieceIndexMismatch,
    /// A `Piece` message's `begin`/block length falls outside the piece
    /// buffer.
    PieceOutOfBounds,
    /// The peer list returned by the tracker wasn't a multiple of 6 bytes.
    MalformedPeerList,
}

/// Ways the metainfo file or CLI arguments can be invalid.
#[derive(Debug)]
pub enum ConfigError {
    /// The metainfo file couldn't be read from disk.
    Unreadable(io::Error),
    /// The metainfo file isn't valid bencode, or is missing required keys.
    Malformed(String),
    /// The metainfo describes a multi-file torrent, which this downloader
    /// doesn't support.
    MultiFileUnsupported,
    /// `info.pieces` wasn't a multiple of 20 bytes.
    MalformedPieceHashes,
}

/// Ways announcing to the tracker can fail.
#[derive(Debug)]
pub enum TrackerError {
    /// The announce URL couldn't be parsed.
    InvalidAnnounceUrl,
    /// The HTTP request itself failed (DNS, connect, timeout, non-success
    /// status).
    Request(String),
    /// The response wasn't valid bencode, or was missing the `peers` key.
    Malformed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Protocol(e) => write!(f, "protocol error: {}", e),
            Error::Config(e) => write!(f, "config error: {}", e),
            Error::Tracker(e) => write!(f, "tracker error: {}", e),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidHandshake => {
                write!(f, "invalid protocol identifier length, expected 19")
            }
            ProtocolError::InfoHashMismatch => {
                write!(f, "peer handshake info hash does not match ours")
            }
            ProtocolError::MissingBitfield => {
                write!(f, "peer did not send a bitfield after the handshake")
            }
            ProtocolError::ShortPayload => {
                write!(f, "message payload shorter than its id requires")
            }
            ProtocolError::PieceIndexMismatch => {
                write!(f, "piece message index does not match the requested piece")
            }
            ProtocolError::PieceOutOfBounds => {
                write!(f, "piece message block falls outside the piece buffer")
            }
            ProtocolError::MalformedPeerList => {
                write!(f, "compact peer list length is not a multiple of 6")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Unreadable(e) => write!(f, "could not read torrent file: {}", e),
            ConfigError::Malformed(msg) => write!(f, "malformed torrent file: {}", msg),
            ConfigError::MultiFileUnsupported => {
                write!(f, "multi-file torrents are not supported")
            }
            ConfigError::MalformedPieceHashes => {
                write!(f, "piece hashes length is not a multiple of 20")
            }
        }
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::InvalidAnnounceUrl => write!(f, "invalid announce url"),
            TrackerError::Request(msg) => write!(f, "request failed: {}", msg),
            TrackerError::Malformed(msg) => write!(f, "malformed response: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<TrackerError> for Error {
    fn from(e: TrackerError) -> Self {
        Error::Tracker(e)
    }
}

impl From<tokio::time::Elapsed> for Error {
    fn from(_: tokio::time::Elapsed) -> Self {
        Error::Io(io::Error::new(io::ErrorKind::TimedOut, "deadline elapsed"))
    }
}
