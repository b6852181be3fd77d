//! A single-file BitTorrent v1 downloader.
//!
//! Given a [`metainfo::TorrentDescriptor`] and a list of peers (typically
//! obtained from [`tracker`]), [`torrent::download`] contacts peers over
//! TCP, speaks the peer wire protocol ([`wire`]), and reassembles the file
//! from hash-verified pieces pulled in parallel through a work-stealing
//! [`torrent`] orchestrator.

#[macro_use]
extern crate serde_derive;

pub mod bitfield;
pub mod conf;
pub mod error;
pub mod metainfo;
pub mod peer;
pub mod torrent;
pub mod tracker;
pub mod verify;
pub mod wire;

pub use bitfield::Bitfield;
pub use error::{Error, Result};

/// The type of a piece's index.
///
/// On the wire all integers are sent as 4-byte big endian integers, so we
/// use `u32` directly rather than `usize` to avoid casts at every wire
/// boundary.
pub type PieceIndex = u32;

/// Each peer is identified on the wire by an arbitrary 20 byte string.
///
/// Guidelines for choosing a peer id: <http://bittorrent.org/beps/bep_0020.html>.
pub type PeerId = [u8; 20];

/// A SHA-1 hash digest, 20 bytes long.
pub type Sha1Hash = [u8; 20];

/// The maximum number of bytes requested in a single block request. This is
/// the widely used and accepted 16 KiB; peers are expected to reject larger
/// requests.
pub const MAX_BLOCK_SIZE: u32 = 16 * 1024;

/// The maximum number of block requests kept outstanding (unanswered) on a
/// single peer connection at any time, i.e. the pipelining depth.
pub const MAX_BACKLOG: u32 = 5;

/// A unit of work handed to a peer worker: one piece, identified by index,
/// with the hash it must verify against and the number of bytes it's
/// expected to carry (the last piece of a torrent is typically shorter than
/// the nominal piece length).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PieceWork {
    pub index: PieceIndex,
    pub expected_hash: Sha1Hash,
    pub length: u32,
}

/// The hash-verified bytes of a single completed piece.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PieceResult {
    pub index: PieceIndex,
    pub bytes: Vec<u8>,
}

/// A peer's TCP endpoint, as returned by a tracker's compact peer list: a
/// 4-byte IPv4 address and a 16-bit port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub ip: std::net::Ipv4Addr,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: std::net::Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Returns the peer's TCP endpoint, suitable for `TcpStream::connect`.
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(std::net::IpAddr::V4(self.ip), self.port)
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Returns the length, in bytes, of the piece at `index` given the nominal
/// `piece_length` and the torrent's `total_length`.
///
/// All pieces but the last are exactly `piece_length` bytes; the last piece
/// is whatever remains.
///
/// # Panics
///
/// Panics if `index` is past the last piece of a torrent of this size.
pub(crate) fn piece_len(
    piece_length: u32,
    total_length: u64,
    index: PieceIndex,
) -> u32 {
    let begin = index as u64 * piece_length as u64;
    assert!(begin < total_length, "piece index out of bounds");
    let end = std::cmp::min(begin + piece_length as u64, total_length);
    (end - begin) as u32
}

/// Returns the number of pieces a torrent of `total_length` bytes is split
/// into, given a nominal `piece_length`.
pub(crate) fn piece_count(piece_length: u32, total_length: u64) -> usize {
    ((total_length + piece_length as u64 - 1) / piece_length as u64) as usize
}
