//! This module defines the types used to configure the downloader.

use std::time::Duration;

use rand::Rng;

use crate::{PeerId, MAX_BACKLOG, MAX_BLOCK_SIZE};

/// The Azureus-style client identification prefix this downloader announces
/// to trackers and peers. The remaining 12 bytes are randomized per run so
/// that running several instances against the same tracker doesn't collide
/// on peer id.
///
/// Guidelines for choosing a peer id: <http://bittorrent.org/beps/bep_0020.html>.
pub const CLIENT_ID_PREFIX: &[u8; 8] = b"-ST0001-";

/// Builds a peer id from [`CLIENT_ID_PREFIX`] followed by 12 random ASCII
/// digits.
fn random_client_id() -> PeerId {
    let mut id = [0u8; 20];
    id[..8].copy_from_slice(CLIENT_ID_PREFIX);
    let mut rng = rand::thread_rng();
    for byte in &mut id[8..] {
        *byte = b'0' + rng.gen_range(0..10);
    }
    id
}

/// Configuration for a single download.
///
/// The core state machine reads every tunable off of this struct rather
/// than off of hardcoded constants, so timeouts, backlog depth, and block
/// size remain changeable without scattering magic numbers through the
/// core. [`Conf::new`] supplies sensible defaults.
#[derive(Clone, Debug)]
pub struct Conf {
    /// The id announced to the tracker and to peers during the handshake.
    pub client_id: PeerId,
    /// Timeout for the initial TCP connect to a peer.
    pub connect_timeout: Duration,
    /// Timeout for receiving the peer's handshake.
    pub handshake_timeout: Duration,
    /// Timeout for receiving the peer's first (bitfield) message.
    pub bitfield_timeout: Duration,
    /// Hard deadline for downloading one whole piece from one peer,
    /// covering every read and write issued during the call.
    pub request_piece_timeout: Duration,
    /// Timeout for the tracker's HTTP announce request.
    pub tracker_timeout: Duration,
    /// The pipelining depth: how many block requests are kept outstanding,
    /// unanswered, on a single peer connection at once.
    pub max_backlog: u32,
    /// The maximum number of bytes requested in a single block request.
    pub block_len: u32,
}

impl Conf {
    /// Returns the configuration with the defaults named throughout the
    /// design document.
    pub fn new() -> Self {
        Self {
            client_id: random_client_id(),
            connect_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(3),
            bitfield_timeout: Duration::from_secs(5),
            request_piece_timeout: Duration::from_secs(30),
            tracker_timeout: Duration::from_secs(15),
            max_backlog: MAX_BACKLOG,
            block_len: MAX_BLOCK_SIZE,
        }
    }
}

impl Default for Conf {
    fn default() -> Self {
        Self::new()
    }
}
