//! The HTTP tracker client: announces this download to a tracker and
//! decodes the compact peer list from its response.

use std::time::Duration;

use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use url::Url;

use crate::error::{Error, ProtocolError, Result, TrackerError};
use crate::metainfo::TorrentDescriptor;
use crate::{PeerAddress, PeerId};

/// The tracker's decoded response to an announce request.
///
/// `interval` is kept only for completeness: this crate announces exactly
/// once and never schedules a re-announce, so nothing reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerResponse {
    pub interval: Option<u64>,
    pub peers: Vec<PeerAddress>,
}

#[derive(Debug, Deserialize)]
struct RawTrackerResponse {
    interval: Option<u64>,
    #[serde(with = "serde_bytes")]
    peers: Vec<u8>,
}

/// Announces this download to `descriptor`'s tracker, listening on `port`
/// and identifying as `peer_id`, and returns the peers it offers.
pub async fn announce(
    descriptor: &TorrentDescriptor,
    peer_id: &PeerId,
    port: u16,
    timeout: Duration,
) -> Result<TrackerResponse> {
    let url = build_announce_url(descriptor, peer_id, port)?;

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TrackerError::Request(e.to_string()))?;
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| TrackerError::Request(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(Error::Tracker(TrackerError::Request(format!(
            "tracker responded with status {}",
            resp.status()
        ))));
    }
    let body = resp
        .bytes()
        .await
        .map_err(|e| TrackerError::Request(e.to_string()))?;

    let raw: RawTrackerResponse = serde_bencode::from_bytes(&body)
        .map_err(|e| TrackerError::Malformed(e.to_string()))?;
    let peers = split_peers(&raw.peers)?;

    Ok(TrackerResponse {
        interval: raw.interval,
        peers,
    })
}

/// Builds the announce URL.
///
/// `info_hash` and `peer_id` are raw 20-byte strings, not necessarily valid
/// UTF-8, so they're percent-encoded by hand rather than through
/// [`Url::query_pairs_mut`], which would treat them as text and double-encode
/// any byte that already looks like a `%XX` escape. Everything else in the
/// query is plain ASCII and goes through `url`'s normal query-pair builder,
/// which also validates that `announce` is a well-formed URL in the first
/// place.
fn build_announce_url(
    descriptor: &TorrentDescriptor,
    peer_id: &PeerId,
    port: u16,
) -> Result<String> {
    let mut url = Url::parse(&descriptor.announce)
        .map_err(|_| TrackerError::InvalidAnnounceUrl)?;
    url.query_pairs_mut()
        .append_pair("port", &port.to_string())
        .append_pair("uploaded", "0")
        .append_pair("downloaded", "0")
        .append_pair("compact", "1")
        .append_pair("left", &descriptor.total_length.to_string());

    let info_hash = percent_encode(&descriptor.info_hash, NON_ALPHANUMERIC);
    let peer_id = percent_encode(peer_id, NON_ALPHANUMERIC);
    Ok(format!(
        "{}&info_hash={}&peer_id={}",
        url, info_hash, peer_id
    ))
}

fn split_peers(buf: &[u8]) -> Result<Vec<PeerAddress>> {
    const PEER_LEN: usize = 6;
    if buf.len() % PEER_LEN != 0 {
        return Err(Error::Protocol(ProtocolError::MalformedPeerList));
    }
    Ok(buf
        .chunks_exact(PEER_LEN)
        .map(|chunk| {
            let ip = std::net::Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            PeerAddress::new(ip, port)
        })
        .collect())
}
