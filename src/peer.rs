//! A single peer connection: handshake, bitfield receipt, choke/interest
//! state, and pipelined block requests for one piece at a time.
//!
//! Per-peer state (`choked`, `peer_bitfield`, the in-flight [`PieceProgress`])
//! lives entirely in the [`PeerSession`] and never crosses a task boundary,
//! so none of it needs locking — each session is driven by exactly one
//! worker task in the orchestrator.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Framed, FramedParts};

use crate::conf::Conf;
use crate::error::ProtocolError;
use crate::wire::{
    parse_have, parse_piece, Handshake, HandshakeCodec, Message, MessageId,
    PeerCodec,
};
use crate::{Bitfield, PeerId, Result, Sha1Hash};

/// An open, handshaken connection to a single peer.
///
/// All fields are private to this session's owning task; there is
/// deliberately no way to share a `PeerSession` across tasks.
pub struct PeerSession {
    socket: Framed<TcpStream, PeerCodec>,
    addr: SocketAddr,
    /// If `true`, the peer is refusing to serve us blocks right now.
    choked: bool,
    /// The pieces this peer has announced (via the initial bitfield and
    /// subsequent `Have` messages).
    peer_bitfield: Bitfield,
    /// The tunables this session was opened with (timeouts, backlog depth,
    /// block size); see [`Conf`].
    conf: Conf,
}

/// Transient state for one piece being downloaded from one peer. Lives
/// only for the duration of a single [`PeerSession::request_piece`] call.
struct PieceProgress {
    index: u32,
    buffer: Vec<u8>,
    downloaded: u32,
    requested: u32,
    backlog: u32,
}

impl PieceProgress {
    fn new(index: u32, length: u32) -> Self {
        Self {
            index,
            buffer: vec![0u8; length as usize],
            downloaded: 0,
            requested: 0,
            backlog: 0,
        }
    }

    fn length(&self) -> u32 {
        self.buffer.len() as u32
    }
}

impl PeerSession {
    /// Dials `addr`, exchanges handshakes, and reads the peer's initial
    /// bitfield, returning a session ready to download pieces.
    ///
    /// Any failure along the way — connect timeout, handshake mismatch, a
    /// first message that isn't a bitfield — drops the connection and
    /// returns the error; the caller (a worker in the orchestrator) treats
    /// this as "drop this peer, other workers continue".
    pub async fn connect(
        addr: SocketAddr,
        info_hash: Sha1Hash,
        our_peer_id: PeerId,
        conf: &Conf,
    ) -> Result<Self> {
        log::info!("Connecting to peer {}", addr);
        let socket =
            timeout(conf.connect_timeout, TcpStream::connect(addr)).await??;
        log::info!("Connected to peer {}", addr);

        let mut socket = Framed::new(socket, HandshakeCodec);
        let handshake = Handshake::new(info_hash, our_peer_id);
        socket.send(handshake).await?;

        let peer_handshake = timeout(conf.handshake_timeout, socket.next())
            .await?
            .ok_or(ProtocolError::InvalidHandshake)??;
        if peer_handshake.info_hash != info_hash {
            log::info!("Peer {} sent a mismatched info hash", addr);
            return Err(ProtocolError::InfoHashMismatch.into());
        }

        // Switch codecs, carrying over any bytes the peer may have already
        // sent past the handshake.
        let old_parts = socket.into_parts();
        let mut new_parts = FramedParts::new(old_parts.io, PeerCodec);
        new_parts.read_buf = old_parts.read_buf;
        new_parts.write_buf = old_parts.write_buf;
        let mut socket = Framed::from_parts(new_parts);

        let first_msg = timeout(conf.bitfield_timeout, socket.next())
            .await?
            .ok_or(ProtocolError::MissingBitfield)??;
        if first_msg.id != MessageId::Bitfield {
            log::warn!(
                "Peer {} sent {:?} instead of a bitfield",
                addr,
                first_msg.id
            );
            return Err(ProtocolError::MissingBitfield.into());
        }

        log::debug!("Peer {} bitfield received", addr);
        Ok(Self {
            socket,
            addr,
            choked: true,
            peer_bitfield: Bitfield::from_bytes(first_msg.payload),
            conf: conf.clone(),
        })
    }

    /// The address this session is connected to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether the peer has announced piece `index`.
    pub fn has_piece(&self, index: u32) -> bool {
        self.peer_bitfield.has(index as usize)
    }

    pub async fn send_unchoke(&mut self) -> Result<()> {
        self.socket.send(Message::unchoke()).await
    }

    pub async fn send_interested(&mut self) -> Result<()> {
        self.socket.send(Message::interested()).await
    }

    async fn send_request(
        &mut self,
        index: u32,
        begin: u32,
        length: u32,
    ) -> Result<()> {
        self.socket.send(Message::request(index, begin, length)).await
    }

    /// Downloads a single piece, pipelining block requests up to
    /// `conf.max_backlog` deep, and returns its bytes once fully received.
    ///
    /// The whole call is bounded by a `conf.request_piece_timeout` deadline
    /// that covers every read and write; the deadline applies to the
    /// entire loop below and there is no path that returns without either
    /// hitting it, succeeding, or propagating an I/O or protocol error.
    pub async fn request_piece(
        &mut self,
        index: u32,
        length: u32,
    ) -> Result<Vec<u8>> {
        let deadline = self.conf.request_piece_timeout;
        timeout(deadline, self.request_piece_inner(index, length)).await?
    }

    async fn request_piece_inner(
        &mut self,
        index: u32,
        length: u32,
    ) -> Result<Vec<u8>> {
        let mut progress = PieceProgress::new(index, length);

        while progress.downloaded < progress.length() {
            self.fill_request_pipeline(&mut progress).await?;

            let msg = self
                .socket
                .next()
                .await
                .ok_or(ProtocolError::ShortPayload)??;
            self.dispatch(&mut progress, msg)?;
        }

        Ok(progress.buffer)
    }

    /// Issues `Request`s until either the backlog is full or the whole
    /// piece has been requested. Does nothing while choked.
    async fn fill_request_pipeline(
        &mut self,
        progress: &mut PieceProgress,
    ) -> Result<()> {
        if self.choked {
            return Ok(());
        }

        while progress.backlog < self.conf.max_backlog
            && progress.requested < progress.length()
        {
            let block_len = std::cmp::min(
                progress.length() - progress.requested,
                self.conf.block_len,
            );
            self.send_request(progress.index, progress.requested, block_len)
                .await?;
            progress.backlog += 1;
            progress.requested += block_len;
        }

        Ok(())
    }

    /// Handles one inbound message, updating choke state, the peer's
    /// bitfield, or the in-progress piece buffer as appropriate.
    fn dispatch(
        &mut self,
        progress: &mut PieceProgress,
        msg: Message,
    ) -> Result<()> {
        match msg.id {
            MessageId::Unchoke => {
                self.choked = false;
            }
            MessageId::Choke => {
                // outstanding backlog is not cancelled; the peer may still
                // answer pending requests
                self.choked = true;
            }
            MessageId::Have => {
                let have_index = parse_have(&msg)?;
                self.peer_bitfield.set(have_index as usize);
            }
            MessageId::Piece => {
                let n =
                    parse_piece(progress.index, &mut progress.buffer, &msg)?;
                progress.downloaded += n as u32;
                progress.backlog = progress.backlog.saturating_sub(1);
            }
            MessageId::KeepAlive => {
                // a frame was read at all, which is all a keep-alive needs
                // to accomplish (reset the peer's inactivity timer); no
                // further state change
            }
            _ => {
                // unrecognized or not-relevant-to-downloading messages
                // (Interested, NotInterested, a second Bitfield, Request,
                // Cancel, unknown ids) are ignored, per the design notes
            }
        }
        Ok(())
    }
}
