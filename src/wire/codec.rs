use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, ProtocolError};
use crate::{PeerId, Result, Sha1Hash};

/// The protocol string identifying this as the BitTorrent wire protocol, per
/// BEP 3.
pub const PROTOCOL_STRING: &str = "BitTorrent protocol";

/// The handshake is the first message exchanged on a freshly opened
/// connection, before the length-prefixed message stream starts.
///
/// Wire format: `[pstrlen:u8][pstr][reserved:8 zero bytes][info_hash:20][peer_id:20]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handshake {
    pub prot: Vec<u8>,
    pub info_hash: Sha1Hash,
    pub peer_id: PeerId,
}

impl Handshake {
    /// Builds a handshake using the canonical protocol string.
    pub fn new(info_hash: Sha1Hash, peer_id: PeerId) -> Self {
        Self {
            prot: PROTOCOL_STRING.as_bytes().to_vec(),
            info_hash,
            peer_id,
        }
    }
}

/// Codec for the fixed handshake frame. Used only for the very first message
/// on a connection; afterwards the socket is switched to a [`PeerCodec`].
pub struct HandshakeCodec;

impl Encoder<Handshake> for HandshakeCodec {
    type Error = Error;

    fn encode(&mut self, hs: Handshake, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(49 + hs.prot.len());
        buf.put_u8(hs.prot.len() as u8);
        buf.put_slice(&hs.prot);
        buf.put_slice(&[0u8; 8]);
        buf.put_slice(&hs.info_hash);
        buf.put_slice(&hs.peer_id);
        Ok(())
    }
}

impl Decoder for HandshakeCodec {
    type Item = Handshake;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Handshake>> {
        if buf.is_empty() {
            return Ok(None);
        }
        let pstrlen = buf[0] as usize;
        if pstrlen == 0 {
            return Err(ProtocolError::InvalidHandshake.into());
        }
        let frame_len = 1 + pstrlen + 48;
        if buf.len() < frame_len {
            buf.reserve(frame_len - buf.len());
            return Ok(None);
        }

        let mut frame = buf.split_to(frame_len);
        frame.advance(1); // pstrlen
        let prot = frame.split_to(pstrlen).to_vec();
        frame.advance(8); // reserved bytes
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&frame[..20]);
        frame.advance(20);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&frame[..20]);

        Ok(Some(Handshake {
            prot,
            info_hash,
            peer_id,
        }))
    }
}

/// The BitTorrent peer wire message ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageId {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have,
    Bitfield,
    Request,
    Piece,
    Cancel,
    /// Not a real wire id: marks a zero-length keep-alive frame once it has
    /// been read off the wire, so that decoding a keep-alive can be told
    /// apart from "not enough bytes buffered yet" (which `Decoder::decode`
    /// signals by returning `Ok(None)`).
    KeepAlive,
    /// A message id outside 0..=8. Per the design notes, unknown ids are
    /// silently ignored by the peer session rather than treated as a
    /// protocol error.
    Unknown(u8),
}

impl MessageId {
    /// The byte this id is represented as on the wire. Panics if called on
    /// [`MessageId::KeepAlive`], which is never individually serialized
    /// (keep-alives are the four zero bytes produced by
    /// [`serialize_keepalive`], with no id byte at all).
    fn wire_byte(self) -> u8 {
        match self {
            MessageId::Choke => 0,
            MessageId::Unchoke => 1,
            MessageId::Interested => 2,
            MessageId::NotInterested => 3,
            MessageId::Have => 4,
            MessageId::Bitfield => 5,
            MessageId::Request => 6,
            MessageId::Piece => 7,
            MessageId::Cancel => 8,
            MessageId::Unknown(id) => id,
            MessageId::KeepAlive => {
                unreachable!("keep-alives are never serialized as a tagged message")
            }
        }
    }
}

impl From<u8> for MessageId {
    fn from(id: u8) -> Self {
        match id {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            other => MessageId::Unknown(other),
        }
    }
}

/// A single, already length-delimited peer wire message: an id plus its raw
/// payload bytes. Higher level meaning (e.g. which 4 bytes of a `Request`
/// payload are the piece index) is extracted on demand by the free
/// functions in this module, mirroring how the peer session consumes
/// messages (it rarely needs more than one or two fields out of a payload).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn choke() -> Self {
        Self {
            id: MessageId::Choke,
            payload: Vec::new(),
        }
    }

    pub fn unchoke() -> Self {
        Self {
            id: MessageId::Unchoke,
            payload: Vec::new(),
        }
    }

    pub fn interested() -> Self {
        Self {
            id: MessageId::Interested,
            payload: Vec::new(),
        }
    }

    pub fn not_interested() -> Self {
        Self {
            id: MessageId::NotInterested,
            payload: Vec::new(),
        }
    }

    pub fn have(piece_index: u32) -> Self {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&piece_index.to_be_bytes());
        Self {
            id: MessageId::Have,
            payload,
        }
    }

    pub fn bitfield(bytes: Vec<u8>) -> Self {
        Self {
            id: MessageId::Bitfield,
            payload: bytes,
        }
    }

    /// Builds a `Request` message asking for `length` bytes of piece
    /// `index`, starting at byte offset `begin` within the piece.
    pub fn request(index: u32, begin: u32, length: u32) -> Self {
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&index.to_be_bytes());
        payload.extend_from_slice(&begin.to_be_bytes());
        payload.extend_from_slice(&length.to_be_bytes());
        Self {
            id: MessageId::Request,
            payload,
        }
    }

    pub fn cancel(index: u32, begin: u32, length: u32) -> Self {
        let mut msg = Self::request(index, begin, length);
        msg.id = MessageId::Cancel;
        msg
    }

    /// Whether this is the sentinel in-memory value representing a
    /// zero-length keep-alive frame (never actually sent with this id on
    /// the wire; see [`MessageId::KeepAlive`]).
    pub fn is_keepalive(&self) -> bool {
        self.id == MessageId::KeepAlive
    }
}

/// Serializes `msg` into `[length:u32][id:u8][payload]`. Passing `None`
/// produces the four-byte keep-alive frame.
pub fn serialize(msg: Option<&Message>) -> Vec<u8> {
    match msg {
        None => serialize_keepalive().to_vec(),
        Some(msg) => {
            let length = msg.payload.len() as u32 + 1;
            let mut buf = Vec::with_capacity(4 + length as usize);
            buf.extend_from_slice(&length.to_be_bytes());
            buf.push(msg.id.wire_byte());
            buf.extend_from_slice(&msg.payload);
            buf
        }
    }
}

/// The four zero bytes that make up a keep-alive frame.
pub fn serialize_keepalive() -> [u8; 4] {
    [0, 0, 0, 0]
}

/// Extracts the piece index out of a `Have` message.
///
/// Errors if `msg` isn't a `Have` message or its payload is shorter than 4
/// bytes.
pub fn parse_have(msg: &Message) -> Result<u32> {
    if msg.id != MessageId::Have {
        return Err(ProtocolError::ShortPayload.into());
    }
    if msg.payload.len() < 4 {
        return Err(ProtocolError::ShortPayload.into());
    }
    let mut b = [0u8; 4];
    b.copy_from_slice(&msg.payload[..4]);
    Ok(u32::from_be_bytes(b))
}

/// Copies the block carried by a `Piece` message into `buf` at the offset
/// the message specifies, returning the number of bytes written.
///
/// Errors (without touching `buf`) if: `msg` isn't a `Piece` message, its
/// payload is shorter than 8 bytes, its piece index doesn't match
/// `expected_index`, or its `begin`/block length would write outside of
/// `buf`.
pub fn parse_piece(
    expected_index: u32,
    buf: &mut [u8],
    msg: &Message,
) -> Result<usize> {
    if msg.id != MessageId::Piece {
        return Err(ProtocolError::ShortPayload.into());
    }
    if msg.payload.len() < 8 {
        return Err(ProtocolError::ShortPayload.into());
    }

    let mut idx_bytes = [0u8; 4];
    idx_bytes.copy_from_slice(&msg.payload[0..4]);
    let index = u32::from_be_bytes(idx_bytes);
    if index != expected_index {
        return Err(ProtocolError::PieceIndexMismatch.into());
    }

    let mut begin_bytes = [0u8; 4];
    begin_bytes.copy_from_slice(&msg.payload[4..8]);
    let begin = u32::from_be_bytes(begin_bytes) as usize;

    let block = &msg.payload[8..];
    if begin >= buf.len() || begin + block.len() > buf.len() {
        return Err(ProtocolError::PieceOutOfBounds.into());
    }

    buf[begin..begin + block.len()].copy_from_slice(block);
    Ok(block.len())
}

/// Codec for the length-prefixed message stream that follows the handshake.
pub struct PeerCodec;

impl Encoder<Message> for PeerCodec {
    type Error = Error;

    fn encode(&mut self, msg: Message, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(&serialize(Some(&msg)));
        Ok(())
    }
}

impl Decoder for PeerCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[0..4]);
        let length = u32::from_be_bytes(len_bytes) as usize;

        if length == 0 {
            buf.advance(4);
            return Ok(Some(Message {
                id: MessageId::KeepAlive,
                payload: Vec::new(),
            }));
        }

        if buf.len() < 4 + length {
            buf.reserve(4 + length - buf.len());
            return Ok(None);
        }

        buf.advance(4);
        let mut frame = buf.split_to(length);
        let id = MessageId::from(frame[0]);
        frame.advance(1);
        let payload = frame.to_vec();

        Ok(Some(Message { id, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_serializes_to_four_zero_bytes() {
        assert_eq!(serialize(None), vec![0, 0, 0, 0]);
    }

    #[test]
    fn round_trips_every_message_id_and_payload_length() {
        for id in 0..=8u8 {
            for len in [0usize, 1, 13, 255, 1024] {
                let msg = Message {
                    id: MessageId::from(id),
                    payload: vec![0xAB; len],
                };
                let bytes = serialize(Some(&msg));

                let mut buf = BytesMut::from(&bytes[..]);
                let mut codec = PeerCodec;
                let decoded = codec.decode(&mut buf).unwrap().unwrap();
                assert_eq!(decoded, msg);
                assert!(buf.is_empty());
            }
        }
    }

    #[test]
    fn format_request_matches_the_documented_byte_layout() {
        let msg = Message::request(5, 100, 16384);
        let bytes = serialize(Some(&msg));
        assert_eq!(
            bytes,
            vec![
                0, 0, 0, 13, 6, 0, 0, 0, 5, 0, 0, 0, 100, 0, 0, 64, 0
            ]
        );
    }

    #[test]
    fn parse_piece_writes_block_at_begin_offset() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&4u32.to_be_bytes());
        payload.extend_from_slice(&4096u32.to_be_bytes());
        payload.extend_from_slice(&[0xAA; 4]);
        let msg = Message {
            id: MessageId::Piece,
            payload,
        };

        let mut buf = vec![0u8; 16384];
        let n = parse_piece(4, &mut buf, &msg).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[4096..4100], &[0xAA; 4]);
    }

    #[test]
    fn parse_piece_rejects_mismatched_index() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&9u32.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&[1, 2, 3]);
        let msg = Message {
            id: MessageId::Piece,
            payload,
        };

        let mut buf = vec![0u8; 16];
        let before = buf.clone();
        assert!(parse_piece(4, &mut buf, &msg).is_err());
        assert_eq!(buf, before);
    }

    #[test]
    fn parse_piece_rejects_out_of_bounds_block() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&14u32.to_be_bytes());
        payload.extend_from_slice(&[1, 2, 3, 4]);
        let msg = Message {
            id: MessageId::Piece,
            payload,
        };

        let mut buf = vec![0u8; 16];
        assert!(parse_piece(0, &mut buf, &msg).is_err());
    }

    #[test]
    fn parse_have_extracts_piece_index() {
        let msg = Message::have(42);
        assert_eq!(parse_have(&msg).unwrap(), 42);
    }

    #[test]
    fn parse_have_rejects_short_payload() {
        let msg = Message {
            id: MessageId::Have,
            payload: vec![0, 1],
        };
        assert!(parse_have(&msg).is_err());
    }

    #[test]
    fn handshake_round_trips_and_zeroes_reserved_bytes() {
        let info_hash = [7u8; 20];
        let peer_id = [9u8; 20];
        let hs = Handshake::new(info_hash, peer_id);

        let mut buf = BytesMut::new();
        let mut codec = HandshakeCodec;
        codec.encode(hs.clone(), &mut buf).unwrap();

        assert_eq!(buf[0], 19);
        assert_eq!(&buf[9..17], &[0u8; 8]);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.info_hash, info_hash);
        assert_eq!(decoded.peer_id, peer_id);
    }

    #[test]
    fn handshake_with_zero_pstrlen_is_rejected() {
        let mut buf = BytesMut::from(&[0u8][..]);
        let mut codec = HandshakeCodec;
        assert!(codec.decode(&mut buf).is_err());
    }
}
