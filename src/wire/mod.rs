//! The peer wire protocol: the fixed handshake frame and the stream of
//! length-prefixed messages that follows it.

mod codec;

pub use codec::{
    parse_have, parse_piece, serialize, serialize_keepalive, Handshake,
    HandshakeCodec, Message, MessageId, PeerCodec, PROTOCOL_STRING,
};
