//! A bit-per-piece availability vector, as exchanged in the `Bitfield` wire
//! message and sent by peers to announce which pieces they have.

use bitvec::prelude::{BitVec, Msb0};

/// A compact bool vector, most significant bit to least significant bit,
/// where the first (highest) bit of the first byte represents piece 0, the
/// second highest bit piece 1, and so on.
///
/// E.g. the byte `0b1100_0001` means pieces 0, 1, and 7 are present.
///
/// Indexing is bounds-checked but never panics: `has` on an out-of-range
/// index simply returns `false`, and `set` on an out-of-range index is a
/// no-op. This is deliberate — a short or malformed bitfield sent by a peer
/// must not be able to crash the session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bitfield(BitVec<Msb0, u8>);

impl Bitfield {
    /// Creates a bitfield with room for `piece_count` pieces, all initially
    /// unset. The underlying byte array is sized `ceil(piece_count / 8)`.
    pub fn new(piece_count: usize) -> Self {
        Self(BitVec::repeat(false, piece_count))
    }

    /// Wraps a raw byte array as received over the wire (the `Bitfield`
    /// message payload, or a persisted bitfield).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(BitVec::from_vec(bytes))
    }

    /// Returns the raw bytes backing this bitfield, MSB-first per byte.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Returns whether piece `index` is marked as present.
    ///
    /// Returns `false` for any index at or past the length of the
    /// underlying byte array.
    pub fn has(&self, index: usize) -> bool {
        self.0.get(index).map(|bit| *bit).unwrap_or(false)
    }

    /// Marks piece `index` as present.
    ///
    /// Does nothing if `index` falls outside the underlying byte array.
    pub fn set(&mut self, index: usize) {
        if let Some(mut bit) = self.0.get_mut(index) {
            *bit = true;
        }
    }

    /// The number of bits (pieces) this bitfield can address.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this bitfield addresses zero pieces.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
