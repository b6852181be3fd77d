//! Piece integrity verification: every piece's bytes are hashed with SHA-1
//! and compared against the digest named in the metainfo file before it is
//! accepted into the output buffer.

use sha1::{Digest, Sha1};

use crate::Sha1Hash;

/// Returns whether `bytes` hashes (SHA-1) to `expected_hash`.
///
/// There's no adversarial assumption beyond plain data integrity here —
/// peers aren't modeled as malicious in a way that would call for a
/// constant-time comparison, so exact byte equality is sufficient.
pub fn verify(bytes: &[u8], expected_hash: &Sha1Hash) -> bool {
    let digest = Sha1::digest(bytes);
    digest.as_slice() == expected_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_hash_verifies() {
        let data = b"the quick brown fox";
        let digest = Sha1::digest(data);
        let mut expected = [0u8; 20];
        expected.copy_from_slice(&digest);
        assert!(verify(data, &expected));
    }

    #[test]
    fn mismatched_hash_fails() {
        let data = b"the quick brown fox";
        let wrong = [0u8; 20];
        assert!(!verify(data, &wrong));
    }

    #[test]
    fn single_bit_flip_fails() {
        let mut data = b"the quick brown fox".to_vec();
        let digest = Sha1::digest(&data);
        let mut expected = [0u8; 20];
        expected.copy_from_slice(&digest);

        data[0] ^= 1;
        assert!(!verify(&data, &expected));
    }
}
