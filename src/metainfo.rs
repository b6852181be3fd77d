//! Decoding of `.torrent` metainfo files, and computation of the SHA-1 info
//! hash that identifies a torrent to peers and trackers.

use serde_bytes::ByteBuf;
use sha1::{Digest, Sha1};

use crate::error::{ConfigError, Error, Result};
use crate::Sha1Hash;

/// A fully decoded, single-file torrent.
///
/// This is the validated, application-facing counterpart to the raw bencode
/// dictionary: by the time a [`TorrentDescriptor`] exists, its info hash has
/// been computed, its piece hashes have been split into fixed 20-byte
/// chunks, and it's been confirmed to describe exactly one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentDescriptor {
    /// The SHA-1 hash of the bencoded `info` dictionary, identifying this
    /// torrent to peers and trackers.
    pub info_hash: Sha1Hash,
    /// The SHA-1 hash of each piece, in piece order.
    pub piece_hashes: Vec<Sha1Hash>,
    /// The nominal length, in bytes, of every piece but the last.
    pub piece_length: u32,
    /// The total length, in bytes, of the file being downloaded.
    pub total_length: u64,
    /// The file's name, used both for display and as the output file name.
    pub name: String,
    /// The tracker's announce URL.
    pub announce: String,
}

impl TorrentDescriptor {
    /// Parses and validates a metainfo file's raw bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let raw: RawMetainfo = serde_bencode::from_bytes(buf)
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;
        raw.into_descriptor()
    }

    /// Returns the number of pieces this torrent is split into.
    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Returns the length, in bytes, of the piece at `index`.
    pub fn piece_len(&self, index: crate::PieceIndex) -> u32 {
        crate::piece_len(self.piece_length, self.total_length, index)
    }
}

#[derive(Debug, Deserialize)]
struct RawMetainfo {
    announce: String,
    info: RawInfo,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawInfo {
    name: String,
    #[serde(with = "serde_bytes")]
    pieces: ByteBuf,
    #[serde(rename = "piece length")]
    piece_length: u32,
    length: Option<u64>,
    files: Option<Vec<RawFile>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawFile {
    path: Vec<String>,
    length: i64,
}

impl RawMetainfo {
    fn into_descriptor(self) -> Result<TorrentDescriptor> {
        if self.info.files.is_some() {
            return Err(Error::Config(ConfigError::MultiFileUnsupported));
        }
        let total_length = self
            .info
            .length
            .ok_or_else(|| ConfigError::Malformed("info.length missing".into()))?;

        let info_hash = hash_info(&self.info)?;
        let piece_hashes = split_piece_hashes(&self.info.pieces)?;

        Ok(TorrentDescriptor {
            info_hash,
            piece_hashes,
            piece_length: self.info.piece_length,
            total_length,
            name: self.info.name,
            announce: self.announce,
        })
    }
}

fn hash_info(info: &RawInfo) -> Result<Sha1Hash> {
    let bytes = serde_bencode::to_bytes(info)
        .map_err(|e| ConfigError::Malformed(e.to_string()))?;
    let digest = Sha1::digest(&bytes);
    let mut info_hash = [0u8; 20];
    info_hash.copy_from_slice(&digest);
    Ok(info_hash)
}

fn split_piece_hashes(pieces: &[u8]) -> Result<Vec<Sha1Hash>> {
    if pieces.len() % 20 != 0 {
        return Err(Error::Config(ConfigError::MalformedPieceHashes));
    }
    Ok(pieces
        .chunks_exact(20)
        .map(|chunk| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes(pieces_len: usize, multi_file: bool) -> Vec<u8> {
        let pieces = vec![0xABu8; pieces_len];
        let mut info = format!(
            "d6:lengthi{}e4:name8:test.iso12:piece lengthi16384e6:pieces{}:",
            if multi_file { 0 } else { 32768 },
            pieces.len(),
        )
        .into_bytes();
        info.extend_from_slice(&pieces);
        if multi_file {
            info.extend_from_slice(b"5:filesld6:lengthi1e4:pathl1:aeeee");
        }
        info.push(b'e');

        let mut buf = b"d8:announce22:http://tracker.test/4:info".to_vec();
        buf.extend_from_slice(&info);
        buf.push(b'e');
        buf
    }

    #[test]
    fn decodes_single_file_torrent() {
        let bytes = sample_bytes(40, false);
        let descriptor = TorrentDescriptor::from_bytes(&bytes).unwrap();
        assert_eq!(descriptor.announce, "http://tracker.test/");
        assert_eq!(descriptor.name, "test.iso");
        assert_eq!(descriptor.total_length, 32768);
        assert_eq!(descriptor.piece_length, 16384);
        assert_eq!(descriptor.piece_count(), 2);
    }

    #[test]
    fn rejects_multi_file_torrent() {
        let bytes = sample_bytes(20, true);
        let err = TorrentDescriptor::from_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MultiFileUnsupported)
        ));
    }

    #[test]
    fn rejects_malformed_piece_hash_length() {
        let bytes = sample_bytes(21, false);
        let err = TorrentDescriptor::from_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MalformedPieceHashes)
        ));
    }

    #[test]
    fn info_hash_is_stable_across_decodes() {
        let bytes = sample_bytes(40, false);
        let a = TorrentDescriptor::from_bytes(&bytes).unwrap();
        let b = TorrentDescriptor::from_bytes(&bytes).unwrap();
        assert_eq!(a.info_hash, b.info_hash);
    }
}
