use sha1::{Digest, Sha1};

/// Length of the SHA-1 trailer in bytes.
pub const CHECKSUM_LEN: usize = 20;

/// SHA-1 trailer sealing the staging index file.
///
/// The trailer is the digest of every byte that precedes it.
pub struct IndexChecksum;

impl IndexChecksum {
    /// Digest of `data`.
    pub fn compute(data: &[u8]) -> [u8; CHECKSUM_LEN] {
        let mut hasher = Sha1::new();
        hasher.update(data);
        let mut out = [0u8; CHECKSUM_LEN];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    /// Append the trailer to `buf`.
    pub fn seal(buf: &mut Vec<u8>) {
        let digest = Self::compute(buf);
        buf.extend_from_slice(&digest);
    }

    /// Split a sealed image into body and trailer, returning the body when the
    /// trailer matches.
    pub fn verify(image: &[u8]) -> Option<&[u8]> {
        if image.len() < CHECKSUM_LEN {
            return None;
        }
        let (body, trailer) = image.split_at(image.len() - CHECKSUM_LEN);
        (Self::compute(body).as_slice() == trailer).then_some(body)
    }
}
