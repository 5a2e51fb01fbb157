use dgrz_types::{Cid, DgrzResult};

/// Multicodec for dag-json.
const DAG_JSON_CODEC: u64 = 0x0129;
/// Multicodec for raw bytes.
const RAW_CODEC: u64 = 0x55;
/// Multihash code for BLAKE3-256.
const BLAKE3_MULTIHASH: u64 = 0x1e;

/// Derives CIDv1 strings for content held by the local object stores.
///
/// The CID is rendered with the base16 multibase prefix `f`:
/// `f ‖ hex(0x01 ‖ varint(codec) ‖ varint(0x1e) ‖ 0x20 ‖ blake3(data))`.
/// Equal input bytes always produce equal CIDs.
pub struct CidHasher {
    codec: u64,
}

impl CidHasher {
    /// Hasher for dag-json encoded IPLD values.
    pub const DAG_JSON: Self = Self {
        codec: DAG_JSON_CODEC,
    };
    /// Hasher for raw byte blocks.
    pub const RAW: Self = Self { codec: RAW_CODEC };

    /// Compute the CID of raw bytes.
    pub fn cid(&self, data: &[u8]) -> DgrzResult<Cid> {
        let digest = blake3::hash(data);
        let mut bytes = Vec::with_capacity(40);
        bytes.push(0x01);
        encode_varint(&mut bytes, self.codec);
        encode_varint(&mut bytes, BLAKE3_MULTIHASH);
        bytes.push(32);
        bytes.extend_from_slice(digest.as_bytes());

        Cid::parse(format!("f{}", hex::encode(bytes)))
    }

    /// Compute the CID of a JSON value as serialized by `serde_json`.
    pub fn cid_json(&self, value: &serde_json::Value) -> DgrzResult<Cid> {
        let data = serde_json::to_vec(value)?;
        self.cid(&data)
    }

    /// Verify that data produces the expected CID.
    pub fn verify(&self, data: &[u8], expected: &Cid) -> bool {
        self.cid(data).map(|cid| cid == *expected).unwrap_or(false)
    }
}

/// Unsigned LEB128, as used by multiformats.
fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}
