//! On-disk image of the staging index.
//!
//! ```text
//! header   "RESC" | version: u32 BE | entry count: u32 BE
//! entries  dataset\0 kind\0 iri\0 container kind\0 container iri\0 mtime\0 cid\0 \0
//! trailer  SHA-1 of every preceding byte (20 bytes)
//! ```
//!
//! Kinds are written by name (`Dataset`, `Context`, `NamedGraph`, `Node`),
//! the mtime in decimal, and an absent CID as the empty string.

use dgrz_crypto::{IndexChecksum, CHECKSUM_LEN};
use dgrz_types::{Cid, DgrzError, DgrzResult, Location, ResourceKind, StagingEntry, WorkspacePath};

/// File signature.
pub const SIGNATURE: &[u8; 4] = b"RESC";
/// Current format version.
pub const VERSION: u32 = 1;
/// Signature, version, and entry count.
pub const HEADER_LEN: usize = 12;

const FIELD_COUNT: usize = 7;

/// Serialize `entries` into a sealed index image.
pub fn encode<'a>(entries: impl ExactSizeIterator<Item = &'a StagingEntry>) -> DgrzResult<Vec<u8>> {
    let count = u32::try_from(entries.len())
        .map_err(|_| DgrzError::out_of_range("too many index entries"))?;

    let mut buf = Vec::with_capacity(HEADER_LEN + CHECKSUM_LEN + entries.len() * 128);
    buf.extend_from_slice(SIGNATURE);
    buf.extend_from_slice(&VERSION.to_be_bytes());
    buf.extend_from_slice(&count.to_be_bytes());

    for entry in entries {
        let loc = entry.location();
        let mtime = entry.last_modified_ns().to_string();
        let dataset = loc.dataset_path().to_string();
        let fields: [&str; FIELD_COUNT] = [
            &dataset,
            loc.object_kind().as_str(),
            loc.object_iri(),
            loc.container_kind().as_str(),
            loc.container_iri(),
            &mtime,
            entry.object_cid().map(Cid::as_str).unwrap_or(""),
        ];
        for field in fields {
            if field.as_bytes().contains(&0) {
                return Err(DgrzError::invalid_value("index field contains a nul byte")
                    .with_context("location", loc));
            }
            buf.extend_from_slice(field.as_bytes());
            buf.push(0);
        }
        buf.push(0);
    }

    IndexChecksum::seal(&mut buf);
    Ok(buf)
}

/// Parse and verify a sealed index image.
///
/// Fails with `UnexpectedValue` on truncation, a wrong signature or version,
/// a checksum mismatch, an entry count that disagrees with the entries
/// present, or an entry that does not revalidate.
pub fn decode(image: &[u8]) -> DgrzResult<Vec<StagingEntry>> {
    if image.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(corrupt("index file is truncated").with_context("length", image.len()));
    }
    if &image[0..4] != SIGNATURE {
        return Err(corrupt("bad index signature")
            .with_context("signature", String::from_utf8_lossy(&image[0..4])));
    }
    let version = read_u32(&image[4..8]);
    if version != VERSION {
        return Err(corrupt("unsupported index version").with_context("version", version));
    }
    let body = IndexChecksum::verify(image).ok_or_else(|| corrupt("index checksum mismatch"))?;
    let count = read_u32(&body[8..12]) as usize;

    let mut cursor = Cursor {
        data: body,
        pos: HEADER_LEN,
    };
    let mut entries = Vec::with_capacity(count.min(1 << 16));
    for n in 0..count {
        let entry = cursor
            .next_entry()
            .map_err(|e| corrupt("invalid index entry").with_context("entry", n).with_source(e))?;
        entries.push(entry);
    }
    if cursor.pos != body.len() {
        return Err(corrupt("index holds more data than its entry count")
            .with_context("count", count)
            .with_context("offset", cursor.pos));
    }
    Ok(entries)
}

fn corrupt(message: &str) -> DgrzError {
    DgrzError::unexpected_value(message)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(arr)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn field(&mut self) -> DgrzResult<&'a str> {
        let data: &'a [u8] = self.data;
        let rest = &data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| corrupt("unterminated field").with_context("offset", self.pos))?;
        let text = std::str::from_utf8(&rest[..end])
            .map_err(|e| corrupt("field is not UTF-8").with_context("offset", self.pos).with_source(e))?;
        self.pos += end + 1;
        Ok(text)
    }

    fn next_entry(&mut self) -> DgrzResult<StagingEntry> {
        let dataset = WorkspacePath::parse(self.field()?)?;
        let object_kind: ResourceKind = self.field()?.parse()?;
        let object_iri = self.field()?.to_string();
        let container_kind: ResourceKind = self.field()?.parse()?;
        let container_iri = self.field()?.to_string();
        let mtime_text = self.field()?;
        let mtime: i64 = mtime_text
            .parse()
            .map_err(|_| corrupt("mtime is not an integer").with_context("mtime", mtime_text))?;
        let cid = match self.field()? {
            "" => None,
            text => Some(Cid::parse(text)?),
        };
        match self.data.get(self.pos) {
            Some(0) => self.pos += 1,
            _ => return Err(corrupt("missing entry separator").with_context("offset", self.pos)),
        }

        let location = Location::new(dataset, object_kind, object_iri, container_kind, container_iri)?;
        StagingEntry::new(location, mtime, cid)
    }
}
