//! Order-preserving key codec.
//!
//! Every entry is addressed by a (partition, collection kind, key) tuple.
//! The codec flattens that tuple into one binary key whose
//! byte-lexicographic order equals the tuple order, so a single backend
//! range covers exactly one partition's collection of one kind and sorted
//! scans come back in member order for free.
//!
//! Layout: `escape(partition) 00 00 <kind tag> escape(key) 00 00`. Zero
//! bytes inside a segment are escaped as `00 FF`, keeping the `00 00`
//! terminator unambiguous and making "a" sort before "ab" no matter what
//! follows either segment. An empty key encodes as a bare terminator and
//! sorts first within its collection.

use keelfs_common::{Error, Result};
use std::ops::Range;

/// Which of the two collection families a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Hash,
    Sorted,
}

const HASH_TAG: u8 = 0x01;
const SORTED_TAG: u8 = 0x02;

impl CollectionKind {
    pub(crate) const fn tag(self) -> u8 {
        match self {
            Self::Hash => HASH_TAG,
            Self::Sorted => SORTED_TAG,
        }
    }

    const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            HASH_TAG => Some(Self::Hash),
            SORTED_TAG => Some(Self::Sorted),
            _ => None,
        }
    }
}

fn escape_into(out: &mut Vec<u8>, segment: &[u8]) {
    for &byte in segment {
        if byte == 0x00 {
            out.extend_from_slice(&[0x00, 0xFF]);
        } else {
            out.push(byte);
        }
    }
}

fn push_segment(out: &mut Vec<u8>, segment: &[u8]) {
    escape_into(out, segment);
    out.extend_from_slice(&[0x00, 0x00]);
}

/// Read one escaped segment, returning it and the remaining input.
fn take_segment(input: &[u8]) -> Result<(Vec<u8>, &[u8])> {
    let mut segment = Vec::new();
    let mut i = 0;
    while i < input.len() {
        if input[i] == 0x00 {
            match input.get(i + 1).copied() {
                Some(0xFF) => {
                    segment.push(0x00);
                    i += 2;
                }
                Some(0x00) => return Ok((segment, &input[i + 2..])),
                _ => return Err(Error::corruption("invalid escape in storage key")),
            }
        } else {
            segment.push(input[i]);
            i += 1;
        }
    }
    Err(Error::corruption("unterminated segment in storage key"))
}

/// Encode a (partition, kind, key) tuple into a backend key.
#[must_use]
pub fn encode_key(partition: &str, kind: CollectionKind, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(partition.len() + key.len() + 5);
    push_segment(&mut out, partition.as_bytes());
    out.push(kind.tag());
    push_segment(&mut out, key);
    out
}

/// Decode a backend key back into its (partition, kind, key) tuple.
pub fn decode_key(raw: &[u8]) -> Result<(String, CollectionKind, Vec<u8>)> {
    let (partition, rest) = take_segment(raw)?;
    let (&tag, rest) = rest
        .split_first()
        .ok_or_else(|| Error::corruption("storage key missing collection tag"))?;
    let kind = CollectionKind::from_tag(tag)
        .ok_or_else(|| Error::corruption(format!("unknown collection tag {tag:#04x}")))?;
    let (key, rest) = take_segment(rest)?;
    if !rest.is_empty() {
        return Err(Error::corruption("trailing bytes after storage key"));
    }
    let partition = String::from_utf8(partition)
        .map_err(|_| Error::corruption("partition name is not valid UTF-8"))?;
    Ok((partition, kind, key))
}

/// Half-open key range covering every entry of one partition's collection.
#[must_use]
pub fn collection_range(partition: &str, kind: CollectionKind) -> Range<Vec<u8>> {
    let mut start = Vec::with_capacity(partition.len() + 3);
    push_segment(&mut start, partition.as_bytes());
    let mut end = start.clone();
    start.push(kind.tag());
    // Tags are small, so bumping the tag byte gives the exclusive end
    // without any carry handling.
    end.push(kind.tag() + 1);
    start..end
}

/// Half-open range over one partition's sorted collection, starting at the
/// first member greater than or equal to `member`.
#[must_use]
pub fn seek_range(partition: &str, member: &[u8]) -> Range<Vec<u8>> {
    let full = collection_range(partition, CollectionKind::Sorted);
    let mut start = full.start;
    // No terminator: any member with this escaped form as a prefix (the
    // member itself included) stays inside the range.
    escape_into(&mut start, member);
    start..full.end
}
