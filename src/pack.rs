use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::codec::{self, CodecError, Oid};
use crate::object::{self, ObjectKind};

#[derive(Debug, Error)]
pub enum PackError {
    #[error("bad pack magic, expected 'PACK'")]
    BadMagic,

    #[error("unsupported pack version {0}, only version 2 is supported")]
    BadVersion(u32),

    #[error("unknown object type {0} in pack")]
    UnknownObjectType(u8),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("pack truncated: {0}")]
    TruncatedPack(&'static str),

    #[error("delta base not found or not yet resolvable")]
    MissingDeltaBase,

    #[error("delta produced {actual} bytes, expected {expected}")]
    DeltaLengthMismatch { expected: usize, actual: usize },

    #[error("malformed delta instruction stream: {0}")]
    BadDelta(&'static str),
}

/// A fully decoded, un-resolved pack record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Commit,
    Tree,
    Blob,
    Tag,
    OfsDelta,
    RefDelta,
}

/// Either delta addressing scheme, unified so the resolver never branches
/// on which one it is until it actually needs to look up the base.
#[derive(Debug, Clone, Copy)]
enum BaseRef {
    Offset(usize),
    Id(Oid),
}

struct RawRecord {
    start: usize,
    kind: RawKind,
    /// Decompressed payload: the object bytes for non-delta records, or
    /// the raw delta instruction stream for delta records.
    payload: Vec<u8>,
    base: Option<BaseRef>,
}

/// A fully resolved object read out of a pack.
pub struct PackedObject {
    pub id: Oid,
    pub kind: ObjectKind,
    pub payload: Vec<u8>,
}

/// Parse a pack byte stream (per §4.4) into its fully resolved objects,
/// in the pack's original record order.
pub fn parse_pack(data: &[u8]) -> Result<Vec<PackedObject>, PackError> {
    if data.len() < 12 {
        return Err(PackError::TruncatedPack("missing 12-byte pack header"));
    }
    if &data[0..4] != b"PACK" {
        return Err(PackError::BadMagic);
    }
    let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
    if version != 2 {
        return Err(PackError::BadVersion(version));
    }
    let count = u32::from_be_bytes(data[8..12].try_into().unwrap()) as usize;
    debug!(count, "scanning pack records");

    let (records, offset_index, end) = scan_records(data, count)?;
    verify_trailer(data, end);

    resolve_records(records, offset_index)
}

/// The 20-byte trailer is verified when exactly 20 bytes remain after the
/// last record; an elided trailer (some servers omit it) is tolerated.
fn verify_trailer(data: &[u8], end: usize) {
    if data.len() - end != 20 {
        return;
    }
    let expected = &data[end..end + 20];
    let actual = codec::sha1(&data[..end]);
    if actual != expected {
        tracing::warn!("pack trailer checksum does not match pack contents");
    }
}

fn scan_records(
    data: &[u8],
    count: usize,
) -> Result<(Vec<RawRecord>, HashMap<usize, usize>, usize), PackError> {
    let mut records = Vec::with_capacity(count);
    let mut offset_index = HashMap::with_capacity(count);
    let mut pos = 12usize;

    for _ in 0..count {
        let start = pos;
        let (kind, _declared_size, header_len) = parse_obj_header(&data[pos..])?;
        pos += header_len;

        let base = match kind {
            RawKind::OfsDelta => {
                let (offset, len) = parse_negative_offset(&data[pos..])?;
                pos += len;
                if offset == 0 || offset > start {
                    return Err(PackError::MissingDeltaBase);
                }
                Some(BaseRef::Offset(start - offset))
            }
            RawKind::RefDelta => {
                if data.len() < pos + 20 {
                    return Err(PackError::TruncatedPack("truncated REF_DELTA base id"));
                }
                let mut id_bytes = [0u8; 20];
                id_bytes.copy_from_slice(&data[pos..pos + 20]);
                pos += 20;
                Some(BaseRef::Id(Oid::from_bytes(id_bytes)))
            }
            _ => None,
        };

        let (payload, consumed) = codec::inflate(&data[pos..])?;
        pos += consumed;

        offset_index.insert(start, records.len());
        records.push(RawRecord {
            start,
            kind,
            payload,
            base,
        });
    }

    Ok((records, offset_index, pos))
}

fn parse_obj_header(data: &[u8]) -> Result<(RawKind, usize, usize), PackError> {
    if data.is_empty() {
        return Err(PackError::TruncatedPack("missing object header"));
    }
    let first = data[0];
    let kind = match (first >> 4) & 0b0111 {
        1 => RawKind::Commit,
        2 => RawKind::Tree,
        3 => RawKind::Blob,
        4 => RawKind::Tag,
        6 => RawKind::OfsDelta,
        7 => RawKind::RefDelta,
        other => return Err(PackError::UnknownObjectType(other)),
    };

    let mut size = (first & 0x0f) as usize;
    let mut shift = 4;
    let mut i = 0;
    let mut continuation = first & 0x80 != 0;

    while continuation {
        i += 1;
        let byte = *data
            .get(i)
            .ok_or(PackError::TruncatedPack("truncated object size header"))?;
        size |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
        continuation = byte & 0x80 != 0;
    }

    Ok((kind, size, i + 1))
}

/// `OFS_DELTA` negative base offset: `b & 0x7f` seeded, then each
/// continuation byte folds in via `offset = ((offset + 1) << 7) | low7`.
fn parse_negative_offset(data: &[u8]) -> Result<(usize, usize), PackError> {
    let mut i = 0;
    let first = *data
        .get(i)
        .ok_or(PackError::TruncatedPack("truncated OFS_DELTA offset"))?;
    let mut offset = (first & 0x7f) as usize;
    let mut continuation = first & 0x80 != 0;

    while continuation {
        i += 1;
        let byte = *data
            .get(i)
            .ok_or(PackError::TruncatedPack("truncated OFS_DELTA offset"))?;
        offset = ((offset + 1) << 7) | (byte & 0x7f) as usize;
        continuation = byte & 0x80 != 0;
    }

    Ok((offset, i + 1))
}

fn raw_kind_to_object_kind(kind: RawKind) -> ObjectKind {
    match kind {
        RawKind::Commit => ObjectKind::Commit,
        RawKind::Tree => ObjectKind::Tree,
        RawKind::Blob => ObjectKind::Blob,
        RawKind::Tag => ObjectKind::Tag,
        RawKind::OfsDelta | RawKind::RefDelta => unreachable!("delta records have no direct kind"),
    }
}

/// Two-pass resolution: non-delta records resolve immediately; delta
/// records resolve via a worklist that repeatedly makes a pass over the
/// still-unresolved deltas, applying any whose base has become available.
/// This avoids recursion altogether (a pathological chain of length N
/// cannot overflow the stack) and naturally handles a delta whose base is
/// itself another not-yet-resolved delta, however the two happen to be
/// ordered in the pack.
fn resolve_records(
    records: Vec<RawRecord>,
    offset_index: HashMap<usize, usize>,
) -> Result<Vec<PackedObject>, PackError> {
    let n = records.len();
    let mut resolved: Vec<Option<(ObjectKind, Vec<u8>)>> = vec![None; n];
    let mut id_index: HashMap<Oid, usize> = HashMap::new();
    let mut pending: Vec<usize> = Vec::new();

    for (i, record) in records.iter().enumerate() {
        match record.kind {
            RawKind::OfsDelta | RawKind::RefDelta => pending.push(i),
            _ => {
                let kind = raw_kind_to_object_kind(record.kind);
                let id = object_id(kind, &record.payload);
                id_index.insert(id, i);
                resolved[i] = Some((kind, record.payload.clone()));
            }
        }
    }

    while !pending.is_empty() {
        let mut progressed = false;
        let mut still_pending = Vec::new();

        for i in pending {
            let base_idx = match records[i].base.expect("delta record always has a base") {
                BaseRef::Offset(offset) => offset_index.get(&offset).copied(),
                BaseRef::Id(id) => id_index.get(&id).copied(),
            };

            let Some(base_idx) = base_idx else {
                still_pending.push(i);
                continue;
            };

            let Some((base_kind, base_payload)) = resolved[base_idx].clone() else {
                still_pending.push(i);
                continue;
            };

            let target = apply_delta(&base_payload, &records[i].payload)?;
            let id = object_id(base_kind, &target);
            id_index.insert(id, i);
            resolved[i] = Some((base_kind, target));
            progressed = true;
        }

        if !progressed {
            return Err(PackError::MissingDeltaBase);
        }
        pending = still_pending;
    }

    let mut out = Vec::with_capacity(n);
    for (i, slot) in resolved.into_iter().enumerate() {
        let (kind, payload) = slot.expect("every record resolves or the parse already failed");
        let id = object_id(kind, &payload);
        debug!(%id, %kind, start = records[i].start, "resolved pack object");
        out.push(PackedObject { id, kind, payload });
    }
    Ok(out)
}

fn object_id(kind: ObjectKind, payload: &[u8]) -> Oid {
    Oid::from_bytes(codec::sha1(&object::serialize(kind, payload)))
}

/// Apply one delta instruction stream to `base`, per §4.4: a source-size
/// varint, a target-size varint, then copy/insert instructions until the
/// payload is exhausted.
fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut pos = 0;
    let (source_size, len) = read_delta_varint(delta)?;
    pos += len;
    if source_size != base.len() {
        return Err(PackError::BadDelta("source size does not match base length"));
    }

    let (target_size, len) = read_delta_varint(&delta[pos..])?;
    pos += len;

    let mut out = Vec::with_capacity(target_size);

    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;

        if cmd & 0x80 != 0 {
            // copy from base
            let mut offset = 0usize;
            let mut length = 0usize;

            for i in 0..4 {
                if cmd & (1 << i) != 0 {
                    let byte = *delta
                        .get(pos)
                        .ok_or(PackError::BadDelta("truncated copy offset"))?;
                    offset |= (byte as usize) << (8 * i);
                    pos += 1;
                }
            }
            for i in 0..3 {
                if cmd & (1 << (4 + i)) != 0 {
                    let byte = *delta
                        .get(pos)
                        .ok_or(PackError::BadDelta("truncated copy size"))?;
                    length |= (byte as usize) << (8 * i);
                    pos += 1;
                }
            }
            if length == 0 {
                length = 0x10000;
            }

            let end = offset
                .checked_add(length)
                .ok_or(PackError::BadDelta("copy range overflows"))?;
            let slice = base
                .get(offset..end)
                .ok_or(PackError::BadDelta("copy range outside base object"))?;
            out.extend_from_slice(slice);
        } else if cmd != 0 {
            // insert literal
            let length = cmd as usize;
            let slice = delta
                .get(pos..pos + length)
                .ok_or(PackError::BadDelta("truncated insert literal"))?;
            out.extend_from_slice(slice);
            pos += length;
        } else {
            return Err(PackError::BadDelta("reserved 0x00 instruction"));
        }
    }

    if out.len() != target_size {
        return Err(PackError::DeltaLengthMismatch {
            expected: target_size,
            actual: out.len(),
        });
    }

    Ok(out)
}

/// Delta-internal varint: low 7 bits per byte, little-endian, bit 7 as
/// the continuation flag. Distinct from the pack object header's
/// encoding (which steals its first byte's low nibble for the size too).
fn read_delta_varint(data: &[u8]) -> Result<(usize, usize), PackError> {
    let mut value = 0usize;
    let mut shift = 0;
    let mut i = 0;

    loop {
        let byte = *data
            .get(i)
            .ok_or(PackError::BadDelta("truncated size varint"))?;
        value |= ((byte & 0x7f) as usize) << shift;
        i += 1;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    Ok((value, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_object_record(kind_bits: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut size = payload.len();
        let mut first = (kind_bits << 4) | (size as u8 & 0x0f);
        size >>= 4;
        if size > 0 {
            first |= 0x80;
        }
        out.push(first);
        while size > 0 {
            let mut byte = (size & 0x7f) as u8;
            size >>= 7;
            if size > 0 {
                byte |= 0x80;
            }
            out.push(byte);
        }
        out.extend_from_slice(&codec::deflate(payload));
        out
    }

    fn build_pack(records: Vec<Vec<u8>>) -> Vec<u8> {
        let mut out = b"PACK".to_vec();
        out.extend_from_slice(&2u32.to_be_bytes());
        out.extend_from_slice(&(records.len() as u32).to_be_bytes());
        for r in records {
            out.extend_from_slice(&r);
        }
        out.extend_from_slice(&[0u8; 20]); // unverified trailer
        out
    }

    #[test]
    fn parses_pack_with_no_deltas() {
        let blob = build_object_record(3, b"hello\n");
        let tree_payload = {
            let mut p = b"100644 hello\0".to_vec();
            p.extend_from_slice(&codec::sha1(&object::serialize(ObjectKind::Blob, b"hello\n")));
            p
        };
        let tree = build_object_record(2, &tree_payload);
        let commit_payload =
            b"tree 0000000000000000000000000000000000000000\nauthor a <a@a> 0 +0000\ncommitter a <a@a> 0 +0000\n\nmsg\n";
        let commit = build_object_record(1, commit_payload);

        let pack = build_pack(vec![commit, tree, blob]);
        let objects = parse_pack(&pack).unwrap();
        assert_eq!(objects.len(), 3);
        assert!(objects.iter().any(|o| o.kind == ObjectKind::Blob));
        assert!(objects.iter().any(|o| o.kind == ObjectKind::Tree));
        assert!(objects.iter().any(|o| o.kind == ObjectKind::Commit));
    }

    #[test]
    fn zero_size_copy_means_65536_bytes() {
        let base = vec![0x42u8; 0x10000];
        let mut delta = Vec::new();

        // source size varint = 0x10000, target size varint = 0x10000
        push_varint(&mut delta, base.len());
        push_varint(&mut delta, 0x10000);

        // copy instruction: offset=0 (no offset bytes), size=0 (defaults to 65536)
        delta.push(0x80);

        let target = apply_delta(&base, &delta).unwrap();
        assert_eq!(target.len(), 0x10000);
        assert_eq!(target, base);
    }

    #[test]
    fn ofs_delta_chain_resolves_to_single_blob() {
        let base_content = b"the quick brown fox";
        let base = build_object_record(3, base_content);

        let mut delta1 = Vec::new();
        push_varint(&mut delta1, base_content.len());
        push_varint(&mut delta1, base_content.len() + 6);
        delta1.push(6); // insert literal "XXXXXX"
        delta1.extend_from_slice(b"XXXXXX");
        delta1.push(0x80 | 0x10); // copy offset=0 size byte0 present
        delta1.push(base_content.len() as u8);
        let base_record_len = base.len();
        let delta1_record = build_ofs_delta_record(&delta1, base_record_len);

        let target1_len = base_content.len() + 6;
        let mut delta2 = Vec::new();
        push_varint(&mut delta2, target1_len);
        push_varint(&mut delta2, target1_len + 3);
        delta2.push(0x80 | 0x10); // copy offset=0, target1's full length
        delta2.push(target1_len as u8);
        delta2.push(3); // insert literal "YYY"
        delta2.extend_from_slice(b"YYY");
        let delta1_record_len = delta1_record.len();
        let delta2_record = build_ofs_delta_record(&delta2, delta1_record_len);

        let pack = build_pack(vec![base, delta1_record, delta2_record]);
        let objects = parse_pack(&pack).unwrap();
        assert_eq!(objects.len(), 3);
        let blob = objects
            .iter()
            .find(|o| o.payload.ends_with(b"YYY"))
            .unwrap();
        assert_eq!(blob.kind, ObjectKind::Blob);
        let mut expected = b"XXXXXX".to_vec();
        expected.extend_from_slice(base_content);
        expected.extend_from_slice(b"YYY");
        assert_eq!(blob.payload, expected);
    }

    fn push_varint(out: &mut Vec<u8>, mut value: usize) {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value > 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    fn build_ofs_delta_record(delta_payload: &[u8], distance_back: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut size = delta_payload.len();
        let mut first = (6u8 << 4) | (size as u8 & 0x0f);
        size >>= 4;
        if size > 0 {
            first |= 0x80;
        }
        out.push(first);
        while size > 0 {
            let mut byte = (size & 0x7f) as u8;
            size >>= 7;
            if size > 0 {
                byte |= 0x80;
            }
            out.push(byte);
        }

        // negative offset encoding; single byte suffices since every
        // distance used in these tests is under 128.
        assert!(distance_back < 128);
        out.push((distance_back & 0x7f) as u8);

        out.extend_from_slice(&codec::deflate(delta_payload));
        out
    }
}
