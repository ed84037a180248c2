//! Report files.
//!
//! ```text
//! report  := VarInt(header_len) header body
//! header  := str(run_id_a) str(run_id_b) VarInt(count) { type_byte VarInt(offset) }*count
//! body    := { type_byte { VarInt(n) diff_element*n }*per kind }*per collector
//! ```
//!
//! Kinds are not tagged on the wire; each segment lists them in the
//! collector's report tree order. Segments are bounded by consecutive
//! offsets (the last one runs to end of input) and are decoded on one
//! thread each.

use std::io::Read;
use std::thread;

use tracing::{debug, error};

use crate::codec::{expect_end, put_len, put_str, take_str, take_u8, take_varint};
use crate::collector::{CollectibleKind, CollectorKind, CollectorRegistry};
use crate::diff::{CollectorDiff, DiffElement, DiffReport};
use crate::error::{AuditError, FormatError, Result};
use crate::storage::window::WindowReader;
use crate::storage::{SegmentEntry, decode_table, encode_table, frame};

/// `tag` followed by one counted element list per kind of `tree`. Kinds
/// missing from `diff` are written as empty lists.
pub fn encode_segment(
    tag: u8,
    tree: &[CollectibleKind],
    diff: &CollectorDiff,
    run_ids: [&str; 2],
) -> Result<Vec<u8>> {
    let mut buf = vec![tag];
    for kind in tree {
        let elements = diff.get(kind).map(Vec::as_slice).unwrap_or_default();
        put_len(&mut buf, elements.len())?;
        for element in elements {
            element.encode_into(&mut buf, run_ids)?;
        }
    }
    Ok(buf)
}

/// Decodes a segment body (the bytes after its type tag). Every byte must
/// belong to the segment.
pub fn decode_segment(
    tree: &[CollectibleKind],
    data: &[u8],
    run_ids: [&str; 2],
) -> Result<CollectorDiff> {
    let mut diff = CollectorDiff::new();
    let mut rest = data;
    for kind in tree {
        let (count, next) = take_varint(rest)?;
        rest = next;
        let mut elements = Vec::new();
        for _ in 0..count {
            let (element, next) = DiffElement::decode(rest, *kind, run_ids)?;
            elements.push(element);
            rest = next;
        }
        diff.insert(*kind, elements);
    }
    expect_end(rest)?;
    Ok(diff)
}

/// Encodes `report`. Offsets are assigned left to right as segments are
/// appended.
pub fn encode_report(report: &DiffReport, registry: &CollectorRegistry) -> Result<Vec<u8>> {
    let run_ids = report.run_ids();
    let mut entries = Vec::new();
    let mut body = Vec::new();
    for (name, diff) in report.tree() {
        let kind = registry.get_by_name(name)?;
        let segment = kind.encode_report_segment(diff, run_ids)?;
        entries.push(SegmentEntry {
            type_tag: kind.type_tag(),
            offset: body.len() as u64,
        });
        body.extend_from_slice(&segment);
    }

    let mut header = Vec::new();
    put_str(&mut header, report.first_run_id())?;
    put_str(&mut header, report.second_run_id())?;
    encode_table(&mut header, &entries)?;
    Ok(frame(&header, &body)?)
}

struct Segment {
    kind: CollectorKind,
    offset: u64,
    bytes: Vec<u8>,
}

/// Checks the segment's own type byte and decodes the rest.
fn parse_segment(segment: &Segment, run_ids: [&str; 2]) -> Result<CollectorDiff> {
    let (found, rest) = take_u8(&segment.bytes)?;
    let expected = segment.kind.type_tag();
    if found != expected {
        return Err(FormatError::TypeMismatch {
            offset: segment.offset,
            expected,
            found,
        }
        .into());
    }
    segment.kind.decode_report_segment(rest, run_ids)
}

/// Streams a report from `reader` and decodes its segments concurrently.
pub fn read_report<R: Read>(
    reader: R,
    window_size: usize,
    registry: &CollectorRegistry,
) -> Result<DiffReport> {
    let mut reader = WindowReader::new(reader, window_size);

    let header_len = reader.take_varint()?;
    let header = reader.take(header_len as usize)?;
    let (run_id_a, rest) = take_str(&header)?;
    let (run_id_b, rest) = take_str(rest)?;
    let (entries, rest) = decode_table(rest)?;
    expect_end(rest)?;
    reader.start_body();

    let mut segments = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let kind = registry.get_by_type(entry.type_tag)?;
        reader.seek_to(entry.offset)?;
        let bytes = match entries.get(i + 1) {
            Some(next) => reader.take((next.offset - entry.offset) as usize)?,
            None => reader.take_to_end()?,
        };
        segments.push(Segment {
            kind,
            offset: entry.offset,
            bytes,
        });
    }
    if segments.is_empty() {
        let trailing = reader.remaining()?;
        if trailing > 0 {
            return Err(FormatError::TrailingBytes(trailing).into());
        }
    }

    let mut report = DiffReport::new(run_id_a, run_id_b);
    let run_ids = report.run_ids();
    let parsed: Vec<(CollectorKind, Result<CollectorDiff>)> = thread::scope(|s| {
        let handles: Vec<_> = segments
            .iter()
            .map(|segment| (segment.kind, s.spawn(move || parse_segment(segment, run_ids))))
            .collect();
        handles
            .into_iter()
            .map(|(kind, handle)| {
                let result = handle.join().unwrap_or_else(|_| {
                    error!(collector = kind.name(), "report segment worker panicked");
                    Err(AuditError::TaskPanicked(kind.name().to_string()))
                });
                (kind, result)
            })
            .collect()
    });

    for (kind, result) in parsed {
        let diff = result?;
        debug!(collector = kind.name(), "report segment decoded");
        report.insert_collector(kind.name(), diff)?;
    }
    Ok(report)
}
