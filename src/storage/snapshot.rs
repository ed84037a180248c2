//! Snapshot files: one run, one blob per collector.
//!
//! ```text
//! snapshot := VarInt(header_len) header body
//! header   := VarInt(count) { type_byte VarInt(offset) }*count
//! body     := { type_byte VarInt(content_len) content }*
//! ```
//!
//! Each body blob is exactly what the collector's `export_binary` returns.

use std::io::Read;

use tracing::debug;

use crate::codec::expect_end;
use crate::collector::{CollectorRegistry, CollectorSet};
use crate::error::{FormatError, Result};
use crate::storage::window::WindowReader;
use crate::storage::{SegmentEntry, decode_table, encode_table, frame};

/// Encodes every collector of a run. Each collector must have been run
/// (or imported) and formatted.
pub fn write_snapshot(collectors: &CollectorSet) -> Result<Vec<u8>> {
    let mut entries = Vec::with_capacity(collectors.len());
    let mut body = Vec::new();
    for collector in collectors {
        let blob = collector.export_binary()?;
        entries.push(SegmentEntry {
            type_tag: collector.type_tag(),
            offset: body.len() as u64,
        });
        debug!(
            collector = collector.name(),
            offset = body.len(),
            len = blob.len(),
            "appending collector blob"
        );
        body.extend_from_slice(&blob);
    }

    let mut header = Vec::new();
    encode_table(&mut header, &entries)?;
    Ok(frame(&header, &body)?)
}

/// Streams a snapshot from `reader` using windows of `window_size` bytes
/// and rebuilds its collectors.
pub fn read_snapshot<R: Read>(
    reader: R,
    window_size: usize,
    registry: &CollectorRegistry,
) -> Result<CollectorSet> {
    let mut reader = WindowReader::new(reader, window_size);

    let header_len = reader.take_varint()?;
    let header = reader.take(header_len as usize)?;
    let (entries, rest) = decode_table(&header)?;
    expect_end(rest)?;
    reader.start_body();

    let mut collectors = CollectorSet::new();
    for entry in entries {
        let kind = registry.get_by_type(entry.type_tag)?;
        reader.seek_to(entry.offset)?;

        let found = reader.take_u8()?;
        if found != entry.type_tag {
            return Err(FormatError::TypeMismatch {
                offset: entry.offset,
                expected: entry.type_tag,
                found,
            }
            .into());
        }
        let len = reader.take_varint()?;
        let content = reader.take(len as usize)?;

        let mut collector = registry.instantiate(kind);
        let rest = collector.import_binary(&content)?;
        expect_end(rest)?;
        collector.format()?;
        debug!(collector = kind.name(), offset = entry.offset, len, "collector imported");
        collectors.insert(collector)?;
    }

    let trailing = reader.remaining()?;
    if trailing > 0 {
        return Err(FormatError::TrailingBytes(trailing).into());
    }
    Ok(collectors)
}
