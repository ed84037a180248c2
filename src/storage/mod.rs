//! Persistence of runs and reports.
//!
//! Binary files share one framing:
//!
//! ```text
//! file   := VarInt(header_len) header body
//! table  := VarInt(count) { type_byte VarInt(offset) }*count
//! ```
//!
//! Snapshot headers are just the table; report headers prefix it with the
//! two run ids. Offsets are relative to the start of the body and never
//! decrease.

pub mod relational;
pub mod snapshot;
pub mod window;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::codec::{put_len, put_varint, take_u8, take_varint};
use crate::error::{EncodingError, FormatError};

pub use relational::DbTarget;
pub use snapshot::{read_snapshot, write_snapshot};
pub use window::{DEFAULT_WINDOW, WindowReader};

pub const SNAPSHOT_EXTENSION: &str = "snap";
pub const REPORT_EXTENSION: &str = "rpt";

/// One entry of a header's offset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentEntry {
    pub type_tag: u8,
    pub offset: u64,
}

pub fn encode_table(buf: &mut Vec<u8>, entries: &[SegmentEntry]) -> Result<(), EncodingError> {
    put_len(buf, entries.len())?;
    for entry in entries {
        buf.push(entry.type_tag);
        put_varint(buf, entry.offset)?;
    }
    Ok(())
}

/// Decodes an offset table, rejecting offsets that go backwards.
pub fn decode_table(data: &[u8]) -> Result<(Vec<SegmentEntry>, &[u8]), FormatError> {
    let (count, mut rest) = take_varint(data)?;
    let mut entries: Vec<SegmentEntry> = Vec::new();
    for _ in 0..count {
        let (type_tag, next) = take_u8(rest)?;
        let (offset, next) = take_varint(next)?;
        if let Some(previous) = entries.last() {
            if offset < previous.offset {
                return Err(FormatError::OffsetsOutOfOrder {
                    previous: previous.offset,
                    next: offset,
                });
            }
        }
        entries.push(SegmentEntry { type_tag, offset });
        rest = next;
    }
    Ok((entries, rest))
}

/// Prepends `VarInt(header.len())` to `header` and appends `body`.
pub fn frame(header: &[u8], body: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::with_capacity(header.len() + body.len() + 8);
    put_len(&mut out, header.len())?;
    out.extend_from_slice(header);
    out.extend_from_slice(body);
    Ok(out)
}

pub fn snapshot_path(dir: &Path, run_id: &str) -> PathBuf {
    dir.join(format!("{run_id}.{SNAPSHOT_EXTENSION}"))
}

pub fn report_path(dir: &Path, report_id: &str) -> PathBuf {
    dir.join(format!("{report_id}.{REPORT_EXTENSION}"))
}

/// Writes `data` to `path` through a `.tmp` sibling and an atomic rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_layout() {
        let entries = [
            SegmentEntry {
                type_tag: 0,
                offset: 0,
            },
            SegmentEntry {
                type_tag: 7,
                offset: 40,
            },
        ];
        let mut buf = Vec::new();
        encode_table(&mut buf, &entries).unwrap();
        assert_eq!(buf, vec![0x02, 0x00, 0x00, 0x07, 0x20, 0x28]);

        let (decoded, rest) = decode_table(&buf).unwrap();
        assert_eq!(decoded, entries);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_table_rejects_decreasing_offsets() {
        let buf = [0x02, 0x00, 0x05, 0x00, 0x01];
        assert_eq!(
            decode_table(&buf),
            Err(FormatError::OffsetsOutOfOrder {
                previous: 5,
                next: 1
            })
        );
    }

    #[test]
    fn test_frame() {
        assert_eq!(frame(&[1, 2], &[3]).unwrap(), vec![2, 1, 2, 3]);
    }

    #[test]
    fn test_paths() {
        let dir = Path::new("/var/lib/hostdelta");
        assert_eq!(
            snapshot_path(dir, "monday"),
            PathBuf::from("/var/lib/hostdelta/monday.snap")
        );
        assert_eq!(
            report_path(dir, "a vs b"),
            PathBuf::from("/var/lib/hostdelta/a vs b.rpt")
        );
    }

    #[test]
    fn test_write_atomic_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.snap");
        write_atomic(&path, b"abc").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"abc");
        assert!(!dir.path().join("nested").join("run.snap.tmp").exists());
    }
}
