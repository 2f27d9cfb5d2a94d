//! Decoding of the packed change-record wire format.
//!
//! The kernel delivers a batch as a chain of variable-length records, each
//! a 12-byte little-endian header followed by a UTF-16 name:
//!
//! ```text
//! u32 next_entry_offset   0 marks the last record in the chain
//! u32 action              change class code
//! u32 name_bytes          length of the name in bytes (2 per code unit)
//! u16 name[..]            path relative to the watch root
//! ```
//!
//! Offsets are relative to the start of the current record, so records can
//! carry alignment padding between them. Decoding never trusts the
//! trailer: a truncated or inconsistent record ends the walk instead of
//! yielding garbage.

/// Action code carried by a raw change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawAction {
    /// An entry appeared.
    Added,
    /// An entry disappeared.
    Removed,
    /// An entry's data or metadata changed.
    Modified,
    /// First half of a rename: the name being vacated.
    RenamedOld,
    /// Second half of a rename: the name being taken.
    RenamedNew,
    /// A code this build does not recognise.
    Other(u32),
}

impl From<u32> for RawAction {
    fn from(code: u32) -> Self {
        match code {
            1 => RawAction::Added,
            2 => RawAction::Removed,
            3 => RawAction::Modified,
            4 => RawAction::RenamedOld,
            5 => RawAction::RenamedNew,
            other => RawAction::Other(other),
        }
    }
}

/// One decoded change record: what happened, and to which name relative to
/// the watch root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub action: RawAction,
    pub name: String,
}

/// Bytes before the name: three little-endian u32 fields.
const HEADER_BYTES: usize = 12;

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let chunk = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

/// Walk a batch of packed records.
///
/// Names with an odd trailing byte lose that byte; invalid UTF-16 code
/// units become replacement characters rather than failing the batch.
pub fn decode(bytes: &[u8]) -> Vec<ChangeRecord> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    loop {
        let (Some(next), Some(action), Some(name_bytes)) = (
            read_u32(bytes, offset),
            read_u32(bytes, offset + 4),
            read_u32(bytes, offset + 8),
        ) else {
            break;
        };

        let name_start = offset + HEADER_BYTES;
        let Some(raw_name) = name_start
            .checked_add(name_bytes as usize)
            .and_then(|end| bytes.get(name_start..end))
        else {
            break;
        };

        let units: Vec<u16> = raw_name
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        records.push(ChangeRecord {
            action: RawAction::from(action),
            name: String::from_utf16_lossy(&units),
        });

        if next == 0 {
            break;
        }
        let Some(advanced) = offset.checked_add(next as usize) else {
            break;
        };
        offset = advanced;
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build one packed record. `next` is the offset to the following
    /// record, 0 for the last one.
    fn record(next: u32, action: u32, name: &str) -> Vec<u8> {
        let units: Vec<u16> = name.encode_utf16().collect();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&next.to_le_bytes());
        bytes.extend_from_slice(&action.to_le_bytes());
        bytes.extend_from_slice(&((units.len() * 2) as u32).to_le_bytes());
        for unit in units {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn decodes_a_single_record() {
        let batch = record(0, 1, "a.txt");
        let records = decode(&batch);
        assert_eq!(
            records,
            vec![ChangeRecord {
                action: RawAction::Added,
                name: "a.txt".into()
            }]
        );
    }

    #[test]
    fn decodes_a_chain_with_padding_between_records() {
        let mut first = record(0, 4, "old.txt");
        // Pad the first record to a 4-byte boundary plus some slack, the
        // way the kernel aligns successors.
        while first.len() % 8 != 0 {
            first.push(0);
        }
        let next_offset = first.len() as u32;
        let mut batch = record(next_offset, 4, "old.txt");
        while batch.len() < next_offset as usize {
            batch.push(0);
        }
        batch.extend_from_slice(&record(0, 5, "new.txt"));

        let records = decode(&batch);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, RawAction::RenamedOld);
        assert_eq!(records[0].name, "old.txt");
        assert_eq!(records[1].action, RawAction::RenamedNew);
        assert_eq!(records[1].name, "new.txt");
    }

    #[test]
    fn unknown_action_codes_are_preserved() {
        let batch = record(0, 99, "weird");
        let records = decode(&batch);
        assert_eq!(records[0].action, RawAction::Other(99));
    }

    #[test]
    fn truncated_header_ends_the_walk() {
        let mut batch = record(0, 1, "a.txt");
        batch.truncate(6);
        assert!(decode(&batch).is_empty());
    }

    #[test]
    fn name_length_past_the_buffer_ends_the_walk() {
        let mut batch = record(0, 1, "a.txt");
        // Claim a name far longer than the buffer actually holds.
        batch[8..12].copy_from_slice(&1_000u32.to_le_bytes());
        assert!(decode(&batch).is_empty());
    }

    #[test]
    fn zero_length_name_is_allowed() {
        let batch = record(0, 2, "");
        let records = decode(&batch);
        assert_eq!(records[0].name, "");
        assert_eq!(records[0].action, RawAction::Removed);
    }

    #[test]
    fn chain_pointing_past_the_buffer_ends_the_walk() {
        // A next offset beyond the batch means the successor's header read
        // fails and the walk stops with what was decoded so far.
        let batch = record(10_000, 1, "a.txt");
        assert_eq!(decode(&batch).len(), 1);
    }
}
