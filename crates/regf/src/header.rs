//! HBASE_BLOCK ("regf" base block) parsing.
//!
//! ```text
//! +0x0000  Signature: "regf" (4 bytes)
//! +0x0004  Primary sequence number (u32)
//! +0x0008  Secondary sequence number (u32)
//! +0x0024  RootCellOffset (u32), relative to hive data
//! +0x0028  HiveLength (u32), total length of hive bins
//! +0x0030  FileName (UTF-16LE, up to 255 wchars)
//! +0x1000  First HBIN ("hbin" signature); hive data starts here
//! ```

use crate::error::{RegfError, RegfResult};
use crate::source::HiveSource;
use crate::utils::read_utf16le_string;
use serde::{Deserialize, Serialize};

pub(crate) const REGF_SIGNATURE: &[u8; 4] = b"regf";

/// HBASE_BLOCK is always 4096 bytes.
pub const HBASE_BLOCK_SIZE: u64 = 4096;

const REGF_SEQ1: usize = 0x04;
const REGF_SEQ2: usize = 0x08;
const REGF_ROOT_CELL_OFFSET: usize = 0x24;
const REGF_HIVE_LENGTH: usize = 0x28;
const REGF_FILE_NAME: usize = 0x30;
const REGF_FILE_NAME_LEN: usize = 510;

/// Parsed base block of a hive.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HiveHeader {
    /// Primary sequence number.
    pub primary_sequence: u32,
    /// Secondary sequence number; differs from primary when the hive is dirty.
    pub secondary_sequence: u32,
    /// Root cell offset (relative to hive data, i.e., after HBASE_BLOCK).
    pub root_cell_offset: u32,
    /// Hive data length from the header.
    pub hive_length: u32,
    /// Embedded file name (e.g., `\REGISTRY\MACHINE\SOFTWARE` or `SYSTEM`).
    pub hive_name: String,
}

impl HiveHeader {
    /// Parse the base block at the start of `source`.
    pub fn parse(source: &dyn HiveSource) -> RegfResult<Self> {
        if source.size() < HBASE_BLOCK_SIZE {
            return Err(RegfError::InvalidHeader(format!(
                "hive is {} bytes, smaller than the {} byte base block",
                source.size(),
                HBASE_BLOCK_SIZE
            )));
        }
        let header = source.read(0, HBASE_BLOCK_SIZE as usize)?;

        if &header[0..4] != REGF_SIGNATURE {
            return Err(RegfError::InvalidHeader("missing 'regf' signature".to_string()));
        }

        let primary_sequence = read_u32(&header, REGF_SEQ1);
        let secondary_sequence = read_u32(&header, REGF_SEQ2);
        let root_cell_offset = read_u32(&header, REGF_ROOT_CELL_OFFSET);
        let hive_length = read_u32(&header, REGF_HIVE_LENGTH);

        if root_cell_offset == 0 || hive_length == 0 {
            return Err(RegfError::InvalidHeader(
                "root cell offset and hive length must be non-zero".to_string(),
            ));
        }
        if root_cell_offset >= hive_length {
            return Err(RegfError::InvalidHeader(format!(
                "root cell offset {:#x} is beyond hive length {:#x}",
                root_cell_offset, hive_length
            )));
        }
        // Dirty hives may carry mismatched sequences, but never both zero.
        if primary_sequence == 0 && secondary_sequence == 0 {
            return Err(RegfError::InvalidHeader("both sequence numbers are zero".to_string()));
        }

        let hive_name =
            read_utf16le_string(&header[REGF_FILE_NAME..REGF_FILE_NAME + REGF_FILE_NAME_LEN]);

        Ok(HiveHeader {
            primary_sequence,
            secondary_sequence,
            root_cell_offset,
            hive_length,
            hive_name,
        })
    }

    /// Whether the sequence numbers disagree (unflushed transaction).
    pub fn is_dirty(&self) -> bool {
        self.primary_sequence != self.secondary_sequence
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}
