//! Cell-level navigation of a registry hive.
//!
//! Hive data starts right after the base block. Each cell is
//! `|size(i32)|data...|`; allocated cells have a negative size. Cells are
//! identified by a 2-byte signature:
//! ```text
//!   "nk": key node (CM_KEY_NODE)
//!   "vk": key value (CM_KEY_VALUE)
//!   "lf"/"lh": fast-leaf / hash-leaf subkey list
//!   "ri": index root (for large subkey counts)
//!   "li": leaf index
//!   "db": big data (segment list for values over 16344 bytes)
//! ```

use crate::error::{RegfError, RegfResult};
use crate::header::{HiveHeader, HBASE_BLOCK_SIZE};
use crate::source::{HiveSource, MappedHive};
use crate::utils::read_utf16le_string;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

// ── Constants ────────────────────────────────────────────────────────

pub(crate) const NK_SIGNATURE: u16 = 0x6B6E; // "nk" little-endian
pub(crate) const VK_SIGNATURE: u16 = 0x6B76; // "vk" little-endian
pub(crate) const LF_SIGNATURE: u16 = 0x666C; // "lf" little-endian
pub(crate) const LH_SIGNATURE: u16 = 0x686C; // "lh" little-endian
pub(crate) const RI_SIGNATURE: u16 = 0x6972; // "ri" little-endian
pub(crate) const LI_SIGNATURE: u16 = 0x696C; // "li" little-endian
pub(crate) const DB_SIGNATURE: u16 = 0x6264; // "db" little-endian

// NK cell offsets (relative to the signature, after the 4-byte cell size)
pub(crate) const NK_FLAGS: usize = 2;
pub(crate) const NK_SUBKEY_COUNT: usize = 20;
pub(crate) const NK_SUBKEY_LIST: usize = 28;
pub(crate) const NK_VALUE_COUNT: usize = 36;
pub(crate) const NK_VALUE_LIST: usize = 40;
pub(crate) const NK_CLASS_NAME_OFFSET: usize = 48;
pub(crate) const NK_NAME_LENGTH: usize = 72;
pub(crate) const NK_CLASS_NAME_LENGTH: usize = 74;
pub(crate) const NK_NAME_START: usize = 76;

/// NK flag: KEY_HIVE_ENTRY (root key of the hive).
pub const KEY_HIVE_ENTRY: u16 = 0x0004;
/// NK flag: KEY_COMP_NAME (name is ASCII, not UTF-16).
pub const KEY_COMP_NAME: u16 = 0x0020;

// VK cell offsets (relative to the signature)
pub(crate) const VK_NAME_LENGTH: usize = 2;
pub(crate) const VK_DATA_LENGTH: usize = 4;
pub(crate) const VK_DATA_OFFSET: usize = 8;
pub(crate) const VK_TYPE: usize = 12;
pub(crate) const VK_FLAGS: usize = 16;
pub(crate) const VK_NAME_START: usize = 20;

/// VK flag: value name is ASCII (compressed).
pub const VALUE_COMP_NAME: u16 = 0x0001;

/// Marker for "no cell" in list and class offsets.
pub const NO_CELL: u32 = 0xFFFF_FFFF;

/// Lists larger than this are treated as corruption.
const MAX_LIST_ENTRIES: usize = 10_000;

/// Upper bound on a single value's data.
const MAX_VALUE_DATA: usize = 16 * 1024 * 1024;

/// Values longer than this are stored as a "db" big data record.
pub const BIG_DATA_SEGMENT: usize = 16344;

/// Registry value types.
pub mod reg_types {
    pub const REG_NONE: u32 = 0;
    pub const REG_SZ: u32 = 1;
    pub const REG_EXPAND_SZ: u32 = 2;
    pub const REG_BINARY: u32 = 3;
    pub const REG_DWORD: u32 = 4;
    pub const REG_DWORD_BIG_ENDIAN: u32 = 5;
    pub const REG_LINK: u32 = 6;
    pub const REG_MULTI_SZ: u32 = 7;
    pub const REG_RESOURCE_LIST: u32 = 8;
    pub const REG_FULL_RESOURCE_DESCRIPTOR: u32 = 9;
    pub const REG_RESOURCE_REQUIREMENTS_LIST: u32 = 10;
    pub const REG_QWORD: u32 = 11;
}

/// A parsed registry key node.
#[derive(Debug, Clone)]
pub struct KeyNode {
    /// Cell offset (relative to hive data).
    pub cell_offset: u32,
    /// Key name.
    pub name: String,
    /// NK flags.
    pub flags: u16,
    /// Number of subkeys.
    pub subkey_count: u32,
    /// Subkey list cell offset.
    pub subkey_list_offset: u32,
    /// Number of values.
    pub value_count: u32,
    /// Value list cell offset.
    pub value_list_offset: u32,
    /// Class name, if the key carries one.
    pub class_name: Option<String>,
}

/// A parsed registry value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Value name (empty string = "(Default)" value).
    pub name: String,
    /// Value type (REG_SZ=1, REG_BINARY=3, REG_DWORD=4, etc.).
    pub value_type: u32,
    /// Raw value data bytes.
    pub data: Vec<u8>,
}

// ── Hive ─────────────────────────────────────────────────────────────

/// A hive: a byte source plus its parsed base block.
pub struct Hive {
    source: Box<dyn HiveSource>,
    header: HiveHeader,
}

impl Hive {
    /// Map and parse a hive file from disk.
    pub fn open(path: impl AsRef<Path>) -> RegfResult<Self> {
        let mapped = MappedHive::open(path.as_ref())?;
        debug!("regf: mapped {} ({} bytes)", path.as_ref().display(), mapped.size());
        Self::from_source(Box::new(mapped))
    }

    /// Parse a hive held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> RegfResult<Self> {
        Self::from_source(Box::new(bytes))
    }

    /// Parse a hive from any byte source.
    pub fn from_source(source: Box<dyn HiveSource>) -> RegfResult<Self> {
        let header = HiveHeader::parse(&*source)?;
        debug!(
            "regf: hive '{}' root={:#x} length={:#x} dirty={}",
            header.hive_name,
            header.root_cell_offset,
            header.hive_length,
            header.is_dirty()
        );
        Ok(Hive { source, header })
    }

    /// The parsed base block.
    pub fn header(&self) -> &HiveHeader {
        &self.header
    }

    /// A reader over this hive's cells.
    pub fn reader(&self) -> HiveReader<'_> {
        HiveReader::new(&*self.source, &self.header)
    }
}

// ── Hive reader ──────────────────────────────────────────────────────

/// Reader for navigating the cells of a hive.
pub struct HiveReader<'a> {
    source: &'a dyn HiveSource,
    /// Base offset of hive data (HBASE_BLOCK_SIZE for files).
    hive_data_base: u64,
    hive_length: u32,
    root_cell_offset: u32,
}

impl<'a> HiveReader<'a> {
    /// Create a reader for a hive whose base block is at offset 0 of `source`.
    pub fn new(source: &'a dyn HiveSource, header: &HiveHeader) -> Self {
        HiveReader {
            source,
            hive_data_base: HBASE_BLOCK_SIZE,
            hive_length: header.hive_length,
            root_cell_offset: header.root_cell_offset,
        }
    }

    /// Read raw bytes at a cell offset (relative to hive data base).
    fn read_cell_bytes(&self, cell_offset: u32, length: usize) -> RegfResult<Vec<u8>> {
        if cell_offset >= self.hive_length {
            return Err(RegfError::CellOutOfRange {
                cell_offset,
                hive_length: self.hive_length,
            });
        }
        self.source
            .read(self.hive_data_base + cell_offset as u64, length)
    }

    /// Absolute size of the cell at `cell_offset`.
    fn cell_size(&self, cell_offset: u32) -> RegfResult<usize> {
        let bytes = self.read_cell_bytes(cell_offset, 4)?;
        let raw_size = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(raw_size.unsigned_abs() as usize)
    }

    /// Read the root key node of this hive.
    pub fn root_key(&self) -> RegfResult<KeyNode> {
        self.read_key_node(self.root_cell_offset)
    }

    /// Read a key node (NK record) at the given cell offset.
    pub fn read_key_node(&self, cell_offset: u32) -> RegfResult<KeyNode> {
        // i32 size | u16 sig ("nk") | fixed fields up to the name
        let cell = self.read_cell_bytes(cell_offset, 4 + NK_NAME_START)?;

        let sig = le_u16(&cell, 4);
        if sig != NK_SIGNATURE {
            return Err(RegfError::BadSignature {
                expected: "nk",
                cell_offset,
                found: sig,
            });
        }

        let nk = &cell[4..];
        let flags = le_u16(nk, NK_FLAGS);
        let subkey_count = le_u32(nk, NK_SUBKEY_COUNT);
        let subkey_list_offset = le_u32(nk, NK_SUBKEY_LIST);
        let value_count = le_u32(nk, NK_VALUE_COUNT);
        let value_list_offset = le_u32(nk, NK_VALUE_LIST);
        let class_name_offset = le_u32(nk, NK_CLASS_NAME_OFFSET);
        let class_name_length = le_u16(nk, NK_CLASS_NAME_LENGTH);
        let name_length = le_u16(nk, NK_NAME_LENGTH) as usize;

        let name = if name_length > 0 {
            let name_data = self.read_cell_bytes(cell_offset, 4 + NK_NAME_START + name_length)?;
            let name_bytes = &name_data[4 + NK_NAME_START..];
            if flags & KEY_COMP_NAME != 0 {
                String::from_utf8_lossy(name_bytes).into_owned()
            } else {
                read_utf16le_string(name_bytes)
            }
        } else {
            String::new()
        };

        let class_name = if class_name_length > 0 && class_name_offset != NO_CELL {
            self.read_class_name(class_name_offset, class_name_length).ok()
        } else {
            None
        };

        Ok(KeyNode {
            cell_offset,
            name,
            flags,
            subkey_count,
            subkey_list_offset,
            value_count,
            value_list_offset,
            class_name,
        })
    }

    /// Class names are stored as UTF-16LE in their own cell.
    fn read_class_name(&self, cell_offset: u32, length: u16) -> RegfResult<String> {
        let cell = self.read_cell_bytes(cell_offset, 4 + length as usize)?;
        Ok(read_utf16le_string(&cell[4..]))
    }

    /// Enumerate subkeys of a key node. Unreadable entries are skipped.
    pub fn subkeys(&self, key: &KeyNode) -> RegfResult<Vec<KeyNode>> {
        if key.subkey_count == 0 || key.subkey_list_offset == NO_CELL {
            return Ok(Vec::new());
        }

        let offsets = self.read_subkey_list(key.subkey_list_offset)?;
        let mut subkeys = Vec::with_capacity(offsets.len());
        for off in offsets {
            match self.read_key_node(off) {
                Ok(k) => subkeys.push(k),
                Err(e) => {
                    debug!("regf: skipping bad subkey at {:#x}: {}", off, e);
                }
            }
        }
        Ok(subkeys)
    }

    /// The `index`-th subkey, or `None` past the end.
    ///
    /// Reads only the list entry at `index` and that one key node. Unlike
    /// [`HiveReader::subkeys`], a corrupt entry is reported, not skipped, so
    /// indices stay stable. Unreadable `ri` sub-lists count as empty.
    pub fn subkey_at(&self, key: &KeyNode, index: usize) -> RegfResult<Option<KeyNode>> {
        if key.subkey_count == 0 || key.subkey_list_offset == NO_CELL {
            return Ok(None);
        }
        let list = key.subkey_list_offset;
        let (sig, count) = self.list_header(list)?;
        if sig != RI_SIGNATURE {
            return match self.leaf_entry(list, sig, count, index)? {
                Some(off) => Ok(Some(self.read_key_node(off)?)),
                None => Ok(None),
            };
        }

        let mut index = index;
        for i in 0..count {
            let leaf = self.read_u32(list, 8 + i * 4)?;
            let (leaf_sig, leaf_count) = match self.leaf_header(leaf) {
                Ok(h) => h,
                Err(e) => {
                    debug!("regf: skipping bad ri sub-list at {:#x}: {}", leaf, e);
                    continue;
                }
            };
            if index < leaf_count {
                return match self.leaf_entry(leaf, leaf_sig, leaf_count, index)? {
                    Some(off) => Ok(Some(self.read_key_node(off)?)),
                    None => Ok(None),
                };
            }
            index -= leaf_count;
        }
        Ok(None)
    }

    /// Signature and entry count of a subkey list cell.
    fn list_header(&self, cell_offset: u32) -> RegfResult<(u16, usize)> {
        // i32 size | u16 sig | u16 count | entries...
        let header = self.read_cell_bytes(cell_offset, 4 + 4)?;
        let sig = le_u16(&header, 4);
        let count = le_u16(&header, 6) as usize;

        if count > MAX_LIST_ENTRIES {
            return Err(RegfError::corrupt(
                cell_offset,
                format!("subkey list count {} is unreasonably large", count),
            ));
        }
        match sig {
            LF_SIGNATURE | LH_SIGNATURE | LI_SIGNATURE | RI_SIGNATURE => Ok((sig, count)),
            _ => Err(RegfError::BadSignature {
                expected: "lf/lh/li/ri",
                cell_offset,
                found: sig,
            }),
        }
    }

    /// Header of a list referenced from an `ri` record, which must be a leaf.
    fn leaf_header(&self, cell_offset: u32) -> RegfResult<(u16, usize)> {
        let (sig, count) = self.list_header(cell_offset)?;
        if sig == RI_SIGNATURE {
            return Err(RegfError::corrupt(
                cell_offset,
                "index root nested inside an index root",
            ));
        }
        Ok((sig, count))
    }

    fn leaf_entry_size(sig: u16) -> usize {
        match sig {
            // u32 cell offset + u32 hash
            LF_SIGNATURE | LH_SIGNATURE => 8,
            _ => 4,
        }
    }

    /// Key node offset stored at `index` of a leaf list.
    fn leaf_entry(
        &self,
        cell_offset: u32,
        sig: u16,
        count: usize,
        index: usize,
    ) -> RegfResult<Option<u32>> {
        if index >= count {
            return Ok(None);
        }
        let at = 8 + index * Self::leaf_entry_size(sig);
        Ok(Some(self.read_u32(cell_offset, at)?))
    }

    /// A little-endian u32 at `at` bytes into the cell at `cell_offset`.
    fn read_u32(&self, cell_offset: u32, at: usize) -> RegfResult<u32> {
        if cell_offset >= self.hive_length {
            return Err(RegfError::CellOutOfRange {
                cell_offset,
                hive_length: self.hive_length,
            });
        }
        let bytes = self
            .source
            .read(self.hive_data_base + cell_offset as u64 + at as u64, 4)?;
        Ok(le_u32(&bytes, 0))
    }

    /// Read a subkey list (lf/lh/ri/li record) and return child cell offsets.
    ///
    /// An `ri` record may only point at leaf lists; nested index roots are
    /// skipped as corrupt, which also rules out reference cycles.
    fn read_subkey_list(&self, cell_offset: u32) -> RegfResult<Vec<u32>> {
        let (sig, count) = self.list_header(cell_offset)?;
        if sig != RI_SIGNATURE {
            return self.read_leaf_list(cell_offset, sig, count);
        }

        let data = self.read_cell_bytes(cell_offset, 8 + count * 4)?;
        let mut offsets = Vec::new();
        for i in 0..count {
            let leaf = le_u32(&data, 8 + i * 4);
            let leaf_offsets = self
                .leaf_header(leaf)
                .and_then(|(leaf_sig, leaf_count)| self.read_leaf_list(leaf, leaf_sig, leaf_count));
            match leaf_offsets {
                Ok(sub_offsets) => offsets.extend(sub_offsets),
                Err(e) => {
                    debug!("regf: skipping bad ri sub-list at {:#x}: {}", leaf, e);
                }
            }
        }
        Ok(offsets)
    }

    fn read_leaf_list(&self, cell_offset: u32, sig: u16, count: usize) -> RegfResult<Vec<u32>> {
        let entry_size = Self::leaf_entry_size(sig);
        let data = self.read_cell_bytes(cell_offset, 8 + count * entry_size)?;
        Ok((0..count)
            .map(|i| le_u32(&data, 8 + i * entry_size))
            .collect())
    }

    /// Enumerate values of a key node. Unreadable entries are skipped.
    pub fn values(&self, key: &KeyNode) -> RegfResult<Vec<KeyValue>> {
        if key.value_count == 0 || key.value_list_offset == NO_CELL {
            return Ok(Vec::new());
        }
        self.check_value_count(key)?;

        // The value list is a cell holding an array of u32 VK offsets.
        let count = key.value_count as usize;
        let list_data = self.read_cell_bytes(key.value_list_offset, 4 + count * 4)?;

        let mut values = Vec::with_capacity(count);
        for i in 0..count {
            let vk_offset = le_u32(&list_data, 4 + i * 4);
            match self.read_value(vk_offset) {
                Ok(v) => values.push(v),
                Err(e) => {
                    debug!("regf: skipping bad value at {:#x}: {}", vk_offset, e);
                }
            }
        }
        Ok(values)
    }

    /// The `index`-th value, or `None` past the end.
    ///
    /// Reads only the list entry at `index` and that one value; a corrupt
    /// value is reported rather than skipped.
    pub fn value_at(&self, key: &KeyNode, index: usize) -> RegfResult<Option<KeyValue>> {
        if key.value_list_offset == NO_CELL || index >= key.value_count as usize {
            return Ok(None);
        }
        self.check_value_count(key)?;
        let vk_offset = self.read_u32(key.value_list_offset, 4 + index * 4)?;
        Ok(Some(self.read_value(vk_offset)?))
    }

    fn check_value_count(&self, key: &KeyNode) -> RegfResult<()> {
        if key.value_count as usize > MAX_LIST_ENTRIES {
            return Err(RegfError::corrupt(
                key.cell_offset,
                format!("value count {} is unreasonably large", key.value_count),
            ));
        }
        Ok(())
    }

    /// Read a single value (VK record).
    fn read_value(&self, cell_offset: u32) -> RegfResult<KeyValue> {
        let header = self.read_cell_bytes(cell_offset, 4 + VK_NAME_START)?;

        let sig = le_u16(&header, 4);
        if sig != VK_SIGNATURE {
            return Err(RegfError::BadSignature {
                expected: "vk",
                cell_offset,
                found: sig,
            });
        }

        let vk = &header[4..];
        let name_length = le_u16(vk, VK_NAME_LENGTH) as usize;
        let data_length_raw = le_u32(vk, VK_DATA_LENGTH);
        let data_offset = le_u32(vk, VK_DATA_OFFSET);
        let value_type = le_u32(vk, VK_TYPE);
        let vk_flags = le_u16(vk, VK_FLAGS);

        let name = if name_length > 0 {
            let name_data = self.read_cell_bytes(cell_offset, 4 + VK_NAME_START + name_length)?;
            let name_bytes = &name_data[4 + VK_NAME_START..];
            if vk_flags & VALUE_COMP_NAME != 0 {
                String::from_utf8_lossy(name_bytes).into_owned()
            } else {
                read_utf16le_string(name_bytes)
            }
        } else {
            String::new()
        };

        // Bit 31 of the length: data lives inline in the offset field.
        let data_is_resident = data_length_raw & 0x8000_0000 != 0;
        let data_length = (data_length_raw & 0x7FFF_FFFF) as usize;

        let data = if data_length == 0 {
            Vec::new()
        } else if data_is_resident {
            let inline_len = std::cmp::min(data_length, 4);
            data_offset.to_le_bytes()[..inline_len].to_vec()
        } else {
            self.read_value_data(data_offset, data_length)?
        };

        Ok(KeyValue {
            name,
            value_type,
            data,
        })
    }

    /// Read value data from a data cell, or from a big data record for
    /// values longer than one segment.
    fn read_value_data(&self, cell_offset: u32, length: usize) -> RegfResult<Vec<u8>> {
        if length > MAX_VALUE_DATA {
            return Err(RegfError::corrupt(
                cell_offset,
                format!("value data length {} exceeds limit", length),
            ));
        }
        let head = self.read_cell_bytes(cell_offset, 4 + 2)?;
        if length > BIG_DATA_SEGMENT && le_u16(&head, 4) == DB_SIGNATURE {
            return self.read_big_data(cell_offset, length);
        }

        let available = self.cell_size(cell_offset)?.saturating_sub(4);
        if available < length {
            return Err(RegfError::corrupt(
                cell_offset,
                format!("value data length {} exceeds its cell ({} bytes)", length, available),
            ));
        }
        let cell = self.read_cell_bytes(cell_offset, 4 + length)?;
        Ok(cell[4..].to_vec())
    }

    /// Concatenate the segments of a "db" record.
    fn read_big_data(&self, cell_offset: u32, length: usize) -> RegfResult<Vec<u8>> {
        // i32 size | u16 sig ("db") | u16 segment count | u32 segment list
        let db = self.read_cell_bytes(cell_offset, 4 + 8)?;
        let segments = le_u16(&db, 6) as usize;
        let list = le_u32(&db, 8);
        if segments * BIG_DATA_SEGMENT < length {
            return Err(RegfError::corrupt(
                cell_offset,
                format!("{} big data segments cannot hold {} bytes", segments, length),
            ));
        }

        let list_data = self.read_cell_bytes(list, 4 + segments * 4)?;
        let mut data = Vec::with_capacity(length);
        for i in 0..segments {
            let remaining = length - data.len();
            if remaining == 0 {
                break;
            }
            let segment = le_u32(&list_data, 4 + i * 4);
            let take = std::cmp::min(remaining, BIG_DATA_SEGMENT);
            if self.cell_size(segment)?.saturating_sub(4) < take {
                return Err(RegfError::corrupt(
                    segment,
                    format!("big data segment shorter than {} bytes", take),
                ));
            }
            let cell = self.read_cell_bytes(segment, 4 + take)?;
            data.extend_from_slice(&cell[4..]);
        }
        Ok(data)
    }

    /// Find an immediate subkey by name (case-insensitive).
    pub fn find_subkey(&self, key: &KeyNode, name: &str) -> RegfResult<Option<KeyNode>> {
        let name_lower = name.to_lowercase();
        Ok(self
            .subkeys(key)?
            .into_iter()
            .find(|k| k.name.to_lowercase() == name_lower))
    }

    /// Navigate from the root to a subkey by path (e.g., `Microsoft\Windows`).
    /// Components are separated by `\`; empty components are ignored.
    pub fn open_key(&self, path: &str) -> RegfResult<KeyNode> {
        self.open_key_from(self.root_key()?, path)
    }

    /// Navigate from `start` to a subkey by relative path.
    pub fn open_key_from(&self, start: KeyNode, path: &str) -> RegfResult<KeyNode> {
        let mut current = start;
        for component in path.split('\\').filter(|c| !c.is_empty()) {
            current = match self.find_subkey(&current, component)? {
                Some(next) => next,
                None => {
                    return Err(RegfError::SubkeyNotFound {
                        name: component.to_string(),
                        parent: current.name,
                    })
                }
            };
        }
        Ok(current)
    }

    /// Get a named value from a key (case-insensitive).
    pub fn get_value(&self, key: &KeyNode, name: &str) -> RegfResult<KeyValue> {
        let name_lower = name.to_lowercase();
        self.values(key)?
            .into_iter()
            .find(|v| v.name.to_lowercase() == name_lower)
            .ok_or_else(|| RegfError::ValueNotFound {
                name: name.to_string(),
                key: key.name.clone(),
            })
    }

    /// Get the (Default) value from a key.
    pub fn get_default_value(&self, key: &KeyNode) -> RegfResult<KeyValue> {
        self.get_value(key, "")
    }

    /// All values of a key by name.
    pub fn values_map(&self, key: &KeyNode) -> RegfResult<HashMap<String, KeyValue>> {
        Ok(self
            .values(key)?
            .into_iter()
            .map(|v| (v.name.clone(), v))
            .collect())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn le_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn le_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::HiveBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sample_hive() -> Hive {
        let mut b = HiveBuilder::new("SOFTWARE");
        let root = b.root();
        b.add_value(root, "Version", reg_types::REG_DWORD, &7u32.to_le_bytes());
        let vendor = b.add_key(root, "Vendor");
        b.add_value(vendor, "Path", reg_types::REG_SZ, &crate::utils::encode_utf16le("C:\\app"));
        b.add_key(vendor, "Plugins");
        b.add_key(root, "Classes");
        Hive::from_bytes(b.build()).unwrap()
    }

    #[test]
    fn test_root_key() {
        let hive = sample_hive();
        let reader = hive.reader();
        let root = reader.root_key().unwrap();
        assert_eq!(root.name, "ROOT");
        assert!(root.flags & KEY_HIVE_ENTRY != 0);
        assert_eq!(root.subkey_count, 2);
        assert_eq!(root.value_count, 1);
    }

    #[test]
    fn test_subkeys_in_order() {
        let hive = sample_hive();
        let reader = hive.reader();
        let root = reader.root_key().unwrap();
        let names: Vec<String> = reader
            .subkeys(&root)
            .unwrap()
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(names, vec!["Vendor", "Classes"]);
        assert!(reader.subkey_at(&root, 2).unwrap().is_none());
    }

    #[test]
    fn test_resident_dword_value() {
        let hive = sample_hive();
        let reader = hive.reader();
        let root = reader.root_key().unwrap();
        let v = reader.get_value(&root, "version").unwrap();
        assert_eq!(v.name, "Version");
        assert_eq!(v.value_type, reg_types::REG_DWORD);
        assert_eq!(v.data, 7u32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_open_key_path_case_insensitive() {
        let hive = sample_hive();
        let reader = hive.reader();
        let plugins = reader.open_key("vendor\\PLUGINS").unwrap();
        assert_eq!(plugins.name, "Plugins");
        let vendor = reader.open_key("\\Vendor\\").unwrap();
        let path = reader.get_value(&vendor, "Path").unwrap();
        assert_eq!(crate::utils::read_utf16le_string(&path.data), "C:\\app");
    }

    #[test]
    fn test_open_key_empty_path_is_root() {
        let hive = sample_hive();
        let reader = hive.reader();
        assert_eq!(reader.open_key("").unwrap().name, "ROOT");
    }

    #[test]
    fn test_missing_subkey() {
        let hive = sample_hive();
        let reader = hive.reader();
        let err = reader.open_key("Vendor\\Nope").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn test_missing_value() {
        let hive = sample_hive();
        let reader = hive.reader();
        let root = reader.root_key().unwrap();
        assert!(matches!(
            reader.get_value(&root, "Missing"),
            Err(RegfError::ValueNotFound { .. })
        ));
        assert!(reader.get_default_value(&root).is_err());
    }

    #[test]
    fn test_index_root_list() {
        let mut b = HiveBuilder::new("SYSTEM");
        let root = b.root();
        b.add_key(root, "A");
        b.add_key(root, "B");
        b.add_key(root, "C");
        b.use_index_root();
        let hive = Hive::from_bytes(b.build()).unwrap();
        let reader = hive.reader();
        let root = reader.root_key().unwrap();
        let names: Vec<String> = reader
            .subkeys(&root)
            .unwrap()
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_values_map_and_value_at() {
        let hive = sample_hive();
        let reader = hive.reader();
        let root = reader.root_key().unwrap();
        let map = reader.values_map(&root).unwrap();
        assert!(map.contains_key("Version"));
        assert_eq!(reader.value_at(&root, 0).unwrap().unwrap().name, "Version");
        assert!(reader.value_at(&root, 1).unwrap().is_none());
    }

    #[test]
    fn test_index_root_subkey_at() {
        let mut b = HiveBuilder::new("SYSTEM");
        let root = b.root();
        for name in ["A", "B", "C"] {
            b.add_key(root, name);
        }
        b.use_index_root();
        let hive = Hive::from_bytes(b.build()).unwrap();
        let reader = hive.reader();
        let root = reader.root_key().unwrap();
        assert_eq!(reader.subkey_at(&root, 2).unwrap().unwrap().name, "C");
        assert!(reader.subkey_at(&root, 3).unwrap().is_none());
    }

    /// Offset (relative to hive data) of the first allocated cell with `sig`.
    fn find_cell(bytes: &[u8], sig: &[u8; 2]) -> u32 {
        let base = HBASE_BLOCK_SIZE as usize;
        (base + 0x20..bytes.len() - 8)
            .step_by(8)
            .find(|&at| le_u32(bytes, at) as i32 <= 0 && &bytes[at + 4..at + 6] == sig)
            .map(|at| (at - base) as u32)
            .unwrap()
    }

    #[test]
    fn test_self_referencing_index_root_is_skipped() {
        let mut b = HiveBuilder::new("SYSTEM");
        let root = b.root();
        b.add_key(root, "A");
        b.add_key(root, "B");
        b.use_index_root();
        let mut bytes = b.build();
        let ri = find_cell(&bytes, b"ri");
        let entry = HBASE_BLOCK_SIZE as usize + ri as usize + 8;
        bytes[entry..entry + 4].copy_from_slice(&ri.to_le_bytes());

        let hive = Hive::from_bytes(bytes).unwrap();
        let reader = hive.reader();
        let root = reader.root_key().unwrap();
        assert!(reader.subkeys(&root).unwrap().is_empty());
        assert!(reader.subkey_at(&root, 0).unwrap().is_none());
        assert!(reader.open_key("A").unwrap_err().is_not_found());
    }

    struct CountingSource {
        bytes: Vec<u8>,
        reads: Arc<AtomicUsize>,
    }

    impl HiveSource for CountingSource {
        fn read(&self, offset: u64, length: usize) -> RegfResult<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            self.bytes.read(offset, length)
        }

        fn size(&self) -> u64 {
            self.bytes.size()
        }
    }

    fn counted(b: &HiveBuilder) -> (Hive, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            bytes: b.build(),
            reads: Arc::clone(&reads),
        };
        (Hive::from_source(Box::new(source)).unwrap(), reads)
    }

    #[test]
    fn test_indexed_enumeration_reads_are_linear() {
        let n = 300;
        let mut b = HiveBuilder::new("SOFTWARE");
        let root = b.root();
        for i in 0..n {
            b.add_key(root, &format!("K{:04}", i));
            b.add_value(root, &format!("V{:04}", i), reg_types::REG_DWORD, &[1, 0, 0, 0]);
        }
        let (hive, reads) = counted(&b);
        let reader = hive.reader();
        let root = reader.root_key().unwrap();

        reads.store(0, Ordering::Relaxed);
        let mut count = 0;
        while let Some(key) = reader.subkey_at(&root, count).unwrap() {
            assert_eq!(key.name, format!("K{:04}", count));
            count += 1;
        }
        assert_eq!(count, n);
        let subkey_reads = reads.swap(0, Ordering::Relaxed);
        assert!(subkey_reads <= 5 * (n + 1), "{} reads", subkey_reads);

        let mut count = 0;
        while reader.value_at(&root, count).unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, n);
        let value_reads = reads.load(Ordering::Relaxed);
        assert!(value_reads <= 4 * (n + 1), "{} reads", value_reads);
    }

    fn big_value_hive(len: usize) -> Vec<u8> {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let mut b = HiveBuilder::new("SOFTWARE");
        let root = b.root();
        b.add_value(root, "Blob", reg_types::REG_BINARY, &data);
        b.build()
    }

    #[test]
    fn test_big_data_value() {
        for len in [BIG_DATA_SEGMENT, BIG_DATA_SEGMENT + 1, 40_000] {
            let hive = Hive::from_bytes(big_value_hive(len)).unwrap();
            let reader = hive.reader();
            let root = reader.root_key().unwrap();
            let value = reader.get_value(&root, "Blob").unwrap();
            assert_eq!(value.data.len(), len);
            assert!(value.data.iter().enumerate().all(|(i, b)| *b == (i % 251) as u8));
            assert_eq!(reader.value_at(&root, 0).unwrap().unwrap(), value);
        }
    }

    #[test]
    fn test_truncated_big_data_is_an_error() {
        let mut bytes = big_value_hive(40_000);
        let db = HBASE_BLOCK_SIZE as usize + find_cell(&bytes, b"db") as usize;
        // claim a single segment for three segments' worth of data
        bytes[db + 6..db + 8].copy_from_slice(&1u16.to_le_bytes());

        let hive = Hive::from_bytes(bytes).unwrap();
        let reader = hive.reader();
        let root = reader.root_key().unwrap();
        assert!(matches!(
            reader.value_at(&root, 0),
            Err(RegfError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_bad_cell_offset() {
        let hive = sample_hive();
        let reader = hive.reader();
        let err = reader.read_key_node(0x10_0000).unwrap_err();
        assert!(matches!(err, RegfError::CellOutOfRange { .. }));
    }
}
