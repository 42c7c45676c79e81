//! Builder for small synthetic hives.
//!
//! Produces a complete hive image (base block, one HBIN and its cells) so
//! readers can be exercised without real registry files. Key and value
//! names are stored as compressed (ASCII) names.

use crate::header::{HBASE_BLOCK_SIZE, REGF_SIGNATURE};
use crate::reader::*;
use crate::utils::encode_utf16le;

/// Index of a key inside a [`HiveBuilder`].
pub type KeyId = usize;

/// First cell offset: right after the 32-byte HBIN header.
const FIRST_CELL: u32 = 0x20;

struct KeySpec {
    name: String,
    children: Vec<KeyId>,
    values: Vec<ValueSpec>,
}

struct ValueSpec {
    name: String,
    value_type: u32,
    data: Vec<u8>,
}

/// Where a value's data lives.
#[derive(Clone)]
enum DataCells {
    /// Inline in the VK record.
    Resident,
    Cell(u32),
    /// A "db" record, its segment list, and the segment cells.
    BigData {
        db: u32,
        list: u32,
        segments: Vec<u32>,
    },
}

#[derive(Default, Clone)]
struct KeyLayout {
    nk: u32,
    value_cells: Vec<(u32, DataCells)>,
    value_list: Option<u32>,
    /// (ri cell, leaf cell); ri is present only in index-root mode.
    subkey_list: Option<(Option<u32>, u32)>,
}

/// Lays out keys and values into a hive image.
pub struct HiveBuilder {
    hive_name: String,
    keys: Vec<KeySpec>,
    index_root: bool,
}

impl HiveBuilder {
    /// Start a hive whose root key is named `ROOT`.
    pub fn new(hive_name: impl Into<String>) -> Self {
        HiveBuilder {
            hive_name: hive_name.into(),
            keys: vec![KeySpec {
                name: "ROOT".to_string(),
                children: Vec::new(),
                values: Vec::new(),
            }],
            index_root: false,
        }
    }

    /// The root key.
    pub fn root(&self) -> KeyId {
        0
    }

    /// Add a subkey under `parent`.
    pub fn add_key(&mut self, parent: KeyId, name: &str) -> KeyId {
        let id = self.keys.len();
        self.keys.push(KeySpec {
            name: name.to_string(),
            children: Vec::new(),
            values: Vec::new(),
        });
        self.keys[parent].children.push(id);
        id
    }

    /// Add a value under `key`. Data of four bytes or less is stored
    /// resident; data longer than [`BIG_DATA_SEGMENT`] goes into a "db"
    /// record.
    pub fn add_value(&mut self, key: KeyId, name: &str, value_type: u32, data: &[u8]) {
        self.keys[key].values.push(ValueSpec {
            name: name.to_string(),
            value_type,
            data: data.to_vec(),
        });
    }

    /// Convenience for a REG_SZ value.
    pub fn add_string(&mut self, key: KeyId, name: &str, value: &str) {
        let mut data = encode_utf16le(value);
        data.extend_from_slice(&[0, 0]);
        self.add_value(key, name, reg_types::REG_SZ, &data);
    }

    /// Convenience for a REG_DWORD value.
    pub fn add_dword(&mut self, key: KeyId, name: &str, value: u32) {
        self.add_value(key, name, reg_types::REG_DWORD, &value.to_le_bytes());
    }

    /// Emit subkey lists as "ri" → "li" instead of "lf".
    pub fn use_index_root(&mut self) {
        self.index_root = true;
    }

    /// Produce the hive image.
    pub fn build(&self) -> Vec<u8> {
        let mut cursor = FIRST_CELL;
        let mut alloc = |len: usize| -> u32 {
            let offset = cursor;
            cursor += cell_len(len) as u32;
            offset
        };

        let mut layouts = vec![KeyLayout::default(); self.keys.len()];
        for (layout, key) in layouts.iter_mut().zip(&self.keys) {
            layout.nk = alloc(4 + NK_NAME_START + key.name.len());
            for value in &key.values {
                let vk = alloc(4 + VK_NAME_START + value.name.len());
                let len = value.data.len();
                let data = if len <= 4 {
                    DataCells::Resident
                } else if len <= BIG_DATA_SEGMENT {
                    DataCells::Cell(alloc(4 + len))
                } else {
                    let count = (len + BIG_DATA_SEGMENT - 1) / BIG_DATA_SEGMENT;
                    let db = alloc(4 + 8);
                    let list = alloc(4 + 4 * count);
                    let segments = (0..count)
                        .map(|i| alloc(4 + std::cmp::min(BIG_DATA_SEGMENT, len - i * BIG_DATA_SEGMENT)))
                        .collect();
                    DataCells::BigData { db, list, segments }
                };
                layout.value_cells.push((vk, data));
            }
            if !key.values.is_empty() {
                layout.value_list = Some(alloc(4 + 4 * key.values.len()));
            }
            if !key.children.is_empty() {
                let n = key.children.len();
                layout.subkey_list = Some(if self.index_root {
                    (Some(alloc(8 + 4)), alloc(8 + 4 * n))
                } else {
                    (None, alloc(8 + 8 * n))
                });
            }
        }

        let used = cursor as usize;
        let hive_length = (used + 4095) & !4095;
        let mut data = vec![0u8; hive_length];

        // HBIN header
        data[0..4].copy_from_slice(b"hbin");
        put_u32(&mut data, 8, hive_length as u32);

        for (id, (layout, key)) in layouts.iter().zip(&self.keys).enumerate() {
            self.write_key(&mut data, id, key, layout, &layouts);
        }

        let mut hive = vec![0u8; HBASE_BLOCK_SIZE as usize];
        hive[0..4].copy_from_slice(REGF_SIGNATURE);
        put_u32(&mut hive, 4, 1);
        put_u32(&mut hive, 8, 1);
        put_u32(&mut hive, 0x24, layouts[0].nk);
        put_u32(&mut hive, 0x28, hive_length as u32);
        let name = encode_utf16le(&self.hive_name);
        let name_len = std::cmp::min(name.len(), 508);
        hive[0x30..0x30 + name_len].copy_from_slice(&name[..name_len]);

        hive.extend_from_slice(&data);
        hive
    }

    fn write_key(
        &self,
        data: &mut [u8],
        id: KeyId,
        key: &KeySpec,
        layout: &KeyLayout,
        layouts: &[KeyLayout],
    ) {
        let nk = layout.nk as usize;
        put_cell_size(data, nk, 4 + NK_NAME_START + key.name.len());
        let sig = nk + 4;
        put_u16(data, sig, NK_SIGNATURE);
        let flags = if id == 0 {
            KEY_COMP_NAME | KEY_HIVE_ENTRY
        } else {
            KEY_COMP_NAME
        };
        put_u16(data, sig + NK_FLAGS, flags);
        put_u32(data, sig + NK_SUBKEY_COUNT, key.children.len() as u32);
        put_u32(data, sig + NK_VALUE_COUNT, key.values.len() as u32);
        put_u32(data, sig + NK_CLASS_NAME_OFFSET, NO_CELL);
        put_u16(data, sig + NK_CLASS_NAME_LENGTH, 0);
        put_u16(data, sig + NK_NAME_LENGTH, key.name.len() as u16);
        data[sig + NK_NAME_START..sig + NK_NAME_START + key.name.len()]
            .copy_from_slice(key.name.as_bytes());

        match layout.value_list {
            Some(list) => {
                put_u32(data, sig + NK_VALUE_LIST, list);
                let list = list as usize;
                put_cell_size(data, list, 4 + 4 * key.values.len());
                for (i, (value, (vk, data_cell))) in
                    key.values.iter().zip(&layout.value_cells).enumerate()
                {
                    put_u32(data, list + 4 + 4 * i, *vk);
                    write_value(data, value, *vk as usize, data_cell);
                }
            }
            None => put_u32(data, sig + NK_VALUE_LIST, NO_CELL),
        }

        let children: Vec<u32> = key.children.iter().map(|&c| layouts[c].nk).collect();
        match layout.subkey_list {
            Some((Some(ri), li)) => {
                put_u32(data, sig + NK_SUBKEY_LIST, ri);
                let ri = ri as usize;
                put_cell_size(data, ri, 8 + 4);
                put_u16(data, ri + 4, RI_SIGNATURE);
                put_u16(data, ri + 6, 1);
                put_u32(data, ri + 8, li);
                let li = li as usize;
                put_cell_size(data, li, 8 + 4 * children.len());
                put_u16(data, li + 4, LI_SIGNATURE);
                put_u16(data, li + 6, children.len() as u16);
                for (i, child) in children.iter().enumerate() {
                    put_u32(data, li + 8 + 4 * i, *child);
                }
            }
            Some((None, lf)) => {
                put_u32(data, sig + NK_SUBKEY_LIST, lf);
                let lf = lf as usize;
                put_cell_size(data, lf, 8 + 8 * children.len());
                put_u16(data, lf + 4, LF_SIGNATURE);
                put_u16(data, lf + 6, children.len() as u16);
                for (i, child) in children.iter().enumerate() {
                    put_u32(data, lf + 8 + 8 * i, *child);
                }
            }
            None => put_u32(data, sig + NK_SUBKEY_LIST, NO_CELL),
        }
    }
}

fn write_value(data: &mut [u8], value: &ValueSpec, vk: usize, data_cell: &DataCells) {
    put_cell_size(data, vk, 4 + VK_NAME_START + value.name.len());
    let sig = vk + 4;
    put_u16(data, sig, VK_SIGNATURE);
    put_u16(data, sig + VK_NAME_LENGTH, value.name.len() as u16);
    put_u32(data, sig + VK_TYPE, value.value_type);
    put_u16(data, sig + VK_FLAGS, VALUE_COMP_NAME);
    data[sig + VK_NAME_START..sig + VK_NAME_START + value.name.len()]
        .copy_from_slice(value.name.as_bytes());

    let len = value.data.len();
    match data_cell {
        DataCells::Resident => {
            put_u32(data, sig + VK_DATA_LENGTH, len as u32 | 0x8000_0000);
            data[sig + VK_DATA_OFFSET..sig + VK_DATA_OFFSET + len].copy_from_slice(&value.data);
        }
        DataCells::Cell(cell) => {
            put_u32(data, sig + VK_DATA_LENGTH, len as u32);
            put_u32(data, sig + VK_DATA_OFFSET, *cell);
            let cell = *cell as usize;
            put_cell_size(data, cell, 4 + len);
            data[cell + 4..cell + 4 + len].copy_from_slice(&value.data);
        }
        DataCells::BigData { db, list, segments } => {
            put_u32(data, sig + VK_DATA_LENGTH, len as u32);
            put_u32(data, sig + VK_DATA_OFFSET, *db);
            let db = *db as usize;
            put_cell_size(data, db, 4 + 8);
            put_u16(data, db + 4, DB_SIGNATURE);
            put_u16(data, db + 6, segments.len() as u16);
            put_u32(data, db + 8, *list);
            let list = *list as usize;
            put_cell_size(data, list, 4 + 4 * segments.len());
            for (i, (segment, chunk)) in segments
                .iter()
                .zip(value.data.chunks(BIG_DATA_SEGMENT))
                .enumerate()
            {
                put_u32(data, list + 4 + 4 * i, *segment);
                let at = *segment as usize;
                put_cell_size(data, at, 4 + chunk.len());
                data[at + 4..at + 4 + chunk.len()].copy_from_slice(chunk);
            }
        }
    }
}

/// Cells are 8-byte aligned.
fn cell_len(len: usize) -> usize {
    (len + 7) & !7
}

fn put_cell_size(data: &mut [u8], at: usize, len: usize) {
    let size = -(cell_len(len) as i32);
    data[at..at + 4].copy_from_slice(&size.to_le_bytes());
}

fn put_u16(data: &mut [u8], at: usize, v: u16) {
    data[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(data: &mut [u8], at: usize, v: u32) {
    data[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HiveHeader;

    #[test]
    fn test_built_hive_has_valid_header() {
        let mut b = HiveBuilder::new("NTUSER.DAT");
        let root = b.root();
        b.add_string(root, "Name", "value");
        let bytes = b.build();
        let header = HiveHeader::parse(&bytes).unwrap();
        assert_eq!(header.hive_name, "NTUSER.DAT");
        assert_eq!(header.root_cell_offset, FIRST_CELL);
        assert_eq!(bytes.len() as u64, HBASE_BLOCK_SIZE + header.hive_length as u64);
    }

    #[test]
    fn test_cells_are_aligned() {
        assert_eq!(cell_len(1), 8);
        assert_eq!(cell_len(8), 8);
        assert_eq!(cell_len(81), 88);
    }
}
