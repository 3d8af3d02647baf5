//! Flat root directory: 128 fixed 32-byte slots in a single block.
//!
//! ```text
//! 0..16   name, NUL-terminated (first byte NUL = free slot)
//! 16..20  size in bytes, u32 LE
//! 20..22  first data block, u16 LE (0xFFFF when the file has no data)
//! 22..32  padding
//! ```

use core::fmt;

use fs_api_types::fs::FsError;
use fs_api_types::{BLOCK_SIZE, FAT_EOC, FILENAME_LEN, MAX_NAME_LEN, ROOT_ENTRIES};

use crate::block_dev::{Block, BlockDevice};
use crate::fat::Fat;
use crate::layout::Superblock;

const ENTRY_SIZE: usize = BLOCK_SIZE / ROOT_ENTRIES;
const OFF_SIZE:  usize = FILENAME_LEN;
const OFF_FIRST: usize = FILENAME_LEN + 4;

/// A name that fits a directory slot: non-empty, at most 15 bytes, no NUL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileName(heapless::String<MAX_NAME_LEN>);

impl FileName {
    pub fn new(name: &str) -> Result<Self, FsError> {
        if name.is_empty() || name.contains('\0') {
            return Err(FsError::InvalidName);
        }
        let mut s = heapless::String::<MAX_NAME_LEN>::new();
        s.push_str(name).map_err(|_| FsError::InvalidName)?;
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str { self.0.as_str() }

    fn to_raw(&self) -> [u8; FILENAME_LEN] {
        let mut raw = [0u8; FILENAME_LEN];
        raw[..self.0.len()].copy_from_slice(self.0.as_bytes());
        raw
    }

    fn from_raw(raw: &[u8]) -> Result<Self, FsError> {
        let len = raw.iter().position(|&b| b == 0).ok_or(FsError::InvalidFormat)?;
        let name = core::str::from_utf8(&raw[..len]).map_err(|_| FsError::InvalidFormat)?;
        Self::new(name).map_err(|_| FsError::InvalidFormat)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name:        FileName,
    pub size:        u32,
    /// `None` while the file owns no data block.
    pub first_block: Option<u16>,
}

impl DirEntry {
    fn empty(name: FileName) -> Self {
        Self { name, size: 0, first_block: None }
    }
}

/// One line of a directory listing, e.g. `file: a.txt, size: 5000, data_blk: 1`.
impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file: {}, size: {}, data_blk: {}",
            self.name,
            self.size,
            self.first_block.unwrap_or(FAT_EOC)
        )
    }
}

pub struct Directory {
    slots: [Option<DirEntry>; ROOT_ENTRIES],
    dirty: bool,
}

impl Directory {
    pub fn new() -> Self {
        Self { slots: core::array::from_fn(|_| None), dirty: true }
    }

    pub fn load<D: BlockDevice>(device: &mut D, sb: &Superblock) -> Result<Self, FsError> {
        let mut block = [0u8; BLOCK_SIZE];
        device.read_block(sb.root_index(), &mut block)?;

        let mut dir = Self { slots: core::array::from_fn(|_| None), dirty: false };
        for (slot, raw) in dir.slots.iter_mut().zip(block.chunks_exact(ENTRY_SIZE)) {
            if raw[0] == 0 {
                continue;
            }
            let name = FileName::from_raw(&raw[..FILENAME_LEN])?;
            let size = u32::from_le_bytes([
                raw[OFF_SIZE], raw[OFF_SIZE + 1], raw[OFF_SIZE + 2], raw[OFF_SIZE + 3],
            ]);
            let first_block = match u16::from_le_bytes([raw[OFF_FIRST], raw[OFF_FIRST + 1]]) {
                FAT_EOC => None,
                // Data block 0 is reserved and never starts a chain.
                b if b != 0 && (b as usize) < sb.data_blocks() => Some(b),
                b => {
                    log::debug!("ecsfs: {name}: first block {b} out of range");
                    return Err(FsError::InvalidFormat);
                }
            };
            *slot = Some(DirEntry { name, size, first_block });
        }
        Ok(dir)
    }

    /// Writes the directory block if it changed, or unconditionally when `all` is set.
    pub fn store<D: BlockDevice>(
        &mut self,
        device: &mut D,
        sb: &Superblock,
        all: bool,
    ) -> Result<(), FsError> {
        if !all && !self.dirty {
            return Ok(());
        }
        device.write_block(sb.root_index(), &self.to_block())?;
        self.dirty = false;
        Ok(())
    }

    fn to_block(&self) -> Block {
        let mut block = [0u8; BLOCK_SIZE];
        for (slot, raw) in self.slots.iter().zip(block.chunks_exact_mut(ENTRY_SIZE)) {
            let Some(entry) = slot else { continue };
            raw[..FILENAME_LEN].copy_from_slice(&entry.name.to_raw());
            raw[OFF_SIZE..OFF_SIZE + 4].copy_from_slice(&entry.size.to_le_bytes());
            raw[OFF_FIRST..OFF_FIRST + 2]
                .copy_from_slice(&entry.first_block.unwrap_or(FAT_EOC).to_le_bytes());
        }
        block
    }

    pub fn is_dirty(&self) -> bool { self.dirty }

    pub fn find(&self, name: &str) -> Option<(usize, &DirEntry)> {
        self.list_slots().find(|(_, e)| e.name.as_str() == name)
    }

    pub fn find_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn entry(&self, slot: usize) -> Option<&DirEntry> {
        self.slots.get(slot)?.as_ref()
    }

    /// Mutable access to a used slot; marks the directory dirty.
    pub fn entry_mut(&mut self, slot: usize) -> Option<&mut DirEntry> {
        let entry = self.slots.get_mut(slot)?.as_mut()?;
        self.dirty = true;
        Some(entry)
    }

    /// Adds an empty file and returns its slot.
    pub fn create(&mut self, name: &str) -> Result<usize, FsError> {
        let name = FileName::new(name)?;
        if self.find(name.as_str()).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let slot = self.find_free_slot().ok_or(FsError::DirectoryFull)?;
        self.slots[slot] = Some(DirEntry::empty(name));
        self.dirty = true;
        Ok(slot)
    }

    /// Removes `name` and releases its blocks; returns how many were freed.
    ///
    /// `in_use` is asked about the file's slot first; a `true` answer leaves
    /// the entry alone and fails with `FileInUse`.
    pub fn delete(
        &mut self,
        name: &str,
        fat: &mut Fat,
        in_use: impl FnOnce(usize) -> bool,
    ) -> Result<usize, FsError> {
        let (slot, _) = self.find(name).ok_or(FsError::NotFound)?;
        if in_use(slot) {
            return Err(FsError::FileInUse);
        }
        let Some(entry) = self.slots[slot].take() else { return Ok(0) };
        self.dirty = true;
        Ok(fat.free_chain(entry.first_block))
    }

    /// Used entries in slot order. Each call starts a fresh pass.
    pub fn list(&self) -> impl Iterator<Item = &DirEntry> + Clone + '_ {
        self.slots.iter().flatten()
    }

    fn list_slots(&self) -> impl Iterator<Item = (usize, &DirEntry)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (i, e)))
    }

    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }
}

impl Default for Directory {
    fn default() -> Self { Self::new() }
}
