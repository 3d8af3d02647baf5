//! File Allocation Table.
//!
//! One 16-bit entry per data block: `0` is free, `0xFFFF` ends a chain, any
//! other value is the index of the next data block. Entry 0 is reserved and
//! always holds EOC, so `0` never has to mean "next is block 0".
//!
//! The whole table lives in memory while mounted. Mutations mark the owning
//! FAT block dirty and [`Fat::store`] writes back only those blocks.

use alloc::vec;
use alloc::vec::Vec;

use fs_api_types::fs::FsError;
use fs_api_types::{BLOCK_SIZE, FAT_ENTRIES_PER_BLOCK, FAT_EOC};

use crate::block_dev::BlockDevice;
use crate::layout::{FIRST_FAT_BLOCK, Superblock};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FatEntry {
    Free,
    Next(u16),
    EndOfChain,
}

impl FatEntry {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => FatEntry::Free,
            FAT_EOC => FatEntry::EndOfChain,
            next => FatEntry::Next(next),
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            FatEntry::Free => 0,
            FatEntry::Next(next) => next,
            FatEntry::EndOfChain => FAT_EOC,
        }
    }
}

pub struct Fat {
    entries: Vec<FatEntry>,
    dirty:   Vec<bool>,
}

impl Fat {
    /// Empty table for `data_blocks` blocks spread over `fat_blocks` FAT
    /// blocks, with the reserved head in place. Every block starts dirty.
    pub fn new(data_blocks: usize, fat_blocks: usize) -> Self {
        let mut entries = vec![FatEntry::Free; data_blocks];
        if let Some(head) = entries.first_mut() {
            *head = FatEntry::EndOfChain;
        }
        let fat_blocks = fat_blocks.max(data_blocks.div_ceil(FAT_ENTRIES_PER_BLOCK));
        Self { entries, dirty: vec![true; fat_blocks] }
    }

    pub fn load<D: BlockDevice>(device: &mut D, sb: &Superblock) -> Result<Self, FsError> {
        let data_blocks = sb.data_blocks();
        let mut entries = Vec::with_capacity(data_blocks);
        let mut block = [0u8; BLOCK_SIZE];

        'blocks: for b in 0..sb.fat_blocks() {
            device.read_block(FIRST_FAT_BLOCK + b, &mut block)?;
            for raw in block.chunks_exact(2) {
                if entries.len() == data_blocks {
                    break 'blocks;
                }
                let entry = FatEntry::from_raw(u16::from_le_bytes([raw[0], raw[1]]));
                if let FatEntry::Next(next) = entry {
                    if next as usize >= data_blocks {
                        log::debug!("ecsfs: FAT entry {} points past the data region", entries.len());
                        return Err(FsError::InvalidFormat);
                    }
                }
                entries.push(entry);
            }
        }

        let mut fat = Self { entries, dirty: vec![false; sb.fat_blocks()] };
        if fat.entries.first() == Some(&FatEntry::Free) {
            log::debug!("ecsfs: reserving FAT entry 0");
            fat.set(0, FatEntry::EndOfChain);
        }
        Ok(fat)
    }

    /// Writes back dirty FAT blocks, or every block when `all` is set.
    pub fn store<D: BlockDevice>(&mut self, device: &mut D, all: bool) -> Result<(), FsError> {
        for b in 0..self.dirty.len() {
            if !all && !self.dirty[b] {
                continue;
            }
            let mut block = [0u8; BLOCK_SIZE];
            let start = (b * FAT_ENTRIES_PER_BLOCK).min(self.entries.len());
            let end = ((b + 1) * FAT_ENTRIES_PER_BLOCK).min(self.entries.len());
            for (raw, entry) in block.chunks_exact_mut(2).zip(&self.entries[start..end]) {
                raw.copy_from_slice(&entry.to_raw().to_le_bytes());
            }
            device.write_block(FIRST_FAT_BLOCK + b, &block)?;
            self.dirty[b] = false;
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool { self.dirty.iter().any(|&d| d) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn entry(&self, block: u16) -> FatEntry { self.entries[block as usize] }

    fn set(&mut self, block: u16, entry: FatEntry) {
        self.entries[block as usize] = entry;
        self.dirty[block as usize / FAT_ENTRIES_PER_BLOCK] = true;
    }

    /// The block after `block` in its chain.
    pub fn next(&self, block: u16) -> Option<u16> {
        match self.entries.get(block as usize)? {
            FatEntry::Next(next) => Some(*next),
            FatEntry::Free | FatEntry::EndOfChain => None,
        }
    }

    /// Blocks of the chain starting at `first`, in order.
    pub fn chain(&self, first: Option<u16>) -> Chain<'_> {
        Chain { fat: self, cur: first, budget: self.entries.len() }
    }

    /// The `n`th block (0-based) of the chain starting at `first`.
    pub fn nth(&self, first: Option<u16>, n: usize) -> Option<u16> {
        self.chain(first).nth(n)
    }

    pub fn free_count(&self) -> usize {
        self.entries.iter().filter(|e| **e == FatEntry::Free).count()
    }

    /// First free block by ascending index, marked as a one-block chain.
    pub fn allocate_block(&mut self) -> Result<u16, FsError> {
        let index = self
            .entries
            .iter()
            .position(|e| *e == FatEntry::Free)
            .ok_or(FsError::NoSpace)?;
        let block = index as u16;
        self.set(block, FatEntry::EndOfChain);
        Ok(block)
    }

    /// Allocates a block and links it after `tail`, which must end its chain.
    pub fn append(&mut self, tail: u16) -> Result<u16, FsError> {
        debug_assert_eq!(self.entry(tail), FatEntry::EndOfChain);
        let block = self.allocate_block()?;
        self.set(tail, FatEntry::Next(block));
        Ok(block)
    }

    /// Frees every block of the chain at `first`; returns how many were freed.
    pub fn free_chain(&mut self, first: Option<u16>) -> usize {
        let mut freed = 0;
        let mut cur = first;
        while let Some(block) = cur {
            if freed == self.entries.len() || self.entry(block) == FatEntry::Free {
                break;
            }
            cur = self.next(block);
            self.set(block, FatEntry::Free);
            freed += 1;
        }
        freed
    }

    /// Keeps the first `keep` blocks of the chain at `first` and frees the rest.
    ///
    /// Returns the new head, `None` once nothing is kept.
    pub fn truncate(&mut self, first: Option<u16>, keep: usize) -> Option<u16> {
        if keep == 0 {
            self.free_chain(first);
            return None;
        }
        let Some(tail) = self.nth(first, keep - 1) else {
            return first;
        };
        let rest = self.next(tail);
        self.set(tail, FatEntry::EndOfChain);
        self.free_chain(rest);
        first
    }
}

/// Iterator over a chain. Stops after as many steps as there are blocks, so
/// a corrupt cyclic chain still terminates.
pub struct Chain<'a> {
    fat:    &'a Fat,
    cur:    Option<u16>,
    budget: usize,
}

impl Iterator for Chain<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        let block = self.cur?;
        if self.budget == 0 || block as usize >= self.fat.entries.len() {
            self.cur = None;
            return None;
        }
        self.budget -= 1;
        self.cur = self.fat.next(block);
        Some(block)
    }
}
