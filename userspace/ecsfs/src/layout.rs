//! On-disk geometry: the superblock in block 0 and the formatter.
//!
//! ```text
//! block 0                      superblock
//! blocks 1 ..= fat_blocks      FAT, 16-bit little-endian entries
//! block  root_index            root directory, 128 x 32-byte entries
//! blocks data_start ..         file data
//! ```

use fs_api_types::fs::FsError;
use fs_api_types::{BLOCK_SIZE, FAT_ENTRIES_PER_BLOCK, SIGNATURE};

use crate::block_dev::{Block, BlockDevice};
use crate::dir::Directory;
use crate::fat::Fat;

pub const SUPERBLOCK_INDEX: usize = 0;
pub const FIRST_FAT_BLOCK: usize = 1;
/// Largest data region the 16-bit FAT can address on this format.
pub const MAX_DATA_BLOCKS: usize = 8192;

// Byte offsets inside block 0.
const OFF_SIGNATURE:   usize = 0;
const OFF_NUM_BLOCKS:  usize = 8;
const OFF_ROOT_INDEX:  usize = 10;
const OFF_DATA_START:  usize = 12;
const OFF_DATA_BLOCKS: usize = 14;
const OFF_FAT_BLOCKS:  usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Superblock {
    pub signature:   [u8; 8],
    pub num_blocks:  u16,
    pub root_index:  u16,
    pub data_start:  u16,
    pub data_blocks: u16,
    pub fat_blocks:  u8,
}

impl Superblock {
    /// Geometry for a fresh volume spanning `total_blocks` blocks.
    pub fn for_device(total_blocks: usize) -> Result<Self, FsError> {
        // Superblock, at least one FAT block, the directory, and two data
        // blocks since data block 0 is reserved.
        if total_blocks < 5 {
            return Err(FsError::InvalidFormat);
        }
        let mut fat_blocks = 1usize;
        let data_blocks = loop {
            let data = total_blocks - 2 - fat_blocks;
            if data.div_ceil(FAT_ENTRIES_PER_BLOCK) <= fat_blocks {
                break data;
            }
            fat_blocks += 1;
        };
        if data_blocks > MAX_DATA_BLOCKS {
            return Err(FsError::InvalidFormat);
        }
        let root_index = 1 + fat_blocks;
        Ok(Self {
            signature:   SIGNATURE,
            num_blocks:  total_blocks as u16,
            root_index:  root_index as u16,
            data_start:  (root_index + 1) as u16,
            data_blocks: data_blocks as u16,
            fat_blocks:  fat_blocks as u8,
        })
    }

    pub fn parse(block: &Block) -> Self {
        let u16_at = |off: usize| u16::from_le_bytes([block[off], block[off + 1]]);
        let mut signature = [0u8; 8];
        signature.copy_from_slice(&block[OFF_SIGNATURE..OFF_SIGNATURE + 8]);
        Self {
            signature,
            num_blocks:  u16_at(OFF_NUM_BLOCKS),
            root_index:  u16_at(OFF_ROOT_INDEX),
            data_start:  u16_at(OFF_DATA_START),
            data_blocks: u16_at(OFF_DATA_BLOCKS),
            fat_blocks:  block[OFF_FAT_BLOCKS],
        }
    }

    /// Serializes into a full block; the padding is zero.
    pub fn to_block(&self) -> Block {
        let mut block = [0u8; BLOCK_SIZE];
        block[OFF_SIGNATURE..OFF_SIGNATURE + 8].copy_from_slice(&self.signature);
        block[OFF_NUM_BLOCKS..OFF_NUM_BLOCKS + 2].copy_from_slice(&self.num_blocks.to_le_bytes());
        block[OFF_ROOT_INDEX..OFF_ROOT_INDEX + 2].copy_from_slice(&self.root_index.to_le_bytes());
        block[OFF_DATA_START..OFF_DATA_START + 2].copy_from_slice(&self.data_start.to_le_bytes());
        block[OFF_DATA_BLOCKS..OFF_DATA_BLOCKS + 2].copy_from_slice(&self.data_blocks.to_le_bytes());
        block[OFF_FAT_BLOCKS] = self.fat_blocks;
        block
    }

    /// Checks the superblock against itself and against the device it came from.
    pub fn validate(&self, device_blocks: usize) -> Result<(), FsError> {
        let fat_blocks = self.fat_blocks as usize;
        let checks = [
            (self.signature == SIGNATURE, "bad signature"),
            (self.num_blocks as usize == device_blocks, "block count mismatch"),
            (fat_blocks >= 1, "no FAT blocks"),
            (self.root_index as usize == FIRST_FAT_BLOCK + fat_blocks, "root index mismatch"),
            (self.root_index.checked_add(1) == Some(self.data_start), "data start mismatch"),
            (self.data_blocks as usize <= fat_blocks * FAT_ENTRIES_PER_BLOCK, "FAT too small"),
            (self.data_blocks as usize <= MAX_DATA_BLOCKS, "data region too large"),
            (
                self.data_start as usize + self.data_blocks as usize <= device_blocks,
                "data region past end of disk",
            ),
        ];
        for (ok, what) in checks {
            if !ok {
                log::debug!("ecsfs: superblock rejected: {what}");
                return Err(FsError::InvalidFormat);
            }
        }
        Ok(())
    }

    pub fn root_index(&self) -> usize { self.root_index as usize }
    pub fn data_start(&self) -> usize { self.data_start as usize }
    pub fn data_blocks(&self) -> usize { self.data_blocks as usize }
    pub fn fat_blocks(&self) -> usize { self.fat_blocks as usize }
}

/// Blocks needed to hold `bytes` bytes.
pub fn blocks_for(bytes: usize) -> usize {
    bytes.div_ceil(BLOCK_SIZE)
}

/// Writes an empty volume onto the disk called `name`.
///
/// The geometry is derived from the disk's block count. FAT entry 0 is set to
/// EOC so data block 0 is never handed out.
pub fn format<D: BlockDevice>(device: &mut D, name: &str) -> Result<Superblock, FsError> {
    device.open(name)?;
    let result = write_empty_volume(device);
    device.close();
    let sb = result?;
    log::info!(
        "ecsfs: formatted {name}: {} blocks, {} FAT, {} data",
        sb.num_blocks, sb.fat_blocks, sb.data_blocks
    );
    Ok(sb)
}

fn write_empty_volume<D: BlockDevice>(device: &mut D) -> Result<Superblock, FsError> {
    let sb = Superblock::for_device(device.block_count())?;
    device.write_block(SUPERBLOCK_INDEX, &sb.to_block())?;

    Fat::new(sb.data_blocks(), sb.fat_blocks()).store(device, true)?;
    Directory::new().store(device, &sb, true)?;
    Ok(sb)
}
