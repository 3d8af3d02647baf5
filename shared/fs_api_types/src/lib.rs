#![no_std]

#[cfg(test)]
extern crate std;

pub mod fs;

/// Bytes per block, on disk and in every device transfer.
pub const BLOCK_SIZE: usize = 4096;

/// Identifies an ECS150FS volume in the first eight bytes of block 0.
pub const SIGNATURE: [u8; 8] = *b"ECS150FS";

/// Number of slots in the root directory block.
pub const ROOT_ENTRIES: usize = 128;
/// Bytes reserved for a name in a directory entry, terminator included.
pub const FILENAME_LEN: usize = 16;
/// Longest name a file can carry.
pub const MAX_NAME_LEN: usize = FILENAME_LEN - 1;

/// Size of the open-file table.
pub const MAX_OPEN_FILES: usize = 32;

/// End-of-chain marker in the FAT, also stored as the first block of an empty file.
pub const FAT_EOC: u16 = 0xFFFF;
pub const FAT_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / 2;
