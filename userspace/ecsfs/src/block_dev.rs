//! Boundary to the virtual disk.
//!
//! The file system never touches storage directly: every transfer is one
//! whole block through [`BlockDevice`], which keeps the rest of the crate
//! testable against an in-memory disk.

use core::fmt;

use fs_api_types::BLOCK_SIZE;
use fs_api_types::fs::FsError;

pub type Block = [u8; BLOCK_SIZE];

/// Failure reported by a block device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceError {
    /// The named disk could not be opened.
    Unavailable,
    /// An operation was issued while no disk is open.
    NotOpen,
    /// Block index outside `0..block_count()`.
    OutOfBounds(usize),
    /// The underlying transfer failed.
    Transfer,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Unavailable    => f.write_str("disk unavailable"),
            DeviceError::NotOpen        => f.write_str("no disk open"),
            DeviceError::OutOfBounds(i) => write!(f, "block {i} out of bounds"),
            DeviceError::Transfer       => f.write_str("block transfer failed"),
        }
    }
}

impl From<DeviceError> for FsError {
    fn from(e: DeviceError) -> Self {
        log::warn!("ecsfs: device error: {e}");
        FsError::Io
    }
}

/// Fixed-size block storage addressed by index `0..block_count()`.
pub trait BlockDevice {
    fn open(&mut self, name: &str) -> Result<(), DeviceError>;
    fn close(&mut self);
    /// Total blocks on the open disk, `0` when none is open.
    fn block_count(&self) -> usize;
    fn read_block(&mut self, index: usize, buf: &mut Block) -> Result<(), DeviceError>;
    fn write_block(&mut self, index: usize, buf: &Block) -> Result<(), DeviceError>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn open(&mut self, name: &str) -> Result<(), DeviceError> { (**self).open(name) }
    fn close(&mut self) { (**self).close() }
    fn block_count(&self) -> usize { (**self).block_count() }
    fn read_block(&mut self, index: usize, buf: &mut Block) -> Result<(), DeviceError> {
        (**self).read_block(index, buf)
    }
    fn write_block(&mut self, index: usize, buf: &Block) -> Result<(), DeviceError> {
        (**self).write_block(index, buf)
    }
}
