use core::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ROOT_ENTRIES;

/// Failure kinds reported by the file system.
///
/// Codes are stable so a result can travel across a message boundary as a
/// plain `u64`; `0` is reserved for success (see [`result_code`]).
#[repr(u64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum FsError {
    AlreadyMounted = 1,
    NotMounted     = 2,
    InvalidFormat  = 3,
    InvalidName    = 4,
    DirectoryFull  = 5,
    NotFound       = 6,
    AlreadyExists  = 7,
    TooManyOpen    = 8,
    BadDescriptor  = 9,
    OutOfRange     = 10,
    NoSpace        = 11,
    FileInUse      = 12,
    Io             = 13,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FsError::AlreadyMounted => "a volume is already mounted",
            FsError::NotMounted     => "no volume is mounted",
            FsError::InvalidFormat  => "not a valid ECS150FS volume",
            FsError::InvalidName    => "invalid file name",
            FsError::DirectoryFull  => "root directory is full",
            FsError::NotFound       => "no such file",
            FsError::AlreadyExists  => "file already exists",
            FsError::TooManyOpen    => "too many open files",
            FsError::BadDescriptor  => "bad file descriptor",
            FsError::OutOfRange     => "offset past end of file",
            FsError::NoSpace        => "no free data blocks",
            FsError::FileInUse      => "file is open",
            FsError::Io             => "block device error",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for FsError {}

/// Flattens a result into its wire code: `0` on success, the error code otherwise.
pub fn result_code<T>(result: &Result<T, FsError>) -> u64 {
    match result {
        Ok(_) => 0,
        Err(e) => (*e).into(),
    }
}

/// Decodes a wire code produced by [`result_code`].
///
/// Unknown codes map to `Io`, the same way an unrecognised status is treated
/// as a transport failure.
pub fn from_code(code: u64) -> Result<(), FsError> {
    match code {
        0 => Ok(()),
        c => Err(FsError::try_from(c).unwrap_or(FsError::Io)),
    }
}

/// Geometry and occupancy of a mounted volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VolumeInfo {
    pub total_blocks:     u16,
    pub fat_blocks:       u8,
    pub root_dir_block:   u16,
    pub data_start:       u16,
    pub data_blocks:      u16,
    pub free_data_blocks: u16,
    pub free_dir_entries: u16,
}

impl fmt::Display for VolumeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FS info:")?;
        writeln!(f, "total_blk_count={}", self.total_blocks)?;
        writeln!(f, "fat_blk_count={}", self.fat_blocks)?;
        writeln!(f, "rdir_blk={}", self.root_dir_block)?;
        writeln!(f, "data_blk={}", self.data_start)?;
        writeln!(f, "data_blk_count={}", self.data_blocks)?;
        writeln!(f, "fat_free_ratio={}/{}", self.free_data_blocks, self.data_blocks)?;
        writeln!(f, "rdir_free_ratio={}/{}", self.free_dir_entries, ROOT_ENTRIES)
    }
}
