//! Open-file table. Descriptors are transient and never reach the disk.

use fs_api_types::fs::FsError;
use fs_api_types::{BLOCK_SIZE, MAX_OPEN_FILES};

/// A cursor into one directory slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub slot:   usize,
    pub offset: usize,
}

impl Descriptor {
    /// Index of the block holding the cursor, counted from the file's first block.
    pub fn block_index(&self) -> usize { self.offset / BLOCK_SIZE }

    /// Position of the cursor inside that block.
    pub fn block_offset(&self) -> usize { self.offset % BLOCK_SIZE }
}

pub struct OpenFileTable {
    fds: [Option<Descriptor>; MAX_OPEN_FILES],
}

impl OpenFileTable {
    pub const fn new() -> Self {
        Self { fds: [None; MAX_OPEN_FILES] }
    }

    /// Binds the lowest free descriptor to `slot` with the cursor at 0.
    pub fn open(&mut self, slot: usize) -> Result<usize, FsError> {
        let fd = self
            .fds
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::TooManyOpen)?;
        self.fds[fd] = Some(Descriptor { slot, offset: 0 });
        Ok(fd)
    }

    pub fn close(&mut self, fd: usize) -> Result<Descriptor, FsError> {
        self.fds
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(FsError::BadDescriptor)
    }

    pub fn get(&self, fd: usize) -> Result<&Descriptor, FsError> {
        self.fds.get(fd).and_then(Option::as_ref).ok_or(FsError::BadDescriptor)
    }

    pub fn get_mut(&mut self, fd: usize) -> Result<&mut Descriptor, FsError> {
        self.fds.get_mut(fd).and_then(Option::as_mut).ok_or(FsError::BadDescriptor)
    }

    /// Whether any descriptor refers to directory slot `slot`.
    pub fn is_open(&self, slot: usize) -> bool {
        self.descriptors().any(|d| d.slot == slot)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> + '_ {
        self.fds.iter().flatten()
    }

    pub fn open_count(&self) -> usize { self.descriptors().count() }
}

impl Default for OpenFileTable {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_descriptor_first() {
        let mut table = OpenFileTable::new();
        assert_eq!(table.open(3), Ok(0));
        assert_eq!(table.open(3), Ok(1));
        table.close(0).unwrap();
        assert_eq!(table.open(5), Ok(0));
        assert_eq!(table.get(0).unwrap().slot, 5);
    }

    #[test]
    fn table_fills_up() {
        let mut table = OpenFileTable::new();
        for i in 0..MAX_OPEN_FILES {
            assert_eq!(table.open(0), Ok(i));
        }
        assert_eq!(table.open(0), Err(FsError::TooManyOpen));
        assert_eq!(table.open_count(), MAX_OPEN_FILES);
    }

    #[test]
    fn bad_descriptors() {
        let mut table = OpenFileTable::new();
        assert_eq!(table.close(0), Err(FsError::BadDescriptor));
        assert_eq!(table.close(MAX_OPEN_FILES), Err(FsError::BadDescriptor));
        assert_eq!(table.get(usize::MAX), Err(FsError::BadDescriptor));
        let fd = table.open(1).unwrap();
        table.close(fd).unwrap();
        assert_eq!(table.close(fd), Err(FsError::BadDescriptor));
        assert!(table.get_mut(fd).is_err());
    }

    #[test]
    fn is_open_tracks_slots() {
        let mut table = OpenFileTable::new();
        let fd = table.open(7).unwrap();
        assert!(table.is_open(7));
        assert!(!table.is_open(6));
        table.close(fd).unwrap();
        assert!(!table.is_open(7));
    }

    #[test]
    fn cursor_position_in_blocks() {
        let d = Descriptor { slot: 0, offset: BLOCK_SIZE + 10 };
        assert_eq!(d.block_index(), 1);
        assert_eq!(d.block_offset(), 10);
        let d = Descriptor { slot: 0, offset: BLOCK_SIZE };
        assert_eq!((d.block_index(), d.block_offset()), (1, 0));
    }
}
