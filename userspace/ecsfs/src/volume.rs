//! A mounted volume: superblock, FAT, root directory and open-file table.
//!
//! The volume owns its block device from [`Volume::mount`] until
//! [`Volume::unmount`] hands it back, so holding a `Volume` is the proof that
//! a disk is mounted. Every operation that changes the directory or the FAT
//! writes the changed blocks back before returning.

use alloc::vec;

use fs_api_types::fs::{FsError, VolumeInfo};
use fs_api_types::BLOCK_SIZE;

use crate::block_dev::{Block, BlockDevice};
use crate::dir::{DirEntry, Directory};
use crate::fat::{Fat, FatEntry};
use crate::fd::{Descriptor, OpenFileTable};
use crate::layout::{SUPERBLOCK_INDEX, Superblock, blocks_for};

pub struct Volume<D: BlockDevice> {
    pub(crate) device: D,
    pub(crate) sb:     Superblock,
    pub(crate) fat:    Fat,
    pub(crate) root:   Directory,
    pub(crate) files:  OpenFileTable,
}

impl<D: BlockDevice> Volume<D> {
    /// Opens the disk `name` and loads its metadata.
    ///
    /// On any failure the disk is closed again and nothing stays mounted.
    pub fn mount(mut device: D, name: &str) -> Result<Self, FsError> {
        if let Err(e) = device.open(name) {
            log::warn!("ecsfs: cannot open {name}: {e}");
            return Err(FsError::Io);
        }
        match Self::load(&mut device) {
            Ok((sb, fat, root)) => {
                log::info!(
                    "ecsfs: mounted {name}: {} blocks, {} FAT, {} data, {} free",
                    sb.num_blocks, sb.fat_blocks, sb.data_blocks, fat.free_count()
                );
                Ok(Self { device, sb, fat, root, files: OpenFileTable::new() })
            }
            Err(e) => {
                device.close();
                log::warn!("ecsfs: mount of {name} failed: {e}");
                Err(e)
            }
        }
    }

    fn load(device: &mut D) -> Result<(Superblock, Fat, Directory), FsError> {
        let mut block = [0u8; BLOCK_SIZE];
        device.read_block(SUPERBLOCK_INDEX, &mut block)?;
        let sb = Superblock::parse(&block);
        sb.validate(device.block_count())?;

        let fat = Fat::load(device, &sb)?;
        let root = Directory::load(device, &sb)?;
        check_chains(&fat, &root)?;
        Ok((sb, fat, root))
    }

    /// Writes the directory and the whole FAT back, closes the disk and
    /// returns it. Open descriptors are dropped.
    pub fn unmount(mut self) -> Result<D, FsError> {
        let flushed = self
            .root
            .store(&mut self.device, &self.sb, true)
            .and_then(|()| self.fat.store(&mut self.device, true));
        self.device.close();
        flushed?;
        if self.files.open_count() > 0 {
            log::debug!("ecsfs: unmount dropped {} open descriptors", self.files.open_count());
        }
        log::info!("ecsfs: unmounted");
        Ok(self.device)
    }

    /// Writes back whatever metadata changed since the last sync.
    pub(crate) fn sync(&mut self) -> Result<(), FsError> {
        self.root.store(&mut self.device, &self.sb, false)?;
        self.fat.store(&mut self.device, false)
    }

    pub fn info(&self) -> VolumeInfo {
        VolumeInfo {
            total_blocks:     self.sb.num_blocks,
            fat_blocks:       self.sb.fat_blocks,
            root_dir_block:   self.sb.root_index,
            data_start:       self.sb.data_start,
            data_blocks:      self.sb.data_blocks,
            free_data_blocks: self.fat.free_count() as u16,
            free_dir_entries: self.root.free_count() as u16,
        }
    }

    pub fn free_blocks(&self) -> usize { self.fat.free_count() }

    pub fn create(&mut self, name: &str) -> Result<(), FsError> {
        self.root.create(name)?;
        self.sync()?;
        log::debug!("ecsfs: created {name}");
        Ok(())
    }

    /// Removes `name` and returns its blocks to the free pool.
    ///
    /// Refused with `FileInUse` while any descriptor still refers to it.
    pub fn delete(&mut self, name: &str) -> Result<(), FsError> {
        let files = &self.files;
        let freed = self.root.delete(name, &mut self.fat, |slot| files.is_open(slot))?;
        self.sync()?;
        log::debug!("ecsfs: deleted {name}, {freed} blocks freed");
        Ok(())
    }

    pub fn list(&self) -> impl Iterator<Item = &DirEntry> + Clone + '_ {
        self.root.list()
    }

    pub fn open(&mut self, name: &str) -> Result<usize, FsError> {
        let (slot, _) = self.root.find(name).ok_or(FsError::NotFound)?;
        let fd = self.files.open(slot)?;
        log::debug!("ecsfs: open {name} -> fd {fd}");
        Ok(fd)
    }

    pub fn close(&mut self, fd: usize) -> Result<(), FsError> {
        self.files.close(fd)?;
        log::debug!("ecsfs: close fd {fd}");
        Ok(())
    }

    /// Current size in bytes of the file behind `fd`.
    pub fn stat(&self, fd: usize) -> Result<usize, FsError> {
        let (_, entry) = self.descriptor(fd)?;
        Ok(entry.size as usize)
    }

    /// Moves the cursor; anywhere from 0 to the end of the file is allowed.
    pub fn seek(&mut self, fd: usize, offset: usize) -> Result<(), FsError> {
        let size = self.stat(fd)?;
        if offset > size {
            return Err(FsError::OutOfRange);
        }
        self.files.get_mut(fd)?.offset = offset;
        Ok(())
    }

    /// Shrinks the file behind `fd` to `len` bytes, releasing blocks past it.
    ///
    /// Cursors are left alone; one past the new end is still a valid
    /// write position.
    pub fn truncate(&mut self, fd: usize, len: usize) -> Result<(), FsError> {
        let (desc, entry) = self.descriptor(fd)?;
        let (size, first) = (entry.size as usize, entry.first_block);
        if len > size {
            return Err(FsError::OutOfRange);
        }
        let first = self.fat.truncate(first, blocks_for(len));
        let entry = self.root.entry_mut(desc.slot).ok_or(FsError::BadDescriptor)?;
        entry.size = len as u32;
        entry.first_block = first;
        self.sync()
    }

    /// The descriptor `fd` and the directory entry it is bound to.
    pub(crate) fn descriptor(&self, fd: usize) -> Result<(Descriptor, &DirEntry), FsError> {
        let desc = *self.files.get(fd)?;
        let entry = self.root.entry(desc.slot).ok_or(FsError::BadDescriptor)?;
        Ok((desc, entry))
    }

    pub(crate) fn read_data(&mut self, block: u16, buf: &mut Block) -> Result<(), FsError> {
        Ok(self.device.read_block(self.sb.data_start() + block as usize, buf)?)
    }

    pub(crate) fn write_data(&mut self, block: u16, buf: &Block) -> Result<(), FsError> {
        Ok(self.device.write_block(self.sb.data_start() + block as usize, buf)?)
    }
}

/// Every file's chain must be exactly as long as its size needs, run through
/// allocated entries only and end in EOC, and no block may belong to two files.
fn check_chains(fat: &Fat, root: &Directory) -> Result<(), FsError> {
    let mut owned = vec![false; fat.len()];
    for entry in root.list() {
        let mut len = 0;
        let mut last = None;
        for block in fat.chain(entry.first_block) {
            if fat.entry(block) == FatEntry::Free {
                log::debug!("ecsfs: {}: block {block} is marked free", entry.name);
                return Err(FsError::InvalidFormat);
            }
            if core::mem::replace(&mut owned[block as usize], true) {
                log::debug!("ecsfs: {}: block {block} is shared", entry.name);
                return Err(FsError::InvalidFormat);
            }
            len += 1;
            last = Some(block);
        }
        if let Some(tail) = last {
            if fat.entry(tail) != FatEntry::EndOfChain {
                log::debug!("ecsfs: {}: chain does not end at block {tail}", entry.name);
                return Err(FsError::InvalidFormat);
            }
        }
        if len != blocks_for(entry.size as usize) {
            log::debug!("ecsfs: {}: {len} blocks for {} bytes", entry.name, entry.size);
            return Err(FsError::InvalidFormat);
        }
    }
    Ok(())
}
