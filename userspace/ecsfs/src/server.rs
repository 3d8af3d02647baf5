//! Mount service: the single owner of the mounted volume.
//!
//! Callers go through [`FsServer`] when they want the classic
//! mount-then-operate contract with `AlreadyMounted` / `NotMounted` checks
//! instead of holding a [`Volume`] themselves.

use fs_api_types::fs::{FsError, VolumeInfo};

use crate::block_dev::BlockDevice;
use crate::dir::DirEntry;
use crate::volume::Volume;

pub struct FsServer<D: BlockDevice> {
    volume: Option<Volume<D>>,
}

impl<D: BlockDevice> FsServer<D> {
    pub const fn new() -> Self {
        Self { volume: None }
    }

    pub fn is_mounted(&self) -> bool { self.volume.is_some() }

    pub fn mount(&mut self, device: D, name: &str) -> Result<(), FsError> {
        if self.volume.is_some() {
            return Err(FsError::AlreadyMounted);
        }
        self.volume = Some(Volume::mount(device, name)?);
        Ok(())
    }

    /// Flushes and closes the mounted disk, handing the device back.
    pub fn unmount(&mut self) -> Result<D, FsError> {
        self.volume.take().ok_or(FsError::NotMounted)?.unmount()
    }

    fn volume(&self) -> Result<&Volume<D>, FsError> {
        self.volume.as_ref().ok_or(FsError::NotMounted)
    }

    fn volume_mut(&mut self) -> Result<&mut Volume<D>, FsError> {
        self.volume.as_mut().ok_or(FsError::NotMounted)
    }

    // ─── Forwarded operations ──────────────────────────────────────────────────

    pub fn info(&self) -> Result<VolumeInfo, FsError> {
        Ok(self.volume()?.info())
    }

    pub fn create(&mut self, name: &str) -> Result<(), FsError> {
        self.volume_mut()?.create(name)
    }

    pub fn delete(&mut self, name: &str) -> Result<(), FsError> {
        self.volume_mut()?.delete(name)
    }

    pub fn list(&self) -> Result<impl Iterator<Item = &DirEntry> + Clone + '_, FsError> {
        Ok(self.volume()?.list())
    }

    pub fn open(&mut self, name: &str) -> Result<usize, FsError> {
        self.volume_mut()?.open(name)
    }

    pub fn close(&mut self, fd: usize) -> Result<(), FsError> {
        self.volume_mut()?.close(fd)
    }

    pub fn stat(&self, fd: usize) -> Result<usize, FsError> {
        self.volume()?.stat(fd)
    }

    pub fn seek(&mut self, fd: usize, offset: usize) -> Result<(), FsError> {
        self.volume_mut()?.seek(fd, offset)
    }

    pub fn truncate(&mut self, fd: usize, len: usize) -> Result<(), FsError> {
        self.volume_mut()?.truncate(fd, len)
    }

    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        self.volume_mut()?.read(fd, buf)
    }

    pub fn write(&mut self, fd: usize, data: &[u8]) -> Result<usize, FsError> {
        self.volume_mut()?.write(fd, data)
    }
}

impl<D: BlockDevice> Default for FsServer<D> {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemDisk, pattern};
    use fs_api_types::{BLOCK_SIZE, ROOT_ENTRIES};
    use std::format;
    use std::string::ToString;
    use std::vec;

    const NAME: &str = "disk.fs";

    /// Superblock, one FAT block, the directory and 14 data blocks.
    fn mounted() -> FsServer<MemDisk> {
        let mut server = FsServer::new();
        server.mount(MemDisk::formatted(NAME, 17), NAME).unwrap();
        server
    }

    #[test]
    fn operations_need_a_mount() {
        let mut server: FsServer<MemDisk> = FsServer::new();
        assert!(!server.is_mounted());
        assert_eq!(server.info(), Err(FsError::NotMounted));
        assert_eq!(server.create("a"), Err(FsError::NotMounted));
        assert_eq!(server.delete("a"), Err(FsError::NotMounted));
        assert!(matches!(server.list(), Err(FsError::NotMounted)));
        assert_eq!(server.open("a"), Err(FsError::NotMounted));
        assert_eq!(server.close(0), Err(FsError::NotMounted));
        assert_eq!(server.stat(0), Err(FsError::NotMounted));
        assert_eq!(server.seek(0, 0), Err(FsError::NotMounted));
        assert_eq!(server.read(0, &mut [0u8; 1]), Err(FsError::NotMounted));
        assert_eq!(server.write(0, b"x"), Err(FsError::NotMounted));
        assert!(matches!(server.unmount(), Err(FsError::NotMounted)));
    }

    #[test]
    fn second_mount_refused() {
        let mut server = mounted();
        assert_eq!(
            server.mount(MemDisk::formatted(NAME, 17), NAME),
            Err(FsError::AlreadyMounted)
        );
        assert!(server.is_mounted());
    }

    #[test]
    fn failed_mount_leaves_nothing_mounted() {
        let mut server = FsServer::new();
        let mut disk = MemDisk::formatted(NAME, 17);
        disk.raw_mut(0)[0] = b'X';
        assert_eq!(server.mount(disk, NAME), Err(FsError::InvalidFormat));
        assert!(!server.is_mounted());
        server.mount(MemDisk::formatted(NAME, 17), NAME).unwrap();
    }

    #[test]
    fn unmount_then_mount_again() {
        let mut server = mounted();
        server.create("kept").unwrap();
        let disk = server.unmount().unwrap();
        assert!(!server.is_mounted());
        assert!(!disk.is_open());
        server.mount(disk, NAME).unwrap();
        assert_eq!(server.list().unwrap().count(), 1);
    }

    #[test]
    fn five_thousand_byte_file_lifecycle() {
        let mut server = mounted();
        let free_before = server.info().unwrap().free_data_blocks;

        server.create("a.txt").unwrap();
        let fd = server.open("a.txt").unwrap();
        assert_eq!(fd, 0);
        assert_eq!(server.write(fd, &pattern(5000)), Ok(5000));
        assert_eq!(server.stat(fd), Ok(5000));
        assert_eq!(server.info().unwrap().free_data_blocks, free_before - 2);
        let listing: std::vec::Vec<_> = server.list().unwrap().map(|e| e.to_string()).collect();
        assert_eq!(listing, ["file: a.txt, size: 5000, data_blk: 1"]);

        server.close(fd).unwrap();
        server.delete("a.txt").unwrap();
        assert_eq!(server.info().unwrap().free_data_blocks, free_before);
        assert_eq!(server.list().unwrap().count(), 0);
    }

    #[test]
    fn directory_holds_128_files() {
        let mut server = mounted();
        for i in 0..ROOT_ENTRIES {
            server.create(&format!("file{i}")).unwrap();
        }
        assert_eq!(server.create("one_more"), Err(FsError::DirectoryFull));
        assert_eq!(server.info().unwrap().free_dir_entries, 0);
    }

    #[test]
    fn oversized_write_is_partial() {
        let mut server = mounted();
        server.create("big").unwrap();
        let fd = server.open("big").unwrap();
        let want = 20 * BLOCK_SIZE;
        let got = server.write(fd, &vec![1u8; want]).unwrap();
        assert!(got < want);
        assert_eq!(got, 13 * BLOCK_SIZE);
        assert_eq!(server.stat(fd), Ok(got));
    }

    #[test]
    fn seek_to_end_and_past() {
        let mut server = mounted();
        server.create("s").unwrap();
        let fd = server.open("s").unwrap();
        server.write(fd, b"12345").unwrap();
        assert_eq!(server.seek(fd, 5), Ok(()));
        assert_eq!(server.seek(fd, 6), Err(FsError::OutOfRange));
    }

    #[test]
    fn info_text() {
        let server = mounted();
        let text = server.info().unwrap().to_string();
        assert_eq!(
            text,
            "FS info:\ntotal_blk_count=17\nfat_blk_count=1\nrdir_blk=2\ndata_blk=3\n\
             data_blk_count=14\nfat_free_ratio=13/14\nrdir_free_ratio=128/128\n"
        );
    }
}
