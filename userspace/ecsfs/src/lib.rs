// No_std except under `cargo test`, which runs on the host.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod block_dev;
pub mod dir;
pub mod fat;
pub mod fd;
pub mod io;
pub mod layout;
pub mod server;
pub mod volume;

#[cfg(test)]
mod test_support;

pub use block_dev::{Block, BlockDevice, DeviceError};
pub use dir::{DirEntry, FileName};
pub use fs_api_types::fs::{FsError, VolumeInfo};
pub use server::FsServer;
pub use volume::Volume;
