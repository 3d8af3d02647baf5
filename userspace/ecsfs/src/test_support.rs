//! Host-side helpers shared by the unit tests.

use std::string::String;
use std::sync::Once;
use std::vec;
use std::vec::Vec;

use fs_api_types::BLOCK_SIZE;
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::block_dev::{Block, BlockDevice, DeviceError};
use crate::layout;

// ── Mock block device backed by Vec<Block> ────────────────────────────────────

pub struct MemDisk {
    name:    String,
    blocks:  Vec<Block>,
    open:    bool,
    pub writes: usize,
    /// Writes after this many succeed are rejected.
    pub write_budget: Option<usize>,
    /// Reads of this block index fail.
    pub bad_block: Option<usize>,
}

impl MemDisk {
    pub fn new(name: &str, blocks: usize) -> Self {
        init_logger();
        Self {
            name: name.into(),
            blocks: vec![[0u8; BLOCK_SIZE]; blocks],
            open: false,
            writes: 0,
            write_budget: None,
            bad_block: None,
        }
    }

    /// A freshly formatted disk of `blocks` blocks, closed.
    pub fn formatted(name: &str, blocks: usize) -> Self {
        let mut disk = Self::new(name, blocks);
        layout::format(&mut disk, name).expect("format failed");
        disk
    }

    pub fn is_open(&self) -> bool { self.open }

    pub fn raw(&self, index: usize) -> &Block { &self.blocks[index] }

    pub fn raw_mut(&mut self, index: usize) -> &mut Block { &mut self.blocks[index] }
}

impl BlockDevice for MemDisk {
    fn open(&mut self, name: &str) -> Result<(), DeviceError> {
        if name != self.name || self.open {
            return Err(DeviceError::Unavailable);
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) { self.open = false; }

    fn block_count(&self) -> usize {
        if self.open { self.blocks.len() } else { 0 }
    }

    fn read_block(&mut self, index: usize, buf: &mut Block) -> Result<(), DeviceError> {
        if !self.open { return Err(DeviceError::NotOpen); }
        if self.bad_block == Some(index) {
            return Err(DeviceError::Transfer);
        }
        let block = self.blocks.get(index).ok_or(DeviceError::OutOfBounds(index))?;
        buf.copy_from_slice(block);
        Ok(())
    }

    fn write_block(&mut self, index: usize, buf: &Block) -> Result<(), DeviceError> {
        if !self.open { return Err(DeviceError::NotOpen); }
        if self.write_budget.is_some_and(|budget| self.writes >= budget) {
            return Err(DeviceError::Transfer);
        }
        let block = self.blocks.get_mut(index).ok_or(DeviceError::OutOfBounds(index))?;
        block.copy_from_slice(buf);
        self.writes += 1;
        Ok(())
    }
}

// ── Logger ────────────────────────────────────────────────────────────────────

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "ERROR",
            Level::Warn  => "WARN ",
            Level::Info  => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        std::eprintln!("{tag} {}", record.args());
    }

    fn flush(&self) {}
}

pub fn init_logger() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Debug);
        }
    });
}

// ── Data helpers ──────────────────────────────────────────────────────────────

/// Deterministic, non-repeating-per-block test payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len as u32).map(|i| (i ^ (i >> 8) ^ 0x5A) as u8).collect()
}
