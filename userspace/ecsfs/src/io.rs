//! Byte-granular reads and writes on top of whole-block device I/O.

use fs_api_types::BLOCK_SIZE;
use fs_api_types::fs::FsError;

use crate::block_dev::{Block, BlockDevice};
use crate::layout::blocks_for;
use crate::volume::Volume;

/// Byte range of one write, in file offsets.
#[derive(Clone, Copy)]
struct WriteSpan<'a> {
    data:     &'a [u8],
    offset:   usize,
    end:      usize,
    old_size: usize,
}

impl<D: BlockDevice> Volume<D> {
    /// Reads up to `buf.len()` bytes at the cursor and advances it.
    ///
    /// Returns 0 at or past the end of the file. Never reads past the
    /// recorded size, whatever the chain holds.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        let (desc, entry) = self.descriptor(fd)?;
        let size = entry.size as usize;
        let count = buf.len().min(size.saturating_sub(desc.offset));
        if count == 0 {
            return Ok(0);
        }

        let mut block = self.fat.nth(entry.first_block, desc.block_index());
        let mut in_block = desc.block_offset();
        let mut done = 0;
        let mut failure = None;
        let mut staging = [0u8; BLOCK_SIZE];

        while done < count {
            let Some(b) = block else {
                log::warn!("ecsfs: fd {fd}: chain ends before byte {}", desc.offset + done);
                break;
            };
            let n = (BLOCK_SIZE - in_block).min(count - done);
            let dst = &mut buf[done..done + n];
            let res = match <&mut Block>::try_from(&mut *dst) {
                Ok(whole) => self.read_data(b, whole),
                Err(_) => self.read_data(b, &mut staging).map(|()| {
                    dst.copy_from_slice(&staging[in_block..in_block + n]);
                }),
            };
            if let Err(e) = res {
                failure = Some(e);
                break;
            }
            done += n;
            in_block = 0;
            block = self.fat.next(b);
        }

        self.files.get_mut(fd)?.offset += done;
        match failure {
            Some(e) if done == 0 => Err(e),
            Some(e) => {
                log::warn!("ecsfs: fd {fd}: read stopped after {done} bytes: {e}");
                Ok(done)
            }
            None => Ok(done),
        }
    }

    /// Writes `data` at the cursor, growing the file as needed, and advances
    /// the cursor.
    ///
    /// When the volume runs out of blocks the bytes that did fit stay
    /// written and the short count is returned. Bytes between the old end of
    /// the file and the cursor read back as zeros.
    pub fn write(&mut self, fd: usize, data: &[u8]) -> Result<usize, FsError> {
        let (desc, entry) = self.descriptor(fd)?;
        if data.is_empty() {
            return Ok(0);
        }
        let old_size = entry.size as usize;
        let mut first = entry.first_block;

        // Sizes are 32-bit on disk.
        let room = (u32::MAX as usize).saturating_sub(desc.offset);
        let data = &data[..data.len().min(room)];
        if data.is_empty() {
            return Ok(0);
        }
        let span = WriteSpan { data, offset: desc.offset, end: desc.offset + data.len(), old_size };

        // Writing past the end starts at the old end so the gap gets zeroed.
        let start = old_size.min(span.offset) / BLOCK_SIZE;
        let mut prev = match start {
            0 => None,
            n => Some(self.fat.nth(first, n - 1).ok_or(FsError::InvalidFormat)?),
        };
        let mut cur = match prev {
            Some(p) => self.fat.next(p),
            None => first,
        };

        let mut committed = span.offset;
        let mut failure = None;
        let mut block_start = start * BLOCK_SIZE;

        while block_start < span.end {
            let (block, fresh) = match cur {
                Some(b) => (b, false),
                None => {
                    let allocated = match prev {
                        Some(tail) => self.fat.append(tail),
                        None => self.fat.allocate_block(),
                    };
                    match allocated {
                        Ok(b) => {
                            if first.is_none() {
                                first = Some(b);
                            }
                            (b, true)
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            };
            if let Err(e) = self.fill_block(block, block_start, fresh, &span) {
                failure = Some(e);
                break;
            }
            committed = committed.max(span.end.min(block_start + BLOCK_SIZE));
            prev = Some(block);
            cur = self.fat.next(block);
            block_start += BLOCK_SIZE;
        }

        let written = committed - span.offset;
        let new_size = if written > 0 { old_size.max(committed) } else { old_size };
        if failure.is_some() {
            // Drop blocks allocated for bytes that never made it.
            first = self.fat.truncate(first, blocks_for(new_size));
        }

        let entry = self.root.entry_mut(desc.slot).ok_or(FsError::BadDescriptor)?;
        entry.size = new_size as u32;
        entry.first_block = first;
        self.files.get_mut(fd)?.offset += written;
        self.sync()?;

        match failure {
            Some(FsError::NoSpace) => {
                log::warn!("ecsfs: fd {fd}: volume full, wrote {written} of {} bytes", data.len());
                Ok(written)
            }
            Some(e) if written == 0 => Err(e),
            Some(e) => {
                log::warn!("ecsfs: fd {fd}: write stopped after {written} bytes: {e}");
                Ok(written)
            }
            None => Ok(written),
        }
    }

    /// Brings one data block up to date for `span`.
    ///
    /// `block_start` is the file offset of the block's first byte. Partially
    /// covered blocks are read first so bytes outside the span survive.
    fn fill_block(
        &mut self,
        block: u16,
        block_start: usize,
        fresh: bool,
        span: &WriteSpan<'_>,
    ) -> Result<(), FsError> {
        let block_end = block_start + BLOCK_SIZE;
        let copy_from = span.offset.max(block_start);
        let copy_to = span.end.min(block_end);

        if copy_from == block_start && copy_to == block_end {
            let src = &span.data[copy_from - span.offset..copy_to - span.offset];
            if let Ok(whole) = <&Block>::try_from(src) {
                return self.write_data(block, whole);
            }
        }

        let mut buf = [0u8; BLOCK_SIZE];
        if !fresh {
            self.read_data(block, &mut buf)?;
        }
        let zero_from = span.old_size.max(block_start);
        let zero_to = span.offset.min(block_end);
        if zero_from < zero_to {
            buf[zero_from - block_start..zero_to - block_start].fill(0);
        }
        if copy_from < copy_to {
            buf[copy_from - block_start..copy_to - block_start]
                .copy_from_slice(&span.data[copy_from - span.offset..copy_to - span.offset]);
        }
        self.write_data(block, &buf)
    }
}
