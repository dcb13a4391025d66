#[cfg(test)]
mod disk_tests;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::Context;
use memmap2::{MmapMut, MmapOptions};
use tracing::{info, warn};

use crate::error::{FsError, FsResult};
use crate::layout::BLOCK_SIZE;

/// Fixed-geometry block device backed by a single image file.
///
/// All I/O moves exactly one `BLOCK_SIZE` block. The handle keeps
/// cumulative read/write counters for its lifetime; `close` reports them.
#[derive(Debug)]
pub struct Disk {
    path: PathBuf,
    map: MmapMut,
    blocks: usize,
    reads: u64,
    writes: u64,
}

impl Disk {
    /// Opens the image at `path`, creating it if missing, and sizes it to
    /// `blocks * BLOCK_SIZE` bytes.
    ///
    /// # Errors
    /// Returns an error if `blocks` is zero or the image cannot be
    /// created, sized, or mapped.
    pub fn open(path: &Path, blocks: usize) -> anyhow::Result<Self> {
        if blocks == 0 {
            anyhow::bail!("disk must have at least one block");
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open disk image {}", path.display()))?;

        let len = (blocks as u64) * (BLOCK_SIZE as u64);
        file.set_len(len)
            .with_context(|| format!("failed to size disk image to {len} bytes"))?;

        let map_len = usize::try_from(len)
            .map_err(|_| anyhow::anyhow!("disk length {len} exceeds addressable size"))?;
        let map = unsafe { MmapOptions::new().len(map_len).map_mut(&file)? };

        Ok(Self {
            path: path.to_path_buf(),
            map,
            blocks,
            reads: 0,
            writes: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn blocks(&self) -> usize {
        self.blocks
    }

    /// Successful reads since open.
    #[must_use]
    pub const fn reads(&self) -> u64 {
        self.reads
    }

    /// Successful writes since open.
    #[must_use]
    pub const fn writes(&self) -> u64 {
        self.writes
    }

    /// Copies block `block` into `buf`. Returns the block size.
    ///
    /// # Errors
    /// `OutOfBounds` when `block` is past the device end, `InvalidInput`
    /// when `buf` is not exactly one block.
    pub fn read(&mut self, block: usize, buf: &mut [u8]) -> FsResult<usize> {
        self.sanity_check(block, buf.len())?;
        let off = block * BLOCK_SIZE;
        buf.copy_from_slice(&self.map[off..off + BLOCK_SIZE]);
        self.reads += 1;
        Ok(BLOCK_SIZE)
    }

    /// Copies `buf` over block `block`. Returns the block size.
    ///
    /// # Errors
    /// `OutOfBounds` when `block` is past the device end, `InvalidInput`
    /// when `buf` is not exactly one block.
    pub fn write(&mut self, block: usize, buf: &[u8]) -> FsResult<usize> {
        self.sanity_check(block, buf.len())?;
        let off = block * BLOCK_SIZE;
        self.map[off..off + BLOCK_SIZE].copy_from_slice(buf);
        self.writes += 1;
        Ok(BLOCK_SIZE)
    }

    /// Flushes the mapping and reports the cumulative counters.
    pub fn close(self) {
        if let Err(e) = self.map.flush() {
            warn!("disk {}: flush failed on close: {e}", self.path.display());
        }
        info!(
            "disk {}: {} reads, {} writes",
            self.path.display(),
            self.reads,
            self.writes
        );
    }

    const fn sanity_check(&self, block: usize, buf_len: usize) -> FsResult<()> {
        if block >= self.blocks {
            return Err(FsError::OutOfBounds);
        }
        if buf_len != BLOCK_SIZE {
            return Err(FsError::InvalidInput);
        }
        Ok(())
    }
}
