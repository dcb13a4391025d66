//! Mount lifecycle, free-block accounting, and the debug surface.

mod io;

#[cfg(test)]
mod fs_tests;

use std::fmt::Write as _;
use std::num::NonZeroU32;

use tracing::{debug, info, warn};

use crate::disk::Disk;
use crate::error::{FsError, FsResult};
use crate::layout::bitmap::Bitmap;
use crate::layout::{BLOCK_SIZE, INODES_PER_BLOCK, INODE_SIZE, Inode, PointerBlock, Superblock};

/// A mounted filesystem.
///
/// The value owns the device, the in-memory superblock copy, and the
/// free-block map for the mount lifetime; [`FileSystem::unmount`] hands
/// the device back without closing it. The map is never written to disk.
#[derive(Debug)]
pub struct FileSystem {
    disk: Disk,
    meta: Superblock,
    free_blocks: Bitmap,
}

/// A rejected mount. Carries the device back so the caller keeps it.
pub struct MountError {
    pub disk: Disk,
    pub cause: FsError,
}

impl std::fmt::Debug for MountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountError")
            .field("cause", &self.cause)
            .finish_non_exhaustive()
    }
}

impl FileSystem {
    /// Formats the device: zeroes the inode table and writes a fresh
    /// superblock. The data region is left untouched, because the free
    /// map is reconstructed from inode reachability rather than from
    /// block contents.
    ///
    /// # Errors
    /// Fails when any block write fails.
    pub fn format(disk: &mut Disk) -> FsResult<()> {
        let meta = Superblock::for_blocks(disk.blocks() as u32);

        let zero = vec![0u8; BLOCK_SIZE];
        for block in 1..=meta.inode_blocks as usize {
            disk.write(block, &zero)?;
        }

        let mut buf = vec![0u8; BLOCK_SIZE];
        meta.write_bytes(&mut buf);
        disk.write(0, &buf)?;

        debug!(
            "formatted {} blocks ({} inode blocks, {} inodes)",
            meta.blocks, meta.inode_blocks, meta.inodes
        );
        Ok(())
    }

    /// Validates the superblock, rebuilds the free-block map, and takes
    /// ownership of the device.
    ///
    /// # Errors
    /// Returns the device together with the cause when the image is not
    /// a valid filesystem.
    pub fn mount(mut disk: Disk) -> Result<Self, MountError> {
        let meta = match read_superblock(&mut disk) {
            Ok(meta) => meta,
            Err(cause) => return Err(MountError { disk, cause }),
        };
        let free_blocks = match build_free_map(&mut disk, &meta) {
            Ok(map) => map,
            Err(cause) => return Err(MountError { disk, cause }),
        };

        info!(
            "mounted {} blocks, {} inode blocks, {} inodes",
            meta.blocks, meta.inode_blocks, meta.inodes
        );
        Ok(Self {
            disk,
            meta,
            free_blocks,
        })
    }

    /// Drops the free map and hands the device back without closing it.
    #[must_use]
    pub fn unmount(self) -> Disk {
        self.disk
    }

    #[must_use]
    pub const fn superblock(&self) -> &Superblock {
        &self.meta
    }

    /// Renders the superblock and every valid inode on the device.
    ///
    /// Works on an unmounted device; only on-disk state is consulted.
    ///
    /// # Errors
    /// Fails when a referenced block cannot be read.
    pub fn debug_report(disk: &mut Disk) -> FsResult<String> {
        let mut out = String::new();
        let mut buf = vec![0u8; BLOCK_SIZE];
        disk.read(0, &mut buf)?;

        let meta = Superblock::from_bytes(&buf);
        let _ = writeln!(out, "SuperBlock:");
        let _ = writeln!(
            out,
            "    magic number is {}",
            if meta.is_some() { "valid" } else { "invalid" }
        );
        let Some(meta) = meta else {
            return Ok(out);
        };
        let _ = writeln!(out, "    {} blocks", meta.blocks);
        let _ = writeln!(out, "    {} inode blocks", meta.inode_blocks);
        let _ = writeln!(out, "    {} inodes", meta.inodes);

        for block in 1..=meta.inode_blocks as usize {
            disk.read(block, &mut buf)?;
            for slot in 0..INODES_PER_BLOCK {
                let inode = Inode::from_bytes(&buf[slot * INODE_SIZE..(slot + 1) * INODE_SIZE]);
                if !inode.valid {
                    continue;
                }
                let _ = writeln!(out, "Inode {}:", (block - 1) * INODES_PER_BLOCK + slot);
                let _ = writeln!(out, "    size: {} bytes", inode.size);
                for ptr in inode.live_direct() {
                    let _ = writeln!(out, "    direct block: {ptr}");
                }
                if let Some(indirect) = inode.indirect {
                    let _ = writeln!(out, "    indirect block: {indirect}");
                    let mut index = vec![0u8; BLOCK_SIZE];
                    disk.read(indirect.get() as usize, &mut index)?;
                    let entries: Vec<String> = PointerBlock::from_bytes(&index)
                        .live()
                        .map(|p| p.to_string())
                        .collect();
                    let _ = writeln!(out, "    indirect data blocks: {}", entries.join(" "));
                }
            }
        }
        Ok(out)
    }

    /// Same report for a mounted filesystem.
    ///
    /// # Errors
    /// Fails when a referenced block cannot be read.
    pub fn report(&mut self) -> FsResult<String> {
        Self::debug_report(&mut self.disk)
    }

    /// First-fit scan of the data region. `None` when every data block
    /// is taken. The scan starts past the inode table, so block 0 can
    /// never be handed out.
    pub(crate) fn allocate_free_block(&mut self) -> Option<NonZeroU32> {
        let start = self.meta.data_start() as usize;
        let block = self
            .free_blocks
            .first_set_in(start..self.meta.blocks as usize)?;
        self.free_blocks.set(block, false);
        NonZeroU32::new(block as u32)
    }

    /// Marks `block` free again. The block's on-disk contents are left
    /// as they are; reuse happens through the free map alone.
    pub(crate) fn release_free_block(&mut self, block: NonZeroU32) {
        let block = block.get() as usize;
        debug_assert!(!self.free_blocks.get(block), "double release of block {block}");
        self.free_blocks.set(block, true);
    }

    /// Loads inode `inumber` from the table.
    ///
    /// # Errors
    /// `InvalidInput` when the number is outside the table,
    /// `InvalidInode` when the slot is not in use.
    pub(crate) fn load_inode(&mut self, inumber: usize) -> FsResult<Inode> {
        let (block, slot) = self.locate_inode(inumber)?;
        let mut buf = vec![0u8; BLOCK_SIZE];
        self.disk.read(block, &mut buf)?;
        let inode = Inode::from_bytes(&buf[slot * INODE_SIZE..(slot + 1) * INODE_SIZE]);
        if !inode.valid {
            return Err(FsError::InvalidInode);
        }
        Ok(inode)
    }

    /// Read-modify-writes the slot, preserving its neighbours in the
    /// same table block.
    pub(crate) fn save_inode(&mut self, inumber: usize, inode: &Inode) -> FsResult<()> {
        let (block, slot) = self.locate_inode(inumber)?;
        let mut buf = vec![0u8; BLOCK_SIZE];
        self.disk.read(block, &mut buf)?;
        inode.write_bytes(&mut buf[slot * INODE_SIZE..(slot + 1) * INODE_SIZE]);
        self.disk.write(block, &buf)?;
        Ok(())
    }

    fn locate_inode(&self, inumber: usize) -> FsResult<(usize, usize)> {
        if inumber >= self.meta.inodes as usize {
            return Err(FsError::InvalidInput);
        }
        Ok((1 + inumber / INODES_PER_BLOCK, inumber % INODES_PER_BLOCK))
    }
}

#[cfg(test)]
impl FileSystem {
    pub(crate) fn free_data_blocks(&self) -> usize {
        self.free_blocks
            .count_set_in(self.meta.data_start() as usize..self.meta.blocks as usize)
    }

    pub(crate) fn is_block_free(&self, block: usize) -> bool {
        self.free_blocks.get(block)
    }
}

fn read_superblock(disk: &mut Disk) -> FsResult<Superblock> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    disk.read(0, &mut buf)?;
    let Some(meta) = Superblock::from_bytes(&buf) else {
        warn!("mount rejected: bad magic number");
        return Err(FsError::Corrupt);
    };
    if !meta.is_consistent_with(disk.blocks()) {
        warn!("mount rejected: inconsistent superblock geometry");
        return Err(FsError::Corrupt);
    }
    Ok(meta)
}

/// Rebuilds the free map from inode reachability: the superblock and the
/// inode table are always taken, and every block referenced by a valid
/// inode (directly, as the indirect index, or from inside it) is taken.
fn build_free_map(disk: &mut Disk, meta: &Superblock) -> FsResult<Bitmap> {
    let mut map = Bitmap::zero(meta.blocks as usize);
    for block in meta.data_start() as usize..meta.blocks as usize {
        map.set(block, true);
    }

    let mut buf = vec![0u8; BLOCK_SIZE];
    for block in 1..=meta.inode_blocks as usize {
        disk.read(block, &mut buf)?;
        for slot in 0..INODES_PER_BLOCK {
            let inode = Inode::from_bytes(&buf[slot * INODE_SIZE..(slot + 1) * INODE_SIZE]);
            if !inode.valid {
                continue;
            }
            for ptr in inode.live_direct() {
                claim(&mut map, meta, ptr)?;
            }
            if let Some(indirect) = inode.indirect {
                claim(&mut map, meta, indirect)?;
                let mut index = vec![0u8; BLOCK_SIZE];
                disk.read(indirect.get() as usize, &mut index)?;
                for ptr in PointerBlock::from_bytes(&index).live() {
                    claim(&mut map, meta, ptr)?;
                }
            }
        }
    }
    Ok(map)
}

/// Marks a referenced block as taken. A reference outside the data
/// region means the image is corrupt.
fn claim(map: &mut Bitmap, meta: &Superblock, block: NonZeroU32) -> FsResult<()> {
    let block = block.get();
    if block < meta.data_start() || block >= meta.blocks {
        warn!("mount rejected: block {block} referenced outside the data region");
        return Err(FsError::Corrupt);
    }
    map.set(block as usize, false);
    Ok(())
}
