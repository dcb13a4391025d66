//! File engine: inode lifecycle and byte-range I/O.

use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::layout::{
    BLOCK_SIZE, INODES_PER_BLOCK, INODE_SIZE, Inode, POINTERS_PER_BLOCK, POINTERS_PER_INODE,
    PointerBlock,
};

use super::FileSystem;

impl FileSystem {
    /// Claims the first free inode slot and returns its number. No data
    /// blocks are allocated.
    ///
    /// # Errors
    /// `OutOfInodes` when every slot is taken.
    pub fn create(&mut self) -> FsResult<usize> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        for block in 1..=self.meta.inode_blocks as usize {
            self.disk.read(block, &mut buf)?;
            for slot in 0..INODES_PER_BLOCK {
                let range = slot * INODE_SIZE..(slot + 1) * INODE_SIZE;
                if Inode::from_bytes(&buf[range.clone()]).valid {
                    continue;
                }
                let fresh = Inode {
                    valid: true,
                    ..Inode::default()
                };
                fresh.write_bytes(&mut buf[range]);
                self.disk.write(block, &buf)?;
                return Ok((block - 1) * INODES_PER_BLOCK + slot);
            }
        }
        Err(FsError::OutOfInodes)
    }

    /// Releases every block reachable from the inode and frees the slot.
    /// On-disk data keeps its bytes; reuse happens through the free map.
    ///
    /// # Errors
    /// `InvalidInode` when the slot is not in use.
    pub fn remove(&mut self, inumber: usize) -> FsResult<()> {
        let inode = self.load_inode(inumber)?;

        for ptr in inode.live_direct() {
            self.release_free_block(ptr);
        }
        if let Some(indirect) = inode.indirect {
            let mut buf = vec![0u8; BLOCK_SIZE];
            self.disk.read(indirect.get() as usize, &mut buf)?;
            for ptr in PointerBlock::from_bytes(&buf).live() {
                self.release_free_block(ptr);
            }
            self.release_free_block(indirect);
        }

        self.save_inode(inumber, &Inode::default())
    }

    /// Size in bytes of the file behind `inumber`.
    ///
    /// # Errors
    /// `InvalidInode` when the slot is not in use.
    pub fn stat(&mut self, inumber: usize) -> FsResult<u32> {
        self.load_inode(inumber).map(|inode| inode.size)
    }

    /// Reads up to `length` bytes starting at `offset`, clamped to the
    /// file size. The result holds exactly the bytes read.
    ///
    /// # Errors
    /// `InvalidInode` when the slot is not in use; device errors are
    /// propagated.
    pub fn read(&mut self, inumber: usize, offset: usize, length: usize) -> FsResult<Vec<u8>> {
        let inode = self.load_inode(inumber)?;
        let length = length.min((inode.size as usize).saturating_sub(offset));
        let mut out = vec![0u8; length];

        let mut copied = 0usize;
        let mut block_index = offset / BLOCK_SIZE;
        let mut in_block = offset % BLOCK_SIZE;
        let mut buf = vec![0u8; BLOCK_SIZE];

        while copied < length && block_index < POINTERS_PER_INODE {
            let Some(ptr) = inode.direct[block_index] else {
                break;
            };
            self.disk.read(ptr.get() as usize, &mut buf)?;
            let take = (BLOCK_SIZE - in_block).min(length - copied);
            out[copied..copied + take].copy_from_slice(&buf[in_block..in_block + take]);
            copied += take;
            block_index += 1;
            in_block = 0;
        }

        if copied < length && block_index >= POINTERS_PER_INODE {
            if let Some(indirect) = inode.indirect {
                let mut index = vec![0u8; BLOCK_SIZE];
                self.disk.read(indirect.get() as usize, &mut index)?;
                let pointers = PointerBlock::from_bytes(&index);
                let mut j = block_index - POINTERS_PER_INODE;
                while copied < length && j < POINTERS_PER_BLOCK {
                    let Some(ptr) = pointers.pointers[j] else {
                        break;
                    };
                    self.disk.read(ptr.get() as usize, &mut buf)?;
                    let take = (BLOCK_SIZE - in_block).min(length - copied);
                    out[copied..copied + take].copy_from_slice(&buf[in_block..in_block + take]);
                    copied += take;
                    j += 1;
                    in_block = 0;
                }
            }
        }

        out.truncate(copied);
        Ok(out)
    }

    /// Grows the inode to back `offset + data.len()` bytes, then overlays
    /// `data` with per-block read-modify-write, saving the inode last.
    /// Returns the number of bytes written, which falls short of
    /// `data.len()` only when the data region filled up during growth.
    ///
    /// # Errors
    /// `InvalidInode` when the slot is not in use; device errors are
    /// propagated.
    pub fn write(&mut self, inumber: usize, offset: usize, data: &[u8]) -> FsResult<usize> {
        let mut inode = self.load_inode(inumber)?;
        self.grow(&mut inode, offset.saturating_add(data.len()))?;

        let mut written = 0usize;
        let mut block_index = offset / BLOCK_SIZE;
        let mut in_block = offset % BLOCK_SIZE;
        let mut buf = vec![0u8; BLOCK_SIZE];

        while written < data.len() && block_index < POINTERS_PER_INODE {
            let Some(ptr) = inode.direct[block_index] else {
                break;
            };
            let block = ptr.get() as usize;
            self.disk.read(block, &mut buf)?;
            let take = (BLOCK_SIZE - in_block).min(data.len() - written);
            buf[in_block..in_block + take].copy_from_slice(&data[written..written + take]);
            self.disk.write(block, &buf)?;
            written += take;
            block_index += 1;
            in_block = 0;
        }

        if written < data.len() && block_index >= POINTERS_PER_INODE {
            if let Some(indirect) = inode.indirect {
                let mut index = vec![0u8; BLOCK_SIZE];
                self.disk.read(indirect.get() as usize, &mut index)?;
                let pointers = PointerBlock::from_bytes(&index);
                let mut j = block_index - POINTERS_PER_INODE;
                while written < data.len() && j < POINTERS_PER_BLOCK {
                    let Some(ptr) = pointers.pointers[j] else {
                        break;
                    };
                    let block = ptr.get() as usize;
                    self.disk.read(block, &mut buf)?;
                    let take = (BLOCK_SIZE - in_block).min(data.len() - written);
                    buf[in_block..in_block + take].copy_from_slice(&data[written..written + take]);
                    self.disk.write(block, &buf)?;
                    written += take;
                    j += 1;
                    in_block = 0;
                }
            }
        }

        self.save_inode(inumber, &inode)?;
        Ok(written)
    }

    /// Best-effort growth so that `new_size` bytes are block-backed:
    /// direct slots fill first, then the single indirect table. When the
    /// data region runs dry mid-way, the inode keeps what was allocated
    /// and `size` is set to exactly the backed byte count.
    fn grow(&mut self, inode: &mut Inode, new_size: usize) -> FsResult<()> {
        let old_blocks = Inode::blocks_for(inode.size) as usize;
        let new_blocks = new_size.div_ceil(BLOCK_SIZE);
        if new_blocks <= old_blocks {
            inode.size = inode.size.max(new_size as u32);
            return Ok(());
        }

        let mut need = new_blocks - old_blocks;
        let mut idx = old_blocks;
        while idx < POINTERS_PER_INODE && need > 0 {
            let Some(block) = self.allocate_free_block() else {
                break;
            };
            inode.direct[idx] = Some(block);
            idx += 1;
            need -= 1;
        }

        if need > 0 && idx >= POINTERS_PER_INODE {
            let mut j = idx - POINTERS_PER_INODE;
            let existing = inode.indirect;
            let index_block = match existing {
                Some(block) => Some(block),
                None => self.allocate_free_block(),
            };
            if let Some(index_block) = index_block {
                let fresh_index = existing.is_none();
                let mut pointers = if fresh_index {
                    // a recycled block may hold stale pointers
                    inode.indirect = Some(index_block);
                    PointerBlock::empty()
                } else {
                    let mut buf = vec![0u8; BLOCK_SIZE];
                    self.disk.read(index_block.get() as usize, &mut buf)?;
                    PointerBlock::from_bytes(&buf)
                };

                let before = need;
                while j < POINTERS_PER_BLOCK && need > 0 {
                    let Some(block) = self.allocate_free_block() else {
                        break;
                    };
                    pointers.pointers[j] = Some(block);
                    j += 1;
                    need -= 1;
                }

                if fresh_index && need == before {
                    // the index block was reserved but nothing landed in it
                    self.release_free_block(index_block);
                    inode.indirect = None;
                } else {
                    let mut buf = vec![0u8; BLOCK_SIZE];
                    pointers.write_bytes(&mut buf);
                    self.disk.write(index_block.get() as usize, &mut buf)?;
                }
            }
        }

        inode.size = if need == 0 {
            new_size as u32
        } else {
            debug!(
                "data region full: backed {} of {} new blocks",
                new_blocks - old_blocks - need,
                new_blocks - old_blocks
            );
            ((new_blocks - need) * BLOCK_SIZE) as u32
        };
        Ok(())
    }
}
