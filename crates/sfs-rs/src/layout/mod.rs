//! On-disk format.
//!
//! Layout is block-based with `BLOCK_SIZE` (4096) blocks.
//!
//! Block 0: superblock
//! - magic_number: u32
//! - blocks: u32 (total blocks in the image)
//! - inode_blocks: u32 (= blocks.div_ceil(10))
//! - inodes: u32 (= inode_blocks * INODES_PER_BLOCK)
//! - remaining bytes written as zero, ignored on read
//!
//! Blocks 1..=inode_blocks: inode table (fixed 32-byte records, 128 per
//! block)
//!
//! Remaining blocks: data region, holding file contents and indirect
//! index blocks interchangeably.
//!
//! Every on-disk integer is a little-endian u32. Pointer value 0 means
//! "no block"; in memory pointers are `Option<NonZeroU32>` and the
//! serializer emits 0 for `None`, so the sentinel never leaks into
//! arithmetic. Block 0 is structurally the superblock, which is what
//! makes 0 safe as the null pointer.

pub mod bitmap;


use std::num::NonZeroU32;

pub const BLOCK_SIZE: usize = 4096;
pub const MAGIC_NUMBER: u32 = 0xf0f0_3410;
pub const INODE_SIZE: usize = 32;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
pub const POINTERS_PER_INODE: usize = 5;
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / 4;

/// Image-level metadata held in block 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub blocks: u32,
    pub inode_blocks: u32,
    pub inodes: u32,
}

impl Superblock {
    /// Derives the superblock for a device of `blocks` blocks: one tenth
    /// of the image (rounded up) goes to the inode table.
    #[must_use]
    pub const fn for_blocks(blocks: u32) -> Self {
        let inode_blocks = blocks.div_ceil(10);
        Self {
            blocks,
            inode_blocks,
            inodes: inode_blocks * INODES_PER_BLOCK as u32,
        }
    }

    /// Parses block 0. `None` when the magic number does not match.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than the 16-byte header.
    #[must_use]
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != MAGIC_NUMBER {
            return None;
        }
        Some(Self {
            blocks: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            inode_blocks: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            inodes: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        })
    }

    /// Serializes into a full block; bytes past the header are zeroed.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than the 16-byte header.
    pub fn write_bytes(&self, buf: &mut [u8]) {
        buf.fill(0);
        buf[0..4].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
        buf[4..8].copy_from_slice(&self.blocks.to_le_bytes());
        buf[8..12].copy_from_slice(&self.inode_blocks.to_le_bytes());
        buf[12..16].copy_from_slice(&self.inodes.to_le_bytes());
    }

    /// Checks the derived-field relationships against the device size.
    #[must_use]
    pub fn is_consistent_with(&self, device_blocks: usize) -> bool {
        self.blocks as usize == device_blocks
            && self.inode_blocks == self.blocks.div_ceil(10)
            && self.inodes == self.inode_blocks * INODES_PER_BLOCK as u32
    }

    /// First block of the data region.
    #[must_use]
    pub const fn data_start(&self) -> u32 {
        1 + self.inode_blocks
    }
}

/// One fixed-size inode record.
///
/// A free slot has `valid = false` and its remaining fields are
/// unspecified; they are never inspected. On disk both pointer arrays
/// are zero-terminated: the first 0 ends the live prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Inode {
    pub valid: bool,
    pub size: u32,
    pub direct: [Option<NonZeroU32>; POINTERS_PER_INODE],
    pub indirect: Option<NonZeroU32>,
}

impl Inode {
    /// # Panics
    /// Panics if `buf` does not hold a full record.
    #[must_use]
    pub fn from_bytes(buf: &[u8]) -> Self {
        let valid = u32::from_le_bytes(buf[0..4].try_into().unwrap()) != 0;
        let size = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let mut direct = [None; POINTERS_PER_INODE];
        let mut off = 8;
        for slot in &mut direct {
            *slot = NonZeroU32::new(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()));
            off += 4;
        }
        let indirect = NonZeroU32::new(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()));
        Self {
            valid,
            size,
            direct,
            indirect,
        }
    }

    /// # Panics
    /// Panics if `buf` does not hold a full record.
    pub fn write_bytes(&self, buf: &mut [u8]) {
        buf[..INODE_SIZE].fill(0);
        buf[0..4].copy_from_slice(&u32::from(self.valid).to_le_bytes());
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        let mut off = 8;
        for slot in self.direct {
            buf[off..off + 4].copy_from_slice(&slot.map_or(0, NonZeroU32::get).to_le_bytes());
            off += 4;
        }
        buf[off..off + 4].copy_from_slice(&self.indirect.map_or(0, NonZeroU32::get).to_le_bytes());
    }

    /// Direct pointers up to the zero terminator.
    pub fn live_direct(&self) -> impl Iterator<Item = NonZeroU32> + '_ {
        self.direct.iter().copied().map_while(|p| p)
    }

    /// Number of blocks needed to back `size` bytes.
    #[must_use]
    pub const fn blocks_for(size: u32) -> u32 {
        size.div_ceil(BLOCK_SIZE as u32)
    }
}

/// Indirect index block: 1024 zero-terminated block numbers.
#[derive(Clone)]
pub struct PointerBlock {
    pub pointers: [Option<NonZeroU32>; POINTERS_PER_BLOCK],
}

impl PointerBlock {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            pointers: [None; POINTERS_PER_BLOCK],
        }
    }

    /// # Panics
    /// Panics if `buf` is shorter than one block.
    #[must_use]
    pub fn from_bytes(buf: &[u8]) -> Self {
        let mut pointers = [None; POINTERS_PER_BLOCK];
        for (i, slot) in pointers.iter_mut().enumerate() {
            let off = i * 4;
            *slot = NonZeroU32::new(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()));
        }
        Self { pointers }
    }

    /// # Panics
    /// Panics if `buf` is shorter than one block.
    pub fn write_bytes(&self, buf: &mut [u8]) {
        for (i, slot) in self.pointers.iter().enumerate() {
            let off = i * 4;
            buf[off..off + 4].copy_from_slice(&slot.map_or(0, NonZeroU32::get).to_le_bytes());
        }
    }

    /// Pointers up to the zero terminator.
    pub fn live(&self) -> impl Iterator<Item = NonZeroU32> + '_ {
        self.pointers.iter().copied().map_while(|p| p)
    }
}
