//! Single-image block filesystem core.
//!
//! One fixed-size image file is treated as an array of 4 KiB blocks:
//! block 0 holds the superblock, a fixed table of inode blocks follows,
//! and the rest is the data region. Files are anonymous inodes addressed
//! by number, each with five direct pointers and one indirect index
//! block. The free-block map lives only in memory and is rebuilt from
//! inode reachability on every mount.

pub mod disk;
pub mod error;
pub mod fs;
pub mod layout;
