use rand::RngCore;
use tempfile::TempDir;

use crate::disk::Disk;
use crate::error::FsError;
use crate::fs::FileSystem;
use crate::layout::{BLOCK_SIZE, POINTERS_PER_INODE};

const IMAGE_BLOCKS: usize = 100;
// 100-block image: 1 superblock + 10 inode blocks leaves 89 data blocks.
const DATA_BLOCKS: usize = 89;

fn scratch_disk(dir: &TempDir, blocks: usize) -> Disk {
    Disk::open(&dir.path().join("image.sfs"), blocks).expect("open disk")
}

fn fresh_fs(dir: &TempDir, blocks: usize) -> FileSystem {
    let mut disk = scratch_disk(dir, blocks);
    FileSystem::format(&mut disk).expect("format");
    FileSystem::mount(disk).expect("mount")
}

#[test]
fn format_then_mount_reports_geometry() {
    let dir = TempDir::new().expect("tempdir");
    let fs = fresh_fs(&dir, IMAGE_BLOCKS);

    let meta = fs.superblock();
    assert_eq!(meta.blocks, 100);
    assert_eq!(meta.inode_blocks, 10);
    assert_eq!(meta.inodes, 1280);
    assert_eq!(fs.free_data_blocks(), DATA_BLOCKS);
}

#[test]
fn debug_report_lists_superblock_and_inodes() {
    let dir = TempDir::new().expect("tempdir");
    let mut fs = fresh_fs(&dir, IMAGE_BLOCKS);

    let inumber = fs.create().expect("create");
    fs.write(inumber, 0, b"hello").expect("write");

    let report = fs.report().expect("report");
    assert!(report.contains("magic number is valid"));
    assert!(report.contains("100 blocks"));
    assert!(report.contains("10 inode blocks"));
    assert!(report.contains("1280 inodes"));
    assert!(report.contains("Inode 0:"));
    assert!(report.contains("size: 5 bytes"));
    assert!(report.contains("direct block: 11"));
}

#[test]
fn mount_rejects_unformatted_image() {
    let dir = TempDir::new().expect("tempdir");
    let disk = scratch_disk(&dir, IMAGE_BLOCKS);

    let err = FileSystem::mount(disk).expect_err("mount must fail");
    assert_eq!(err.cause, FsError::Corrupt);
    // the device comes back usable
    assert_eq!(err.disk.blocks(), IMAGE_BLOCKS);
}

#[test]
fn mount_rejects_tampered_geometry() {
    let dir = TempDir::new().expect("tempdir");
    let mut disk = scratch_disk(&dir, IMAGE_BLOCKS);
    FileSystem::format(&mut disk).expect("format");

    let mut block = vec![0u8; BLOCK_SIZE];
    disk.read(0, &mut block).expect("read superblock");
    // bump inode_blocks so it no longer matches blocks.div_ceil(10)
    block[8] = block[8].wrapping_add(1);
    disk.write(0, &block).expect("write superblock");

    let err = FileSystem::mount(disk).expect_err("mount must fail");
    assert_eq!(err.cause, FsError::Corrupt);
}

#[test]
fn create_stat_remove_lifecycle() {
    let dir = TempDir::new().expect("tempdir");
    let mut fs = fresh_fs(&dir, IMAGE_BLOCKS);

    let inumber = fs.create().expect("create");
    assert_eq!(inumber, 0);
    assert_eq!(fs.stat(inumber), Ok(0));

    fs.remove(inumber).expect("remove");
    assert_eq!(fs.stat(inumber), Err(FsError::InvalidInode));
    assert_eq!(fs.remove(inumber), Err(FsError::InvalidInode));

    // the slot is reusable
    assert_eq!(fs.create().expect("create again"), 0);
}

#[test]
fn stat_fails_for_every_inode_on_a_fresh_image() {
    let dir = TempDir::new().expect("tempdir");
    let mut fs = fresh_fs(&dir, IMAGE_BLOCKS);

    for inumber in [0, 1, 127, 128, 1279] {
        assert_eq!(fs.stat(inumber), Err(FsError::InvalidInode));
    }
    assert_eq!(fs.stat(1280), Err(FsError::InvalidInput));
}

#[test]
fn small_write_read_roundtrip() {
    let dir = TempDir::new().expect("tempdir");
    let mut fs = fresh_fs(&dir, IMAGE_BLOCKS);

    let inumber = fs.create().expect("create");
    assert_eq!(fs.write(inumber, 0, b"hello").expect("write"), 5);
    assert_eq!(fs.stat(inumber), Ok(5));

    assert_eq!(fs.read(inumber, 0, 5).expect("read"), b"hello");
    // reads clamp to the file size
    assert_eq!(fs.read(inumber, 0, 100).expect("read"), b"hello");
    assert_eq!(fs.read(inumber, 5, 10).expect("read past end"), b"");
}

#[test]
fn overwrite_leaves_surrounding_bytes_and_size() {
    let dir = TempDir::new().expect("tempdir");
    let mut fs = fresh_fs(&dir, IMAGE_BLOCKS);

    let inumber = fs.create().expect("create");
    fs.write(inumber, 0, b"abcdef").expect("write");
    assert_eq!(fs.write(inumber, 2, b"XY").expect("overwrite"), 2);

    assert_eq!(fs.stat(inumber), Ok(6));
    assert_eq!(fs.read(inumber, 0, 6).expect("read"), b"abXYef");
}

#[test]
fn roundtrip_across_the_direct_indirect_boundary() {
    let dir = TempDir::new().expect("tempdir");
    let mut fs = fresh_fs(&dir, IMAGE_BLOCKS);

    let mut payload = vec![0u8; 6 * BLOCK_SIZE + 123];
    rand::rng().fill_bytes(&mut payload);

    let inumber = fs.create().expect("create");
    assert_eq!(fs.write(inumber, 0, &payload).expect("write"), payload.len());
    assert_eq!(fs.stat(inumber), Ok(payload.len() as u32));
    assert_eq!(fs.read(inumber, 0, payload.len()).expect("read"), payload);

    // unaligned window straddling the boundary
    let window = fs
        .read(inumber, 4 * BLOCK_SIZE + 100, 2 * BLOCK_SIZE)
        .expect("windowed read");
    assert_eq!(window, payload[4 * BLOCK_SIZE + 100..6 * BLOCK_SIZE + 100]);
}

#[test]
fn sparse_write_at_the_first_indirect_slot() {
    let dir = TempDir::new().expect("tempdir");
    let mut fs = fresh_fs(&dir, IMAGE_BLOCKS);

    let inumber = fs.create().expect("create");
    let offset = POINTERS_PER_INODE * BLOCK_SIZE;
    assert_eq!(fs.write(inumber, offset, b"Z").expect("write"), 1);
    assert_eq!(fs.stat(inumber), Ok(offset as u32 + 1));

    assert_eq!(fs.read(inumber, offset, 1).expect("read"), b"Z");

    // 5 direct blocks, the indirect index, and one indirect data block,
    // allocated first-fit from the start of the data region
    assert_eq!(fs.free_data_blocks(), DATA_BLOCKS - 7);
    assert!(!fs.is_block_free(11));
    assert!(!fs.is_block_free(17));
    assert!(fs.is_block_free(18));
}

#[test]
fn growth_stops_when_the_data_region_fills() {
    let dir = TempDir::new().expect("tempdir");
    // 5 blocks: superblock + 1 inode block + 3 data blocks
    let mut fs = fresh_fs(&dir, 5);

    let inumber = fs.create().expect("create");
    let payload = vec![0xABu8; 4 * BLOCK_SIZE];
    let written = fs.write(inumber, 0, &payload).expect("write");

    assert_eq!(written, 3 * BLOCK_SIZE);
    assert_eq!(fs.stat(inumber), Ok((3 * BLOCK_SIZE) as u32));
    assert_eq!(fs.free_data_blocks(), 0);

    let back = fs.read(inumber, 0, 4 * BLOCK_SIZE).expect("read");
    assert_eq!(back.len(), 3 * BLOCK_SIZE);
    assert!(back.iter().all(|&b| b == 0xAB));
}

#[test]
fn remove_returns_every_block_to_the_free_map() {
    let dir = TempDir::new().expect("tempdir");
    let mut fs = fresh_fs(&dir, IMAGE_BLOCKS);

    let inumber = fs.create().expect("create");
    let payload = vec![0x11u8; 7 * BLOCK_SIZE];
    fs.write(inumber, 0, &payload).expect("write");
    // 7 file blocks plus the indirect index
    assert_eq!(fs.free_data_blocks(), DATA_BLOCKS - 8);

    fs.remove(inumber).expect("remove");
    assert_eq!(fs.free_data_blocks(), DATA_BLOCKS);
}

#[test]
fn distinct_inodes_never_share_blocks() {
    let dir = TempDir::new().expect("tempdir");
    let mut fs = fresh_fs(&dir, IMAGE_BLOCKS);

    let a = fs.create().expect("create a");
    let b = fs.create().expect("create b");
    assert_ne!(a, b);

    let payload_a = vec![0xAAu8; 2 * BLOCK_SIZE];
    let payload_b = vec![0xBBu8; 2 * BLOCK_SIZE];
    fs.write(a, 0, &payload_a).expect("write a");
    fs.write(b, 0, &payload_b).expect("write b");

    assert_eq!(fs.free_data_blocks(), DATA_BLOCKS - 4);
    assert_eq!(fs.read(a, 0, 2 * BLOCK_SIZE).expect("read a"), payload_a);
    assert_eq!(fs.read(b, 0, 2 * BLOCK_SIZE).expect("read b"), payload_b);
}

#[test]
fn contents_survive_an_unmount_mount_cycle() {
    let dir = TempDir::new().expect("tempdir");
    let mut fs = fresh_fs(&dir, IMAGE_BLOCKS);

    let mut payload = vec![0u8; 6 * BLOCK_SIZE];
    rand::rng().fill_bytes(&mut payload);

    let keep = fs.create().expect("create keep");
    let doomed = fs.create().expect("create doomed");
    fs.write(keep, 0, &payload).expect("write keep");
    fs.write(doomed, 0, b"gone soon").expect("write doomed");
    fs.remove(doomed).expect("remove doomed");

    let disk = fs.unmount();
    let mut fs = FileSystem::mount(disk).expect("remount");

    assert_eq!(fs.stat(keep), Ok(payload.len() as u32));
    assert_eq!(fs.read(keep, 0, payload.len()).expect("read"), payload);
    assert_eq!(fs.stat(doomed), Err(FsError::InvalidInode));
    // 6 file blocks + indirect index reclaimed by the reachability scan
    assert_eq!(fs.free_data_blocks(), DATA_BLOCKS - 7);
}

#[test]
fn freed_blocks_are_reused_after_remount() {
    let dir = TempDir::new().expect("tempdir");
    let mut fs = fresh_fs(&dir, 5);

    let first = fs.create().expect("create");
    let fill = vec![0x01u8; 3 * BLOCK_SIZE];
    fs.write(first, 0, &fill).expect("fill the data region");
    fs.remove(first).expect("remove");

    let disk = fs.unmount();
    let mut fs = FileSystem::mount(disk).expect("remount");
    assert_eq!(fs.free_data_blocks(), 3);

    let second = fs.create().expect("create");
    let payload = vec![0x02u8; 3 * BLOCK_SIZE];
    assert_eq!(fs.write(second, 0, &payload).expect("write"), payload.len());
    assert_eq!(fs.read(second, 0, payload.len()).expect("read"), payload);
}

#[test]
fn create_exhausts_the_inode_table() {
    let dir = TempDir::new().expect("tempdir");
    // 1-block table: 128 slots
    let mut fs = fresh_fs(&dir, 5);

    for expected in 0..128 {
        assert_eq!(fs.create().expect("create"), expected);
    }
    assert_eq!(fs.create(), Err(FsError::OutOfInodes));

    fs.remove(77).expect("remove");
    assert_eq!(fs.create().expect("create reuses the slot"), 77);
}

#[test]
fn write_at_an_offset_backs_the_gap() {
    let dir = TempDir::new().expect("tempdir");
    let mut fs = fresh_fs(&dir, IMAGE_BLOCKS);

    let inumber = fs.create().expect("create");
    assert_eq!(fs.write(inumber, 100, b"tail").expect("write"), 4);
    assert_eq!(fs.stat(inumber), Ok(104));

    let back = fs.read(inumber, 0, 104).expect("read");
    // a fresh image is zero-filled, so the unwritten gap reads as zeros
    assert!(back[..100].iter().all(|&b| b == 0));
    assert_eq!(&back[100..], b"tail");
}
