use rand::RngCore;
use tempfile::TempDir;

use crate::disk::Disk;
use crate::error::FsError;
use crate::layout::BLOCK_SIZE;

const DISK_BLOCKS: usize = 64;

fn scratch(dir: &TempDir) -> Disk {
    Disk::open(&dir.path().join("disk.img"), DISK_BLOCKS).expect("open disk")
}

#[test]
fn open_creates_and_sizes_image() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("disk.img");

    let d = Disk::open(&path, DISK_BLOCKS).expect("open");
    assert_eq!(d.blocks(), DISK_BLOCKS);

    let meta = std::fs::metadata(&path).expect("metadata");
    assert_eq!(
        meta.len(),
        (DISK_BLOCKS * BLOCK_SIZE) as u64,
        "backing image must be pre-sized"
    );
}

#[test]
fn open_rejects_zero_blocks() {
    let dir = TempDir::new().expect("tempdir");
    assert!(Disk::open(&dir.path().join("disk.img"), 0).is_err());
}

#[test]
fn fresh_blocks_read_as_zero() {
    let dir = TempDir::new().expect("tempdir");
    let mut d = scratch(&dir);

    let mut buf = vec![0xAAu8; BLOCK_SIZE];
    let n = d.read(DISK_BLOCKS - 1, &mut buf).expect("read");
    assert_eq!(n, BLOCK_SIZE);
    assert!(
        buf.iter().all(|&b| b == 0),
        "newly allocated space should read as zeros"
    );
}

#[test]
fn write_then_read_roundtrip() {
    let dir = TempDir::new().expect("tempdir");
    let mut d = scratch(&dir);

    let mut data = vec![0u8; BLOCK_SIZE];
    rand::rng().fill_bytes(&mut data);

    assert_eq!(d.write(7, &data).expect("write"), BLOCK_SIZE);

    let mut back = vec![0u8; BLOCK_SIZE];
    assert_eq!(d.read(7, &mut back).expect("read"), BLOCK_SIZE);
    assert_eq!(back, data, "roundtrip must match");
}

#[test]
fn rejects_out_of_range_block() {
    let dir = TempDir::new().expect("tempdir");
    let mut d = scratch(&dir);

    let mut buf = vec![0u8; BLOCK_SIZE];
    assert_eq!(d.read(DISK_BLOCKS, &mut buf), Err(FsError::OutOfBounds));
    assert_eq!(d.write(DISK_BLOCKS, &buf), Err(FsError::OutOfBounds));
}

#[test]
fn rejects_partial_buffer() {
    let dir = TempDir::new().expect("tempdir");
    let mut d = scratch(&dir);

    let mut short = vec![0u8; BLOCK_SIZE - 1];
    assert_eq!(d.read(0, &mut short), Err(FsError::InvalidInput));
    assert_eq!(d.write(0, &short), Err(FsError::InvalidInput));
}

#[test]
fn counters_track_successful_operations_only() {
    let dir = TempDir::new().expect("tempdir");
    let mut d = scratch(&dir);

    let mut buf = vec![0u8; BLOCK_SIZE];
    d.read(0, &mut buf).expect("read");
    d.read(1, &mut buf).expect("read");
    d.write(2, &buf).expect("write");
    let _ = d.read(DISK_BLOCKS, &mut buf);
    let _ = d.write(DISK_BLOCKS, &buf);

    assert_eq!(d.reads(), 2);
    assert_eq!(d.writes(), 1);
}

#[test]
fn reopen_preserves_contents() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("disk.img");

    let payload = vec![0x5Au8; BLOCK_SIZE];
    {
        let mut d = Disk::open(&path, DISK_BLOCKS).expect("open");
        d.write(3, &payload).expect("write");
        d.close();
    }

    let mut d = Disk::open(&path, DISK_BLOCKS).expect("reopen");
    let mut back = vec![0u8; BLOCK_SIZE];
    d.read(3, &mut back).expect("read");
    assert_eq!(back, payload);
}
