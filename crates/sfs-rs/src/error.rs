/// Failure taxonomy for the filesystem core.
///
/// Running out of data blocks during growth is deliberately absent:
/// growth is best-effort and `write` reports a short count instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// The superblock or block reachability failed validation at mount.
    Corrupt,
    /// The addressed inode slot is not in use.
    InvalidInode,
    /// Every inode slot is taken.
    OutOfInodes,
    /// Block index past the end of the device.
    OutOfBounds,
    /// Argument outside the representable range (buffer length, inode number).
    InvalidInput,
}

pub type FsResult<T> = Result<T, FsError>;
