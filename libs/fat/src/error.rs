use blockdev::BlockError;
use core::fmt;

/// Errors returned by the FAT driver.
///
/// Only `InvalidGeometry` is fatal (it is returned by `mount`); everything
/// else is scoped to the operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// The boot sector does not describe a usable FAT volume.
    InvalidGeometry(&'static str),
    /// A directory operation was attempted on a file.
    NotADirectory,
    /// A file operation was attempted on a directory.
    IsADirectory,
    /// A path component does not exist.
    NotExist,
    /// A logical offset maps past the end of the cluster chain.
    CorruptChain { index: usize },
    /// Seek to a negative or unrepresentable position.
    InvalidSeek,
    /// The underlying device failed.
    Device(BlockError),
}

impl From<BlockError> for FsError {
    fn from(e: BlockError) -> Self {
        FsError::Device(e)
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::InvalidGeometry(why) => write!(f, "invalid FAT geometry: {why}"),
            FsError::NotADirectory        => f.write_str("not a directory"),
            FsError::IsADirectory         => f.write_str("is a directory"),
            FsError::NotExist             => f.write_str("file does not exist"),
            FsError::CorruptChain { index } => {
                write!(f, "encountered bad cluster at chain index {index}")
            }
            FsError::InvalidSeek          => f.write_str("invalid seek position"),
            FsError::Device(e)            => write!(f, "device error: {e}"),
        }
    }
}

impl core::error::Error for FsError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            FsError::Device(e) => Some(e),
            _ => None,
        }
    }
}

impl embedded_io::Error for FsError {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind;
        match self {
            FsError::NotExist => ErrorKind::NotFound,
            FsError::InvalidSeek => ErrorKind::InvalidInput,
            FsError::InvalidGeometry(_) | FsError::CorruptChain { .. } => ErrorKind::InvalidData,
            FsError::NotADirectory | FsError::IsADirectory => ErrorKind::Unsupported,
            FsError::Device(_) => ErrorKind::Other,
        }
    }
}
