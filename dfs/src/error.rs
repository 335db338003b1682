use thiserror::Error;

pub type Result<T> = std::result::Result<T, DfsError>;

#[derive(Error, Debug)]
pub enum DfsError {
    #[error("buffer holds {actual} bytes but {required} are required")]
    BufferTooSmall { required: u64, actual: u64 },
    #[error("invalid partition geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid signature, no DFS volume at offset 0 or after the boot sector")]
    InvalidSignature,
    #[error("unsupported DFS version v{major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },
    #[error("corrupt chain at offset {offset}: {reason}")]
    CorruptChain { offset: u64, reason: &'static str },
    #[error("allocation bitmap has no free granule left")]
    AllocatorExhausted,
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("an entry named {0:?} already exists")]
    AlreadyExists(String),
    #[error("found no entry named {0:?}")]
    DoesNotExist(String),
    #[error("checksum mismatch in fragment at offset {offset}")]
    ChecksumMismatch { offset: u64 },
    #[error("image I/O failed: {0}")]
    IoFailure(#[from] std::io::Error),
}

impl DfsError {
    pub(crate) fn corrupt(offset: u64, reason: &'static str) -> Self {
        DfsError::CorruptChain { offset, reason }
    }
}
