use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlockError>;

/// Unified error type for block-device setup and transfer failures.
///
/// Mid-transfer failures of a block primitive are *not* reported through this
/// type by the byte-range entry points: those return the bytes moved before
/// the failure, and callers detect truncation by comparing the count against
/// the requested length. `BlockError` covers everything that must abort a
/// call outright: configuration errors, address overflow, bounce-buffer
/// allocation failures, and hard failures from the primitives themselves.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("device name of {len} bytes is too long")]
    NameTooLong { len: usize },

    #[error("block count {blocks} does not fit in a block address")]
    BlockCountOverflow { blocks: u64 },

    #[error("alignment {alignment} exceeds block size {block_size}")]
    AlignmentTooLarge { alignment: u32, block_size: u32 },

    #[error("buffer alignment is already configured")]
    AlignmentAlreadySet,

    #[error("protected range is already configured")]
    ProtectionAlreadySet,

    #[error("integer overflow while computing byte offsets")]
    OffsetOverflow,

    #[error("bounce buffer allocation of {size} bytes failed")]
    BounceAlloc { size: usize },

    #[error("short read at offset {offset}: wanted {wanted}, got {got}")]
    ShortRead { offset: u64, wanted: usize, got: usize },

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("io error: {0}")]
    Io(String),
}
