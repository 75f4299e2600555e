use crate::{BlockError, Result};

/// End of the half-open range `[offset, offset + len)`, rejecting wrap-around.
pub(crate) fn checked_end(offset: u64, len: u64) -> Result<u64> {
    offset.checked_add(len).ok_or(BlockError::OffsetOverflow)
}
