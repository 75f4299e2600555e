use crate::device::{BlockDev, BlockIo};
use crate::geometry::BlockAddr;
use crate::util::checked_end;
use crate::{BlockError, Result};

/// Half-open byte window `[start, end)` that must never receive write
/// traffic. A device carries at most one; see [`BlockDev::set_protection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtectedRange {
    pub start: u64,
    pub end: u64,
}

impl ProtectedRange {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Byte-granular protection splitter: writes the portions of the request
/// before and after the protected window and discards the overlap.
pub(crate) fn write_bytes_protected(dev: &mut BlockDev, offset: u64, buf: &[u8]) -> Result<u64> {
    let len = buf.len() as u64;
    let request_end = checked_end(offset, len)?;
    let Some(range) = dev.protected_range() else {
        return dev.write_unprotected(offset, buf);
    };

    let mut written = 0u64;

    // Segment before the window.
    if offset < range.start {
        let overlap = request_end.saturating_sub(range.start);
        let seg_len = (len - overlap) as usize;
        let n = dev.write_unprotected(offset, &buf[..seg_len])?;
        written += n;
        if n < seg_len as u64 {
            // Short transfer; do not attempt the trailing segment.
            return Ok(written);
        }
    }

    // Segment after the window.
    if request_end > range.end {
        let overlap = range.end.saturating_sub(offset);
        let n = dev.write_unprotected(offset + overlap, &buf[overlap as usize..])?;
        written += n;
    }

    Ok(written)
}

/// Block-granular protection splitter, operating on block addresses with the
/// protected window shifted into block units. Both bounds are shifted the
/// same way; a window that is not block-aligned rounds down on both ends.
///
/// Blocks inside the window are skipped but still acknowledged: a fully
/// successful call returns `count`. A short segment returns that segment's
/// count alone, which for a request overhanging both ends is ambiguous with
/// a short leading segment.
pub(crate) fn write_blocks_protected(
    ops: &mut dyn BlockIo,
    protect: Option<ProtectedRange>,
    block_shift: u32,
    buf: &[u8],
    block: BlockAddr,
    count: u32,
) -> Result<u32> {
    let end = block.checked_add(count).ok_or(BlockError::OffsetOverflow)?;
    let Some(range) = protect else {
        return ops.write_blocks(buf, block, count);
    };

    let protect_start = range.start >> block_shift;
    let protect_end = range.end >> block_shift;
    let block_u = block as u64;
    let end_u = end as u64;

    // Blocks before the window.
    if block_u < protect_start {
        let overlap = end_u.saturating_sub(protect_start) as u32;
        let seg = count - overlap;
        let n = ops.write_blocks(&buf[..(seg as usize) << block_shift], block, seg)?;
        if n < seg {
            return Ok(n);
        }
    }

    // Blocks after the window.
    if end_u > protect_end {
        let overlap = protect_end.saturating_sub(block_u) as u32;
        let seg = count - overlap;
        let n = ops.write_blocks(
            &buf[(overlap as usize) << block_shift..],
            block + overlap,
            seg,
        )?;
        if n < seg {
            return Ok(n);
        }
    }

    Ok(count)
}
