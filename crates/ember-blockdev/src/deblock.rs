//! Generic deblocking engines: byte-range reads and writes built from the
//! block-range primitives of a [`BlockIo`] driver.
//!
//! Every request decomposes into a partial head block, a run of whole middle
//! blocks, and a partial tail block. Partial blocks and misaligned caller
//! buffers are staged through a bounce buffer; aligned whole-block runs go
//! straight to the driver in a single call.

use crate::bounce::BounceBuffer;
use crate::device::{Alignment, BlockIo};
use crate::geometry::{BlockAddr, Geometry};
use crate::protect::{self, ProtectedRange};
use crate::Result;

/// Outcome of one block-primitive call inside an engine loop. A failed or
/// empty transfer ends the request; the engine then reports the bytes moved
/// so far and leaves truncation detection to the caller.
fn completed(result: Result<u32>) -> Option<u32> {
    match result {
        Ok(n) if n > 0 => Some(n),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(%err, "block transfer failed");
            None
        }
    }
}

/// Default byte-range read: deblocks the device via its `read_blocks`
/// primitive.
pub(crate) fn read_bytes(
    geo: &Geometry,
    align: Alignment,
    ops: &mut dyn BlockIo,
    offset: u64,
    buf: &mut [u8],
) -> Result<u64> {
    if offset >= geo.total_len() || buf.is_empty() {
        return Ok(0);
    }
    let len = (buf.len() as u64).min(geo.total_len() - offset) as usize;
    let block_size = geo.block_size() as usize;
    let shift = geo.block_shift();

    let mut block = geo.block_of(offset) as BlockAddr;
    let mut pos = 0usize;
    let mut remaining = len;
    let mut bounce: Option<BounceBuffer> = None;

    // Partial first block, or a destination start the device cannot transfer
    // into directly.
    let head = geo.offset_in_block(offset);
    if head != 0 || align.offset_of(buf.as_ptr()) != 0 {
        let toread = remaining.min(block_size - head);
        let scratch = BounceBuffer::ensure(&mut bounce, geo, align)?;
        if completed(ops.read_blocks(scratch.as_mut_slice(), block, 1)).is_none() {
            return Ok(pos as u64);
        }
        buf[pos..pos + toread].copy_from_slice(&scratch.as_slice()[head..head + toread]);
        block += 1;
        pos += toread;
        remaining -= toread;
    }

    // Whole middle blocks.
    while remaining >= block_size {
        let blocks_to_read = (remaining >> shift) as u32;
        let misalign = align.offset_of(buf[pos..].as_ptr());
        let result = if misalign == 0 {
            let span = (blocks_to_read as usize) << shift;
            ops.read_blocks(&mut buf[pos..pos + span], block, blocks_to_read)
        } else if blocks_to_read > 1 {
            // Shift the landing zone forward to the next aligned address
            // inside the destination, read one block less, then move the data
            // down into place. Relies on alignment <= block size.
            let dst = pos + align.bytes() as usize - misalign;
            let span = ((blocks_to_read - 1) as usize) << shift;
            let result = ops.read_blocks(&mut buf[dst..dst + span], block, blocks_to_read - 1);
            if let Ok(n) = result {
                let nbytes = (n as usize) << shift;
                buf.copy_within(dst..dst + nbytes, pos);
            }
            result
        } else {
            let scratch = BounceBuffer::ensure(&mut bounce, geo, align)?;
            let result = ops.read_blocks(scratch.as_mut_slice(), block, 1);
            if matches!(result, Ok(n) if n > 0) {
                buf[pos..pos + block_size].copy_from_slice(&scratch.as_slice()[..block_size]);
            }
            result
        };

        let Some(n) = completed(result) else {
            return Ok(pos as u64);
        };
        let nbytes = (n as usize) << shift;
        block += n;
        pos += nbytes;
        remaining -= nbytes;
    }

    // Partial last block.
    if remaining > 0 {
        let scratch = BounceBuffer::ensure(&mut bounce, geo, align)?;
        if completed(ops.read_blocks(scratch.as_mut_slice(), block, 1)).is_none() {
            return Ok(pos as u64);
        }
        buf[pos..pos + remaining].copy_from_slice(&scratch.as_slice()[..remaining]);
        pos += remaining;
    }

    Ok(pos as u64)
}

/// Default byte-range write: deblocks the device via its block primitives.
///
/// Partial blocks are read-modify-write so the untouched portion of the block
/// survives. Block writes go through the block-granular protection splitter
/// so a protected window is honored even on this path.
pub(crate) fn write_bytes(
    geo: &Geometry,
    align: Alignment,
    protect: Option<ProtectedRange>,
    ops: &mut dyn BlockIo,
    offset: u64,
    buf: &[u8],
) -> Result<u64> {
    if offset >= geo.total_len() || buf.is_empty() {
        return Ok(0);
    }
    let len = (buf.len() as u64).min(geo.total_len() - offset) as usize;
    let block_size = geo.block_size() as usize;
    let shift = geo.block_shift();

    let mut block = geo.block_of(offset) as BlockAddr;
    let mut pos = 0usize;
    let mut remaining = len;
    let mut bounce: Option<BounceBuffer> = None;

    // Read-modify-write a partial first block.
    let head = geo.offset_in_block(offset);
    if head != 0 {
        let towrite = remaining.min(block_size - head);
        let scratch = BounceBuffer::ensure(&mut bounce, geo, align)?;
        if completed(ops.read_blocks(scratch.as_mut_slice(), block, 1)).is_none() {
            return Ok(pos as u64);
        }
        scratch.as_mut_slice()[head..head + towrite].copy_from_slice(&buf[pos..pos + towrite]);
        let written = protect::write_blocks_protected(ops, protect, shift, scratch.as_slice(), block, 1);
        if completed(written).is_none() {
            return Ok(pos as u64);
        }
        block += 1;
        pos += towrite;
        remaining -= towrite;
    }

    // Whole middle blocks.
    while remaining >= block_size {
        let misalign = align.offset_of(buf[pos..].as_ptr());
        let result = if misalign == 0 {
            let blocks_to_write = (remaining >> shift) as u32;
            let span = (blocks_to_write as usize) << shift;
            protect::write_blocks_protected(
                ops,
                protect,
                shift,
                &buf[pos..pos + span],
                block,
                blocks_to_write,
            )
        } else {
            // Misaligned source: bounce one block at a time. Large misaligned
            // writes are not a performance concern here.
            let scratch = BounceBuffer::ensure(&mut bounce, geo, align)?;
            scratch.as_mut_slice()[..block_size].copy_from_slice(&buf[pos..pos + block_size]);
            protect::write_blocks_protected(ops, protect, shift, scratch.as_slice(), block, 1)
        };

        let Some(n) = completed(result) else {
            return Ok(pos as u64);
        };
        let nbytes = (n as usize) << shift;
        block += n;
        pos += nbytes;
        remaining -= nbytes;
    }

    // Read-modify-write a partial last block.
    if remaining > 0 {
        let scratch = BounceBuffer::ensure(&mut bounce, geo, align)?;
        if completed(ops.read_blocks(scratch.as_mut_slice(), block, 1)).is_none() {
            return Ok(pos as u64);
        }
        scratch.as_mut_slice()[..remaining].copy_from_slice(&buf[pos..pos + remaining]);
        let written = protect::write_blocks_protected(ops, protect, shift, scratch.as_slice(), block, 1);
        if completed(written).is_none() {
            return Ok(pos as u64);
        }
        pos += remaining;
    }

    Ok(pos as u64)
}
