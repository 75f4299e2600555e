use crate::bounce::{BounceBuffer, CACHE_LINE_SIZE};
use crate::device::BlockDev;
use crate::{BlockError, Result};

/// Count the bytes at which `mem` differs from the device contents starting
/// at `offset`, streaming block-size chunks through the byte-read path.
pub(crate) fn compare(dev: &mut BlockDev, mem: &[u8], offset: u64) -> Result<u64> {
    let block_size = dev.block_size() as usize;
    let mut scratch = BounceBuffer::with_layout(block_size, CACHE_LINE_SIZE)?;
    let mut diffs = 0u64;
    let mut offset = offset;
    let mut pos = 0usize;

    while pos < mem.len() {
        let toread = block_size.min(mem.len() - pos);
        let got = dev.read(offset, &mut scratch.as_mut_slice()[..toread])? as usize;
        if got < toread {
            tracing::warn!(offset, wanted = toread, got, "short read while comparing");
            return Err(BlockError::ShortRead {
                offset,
                wanted: toread,
                got,
            });
        }

        diffs += scratch.as_slice()[..toread]
            .iter()
            .zip(&mem[pos..pos + toread])
            .filter(|(dev_byte, mem_byte)| dev_byte != mem_byte)
            .count() as u64;

        pos += toread;
        offset += toread as u64;
    }

    Ok(diffs)
}
