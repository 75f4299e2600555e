use crate::device::Alignment;
use crate::geometry::Geometry;
use crate::{BlockError, Result};

/// Platform cache-line size; bounce buffers are never aligned more loosely
/// than this so DMA-capable drivers can use them directly.
pub const CACHE_LINE_SIZE: usize = 64;

/// Alignment-satisfying scratch buffer used to stage a block transfer when
/// the caller's buffer or offset cannot be handed to the block primitive
/// directly.
///
/// Sized to hold one block (`max(alignment, block_size)`), aligned to
/// `max(alignment, CACHE_LINE_SIZE)`. The buffer is owned by the call that
/// allocated it and freed when it goes out of scope.
pub(crate) struct BounceBuffer {
    storage: Vec<u8>,
    start: usize,
    len: usize,
}

impl BounceBuffer {
    pub(crate) fn new(geo: &Geometry, align: Alignment) -> Result<Self> {
        let len = align.bytes().max(geo.block_size()) as usize;
        let align_to = (align.bytes() as usize).max(CACHE_LINE_SIZE);
        Self::with_layout(len, align_to)
    }

    /// Scratch buffer with an explicit size and alignment.
    pub(crate) fn with_layout(len: usize, align_to: usize) -> Result<Self> {
        let capacity = len
            .checked_add(align_to)
            .ok_or(BlockError::BounceAlloc { size: len })?;
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| BlockError::BounceAlloc { size: capacity })?;
        storage.resize(capacity, 0);
        let addr = storage.as_ptr() as usize;
        let start = addr.next_multiple_of(align_to) - addr;
        Ok(Self { storage, start, len })
    }

    /// Allocate the buffer in `slot` on first use; reuse it afterwards.
    pub(crate) fn ensure<'a>(
        slot: &'a mut Option<BounceBuffer>,
        geo: &Geometry,
        align: Alignment,
    ) -> Result<&'a mut BounceBuffer> {
        match slot.take() {
            Some(buf) => Ok(slot.insert(buf)),
            None => Ok(slot.insert(BounceBuffer::new(geo, align)?)),
        }
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.storage[self.start..self.start + self.len]
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        let start = self.start;
        &mut self.storage[start..start + self.len]
    }
}
