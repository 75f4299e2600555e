use bitflags::bitflags;

use crate::geometry::{BlockAddr, Geometry};
use crate::protect::{self, ProtectedRange};
use crate::util::checked_end;
use crate::{compare, deblock, BlockError, Result};

/// Device names are bounded; registries are expected to hold a handful of
/// short, fixed names like `"nand0"` or `"nor0"`.
pub const MAX_NAME_LEN: usize = 16;

bitflags! {
    /// Behavior modifiers consumed by higher-level callers; the deblocking
    /// engines themselves ignore these.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeviceFlags: u32 {
        /// Writes do not implicitly erase; callers must erase first.
        const NEEDS_ERASE = 1 << 0;
        /// The device holds a partition upgrade in progress.
        const UPGRADE_PARTITION = 1 << 1;
    }
}

/// Required alignment for caller buffers on a device's native transfer path.
/// `NONE` (1 byte) places no constraint.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Alignment {
    bytes: u32,
}

impl Alignment {
    pub(crate) const NONE: Alignment = Alignment { bytes: 1 };

    fn new(bytes: u32) -> Self {
        Self { bytes }
    }

    pub(crate) fn bytes(&self) -> u32 {
        self.bytes
    }

    /// Distance of `ptr` past the previous aligned address; zero when the
    /// pointer satisfies the alignment.
    pub(crate) fn offset_of(&self, ptr: *const u8) -> usize {
        (ptr as usize) & (self.bytes as usize - 1)
    }
}

/// Operation hooks a medium driver supplies for one device.
///
/// Only the block-range primitives are mandatory. `read_blocks` and
/// `write_blocks` return the number of blocks actually moved: a count below
/// the request is a short transfer, `Ok(0)` and `Err` are hard failures.
/// The byte-range hooks are optional fast paths; returning `None` (the
/// default) selects the generic deblocking engine, which builds byte access
/// out of the block primitives and a bounce buffer.
pub trait BlockIo {
    fn read_blocks(&mut self, buf: &mut [u8], block: BlockAddr, count: u32) -> Result<u32>;

    fn write_blocks(&mut self, buf: &[u8], block: BlockAddr, count: u32) -> Result<u32>;

    /// Erase a byte range, for media whose writes do not implicitly erase.
    fn erase(&mut self, offset: u64, len: u64) -> Result<()> {
        let _ = (offset, len);
        Err(BlockError::Unsupported("erase"))
    }

    /// Byte-granular read override. `None` selects the deblocking engine.
    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> Option<Result<u64>> {
        let _ = (offset, buf);
        None
    }

    /// Byte-granular write override. `None` selects the deblocking engine.
    /// The override is still invoked per unprotected segment; it never sees
    /// bytes inside the device's protected range.
    fn write_bytes(&mut self, offset: u64, buf: &[u8]) -> Option<Result<u64>> {
        let _ = (offset, buf);
        None
    }
}

/// Descriptor for one block device: identity, geometry, buffer-alignment
/// requirement, an optional write-protected window, and the driver hooks.
///
/// A descriptor is constructed with [`BlockDev::new`], customized once by its
/// owning driver ([`set_buffer_alignment`](Self::set_buffer_alignment),
/// [`set_protection`](Self::set_protection), flags), and then registered;
/// both set-once fields refuse a second configuration without mutating state.
pub struct BlockDev {
    name: String,
    flags: DeviceFlags,
    geometry: Geometry,
    alignment: Option<Alignment>,
    protect: Option<ProtectedRange>,
    ops: Box<dyn BlockIo>,
}

impl BlockDev {
    pub fn new(name: &str, total_len: u64, block_size: u32, ops: Box<dyn BlockIo>) -> Result<Self> {
        if name.len() >= MAX_NAME_LEN {
            return Err(BlockError::NameTooLong { len: name.len() });
        }
        let geometry = Geometry::from_len(total_len, block_size)?;
        Ok(Self {
            name: name.to_owned(),
            flags: DeviceFlags::empty(),
            geometry,
            alignment: None,
            protect: None,
            ops,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: DeviceFlags) {
        self.flags = flags;
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn block_size(&self) -> u32 {
        self.geometry.block_size()
    }

    pub fn block_count(&self) -> u32 {
        self.geometry.block_count()
    }

    pub fn total_len(&self) -> u64 {
        self.geometry.total_len()
    }

    /// Required buffer alignment in bytes; 1 when unconfigured.
    pub fn alignment(&self) -> u32 {
        self.alignment.map_or(1, |a| a.bytes())
    }

    pub fn protected_range(&self) -> Option<ProtectedRange> {
        self.protect
    }

    /// Set the required alignment for read and write buffers. Set-once.
    ///
    /// The deblocking engines do not support an alignment requirement bigger
    /// than the block size; a driver that needs one should make its block
    /// size equal to the alignment and split transfers inside its block
    /// hooks.
    pub fn set_buffer_alignment(&mut self, alignment: u32) -> Result<()> {
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(BlockError::InvalidConfig(
                "alignment must be a power of two",
            ));
        }
        if alignment > self.geometry.block_size() {
            return Err(BlockError::AlignmentTooLarge {
                alignment,
                block_size: self.geometry.block_size(),
            });
        }
        if self.alignment.is_some() {
            return Err(BlockError::AlignmentAlreadySet);
        }
        self.alignment = Some(Alignment::new(alignment));
        Ok(())
    }

    /// Install the write-protected window `[offset, offset + length)`.
    /// Set-once: a second call fails and leaves the window unchanged.
    pub fn set_protection(&mut self, offset: u64, length: u64) -> Result<()> {
        let end = checked_end(offset, length)?;
        if length == 0 {
            return Err(BlockError::InvalidConfig(
                "protected range must not be empty",
            ));
        }
        if self.protect.is_some() {
            return Err(BlockError::ProtectionAlreadySet);
        }
        tracing::debug!(name = %self.name, start = offset, end, "protecting range");
        self.protect = Some(ProtectedRange { start: offset, end });
        Ok(())
    }

    /// Read `buf.len()` bytes starting at `offset`, returning the bytes read.
    ///
    /// The request is clipped to the device length; a start at or past the
    /// end reads nothing. When a block primitive fails mid-transfer the bytes
    /// moved so far are returned; compare against the request to detect
    /// truncation.
    pub fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<u64> {
        if let Some(result) = self.ops.read_bytes(offset, buf) {
            return result;
        }
        let align = self.alignment.unwrap_or(Alignment::NONE);
        deblock::read_bytes(&self.geometry, align, self.ops.as_mut(), offset, buf)
    }

    /// Write `buf` at `offset`, never touching the protected window, and
    /// return the bytes written.
    ///
    /// The request is split around the protected window; bytes falling inside
    /// it are silently discarded, so a request wholly inside the window
    /// reports success with 0 bytes. When both ends of a request overhang the
    /// window, a short transfer on the trailing segment cannot be told apart
    /// from a short leading segment by the returned count alone.
    pub fn write(&mut self, offset: u64, buf: &[u8]) -> Result<u64> {
        protect::write_bytes_protected(self, offset, buf)
    }

    /// Read whole blocks through the driver primitive.
    pub fn read_blocks(&mut self, buf: &mut [u8], block: BlockAddr, count: u32) -> Result<u32> {
        check_block_buf(buf.len(), self.geometry.block_shift(), count)?;
        self.ops.read_blocks(buf, block, count)
    }

    /// Write whole blocks, skipping any that lie inside the protected window.
    ///
    /// Skipped blocks are still acknowledged in the returned count, so a
    /// fully successful call always reports `count`; a short transfer reports
    /// the short segment's count alone.
    pub fn write_blocks(&mut self, buf: &[u8], block: BlockAddr, count: u32) -> Result<u32> {
        check_block_buf(buf.len(), self.geometry.block_shift(), count)?;
        protect::write_blocks_protected(
            self.ops.as_mut(),
            self.protect,
            self.geometry.block_shift(),
            buf,
            block,
            count,
        )
    }

    /// Erase a byte range via the driver hook. Not routed through the
    /// protection splitter.
    pub fn erase(&mut self, offset: u64, len: u64) -> Result<()> {
        self.ops.erase(offset, len)
    }

    /// Count the bytes at which `mem` differs from the device contents
    /// starting at `offset`. A read failure or short read is an error,
    /// distinct from `Ok(0)`.
    pub fn compare(&mut self, mem: &[u8], offset: u64) -> Result<u64> {
        compare::compare(self, mem, offset)
    }

    /// Byte-range write bypassing the protection splitter. Used by the
    /// splitter itself for each unprotected segment.
    pub(crate) fn write_unprotected(&mut self, offset: u64, buf: &[u8]) -> Result<u64> {
        if let Some(result) = self.ops.write_bytes(offset, buf) {
            return result;
        }
        let align = self.alignment.unwrap_or(Alignment::NONE);
        deblock::write_bytes(
            &self.geometry,
            align,
            self.protect,
            self.ops.as_mut(),
            offset,
            buf,
        )
    }
}

impl std::fmt::Debug for BlockDev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockDev")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("geometry", &self.geometry)
            .field("alignment", &self.alignment())
            .field("protect", &self.protect)
            .finish_non_exhaustive()
    }
}

fn check_block_buf(buf_len: usize, block_shift: u32, count: u32) -> Result<()> {
    if buf_len >> block_shift < count as usize {
        return Err(BlockError::InvalidConfig(
            "buffer too small for block count",
        ));
    }
    Ok(())
}
