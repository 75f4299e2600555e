//! Block-device abstraction layer for firmware-style environments.
//!
//! Storage media transfer fixed-size blocks, but callers want arbitrary byte
//! ranges. This crate provides:
//!
//! - [`BlockDev`]: device descriptor with geometry, a buffer-alignment
//!   requirement, and an optional write-protected window
//! - [`BlockIo`]: the hook trait medium drivers implement (block-range
//!   primitives plus optional byte-range fast paths and erase)
//! - generic deblocking read/write engines, used whenever a driver supplies
//!   only the block primitives
//! - a protection splitter that keeps write traffic out of the protected
//!   window by splitting requests around it
//! - [`DeviceRegistry`]: named lookup and enumeration of devices
//! - [`mem_blockdev`] / [`sub_blockdev`]: a memory-backed device and a
//!   device exposing a sub-range of another device
//!
//! The layer is synchronous and single-threaded: devices are registered
//! during an initialization phase and accessed one operation at a time.

mod bounce;
mod compare;
mod deblock;
mod device;
mod error;
mod geometry;
mod mem;
mod protect;
mod registry;
mod subdev;
mod util;

pub use bounce::CACHE_LINE_SIZE;
pub use device::{BlockDev, BlockIo, DeviceFlags, MAX_NAME_LEN};
pub use error::{BlockError, Result};
pub use geometry::{BlockAddr, Geometry};
pub use mem::{mem_blockdev, MemDevice};
pub use protect::ProtectedRange;
pub use registry::{DeviceHandle, DeviceRegistry};
pub use subdev::{sub_blockdev, SubDevice};

#[cfg(test)]
mod proptests;
