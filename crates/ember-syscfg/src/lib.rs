//! Read-only access to a factory configuration area stored on a block
//! device.
//!
//! The area lives at a fixed byte offset on its device: a little-endian
//! header, a table of fixed-size tagged entries, and an optional region of
//! out-of-line data that oversized entries point into. Small values sit
//! inline in their table slot; larger ones are stored through an indirection
//! record carrying the real tag, size, and snapshot offset.
//!
//! Discovery reads the whole area into an in-memory snapshot once and
//! installs a write-protected window over the surrounding region of the
//! device, so later byte-range writes cannot clobber the factory data. All
//! lookups then run against the snapshot.

use ember_blockdev::{BlockDev, BlockError, DeviceHandle, DeviceRegistry};
use thiserror::Error;

/// Byte offset of the configuration area on its device.
pub const SYSCFG_OFFSET: u64 = 0x4000;

/// Header magic, `"SCfg"` read as a big-endian word.
pub const SYSCFG_MAGIC: u32 = 0x5343_6667;

/// Entry tag marking an indirection record, `"CNTB"`.
pub const CNTB_MAGIC: u32 = 0x434e_5442;

/// Protected window installed on the device at discovery. The area shares
/// its neighborhood with other factory data, so the window is wider than the
/// configuration area itself.
pub const PROTECTED_START: u64 = 0x2000;
pub const PROTECTED_LEN: u64 = 0x6000;

pub const HEADER_LEN: usize = 24;
pub const ENTRY_LEN: usize = 20;
pub const INLINE_DATA_LEN: usize = 16;

/// Pack a four-character tag into its numeric form.
pub const fn tag(name: [u8; 4]) -> u32 {
    u32::from_be_bytes(name)
}

#[derive(Debug, Error)]
pub enum SysCfgError {
    #[error("block device {0:?} is not registered")]
    DeviceNotFound(String),
    #[error("device too small to hold a config area at {offset:#x}")]
    DeviceTooSmall { offset: u64 },
    #[error("short read at {offset:#x}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        offset: u64,
        wanted: usize,
        got: usize,
    },
    #[error("bad config area magic {found:#010x}")]
    BadMagic { found: u32 },
    #[error(transparent)]
    Device(#[from] BlockError),
}

pub type Result<T> = std::result::Result<T, SysCfgError>;

fn le_u32(raw: &[u8]) -> u32 {
    u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
}

/// On-medium header of the configuration area. All fields little-endian.
#[derive(Debug, Clone, Copy)]
struct Header {
    /// Bytes used by the header and entry table.
    size: u32,
    /// Capacity of the whole area, including out-of-line data.
    max_size: u32,
    version: u32,
    key_count: u32,
}

impl Header {
    fn parse(raw: &[u8; HEADER_LEN]) -> Result<Self> {
        let magic = le_u32(&raw[0..4]);
        if magic != SYSCFG_MAGIC {
            return Err(SysCfgError::BadMagic { found: magic });
        }
        Ok(Self {
            size: le_u32(&raw[4..8]),
            max_size: le_u32(&raw[8..12]),
            version: le_u32(&raw[12..16]),
            // raw[16..20] flags the byte order; every deployed area is
            // little-endian, matching the parse above.
            key_count: le_u32(&raw[20..24]),
        })
    }
}

/// Where an entry's payload lives, as an offset into the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload {
    /// In the entry's own table slot.
    Inline(usize),
    /// Out of line, at an offset the indirection record named.
    External(u32),
}

/// One decoded entry: a four-character tag and its payload. Indirection
/// records are resolved during decoding; the tag seen here is always the
/// real one.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub tag: u32,
    size: u32,
    payload: Payload,
}

impl Entry {
    pub fn size(&self) -> u32 {
        self.size
    }
}

/// In-memory snapshot of one device's configuration area.
pub struct SysCfg {
    data: Vec<u8>,
    version: u32,
    key_count: u32,
}

impl SysCfg {
    /// Discover the configuration area on the named registered device.
    pub fn from_registry(registry: &DeviceRegistry, name: &str) -> Result<Self> {
        let handle = registry
            .lookup(name)
            .ok_or_else(|| SysCfgError::DeviceNotFound(name.to_owned()))?;
        Self::from_device(&handle)
    }

    /// Discover the configuration area at its usual offset on `dev`.
    pub fn from_device(dev: &DeviceHandle) -> Result<Self> {
        Self::read_from(&mut dev.borrow_mut(), SYSCFG_OFFSET)
    }

    /// Read and validate the area at `offset`, snapshot it, and protect the
    /// factory region of the device. An already-installed protected window
    /// is left as it is.
    pub fn read_from(dev: &mut BlockDev, offset: u64) -> Result<Self> {
        let total_len = dev.total_len();
        if total_len <= offset + HEADER_LEN as u64 {
            return Err(SysCfgError::DeviceTooSmall { offset });
        }

        let mut raw = [0u8; HEADER_LEN];
        let got = dev.read(offset, &mut raw)? as usize;
        if got < HEADER_LEN {
            return Err(SysCfgError::ShortRead {
                offset,
                wanted: HEADER_LEN,
                got,
            });
        }
        let header = Header::parse(&raw)?;

        tracing::debug!(
            device = %dev.name(),
            version = format_args!("{:#010x}", header.version),
            entries = header.key_count,
            used = header.size,
            capacity = header.max_size,
            "found config area"
        );

        // A config area implies neighboring factory data; protect both.
        match dev.set_protection(PROTECTED_START, PROTECTED_LEN) {
            Ok(()) | Err(BlockError::ProtectionAlreadySet) => {}
            Err(err) => return Err(err.into()),
        }

        // The header's used size does not cover out-of-line data, so when it
        // undershoots the device remainder, snapshot the area's full
        // capacity instead (clipped to the device).
        let remaining = total_len - offset;
        let snapshot_len = if (header.size as u64) < remaining {
            (header.max_size as u64).min(remaining)
        } else {
            remaining
        } as usize;

        let mut data = vec![0u8; snapshot_len];
        let got = dev.read(offset, &mut data)? as usize;
        if got < snapshot_len {
            return Err(SysCfgError::ShortRead {
                offset,
                wanted: snapshot_len,
                got,
            });
        }

        Ok(Self {
            data,
            version: header.version,
            key_count: header.key_count,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn key_count(&self) -> u32 {
        self.key_count
    }

    /// Decode the entry in table slot `index`. `None` past the advertised
    /// key count or if the slot falls outside the snapshot.
    pub fn entry_by_index(&self, index: u32) -> Option<Entry> {
        if index >= self.key_count {
            return None;
        }
        let start = HEADER_LEN + index as usize * ENTRY_LEN;
        let slot = self.data.get(start..start + ENTRY_LEN)?;

        let slot_tag = le_u32(&slot[0..4]);
        if slot_tag == CNTB_MAGIC {
            Some(Entry {
                tag: le_u32(&slot[4..8]),
                size: le_u32(&slot[8..12]),
                payload: Payload::External(le_u32(&slot[12..16])),
            })
        } else {
            Some(Entry {
                tag: slot_tag,
                size: INLINE_DATA_LEN as u32,
                payload: Payload::Inline(start + 4),
            })
        }
    }

    /// Find the first entry carrying `tag`.
    pub fn entry_by_tag(&self, tag: u32) -> Option<Entry> {
        (0..self.key_count)
            .filter_map(|index| self.entry_by_index(index))
            .find(|entry| entry.tag == tag)
    }

    /// The payload bytes of `entry`. `None` when an out-of-line payload
    /// escapes the snapshot.
    pub fn data(&self, entry: &Entry) -> Option<&[u8]> {
        let start = match entry.payload {
            Payload::Inline(start) => start,
            Payload::External(offset) => offset as usize,
        };
        let end = start.checked_add(entry.size as usize)?;
        self.data.get(start..end)
    }

    /// Look up `tag` and return its payload bytes.
    pub fn find_tag(&self, tag: u32) -> Option<&[u8]> {
        self.data(&self.entry_by_tag(tag)?)
    }

    /// Copy the payload of `tag` into `out`, truncating to whichever of the
    /// payload and `out` is shorter. Returns the bytes copied, or `None` if
    /// the tag is absent or its payload invalid.
    pub fn copy_tag_data(&self, tag: u32, out: &mut [u8]) -> Option<usize> {
        let entry = self.entry_by_tag(tag)?;
        let data = self.data(&entry)?;
        let n = out.len().min(data.len());
        out[..n].copy_from_slice(&data[..n]);
        Some(n)
    }

    /// Iterate over every decodable entry in table order.
    pub fn entries(&self) -> impl Iterator<Item = Entry> + '_ {
        (0..self.key_count).filter_map(|index| self.entry_by_index(index))
    }
}

impl std::fmt::Debug for SysCfg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysCfg")
            .field("version", &self.version)
            .field("key_count", &self.key_count)
            .field("snapshot_len", &self.data.len())
            .finish()
    }
}
