use std::cell::RefCell;
use std::rc::Rc;

use crate::device::BlockDev;

/// Shared handle to a registered device. The layer is single-threaded by
/// design; `Rc<RefCell<_>>` makes the no-locking model explicit and lets
/// stacked devices (see [`sub_blockdev`](crate::sub_blockdev)) keep a handle
/// to their parent.
pub type DeviceHandle = Rc<RefCell<BlockDev>>;

/// Collection of registered devices, owned by the composition root and
/// passed by reference to anything that needs lookup.
///
/// Devices are never removed. Lookup and enumeration both run in
/// reverse-registration order (most recently registered first), so on a
/// duplicate name the most recent registration wins.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceHandle>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, dev: BlockDev) -> DeviceHandle {
        tracing::debug!(name = %dev.name(), blocks = dev.block_count(), "registering block device");
        let handle = Rc::new(RefCell::new(dev));
        self.devices.push(Rc::clone(&handle));
        handle
    }

    pub fn lookup(&self, name: &str) -> Option<DeviceHandle> {
        self.devices
            .iter()
            .rev()
            .find(|dev| dev.borrow().name() == name)
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
