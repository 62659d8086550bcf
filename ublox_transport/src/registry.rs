use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use log::debug;

use crate::{
    config::DeviceConfig,
    device::Device,
    error::{Error, Result},
    transport::Transport,
};

/// Identifies a connection opened through a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(u64);

#[derive(Default)]
struct Connections {
    next: u64,
    devices: HashMap<DeviceHandle, Arc<Device>>,
}

/// The set of open receiver connections.
///
/// Owned by whoever opens connections; there is no process-wide instance.
#[derive(Default)]
pub struct Registry {
    connections: Mutex<Connections>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn connections(&self) -> MutexGuard<'_, Connections> {
        self.connections.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens a connection over `transport`.
    pub fn open<T: Transport + 'static>(
        &self,
        transport: T,
        config: DeviceConfig,
    ) -> Result<DeviceHandle> {
        let device = Arc::new(Device::new(transport, config)?);
        let mut connections = self.connections();
        let handle = DeviceHandle(connections.next);
        connections.next += 1;
        connections.devices.insert(handle, device);
        debug!("opened connection {}", handle.0);
        Ok(handle)
    }

    pub fn get(&self, handle: DeviceHandle) -> Result<Arc<Device>> {
        self.connections()
            .devices
            .get(&handle)
            .cloned()
            .ok_or(Error::NotFound)
    }

    /// Closes a connection, stopping its asynchronous receive task and
    /// returning that task's cursor.
    ///
    /// Clones handed out by [`Registry::get`] stay usable for blocking
    /// operations; the blocking cursor, the ring buffer and the transport are
    /// released when the last of them is dropped.
    pub fn close(&self, handle: DeviceHandle) -> Result<()> {
        let device = self
            .connections()
            .devices
            .remove(&handle)
            .ok_or(Error::NotFound)?;
        device.receive_stop_all();
        debug!("closed connection {}", handle.0);
        Ok(())
    }

    /// Closes every connection.
    pub fn close_all(&self) {
        let devices: Vec<_> = self.connections().devices.drain().collect();
        for (_, device) in devices {
            device.receive_stop_all();
        }
    }

    pub fn handles(&self) -> Vec<DeviceHandle> {
        let mut handles: Vec<_> = self.connections().devices.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    pub fn len(&self) -> usize {
        self.connections().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.close_all();
    }
}
