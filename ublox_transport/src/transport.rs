use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::error::Result;

/// Raw byte link to a receiver (UART, I2C, SPI, a replayed capture, ...).
///
/// Implementations contain no protocol logic. [`Transport::read`] must not
/// block for long: returning `Ok(0)` when nothing is pending lets the ring
/// buffer apply its own wait policy.
pub trait Transport: Send {
    /// Writes `data`, returning the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Reads whatever is pending into `buf`; `Ok(0)` means nothing is available yet.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Transports driven by AT commands deliver responses rather than a
    /// message stream; those return `false` and cannot be used for receiving.
    fn supports_streaming(&self) -> bool {
        true
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn supports_streaming(&self) -> bool {
        (**self).supports_streaming()
    }
}

#[derive(Debug, Default)]
struct MemoryLink {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    max_read: Option<usize>,
}

/// In-process transport: bytes injected through a [`MemoryTransportHandle`]
/// are what the receiver "sends", and everything written is recorded.
#[derive(Debug)]
pub struct MemoryTransport {
    link: Arc<Mutex<MemoryLink>>,
    streaming: bool,
}

/// The far end of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryTransportHandle {
    link: Arc<Mutex<MemoryLink>>,
}

fn lock(link: &Mutex<MemoryLink>) -> MutexGuard<'_, MemoryLink> {
    link.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryTransportHandle) {
        let link = Arc::new(Mutex::new(MemoryLink::default()));
        (
            Self {
                link: link.clone(),
                streaming: true,
            },
            MemoryTransportHandle { link },
        )
    }

    /// A transport that refuses streaming receive, like an AT-command link.
    pub fn non_streaming() -> (Self, MemoryTransportHandle) {
        let (mut transport, handle) = Self::new();
        transport.streaming = false;
        (transport, handle)
    }
}

impl Transport for MemoryTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        lock(&self.link).tx.extend_from_slice(data);
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut link = lock(&self.link);
        let n = buf
            .len()
            .min(link.rx.len())
            .min(link.max_read.unwrap_or(usize::MAX));
        for (dst, src) in buf.iter_mut().zip(link.rx.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }
}

impl MemoryTransportHandle {
    /// Queues bytes to be read by the transport.
    pub fn inject(&self, data: &[u8]) {
        lock(&self.link).rx.extend(data);
    }

    /// Returns and clears everything written to the transport so far.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.link).tx)
    }

    /// Bytes injected but not read yet.
    pub fn pending(&self) -> usize {
        lock(&self.link).rx.len()
    }

    /// Caps how many bytes a single read returns, to mimic a slow link.
    pub fn set_max_read(&self, max: Option<usize>) {
        lock(&self.link).max_read = max;
    }
}
