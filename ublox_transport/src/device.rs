use std::{
    io,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::{Duration, Instant},
};

use log::{debug, trace};

use crate::{
    classify::next_message,
    codec,
    config::DeviceConfig,
    constants::{UBX_CLASS_ACK, UBX_HEADER_LEN, UBX_ID_ACK_ACK, UBX_ID_ACK_NAK},
    dispatch::{AsyncReceiver, MessageReader, SubscriberHandle},
    error::{Error, Result},
    message_id::{MessageId, Protocols, UbxMessageId},
    ring::{ReadHandle, RingBuffer},
    transport::Transport,
};

/// State shared between a [`Device`] and its asynchronous receive task.
pub(crate) struct Shared {
    pub(crate) config: DeviceConfig,
    pub(crate) ring: RingBuffer,
    transport: Mutex<Box<dyn Transport>>,
}

impl Shared {
    fn transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves pending transport bytes into the ring buffer, waiting at most `max_wait`.
    pub(crate) fn fill(&self, max_wait: Duration) -> Result<usize> {
        let max_wait = max_wait.min(self.config.fill_max_wait);
        self.ring.fill(
            |buf| self.transport().read(buf),
            self.config.fill_min_wait.min(max_wait),
            max_wait,
        )
    }
}

/// A message taken off the stream by a blocking receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub id: MessageId,
    /// The whole frame, framing and checksum included.
    pub frame: Vec<u8>,
    pub body_len: usize,
}

impl ReceivedMessage {
    pub fn body(&self) -> &[u8] {
        let start = self.id.body_offset();
        self.frame.get(start..start + self.body_len).unwrap_or(&[])
    }
}

enum Scan<T> {
    Found(T),
    Nack { class: u8, id: u8 },
}

/// One connection to a receiver.
///
/// Owns the transport, the ring buffer both receive paths read from, the
/// cursor used by blocking receives and, while any subscriber exists, the
/// asynchronous receive task.
pub struct Device {
    shared: Arc<Shared>,
    receiver: Mutex<ReadHandle>,
    streaming: bool,
    async_rx: AsyncReceiver,
}

impl Device {
    pub fn new<T: Transport + 'static>(transport: T, config: DeviceConfig) -> Result<Self> {
        Self::from_boxed(Box::new(transport), config)
    }

    pub fn from_boxed(transport: Box<dyn Transport>, config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        let ring = RingBuffer::with_fill_chunk(
            config.ring_capacity,
            config.max_read_handles,
            config.read_chunk,
        )?;
        let receiver = ring.take_read_handle()?;
        let streaming = transport.supports_streaming();
        let async_rx = AsyncReceiver::new(config.max_subscribers);
        debug!(
            "device opened, ring buffer {} bytes, streaming {streaming}",
            config.ring_capacity
        );
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                ring,
                transport: Mutex::new(transport),
            }),
            receiver: Mutex::new(receiver),
            streaming,
            async_rx,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }

    fn ensure_streaming(&self) -> Result<()> {
        if self.streaming {
            Ok(())
        } else {
            Err(Error::NotSupported)
        }
    }

    fn receiver(&self) -> MutexGuard<'_, ReadHandle> {
        self.receiver.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Writes raw bytes to the transport, bypassing the ring buffer.
    pub fn send(&self, data: &[u8]) -> Result<usize> {
        let mut transport = self.shared.transport();
        let mut written = 0;
        while written < data.len() {
            match transport.write(&data[written..])? {
                0 => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                n => written += n,
            }
        }
        Ok(written)
    }

    /// Encodes and sends one UBX message.
    pub fn send_ubx(&self, class: u8, id: u8, body: &[u8]) -> Result<usize> {
        let frame = codec::encode(class, id, body)?;
        trace!("sending UBX {class:#04x}/{id:#04x}, {} byte body", body.len());
        self.send(&frame)
    }

    /// Sends a UBX poll or request and waits for the message of the same class
    /// and id that answers it.
    ///
    /// Buffered data is flushed first, so a message that arrived before the
    /// request was sent cannot be mistaken for the answer.
    pub fn send_receive_ubx(
        &self,
        class: u8,
        id: u8,
        body: &[u8],
        timeout: Duration,
    ) -> Result<ReceivedMessage> {
        self.flush(false);
        self.send_ubx(class, id, body)?;
        self.receive(&MessageId::ubx(class, id), timeout)
    }

    /// Sends a UBX command and waits for the UBX-ACK-ACK or UBX-ACK-NAK
    /// referencing it. A NAK is reported as [`Error::Nack`].
    pub fn send_ubx_with_ack(&self, class: u8, id: u8, body: &[u8], timeout: Duration) -> Result<()> {
        self.flush(false);
        self.send_ubx(class, id, body)?;

        let start = Instant::now();
        let ack = MessageId::Ubx(UbxMessageId::class(UBX_CLASS_ACK));
        loop {
            let remaining = timeout.saturating_sub(start.elapsed());
            let msg = self.receive(&ack, remaining)?;
            if msg.body() != [class, id] {
                trace!("ignoring acknowledgement for another message");
                continue;
            }
            return match msg.id.concrete_ubx() {
                Some((_, UBX_ID_ACK_ACK)) => Ok(()),
                Some((_, UBX_ID_ACK_NAK)) => {
                    debug!("UBX {class:#04x}/{id:#04x} not acknowledged");
                    Err(Error::Nack { class, id })
                },
                _ => continue,
            };
        }
    }

    /// Waits up to `timeout` for a message matching `wanted` and returns it.
    pub fn receive(&self, wanted: &MessageId, timeout: Duration) -> Result<ReceivedMessage> {
        self.receive_with(wanted, timeout, || true)
    }

    /// As [`Device::receive`], calling `keep_going` once per poll; returning
    /// `false` abandons the receive with [`Error::Cancelled`].
    pub fn receive_with<F>(
        &self,
        wanted: &MessageId,
        timeout: Duration,
        keep_going: F,
    ) -> Result<ReceivedMessage>
    where
        F: FnMut() -> bool,
    {
        self.receive_frame(wanted, timeout, keep_going, |ring, handle, id, frame_len, body_len| {
            let mut frame = Vec::new();
            frame
                .try_reserve_exact(frame_len)
                .map_err(|_| Error::NoMemory)?;
            frame.resize(frame_len, 0);
            ring.read_handle(handle, &mut frame);
            Ok(ReceivedMessage {
                id,
                frame,
                body_len,
            })
        })
    }

    /// Copies as much of the next frame matching `wanted` as fits into `dest`
    /// and returns its body length. The whole frame is consumed either way.
    pub fn receive_into<F>(
        &self,
        wanted: &MessageId,
        dest: &mut [u8],
        timeout: Duration,
        keep_going: F,
    ) -> Result<usize>
    where
        F: FnMut() -> bool,
    {
        self.receive_frame(wanted, timeout, keep_going, |ring, handle, _, frame_len, body_len| {
            let dest_len = dest.len();
            let copied = ring.read_handle(handle, &mut dest[..frame_len.min(dest_len)]);
            ring.discard_handle(handle, frame_len - copied);
            Ok(body_len)
        })
    }

    fn receive_frame<F, T, G>(
        &self,
        wanted: &MessageId,
        timeout: Duration,
        mut keep_going: F,
        mut take: G,
    ) -> Result<T>
    where
        F: FnMut() -> bool,
        G: FnMut(&RingBuffer, &ReadHandle, MessageId, usize, usize) -> Result<T>,
    {
        self.ensure_streaming()?;
        let handle = self.receiver();
        let ring = &self.shared.ring;
        let nack_for = wanted.concrete_ubx();
        let protocols = wanted.protocols();

        let start = Instant::now();
        loop {
            if !keep_going() {
                return Err(Error::Cancelled);
            }
            let remaining = timeout.saturating_sub(start.elapsed());
            self.shared.fill(remaining)?;

            ring.lock_read_handle(&handle);
            let scan = Self::scan(ring, &handle, wanted, protocols, nack_for, &mut take);
            ring.unlock_read_handle(&handle);
            match scan {
                Some(Scan::Found(found)) => return found,
                Some(Scan::Nack { class, id }) => {
                    debug!("UBX {class:#04x}/{id:#04x} not acknowledged");
                    return Err(Error::Nack { class, id });
                },
                None => {},
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(Error::Timeout);
            }
            thread::sleep(self.shared.config.poll_interval.min(timeout - elapsed));
        }
    }

    /// Consumes messages until one matching `wanted` (handed to `take`) or a
    /// NAK for `nack_for` is found; `None` when the buffered data runs out.
    fn scan<T, G>(
        ring: &RingBuffer,
        handle: &ReadHandle,
        wanted: &MessageId,
        protocols: Protocols,
        nack_for: Option<(u8, u8)>,
        take: &mut G,
    ) -> Option<Scan<Result<T>>>
    where
        G: FnMut(&RingBuffer, &ReadHandle, MessageId, usize, usize) -> Result<T>,
    {
        while let Some((id, frame_len, body_len)) = next_message(ring, handle, protocols) {
            if wanted.is_wanted(&id) {
                return Some(Scan::Found(take(ring, handle, id, frame_len, body_len)));
            }
            if let Some((class, msg_id)) = nack_for {
                if id == MessageId::ubx(UBX_CLASS_ACK, UBX_ID_ACK_NAK) && body_len >= 2 {
                    let mut referenced = [0; 2];
                    ring.peek_handle(handle, &mut referenced, UBX_HEADER_LEN);
                    if referenced == [class, msg_id] {
                        ring.discard_handle(handle, frame_len);
                        return Some(Scan::Nack { class, id: msg_id });
                    }
                }
            }
            trace!("skipping unwanted {id}");
            ring.discard_handle(handle, frame_len);
        }
        None
    }

    /// Discards everything buffered for blocking receives and, if
    /// `also_async` is set, for the asynchronous receive task too.
    ///
    /// Returns the number of bytes discarded from the blocking cursor.
    pub fn flush(&self, also_async: bool) -> usize {
        let handle = self.receiver();
        let flushed = self.shared.ring.flush_handle(&handle);
        if also_async {
            // Only what is buffered now; later data still reaches subscribers
            self.async_rx
                .request_flush_to(self.shared.ring.total_written());
        }
        trace!("flushed {flushed} byte(s)");
        flushed
    }

    /// Registers `callback` for every message matching `wanted`, starting the
    /// asynchronous receive task if it is not running yet.
    ///
    /// Callbacks run on the receive task, most recently registered first.
    /// A callback must not call back into this device; everything it needs
    /// is reachable through the [`MessageReader`] it is given.
    pub fn receive_start<F>(&self, wanted: MessageId, callback: F) -> Result<SubscriberHandle>
    where
        F: FnMut(&MessageId, Result<usize>, &mut MessageReader<'_>) + Send + 'static,
    {
        self.ensure_streaming()?;
        self.async_rx
            .start(&self.shared, wanted, Box::new(callback))
    }

    /// Removes one subscriber; the receive task stops with the last one.
    pub fn receive_stop(&self, handle: SubscriberHandle) -> Result<()> {
        self.async_rx.stop(handle)
    }

    /// Removes every subscriber and stops the receive task.
    pub fn receive_stop_all(&self) {
        self.async_rx.stop_all();
    }

    pub fn is_receiving_async(&self) -> bool {
        self.async_rx.is_running()
    }

    /// Bytes overwritten before a blocking receive could look at them.
    pub fn stat_read_loss(&self) -> usize {
        self.shared.ring.stat_read_loss_handle(&self.receiver())
    }

    /// Bytes dropped on input because a cursor was busy.
    pub fn stat_add_loss(&self) -> usize {
        self.shared.ring.stat_add_loss()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.async_rx.stop_all();
    }
}
