//! Asynchronous receive: a background task per device that pulls every
//! message off its own ring buffer cursor and hands it to the matching
//! subscribers.

use std::{
    collections::VecDeque,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender},
        Arc, Mutex, MutexGuard,
    },
    thread::{self, JoinHandle},
};

use log::{debug, trace, warn};

use crate::{
    classify::{next_message, Peek},
    constants::{UBX_CLASS_ACK, UBX_HEADER_LEN, UBX_ID_ACK_NAK},
    device::Shared,
    error::{Error, Result},
    message_id::{MessageId, Protocols},
    ring::ReadHandle,
};

/// Subscriber callback: the concrete message identifier, then either the
/// body length or [`Error::Nack`] when the receiver rejected the message
/// this subscriber waits for, then a reader over the frame.
pub type Callback = Box<dyn FnMut(&MessageId, Result<usize>, &mut MessageReader<'_>) + Send>;

/// Identifies a subscription made with [`crate::Device::receive_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle {
    index: usize,
    serial: u64,
}

/// Read access to the frame being dispatched, handed to each callback.
///
/// Every callback gets its own reader positioned at the first byte of the
/// frame (the sync byte for UBX, `$` for NMEA, the preamble for RTCM).
#[derive(Debug)]
pub struct MessageReader<'a> {
    frame: &'a [u8],
    position: usize,
}

impl<'a> MessageReader<'a> {
    pub(crate) fn new(frame: &'a [u8]) -> Self {
        Self { frame, position: 0 }
    }

    pub fn frame_len(&self) -> usize {
        self.frame.len()
    }

    pub fn remaining(&self) -> usize {
        self.frame.len() - self.position
    }

    /// Copies bytes starting `offset` bytes past the current position without consuming them.
    pub fn peek(&self, dest: &mut [u8], offset: usize) -> usize {
        self.frame[self.position..].peek(dest, offset)
    }

    /// Copies bytes from the current position and moves past them.
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        let n = self.peek(dest, 0);
        self.position += n;
        n
    }
}

struct Subscriber {
    serial: u64,
    wanted: MessageId,
    callback: Callback,
}

/// Fixed arena of subscribers plus their dispatch order, newest first.
struct Subscribers {
    slots: Vec<Option<Subscriber>>,
    order: VecDeque<usize>,
    next_serial: u64,
}

impl Subscribers {
    fn new(max: usize) -> Self {
        Self {
            slots: (0..max).map(|_| None).collect(),
            order: VecDeque::with_capacity(max),
            next_serial: 0,
        }
    }

    fn insert(&mut self, wanted: MessageId, callback: Callback) -> Result<SubscriberHandle> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::ResourceExhausted("subscriber"))?;
        let serial = self.next_serial;
        self.next_serial += 1;
        self.slots[index] = Some(Subscriber {
            serial,
            wanted,
            callback,
        });
        self.order.push_front(index);
        Ok(SubscriberHandle { index, serial })
    }

    fn remove(&mut self, handle: SubscriberHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index) else {
            return false;
        };
        if slot.as_ref().is_none_or(|s| s.serial != handle.serial) {
            return false;
        }
        *slot = None;
        self.order.retain(|&i| i != handle.index);
        true
    }

    fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.order.clear();
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn dispatch(&mut self, id: &MessageId, body_len: usize, frame: &[u8]) {
        let nacked = (*id == MessageId::ubx(UBX_CLASS_ACK, UBX_ID_ACK_NAK) && body_len >= 2)
            .then(|| (frame[UBX_HEADER_LEN], frame[UBX_HEADER_LEN + 1]));

        for &index in &self.order {
            let Some(sub) = self.slots.get_mut(index).and_then(Option::as_mut) else {
                continue;
            };
            let result = if sub.wanted.is_wanted(id) {
                Ok(body_len)
            } else if let Some((class, msg_id)) =
                nacked.filter(|&nak| sub.wanted.concrete_ubx() == Some(nak))
            {
                Err(Error::Nack { class, id: msg_id })
            } else {
                continue;
            };
            let callback = &mut sub.callback;
            let call = || callback(id, result, &mut MessageReader::new(frame));
            if panic::catch_unwind(AssertUnwindSafe(call)).is_err() {
                warn!("subscriber {index} panicked while handling {id}");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// The background task itself, running on its own thread.
struct ReceiveTask {
    shared: Arc<Shared>,
    subscribers: Arc<Mutex<Subscribers>>,
    flush_to: Arc<AtomicU64>,
    handle: ReadHandle,
    staging: Vec<u8>,
}

impl ReceiveTask {
    fn new(
        shared: Arc<Shared>,
        subscribers: Arc<Mutex<Subscribers>>,
        flush_to: Arc<AtomicU64>,
    ) -> Result<Self> {
        let mut staging = Vec::new();
        staging
            .try_reserve_exact(shared.config.ring_capacity)
            .map_err(|_| Error::NoMemory)?;
        let handle = shared.ring.take_read_handle()?;
        Ok(Self {
            shared,
            subscribers,
            flush_to,
            handle,
            staging,
        })
    }

    fn run(mut self, stop: &Receiver<()>) {
        debug!("receive task started");
        let pause = self.shared.config.async_yield;
        loop {
            let added = match self.shared.fill(self.shared.config.fill_max_wait) {
                Ok(added) => added,
                Err(e) => {
                    warn!("receive task: transport read failed: {e}");
                    0
                },
            };
            let dispatched = self.drain();

            let pause = if added == 0 && dispatched == 0 {
                pause * 2
            } else {
                pause
            };
            match stop.recv_timeout(pause) {
                Err(RecvTimeoutError::Timeout) => {},
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.shared.ring.give_read_handle(self.handle);
        debug!("receive task stopped");
    }

    /// Dispatches every complete message currently buffered.
    fn drain(&mut self) -> usize {
        let ring = &self.shared.ring;
        let mut dispatched = 0;
        loop {
            // Locked only while the frame is copied out
            ring.lock_read_handle(&self.handle);
            let flush_to = self.flush_to.load(Ordering::Acquire);
            let flushed = ring.flush_handle_to(&self.handle, flush_to);
            if flushed > 0 {
                trace!("receive task flushed {flushed} byte(s)");
            }
            let next = next_message(ring, &self.handle, Protocols::all());
            if let Some((_, frame_len, _)) = &next {
                self.staging.clear();
                self.staging.resize(*frame_len, 0);
                ring.read_handle(&self.handle, &mut self.staging);
            }
            ring.unlock_read_handle(&self.handle);

            let Some((id, _, body_len)) = next else {
                return dispatched;
            };
            trace!("dispatching {id}");
            lock(&self.subscribers).dispatch(&id, body_len, &self.staging);
            dispatched += 1;
        }
    }
}

struct Worker {
    stop: SyncSender<()>,
    thread: JoinHandle<()>,
}

impl Worker {
    fn spawn(
        shared: Arc<Shared>,
        subscribers: Arc<Mutex<Subscribers>>,
        flush_to: Arc<AtomicU64>,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::sync_channel(1);
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let thread = thread::Builder::new()
            .name("ubx-receive".into())
            .spawn(move || match ReceiveTask::new(shared, subscribers, flush_to) {
                Ok(task) => {
                    let _ = ready_tx.send(Ok(()));
                    task.run(&stop_rx);
                },
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                },
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop: stop_tx,
                thread,
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            },
            Err(_) => {
                let _ = thread.join();
                Err(io::Error::other("receive task exited during start-up").into())
            },
        }
    }

    fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    fn stop(self) {
        // The task may already be gone, in which case there is nobody to tell
        let _ = self.stop.send(());
        if self.thread.join().is_err() {
            warn!("receive task panicked");
        }
    }
}

/// Per-device bookkeeping for the asynchronous receive task.
pub(crate) struct AsyncReceiver {
    subscribers: Arc<Mutex<Subscribers>>,
    worker: Mutex<Option<Worker>>,
    /// Stream position below which the task discards unread data.
    flush_to: Arc<AtomicU64>,
}

impl AsyncReceiver {
    pub(crate) fn new(max_subscribers: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Subscribers::new(max_subscribers))),
            worker: Mutex::new(None),
            flush_to: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn start(
        &self,
        shared: &Arc<Shared>,
        wanted: MessageId,
        callback: Callback,
    ) -> Result<SubscriberHandle> {
        let mut worker = lock(&self.worker);
        debug!("subscribing to {wanted}");
        let handle = lock(&self.subscribers).insert(wanted, callback)?;
        if let Some(dead) = worker.take_if(|w| !w.is_alive()) {
            warn!("receive task died, restarting it");
            dead.stop();
        }
        if worker.is_none() {
            match Worker::spawn(shared.clone(), self.subscribers.clone(), self.flush_to.clone()) {
                Ok(started) => *worker = Some(started),
                Err(e) => {
                    lock(&self.subscribers).remove(handle);
                    return Err(e);
                },
            }
        }
        Ok(handle)
    }

    pub(crate) fn stop(&self, handle: SubscriberHandle) -> Result<()> {
        let mut worker = lock(&self.worker);
        let (removed, empty) = {
            let mut subscribers = lock(&self.subscribers);
            (subscribers.remove(handle), subscribers.is_empty())
        };
        if !removed {
            return Err(Error::InvalidParameter("unknown subscriber handle"));
        }
        debug!("subscriber {} removed", handle.index);
        if empty {
            if let Some(running) = worker.take() {
                running.stop();
            }
        }
        Ok(())
    }

    pub(crate) fn stop_all(&self) {
        let mut worker = lock(&self.worker);
        lock(&self.subscribers).clear();
        if let Some(running) = worker.take() {
            running.stop();
        }
    }

    /// Makes the task discard whatever it has not read below `pos`.
    pub(crate) fn request_flush_to(&self, pos: u64) {
        self.flush_to.fetch_max(pos, Ordering::AcqRel);
    }

    pub(crate) fn is_running(&self) -> bool {
        lock(&self.worker).as_ref().is_some_and(Worker::is_alive)
    }
}
