//! Circular byte buffer with one writer and several independent read cursors.
//!
//! Positions are kept as running byte counts, so `write - read` is always the
//! amount of data a cursor has not yet consumed and the slot of a position is
//! `position % capacity`.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, trace};

use crate::error::{Error, Result};

/// Default number of cursors a buffer hands out.
pub const DEFAULT_MAX_READ_HANDLES: usize = 3;

/// Sleep between empty transport reads while [`RingBuffer::fill`] waits.
const FILL_POLL: Duration = Duration::from_millis(1);

static NEXT_RING_ID: AtomicUsize = AtomicUsize::new(0);

/// A read cursor into a [`RingBuffer`].
///
/// Not `Clone`: a cursor has exactly one reader, and is returned with
/// [`RingBuffer::give_read_handle`].
#[derive(Debug)]
pub struct ReadHandle {
    ring: usize,
    index: usize,
}

impl ReadHandle {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Cursor {
    read: u64,
    locked: bool,
    lost: u64,
}

#[derive(Debug)]
struct RingState {
    data: Box<[u8]>,
    write: u64,
    cursors: Vec<Option<Cursor>>,
    add_loss: u64,
}

impl RingState {
    fn capacity(&self) -> u64 {
        self.data.len() as u64
    }

    fn cursor(&self, handle: &ReadHandle) -> Option<&Cursor> {
        self.cursors.get(handle.index).and_then(Option::as_ref)
    }

    fn cursor_mut(&mut self, handle: &ReadHandle) -> Option<&mut Cursor> {
        self.cursors.get_mut(handle.index).and_then(Option::as_mut)
    }

    fn available(&self, handle: &ReadHandle) -> usize {
        self.cursor(handle)
            .map_or(0, |c| (self.write - c.read) as usize)
    }

    /// Copies from absolute position `from` into `dest`; the range must still be held.
    fn copy_out(&self, from: u64, dest: &mut [u8]) {
        let cap = self.data.len();
        let start = (from % self.capacity()) as usize;
        let first = dest.len().min(cap - start);
        dest[..first].copy_from_slice(&self.data[start..start + first]);
        let rest = dest.len() - first;
        dest[first..].copy_from_slice(&self.data[..rest]);
    }

    fn copy_in(&mut self, at: u64, src: &[u8]) {
        let cap = self.data.len();
        let start = (at % self.capacity()) as usize;
        let first = src.len().min(cap - start);
        self.data[start..start + first].copy_from_slice(&src[..first]);
        let rest = src.len() - first;
        self.data[..rest].copy_from_slice(&src[first..]);
    }
}

/// One producer, many consumers. The producer is [`RingBuffer::write`] (and
/// [`RingBuffer::fill`], which feeds it from a transport); each consumer owns a
/// [`ReadHandle`].
///
/// When the producer needs room, unread data of an unlocked cursor is
/// overwritten and counted in that cursor's loss statistic. A locked cursor is
/// never overtaken: incoming bytes that would overwrite its unread data are
/// dropped instead and counted in [`RingBuffer::stat_add_loss`].
#[derive(Debug)]
pub struct RingBuffer {
    id: usize,
    state: Mutex<RingState>,
    fill_chunk: Mutex<Vec<u8>>,
}

impl RingBuffer {
    pub fn new(capacity: usize, max_read_handles: usize) -> Result<Self> {
        Self::with_fill_chunk(capacity, max_read_handles, 256)
    }

    /// As [`RingBuffer::new`], reading at most `fill_chunk` bytes from the
    /// transport per read in [`RingBuffer::fill`].
    pub fn with_fill_chunk(
        capacity: usize,
        max_read_handles: usize,
        fill_chunk: usize,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidParameter("ring buffer capacity must be non-zero"));
        }
        if fill_chunk == 0 {
            return Err(Error::InvalidParameter("fill chunk must be non-zero"));
        }
        Ok(Self {
            id: NEXT_RING_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(RingState {
                data: vec![0; capacity].into_boxed_slice(),
                write: 0,
                cursors: vec![None; max_read_handles],
                add_loss: 0,
            }),
            fill_chunk: Mutex::new(vec![0; fill_chunk]),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.lock().data.len()
    }

    /// Total number of bytes ever accepted by the buffer.
    pub fn total_written(&self) -> u64 {
        self.lock().write
    }

    /// Adds `data` at the write position, returning how many bytes were kept.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut st = self.lock();
        let cap = st.capacity();
        let write = st.write;

        let room = st
            .cursors
            .iter()
            .flatten()
            .filter(|c| c.locked)
            .map(|c| cap - (write - c.read))
            .fold(data.len() as u64, u64::min);
        let accepted = room as usize;
        let dropped = data.len() - accepted;
        if dropped > 0 {
            st.add_loss += dropped as u64;
            debug!("ring buffer: {dropped} byte(s) dropped, a locked read handle is full");
        }

        // Only the newest `cap` bytes of a very large write survive
        let skip = accepted.saturating_sub(st.data.len());
        st.copy_in(write + skip as u64, &data[skip..accepted]);
        st.write = write + accepted as u64;

        let new_write = st.write;
        for (index, cursor) in st.cursors.iter_mut().enumerate() {
            let Some(cursor) = cursor.as_mut() else {
                continue;
            };
            let unread = new_write - cursor.read;
            if unread > cap {
                let overtaken = unread - cap;
                cursor.read += overtaken;
                cursor.lost += overtaken;
                trace!("ring buffer: read handle {index} overtaken by {overtaken} byte(s)");
            }
        }
        accepted
    }

    /// Pulls bytes from `read` into the buffer.
    ///
    /// Waits up to `min_wait` for the first byte to arrive; once data is
    /// flowing, keeps reading until the source runs dry. Never runs past
    /// `max_wait`. Returns the number of bytes added.
    pub fn fill<F>(&self, mut read: F, min_wait: Duration, max_wait: Duration) -> Result<usize>
    where
        F: FnMut(&mut [u8]) -> Result<usize>,
    {
        let start = Instant::now();
        let mut added = 0;
        loop {
            let got = {
                let mut chunk = self.fill_chunk.lock().unwrap_or_else(|e| e.into_inner());
                let got = read(&mut chunk)?;
                if got > 0 {
                    added += self.write(&chunk[..got]);
                }
                got
            };
            let elapsed = start.elapsed();
            if got == 0 && (added > 0 || elapsed >= min_wait) {
                break;
            }
            if elapsed >= max_wait {
                break;
            }
            if got == 0 {
                thread::sleep(FILL_POLL.min(max_wait - elapsed));
            }
        }
        Ok(added)
    }

    /// Allocates a cursor positioned at the current write position.
    pub fn take_read_handle(&self) -> Result<ReadHandle> {
        let mut st = self.lock();
        let write = st.write;
        let index = st
            .cursors
            .iter()
            .position(Option::is_none)
            .ok_or(Error::ResourceExhausted("read handle"))?;
        st.cursors[index] = Some(Cursor {
            read: write,
            ..Cursor::default()
        });
        debug!("ring buffer: read handle {index} taken");
        Ok(ReadHandle {
            ring: self.id,
            index,
        })
    }

    pub fn give_read_handle(&self, handle: ReadHandle) {
        debug_assert_eq!(handle.ring, self.id, "read handle from another ring buffer");
        let mut st = self.lock();
        if let Some(slot) = st.cursors.get_mut(handle.index) {
            *slot = None;
            debug!("ring buffer: read handle {} given back", handle.index);
        }
    }

    /// While locked, the producer will drop input rather than overwrite data
    /// this cursor has not read yet.
    pub fn lock_read_handle(&self, handle: &ReadHandle) {
        if let Some(c) = self.lock().cursor_mut(handle) {
            c.locked = true;
        }
    }

    pub fn unlock_read_handle(&self, handle: &ReadHandle) {
        if let Some(c) = self.lock().cursor_mut(handle) {
            c.locked = false;
        }
    }

    /// Copies up to `dest.len()` bytes into `dest` and consumes them.
    pub fn read_handle(&self, handle: &ReadHandle, dest: &mut [u8]) -> usize {
        let mut st = self.lock();
        let count = dest.len().min(st.available(handle));
        let Some(read) = st.cursor(handle).map(|c| c.read) else {
            return 0;
        };
        st.copy_out(read, &mut dest[..count]);
        if let Some(c) = st.cursor_mut(handle) {
            c.read += count as u64;
        }
        count
    }

    /// Consumes up to `count` bytes without copying them anywhere.
    pub fn discard_handle(&self, handle: &ReadHandle, count: usize) -> usize {
        let mut st = self.lock();
        let count = count.min(st.available(handle));
        if let Some(c) = st.cursor_mut(handle) {
            c.read += count as u64;
        }
        count
    }

    /// Discards everything currently unread by this cursor.
    pub fn flush_handle(&self, handle: &ReadHandle) -> usize {
        self.discard_handle(handle, usize::MAX)
    }

    /// Discards what this cursor has not read below absolute position `pos`,
    /// leaving anything written after it. Returns the bytes discarded.
    pub fn flush_handle_to(&self, handle: &ReadHandle, pos: u64) -> usize {
        let mut st = self.lock();
        let target = pos.min(st.write);
        match st.cursor_mut(handle) {
            Some(c) if c.read < target => {
                let count = target - c.read;
                c.read = target;
                count as usize
            },
            _ => 0,
        }
    }

    /// Copies bytes starting `offset` bytes past the cursor without consuming them.
    pub fn peek_handle(&self, handle: &ReadHandle, dest: &mut [u8], offset: usize) -> usize {
        let st = self.lock();
        let available = st.available(handle);
        if offset >= available {
            return 0;
        }
        let count = dest.len().min(available - offset);
        let Some(read) = st.cursor(handle).map(|c| c.read) else {
            return 0;
        };
        st.copy_out(read + offset as u64, &mut dest[..count]);
        count
    }

    pub fn data_size_handle(&self, handle: &ReadHandle) -> usize {
        self.lock().available(handle)
    }

    /// Bytes overwritten before this cursor could read them.
    pub fn stat_read_loss_handle(&self, handle: &ReadHandle) -> usize {
        self.lock().cursor(handle).map_or(0, |c| c.lost as usize)
    }

    /// Bytes dropped on input because a locked cursor had no room.
    pub fn stat_add_loss(&self) -> usize {
        self.lock().add_loss as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(ring: &RingBuffer, handle: &ReadHandle) -> Vec<u8> {
        let mut out = vec![0; ring.data_size_handle(handle)];
        let n = ring.read_handle(handle, &mut out);
        out.truncate(n);
        out
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(matches!(
            RingBuffer::new(0, 1),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn write_then_read() {
        let ring = RingBuffer::new(8, 2).unwrap();
        let h = ring.take_read_handle().unwrap();
        assert_eq!(ring.write(&[1, 2, 3]), 3);
        assert_eq!(ring.data_size_handle(&h), 3);
        assert_eq!(drain(&ring, &h), [1, 2, 3]);
        assert_eq!(ring.data_size_handle(&h), 0);
    }

    #[test]
    fn wraps_around() {
        let ring = RingBuffer::new(5, 1).unwrap();
        let h = ring.take_read_handle().unwrap();
        ring.write(&[1, 2, 3, 4]);
        let mut out = [0; 3];
        assert_eq!(ring.read_handle(&h, &mut out), 3);
        ring.write(&[5, 6, 7]);
        assert_eq!(drain(&ring, &h), [4, 5, 6, 7]);
        assert_eq!(ring.stat_read_loss_handle(&h), 0);
    }

    #[test]
    fn new_handle_sees_only_new_data() {
        let ring = RingBuffer::new(8, 2).unwrap();
        let a = ring.take_read_handle().unwrap();
        ring.write(&[1, 2]);
        let b = ring.take_read_handle().unwrap();
        ring.write(&[3]);
        assert_eq!(drain(&ring, &a), [1, 2, 3]);
        assert_eq!(drain(&ring, &b), [3]);
    }

    #[test]
    fn handles_are_independent() {
        let ring = RingBuffer::new(16, 2).unwrap();
        let a = ring.take_read_handle().unwrap();
        let b = ring.take_read_handle().unwrap();
        ring.write(&[1, 2, 3, 4]);
        let mut one = [0; 1];
        ring.read_handle(&a, &mut one);
        assert_eq!(one, [1]);
        assert_eq!(ring.data_size_handle(&a), 3);
        assert_eq!(ring.data_size_handle(&b), 4);
    }

    #[test]
    fn table_full() {
        let ring = RingBuffer::new(8, 2).unwrap();
        let a = ring.take_read_handle().unwrap();
        let _b = ring.take_read_handle().unwrap();
        assert!(matches!(
            ring.take_read_handle(),
            Err(Error::ResourceExhausted(_))
        ));
        ring.give_read_handle(a);
        assert!(ring.take_read_handle().is_ok());
    }

    #[test]
    fn peek_does_not_consume() {
        let ring = RingBuffer::new(8, 1).unwrap();
        let h = ring.take_read_handle().unwrap();
        ring.write(&[1, 2, 3, 4]);
        let mut out = [0; 2];
        assert_eq!(ring.peek_handle(&h, &mut out, 1), 2);
        assert_eq!(out, [2, 3]);
        assert_eq!(ring.peek_handle(&h, &mut out, 3), 1);
        assert_eq!(ring.peek_handle(&h, &mut out, 4), 0);
        assert_eq!(ring.data_size_handle(&h), 4);
    }

    #[test]
    fn discard_and_flush() {
        let ring = RingBuffer::new(8, 1).unwrap();
        let h = ring.take_read_handle().unwrap();
        ring.write(&[1, 2, 3, 4, 5]);
        assert_eq!(ring.discard_handle(&h, 2), 2);
        assert_eq!(ring.data_size_handle(&h), 3);
        assert_eq!(ring.flush_handle(&h), 3);
        assert_eq!(ring.data_size_handle(&h), 0);
    }

    #[test]
    fn flush_to_keeps_later_data() {
        let ring = RingBuffer::new(16, 1).unwrap();
        let h = ring.take_read_handle().unwrap();
        ring.write(&[1, 2, 3]);
        let mark = ring.total_written();
        ring.write(&[4, 5]);
        assert_eq!(ring.flush_handle_to(&h, mark), 3);
        assert_eq!(ring.flush_handle_to(&h, mark), 0);
        assert_eq!(drain(&ring, &h), [4, 5]);
        // Never past what was written
        assert_eq!(ring.flush_handle_to(&h, mark + 100), 0);
        ring.write(&[6]);
        assert_eq!(drain(&ring, &h), [6]);
    }

    #[test]
    fn unlocked_handle_is_overtaken() {
        let ring = RingBuffer::new(4, 1).unwrap();
        let h = ring.take_read_handle().unwrap();
        ring.write(&[1, 2, 3]);
        ring.write(&[4, 5, 6]);
        assert_eq!(ring.stat_read_loss_handle(&h), 2);
        assert_eq!(drain(&ring, &h), [3, 4, 5, 6]);
        assert_eq!(ring.stat_add_loss(), 0);
    }

    #[test]
    fn locked_handle_is_never_overtaken() {
        let ring = RingBuffer::new(4, 2).unwrap();
        let locked = ring.take_read_handle().unwrap();
        let unlocked = ring.take_read_handle().unwrap();
        ring.lock_read_handle(&locked);
        assert_eq!(ring.write(&[1, 2, 3]), 3);
        assert_eq!(ring.write(&[4, 5, 6]), 1);
        assert_eq!(ring.stat_add_loss(), 2);
        assert_eq!(ring.stat_read_loss_handle(&locked), 0);
        assert_eq!(drain(&ring, &locked), [1, 2, 3, 4]);

        ring.unlock_read_handle(&locked);
        ring.write(&[7, 8, 9, 10, 11]);
        assert_eq!(ring.stat_read_loss_handle(&unlocked), 5);
        assert_eq!(drain(&ring, &unlocked), [8, 9, 10, 11]);
    }

    #[test]
    fn huge_write_keeps_newest_bytes() {
        let ring = RingBuffer::new(4, 1).unwrap();
        let h = ring.take_read_handle().unwrap();
        let data: Vec<u8> = (0..10).collect();
        assert_eq!(ring.write(&data), 10);
        assert_eq!(drain(&ring, &h), [6, 7, 8, 9]);
        assert_eq!(ring.stat_read_loss_handle(&h), 6);
    }

    #[test]
    fn fill_stops_when_source_runs_dry() {
        let ring = RingBuffer::with_fill_chunk(64, 1, 4).unwrap();
        let h = ring.take_read_handle().unwrap();
        let mut source: Vec<u8> = (0..10).collect();
        let added = ring
            .fill(
                |buf| {
                    let n = buf.len().min(source.len());
                    buf[..n].copy_from_slice(&source[..n]);
                    source.drain(..n);
                    Ok(n)
                },
                Duration::from_millis(0),
                Duration::from_secs(5),
            )
            .unwrap();
        assert_eq!(added, 10);
        assert_eq!(drain(&ring, &h), (0..10).collect::<Vec<u8>>());
    }

    #[test]
    fn fill_respects_max_wait() {
        let ring = RingBuffer::new(64, 1).unwrap();
        let start = Instant::now();
        let added = ring
            .fill(
                |_| Ok(0),
                Duration::from_millis(500),
                Duration::from_millis(30),
            )
            .unwrap();
        assert_eq!(added, 0);
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn fill_waits_min_wait_for_late_data() {
        let ring = RingBuffer::new(64, 1).unwrap();
        let h = ring.take_read_handle().unwrap();
        let start = Instant::now();
        let mut sent = false;
        let added = ring
            .fill(
                |buf| {
                    if sent || start.elapsed() < Duration::from_millis(20) {
                        return Ok(0);
                    }
                    sent = true;
                    buf[..3].copy_from_slice(&[7, 8, 9]);
                    Ok(3)
                },
                Duration::from_millis(100),
                Duration::from_secs(5),
            )
            .unwrap();
        assert_eq!(added, 3);
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(drain(&ring, &h), [7, 8, 9]);
    }

    #[test]
    fn fill_gives_up_after_min_wait() {
        let ring = RingBuffer::new(64, 1).unwrap();
        let start = Instant::now();
        let added = ring
            .fill(|_| Ok(0), Duration::from_millis(100), Duration::from_secs(5))
            .unwrap();
        let elapsed = start.elapsed();
        assert_eq!(added, 0);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn fill_propagates_transport_errors() {
        let ring = RingBuffer::new(64, 1).unwrap();
        let res = ring.fill(
            |_| Err(std::io::Error::other("unplugged").into()),
            Duration::ZERO,
            Duration::from_millis(10),
        );
        assert!(matches!(res, Err(Error::Io(_))));
    }

    proptest! {
        #[test]
        fn continuous_reader_loses_nothing(
            capacity in 1usize..256,
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..32),
        ) {
            let ring = RingBuffer::new(capacity, 1).unwrap();
            let h = ring.take_read_handle().unwrap();
            let mut expected = vec![];
            let mut got = vec![];
            for chunk in chunks {
                // Feed in slices no larger than the capacity, reading after each
                for piece in chunk.chunks(capacity) {
                    ring.write(piece);
                    expected.extend_from_slice(piece);
                    got.extend(drain(&ring, &h));
                }
            }
            prop_assert_eq!(got, expected);
            prop_assert_eq!(ring.stat_read_loss_handle(&h), 0);
        }

        #[test]
        fn idle_reader_loses_exactly_the_excess(
            capacity in 1usize..128,
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..16),
        ) {
            let ring = RingBuffer::new(capacity, 1).unwrap();
            let h = ring.take_read_handle().unwrap();
            let fed: usize = chunks.iter().map(|c| ring.write(c)).sum();
            prop_assert_eq!(ring.stat_read_loss_handle(&h), fed.saturating_sub(capacity));
            prop_assert_eq!(ring.data_size_handle(&h), fed.min(capacity));
        }
    }
}
