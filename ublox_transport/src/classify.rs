//! Recognises the next UBX, NMEA or RTCM message at a read position without
//! consuming anything.

use log::trace;

use crate::{
    checksum::{nmea_checksum, UbxChecksum},
    constants::{
        NMEA_CHECKSUM_CHAR, NMEA_END_CHAR_1, NMEA_END_CHAR_2, NMEA_FIELD_SEPARATOR,
        NMEA_FRAME_OVERHEAD, NMEA_MAX_ID_LEN, NMEA_MAX_SENTENCE_LENGTH, NMEA_MIN_SENTENCE_LENGTH,
        NMEA_SYNC_CHAR, RTCM_CRC_SIZE, RTCM_HEADER_SIZE, RTCM_LENGTH_MASK, RTCM_RESERVED_MASK,
        RTCM_SYNC_CHAR, UBX_CHECKSUM_LEN, UBX_CLASS_OFFSET, UBX_HEADER_LEN, UBX_SYNC_CHAR_1,
        UBX_SYNC_CHAR_2,
    },
    endian,
    message_id::{MessageId, Protocols},
    ring::{ReadHandle, RingBuffer},
};

/// Read-only window onto buffered bytes.
pub trait Peek {
    /// Number of bytes that can currently be peeked.
    fn available(&self) -> usize;

    /// Copies bytes starting at `offset` into `dest`, returning how many were copied.
    fn peek(&self, dest: &mut [u8], offset: usize) -> usize;
}

impl Peek for [u8] {
    fn available(&self) -> usize {
        self.len()
    }

    fn peek(&self, dest: &mut [u8], offset: usize) -> usize {
        let Some(src) = self.get(offset..) else {
            return 0;
        };
        let n = dest.len().min(src.len());
        dest[..n].copy_from_slice(&src[..n]);
        n
    }
}

/// The unread bytes of one ring buffer cursor.
#[derive(Debug, Clone, Copy)]
pub struct CursorView<'a> {
    pub ring: &'a RingBuffer,
    pub handle: &'a ReadHandle,
}

impl<'a> CursorView<'a> {
    pub fn new(ring: &'a RingBuffer, handle: &'a ReadHandle) -> Self {
        Self { ring, handle }
    }
}

impl Peek for CursorView<'_> {
    fn available(&self) -> usize {
        self.ring.data_size_handle(self.handle)
    }

    fn peek(&self, dest: &mut [u8], offset: usize) -> usize {
        self.ring.peek_handle(self.handle, dest, offset)
    }
}

/// What sits at the front of a byte window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// No bytes at all.
    Empty,
    /// A complete, well-formed message.
    ///
    /// `body_len` is the UBX body, the NMEA text between `$` and `*`, or the
    /// RTCM payload; `frame_len` covers everything including framing.
    Message {
        id: MessageId,
        frame_len: usize,
        body_len: usize,
    },
    /// The start of a plausible message whose remaining bytes have not arrived yet.
    Incomplete,
    /// Not the start of a wanted message; skip one byte and look again.
    Unknown,
}

impl Classification {
    /// Bytes to discard before classifying again without waiting for new data.
    pub fn skip(&self) -> usize {
        match self {
            Self::Unknown => 1,
            _ => 0,
        }
    }
}

/// Classifies the bytes at the front of `src`.
///
/// Only protocols in `wanted` are recognised; the lead byte of any other
/// protocol is reported as [`Classification::Unknown`]. A message whose
/// frame would be longer than `max_frame_len` is also unknown, since it
/// could never be buffered in full.
///
/// Framing and checksum errors are never reported as such: the candidate is
/// treated as unknown so that the caller steps over its lead byte and
/// resynchronises on whatever follows.
pub fn classify<P: Peek + ?Sized>(src: &P, wanted: Protocols, max_frame_len: usize) -> Classification {
    let mut lead = [0; 1];
    if src.peek(&mut lead, 0) == 0 {
        return Classification::Empty;
    }
    match lead[0] {
        UBX_SYNC_CHAR_1 if wanted.contains(Protocols::UBX) => classify_ubx(src, max_frame_len),
        NMEA_SYNC_CHAR if wanted.contains(Protocols::NMEA) => classify_nmea(src, max_frame_len),
        RTCM_SYNC_CHAR if wanted.contains(Protocols::RTCM) => classify_rtcm(src, max_frame_len),
        _ => Classification::Unknown,
    }
}

fn classify_ubx<P: Peek + ?Sized>(src: &P, max_frame_len: usize) -> Classification {
    let mut header = [0; UBX_HEADER_LEN];
    let got = src.peek(&mut header, 0);
    if got >= 2 && header[1] != UBX_SYNC_CHAR_2 {
        return Classification::Unknown;
    }
    if got < UBX_HEADER_LEN {
        return Classification::Incomplete;
    }

    let (class, id) = (header[2], header[3]);
    let body_len = usize::from(endian::decode_u16(&header[4..6]));
    let frame_len = UBX_HEADER_LEN + body_len + UBX_CHECKSUM_LEN;
    if frame_len > max_frame_len {
        trace!("UBX {class:#04x}/{id:#04x} of {frame_len} bytes can never be buffered, skipping");
        return Classification::Unknown;
    }
    if src.available() < frame_len {
        return Classification::Incomplete;
    }

    let mut calc = UbxChecksum::new();
    calc.update(&header[UBX_CLASS_OFFSET..]);
    let mut chunk = [0; 64];
    let mut offset = UBX_HEADER_LEN;
    let body_end = UBX_HEADER_LEN + body_len;
    while offset < body_end {
        let want = chunk.len().min(body_end - offset);
        let n = src.peek(&mut chunk[..want], offset);
        if n == 0 {
            return Classification::Incomplete;
        }
        calc.update(&chunk[..n]);
        offset += n;
    }
    let mut ck = [0; UBX_CHECKSUM_LEN];
    if src.peek(&mut ck, body_end) < UBX_CHECKSUM_LEN {
        return Classification::Incomplete;
    }
    if !calc.is_valid(ck[0], ck[1]) {
        trace!("UBX {class:#04x}/{id:#04x} checksum mismatch, resynchronising");
        return Classification::Unknown;
    }

    Classification::Message {
        id: MessageId::ubx(class, id),
        frame_len,
        body_len,
    }
}

fn classify_nmea<P: Peek + ?Sized>(src: &P, max_frame_len: usize) -> Classification {
    let limit = NMEA_MAX_SENTENCE_LENGTH.min(max_frame_len);
    let mut sentence = [0; NMEA_MAX_SENTENCE_LENGTH];
    let got = src.peek(&mut sentence[..limit], 0);
    let sentence = &sentence[..got];
    let incomplete_or_unknown = || {
        if got < limit {
            Classification::Incomplete
        } else {
            Classification::Unknown
        }
    };

    // Talker + sentence identifier, terminated by the first field separator
    let mut id_end = 1;
    loop {
        let Some(&c) = sentence.get(id_end) else {
            return incomplete_or_unknown();
        };
        if c == NMEA_FIELD_SEPARATOR {
            break;
        }
        if !(c.is_ascii_uppercase() || c.is_ascii_digit()) || id_end > NMEA_MAX_ID_LEN {
            return Classification::Unknown;
        }
        id_end += 1;
    }
    if id_end == 1 {
        return Classification::Unknown;
    }

    let Some(star) = sentence[id_end..]
        .iter()
        .position(|&c| c == NMEA_CHECKSUM_CHAR || !(0x20..=0x7e).contains(&c) || c == NMEA_SYNC_CHAR)
        .map(|p| p + id_end)
    else {
        return incomplete_or_unknown();
    };
    if sentence[star] != NMEA_CHECKSUM_CHAR {
        return Classification::Unknown;
    }

    let frame_len = star + NMEA_FRAME_OVERHEAD - 1;
    if frame_len < NMEA_MIN_SENTENCE_LENGTH {
        return Classification::Unknown;
    }
    let Some(tail) = sentence.get(star + 1..frame_len) else {
        return incomplete_or_unknown();
    };
    let (Some(hi), Some(lo)) = (hex_digit(tail[0]), hex_digit(tail[1])) else {
        return Classification::Unknown;
    };
    if tail[2] != NMEA_END_CHAR_1 || tail[3] != NMEA_END_CHAR_2 {
        return Classification::Unknown;
    }
    if nmea_checksum(&sentence[1..star]) != ((hi << 4) | lo) {
        trace!("NMEA checksum mismatch, resynchronising");
        return Classification::Unknown;
    }

    Classification::Message {
        // Only uppercase ASCII and digits were accepted above
        id: MessageId::Nmea(sentence[1..id_end].iter().map(|&c| char::from(c)).collect()),
        frame_len,
        body_len: frame_len - NMEA_FRAME_OVERHEAD,
    }
}

fn hex_digit(c: u8) -> Option<u8> {
    char::from(c).to_digit(16).map(|d| d as u8)
}

fn classify_rtcm<P: Peek + ?Sized>(src: &P, max_frame_len: usize) -> Classification {
    let mut header = [0; RTCM_HEADER_SIZE + 2];
    let got = src.peek(&mut header, 0);
    if got >= 2 && header[1] & RTCM_RESERVED_MASK != 0 {
        return Classification::Unknown;
    }
    if got < RTCM_HEADER_SIZE {
        return Classification::Incomplete;
    }

    let body_len = usize::from(u16::from_be_bytes([header[1], header[2]]) & RTCM_LENGTH_MASK);
    // The payload has to carry at least the 12-bit message type
    if body_len < 2 {
        return Classification::Unknown;
    }
    let frame_len = RTCM_HEADER_SIZE + body_len + RTCM_CRC_SIZE;
    if frame_len > max_frame_len {
        return Classification::Unknown;
    }
    if got < header.len() || src.available() < frame_len {
        return Classification::Incomplete;
    }

    let message_type = (u16::from(header[3]) << 4) | (u16::from(header[4]) >> 4);
    Classification::Message {
        id: MessageId::rtcm(message_type),
        frame_len,
        body_len,
    }
}

/// Steps over unknown bytes on a cursor until a complete message of one of
/// the `wanted` protocols is at the front, returning its classification
/// without consuming it.
///
/// Returns `None` once the cursor is empty or only holds the start of an
/// incomplete message. Skipped bytes are lost to this cursor only.
pub fn next_message(
    ring: &RingBuffer,
    handle: &ReadHandle,
    wanted: Protocols,
) -> Option<(MessageId, usize, usize)> {
    let view = CursorView::new(ring, handle);
    let max_frame_len = ring.capacity();
    loop {
        match classify(&view, wanted, max_frame_len) {
            Classification::Message {
                id,
                frame_len,
                body_len,
            } => return Some((id, frame_len, body_len)),
            Classification::Empty | Classification::Incomplete => return None,
            unknown @ Classification::Unknown => {
                ring.discard_handle(handle, unknown.skip());
            },
        }
    }
}
