//! Byte-exact UBX frame encoding and a resynchronising frame scanner.
//!
//! Wire layout: `[0xb5][0x62][class][id][len: u16 LE][body: len bytes][ck_a][ck_b]`,
//! with the checksum running over class through the end of the body.

use log::trace;

use crate::{
    checksum::UbxChecksum,
    constants::{
        UBX_CHECKSUM_LEN, UBX_CLASS_OFFSET, UBX_FRAME_OVERHEAD, UBX_HEADER_LEN, UBX_LENGTH_OFFSET,
        UBX_MAX_BODY_LEN, UBX_MSG_ID_OFFSET, UBX_SYNC_CHAR_1, UBX_SYNC_CHAR_2,
    },
    endian,
    error::{Error, Result},
};

/// Size of the frame carrying a body of `body_len` bytes.
pub const fn frame_len(body_len: usize) -> usize {
    body_len + UBX_FRAME_OVERHEAD
}

/// Writes a complete UBX frame for `class`/`id`/`body` into `out`, returning the
/// number of bytes written.
///
/// `out` must hold at least [`frame_len`]`(body.len())` bytes.
pub fn encode_into(class: u8, id: u8, body: &[u8], out: &mut [u8]) -> Result<usize> {
    if body.len() > UBX_MAX_BODY_LEN {
        return Err(Error::InvalidParameter("UBX body longer than 65535 bytes"));
    }
    let total = frame_len(body.len());
    if out.len() < total {
        return Err(Error::InvalidParameter("output buffer too small for UBX frame"));
    }

    out[0] = UBX_SYNC_CHAR_1;
    out[1] = UBX_SYNC_CHAR_2;
    out[UBX_CLASS_OFFSET] = class;
    out[UBX_MSG_ID_OFFSET] = id;
    let wire_len = endian::encode_u16(body.len() as u16);
    out[UBX_LENGTH_OFFSET..UBX_HEADER_LEN].copy_from_slice(&wire_len.to_ne_bytes());
    out[UBX_HEADER_LEN..UBX_HEADER_LEN + body.len()].copy_from_slice(body);

    let mut calc = UbxChecksum::new();
    calc.update(&out[UBX_CLASS_OFFSET..UBX_HEADER_LEN + body.len()]);
    let (ck_a, ck_b) = calc.result();
    out[total - UBX_CHECKSUM_LEN] = ck_a;
    out[total - 1] = ck_b;
    Ok(total)
}

/// Allocating variant of [`encode_into`].
pub fn encode(class: u8, id: u8, body: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(frame_len(body.len()))
        .map_err(|_| Error::NoMemory)?;
    out.resize(frame_len(body.len()), 0);
    encode_into(class, id, body, &mut out)?;
    Ok(out)
}

/// Header of a frame found by [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub class: u8,
    pub id: u8,
    /// True body length, which may exceed the space the caller supplied.
    pub body_len: usize,
}

/// Result of one [`decode`] call.
#[derive(Debug)]
pub struct DecodeOutcome {
    /// `Timeout` if a frame had started but the input ended before it
    /// completed, `NotFound` if no frame had started.
    pub status: Result<FrameInfo>,
    /// One past the last byte examined. Calling [`decode`] again from here
    /// continues the scan.
    pub consumed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    SeekSync1,
    SeekSync2,
    Class,
    Id,
    LengthLow,
    LengthHigh,
    Body,
    ChecksumA,
    ChecksumB,
}

/// Scans `input` for the first complete, checksum-valid UBX frame, copying at
/// most `body.len()` bytes of its body into `body`.
///
/// A checksum mismatch, or a first sync byte not followed by the second, resets
/// the scan to look for a new sync sequence from the following byte, so one
/// corrupted frame does not hide the valid frames after it.
pub fn decode(input: &[u8], body: &mut [u8]) -> DecodeOutcome {
    let mut state = DecodeState::SeekSync1;
    let mut calc = UbxChecksum::new();
    let (mut class, mut id) = (0, 0);
    let mut len_low = 0;
    let mut body_len = 0;
    let mut received = 0;
    let mut ck_a = 0;

    for (pos, &byte) in input.iter().enumerate() {
        match state {
            DecodeState::SeekSync1 => {
                if byte == UBX_SYNC_CHAR_1 {
                    state = DecodeState::SeekSync2;
                }
            },
            DecodeState::SeekSync2 => {
                state = match byte {
                    UBX_SYNC_CHAR_2 => {
                        calc = UbxChecksum::new();
                        DecodeState::Class
                    },
                    UBX_SYNC_CHAR_1 => DecodeState::SeekSync2,
                    _ => DecodeState::SeekSync1,
                };
            },
            DecodeState::Class => {
                class = byte;
                calc.update_byte(byte);
                state = DecodeState::Id;
            },
            DecodeState::Id => {
                id = byte;
                calc.update_byte(byte);
                state = DecodeState::LengthLow;
            },
            DecodeState::LengthLow => {
                len_low = byte;
                calc.update_byte(byte);
                state = DecodeState::LengthHigh;
            },
            DecodeState::LengthHigh => {
                calc.update_byte(byte);
                body_len = usize::from(endian::decode_u16(&[len_low, byte]));
                received = 0;
                state = if body_len == 0 {
                    DecodeState::ChecksumA
                } else {
                    DecodeState::Body
                };
            },
            DecodeState::Body => {
                if received < body.len() {
                    body[received] = byte;
                }
                calc.update_byte(byte);
                received += 1;
                if received == body_len {
                    state = DecodeState::ChecksumA;
                }
            },
            DecodeState::ChecksumA => {
                ck_a = byte;
                state = DecodeState::ChecksumB;
            },
            DecodeState::ChecksumB => {
                if calc.is_valid(ck_a, byte) {
                    return DecodeOutcome {
                        status: Ok(FrameInfo {
                            class,
                            id,
                            body_len,
                        }),
                        consumed: pos + 1,
                    };
                }
                trace!(
                    "UBX checksum mismatch for class {class:#04x} id {id:#04x}, resynchronising"
                );
                state = DecodeState::SeekSync1;
            },
        }
    }

    let status = if state == DecodeState::SeekSync1 {
        Err(Error::NotFound)
    } else {
        Err(Error::Timeout)
    };
    DecodeOutcome {
        status,
        consumed: input.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    static FULL_ACK_ACK_PACK: [u8; 10] = [0xb5, 0x62, 0x5, 0x1, 0x2, 0x0, 0x6, 0x1, 0xf, 0x38];

    #[test]
    fn encode_empty_body() {
        let frame = encode(0x06, 0x8b, &[]).unwrap();
        assert_eq!(frame, [0xb5, 0x62, 0x06, 0x8b, 0x00, 0x00, 0x91, 0xb9]);
    }

    #[test]
    fn encode_ack_ack() {
        assert_eq!(encode(0x05, 0x01, &[0x06, 0x01]).unwrap(), FULL_ACK_ACK_PACK);
    }

    #[test]
    fn encode_into_rejects_short_output() {
        let mut out = [0; 9];
        assert!(matches!(
            encode_into(0x05, 0x01, &[1, 2], &mut out),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn encode_rejects_oversized_body() {
        let body = vec![0; UBX_MAX_BODY_LEN + 1];
        assert!(matches!(
            encode(0x01, 0x07, &body),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn decode_single_frame() {
        let mut body = [0; 8];
        let out = decode(&FULL_ACK_ACK_PACK, &mut body);
        assert_eq!(
            out.status.unwrap(),
            FrameInfo {
                class: 5,
                id: 1,
                body_len: 2
            }
        );
        assert_eq!(out.consumed, FULL_ACK_ACK_PACK.len());
        assert_eq!(&body[..2], &[6, 1]);
    }

    #[test]
    fn decode_reports_true_length_with_small_output() {
        let mut body = [0; 1];
        let out = decode(&FULL_ACK_ACK_PACK, &mut body);
        assert_eq!(out.status.unwrap().body_len, 2);
        assert_eq!(body, [6]);
    }

    #[test]
    fn decode_partial_frame_times_out() {
        let mut body = [0; 8];
        for end in 1..FULL_ACK_ACK_PACK.len() {
            let out = decode(&FULL_ACK_ACK_PACK[..end], &mut body);
            assert!(matches!(out.status, Err(Error::Timeout)), "end {end}");
            assert_eq!(out.consumed, end);
        }
    }

    #[test]
    fn decode_without_sync_is_not_found() {
        let mut body = [0; 8];
        let out = decode(&[0x01, 0x02, 0x62, 0x13], &mut body);
        assert!(matches!(out.status, Err(Error::NotFound)));
        assert_eq!(out.consumed, 4);
        assert!(matches!(decode(&[], &mut body).status, Err(Error::NotFound)));
    }

    #[test]
    fn decode_handle_garbage_first_byte() {
        let mut bytes = vec![0xb5];
        bytes.extend_from_slice(&FULL_ACK_ACK_PACK);
        let mut body = [0; 8];
        let out = decode(&bytes, &mut body);
        assert_eq!(out.status.unwrap().id, 1);
        assert_eq!(out.consumed, bytes.len());
    }

    #[test]
    fn decode_recovers_after_bad_checksum() {
        let mut bad = FULL_ACK_ACK_PACK;
        bad[7] = 5;
        let mut bytes = bad.to_vec();
        bytes.extend_from_slice(&FULL_ACK_ACK_PACK);

        let mut body = [0; 8];
        let out = decode(&bytes, &mut body);
        assert_eq!(out.status.unwrap().body_len, 2);
        assert_eq!(out.consumed, bytes.len());
        assert_eq!(&body[..2], &[6, 1]);
    }

    #[test]
    fn decode_repeatedly_over_growing_buffer() {
        let mut stream = vec![0x00, 0x11];
        stream.extend_from_slice(&FULL_ACK_ACK_PACK);
        stream.extend_from_slice(&encode(0x01, 0x07, &[9; 92]).unwrap());

        let mut body = [0; 128];
        let first = decode(&stream, &mut body);
        assert_eq!(first.status.unwrap().class, 5);
        let second = decode(&stream[first.consumed..], &mut body);
        let info = second.status.unwrap();
        assert_eq!((info.class, info.id, info.body_len), (1, 7, 92));
        assert_eq!(first.consumed + second.consumed, stream.len());
    }

    proptest! {
        #[test]
        fn round_trip(class: u8, id: u8, body in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let frame = encode(class, id, &body).unwrap();
            let mut out = vec![0; body.len()];
            let decoded = decode(&frame, &mut out);
            let info = decoded.status.unwrap();
            prop_assert_eq!((info.class, info.id, info.body_len), (class, id, body.len()));
            prop_assert_eq!(out, body);
            prop_assert_eq!(decoded.consumed, frame.len());
        }

        #[test]
        fn single_bit_flip_is_never_accepted(
            class: u8,
            id: u8,
            body in proptest::collection::vec(any::<u8>(), 0..64),
            bit in 0usize..8,
            pos_seed: usize,
        ) {
            let mut frame = encode(class, id, &body).unwrap();
            // Anything from the class byte up to the last checksum byte
            let pos = UBX_CLASS_OFFSET + pos_seed % (frame.len() - UBX_CLASS_OFFSET);
            frame[pos] ^= 1 << bit;

            let mut out = vec![0; 0x1_0000];
            if let Ok(info) = decode(&frame, &mut out).status {
                prop_assert_ne!(info.body_len, body.len());
            }
        }
    }
}
