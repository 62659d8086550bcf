//! Byte streams mixing the three protocols with noise, pushed through the
//! ring buffer and classifier in arbitrary chunks.

use proptest::prelude::*;
use rand::RngExt;
use ublox_transport::{
    classify::next_message,
    codec,
    constants::{NMEA_SYNC_CHAR, RTCM_SYNC_CHAR, UBX_SYNC_CHAR_1},
    nmea_checksum, MessageId, Protocols, RingBuffer,
};

fn nmea(body: &str) -> Vec<u8> {
    format!("${body}*{:02X}\r\n", nmea_checksum(body.as_bytes())).into_bytes()
}

fn rtcm_1005() -> Vec<u8> {
    let mut frame = vec![0xd3, 0x00, 0x13, 0x3e, 0xd0];
    frame.resize(25, 0);
    frame
}

/// Random bytes that cannot start a frame of any protocol.
fn noise(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let b: u8 = rng.random_range(0..=u8::MAX);
        if ![UBX_SYNC_CHAR_1, NMEA_SYNC_CHAR, RTCM_SYNC_CHAR].contains(&b) {
            out.push(b);
        }
    }
    out
}

/// Feeds `stream` in `chunk` sized writes, pulling every complete message
/// after each write.
fn collect_ids(stream: &[u8], chunk: usize, wanted: Protocols) -> Vec<MessageId> {
    let ring = RingBuffer::new(1024, 1).unwrap();
    let handle = ring.take_read_handle().unwrap();
    let mut ids = Vec::new();
    for piece in stream.chunks(chunk) {
        ring.write(piece);
        while let Some((id, frame_len, _)) = next_message(&ring, &handle, wanted) {
            ring.discard_handle(&handle, frame_len);
            ids.push(id);
        }
    }
    assert_eq!(ring.stat_read_loss_handle(&handle), 0);
    ids
}

fn mixed_stream() -> (Vec<u8>, Vec<MessageId>) {
    let mut stream = Vec::new();
    stream.extend(noise(37));
    stream.extend(codec::encode(0x01, 0x07, &[0x11; 92]).unwrap());
    stream.extend(noise(5));
    stream.extend(nmea("GNGGA,092725.00,4717.11399,N,00833.91590,E,1,08"));
    stream.extend(rtcm_1005());
    stream.extend(noise(64));
    stream.extend(codec::encode(0x05, 0x01, &[0x06, 0x01]).unwrap());
    stream.extend(nmea("GPGSV,3,1,11"));
    let ids = vec![
        MessageId::ubx(0x01, 0x07),
        MessageId::nmea("GNGGA"),
        MessageId::rtcm(1005),
        MessageId::ubx(0x05, 0x01),
        MessageId::nmea("GPGSV"),
    ];
    (stream, ids)
}

#[test]
fn test_mixed_stream_in_random_chunks() {
    let (stream, expect) = mixed_stream();
    let mut rng = rand::rng();
    for _ in 0..20 {
        let chunk = rng.random_range(1..64);
        assert_eq!(collect_ids(&stream, chunk, Protocols::all()), expect);
    }
}

#[test]
fn test_protocol_filter() {
    let (stream, _) = mixed_stream();
    assert_eq!(
        collect_ids(&stream, 16, Protocols::NMEA),
        [MessageId::nmea("GNGGA"), MessageId::nmea("GPGSV")]
    );
    assert_eq!(
        collect_ids(&stream, 16, Protocols::UBX | Protocols::RTCM),
        [
            MessageId::ubx(0x01, 0x07),
            MessageId::rtcm(1005),
            MessageId::ubx(0x05, 0x01)
        ]
    );
}

#[test]
fn test_corrupted_frames_are_skipped() {
    let mut bad_ubx = codec::encode(0x01, 0x02, &[0; 28]).unwrap();
    let last = bad_ubx.len() - 1;
    bad_ubx[last] ^= 0xff;
    let mut bad_nmea = nmea("GPGLL,5057.970,N");
    bad_nmea[3] = b'X';

    let mut stream = bad_ubx;
    stream.extend(bad_nmea);
    stream.extend(codec::encode(0x01, 0x21, &[0; 20]).unwrap());
    assert_eq!(
        collect_ids(&stream, 7, Protocols::all()),
        [MessageId::ubx(0x01, 0x21)]
    );
}

proptest! {
    #[test]
    fn test_trailing_frame_always_found(
        junk in prop::collection::vec(any::<u8>(), 0..300),
        chunk in 1usize..128,
    ) {
        // Padding long enough to complete any candidate the junk may start,
        // so none of them can hold the frame back.
        let frame = codec::encode(0x05, 0x01, &[0x06, 0x01]).unwrap();
        let mut stream = junk.clone();
        stream.extend(&frame);
        stream.extend(std::iter::repeat_n(0u8, 2048 + 300));

        let ring = RingBuffer::new(2048, 1).unwrap();
        let handle = ring.take_read_handle().unwrap();
        let mut found = false;
        for piece in stream.chunks(chunk) {
            ring.write(piece);
            while let Some((id, frame_len, _)) = next_message(&ring, &handle, Protocols::UBX) {
                ring.discard_handle(&handle, frame_len);
                found |= id == MessageId::ubx(0x05, 0x01);
            }
        }
        prop_assert!(found);
    }
}
