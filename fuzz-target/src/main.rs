#[macro_use]
extern crate afl;

use ublox_transport::{classify::next_message, codec, MessageId, Protocols, RingBuffer};

const RING_CAPACITY: usize = 512;

/// Pushes `data` through the ring buffer in `chunk_size` writes, then checks
/// that an ACK-ACK appended after enough padding to close any partial
/// candidate is still recovered.
fn parse(chunk_size: usize, data: &[u8]) {
    let ring = RingBuffer::new(RING_CAPACITY, 1).unwrap();
    let handle = ring.take_read_handle().unwrap();
    let drain = |ring: &RingBuffer| {
        let mut ids = Vec::new();
        while let Some((id, frame_len, body_len)) = next_message(ring, &handle, Protocols::all()) {
            assert!(body_len < frame_len);
            assert!(frame_len <= RING_CAPACITY);
            ring.discard_handle(&handle, frame_len);
            ids.push(id);
        }
        ids
    };

    for chunk in data.chunks(chunk_size) {
        ring.write(chunk);
        drain(&ring);
    }
    ring.write(&[0; RING_CAPACITY]);
    drain(&ring);

    let ack_ack = [0xb5, 0x62, 0x5, 0x1, 0x2, 0x0, 0x4, 0x5, 0x11, 0x38];
    ring.write(&ack_ack);
    assert_eq!(drain(&ring), [MessageId::ubx(0x05, 0x01)]);

    // The frame scanner agrees with the classifier
    let mut body = [0; 2];
    let outcome = codec::decode(&ack_ack, &mut body);
    assert_eq!(outcome.consumed, ack_ack.len());
    assert_eq!(body, [0x04, 0x05]);
}

fn main() {
    fuzz!(|data: &[u8]| {
        if data.len() > 1 {
            let chunk_size = data[0] as usize;
            if chunk_size != 0 {
                parse(chunk_size, &data[1..]);
            }
        }
    });
}
