//! # ublox_transport
//!
//! Message transport core for u-blox GNSS receivers. Bytes arriving from a
//! [`Transport`] (serial port, I2C, a replayed capture, ...) are buffered in a
//! multi-cursor [`RingBuffer`], split into UBX, NMEA and RTCM 3 messages and
//! handed either to a blocking receive or to subscribers of an asynchronous
//! receive task.
//!
//! Sending Messages
//! ================
//!
//! Sends bypass the buffer and go straight to the transport:
//! ```
//! use ublox_transport::{Device, DeviceConfig, MemoryTransport};
//!
//! let (transport, link) = MemoryTransport::new();
//! let device = Device::new(transport, DeviceConfig::default()).unwrap();
//! device.send_ubx(0x06, 0x8b, &[]).unwrap();
//! assert_eq!(link.take_written(), [0xb5, 0x62, 0x06, 0x8b, 0x00, 0x00, 0x91, 0xb9]);
//! ```
//!
//! Receiving Messages
//! ==================
//!
//! A blocking receive waits for the next message matching a [`MessageId`],
//! which may contain wildcards:
//! ```
//! use std::time::Duration;
//! use ublox_transport::{codec, Device, DeviceConfig, MemoryTransport, MessageId};
//!
//! let (transport, link) = MemoryTransport::new();
//! let device = Device::new(transport, DeviceConfig::default()).unwrap();
//! link.inject(b"$GPTXT,01,01,02,hello*00\r\n");
//! link.inject(&codec::encode(0x01, 0x07, &[0; 92]).unwrap());
//!
//! let msg = device.receive(&MessageId::ubx(0x01, 0x07), Duration::from_secs(1)).unwrap();
//! assert_eq!(msg.body_len, 92);
//! ```
//!
//! Subscribers registered with [`Device::receive_start`] are called from a
//! background thread for every matching message, most recent subscriber
//! first, until [`Device::receive_stop`] removes them.
//!
//! Decoding
//! ========
//!
//! [`DecoderRegistry`] turns a complete frame into a typed message for the
//! common navigation messages, and passes anything else to an optional
//! fallback decoder.

pub mod checksum;
pub mod classify;
pub mod codec;
pub mod config;
pub mod constants;
pub mod decode;
pub mod device;
pub mod dispatch;
pub mod endian;
pub mod error;
pub mod message_id;
pub mod registry;
pub mod ring;
#[cfg(feature = "serialport")]
pub mod serialport;
pub mod transport;

pub use crate::{
    checksum::{nmea_checksum, ubx_checksum, UbxChecksum},
    classify::{classify, Classification, CursorView, Peek},
    config::DeviceConfig,
    decode::{DecodedMessage, DecoderRegistry},
    device::{Device, ReceivedMessage},
    dispatch::{MessageReader, SubscriberHandle},
    error::{DateTimeError, Error, Result},
    message_id::{MessageId, Protocols, UbxMessageId},
    registry::{DeviceHandle, Registry},
    ring::{ReadHandle, RingBuffer},
    transport::{MemoryTransport, MemoryTransportHandle, Transport},
};
