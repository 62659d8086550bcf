//! Turns a raw frame into a typed message.
//!
//! Decoders for the common UBX navigation messages and for generic NMEA
//! sentences are built in; anything else goes to an optional user supplied
//! fallback.

pub mod packets;

use std::{
    any::Any,
    sync::{RwLock, RwLockReadGuard},
};

use log::trace;

use crate::{
    classify::{classify, Classification},
    constants::UBX_CLASS_ACK,
    error::{Error, Result},
    message_id::{MessageId, Protocols, UbxMessageId},
};

pub use packets::{
    Ack, GnssFixType, MonVer, NavHpPosLlh, NavPosLlh, NavPvt, NavPvtFlags, NavPvtFlags2,
    NavPvtValidFlags, NavTimeUtc, NavTimeUtcFlags, NmeaSentence, Position, UbxPacketMeta,
    Velocity,
};

/// A decoded message.
#[derive(Debug)]
pub enum DecodedMessage {
    NavPvt(NavPvt),
    NavPosLlh(NavPosLlh),
    NavHpPosLlh(NavHpPosLlh),
    NavTimeUtc(NavTimeUtc),
    Ack(Ack),
    MonVer(MonVer),
    Nmea(NmeaSentence),
    /// Whatever a fallback decoder produced.
    Custom(Box<dyn Any + Send + Sync>),
}

macro_rules! from_packet {
    ($($variant:ident),+) => {
        $(
            impl From<$variant> for DecodedMessage {
                fn from(packet: $variant) -> Self {
                    Self::$variant(packet)
                }
            }
        )+
    };
}

from_packet!(NavPvt, NavPosLlh, NavHpPosLlh, NavTimeUtc, MonVer);

/// Decodes the body of a message with the given concrete identifier.
pub type DecodeFn = fn(&MessageId, &[u8]) -> Result<DecodedMessage>;

/// Fallback for messages no built-in decoder handles; state it needs is
/// captured by the closure.
pub type FallbackDecoder = Box<dyn Fn(&MessageId, &[u8]) -> Result<DecodedMessage> + Send + Sync>;

struct DecoderEntry {
    id: MessageId,
    decode: DecodeFn,
}

fn decode_ubx<T>(_: &MessageId, body: &[u8]) -> Result<DecodedMessage>
where
    T: UbxPacketMeta + Into<DecodedMessage>,
{
    T::parse(body).map(Into::into)
}

fn decode_ack(id: &MessageId, body: &[u8]) -> Result<DecodedMessage> {
    let (_, msg_id) = id.concrete_ubx().ok_or(Error::NoDecoder)?;
    Ack::parse(msg_id, body).map(DecodedMessage::Ack)
}

fn decode_nmea(_: &MessageId, body: &[u8]) -> Result<DecodedMessage> {
    NmeaSentence::parse(body).map(DecodedMessage::Nmea)
}

const fn ubx_entry<T>() -> DecoderEntry
where
    T: UbxPacketMeta + Into<DecodedMessage>,
{
    DecoderEntry {
        id: MessageId::ubx(T::CLASS, T::ID),
        decode: decode_ubx::<T>,
    }
}

/// First match wins.
static DECODERS: [DecoderEntry; 7] = [
    ubx_entry::<NavPvt>(),
    ubx_entry::<NavPosLlh>(),
    ubx_entry::<NavHpPosLlh>(),
    ubx_entry::<NavTimeUtc>(),
    ubx_entry::<MonVer>(),
    // ACK-ACK and ACK-NAK share one decoder
    DecoderEntry {
        id: MessageId::Ubx(UbxMessageId::class(UBX_CLASS_ACK)),
        decode: decode_ack,
    },
    DecoderEntry {
        id: MessageId::Nmea(String::new()),
        decode: decode_nmea,
    },
];

/// Table of built-in decoders plus one replaceable fallback.
#[derive(Default)]
pub struct DecoderRegistry {
    fallback: RwLock<Option<FallbackDecoder>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers of the built-in decoders, in lookup order.
    pub fn id_list(&self) -> impl Iterator<Item = &'static MessageId> {
        DECODERS.iter().map(|entry| &entry.id)
    }

    /// Installs `decoder` as the fallback, replacing any previous one.
    pub fn set_fallback<F>(&self, decoder: F)
    where
        F: Fn(&MessageId, &[u8]) -> Result<DecodedMessage> + Send + Sync + 'static,
    {
        *self
            .fallback
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(Box::new(decoder));
    }

    pub fn clear_fallback(&self) {
        *self
            .fallback
            .write()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn fallback(&self) -> RwLockReadGuard<'_, Option<FallbackDecoder>> {
        self.fallback.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Decodes the message at the start of `frame`, which must hold the
    /// complete frame including its framing bytes.
    ///
    /// The identifier is returned whenever the frame was recognised, even if
    /// decoding it then failed.
    pub fn decode(&self, frame: &[u8]) -> (Option<MessageId>, Result<DecodedMessage>) {
        let (id, body_len) = match classify(frame, Protocols::all(), usize::MAX) {
            Classification::Message { id, body_len, .. } => (id, body_len),
            Classification::Incomplete => return (None, Err(Error::Timeout)),
            Classification::Empty | Classification::Unknown => {
                return (None, Err(Error::NotFound))
            },
        };
        let start = id.body_offset();
        let body = &frame[start..start + body_len];

        let result = match DECODERS.iter().find(|entry| entry.id.is_wanted(&id)) {
            Some(entry) => (entry.decode)(&id, body),
            None => match self.fallback().as_ref() {
                Some(fallback) => fallback(&id, body),
                None => {
                    trace!("no decoder for {id}");
                    Err(Error::NoDecoder)
                },
            },
        };
        (Some(id), result)
    }
}
