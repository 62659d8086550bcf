use core::fmt;

use bitflags::bitflags;

bitflags! {
    /// Set of protocols a classifier pass is interested in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protocols: u8 {
        const UBX = 0x01;
        const NMEA = 0x02;
        const RTCM = 0x04;
    }
}

/// UBX class/id pair; `None` in either position matches every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UbxMessageId {
    pub class: Option<u8>,
    pub id: Option<u8>,
}

impl UbxMessageId {
    pub const ALL: Self = Self {
        class: None,
        id: None,
    };

    pub const fn new(class: u8, id: u8) -> Self {
        Self {
            class: Some(class),
            id: Some(id),
        }
    }

    /// Every message of `class`.
    pub const fn class(class: u8) -> Self {
        Self {
            class: Some(class),
            id: None,
        }
    }

    pub const fn is_concrete(&self) -> bool {
        self.class.is_some() && self.id.is_some()
    }

    pub fn matches(&self, class: u8, id: u8) -> bool {
        self.class.is_none_or(|c| c == class) && self.id.is_none_or(|i| i == id)
    }
}

/// Protocol-tagged identifier of a message.
///
/// Used both for the identifier of a message seen on the wire (always
/// concrete) and for the pattern a receiver or subscriber is waiting for
/// (may contain wildcards).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Ubx(UbxMessageId),
    /// Talker + sentence identifier such as `GPGGA`. As a pattern this is a
    /// prefix: `GP` matches every GPS sentence and the empty string matches
    /// every sentence.
    Nmea(String),
    /// RTCM 3 message type; `None` matches every type.
    Rtcm(Option<u16>),
    /// Matches any message of any protocol.
    Any,
}

impl MessageId {
    pub const fn ubx(class: u8, id: u8) -> Self {
        Self::Ubx(UbxMessageId::new(class, id))
    }

    pub fn nmea(sentence: impl Into<String>) -> Self {
        Self::Nmea(sentence.into())
    }

    pub const fn rtcm(message_type: u16) -> Self {
        Self::Rtcm(Some(message_type))
    }

    /// Protocols a message must belong to in order to match this pattern.
    pub fn protocols(&self) -> Protocols {
        match self {
            Self::Ubx(_) => Protocols::UBX,
            Self::Nmea(_) => Protocols::NMEA,
            Self::Rtcm(_) => Protocols::RTCM,
            Self::Any => Protocols::all(),
        }
    }

    /// The UBX class/id this pattern names exactly, if it names one.
    pub fn concrete_ubx(&self) -> Option<(u8, u8)> {
        match self {
            Self::Ubx(UbxMessageId {
                class: Some(class),
                id: Some(id),
            }) => Some((*class, *id)),
            _ => None,
        }
    }

    /// Offset of the message body within a frame of this protocol.
    pub fn body_offset(&self) -> usize {
        match self {
            Self::Ubx(_) => crate::constants::UBX_HEADER_LEN,
            Self::Nmea(_) => 1,
            Self::Rtcm(_) => crate::constants::RTCM_HEADER_SIZE,
            Self::Any => 0,
        }
    }

    /// Does the concrete identifier `actual` satisfy this pattern?
    pub fn is_wanted(&self, actual: &MessageId) -> bool {
        match (self, actual) {
            (Self::Any, _) => true,
            (Self::Ubx(wanted), Self::Ubx(got)) => match (got.class, got.id) {
                (Some(class), Some(id)) => wanted.matches(class, id),
                _ => false,
            },
            (Self::Nmea(wanted), Self::Nmea(got)) => got.starts_with(wanted.as_str()),
            (Self::Rtcm(wanted), Self::Rtcm(Some(got))) => wanted.is_none_or(|w| w == *got),
            _ => false,
        }
    }
}

impl From<UbxMessageId> for MessageId {
    fn from(id: UbxMessageId) -> Self {
        Self::Ubx(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ubx(UbxMessageId { class, id }) => {
                f.write_str("UBX ")?;
                match class {
                    Some(class) => write!(f, "{class:#04x}")?,
                    None => f.write_str("*")?,
                }
                f.write_str("/")?;
                match id {
                    Some(id) => write!(f, "{id:#04x}"),
                    None => f.write_str("*"),
                }
            },
            Self::Nmea(sentence) if sentence.is_empty() => f.write_str("NMEA *"),
            Self::Nmea(sentence) => write!(f, "NMEA {sentence}"),
            Self::Rtcm(Some(message_type)) => write!(f, "RTCM {message_type}"),
            Self::Rtcm(None) => f.write_str("RTCM *"),
            Self::Any => f.write_str("*"),
        }
    }
}
