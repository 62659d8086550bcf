pub const UBX_SYNC_CHAR_1: u8 = 0xb5;
pub const UBX_SYNC_CHAR_2: u8 = 0x62;
pub(crate) const UBX_SYNC_SIZE: usize = 2;
pub(crate) const UBX_PAYLOAD_SIZE_LEN: usize = 2;
pub(crate) const UBX_CLASS_LEN: usize = 1;
pub(crate) const UBX_ID_LEN: usize = 1;
pub const UBX_HEADER_LEN: usize =
    UBX_SYNC_SIZE + UBX_PAYLOAD_SIZE_LEN + UBX_CLASS_LEN + UBX_ID_LEN;
pub const UBX_CHECKSUM_LEN: usize = 2;
/// Bytes a UBX frame adds around its body.
pub const UBX_FRAME_OVERHEAD: usize = UBX_HEADER_LEN + UBX_CHECKSUM_LEN;
pub const UBX_MAX_BODY_LEN: usize = u16::MAX as usize;

pub(crate) const UBX_CLASS_OFFSET: usize = 2; // After SYNC_CHAR_1, SYNC_CHAR_2
pub(crate) const UBX_MSG_ID_OFFSET: usize = 3; // After CLASS
pub(crate) const UBX_LENGTH_OFFSET: usize = 4; // After MSG_ID

pub const UBX_CLASS_ACK: u8 = 0x05;
pub const UBX_ID_ACK_NAK: u8 = 0x00;
pub const UBX_ID_ACK_ACK: u8 = 0x01;

pub const NMEA_SYNC_CHAR: u8 = 0x24; // '$'
pub const NMEA_CHECKSUM_CHAR: u8 = 0x2a; // '*'
pub const NMEA_FIELD_SEPARATOR: u8 = 0x2c; // ','
pub const NMEA_END_CHAR_1: u8 = 0x0d; // '\r' (<CR>)
pub const NMEA_END_CHAR_2: u8 = 0x0a; // '\n' (<LF>)
/// Upper bound on the talker + sentence identifier, e.g. `GPGGA` or `PUBX`.
pub const NMEA_MAX_ID_LEN: usize = 8;
pub const NMEA_MAX_SENTENCE_LENGTH: usize = 82; // Maximum NMEA sentence length
pub(crate) const NMEA_MIN_SENTENCE_LENGTH: usize = 8; // sync (1) + id (1) + ',' (1) + '*hh' (3) + end chars (2)
/// `$` and `*hh\r\n` around the sentence body.
pub(crate) const NMEA_FRAME_OVERHEAD: usize = 6;

pub const RTCM_SYNC_CHAR: u8 = 0xd3;
pub(crate) const RTCM_HEADER_SIZE: usize = 3; // sync char (1) + length field (2)
pub(crate) const RTCM_CRC_SIZE: usize = 3;
pub(crate) const RTCM_LENGTH_MASK: u16 = 0x03ff; // 10 bits for length (6 bits reserved)
pub(crate) const RTCM_RESERVED_MASK: u8 = 0xfc;
pub const RTCM_MAX_BODY_LEN: usize = RTCM_LENGTH_MASK as usize;
