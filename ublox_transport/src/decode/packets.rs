//! Typed bodies of the messages the decoder registry understands.
//!
//! Field offsets follow the u-blox interface description; every multi-byte
//! field is little-endian.

use bitflags::bitflags;
use chrono::prelude::*;

use crate::{
    constants::{UBX_CLASS_ACK, UBX_ID_ACK_ACK, UBX_ID_ACK_NAK},
    endian,
    error::{DateTimeError, Error, Result},
};

/// Class, id and minimal body length of a UBX message, plus its parser.
pub trait UbxPacketMeta: Sized {
    const CLASS: u8;
    const ID: u8;
    /// Shortest body the message can have.
    const MIN_PAYLOAD_LEN: usize;

    /// Parses a body already known to be at least [`Self::MIN_PAYLOAD_LEN`] long.
    fn from_body(body: &[u8]) -> Result<Self>;

    fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < Self::MIN_PAYLOAD_LEN {
            return Err(Error::Truncated {
                expect: Self::MIN_PAYLOAD_LEN,
                got: body.len(),
            });
        }
        Self::from_body(body)
    }
}

fn u16_at(body: &[u8], at: usize) -> u16 {
    endian::decode_u16(&body[at..])
}

fn u32_at(body: &[u8], at: usize) -> u32 {
    endian::decode_u32(&body[at..])
}

fn i32_at(body: &[u8], at: usize) -> i32 {
    u32_at(body, at) as i32
}

/// GNSS fix type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GnssFixType {
    NoFix,
    DeadReckoningOnly,
    Fix2D,
    Fix3D,
    GPSPlusDeadReckoning,
    TimeOnlyFix,
    Reserved(u8),
}

impl From<u8> for GnssFixType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::NoFix,
            1 => Self::DeadReckoningOnly,
            2 => Self::Fix2D,
            3 => Self::Fix3D,
            4 => Self::GPSPlusDeadReckoning,
            5 => Self::TimeOnlyFix,
            other => Self::Reserved(other),
        }
    }
}

bitflags! {
    /// Validity flags of `NavPvt`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NavPvtValidFlags: u8 {
        /// 1 = valid UTC Date
        const VALID_DATE = 0x01;
        /// 1 = valid UTC time of day
        const VALID_TIME = 0x02;
        /// 1 = UTC time of day has been fully resolved (no seconds uncertainty).
        const FULLY_RESOLVED = 0x04;
        /// 1 = valid magnetic declination
        const VALID_MAG = 0x08;
    }
}

bitflags! {
    /// Fix status flags for `NavPvt`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NavPvtFlags: u8 {
        /// 1 = Position and velocity valid and within DOP and accuracy masks
        const GPS_FIX_OK = 1;
        /// 1 = Differential corrections were applied; DGPS used
        const DIFF_SOLN = 2;
        /// 1 = Heading of vehicle is valid, only set if the receiver is in sensor fusion mode
        const HEAD_VEH_VALID = 0x20;
        /// 1 = Carrier phase range solution with floating ambiguities
        const CARR_SOLN_FLOAT = 0x40;
        /// 1 = Carrier phase range solution with fixed ambiguities
        const CARR_SOLN_FIXED = 0x80;
    }
}

bitflags! {
    /// Additional flags for `NavPvt`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NavPvtFlags2: u8 {
        /// 1 = information about UTC Date and Time of Day validity confirmation is available
        const CONFIRMED_AVAI = 0x20;
        /// 1 = UTC Date validity could be confirmed
        const CONFIRMED_DATE = 0x40;
        /// 1 = UTC Time of Day could be confirmed
        const CONFIRMED_TIME = 0x80;
    }
}

/// Navigation Position Velocity Time Solution (UBX-NAV-PVT)
///
/// Angles are kept as received: degrees scaled by 1e-7 for positions and by
/// 1e-5 for headings. Lengths are millimetres, speeds mm/s.
#[derive(Debug, Clone, PartialEq)]
pub struct NavPvt {
    /// GPS Millisecond time of week of the navigation epoch.
    pub itow: u32,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    pub valid: NavPvtValidFlags,
    /// Time accuracy estimate in nanoseconds (UTC)
    pub time_accuracy: u32,
    /// Fraction of second, range -1e9 .. 1e9 (UTC)
    pub nanosec: i32,
    pub fix_type: GnssFixType,
    pub flags: NavPvtFlags,
    pub flags2: NavPvtFlags2,
    pub num_satellites: u8,
    pub lon: i32,
    pub lat: i32,
    pub height: i32,
    pub height_msl: i32,
    pub h_acc: u32,
    pub v_acc: u32,
    pub vel_north: i32,
    pub vel_east: i32,
    pub vel_down: i32,
    pub g_speed: i32,
    pub head_motion: i32,
    pub s_acc: u32,
    pub head_acc: u32,
    /// Position DOP, scaled by 1e-2
    pub pdop: u16,
    pub flags3: u16,
    pub head_vehicle: i32,
    pub magnetic_declination: i16,
    pub magnetic_declination_accuracy: u16,
}

impl UbxPacketMeta for NavPvt {
    const CLASS: u8 = 0x01;
    const ID: u8 = 0x07;
    const MIN_PAYLOAD_LEN: usize = 92;

    fn from_body(b: &[u8]) -> Result<Self> {
        Ok(Self {
            itow: u32_at(b, 0),
            year: u16_at(b, 4),
            month: b[6],
            day: b[7],
            hour: b[8],
            min: b[9],
            sec: b[10],
            valid: NavPvtValidFlags::from_bits_truncate(b[11]),
            time_accuracy: u32_at(b, 12),
            nanosec: i32_at(b, 16),
            fix_type: b[20].into(),
            flags: NavPvtFlags::from_bits_truncate(b[21]),
            flags2: NavPvtFlags2::from_bits_truncate(b[22]),
            num_satellites: b[23],
            lon: i32_at(b, 24),
            lat: i32_at(b, 28),
            height: i32_at(b, 32),
            height_msl: i32_at(b, 36),
            h_acc: u32_at(b, 40),
            v_acc: u32_at(b, 44),
            vel_north: i32_at(b, 48),
            vel_east: i32_at(b, 52),
            vel_down: i32_at(b, 56),
            g_speed: i32_at(b, 60),
            head_motion: i32_at(b, 64),
            s_acc: u32_at(b, 68),
            head_acc: u32_at(b, 72),
            pdop: u16_at(b, 76),
            flags3: u16_at(b, 78),
            head_vehicle: i32_at(b, 84),
            magnetic_declination: u16_at(b, 88) as i16,
            magnetic_declination_accuracy: u16_at(b, 90),
        })
    }
}

impl NavPvt {
    pub fn longitude(&self) -> f64 {
        f64::from(self.lon) * 1e-7
    }

    pub fn latitude(&self) -> f64 {
        f64::from(self.lat) * 1e-7
    }

    /// Height above mean sea level in meters
    pub fn height_msl_meters(&self) -> f64 {
        f64::from(self.height_msl) * 1e-3
    }

    /// Ground speed in m/s
    pub fn ground_speed_2d(&self) -> f64 {
        f64::from(self.g_speed) * 1e-3
    }

    /// Heading of motion in degrees
    pub fn heading_motion(&self) -> f64 {
        f64::from(self.head_motion) * 1e-5
    }

    /// 1 = Invalid lon, lat, height and hMSL
    pub fn invalid_llh(&self) -> bool {
        self.flags3 & 0x01 == 1
    }

    pub fn has_time(&self) -> bool {
        matches!(
            self.fix_type,
            GnssFixType::Fix3D | GnssFixType::GPSPlusDeadReckoning | GnssFixType::TimeOnlyFix
        )
    }

    pub fn has_position(&self) -> bool {
        matches!(
            self.fix_type,
            GnssFixType::Fix3D | GnssFixType::GPSPlusDeadReckoning
        )
    }
}

fn utc_date_time(
    year: u16,
    month: u8,
    day: u8,
    hms: (u8, u8, u8),
    nanos: i32,
) -> core::result::Result<DateTime<Utc>, DateTimeError> {
    let date = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
        .ok_or(DateTimeError::InvalidDate)?;
    let time = NaiveTime::from_hms_opt(u32::from(hms.0), u32::from(hms.1), u32::from(hms.2))
        .ok_or(DateTimeError::InvalidTime)?;
    const NANOS_LIM: u32 = 1_000_000_000;
    if nanos.unsigned_abs() >= NANOS_LIM {
        return Err(DateTimeError::InvalidNanoseconds);
    }
    let dt = NaiveDateTime::new(date, time) + chrono::Duration::nanoseconds(i64::from(nanos));
    Ok(DateTime::from_naive_utc_and_offset(dt, Utc))
}

impl TryFrom<&NavPvt> for DateTime<Utc> {
    type Error = DateTimeError;

    fn try_from(sol: &NavPvt) -> core::result::Result<Self, Self::Error> {
        utc_date_time(
            sol.year,
            sol.month,
            sol.day,
            (sol.hour, sol.min, sol.sec),
            sol.nanosec,
        )
    }
}

/// Geodetic Position Solution (UBX-NAV-POSLLH)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavPosLlh {
    pub itow: u32,
    pub lon: i32,
    pub lat: i32,
    pub height: i32,
    pub height_msl: i32,
    pub h_acc: u32,
    pub v_acc: u32,
}

impl UbxPacketMeta for NavPosLlh {
    const CLASS: u8 = 0x01;
    const ID: u8 = 0x02;
    const MIN_PAYLOAD_LEN: usize = 28;

    fn from_body(b: &[u8]) -> Result<Self> {
        Ok(Self {
            itow: u32_at(b, 0),
            lon: i32_at(b, 4),
            lat: i32_at(b, 8),
            height: i32_at(b, 12),
            height_msl: i32_at(b, 16),
            h_acc: u32_at(b, 20),
            v_acc: u32_at(b, 24),
        })
    }
}

/// High Precision Geodetic Position Solution (UBX-NAV-HPPOSLLH)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavHpPosLlh {
    pub version: u8,
    pub flags: u8,
    pub itow: u32,
    pub lon: i32,
    pub lat: i32,
    pub height: i32,
    pub height_msl: i32,
    /// Precise longitude in deg * 1e-7 = lon + (lon_hp * 1e-2)
    pub lon_hp: i8,
    pub lat_hp: i8,
    /// Precise height in mm = height + (height_hp * 0.1)
    pub height_hp: i8,
    pub height_msl_hp: i8,
    /// Horizontal accuracy estimate, 0.1 mm
    pub h_acc: u32,
    pub v_acc: u32,
}

impl UbxPacketMeta for NavHpPosLlh {
    const CLASS: u8 = 0x01;
    const ID: u8 = 0x14;
    const MIN_PAYLOAD_LEN: usize = 36;

    fn from_body(b: &[u8]) -> Result<Self> {
        Ok(Self {
            version: b[0],
            flags: b[3],
            itow: u32_at(b, 4),
            lon: i32_at(b, 8),
            lat: i32_at(b, 12),
            height: i32_at(b, 16),
            height_msl: i32_at(b, 20),
            lon_hp: b[24] as i8,
            lat_hp: b[25] as i8,
            height_hp: b[26] as i8,
            height_msl_hp: b[27] as i8,
            h_acc: u32_at(b, 28),
            v_acc: u32_at(b, 32),
        })
    }
}

impl NavHpPosLlh {
    pub fn longitude(&self) -> f64 {
        f64::from(self.lon) * 1e-7 + f64::from(self.lon_hp) * 1e-9
    }

    pub fn latitude(&self) -> f64 {
        f64::from(self.lat) * 1e-7 + f64::from(self.lat_hp) * 1e-9
    }

    /// Height above ellipsoid in meters
    pub fn height_meters(&self) -> f64 {
        f64::from(self.height) * 1e-3 + f64::from(self.height_hp) * 1e-4
    }

    /// 1 = Invalid lon, lat, height, hMSL and their high precision components
    pub fn invalid_llh(&self) -> bool {
        self.flags & 0x01 == 1
    }
}

bitflags! {
    /// Validity Flags of `NavTimeUtc`
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NavTimeUtcFlags: u8 {
        /// Valid Time of Week
        const VALID_TOW = 1;
        /// Valid Week Number
        const VALID_WKN = 2;
        /// Valid UTC (Leap Seconds already known)
        const VALID_UTC = 4;
    }
}

/// UTC Time Solution (UBX-NAV-TIMEUTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavTimeUtc {
    pub itow: u32,
    pub time_accuracy_estimate_ns: u32,
    pub nanos: i32,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    pub valid: NavTimeUtcFlags,
}

impl UbxPacketMeta for NavTimeUtc {
    const CLASS: u8 = 0x01;
    const ID: u8 = 0x21;
    const MIN_PAYLOAD_LEN: usize = 20;

    fn from_body(b: &[u8]) -> Result<Self> {
        Ok(Self {
            itow: u32_at(b, 0),
            time_accuracy_estimate_ns: u32_at(b, 4),
            nanos: i32_at(b, 8),
            year: u16_at(b, 12),
            month: b[14],
            day: b[15],
            hour: b[16],
            min: b[17],
            sec: b[18],
            valid: NavTimeUtcFlags::from_bits_truncate(b[19]),
        })
    }
}

impl TryFrom<&NavTimeUtc> for DateTime<Utc> {
    type Error = DateTimeError;

    fn try_from(t: &NavTimeUtc) -> core::result::Result<Self, Self::Error> {
        utc_date_time(t.year, t.month, t.day, (t.hour, t.min, t.sec), t.nanos)
    }
}

/// UBX-ACK-ACK or UBX-ACK-NAK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// `false` for a NAK
    pub acknowledged: bool,
    /// Class of the message being (not) acknowledged
    pub class: u8,
    pub msg_id: u8,
}

impl Ack {
    pub const CLASS: u8 = UBX_CLASS_ACK;
    pub const PAYLOAD_LEN: usize = 2;

    /// Parses the body of an acknowledgement with message id `id`.
    pub fn parse(id: u8, body: &[u8]) -> Result<Self> {
        let acknowledged = match id {
            UBX_ID_ACK_ACK => true,
            UBX_ID_ACK_NAK => false,
            _ => return Err(Error::NoDecoder),
        };
        let [class, msg_id, ..] = *body else {
            return Err(Error::Truncated {
                expect: Self::PAYLOAD_LEN,
                got: body.len(),
            });
        };
        Ok(Self {
            acknowledged,
            class,
            msg_id,
        })
    }
}

/// Receiver/Software Version (UBX-MON-VER)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonVer {
    pub software_version: String,
    pub hardware_version: String,
    /// Extended software information strings
    pub extension: Vec<String>,
}

const MON_VER_SW_LEN: usize = 30;
const MON_VER_HW_LEN: usize = 10;
const MON_VER_EXT_LEN: usize = 30;

/// Text up to the first NUL, or the whole field if there is none.
fn c_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl UbxPacketMeta for MonVer {
    const CLASS: u8 = 0x0a;
    const ID: u8 = 0x04;
    const MIN_PAYLOAD_LEN: usize = MON_VER_SW_LEN + MON_VER_HW_LEN;

    fn from_body(b: &[u8]) -> Result<Self> {
        let (versions, extension) = b.split_at(Self::MIN_PAYLOAD_LEN);
        let chunks = extension.chunks_exact(MON_VER_EXT_LEN);
        let mut ext = Vec::new();
        ext.try_reserve_exact(chunks.len())
            .map_err(|_| Error::NoMemory)?;
        ext.extend(chunks.map(c_str));
        Ok(Self {
            software_version: c_str(&versions[..MON_VER_SW_LEN]),
            hardware_version: c_str(&versions[MON_VER_SW_LEN..]),
            extension: ext,
        })
    }
}

/// An NMEA sentence split into its identifier and fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NmeaSentence {
    /// Talker + sentence identifier, e.g. `GPGGA`
    pub id: String,
    pub fields: Vec<String>,
}

impl NmeaSentence {
    /// Parses the text between `$` and `*`.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(body);
        let mut parts = text.split(',');
        let id = parts.next().unwrap_or_default().to_owned();
        let mut fields = Vec::new();
        fields
            .try_reserve(text.matches(',').count())
            .map_err(|_| Error::NoMemory)?;
        fields.extend(parts.map(str::to_owned));
        Ok(Self { id, fields })
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

/// Represents a world position, can be constructed from NavPosLlh and NavPvt packets.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Logitude in degrees
    pub lon: f64,

    /// Latitude in degrees
    pub lat: f64,

    /// Altitude in meters
    pub alt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Velocity {
    /// m/s over the ground
    pub speed: f64,

    /// Heading in degrees
    pub heading: f64,
}

impl From<&NavPosLlh> for Position {
    fn from(packet: &NavPosLlh) -> Self {
        Position {
            lon: f64::from(packet.lon) * 1e-7,
            lat: f64::from(packet.lat) * 1e-7,
            alt: f64::from(packet.height_msl) * 1e-3,
        }
    }
}

impl From<&NavPvt> for Position {
    fn from(packet: &NavPvt) -> Self {
        Position {
            lon: packet.longitude(),
            lat: packet.latitude(),
            alt: packet.height_msl_meters(),
        }
    }
}

impl From<&NavPvt> for Velocity {
    fn from(packet: &NavPvt) -> Self {
        Velocity {
            speed: packet.ground_speed_2d(),
            heading: packet.heading_motion(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};

    fn nav_pvt_body() -> Vec<u8> {
        let mut b = Vec::with_capacity(92);
        b.write_u32::<LittleEndian>(287_000_000).unwrap(); // itow
        b.write_u16::<LittleEndian>(2023).unwrap();
        b.extend_from_slice(&[6, 15, 12, 30, 45]);
        b.push(0x07); // valid date, time, fully resolved
        b.write_u32::<LittleEndian>(25).unwrap();
        b.write_i32::<LittleEndian>(-500).unwrap();
        b.extend_from_slice(&[3, 0x01, 0xe0, 12]); // 3D fix, fix ok, confirmed, 12 SVs
        b.write_i32::<LittleEndian>(85_000_000).unwrap(); // lon 8.5
        b.write_i32::<LittleEndian>(473_000_000).unwrap(); // lat 47.3
        b.write_i32::<LittleEndian>(500_000).unwrap();
        b.write_i32::<LittleEndian>(452_000).unwrap(); // 452 m MSL
        b.write_u32::<LittleEndian>(1500).unwrap();
        b.write_u32::<LittleEndian>(2500).unwrap();
        for v in [100, -200, 5, 1_250] {
            b.write_i32::<LittleEndian>(v).unwrap();
        }
        b.write_i32::<LittleEndian>(9_000_000).unwrap(); // heading 90 deg
        b.write_u32::<LittleEndian>(300).unwrap();
        b.write_u32::<LittleEndian>(400).unwrap();
        b.write_u16::<LittleEndian>(132).unwrap();
        b.write_u16::<LittleEndian>(0).unwrap();
        b.extend_from_slice(&[0; 4]);
        b.write_i32::<LittleEndian>(0).unwrap();
        b.write_i16::<LittleEndian>(-150).unwrap();
        b.write_u16::<LittleEndian>(10).unwrap();
        assert_eq!(b.len(), 92);
        b
    }

    #[test]
    fn nav_pvt_fields() {
        let pvt = NavPvt::parse(&nav_pvt_body()).unwrap();
        assert_eq!(pvt.itow, 287_000_000);
        assert_eq!((pvt.year, pvt.month, pvt.day), (2023, 6, 15));
        assert_eq!(pvt.fix_type, GnssFixType::Fix3D);
        assert!(pvt.flags.contains(NavPvtFlags::GPS_FIX_OK));
        assert!(pvt.valid.contains(NavPvtValidFlags::VALID_DATE | NavPvtValidFlags::VALID_TIME));
        assert_eq!(pvt.num_satellites, 12);
        assert!((pvt.longitude() - 8.5).abs() < 1e-9);
        assert!((pvt.latitude() - 47.3).abs() < 1e-9);
        assert!((pvt.height_msl_meters() - 452.0).abs() < 1e-9);
        assert_eq!(pvt.vel_east, -200);
        assert!((pvt.heading_motion() - 90.0).abs() < 1e-9);
        assert_eq!(pvt.magnetic_declination, -150);
        assert!(pvt.has_position());
        assert!(!pvt.invalid_llh());

        let pos: Position = (&pvt).into();
        assert!((pos.alt - 452.0).abs() < 1e-9);
        let vel: Velocity = (&pvt).into();
        assert!((vel.speed - 1.25).abs() < 1e-9);
    }

    #[test]
    fn nav_pvt_time() {
        let pvt = NavPvt::parse(&nav_pvt_body()).unwrap();
        let time: DateTime<Utc> = (&pvt).try_into().unwrap();
        assert_eq!(
            time,
            Utc.with_ymd_and_hms(2023, 6, 15, 12, 30, 44).unwrap()
                + chrono::Duration::nanoseconds(999_999_500)
        );

        let bad = NavPvt { month: 13, ..pvt.clone() };
        assert_eq!(
            DateTime::<Utc>::try_from(&bad),
            Err(DateTimeError::InvalidDate)
        );
        let bad = NavPvt {
            nanosec: 1_000_000_000,
            ..pvt
        };
        assert_eq!(
            DateTime::<Utc>::try_from(&bad),
            Err(DateTimeError::InvalidNanoseconds)
        );
    }

    #[test]
    fn nav_pvt_truncated() {
        assert!(matches!(
            NavPvt::parse(&[0; 91]),
            Err(Error::Truncated { expect: 92, got: 91 })
        ));
    }

    #[test]
    fn nav_pos_llh() {
        let mut b = vec![];
        for v in [1000u32, (-1_225_000_000i32) as u32, 373_000_000, 10_000, 8_000, 3000, 4000] {
            b.write_u32::<LittleEndian>(v).unwrap();
        }
        let llh = NavPosLlh::parse(&b).unwrap();
        assert_eq!(llh.lon, -1_225_000_000);
        let pos = Position::from(&llh);
        assert!((pos.lon + 122.5).abs() < 1e-9);
        assert!((pos.alt - 8.0).abs() < 1e-9);
    }

    #[test]
    fn nav_hp_pos_llh() {
        let mut b = vec![0, 0, 0, 0];
        b.write_u32::<LittleEndian>(1000).unwrap();
        for v in [100_000_000, 200_000_000, 1000, 900] {
            b.write_i32::<LittleEndian>(v).unwrap();
        }
        b.extend_from_slice(&[50, (-50i8) as u8, 5, 0]);
        b.write_u32::<LittleEndian>(141).unwrap();
        b.write_u32::<LittleEndian>(204).unwrap();
        let hp = NavHpPosLlh::parse(&b).unwrap();
        assert!((hp.longitude() - 10.000_000_05).abs() < 1e-12);
        assert!((hp.latitude() - 19.999_999_95).abs() < 1e-12);
        assert!((hp.height_meters() - 1.0005).abs() < 1e-9);
        assert_eq!(hp.h_acc, 141);
    }

    #[test]
    fn nav_time_utc() {
        let mut b = vec![];
        b.write_u32::<LittleEndian>(1000).unwrap();
        b.write_u32::<LittleEndian>(20).unwrap();
        b.write_i32::<LittleEndian>(250_000_000).unwrap();
        b.write_u16::<LittleEndian>(2024).unwrap();
        b.extend_from_slice(&[2, 29, 23, 59, 58, 0x07]);
        let t = NavTimeUtc::parse(&b).unwrap();
        assert!(t.valid.contains(NavTimeUtcFlags::VALID_UTC));
        let time: DateTime<Utc> = (&t).try_into().unwrap();
        assert_eq!(
            time,
            Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 58).unwrap()
                + chrono::Duration::milliseconds(250)
        );
    }

    #[test]
    fn ack_and_nak() {
        assert_eq!(
            Ack::parse(UBX_ID_ACK_ACK, &[0x06, 0x01]).unwrap(),
            Ack {
                acknowledged: true,
                class: 6,
                msg_id: 1
            }
        );
        assert!(!Ack::parse(UBX_ID_ACK_NAK, &[0x06, 0x01]).unwrap().acknowledged);
        assert!(matches!(
            Ack::parse(UBX_ID_ACK_ACK, &[0x06]),
            Err(Error::Truncated { expect: 2, got: 1 })
        ));
    }

    #[test]
    fn mon_ver_rom_interpret() {
        let payload: [u8; 160] = [
            82, 79, 77, 32, 67, 79, 82, 69, 32, 51, 46, 48, 49, 32, 40, 49, 48, 55, 56, 56, 56, 41,
            0, 0, 0, 0, 0, 0, 0, 0, 48, 48, 48, 56, 48, 48, 48, 48, 0, 0, 70, 87, 86, 69, 82, 61,
            83, 80, 71, 32, 51, 46, 48, 49, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 80, 82,
            79, 84, 86, 69, 82, 61, 49, 56, 46, 48, 48, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 71, 80, 83, 59, 71, 76, 79, 59, 71, 65, 76, 59, 66, 68, 83, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0, 0, 0, 0, 0, 0, 83, 66, 65, 83, 59, 73, 77, 69, 83, 59, 81, 90, 83, 83, 0,
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let ver = MonVer::parse(&payload).unwrap();
        assert_eq!("ROM CORE 3.01 (107888)", ver.software_version);
        assert_eq!("00080000", ver.hardware_version);
        assert_eq!(
            ver.extension,
            [
                "FWVER=SPG 3.01",
                "PROTVER=18.00",
                "GPS;GLO;GAL;BDS",
                "SBAS;IMES;QZSS"
            ]
        );
    }

    #[test]
    fn nmea_sentence_fields() {
        let s = NmeaSentence::parse(b"GPGLL,5057.970,N,00146.110,E,142451,A").unwrap();
        assert_eq!(s.id, "GPGLL");
        assert_eq!(s.fields.len(), 6);
        assert_eq!(s.field(1), Some("N"));
        assert_eq!(s.field(6), None);
    }
}
