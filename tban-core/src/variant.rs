//! Device variant definitions
//!
//! The T-Balancer family speaks one base protocol with two add-on dialects.
//! Each dialect implements the [`VariantConfig`] trait with its wire
//! characteristics, and the runtime [`Variant`] enum dispatches to them.
//!
//! A single controller always exposes the base dialect; the "big" and "mini"
//! dialects ride the same wire as an alternate source and are discovered from
//! the status buffers themselves, never configured by the caller.

use crate::error::{Result, TbanError};

/// Byte 0 of every valid status buffer
pub const STATUS_SENTINEL: u8 = 100;
/// Mini frame start marker at byte 1
pub const MINI_FRAME_START: u8 = 253;
/// Mini frame end marker at byte 62
pub const MINI_FRAME_END: u8 = 254;
/// Position of the mini frame end marker
pub const MINI_FRAME_END_INDEX: usize = 62;

/// Query opcode following the source selector
pub const REQUEST: u8 = 0x36;
/// Primary source selector (the base controller)
pub const SOURCE_PRIMARY: u8 = 0x05;
/// Alternate source selector (add-on modules)
pub const SOURCE_SECONDARY: u8 = 0x06;

/// Every query response is this long on the wire
pub const WIRE_LENGTH: usize = 285;

/// Base info block offsets
pub const INFO_APP: usize = 268;
pub const INFO_SERIES_1: usize = 269;
pub const INFO_SERIES_2: usize = 270;
pub const INFO_DATE: usize = 271;
pub const INFO_TYPE: usize = 272;
pub const INFO_VERSION: usize = 273;
pub const INFO_PROTOCOL: usize = 274;
pub const INFO_SERIAL_BUFFER: usize = 275;
pub const INFO_SENSORHUB: usize = 276;
pub const WATCHDOG_COUNTER: usize = 277;
pub const WATCHDOG_ENABLED: usize = 278;
pub const WARNING_LEVEL: usize = 181;
pub const TARGET_TIMEBASE: usize = 126;

/// Lowest firmware that understands the watchdog commands
pub const WATCHDOG_MIN_FIRMWARE: u8 = 28;

/// Protocol dialect configuration trait
///
/// # Example
///
/// ```
/// use tban_core::variant::{MiniDialect, VariantConfig};
///
/// const LEN: usize = MiniDialect::BUFFER_LEN;
/// assert_eq!(LEN, 128);
/// ```
pub trait VariantConfig: Send + Sync + 'static {
    /// Human-readable dialect name
    const NAME: &'static str;

    /// Source selector sent before the request opcode
    const SOURCE: u8;

    /// Number of bytes kept from each response
    const BUFFER_LEN: usize;

    /// Extra settle time after every send, on top of the base delay
    const EXTRA_SETTLE_MS: u64;

    /// Number of fan channels addressed by this dialect
    const CHANNELS: usize;

    /// (index, expected value) pairs every valid buffer satisfies
    const SENTINELS: &'static [(usize, u8)];
}

/// Base controller dialect
pub struct BaseDialect;

impl VariantConfig for BaseDialect {
    const NAME: &'static str = "base";
    const SOURCE: u8 = SOURCE_PRIMARY;
    const BUFFER_LEN: usize = 285;
    const EXTRA_SETTLE_MS: u64 = 0;
    const CHANNELS: usize = 4;
    const SENTINELS: &'static [(usize, u8)] = &[(0, STATUS_SENTINEL)];
}

/// "Big" add-on dialect
pub struct BigDialect;

impl VariantConfig for BigDialect {
    const NAME: &'static str = "big";
    const SOURCE: u8 = SOURCE_SECONDARY;
    const BUFFER_LEN: usize = 285;
    const EXTRA_SETTLE_MS: u64 = 0;
    const CHANNELS: usize = 4;
    const SENTINELS: &'static [(usize, u8)] = &[(0, STATUS_SENTINEL)];
}

/// "Mini" add-on dialect
pub struct MiniDialect;

impl VariantConfig for MiniDialect {
    const NAME: &'static str = "mini";
    const SOURCE: u8 = SOURCE_SECONDARY;
    const BUFFER_LEN: usize = 128;
    const EXTRA_SETTLE_MS: u64 = 250;
    const CHANNELS: usize = 2;
    const SENTINELS: &'static [(usize, u8)] = &[
        (0, STATUS_SENTINEL),
        (1, MINI_FRAME_START),
        (MINI_FRAME_END_INDEX, MINI_FRAME_END),
    ];
}

/// Runtime variant selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Base,
    Big,
    Mini,
}

impl Variant {
    /// All variants in query order
    pub const ALL: [Variant; 3] = [Variant::Base, Variant::Big, Variant::Mini];

    pub fn name(&self) -> &'static str {
        match self {
            Variant::Base => BaseDialect::NAME,
            Variant::Big => BigDialect::NAME,
            Variant::Mini => MiniDialect::NAME,
        }
    }

    /// Source selector byte for the query frame
    pub fn source(&self) -> u8 {
        match self {
            Variant::Base => BaseDialect::SOURCE,
            Variant::Big => BigDialect::SOURCE,
            Variant::Mini => MiniDialect::SOURCE,
        }
    }

    /// Two-byte frame that requests this variant's status buffer
    pub fn query_frame(&self) -> [u8; 2] {
        [self.source(), REQUEST]
    }

    /// Stored buffer length
    pub fn buffer_len(&self) -> usize {
        match self {
            Variant::Base => BaseDialect::BUFFER_LEN,
            Variant::Big => BigDialect::BUFFER_LEN,
            Variant::Mini => MiniDialect::BUFFER_LEN,
        }
    }

    /// Bytes read from the wire per query; the mini keeps only a prefix
    pub fn wire_len(&self) -> usize {
        WIRE_LENGTH
    }

    pub fn extra_settle_ms(&self) -> u64 {
        match self {
            Variant::Base => BaseDialect::EXTRA_SETTLE_MS,
            Variant::Big => BigDialect::EXTRA_SETTLE_MS,
            Variant::Mini => MiniDialect::EXTRA_SETTLE_MS,
        }
    }

    pub fn channel_count(&self) -> usize {
        match self {
            Variant::Base => BaseDialect::CHANNELS,
            Variant::Big => BigDialect::CHANNELS,
            Variant::Mini => MiniDialect::CHANNELS,
        }
    }

    fn sentinels(&self) -> &'static [(usize, u8)] {
        match self {
            Variant::Base => BaseDialect::SENTINELS,
            Variant::Big => BigDialect::SENTINELS,
            Variant::Mini => MiniDialect::SENTINELS,
        }
    }

    /// Check that `buf` has this variant's length and sentinel bytes
    pub fn validate(&self, buf: &[u8]) -> Result<()> {
        if buf.len() != self.buffer_len() {
            return Err(TbanError::CorruptData(*self));
        }
        if self.sentinels().iter().all(|&(i, v)| buf[i] == v) {
            Ok(())
        } else {
            Err(TbanError::CorruptData(*self))
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Variant {
    type Err = TbanError;

    /// Parse a variant name (for CLI arguments)
    ///
    /// ```
    /// use std::str::FromStr;
    /// use tban_core::variant::Variant;
    ///
    /// assert_eq!(Variant::from_str("mini").unwrap(), Variant::Mini);
    /// assert_eq!(Variant::from_str("bigNG").unwrap(), Variant::Big);
    /// assert!(Variant::from_str("huge").is_err());
    /// ```
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "base" | "tban" => Ok(Variant::Base),
            "big" | "bigng" => Ok(Variant::Big),
            "mini" | "mining" => Ok(Variant::Mini),
            _ => Err(TbanError::InvalidInput(format!(
                "Unknown variant: '{}'. Valid options: base, big, mini",
                s
            ))),
        }
    }
}

/// Hardware family reported in the base info block
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DeviceKind {
    /// No device answered (type byte 0)
    Absent,
    /// TBan base controller
    Base,
    /// TBan Classic
    Classic,
    /// bigNG controller, exposes the big dialect
    Big,
    /// Unrecognised type byte
    Unknown(u8),
}

impl DeviceKind {
    pub fn from_type_byte(value: u8) -> Self {
        match value {
            0x00 => DeviceKind::Absent,
            0x10 => DeviceKind::Base,
            0x20 => DeviceKind::Classic,
            0x30 => DeviceKind::Big,
            other => DeviceKind::Unknown(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceKind::Absent => "none",
            DeviceKind::Base => "TBan",
            DeviceKind::Classic => "TBan Classic",
            DeviceKind::Big => "bigNG",
            DeviceKind::Unknown(_) => "unknown",
        }
    }

    /// Whether the big dialect buffer should be queried
    pub fn has_big_dialect(&self) -> bool {
        matches!(self, DeviceKind::Big)
    }
}

/// Application type reported at byte 268
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum AppKind {
    Base,
    Big,
    Unknown(u8),
}

impl AppKind {
    pub fn from_app_byte(value: u8) -> Self {
        match value {
            0x11 => AppKind::Base,
            0x21 => AppKind::Big,
            other => AppKind::Unknown(other),
        }
    }
}

/// Firmware version decoded from the packed version byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    /// High nibble major, low nibble minor
    pub fn from_packed(byte: u8) -> Self {
        Self {
            major: byte >> 4,
            minor: byte & 0x0F,
        }
    }

    /// Comparable version number, `major * 10 + minor`
    pub fn number(&self) -> u8 {
        self.major * 10 + self.minor
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Classify the hardware from the base buffer's type byte
///
/// Never fails: short buffers and unknown bytes degrade to
/// [`DeviceKind::Absent`] and [`DeviceKind::Unknown`].
pub fn detect_variant(base: &[u8]) -> DeviceKind {
    base.get(INFO_TYPE)
        .copied()
        .map(DeviceKind::from_type_byte)
        .unwrap_or(DeviceKind::Absent)
}

/// Decode the firmware version from the base buffer
pub fn firmware_version(base: &[u8]) -> Result<FirmwareVersion> {
    base.get(INFO_VERSION)
        .copied()
        .map(FirmwareVersion::from_packed)
        .ok_or(TbanError::IndexOutOfBounds {
            what: "status buffer",
            index: INFO_VERSION,
            count: base.len(),
        })
}

/// Fail with [`TbanError::FirmwareTooOld`] when the device is older than `min_version`
pub fn check_firmware_at_least(base: &[u8], min_version: u8) -> Result<()> {
    let version = firmware_version(base)?;
    if version.number() >= min_version {
        Ok(())
    } else {
        Err(TbanError::FirmwareTooOld {
            required: min_version,
            actual: version.number(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn base_buffer() -> Vec<u8> {
        let mut buf = vec![0u8; 285];
        buf[0] = STATUS_SENTINEL;
        buf
    }

    fn mini_buffer() -> Vec<u8> {
        let mut buf = vec![0u8; 128];
        buf[0] = STATUS_SENTINEL;
        buf[1] = MINI_FRAME_START;
        buf[MINI_FRAME_END_INDEX] = MINI_FRAME_END;
        buf
    }

    #[test]
    fn test_query_frames() {
        assert_eq!(Variant::Base.query_frame(), [0x05, 0x36]);
        assert_eq!(Variant::Big.query_frame(), [0x06, 0x36]);
        assert_eq!(Variant::Mini.query_frame(), [0x06, 0x36]);
    }

    #[test]
    fn test_buffer_lengths() {
        assert_eq!(Variant::Base.buffer_len(), 285);
        assert_eq!(Variant::Big.buffer_len(), 285);
        assert_eq!(Variant::Mini.buffer_len(), 128);
        for variant in Variant::ALL {
            assert_eq!(variant.wire_len(), 285);
        }
    }

    #[test]
    fn test_base_sentinel() {
        let mut buf = base_buffer();
        assert!(Variant::Base.validate(&buf).is_ok());
        buf[0] = 99;
        assert!(matches!(
            Variant::Base.validate(&buf),
            Err(TbanError::CorruptData(Variant::Base))
        ));
    }

    #[test]
    fn test_mini_sentinels_each_checked() {
        assert!(Variant::Mini.validate(&mini_buffer()).is_ok());

        for index in [0, 1, MINI_FRAME_END_INDEX] {
            let mut buf = mini_buffer();
            buf[index] ^= 0x01;
            assert!(
                Variant::Mini.validate(&buf).is_err(),
                "flipping byte {} must fail validation",
                index
            );
        }
    }

    #[test]
    fn test_validate_rejects_wrong_length() {
        let buf = vec![STATUS_SENTINEL; 10];
        assert!(Variant::Base.validate(&buf).is_err());
    }

    #[test]
    fn test_detect_variant() {
        let mut buf = base_buffer();
        buf[INFO_TYPE] = 0x10;
        assert_eq!(detect_variant(&buf), DeviceKind::Base);
        buf[INFO_TYPE] = 0x30;
        assert_eq!(detect_variant(&buf), DeviceKind::Big);
        assert!(detect_variant(&buf).has_big_dialect());
        buf[INFO_TYPE] = 0x20;
        assert_eq!(detect_variant(&buf), DeviceKind::Classic);
        buf[INFO_TYPE] = 0x77;
        assert_eq!(detect_variant(&buf), DeviceKind::Unknown(0x77));
        assert_eq!(detect_variant(&[]), DeviceKind::Absent);
    }

    #[test]
    fn test_firmware_gate() {
        let mut buf = base_buffer();
        buf[INFO_VERSION] = 0x28;
        assert_eq!(firmware_version(&buf).unwrap().to_string(), "2.8");
        assert!(check_firmware_at_least(&buf, 28).is_ok());

        match check_firmware_at_least(&buf, 29) {
            Err(TbanError::FirmwareTooOld { required, actual }) => {
                assert_eq!(required, 29);
                assert_eq!(actual, 28);
            }
            other => panic!("Expected FirmwareTooOld, got {:?}", other),
        }
    }

    #[test]
    fn test_variant_from_str() {
        assert_eq!(Variant::from_str("BASE").unwrap(), Variant::Base);
        assert_eq!(Variant::from_str("miniNG").unwrap(), Variant::Mini);
        assert!(matches!(
            Variant::from_str("classic"),
            Err(TbanError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_app_kind() {
        assert_eq!(AppKind::from_app_byte(0x11), AppKind::Base);
        assert_eq!(AppKind::from_app_byte(0x21), AppKind::Big);
        assert_eq!(AppKind::from_app_byte(0x05), AppKind::Unknown(0x05));
    }
}
