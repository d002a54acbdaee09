//! Register table and data-driven accessor
//!
//! Every readable field of the status vectors is described once as a
//! [`Register`]: which buffer it lives in, where each indexed instance sits,
//! how many instances exist and how the raw byte decodes. [`Register::read`]
//! is the only accessor; there are no per-field getters.
//!
//! Temperatures are returned in calibrated device units. The only unit
//! adjustments applied are the doublings/halvings the device protocol itself
//! uses.

use serde::Serialize;

use crate::error::{Result, TbanError};
use crate::status::StatusSource;
use crate::variant::{FirmwareVersion, Variant, INFO_VERSION, WATCHDOG_MIN_FIRMWARE};

/// Where the indexed instances of a register are located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offsets {
    /// `base + index * stride`
    Linear { base: usize, stride: usize },
    /// Explicit per-index offsets
    Table(&'static [usize]),
}

/// How a raw byte turns into a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Coding {
    Raw,
    /// Value stored halved on the device (PWM percent)
    Double,
    /// Value stored doubled on the device (mini curve temperatures)
    Half,
    /// Little-endian 16-bit counter scaled by 10.5 (maximum RPM)
    Rpm16,
    HighNibble,
    LowNibble,
    /// Length byte offset by 256
    Plus256,
    /// Bit `index` of a shared mask byte
    Bit,
}

/// One field of a status vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    /// Dotted name used by tooling
    pub name: &'static str,
    /// What the index selects, used in error messages
    pub unit: &'static str,
    /// Buffer the bytes are read from
    pub variant: Variant,
    pub offsets: Offsets,
    /// Number of valid indices
    pub count: usize,
    pub coding: Coding,
    /// Firmware (`major * 10 + minor`) required to read the field
    pub min_firmware: Option<u8>,
}

impl Register {
    const fn base(name: &'static str, unit: &'static str, offsets: Offsets, count: usize) -> Self {
        Self {
            name,
            unit,
            variant: Variant::Base,
            offsets,
            count,
            coding: Coding::Raw,
            min_firmware: None,
        }
    }

    const fn on(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    const fn coded(mut self, coding: Coding) -> Self {
        self.coding = coding;
        self
    }

    const fn gated(mut self, min_firmware: u8) -> Self {
        self.min_firmware = Some(min_firmware);
        self
    }

    /// Absolute buffer offset of instance `index`
    pub fn offset(&self, index: usize) -> Result<usize> {
        if index >= self.count {
            return Err(TbanError::IndexOutOfBounds {
                what: self.unit,
                index,
                count: self.count,
            });
        }
        Ok(match self.offsets {
            Offsets::Linear { base, stride } => base + index * stride,
            Offsets::Table(table) => table[index],
        })
    }

    /// Read and decode instance `index` from the cached status
    pub fn read<S: StatusSource + ?Sized>(&self, source: &S, index: usize) -> Result<u32> {
        let offset = self.offset(index)?;

        if let Some(required) = self.min_firmware {
            let version =
                FirmwareVersion::from_packed(source.status_byte(Variant::Base, INFO_VERSION)?);
            if version.number() < required {
                return Err(TbanError::FirmwareTooOld {
                    required,
                    actual: version.number(),
                });
            }
        }

        let raw = u32::from(source.status_byte(self.variant, offset)?);
        let value = match self.coding {
            Coding::Raw => raw,
            Coding::Double => raw * 2,
            Coding::Half => raw / 2,
            Coding::Rpm16 => {
                let high = u32::from(source.status_byte(self.variant, offset + 1)?);
                ((256 * high + raw) as f32 * 10.5) as u32
            }
            Coding::HighNibble => raw >> 4,
            Coding::LowNibble => raw & 0x0F,
            Coding::Plus256 => 256 + raw,
            Coding::Bit => (raw >> index) & 0x01,
        };
        Ok(value)
    }

    /// Read every instance in index order
    pub fn read_all<S: StatusSource + ?Sized>(&self, source: &S) -> Result<Vec<u32>> {
        (0..self.count).map(|i| self.read(source, i)).collect()
    }
}

const fn linear(base: usize) -> Offsets {
    Offsets::Linear { base, stride: 1 }
}

const fn single(offset: usize) -> Offsets {
    Offsets::Linear {
        base: offset,
        stride: 0,
    }
}

pub const BASE_CHANNELS: usize = 4;
pub const BASE_DIGITAL_SENSORS: usize = 8;
pub const BASE_ANALOG_SENSORS: usize = 6;
pub const BIG_ANALOG_SENSORS: usize = 4;
pub const BIG_FLOWMETERS: usize = 2;
pub const MINI_CHANNELS: usize = 2;
pub const MINI_ANALOG_SENSORS: usize = 2;

// Base channels
pub const CH_PWM: Register =
    Register::base("channel.pwm", "channel", Offsets::Table(&[137, 138, 139, 140]), 4)
        .coded(Coding::Double);
pub const CH_MAX_RPM: Register =
    Register::base("channel.max_rpm", "channel", Offsets::Table(&[148, 150, 152, 154]), 4)
        .coded(Coding::Rpm16);
pub const CH_TEMP: Register =
    Register::base("channel.temp", "channel", Offsets::Table(&[252, 253, 254, 255]), 4);
pub const CH_MODE: Register = Register::base("channel.mode", "channel", linear(101), 4);
pub const CH_START_MODE: Register = Register::base("channel.start_mode", "channel", linear(5), 4);
pub const CH_HYSTERESIS: Register = Register::base("channel.hysteresis", "channel", linear(37), 4);
pub const CH_OVERTEMP: Register = Register::base("channel.overtemp", "channel", linear(41), 4);
pub const CH_MAX_TEMP: Register = Register::base("channel.max_temp", "channel", linear(33), 4);
pub const CH_DIGITAL_SENSOR: Register =
    Register::base("channel.digital_sensor", "channel", linear(45), 4);
pub const CH_ANALOG_SENSOR: Register =
    Register::base("channel.analog_sensor", "channel", linear(49), 4);

// Base sensors
pub const DS_TEMP: Register = Register::base("digital.temp", "digital sensor", linear(238), 8);
pub const DS_RAW: Register = Register::base("digital.raw", "digital sensor", linear(208), 8);
pub const DS_SCALE: Register = Register::base("digital.scale", "digital sensor", linear(19), 8);
pub const AS_TEMP: Register = Register::base("analog.temp", "analog sensor", linear(246), 6);
pub const AS_RAW: Register = Register::base("analog.raw", "analog sensor", linear(225), 6);
pub const AS_SCALE: Register = Register::base("analog.scale", "analog sensor", linear(27), 6);

// Motion detection
pub const MOTION_TIME_CONST: Register =
    Register::base("motion.time_const", "motion setting", single(9), 1);
pub const MOTION_MAX_LIMIT: Register =
    Register::base("motion.max_limit", "motion setting", single(10), 1);
pub const MOTION_INCREMENT: Register =
    Register::base("motion.increment", "motion setting", single(11), 1);
pub const MOTION_OVERRIDE: Register = Register::base("motion.override", "channel", linear(12), 4);
pub const MOTION_ROTATE: Register = Register::base("motion.rotate", "channel", linear(160), 4);
pub const MOTION_CURRENT: Register = Register::base("motion.current", "channel", linear(177), 4);

// Device settings and info block
pub const PWM_FREQUENCY: Register = Register::base("device.pwm_frequency", "setting", single(4), 1);
pub const LED: Register = Register::base("device.led", "setting", single(17), 1);
pub const BUZZER: Register = Register::base("device.buzzer", "setting", single(18), 1);
pub const WARNING_LEVEL: Register =
    Register::base("device.warning_level", "setting", single(181), 1);
pub const TIMEBASE: Register = Register::base("device.timebase", "setting", single(126), 1);
pub const APP_TYPE: Register = Register::base("info.app", "info", single(268), 1);
pub const SERIES: Register = Register::base("info.series", "series byte", linear(269), 2);
pub const FW_MONTH: Register =
    Register::base("info.fw_month", "info", single(271), 1).coded(Coding::HighNibble);
pub const FW_YEAR: Register =
    Register::base("info.fw_year", "info", single(271), 1).coded(Coding::LowNibble);
pub const DEVICE_TYPE: Register = Register::base("info.type", "info", single(272), 1);
pub const FW_MAJOR: Register =
    Register::base("info.fw_major", "info", single(273), 1).coded(Coding::HighNibble);
pub const FW_MINOR: Register =
    Register::base("info.fw_minor", "info", single(273), 1).coded(Coding::LowNibble);
pub const PROTOCOL: Register = Register::base("info.protocol", "info", single(274), 1);
pub const SERIAL_BUFFER_LEN: Register =
    Register::base("info.serial_buffer_len", "info", single(275), 1).coded(Coding::Plus256);
pub const SENSORHUB: Register = Register::base("info.sensorhub", "info", single(276), 1);
pub const WATCHDOG_COUNTER: Register =
    Register::base("watchdog.counter", "watchdog", single(277), 1).gated(WATCHDOG_MIN_FIRMWARE);
pub const WATCHDOG_ENABLED: Register =
    Register::base("watchdog.enabled", "watchdog", single(278), 1).gated(WATCHDOG_MIN_FIRMWARE);

// Big dialect. Most fields live in the base vector; the absolute scale
// factors come from the big vector.
pub const BIG_OUTPUT_MODE: Register =
    Register::base("big.output_mode", "channel", single(136), 4).coded(Coding::Bit);
pub const BIG_OVERTEMP: Register = Register::base("big.overtemp", "setting", single(145), 1);
pub const BIG_SPECIFIC_SENSOR: Register =
    Register::base("big.specific_sensor", "channel", linear(164), 4);
pub const BIG_TARGET_TEMP: Register = Register::base("big.target_temp", "channel", linear(118), 4);
pub const BIG_TARGET_MODE: Register = Register::base("big.target_mode", "channel", linear(122), 4);
pub const BIG_AS_TEMP: Register = Register::base("big.analog.temp", "big analog sensor", linear(260), 4);
pub const BIG_AS_RAW: Register = Register::base("big.analog.raw", "big analog sensor", linear(256), 4);
pub const BIG_AS_SCALE: Register =
    Register::base("big.analog.scale", "big analog sensor", linear(129), 4);
pub const BIG_AS_ABS_SCALE: Register =
    Register::base("big.analog.abs_scale", "big analog sensor", linear(142), 4).on(Variant::Big);
pub const BIG_DS_ABS_SCALE: Register =
    Register::base("big.digital.abs_scale", "digital sensor", linear(128), 8).on(Variant::Big);

// Mini dialect
pub const MINI_STATUS: Register = Register::base("mini.status", "setting", single(2), 1).on(Variant::Mini);
pub const MINI_JUMPER: Register = Register::base("mini.jumper", "setting", single(3), 1).on(Variant::Mini);
pub const MINI_POT: Register = Register::base("mini.pot", "potentiometer", linear(4), 2).on(Variant::Mini);
pub const MINI_TEMP: Register =
    Register::base("mini.temp", "mini analog sensor", Offsets::Table(&[6, 7]), 2).on(Variant::Mini);
pub const MINI_CAL_TEMP: Register =
    Register::base("mini.cal_temp", "mini analog sensor", Offsets::Table(&[8, 9]), 2)
        .on(Variant::Mini);
pub const MINI_OVERTEMP: Register =
    Register::base("mini.overtemp", "mini channel", linear(18), 2).on(Variant::Mini);
pub const MINI_RPM: Register =
    Register::base("mini.rpm", "mini channel", Offsets::Table(&[44, 46]), 2).on(Variant::Mini);
pub const MINI_MAX_RPM: Register =
    Register::base("mini.max_rpm", "mini channel", Offsets::Table(&[45, 47]), 2).on(Variant::Mini);
pub const MINI_TIMEBASE: Register =
    Register::base("mini.timebase", "setting", single(57), 1).on(Variant::Mini);
pub const MINI_HYSTERESIS: Register =
    Register::base("mini.hysteresis", "mini channel", linear(58), 2).on(Variant::Mini);
pub const MINI_PASS_THROUGH: Register =
    Register::base("mini.pass_through", "pass-through byte", linear(63), 3).on(Variant::Mini);
pub const MINI_ABS_CAL: Register =
    Register::base("mini.abs_cal", "mini analog sensor", linear(77), 2).on(Variant::Mini);

/// Response curve storage: X (temperature) and Y (PWM) start offsets per channel
pub const BASE_CURVE_X: [usize; 4] = [53, 59, 65, 71];
pub const BASE_CURVE_Y: [usize; 4] = [77, 83, 89, 95];
pub const BASE_CURVE_POINTS: usize = 6;
pub const MINI_CURVE_X: [usize; 2] = [20, 30];
pub const MINI_CURVE_Y: [usize; 2] = [25, 35];
pub const MINI_CURVE_POINTS: usize = 5;

/// Every register, for listing and lookup by name
pub const REGISTERS: &[Register] = &[
    CH_PWM,
    CH_MAX_RPM,
    CH_TEMP,
    CH_MODE,
    CH_START_MODE,
    CH_HYSTERESIS,
    CH_OVERTEMP,
    CH_MAX_TEMP,
    CH_DIGITAL_SENSOR,
    CH_ANALOG_SENSOR,
    DS_TEMP,
    DS_RAW,
    DS_SCALE,
    AS_TEMP,
    AS_RAW,
    AS_SCALE,
    MOTION_TIME_CONST,
    MOTION_MAX_LIMIT,
    MOTION_INCREMENT,
    MOTION_OVERRIDE,
    MOTION_ROTATE,
    MOTION_CURRENT,
    PWM_FREQUENCY,
    LED,
    BUZZER,
    WARNING_LEVEL,
    TIMEBASE,
    APP_TYPE,
    SERIES,
    FW_MONTH,
    FW_YEAR,
    DEVICE_TYPE,
    FW_MAJOR,
    FW_MINOR,
    PROTOCOL,
    SERIAL_BUFFER_LEN,
    SENSORHUB,
    WATCHDOG_COUNTER,
    WATCHDOG_ENABLED,
    BIG_OUTPUT_MODE,
    BIG_OVERTEMP,
    BIG_SPECIFIC_SENSOR,
    BIG_TARGET_TEMP,
    BIG_TARGET_MODE,
    BIG_AS_TEMP,
    BIG_AS_RAW,
    BIG_AS_SCALE,
    BIG_AS_ABS_SCALE,
    BIG_DS_ABS_SCALE,
    MINI_STATUS,
    MINI_JUMPER,
    MINI_POT,
    MINI_TEMP,
    MINI_CAL_TEMP,
    MINI_OVERTEMP,
    MINI_RPM,
    MINI_MAX_RPM,
    MINI_TIMEBASE,
    MINI_HYSTERESIS,
    MINI_PASS_THROUGH,
    MINI_ABS_CAL,
];

/// Find a register by its dotted name
pub fn find(name: &str) -> Option<&'static Register> {
    REGISTERS.iter().find(|r| r.name == name)
}

/// One point of a response curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurvePoint {
    pub temp: u8,
    pub pwm: u8,
}

/// Read a base channel's curve: six stored points plus the implicit
/// (maximum temperature, 100%) end point
pub fn read_base_curve<S: StatusSource + ?Sized>(
    source: &S,
    channel: usize,
) -> Result<Vec<CurvePoint>> {
    check_channel(channel, BASE_CHANNELS)?;
    let mut points = Vec::with_capacity(BASE_CURVE_POINTS + 1);
    for i in 0..BASE_CURVE_POINTS {
        points.push(CurvePoint {
            temp: source.status_byte(Variant::Base, BASE_CURVE_X[channel] + i)?,
            pwm: source.status_byte(Variant::Base, BASE_CURVE_Y[channel] + i)?,
        });
    }
    points.push(CurvePoint {
        temp: CH_MAX_TEMP.read(source, channel)? as u8,
        pwm: 100,
    });
    Ok(points)
}

/// Read a mini channel's curve: an implicit origin, five stored points with
/// halved temperatures, and a 100% end point
pub fn read_mini_curve<S: StatusSource + ?Sized>(
    source: &S,
    channel: usize,
) -> Result<Vec<CurvePoint>> {
    check_channel(channel, MINI_CHANNELS)?;
    let mut temps = [0u8; MINI_CURVE_POINTS + 1];
    let mut pwms = [0u8; MINI_CURVE_POINTS + 1];
    for i in 0..MINI_CURVE_POINTS {
        temps[i + 1] = source.status_byte(Variant::Mini, MINI_CURVE_X[channel] + i)? / 2;
        pwms[i] = source.status_byte(Variant::Mini, MINI_CURVE_Y[channel] + i)?;
    }
    pwms[MINI_CURVE_POINTS] = 100;
    Ok(temps
        .iter()
        .zip(pwms.iter())
        .map(|(&temp, &pwm)| CurvePoint { temp, pwm })
        .collect())
}

fn check_channel(channel: usize, count: usize) -> Result<()> {
    if channel >= count {
        return Err(TbanError::IndexOutOfBounds {
            what: "channel",
            index: channel,
            count,
        });
    }
    Ok(())
}

/// Decoded base info block
#[derive(Debug, Clone, Serialize)]
pub struct HardwareInfo {
    pub device: crate::variant::DeviceKind,
    pub app: crate::variant::AppKind,
    pub firmware: FirmwareVersion,
    pub firmware_month: u8,
    pub firmware_year: u8,
    pub protocol: u8,
    pub serial_buffer_len: u32,
    pub warning_level: u8,
    pub timebase: u8,
    pub sensorhub: u8,
    /// `None` when the firmware predates the watchdog
    pub watchdog_enabled: Option<bool>,
    pub watchdog_counter: Option<u8>,
}

impl HardwareInfo {
    pub fn read<S: StatusSource + ?Sized>(source: &S) -> Result<Self> {
        let byte = |r: &Register| -> Result<u8> { Ok(r.read(source, 0)? as u8) };
        Ok(Self {
            device: crate::variant::DeviceKind::from_type_byte(byte(&DEVICE_TYPE)?),
            app: crate::variant::AppKind::from_app_byte(byte(&APP_TYPE)?),
            firmware: FirmwareVersion {
                major: byte(&FW_MAJOR)?,
                minor: byte(&FW_MINOR)?,
            },
            firmware_month: byte(&FW_MONTH)?,
            firmware_year: byte(&FW_YEAR)?,
            protocol: byte(&PROTOCOL)?,
            serial_buffer_len: SERIAL_BUFFER_LEN.read(source, 0)?,
            warning_level: byte(&WARNING_LEVEL)?,
            timebase: byte(&TIMEBASE)?,
            sensorhub: byte(&SENSORHUB)?,
            watchdog_enabled: capability(WATCHDOG_ENABLED.read(source, 0))?.map(|v| v != 0),
            watchdog_counter: capability(WATCHDOG_COUNTER.read(source, 0))?.map(|v| v as u8),
        })
    }
}

/// Decode the base info block
pub fn hardware_info<S: StatusSource + ?Sized>(source: &S) -> Result<HardwareInfo> {
    HardwareInfo::read(source)
}

/// Turn a capability error into `None`, keep every other outcome
fn capability<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_capability() => Ok(None),
        Err(e) => Err(e),
    }
}
