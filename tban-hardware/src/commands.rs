//! Command frames understood by the controller
//!
//! Every builder validates its arguments before producing a frame, so a
//! rejected call never reaches the serial link. Values are sent verbatim
//! unless the device stores them at a different resolution (curve
//! temperatures are sent in half-degree steps).

use tban_core::registers::{
    BASE_CHANNELS, BASE_CURVE_POINTS, BASE_DIGITAL_SENSORS, BIG_ANALOG_SENSORS, MINI_CHANNELS,
    MINI_CURVE_POINTS,
};
use tban_core::{CurvePoint, Result, TbanError};

/// Longest frame the controller accepts
pub const MAX_FRAME_LEN: usize = 8;

/// Highest PWM percentage
pub const MAX_PWM: u8 = 100;

/// Highest curve temperature that still fits a byte once doubled
pub const MAX_CURVE_TEMP: u8 = 127;

/// Highest big target mode (0 curve, 1-5 presets, 6 user settings)
pub const MAX_TARGET_MODE: u8 = 6;

/// Commands supported by the controller
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    LedOn = 0x01,
    LedOff = 0x02,
    BuzzerOn = 0x03,
    BuzzerOff = 0x04,
    /// Channel PWM, plus channel index
    SetPwm = 0x11,
    PwmFrequency = 0x15,
    /// Manual/automatic mode mask
    ChannelMode = 0x16,
    /// Initial PWM, plus channel index
    InitPwm = 0x17,
    /// Big analog/PWM output mask
    OutputMode = 0x1C,
    Tacho = 0x21,
    /// Sensor scale factor, plus index
    ScaleFactor = 0x22,
    /// Big target temperature, plus channel index
    TargetTemp = 0x30,
    Reset = 0x35,
    /// Big target mode, plus channel index
    TargetMode = 0x3A,
    /// Big analog scale factor, plus sensor index
    BigScale = 0x40,
    /// Big analog absolute scale factor, plus sensor index
    BigAnalogAbsScale = 0x44,
    MotionUpper = 0x4A,
    MotionError = 0x4B,
    MotionLower = 0x4C,
    /// First curve register, plus 16 per channel
    CurveBase = 0x50,
    /// Curve end-point temperature, plus channel index
    CurveMax = 0x90,
    /// Big digital absolute scale factor, plus sensor index
    BigDigitalAbsScale = 0x94,
    /// Hysteresis, plus channel index
    Hysteresis = 0xA0,
    /// Digital sensor assignment, plus channel index
    AssignDigital = 0xC0,
    /// Analog sensor assignment, plus channel index
    AssignAnalog = 0xE0,
    /// Big sensor assignment, plus channel index
    AssignBig = 0xE4,
    /// Pass-through frame markers for the mini add-on
    MiniCommand = 0xF0,
    MiniPrimary = 0xF1,
    MiniSecondary = 0xF2,
    MiniFlush = 0xF3,
    WatchdogOn = 0xF5,
    WatchdogOff = 0xF6,
    Ping = 0xFA,
}

impl Opcode {
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Opcode offset by an index, for the per-channel/per-sensor families
    pub fn indexed(self, index: usize) -> u8 {
        (self as u8).wrapping_add(index as u8)
    }
}

/// A validated frame of 1 to 8 bytes
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    bytes: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl CommandFrame {
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > MAX_FRAME_LEN {
            return Err(TbanError::FrameLength(bytes.len()));
        }
        let mut frame = [0u8; MAX_FRAME_LEN];
        frame[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            bytes: frame,
            len: bytes.len(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommandFrame({:02X?})", self.as_bytes())
    }
}

fn check_index(what: &'static str, index: usize, count: usize) -> Result<()> {
    if index >= count {
        return Err(TbanError::IndexOutOfBounds { what, index, count });
    }
    Ok(())
}

fn check_value(what: &'static str, value: u8, max: u8) -> Result<()> {
    if value > max {
        return Err(TbanError::ValueOutOfBounds {
            what,
            value: u32::from(value),
            max: u32::from(max),
        });
    }
    Ok(())
}

fn frame(bytes: &[u8]) -> Result<CommandFrame> {
    CommandFrame::new(bytes)
}

pub fn led(on: bool) -> Result<CommandFrame> {
    frame(&[if on { Opcode::LedOn } else { Opcode::LedOff }.byte()])
}

pub fn buzzer(on: bool) -> Result<CommandFrame> {
    frame(&[if on { Opcode::BuzzerOn } else { Opcode::BuzzerOff }.byte()])
}

pub fn reset() -> Result<CommandFrame> {
    frame(&[Opcode::Reset.byte()])
}

pub fn channel_pwm(channel: usize, pwm: u8) -> Result<CommandFrame> {
    check_index("channel", channel, BASE_CHANNELS)?;
    check_value("PWM", pwm, MAX_PWM)?;
    frame(&[Opcode::SetPwm.indexed(channel), pwm])
}

pub fn init_pwm(channel: usize, pwm: u8) -> Result<CommandFrame> {
    check_index("channel", channel, BASE_CHANNELS)?;
    check_value("initial PWM", pwm, MAX_PWM)?;
    frame(&[Opcode::InitPwm.indexed(channel), pwm])
}

pub fn pwm_frequency(frequency: u8) -> Result<CommandFrame> {
    frame(&[Opcode::PwmFrequency.byte(), frequency])
}

/// One bit per channel, set for manual mode
pub fn channel_mode(mask: u8) -> Result<CommandFrame> {
    check_value("channel mode mask", mask, 0x0F)?;
    frame(&[Opcode::ChannelMode.byte(), mask])
}

pub fn tacho(mask: u8) -> Result<CommandFrame> {
    frame(&[Opcode::Tacho.byte(), mask])
}

pub fn scale_factor(index: usize, factor: u8) -> Result<CommandFrame> {
    check_index("scale factor", index, BASE_CHANNELS)?;
    frame(&[Opcode::ScaleFactor.indexed(index), factor])
}

/// Blockage detection thresholds; all three must be non-zero
pub fn motion(lower: u8, upper: u8, error: u8) -> Result<CommandFrame> {
    for (what, value) in [("motion lower", lower), ("motion upper", upper), ("motion error", error)]
    {
        if value == 0 {
            return Err(TbanError::ValueOutOfBounds {
                what,
                value: 0,
                max: 255,
            });
        }
    }
    frame(&[
        Opcode::MotionUpper.byte(),
        upper,
        Opcode::MotionError.byte(),
        error,
        Opcode::MotionLower.byte(),
        lower,
    ])
}

pub fn hysteresis(channel: usize, value: u8) -> Result<CommandFrame> {
    check_index("channel", channel, BASE_CHANNELS)?;
    frame(&[Opcode::Hysteresis.indexed(channel), value])
}

pub fn sensor_assignment(channel: usize, digital: u8, analog: u8) -> Result<CommandFrame> {
    check_index("channel", channel, BASE_CHANNELS)?;
    frame(&[
        Opcode::AssignDigital.indexed(channel),
        digital,
        Opcode::AssignAnalog.indexed(channel),
        analog,
    ])
}

/// Ask the sensors selected by `mask` to report
pub fn ping(mask: u8) -> Result<CommandFrame> {
    frame(&[Opcode::Ping.byte(), mask])
}

pub fn watchdog(enable: bool) -> Result<CommandFrame> {
    frame(&[if enable {
        Opcode::WatchdogOn
    } else {
        Opcode::WatchdogOff
    }
    .byte()])
}

fn check_curve(points: &[CurvePoint], expected: usize) -> Result<()> {
    if points.len() != expected {
        return Err(TbanError::InvalidInput(format!(
            "Response curve needs {} points, got {}",
            expected,
            points.len()
        )));
    }
    for point in points {
        check_value("curve temperature", point.temp, MAX_CURVE_TEMP)?;
        check_value("curve PWM", point.pwm, MAX_PWM)?;
    }
    Ok(())
}

/// Frames for a base response curve: six (temperature, PWM) pairs followed
/// by the end-point temperature. The end point's PWM is implicitly 100%.
pub fn base_curve(channel: usize, points: &[CurvePoint]) -> Result<Vec<CommandFrame>> {
    check_index("channel", channel, BASE_CHANNELS)?;
    check_curve(points, BASE_CURVE_POINTS + 1)?;

    let base = Opcode::CurveBase.byte() + 16 * channel as u8;
    let mut frames = Vec::with_capacity(BASE_CURVE_POINTS + 1);
    for (i, point) in points.iter().take(BASE_CURVE_POINTS).enumerate() {
        let i = i as u8;
        frames.push(frame(&[base + i, 2 * point.temp, base + 6 + i, point.pwm])?);
    }
    let last = points[BASE_CURVE_POINTS];
    frames.push(frame(&[Opcode::CurveMax.indexed(channel), 2 * last.temp])?);
    Ok(frames)
}

/// Pass-through frames for a mini response curve, one per point
pub fn mini_curve(channel: usize, points: &[CurvePoint]) -> Result<Vec<CommandFrame>> {
    check_index("mini channel", channel, MINI_CHANNELS)?;
    check_curve(points, MINI_CURVE_POINTS)?;

    let base = 0x30 + 0x10 * channel as u8;
    points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            frame(&[
                Opcode::MiniCommand.byte(),
                base + i as u8,
                Opcode::MiniPrimary.byte(),
                2 * point.temp,
                Opcode::MiniSecondary.byte(),
                point.pwm,
                Opcode::MiniFlush.byte(),
            ])
        })
        .collect()
}

/// One bit per channel, set for analog output instead of PWM
pub fn big_output_mode(mask: u8) -> Result<CommandFrame> {
    check_value("output mode mask", mask, 0x0F)?;
    frame(&[Opcode::OutputMode.byte(), mask])
}

pub fn big_sensor_assignment(
    channel: usize,
    digital: u8,
    analog: u8,
    big: u8,
) -> Result<CommandFrame> {
    check_index("channel", channel, BASE_CHANNELS)?;
    check_value("big sensor", big, 0x0F)?;
    frame(&[
        Opcode::AssignDigital.indexed(channel),
        digital,
        Opcode::AssignAnalog.indexed(channel),
        analog,
        Opcode::AssignBig.indexed(channel),
        big,
    ])
}

pub fn big_analog_scale(sensor: usize, factor: u8) -> Result<CommandFrame> {
    check_index("big analog sensor", sensor, BIG_ANALOG_SENSORS)?;
    frame(&[Opcode::BigScale.indexed(sensor), factor])
}

pub fn big_analog_abs_scale(sensor: usize, factor: u8) -> Result<CommandFrame> {
    check_index("big analog sensor", sensor, BIG_ANALOG_SENSORS)?;
    frame(&[Opcode::BigAnalogAbsScale.indexed(sensor), factor])
}

pub fn big_digital_abs_scale(sensor: usize, factor: u8) -> Result<CommandFrame> {
    check_index("digital sensor", sensor, BASE_DIGITAL_SENSORS)?;
    frame(&[Opcode::BigDigitalAbsScale.indexed(sensor), factor])
}

/// Target temperature, sent in half-degree steps
pub fn big_target_temp(channel: usize, temp: u8) -> Result<CommandFrame> {
    check_index("channel", channel, BASE_CHANNELS)?;
    check_value("target temperature", temp, MAX_CURVE_TEMP)?;
    frame(&[Opcode::TargetTemp.indexed(channel), 2 * temp])
}

pub fn big_target_mode(channel: usize, mode: u8) -> Result<CommandFrame> {
    check_index("channel", channel, BASE_CHANNELS)?;
    check_value("target mode", mode, MAX_TARGET_MODE)?;
    frame(&[Opcode::TargetMode.indexed(channel), mode])
}
