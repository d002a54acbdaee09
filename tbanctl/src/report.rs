//! Status reports assembled from cached buffers
//!
//! Every report is built from a [`StatusSource`], so the same code serves a
//! live device and a replayed capture. Reports are plain serializable
//! structs; rendering lives in [`crate::format`].

use serde::Serialize;

use tban_core::registers::{
    read_base_curve, read_mini_curve, AS_RAW, AS_SCALE, AS_TEMP, BASE_ANALOG_SENSORS,
    BASE_CHANNELS, BASE_DIGITAL_SENSORS, BIG_ANALOG_SENSORS, BIG_AS_RAW, BIG_AS_SCALE,
    BIG_AS_TEMP, BIG_OUTPUT_MODE, BIG_OVERTEMP, BIG_SPECIFIC_SENSOR, BIG_TARGET_MODE,
    BIG_TARGET_TEMP, CH_MAX_RPM, CH_MAX_TEMP, CH_MODE, CH_PWM, CH_TEMP, DS_RAW, DS_SCALE,
    DS_TEMP, MINI_ANALOG_SENSORS, MINI_CAL_TEMP, MINI_CHANNELS, MINI_HYSTERESIS, MINI_MAX_RPM,
    MINI_OVERTEMP, MINI_RPM, MINI_STATUS, MINI_TEMP,
};
use tban_core::{
    hardware_info, mini_status_text, warning_text, CurvePoint, HardwareInfo, NameCategory,
    NameTable, Register, Result, StatusSource,
};

#[derive(Debug, Clone, Serialize)]
pub struct InfoReport {
    #[serde(flatten)]
    pub info: HardwareInfo,
    pub warning: &'static str,
    pub big: bool,
    pub mini: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    pub index: usize,
    pub name: String,
    pub pwm: u32,
    pub temp: u32,
    pub max_temp: u32,
    pub max_rpm: u32,
    pub mode: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorReading {
    pub index: usize,
    pub name: String,
    pub temp: u32,
    pub raw: u32,
    pub scale: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub warning_level: u8,
    pub warning: &'static str,
    pub channels: Vec<ChannelStatus>,
    pub digital_sensors: Vec<SensorReading>,
    pub analog_sensors: Vec<SensorReading>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BigChannel {
    pub index: usize,
    pub name: String,
    pub output_pwm: bool,
    pub target_temp: u32,
    pub target_mode: u32,
    pub specific_sensor: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BigReport {
    pub overtemp: u32,
    pub channels: Vec<BigChannel>,
    pub analog_sensors: Vec<SensorReading>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MiniChannel {
    pub index: usize,
    pub name: String,
    pub rpm: u32,
    pub max_rpm: u32,
    pub hysteresis: u32,
    pub overtemp: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MiniSensor {
    pub index: usize,
    pub name: String,
    pub temp: u32,
    pub calibrated: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MiniReport {
    pub status: u32,
    pub status_text: &'static str,
    pub channels: Vec<MiniChannel>,
    pub sensors: Vec<MiniSensor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurveReport {
    pub channel: usize,
    pub name: String,
    pub points: Vec<CurvePoint>,
}

/// One register value, for `read`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterValue {
    pub register: &'static str,
    pub index: usize,
    pub value: u32,
}

pub fn info_report<S: StatusSource + ?Sized>(source: &S, big: bool, mini: bool) -> Result<InfoReport> {
    let info = hardware_info(source)?;
    Ok(InfoReport {
        warning: warning_text(info.warning_level),
        info,
        big,
        mini,
    })
}

pub fn status_report<S: StatusSource + ?Sized>(source: &S, names: &NameTable) -> Result<StatusReport> {
    let warning_level = tban_core::registers::WARNING_LEVEL.read(source, 0)? as u8;

    let mut channels = Vec::with_capacity(BASE_CHANNELS);
    for index in 0..BASE_CHANNELS {
        channels.push(ChannelStatus {
            index,
            name: names.label(NameCategory::TbanCh, index),
            pwm: CH_PWM.read(source, index)?,
            temp: CH_TEMP.read(source, index)?,
            max_temp: CH_MAX_TEMP.read(source, index)?,
            max_rpm: CH_MAX_RPM.read(source, index)?,
            mode: CH_MODE.read(source, index)?,
        });
    }

    Ok(StatusReport {
        warning_level,
        warning: warning_text(warning_level),
        channels,
        digital_sensors: sensors(
            source,
            names,
            NameCategory::TbanDs,
            BASE_DIGITAL_SENSORS,
            [&DS_TEMP, &DS_RAW, &DS_SCALE],
        )?,
        analog_sensors: sensors(
            source,
            names,
            NameCategory::TbanAs,
            BASE_ANALOG_SENSORS,
            [&AS_TEMP, &AS_RAW, &AS_SCALE],
        )?,
    })
}

fn sensors<S: StatusSource + ?Sized>(
    source: &S,
    names: &NameTable,
    category: NameCategory,
    count: usize,
    [temp, raw, scale]: [&Register; 3],
) -> Result<Vec<SensorReading>> {
    (0..count)
        .map(|index| {
            Ok(SensorReading {
                index,
                name: names.label(category, index),
                temp: temp.read(source, index)?,
                raw: raw.read(source, index)?,
                scale: scale.read(source, index)?,
            })
        })
        .collect()
}

pub fn big_report<S: StatusSource + ?Sized>(source: &S, names: &NameTable) -> Result<BigReport> {
    let mut channels = Vec::with_capacity(BASE_CHANNELS);
    for index in 0..BASE_CHANNELS {
        channels.push(BigChannel {
            index,
            name: names.label(NameCategory::TbanCh, index),
            output_pwm: BIG_OUTPUT_MODE.read(source, index)? != 0,
            target_temp: BIG_TARGET_TEMP.read(source, index)?,
            target_mode: BIG_TARGET_MODE.read(source, index)?,
            specific_sensor: BIG_SPECIFIC_SENSOR.read(source, index)?,
        });
    }

    Ok(BigReport {
        overtemp: BIG_OVERTEMP.read(source, 0)?,
        channels,
        analog_sensors: sensors(
            source,
            names,
            NameCategory::BigNgAs,
            BIG_ANALOG_SENSORS,
            [&BIG_AS_TEMP, &BIG_AS_RAW, &BIG_AS_SCALE],
        )?,
    })
}

pub fn mini_report<S: StatusSource + ?Sized>(source: &S, names: &NameTable) -> Result<MiniReport> {
    let status = MINI_STATUS.read(source, 0)?;

    let mut channels = Vec::with_capacity(MINI_CHANNELS);
    for index in 0..MINI_CHANNELS {
        channels.push(MiniChannel {
            index,
            name: names.label(NameCategory::MiniCh, index),
            rpm: MINI_RPM.read(source, index)?,
            max_rpm: MINI_MAX_RPM.read(source, index)?,
            hysteresis: MINI_HYSTERESIS.read(source, index)?,
            overtemp: MINI_OVERTEMP.read(source, index)?,
        });
    }

    let mut sensors = Vec::with_capacity(MINI_ANALOG_SENSORS);
    for index in 0..MINI_ANALOG_SENSORS {
        sensors.push(MiniSensor {
            index,
            name: names.label(NameCategory::MiniNgAs, index),
            temp: MINI_TEMP.read(source, index)?,
            calibrated: MINI_CAL_TEMP.read(source, index)?,
        });
    }

    Ok(MiniReport {
        status,
        status_text: u8::try_from(status)
            .ok()
            .and_then(mini_status_text)
            .unwrap_or("unknown"),
        channels,
        sensors,
    })
}

pub fn curve_report<S: StatusSource + ?Sized>(
    source: &S,
    names: &NameTable,
    channel: usize,
) -> Result<CurveReport> {
    Ok(CurveReport {
        channel,
        name: names.label(NameCategory::TbanCh, channel),
        points: read_base_curve(source, channel)?,
    })
}

pub fn mini_curve_report<S: StatusSource + ?Sized>(
    source: &S,
    names: &NameTable,
    channel: usize,
) -> Result<CurveReport> {
    Ok(CurveReport {
        channel,
        name: names.label(NameCategory::MiniCh, channel),
        points: read_mini_curve(source, channel)?,
    })
}

/// Values of `register`, either one instance or all of them
pub fn register_values<S: StatusSource + ?Sized>(
    source: &S,
    register: &'static Register,
    index: Option<usize>,
) -> Result<Vec<RegisterValue>> {
    let value = |index| -> Result<RegisterValue> {
        Ok(RegisterValue {
            register: register.name,
            index,
            value: register.read(source, index)?,
        })
    };
    match index {
        Some(index) => Ok(vec![value(index)?]),
        None => (0..register.count).map(value).collect(),
    }
}
