//! Output formatting utilities for the CLI
//!
//! Provides table and JSON formatting with colors.

use anyhow::Result;
use colored::*;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use tban_core::{ErrorCode, NameCategory, NameTable, Register, Variant};

use crate::report::{
    BigReport, CurveReport, InfoReport, MiniReport, RegisterValue, SensorReading, StatusReport,
};

/// Output format options
#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
}

fn json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn yes_no(value: bool) -> ColoredString {
    if value {
        "Yes".green()
    } else {
        "No".red()
    }
}

/// Format hardware information
pub fn format_info(report: &InfoReport, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(report),
        OutputFormat::Table => {
            let info = &report.info;
            let mut lines = vec![
                "T-Balancer Information".bold().to_string(),
                format!("Device: {}", info.device.name().cyan()),
                format!("Firmware: {}", info.firmware.to_string().cyan()),
                format!(
                    "Firmware date: {}/{}",
                    info.firmware_month, info.firmware_year
                ),
                format!("Protocol: {}", info.protocol),
                format!("Serial buffer: {} bytes", info.serial_buffer_len),
                format!("Timebase: {}", info.timebase),
                format!("Sensor hub: {}", info.sensorhub),
                format!(
                    "Warning: {} ({})",
                    warning_colored(info.warning_level, report.warning),
                    info.warning_level
                ),
            ];
            match info.watchdog_enabled {
                Some(enabled) => lines.push(format!("Watchdog: {}", yes_no(enabled))),
                None => lines.push(format!("Watchdog: {}", "unsupported".dimmed())),
            }
            lines.push(format!("bigNG: {}", yes_no(report.big)));
            lines.push(format!("miniNG: {}", yes_no(report.mini)));
            Ok(lines.join("\n"))
        }
    }
}

fn warning_colored(level: u8, text: &str) -> ColoredString {
    match level {
        0 => text.green(),
        1..=5 => text.yellow(),
        _ => text.red(),
    }
}

#[derive(Tabled)]
struct SensorRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Temp")]
    temp: String,
    #[tabled(rename = "Raw")]
    raw: u32,
    #[tabled(rename = "Scale")]
    scale: u32,
}

fn sensor_table(title: &str, sensors: &[SensorReading]) -> String {
    let rows: Vec<SensorRow> = sensors
        .iter()
        .map(|s| SensorRow {
            index: s.index,
            name: s.name.clone(),
            temp: if s.raw == 0 {
                "-".dimmed().to_string()
            } else {
                s.temp.to_string().cyan().to_string()
            },
            raw: s.raw,
            scale: s.scale,
        })
        .collect();
    let table = Table::new(rows).with(Style::rounded()).to_string();
    format!("{}\n{}", title.bold(), table)
}

/// Format channel and sensor status
pub fn format_status(report: &StatusReport, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(report),
        OutputFormat::Table => {
            #[derive(Tabled)]
            struct ChannelRow {
                #[tabled(rename = "Channel")]
                name: String,
                #[tabled(rename = "PWM %")]
                pwm: String,
                #[tabled(rename = "Temp")]
                temp: u32,
                #[tabled(rename = "Max temp")]
                max_temp: u32,
                #[tabled(rename = "Max RPM")]
                max_rpm: u32,
                #[tabled(rename = "Mode")]
                mode: u32,
            }

            let rows: Vec<ChannelRow> = report
                .channels
                .iter()
                .map(|c| ChannelRow {
                    name: c.name.clone(),
                    pwm: if c.pwm > 0 {
                        format!("{}%", c.pwm).cyan().to_string()
                    } else {
                        "0%".dimmed().to_string()
                    },
                    temp: c.temp,
                    max_temp: c.max_temp,
                    max_rpm: c.max_rpm,
                    mode: c.mode,
                })
                .collect();

            let channels = Table::new(rows).with(Style::rounded()).to_string();
            Ok([
                format!(
                    "{} {}",
                    "Warning:".bold(),
                    warning_colored(report.warning_level, report.warning)
                ),
                format!("{}\n{}", "Channels:".bold(), channels),
                sensor_table("Digital sensors:", &report.digital_sensors),
                sensor_table("Analog sensors:", &report.analog_sensors),
            ]
            .join("\n"))
        }
    }
}

/// Format sensors only
pub fn format_sensors(report: &StatusReport, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(&serde_json::json!({
            "digital_sensors": report.digital_sensors,
            "analog_sensors": report.analog_sensors,
        })),
        OutputFormat::Table => Ok(format!(
            "{}\n{}",
            sensor_table("Digital sensors:", &report.digital_sensors),
            sensor_table("Analog sensors:", &report.analog_sensors)
        )),
    }
}

pub fn format_big(report: &BigReport, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(report),
        OutputFormat::Table => {
            #[derive(Tabled)]
            struct BigRow {
                #[tabled(rename = "Channel")]
                name: String,
                #[tabled(rename = "Output")]
                output: &'static str,
                #[tabled(rename = "Target temp")]
                target_temp: u32,
                #[tabled(rename = "Target mode")]
                target_mode: u32,
                #[tabled(rename = "Sensor")]
                sensor: u32,
            }

            let rows: Vec<BigRow> = report
                .channels
                .iter()
                .map(|c| BigRow {
                    name: c.name.clone(),
                    output: if c.output_pwm { "PWM" } else { "Voltage" },
                    target_temp: c.target_temp,
                    target_mode: c.target_mode,
                    sensor: c.specific_sensor,
                })
                .collect();

            let table = Table::new(rows).with(Style::rounded()).to_string();
            Ok([
                format!("{} {}", "Overtemp:".bold(), report.overtemp),
                format!("{}\n{}", "bigNG channels:".bold(), table),
                sensor_table("bigNG analog sensors:", &report.analog_sensors),
            ]
            .join("\n"))
        }
    }
}

pub fn format_mini(report: &MiniReport, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(report),
        OutputFormat::Table => {
            #[derive(Tabled)]
            struct MiniRow {
                #[tabled(rename = "Channel")]
                name: String,
                #[tabled(rename = "RPM")]
                rpm: String,
                #[tabled(rename = "Max RPM")]
                max_rpm: u32,
                #[tabled(rename = "Hysteresis")]
                hysteresis: u32,
                #[tabled(rename = "Overtemp")]
                overtemp: u32,
            }

            #[derive(Tabled)]
            struct MiniSensorRow {
                #[tabled(rename = "Sensor")]
                name: String,
                #[tabled(rename = "Temp")]
                temp: u32,
                #[tabled(rename = "Calibrated")]
                calibrated: u32,
            }

            let channels: Vec<MiniRow> = report
                .channels
                .iter()
                .map(|c| MiniRow {
                    name: c.name.clone(),
                    rpm: if c.rpm > 0 {
                        c.rpm.to_string().green().to_string()
                    } else {
                        "0".red().to_string()
                    },
                    max_rpm: c.max_rpm,
                    hysteresis: c.hysteresis,
                    overtemp: c.overtemp,
                })
                .collect();
            let sensors: Vec<MiniSensorRow> = report
                .sensors
                .iter()
                .map(|s| MiniSensorRow {
                    name: s.name.clone(),
                    temp: s.temp,
                    calibrated: s.calibrated,
                })
                .collect();

            let status = if report.status == 0 {
                report.status_text.green()
            } else {
                report.status_text.yellow()
            };
            Ok([
                format!("{} {}", "miniNG status:".bold(), status),
                Table::new(channels).with(Style::rounded()).to_string(),
                Table::new(sensors).with(Style::rounded()).to_string(),
            ]
            .join("\n"))
        }
    }
}

pub fn format_curve(report: &CurveReport, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(report),
        OutputFormat::Table => {
            #[derive(Tabled)]
            struct PointRow {
                #[tabled(rename = "Point")]
                index: usize,
                #[tabled(rename = "Temp")]
                temp: u8,
                #[tabled(rename = "PWM %")]
                pwm: u8,
            }

            let rows: Vec<PointRow> = report
                .points
                .iter()
                .enumerate()
                .map(|(index, p)| PointRow {
                    index,
                    temp: p.temp,
                    pwm: p.pwm,
                })
                .collect();
            let table = Table::new(rows).with(Style::rounded()).to_string();
            Ok(format!(
                "{}\n{}",
                format!("Curve of {}:", report.name).bold(),
                table
            ))
        }
    }
}

/// Format a raw status buffer, sixteen bytes per line
pub fn format_dump(
    variant: Variant,
    bytes: &[u8],
    index: Option<usize>,
    format: &OutputFormat,
) -> Result<String> {
    if let Some(index) = index {
        let value = bytes.get(index).copied().ok_or_else(|| {
            anyhow::anyhow!(
                "Index {} is past the end of the {} buffer ({} bytes)",
                index,
                variant,
                bytes.len()
            )
        })?;
        return match format {
            OutputFormat::Json => json(&serde_json::json!({
                "variant": variant,
                "index": index,
                "value": value,
            })),
            OutputFormat::Table => Ok(format!("{}[{}] = {}", variant, index, value)),
        };
    }

    match format {
        OutputFormat::Json => json(&serde_json::json!({
            "variant": variant,
            "bytes": bytes,
        })),
        OutputFormat::Table => {
            let mut output = format!("{} ({} bytes)", variant.to_string().bold(), bytes.len());
            for (row, chunk) in bytes.chunks(16).enumerate() {
                let values: Vec<String> = chunk.iter().map(|b| format!("{:3}", b)).collect();
                output.push_str(&format!(
                    "\n{} {}",
                    format!("{:3}:", row * 16).dimmed(),
                    values.join(" ")
                ));
            }
            Ok(output)
        }
    }
}

pub fn format_register(values: &[RegisterValue], format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json(values),
        OutputFormat::Table => Ok(values
            .iter()
            .map(|v| format!("{}[{}] = {}", v.register, v.index, v.value.to_string().cyan()))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

pub fn format_registers(registers: &[Register], format: &OutputFormat) -> Result<String> {
    #[derive(Tabled, Serialize)]
    struct RegisterRow {
        #[tabled(rename = "Register")]
        name: &'static str,
        #[tabled(rename = "Source")]
        variant: Variant,
        #[tabled(rename = "Count")]
        count: usize,
        #[tabled(rename = "Min firmware")]
        min_firmware: String,
    }

    let rows: Vec<RegisterRow> = registers
        .iter()
        .map(|r| RegisterRow {
            name: r.name,
            variant: r.variant,
            count: r.count,
            min_firmware: r
                .min_firmware
                .map(|v| format!("{}.{}", v / 10, v % 10))
                .unwrap_or_default(),
        })
        .collect();

    match format {
        OutputFormat::Json => json(&rows),
        OutputFormat::Table => Ok(Table::new(rows).with(Style::rounded()).to_string()),
    }
}

pub fn format_names(names: &NameTable, format: &OutputFormat) -> Result<String> {
    #[derive(Tabled, Serialize)]
    struct NameRow {
        #[tabled(rename = "Category")]
        category: NameCategory,
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "Short")]
        short: String,
        #[tabled(rename = "Long")]
        long: String,
    }

    let rows: Vec<NameRow> = NameCategory::ALL
        .into_iter()
        .flat_map(|category| (0..category.count()).map(move |index| (category, index)))
        .filter_map(|(category, index)| {
            names.get(category, index).map(|name| NameRow {
                category,
                index,
                short: name.short.clone(),
                long: name.long.clone(),
            })
        })
        .collect();

    match format {
        OutputFormat::Json => json(&rows),
        OutputFormat::Table => Ok(Table::new(rows).with(Style::rounded()).to_string()),
    }
}

/// Format the error code table
pub fn format_errors(format: &OutputFormat) -> Result<String> {
    #[derive(Tabled, Serialize)]
    struct ErrorRow {
        #[tabled(rename = "Code")]
        code: String,
        #[tabled(rename = "Name")]
        name: &'static str,
        #[tabled(rename = "Description")]
        description: &'static str,
    }

    let rows: Vec<ErrorRow> = ErrorCode::ALL
        .iter()
        .map(|c| ErrorRow {
            code: format!("0x{:02X}", c.value()),
            name: c.text(),
            description: c.description(),
        })
        .collect();

    match format {
        OutputFormat::Json => json(&rows),
        OutputFormat::Table => Ok(Table::new(rows).with(Style::rounded()).to_string()),
    }
}

/// Format success message
pub fn format_success(message: &str) -> String {
    format!("{} {}", "✓".green().bold(), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_success() {
        let message = format_success("Operation completed");
        assert!(message.contains("✓"));
        assert!(message.contains("Operation completed"));
    }

    #[test]
    fn test_format_dump_json() {
        let bytes: Vec<u8> = (0..20).collect();
        let result = format_dump(Variant::Base, &bytes, None, &OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["variant"], "base");
        assert_eq!(parsed["bytes"].as_array().unwrap().len(), 20);
    }

    #[test]
    fn test_format_dump_single_byte() {
        let bytes = vec![100, 7, 9];
        let result = format_dump(Variant::Mini, &bytes, Some(1), &OutputFormat::Table).unwrap();
        assert!(result.contains("= 7"));
        assert!(format_dump(Variant::Mini, &bytes, Some(3), &OutputFormat::Table).is_err());
    }

    #[test]
    fn test_format_dump_table_rows() {
        let bytes = vec![0u8; 40];
        let result = format_dump(Variant::Base, &bytes, None, &OutputFormat::Table).unwrap();
        // header plus three rows of sixteen
        assert_eq!(result.lines().count(), 4);
    }

    #[test]
    fn test_format_errors_json() {
        let result = format_errors(&OutputFormat::Json).unwrap();
        assert!(result.contains("TBAN_ALREADY_IN_USE"));
        assert!(result.contains("0x61"));
        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), ErrorCode::ALL.len());
    }

    #[test]
    fn test_format_names_lists_every_entry() {
        let mut names = NameTable::default();
        names
            .set_name(NameCategory::MiniCh, 1, "Pump", "Loop pump")
            .unwrap();
        let result = format_names(&names, &OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        let total: usize = NameCategory::ALL.iter().map(|c| c.count()).sum();
        assert_eq!(parsed.as_array().unwrap().len(), total);
        assert!(result.contains("Loop pump"));
        assert!(result.contains("MINI_CH"));
    }

    #[test]
    fn test_format_registers_table() {
        let result =
            format_registers(tban_core::registers::REGISTERS, &OutputFormat::Table).unwrap();
        assert!(result.contains("channel.pwm"));
        assert!(result.contains("2.8"));
    }
}
