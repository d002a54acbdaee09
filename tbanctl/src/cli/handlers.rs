//! Command execution handlers

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use tban_core::registers::{self, WATCHDOG_COUNTER, WATCHDOG_ENABLED};
use tban_core::{default_config_path, CurvePoint, TbanConfig, TbanError, Variant};

use crate::config::CliConfig;
use crate::format::{self, format_success};
use crate::report;
use crate::session::Session;

use super::commands::*;

/// Snapshots younger than this are reused by one-shot reads
const SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(1);

fn print(output: String) {
    println!("{}", output);
}

/// Handle info command
pub fn handle_info(session: &mut Session, format: &OutputFormat) -> Result<()> {
    let presence = session.presence()?;
    let info = report::info_report(session.tban(), presence.big, presence.mini)?;
    print(format::format_info(&info, &format.into())?);
    Ok(())
}

/// Handle status command
pub fn handle_status(session: &mut Session, format: &OutputFormat) -> Result<()> {
    let presence = session.presence()?;
    let tban = session.tban();
    let status = report::status_report(tban, tban.names())?;
    print(format::format_status(&status, &format.into())?);

    if presence.big {
        let big = report::big_report(tban, tban.names())?;
        print(format::format_big(&big, &format.into())?);
    }
    if presence.mini {
        let mini = report::mini_report(tban, tban.names())?;
        print(format::format_mini(&mini, &format.into())?);
    }
    Ok(())
}

/// Handle sensors command
pub fn handle_sensors(
    session: &mut Session,
    command: Option<SensorCommands>,
    format: &OutputFormat,
) -> Result<()> {
    match command {
        None => {
            session.query(Variant::Base)?;
            let tban = session.tban();
            let status = report::status_report(tban, tban.names())?;
            print(format::format_sensors(&status, &format.into())?);
        }
        Some(SensorCommands::Scale { index, factor }) => {
            session.run("Cannot set scale factor", |t| t.set_scale_factor(index, factor))?;
            print(format_success(&format!(
                "Set scale factor of sensor {} to {}",
                index, factor
            )));
        }
    }
    Ok(())
}

/// Handle dump command
pub fn handle_dump(
    session: &mut Session,
    variant: Variant,
    index: Option<usize>,
    format: &OutputFormat,
) -> Result<()> {
    session.query(variant)?;
    let snapshot = session
        .tban()
        .snapshot(variant)
        .ok_or(TbanError::NotQueried(variant))?;
    print(format::format_dump(
        variant,
        snapshot.as_bytes(),
        index,
        &format.into(),
    )?);
    Ok(())
}

/// Handle read command
pub fn handle_read(
    session: &mut Session,
    name: &str,
    index: Option<usize>,
    format: &OutputFormat,
) -> Result<()> {
    let register = registers::find(name).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown register '{}'. Run `tbanctl registers` for the list",
            name
        )
    })?;

    // the base vector carries the firmware version every gated read checks
    session.query_if_stale(Variant::Base, SNAPSHOT_MAX_AGE)?;
    if register.variant != Variant::Base {
        session.query_if_stale(register.variant, SNAPSHOT_MAX_AGE)?;
    }
    let values = report::register_values(session.tban(), register, index)?;
    print(format::format_register(&values, &format.into())?);
    Ok(())
}

/// Handle registers command
pub fn handle_registers(format: &OutputFormat) -> Result<()> {
    print(format::format_registers(registers::REGISTERS, &format.into())?);
    Ok(())
}

/// Parse "temp:pwm,temp:pwm,..." into curve points
pub fn parse_curve(points: &str) -> Result<Vec<CurvePoint>> {
    points
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let (temp, pwm) = p
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("Invalid curve point '{}', expected temp:pwm", p))?;
            Ok(CurvePoint {
                temp: temp
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid temperature in '{}'", p))?,
                pwm: pwm
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid PWM in '{}'", p))?,
            })
        })
        .collect()
}

fn show_progress(session: &mut Session) {
    session.tban_mut().set_progress(|current, max| {
        debug!("Step {} of {}", current, max);
    });
}

/// Handle channel commands
pub fn handle_channel(
    session: &mut Session,
    command: ChannelCommands,
    format: &OutputFormat,
) -> Result<()> {
    match command {
        ChannelCommands::Pwm { channel, pwm } => {
            session.run("Cannot set PWM", |t| t.set_pwm(channel, pwm))?;
            print(format_success(&format!(
                "Set channel {} to {}% PWM",
                channel, pwm
            )));
        }
        ChannelCommands::InitPwm { channel, pwm } => {
            session.run("Cannot set start-up PWM", |t| t.set_init_pwm(channel, pwm))?;
            print(format_success(&format!(
                "Set start-up PWM of channel {} to {}%",
                channel, pwm
            )));
        }
        ChannelCommands::Mode { mask } => {
            session.run("Cannot set channel mode", |t| t.set_channel_mode(mask))?;
            print(format_success(&format!("Set channel mode mask to {:#04x}", mask)));
        }
        ChannelCommands::Hysteresis { channel, value } => {
            session.run("Cannot set hysteresis", |t| t.set_hysteresis(channel, value))?;
            print(format_success(&format!(
                "Set hysteresis of channel {} to {}",
                channel, value
            )));
        }
        ChannelCommands::Sensors {
            channel,
            digital,
            analog,
        } => {
            session.run("Cannot assign sensors", |t| {
                t.set_sensor_assignment(channel, digital, analog)
            })?;
            print(format_success(&format!(
                "Assigned sensors to channel {}",
                channel
            )));
        }
        ChannelCommands::Curve { command } => match command {
            CurveCommands::Get { channel } => {
                session.query_if_stale(Variant::Base, SNAPSHOT_MAX_AGE)?;
                let tban = session.tban();
                let curve = report::curve_report(tban, tban.names(), channel)?;
                print(format::format_curve(&curve, &format.into())?);
            }
            CurveCommands::Set { channel, points } => {
                let points = parse_curve(&points)?;
                show_progress(session);
                session.run("Cannot write curve", |t| t.set_curve(channel, &points))?;
                print(format_success(&format!("Wrote curve of channel {}", channel)));
            }
        },
    }
    Ok(())
}

/// Handle watchdog commands
pub fn handle_watchdog(
    session: &mut Session,
    command: WatchdogCommands,
    format: &OutputFormat,
) -> Result<()> {
    // the firmware check needs a base snapshot
    session.query_if_stale(Variant::Base, SNAPSHOT_MAX_AGE)?;
    match command {
        WatchdogCommands::Kick => {
            session.run("Cannot kick watchdog", |t| t.kick_watchdog())?;
            print(format_success("Watchdog armed"));
        }
        WatchdogCommands::Disable => {
            session.run("Cannot disable watchdog", |t| t.disable_watchdog())?;
            print(format_success("Watchdog disabled"));
        }
        WatchdogCommands::Status => {
            let tban = session.tban();
            let enabled = WATCHDOG_ENABLED.read(tban, 0)? != 0;
            let counter = WATCHDOG_COUNTER.read(tban, 0)?;
            match format {
                OutputFormat::Json => print(serde_json::to_string_pretty(&serde_json::json!({
                    "enabled": enabled,
                    "counter": counter,
                }))?),
                OutputFormat::Table => {
                    print(format!("Watchdog enabled: {}", enabled));
                    print(format!("Watchdog counter: {}", counter));
                }
            }
        }
    }
    Ok(())
}

/// Handle the single-frame device commands
pub fn handle_simple(session: &mut Session, command: Commands) -> Result<()> {
    let message = match command {
        Commands::Led { state } => {
            session.run("Cannot switch LED", |t| t.set_led(state.is_on()))?;
            format!("LED {}", if state.is_on() { "on" } else { "off" })
        }
        Commands::Buzzer { state } => {
            session.run("Cannot switch buzzer", |t| t.set_buzzer(state.is_on()))?;
            format!("Buzzer {}", if state.is_on() { "on" } else { "off" })
        }
        Commands::PwmFreq { frequency } => {
            session.run("Cannot set PWM frequency", |t| t.set_pwm_frequency(frequency))?;
            format!("PWM frequency set to {}", frequency)
        }
        Commands::Tacho { mask } => {
            session.run("Cannot set tacho mask", |t| t.set_tacho(mask))?;
            format!("Tacho mask set to {:#04x}", mask)
        }
        Commands::Motion {
            lower,
            upper,
            error,
        } => {
            session.run("Cannot configure motion detection", |t| {
                t.set_motion(lower, upper, error)
            })?;
            format!(
                "Motion limits set to {}..{} (error {})",
                lower, upper, error
            )
        }
        Commands::Ping { mask } => {
            session.run("Ping failed", |t| t.ping(mask))?;
            "Controller answered".to_string()
        }
        Commands::Reset => {
            session.run("Cannot reset controller", |t| t.reset())?;
            "Controller reset".to_string()
        }
        other => return Err(anyhow::anyhow!("Not a device command: {:?}", other)),
    };
    print(format_success(&message));
    Ok(())
}

/// Handle bigNG commands
pub fn handle_big(session: &mut Session, command: BigCommands, format: &OutputFormat) -> Result<()> {
    if !session.presence()?.big {
        return Err(anyhow::anyhow!("No bigNG controller detected"));
    }

    let message = match command {
        BigCommands::Status => {
            let tban = session.tban();
            let big = report::big_report(tban, tban.names())?;
            print(format::format_big(&big, &format.into())?);
            return Ok(());
        }
        BigCommands::OutputMode { mask } => {
            session.run("Cannot set output mode", |t| t.set_big_output_mode(mask))?;
            format!("Output mode mask set to {:#04x}", mask)
        }
        BigCommands::Sensors {
            channel,
            digital,
            analog,
            big,
        } => {
            session.run("Cannot assign sensors", |t| {
                t.set_big_sensor_assignment(channel, digital, analog, big)
            })?;
            format!("Assigned sensors to channel {}", channel)
        }
        BigCommands::AnalogScale { sensor, factor } => {
            session.run("Cannot set scale", |t| t.set_big_analog_scale(sensor, factor))?;
            format!("Scale of analog sensor {} set to {}", sensor, factor)
        }
        BigCommands::AnalogAbsScale { sensor, factor } => {
            session.run("Cannot set absolute scale", |t| {
                t.set_big_analog_abs_scale(sensor, factor)
            })?;
            format!("Absolute scale of analog sensor {} set to {}", sensor, factor)
        }
        BigCommands::DigitalAbsScale { sensor, factor } => {
            session.run("Cannot set absolute scale", |t| {
                t.set_big_digital_abs_scale(sensor, factor)
            })?;
            format!("Absolute scale of digital sensor {} set to {}", sensor, factor)
        }
        BigCommands::TargetTemp { channel, temp } => {
            session.run("Cannot set target temperature", |t| {
                t.set_big_target_temp(channel, temp)
            })?;
            format!("Target temperature of channel {} set to {}", channel, temp)
        }
        BigCommands::TargetMode { channel, mode } => {
            session.run("Cannot set target mode", |t| t.set_big_target_mode(channel, mode))?;
            format!("Target mode of channel {} set to {}", channel, mode)
        }
    };
    print(format_success(&message));
    Ok(())
}

/// Handle miniNG commands
pub fn handle_mini(
    session: &mut Session,
    command: MiniCommands,
    format: &OutputFormat,
) -> Result<()> {
    if !session.presence()?.mini {
        return Err(anyhow::anyhow!("No miniNG add-on detected"));
    }

    match command {
        MiniCommands::Status => {
            let tban = session.tban();
            let mini = report::mini_report(tban, tban.names())?;
            print(format::format_mini(&mini, &format.into())?);
        }
        MiniCommands::Curve { command } => match command {
            CurveCommands::Get { channel } => {
                let tban = session.tban();
                let curve = report::mini_curve_report(tban, tban.names(), channel)?;
                print(format::format_curve(&curve, &format.into())?);
            }
            CurveCommands::Set { channel, points } => {
                let points = parse_curve(&points)?;
                show_progress(session);
                session.run("Cannot write miniNG curve", |t| {
                    t.set_mini_curve(channel, &points)
                })?;
                print(format_success(&format!(
                    "Wrote curve of miniNG channel {}",
                    channel
                )));
            }
        },
    }
    Ok(())
}

/// Handle monitor command
pub fn handle_monitor(
    session: &mut Session,
    iterations: Option<u32>,
    interval: u64,
    format: &OutputFormat,
) -> Result<()> {
    let mut done = 0;
    while !session.shutdown().requested() {
        session.refresh()?;
        handle_status(session, format)?;
        done += 1;
        if iterations.is_some_and(|n| done >= n) {
            break;
        }
        if !session.shutdown().sleep(Duration::from_secs(interval)) {
            debug!("Monitor stopped after {} refreshes", done);
            break;
        }
    }
    Ok(())
}

/// Handle names commands
pub fn handle_names(
    command: NameCommands,
    config: &CliConfig,
    config_path: Option<&Path>,
    format: &OutputFormat,
) -> Result<()> {
    match command {
        NameCommands::List => {
            let names = config.tban.name_table()?;
            print(format::format_names(&names, &format.into())?);
        }
        NameCommands::Set {
            category,
            index,
            short,
            long,
        } => {
            // edit the file itself so flag and env overrides are not persisted
            let path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(default_config_path);
            let mut file = TbanConfig::load(&path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?;
            let mut names = file.name_table()?;
            let long = long.unwrap_or_else(|| short.clone());
            names.set_name(category, index, &short, &long)?;
            file.names = names.overrides();

            let saved = CliConfig {
                tban: file,
                ..CliConfig::default()
            };
            saved.save(&path)?;
            print(format_success(&format!(
                "Named {} {} '{}' in {}",
                category,
                index,
                short,
                path.display()
            )));
        }
    }
    Ok(())
}

/// Handle config command
pub fn handle_config(config: &CliConfig, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print(serde_json::to_string_pretty(&config.tban)?),
        OutputFormat::Table => {
            match &config.source {
                Some(path) => print(format!("# Loaded from {}", path.display())),
                None => print("# Built-in defaults".to_string()),
            }
            print(config.tban.to_toml()?);
        }
    }
    Ok(())
}

/// Handle errors command
pub fn handle_errors(format: &OutputFormat) -> Result<()> {
    print(format::format_errors(&format.into())?);
    Ok(())
}

/// Generate shell completion script
pub fn generate_completion(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "tbanctl", &mut std::io::stdout());
}
