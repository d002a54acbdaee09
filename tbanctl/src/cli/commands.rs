//! CLI command and subcommand definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tban_core::{NameCategory, Variant};

/// T-Balancer fan controller CLI
#[derive(Parser, Debug)]
#[command(name = "tbanctl")]
#[command(version, about = "T-Balancer fan controller CLI", long_about = None)]
pub struct Cli {
    /// Serial device (overrides config file)
    #[arg(short, long, global = true)]
    pub device: Option<String>,

    /// Lock file guarding exclusive access to the device
    #[arg(long, global = true)]
    pub lock_file: Option<PathBuf>,

    /// Seconds to wait for another process holding the device
    #[arg(long, value_name = "SECS", global = true)]
    pub lock_wait: Option<u64>,

    /// Attempts per device operation
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (default: ~/.config/tban/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Don't load config file
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Replay a captured base status buffer instead of opening the device
    #[arg(long, value_name = "BASE", global = true)]
    pub fake_dev: Option<PathBuf>,

    /// Captured miniNG status buffer to replay alongside --fake-dev
    #[arg(long, value_name = "MINI", requires = "fake_dev", global = true)]
    pub fake_mini: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty table output
    Table,
    /// JSON output
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
        }
    }
}

impl From<&OutputFormat> for crate::format::OutputFormat {
    fn from(format: &OutputFormat) -> Self {
        match format {
            OutputFormat::Table => crate::format::OutputFormat::Table,
            OutputFormat::Json => crate::format::OutputFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Switch::On
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show hardware and firmware information
    Info,

    /// Show channel and sensor status
    Status,

    /// Print a raw status buffer
    Dump {
        /// Status source: base, big or mini
        #[arg(value_parser = parse_variant)]
        variant: Variant,

        /// Print a single byte
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// Read a named register (see `tbanctl registers`)
    Read {
        /// Register name, e.g. `channel.pwm`
        name: String,

        /// Instance to read; all instances when omitted
        index: Option<usize>,
    },

    /// List the named registers
    Registers,

    /// Channel settings
    Channel {
        #[command(subcommand)]
        command: ChannelCommands,
    },

    /// Show sensors or set their scale factors
    Sensors {
        #[command(subcommand)]
        command: Option<SensorCommands>,
    },

    /// Switch the front LED
    Led {
        #[arg(value_enum)]
        state: Switch,
    },

    /// Switch the alarm buzzer
    Buzzer {
        #[arg(value_enum)]
        state: Switch,
    },

    /// Set the PWM frequency
    PwmFreq {
        frequency: u8,
    },

    /// Set the tacho mask
    Tacho {
        #[arg(value_parser = parse_byte)]
        mask: u8,
    },

    /// Configure motion detection
    Motion {
        /// Lower limit
        lower: u8,
        /// Upper limit
        upper: u8,
        /// Error limit
        error: u8,
    },

    /// Ping the controller
    Ping {
        #[arg(value_parser = parse_byte, default_value = "0")]
        mask: u8,
    },

    /// USB watchdog control (firmware 2.8 and later)
    Watchdog {
        #[command(subcommand)]
        command: WatchdogCommands,
    },

    /// Reset the controller
    Reset,

    /// bigNG commands
    Big {
        #[command(subcommand)]
        command: BigCommands,
    },

    /// miniNG add-on commands
    Mini {
        #[command(subcommand)]
        command: MiniCommands,
    },

    /// Poll and print the status repeatedly
    Monitor {
        /// Number of polls; runs until interrupted when omitted
        #[arg(short = 'n', long)]
        iterations: Option<u32>,

        /// Seconds between polls
        #[arg(short, long, default_value = "2")]
        interval: u64,
    },

    /// Display names of sensors and channels
    Names {
        #[command(subcommand)]
        command: NameCommands,
    },

    /// Show the effective configuration
    Config,

    /// List the library error codes
    Errors,

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ChannelCommands {
    /// Set the PWM of a channel
    Pwm {
        /// Channel (0-3)
        channel: usize,
        /// PWM percentage (0-100)
        pwm: u8,
    },

    /// Set the start-up PWM of a channel
    InitPwm {
        /// Channel (0-3)
        channel: usize,
        /// PWM percentage (0-100)
        pwm: u8,
    },

    /// Set the channel mode mask
    Mode {
        #[arg(value_parser = parse_byte)]
        mask: u8,
    },

    /// Set the hysteresis of a channel
    Hysteresis {
        channel: usize,
        value: u8,
    },

    /// Assign sensors to a channel
    Sensors {
        channel: usize,
        /// Digital sensor mask
        #[arg(value_parser = parse_byte)]
        digital: u8,
        /// Analog sensor mask
        #[arg(value_parser = parse_byte)]
        analog: u8,
    },

    /// Response curve of a channel
    Curve {
        #[command(subcommand)]
        command: CurveCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum CurveCommands {
    /// Show the curve
    Get {
        channel: usize,
    },

    /// Write the curve
    Set {
        channel: usize,

        /// Points as "temp:pwm,temp:pwm,..."
        #[arg(short, long)]
        points: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SensorCommands {
    /// Set a sensor scale factor
    Scale {
        index: usize,
        factor: u8,
    },
}

#[derive(Subcommand, Debug)]
pub enum WatchdogCommands {
    /// Arm or re-arm the watchdog
    Kick,
    /// Disable the watchdog
    Disable,
    /// Show the watchdog state
    Status,
}

#[derive(Subcommand, Debug)]
pub enum BigCommands {
    /// Show bigNG specific status
    Status,

    /// Set the output mode mask
    OutputMode {
        #[arg(value_parser = parse_byte)]
        mask: u8,
    },

    /// Assign sensors to a channel, including bigNG sensors
    Sensors {
        channel: usize,
        #[arg(value_parser = parse_byte)]
        digital: u8,
        #[arg(value_parser = parse_byte)]
        analog: u8,
        #[arg(value_parser = parse_byte)]
        big: u8,
    },

    /// Set the relative scale of a bigNG analog sensor
    AnalogScale {
        sensor: usize,
        factor: u8,
    },

    /// Set the absolute scale of a bigNG analog sensor
    AnalogAbsScale {
        sensor: usize,
        factor: u8,
    },

    /// Set the absolute scale of a digital sensor
    DigitalAbsScale {
        sensor: usize,
        factor: u8,
    },

    /// Set the target temperature of a channel
    TargetTemp {
        channel: usize,
        temp: u8,
    },

    /// Set the target mode of a channel
    TargetMode {
        channel: usize,
        mode: u8,
    },
}

#[derive(Subcommand, Debug)]
pub enum MiniCommands {
    /// Show miniNG status
    Status,

    /// Response curve of a miniNG channel
    Curve {
        #[command(subcommand)]
        command: CurveCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum NameCommands {
    /// Show every name
    List,

    /// Override a name and save it to the config file
    Set {
        /// Category tag, e.g. TBAN_DS or MINI_CH
        #[arg(value_parser = parse_category)]
        category: NameCategory,
        index: usize,
        short: String,
        /// Longer description
        long: Option<String>,
    },
}

/// Accept decimal or `0x` prefixed hexadecimal bytes
pub fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid byte '{}': {}", s, e))
}

fn parse_variant(s: &str) -> Result<Variant, String> {
    s.parse::<Variant>().map_err(|e| e.to_string())
}

fn parse_category(s: &str) -> Result<NameCategory, String> {
    s.parse::<NameCategory>().map_err(|e| e.to_string())
}
