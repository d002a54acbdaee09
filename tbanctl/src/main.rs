//! T-Balancer CLI
//!
//! Command-line interface for T-Balancer fan controllers.

use anyhow::Result;
use clap::Parser;
use tbanctl::cli::{
    generate_completion, handle_big, handle_channel, handle_config, handle_dump, handle_errors,
    handle_info, handle_mini, handle_monitor, handle_names, handle_read, handle_registers,
    handle_sensors, handle_simple, handle_status, handle_watchdog, Cli, Commands, OutputFormat,
};
use tbanctl::config::CliConfig;
use tbanctl::session::{FakeDevice, Session};
use tbanctl::shutdown::Shutdown;

/// Exit status after SIGINT, as shells report it
const EXIT_INTERRUPTED: i32 = 130;

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    let shutdown = Shutdown::install()?;

    // Build configuration using priority chain: defaults → file → env → CLI args
    let mut builder = CliConfig::builder();
    builder = builder.with_config_file(cli.config.as_deref(), !cli.no_config)?;
    builder = builder.with_env_overrides();

    if let Some(ref device) = cli.device {
        builder = builder.with_device(device)?;
    }
    if let Some(ref lock_file) = cli.lock_file {
        builder = builder.with_lock_file(lock_file);
    }
    if let Some(lock_wait) = cli.lock_wait {
        builder = builder.with_lock_timeout(lock_wait)?;
    }
    if let Some(retries) = cli.retries {
        builder = builder.with_retries(retries)?;
    }
    if let Some(format) = cli.format {
        builder = builder.with_output_format(format.as_str())?;
    }
    builder = builder.with_verbose(cli.verbose);

    let config = match builder.build() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    let output_format = match config.output_format.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    let result = run(cli, &config, &output_format, &shutdown);

    if shutdown.requested() {
        if let Err(e) = result {
            tracing::debug!("Stopped by shutdown request: {:#}", e);
        }
        eprintln!("Interrupted");
        std::process::exit(EXIT_INTERRUPTED);
    }

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        if config.verbose {
            eprintln!("Error details: {:?}", e);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn run(cli: Cli, config: &CliConfig, format: &OutputFormat, shutdown: &Shutdown) -> Result<()> {
    // Commands that never touch the device
    match cli.command {
        Commands::Errors => return handle_errors(format),
        Commands::Registers => return handle_registers(format),
        Commands::Config => return handle_config(config, format),
        Commands::Completion { shell } => {
            generate_completion(shell);
            return Ok(());
        }
        Commands::Names { command } => {
            return handle_names(command, config, cli.config.as_deref(), format)
        }
        _ => {}
    }

    let fake = FakeDevice::from_args(cli.fake_dev.as_deref(), cli.fake_mini.as_deref())?;
    let mut session =
        Session::open_with_shutdown(&config.tban, fake.as_ref(), shutdown.clone())?;

    let result = match cli.command {
        Commands::Info => handle_info(&mut session, format),
        Commands::Status => handle_status(&mut session, format),
        Commands::Dump { variant, index } => handle_dump(&mut session, variant, index, format),
        Commands::Read { name, index } => handle_read(&mut session, &name, index, format),
        Commands::Channel { command } => handle_channel(&mut session, command, format),
        Commands::Sensors { command } => handle_sensors(&mut session, command, format),
        Commands::Watchdog { command } => handle_watchdog(&mut session, command, format),
        Commands::Big { command } => handle_big(&mut session, command, format),
        Commands::Mini { command } => handle_mini(&mut session, command, format),
        Commands::Monitor {
            iterations,
            interval,
        } => handle_monitor(&mut session, iterations, interval, format),
        command => handle_simple(&mut session, command),
    };

    // close even after a failure or a signal so the watchdog and lock are released
    let closed = session.close();
    result.and(closed)
}

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
