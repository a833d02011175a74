//! pinmux CLI: inspect and edit the pin multiplexing of a device description.

mod commands;
mod device;
mod settings_file;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use device::DeviceDescription;

#[derive(Parser)]
#[command(name = "pinmux", version, about = "Pin multiplexing and device configuration editor")]
struct Cli {
    /// Device description (TOML)
    #[arg(short, long, global = true, default_value = "device.toml")]
    device: PathBuf,
    /// Saved settings to start from; created by --save if missing
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,
    /// Write the settings file after the command
    #[arg(long, global = true, requires = "settings")]
    save: bool,
    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List pins with their current and available settings
    Pins,
    /// List signals by peripheral with the pin each is mapped to
    Signals,
    /// Map a signal to a pin
    Map {
        /// Signal name, e.g. FTM0_CH0
        signal: String,
        /// Pin name, e.g. PTA3
        pin: String,
    },
    /// Release a signal from its pin
    Release {
        /// Signal name
        signal: String,
    },
    /// Set a pin's multiplexer setting
    Select {
        /// Pin name
        pin: String,
        /// Setting: mux0..mux7, disabled, reset or unassigned
        mux: String,
    },
    /// Show a variable
    Get {
        /// Variable key, e.g. /FTM0/period
        key: String,
    },
    /// Set a variable from text
    Set {
        /// Variable key
        key: String,
        /// New value
        value: String,
    },
    /// Show the code-generation text of a variable
    Subst {
        /// Variable key
        key: String,
    },
    /// Check for mapping conflicts and invalid values
    Check,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let description = DeviceDescription::load(&cli.device)?;
    let saved = match &cli.settings {
        Some(path) if path.exists() => Some(settings_file::read(path)?),
        _ => None,
    };
    let (mut session, failures) = description.open(saved.as_ref())?;
    for failure in failures {
        tracing::warn!(error = %failure, "saved setting not restored");
    }

    let output = match cli.command {
        Commands::Pins => commands::inspect::pins(&session),
        Commands::Signals => commands::inspect::signals(&session),
        Commands::Map { signal, pin } => commands::edit::map(&mut session, &signal, &pin)?,
        Commands::Release { signal } => commands::edit::release(&mut session, &signal)?,
        Commands::Select { pin, mux } => commands::edit::select(&mut session, &pin, &mux)?,
        Commands::Get { key } => commands::inspect::get(&session, &key)?,
        Commands::Set { key, value } => commands::edit::set(&mut session, &key, &value)?,
        Commands::Subst { key } => commands::inspect::subst(&session, &key)?,
        Commands::Check => commands::check::run(&mut session)?,
    };
    println!("{}", output.trim_end());

    if cli.save {
        if let Some(path) = &cli.settings {
            settings_file::write(path, &session.save_settings())?;
        }
    }
    Ok(())
}
