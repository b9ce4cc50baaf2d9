//! obsbot-ctl
//!
//! Command line control for OBSBOT webcams.
//!
//! # Usage
//!
//! ```bash
//! # List attached cameras
//! obsbot-ctl list
//!
//! # Switch the first camera to background mode and blur it
//! obsbot-ctl mode background
//! obsbot-ctl blur 60
//!
//! # Target a specific camera
//! obsbot-ctl --sn ABC123 hdr on
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use obsbot_ctl::{
    AntiFlicker, Config, Device, FramingType, Focus, ImageControl, MediaMode, ObsbotError,
    Registry, Switch, WhiteBalance,
};

/// Control OBSBOT webcams over USB
#[derive(Parser)]
#[command(name = "obsbot-ctl")]
#[command(version)]
#[command(about = "Control OBSBOT webcams (Meet, Tiny, Tail) over USB", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (default: $OBSBOT_CONFIG or ~/.config/obsbot-ctl/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial number of the camera to control (default: first found)
    #[arg(long, global = true)]
    sn: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached cameras
    #[command(alias = "ls")]
    List,

    /// Show identity and current settings
    Info,

    /// Show which controls the camera supports
    Caps,

    /// Get or set the media mode (normal, background, autoframe)
    Mode { value: Option<MediaMode> },

    /// Get or set the auto framing target (group, single)
    Framing { value: Option<FramingType> },

    /// Get or set HDR (on, off)
    Hdr { value: Option<Switch> },

    /// Set brightness (0-100)
    Brightness { value: i32 },

    /// Set contrast (0-100)
    Contrast { value: i32 },

    /// Set saturation (0-100)
    Saturation { value: i32 },

    /// Set hue in degrees (-180 to 180)
    #[command(allow_negative_numbers = true)]
    Hue { value: i32 },

    /// Set sharpness (0-100)
    Sharpness { value: i32 },

    /// Set white balance (auto, or 2000-10000 Kelvin)
    WhiteBalance { value: WhiteBalance },

    /// Set digital zoom ratio (1.0 and up)
    Zoom { ratio: f32 },

    /// Set focus (auto, or 0-100)
    Focus { value: Focus },

    /// Set anti-flicker (off, 50hz, 60hz, auto)
    AntiFlicker { value: AntiFlicker },

    /// Set background blur level (0-100, background mode only)
    Blur { level: i32 },

    /// Restore factory defaults
    Reset,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            init_logging(cli.verbose, None);
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(cli.verbose, config.logging.filter.as_deref());

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins, then `-v`, then the config file filter.
fn init_logging(verbose: u8, configured: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbose {
            0 => None,
            1 => Some(Level::INFO),
            2 => Some(Level::DEBUG),
            _ => Some(Level::TRACE),
        };
        match (level, configured) {
            (Some(level), _) => EnvFilter::new(format!("obsbot_ctl={}", level)),
            (None, Some(directive)) => EnvFilter::new(directive),
            (None, None) => EnvFilter::new("warn"),
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli, config: &Config) -> Result<(), ObsbotError> {
    let registry = Registry::from_config(config)?;

    if let Commands::List = cli.command {
        list(&registry);
        return Ok(());
    }

    // without --sn the first enumerated camera is used
    let handle = match &cli.sn {
        Some(serial) => registry.get_by_serial(serial),
        None => registry.get(0),
    }
    .ok_or(ObsbotError::DeviceNotFound)?;
    control(&registry, &registry.device(handle), &cli.command)
}

fn control(registry: &Registry, device: &Device<'_>, command: &Commands) -> Result<(), ObsbotError> {
    match command {
        Commands::List => list(registry),
        Commands::Info => info(device),
        Commands::Caps => {
            for capability in obsbot_ctl::Capability::ALL {
                let mark = if device.supports(capability) { "yes" } else { "no" };
                println!("{:<16} {}", capability.key(), mark);
            }
        }
        Commands::Mode { value: None } => println!("Media mode: {}", device.media_mode()?),
        Commands::Mode { value: Some(mode) } => {
            println!("Setting media mode to {}", mode);
            device.set_media_mode(*mode)?;
        }
        Commands::Framing { value: None } => println!("Framing: {}", device.auto_framing()?),
        Commands::Framing { value: Some(framing) } => {
            println!("Setting auto framing to {}", framing);
            device.set_auto_framing(*framing)?;
        }
        Commands::Hdr { value: None } => {
            println!("HDR: {}", if device.hdr()? { "On" } else { "Off" })
        }
        Commands::Hdr { value: Some(switch) } => {
            let on = bool::from(*switch);
            println!("Setting HDR {}", if on { "on" } else { "off" });
            device.set_hdr(on)?;
        }
        Commands::Brightness { value } => set_image(device, ImageControl::Brightness, *value)?,
        Commands::Contrast { value } => set_image(device, ImageControl::Contrast, *value)?,
        Commands::Saturation { value } => set_image(device, ImageControl::Saturation, *value)?,
        Commands::Hue { value } => set_image(device, ImageControl::Hue, *value)?,
        Commands::Sharpness { value } => set_image(device, ImageControl::Sharpness, *value)?,
        Commands::WhiteBalance { value } => {
            println!("Setting white balance to {}", value);
            device.set_white_balance(*value)?;
        }
        Commands::Zoom { ratio } => {
            println!("Setting zoom to {:.1}x", ratio);
            device.set_zoom(*ratio)?;
        }
        Commands::Focus { value } => {
            println!("Setting focus to {}", value);
            device.set_focus(*value)?;
        }
        Commands::AntiFlicker { value } => {
            println!("Setting anti-flicker to {}", value);
            device.set_anti_flicker(*value)?;
        }
        Commands::Blur { level } => {
            println!("Setting background blur to {}", level);
            device.set_background_blur(*level)?;
        }
        Commands::Reset => {
            println!("Restoring factory defaults on {}", device.serial());
            device.reset_to_defaults()?;
        }
    }

    Ok(())
}

fn list(registry: &Registry) {
    if registry.count() == 0 {
        println!("No OBSBOT devices found ({} backend).", registry.backend_name());
        return;
    }
    for (index, handle) in registry.handles().into_iter().enumerate() {
        let device = registry.device(handle);
        let state = if device.is_connected() { "ready" } else { "initializing" };
        println!(
            "[{}] {}  {}  firmware {}  ({})",
            index,
            device.serial(),
            device.model(),
            device.version(),
            state
        );
    }
}

fn info(device: &Device<'_>) {
    println!("Serial:   {}", device.serial());
    println!("Model:    {}", device.model());
    println!("Firmware: {}", device.version());
    if let Some(profile) = device.profile() {
        println!("Family:   {}", profile.display_name);
    }
    println!("Status:   {}", if device.is_connected() { "ready" } else { "initializing" });
    if let Some(status) = device.status() {
        println!();
        print!("{}", status);
    }
}

fn set_image(device: &Device<'_>, control: ImageControl, value: i32) -> Result<(), ObsbotError> {
    println!("Setting {} to {}", control, value);
    device.set_image(control, value)
}
