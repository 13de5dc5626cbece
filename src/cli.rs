use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::platform::PortKind;
use crate::sensor::DEFAULT_SENSOR;

#[derive(Parser)]
#[command(name = "ecfan")]
#[command(about = "Fan control through embedded controller registers")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Model configuration file (JSON)
    #[arg(short, long, global = true, default_value = "/etc/ecfan/model.json")]
    pub config: PathBuf,

    /// Register backend
    #[arg(long, value_enum, global = true, default_value = "ec-sys")]
    pub ec: PortKind,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the configuration and show each fan's ranges
    Check,

    /// Read and show the current speed of every fan
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Set a fixed speed or auto mode and write it once
    Set {
        /// Fan index (see 'check')
        fan: usize,

        /// Speed in percent (0 – 100), or 'auto' to follow the thresholds
        #[arg(allow_negative_numbers = true, value_parser = parse_speed_setting)]
        speed: SpeedSetting,

        /// Temperature file used in auto mode (millidegrees Celsius)
        #[arg(long, default_value = DEFAULT_SENSOR)]
        sensor: PathBuf,
    },

    /// Write the reset value of every fan that requires one
    Reset,

    /// Run the control loop
    Run {
        /// Temperature file in millidegrees Celsius
        #[arg(long, default_value = DEFAULT_SENSOR)]
        sensor: PathBuf,

        /// Only read fan speeds, never write
        #[arg(long)]
        read_only: bool,

        /// Fixed speed for a fan, as FAN=PERCENT (repeatable)
        #[arg(long, value_parser = parse_fixed_speed)]
        fixed: Vec<(usize, f32)>,
    },
}

/// Speed requested on the command line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpeedSetting {
    Auto,
    Fixed(f32),
}

fn parse_speed_setting(value: &str) -> Result<SpeedSetting, String> {
    if value.trim().eq_ignore_ascii_case("auto") {
        return Ok(SpeedSetting::Auto);
    }
    value
        .trim()
        .parse::<f32>()
        .map(SpeedSetting::Fixed)
        .map_err(|error| format!("expected a percentage or 'auto', got '{}': {}", value, error))
}

fn parse_fixed_speed(value: &str) -> Result<(usize, f32), String> {
    let (fan, speed) = value
        .split_once('=')
        .ok_or_else(|| format!("expected FAN=PERCENT, got '{}'", value))?;
    let fan = fan
        .trim()
        .parse::<usize>()
        .map_err(|error| format!("invalid fan index '{}': {}", fan, error))?;
    let speed = speed
        .trim()
        .parse::<f32>()
        .map_err(|error| format!("invalid speed '{}': {}", speed, error))?;
    Ok((fan, speed))
}
