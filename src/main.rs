mod cli;
mod config;
mod errors;
mod fan;
mod platform;
mod sensor;
mod service;
mod threshold;

use std::fs::File;
use std::path::Path;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

use cli::{Cli, Commands, SpeedSetting};
use config::ModelConfig;
use errors::FanControlError;
use platform::create_port;
use service::Service;

fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log to ecfan.log next to the executable.
    let log_path = std::env::current_exe()
        .unwrap_or_default()
        .parent()
        .unwrap_or(Path::new("."))
        .join("ecfan.log");
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let log_level = level_from_verbosity(cli.verbose);
    if let Ok(file) = File::create(&log_path) {
        let _ = WriteLogger::init(log_level, log_config, file);
    }
    info!("ecfan started (log level: {})", log_level);

    let model = ModelConfig::load(&cli.config)
        .with_context(|| format!("cannot use model configuration {}", cli.config.display()))?;

    if let Commands::Check = cli.command {
        return cmd_check(&model);
    }

    let port = create_port(cli.ec)?;
    let mut service = Service::new(&model, port)?;

    match cli.command {
        Commands::Status { json } => cmd_status(&mut service, json),
        Commands::Set { fan, speed, sensor } => cmd_set(&mut service, fan, speed, &sensor),
        Commands::Reset => cmd_reset(&mut service),
        Commands::Run {
            sensor,
            read_only,
            fixed,
        } => cmd_run(&mut service, &sensor, read_only, &fixed),
        Commands::Check => unreachable!(),
    }
}

fn cmd_check(model: &ModelConfig) -> Result<()> {
    println!(
        "{} — {} fan(s), critical at {}°C (-{}°C), {} registers",
        if model.notebook_model.is_empty() {
            "unnamed model"
        } else {
            model.notebook_model.as_str()
        },
        model.fan_configurations.len(),
        model.critical_temperature,
        model.critical_temperature_offset,
        if model.read_write_words { "word" } else { "byte" }
    );
    println!(
        "{:<4} {:<20} {:>6} {:>6} {:>13} {:>13} {:>6}",
        "#", "NAME", "READ", "WRITE", "WRITE RANGE", "READ RANGE", "STEPS"
    );
    println!("{}", "-".repeat(75));
    for (index, fan) in model.fan_configurations.iter().enumerate() {
        let (min_read, max_read) = fan.read_range();
        println!(
            "{:<4} {:<20} {:>#6x} {:>#6x} {:>13} {:>13} {:>6}",
            index,
            fan.display_name(index),
            fan.read_register,
            fan.write_register,
            format!("{}..{}", fan.min_speed_value, fan.max_speed_value),
            format!("{}..{}", min_read, max_read),
            (max_read - min_read).abs()
        );
    }
    Ok(())
}

fn cmd_status(service: &mut Service, json: bool) -> Result<()> {
    service.refresh()?;
    let status = service.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!(
        "{:<20} {:>8} {:>8} {:>7} STATUS",
        "FAN", "CURRENT", "TARGET", "STEPS"
    );
    println!("{}", "-".repeat(60));
    for fan in &status {
        println!(
            "{:<20} {:>7.1}% {:>7.1}% {:>7} {}{}",
            fan.name,
            fan.current_speed,
            fan.target_speed,
            fan.speed_steps,
            fan.mode,
            if fan.critical { " (critical)" } else { "" }
        );
    }
    Ok(())
}

fn cmd_set(
    service: &mut Service,
    fan: usize,
    speed: SpeedSetting,
    sensor_path: &Path,
) -> Result<()> {
    match speed {
        SpeedSetting::Fixed(speed) => {
            apply_fixed_speed(service, fan, speed)?;
            service.flush_fan(fan)?;
            let applied = service.status()[fan].requested_speed;
            println!("Set fan {} to {}%", fan, applied);
        }
        SpeedSetting::Auto => {
            service
                .set_auto_speed(fan)
                .with_context(|| format!("model has {} fan(s)", service.fan_count()))?;
            let temperature = sensor::read_temperature(sensor_path)
                .with_context(|| format!("cannot read {}", sensor_path.display()))?;
            service.set_temperature(temperature);
            service.flush_fan(fan)?;
            let target = service.status()[fan].target_speed;
            println!("Set fan {} to auto ({}% at {:.1}°C)", fan, target, temperature);
        }
    }
    Ok(())
}

fn cmd_reset(service: &mut Service) -> Result<()> {
    service.reset()?;
    println!("Reset {} fan(s)", service.fan_count());
    Ok(())
}

fn cmd_run(
    service: &mut Service,
    sensor_path: &Path,
    read_only: bool,
    fixed: &[(usize, f32)],
) -> Result<()> {
    service.set_read_only(read_only);
    for fan in 0..service.fan_count() {
        if !fixed.iter().any(|&(fixed_fan, _)| fixed_fan == fan) {
            service.set_auto_speed(fan)?;
        }
    }
    for &(fan, speed) in fixed {
        apply_fixed_speed(service, fan, speed)?;
    }

    let interval = service.poll_interval();
    info!(
        "control loop every {} ms, temperature from {}",
        interval.as_millis(),
        sensor_path.display()
    );
    println!("Controlling fans (Ctrl+C to stop)...");

    loop {
        match sensor::read_temperature(sensor_path) {
            Ok(temperature) => {
                // Failures are logged per fan; keep the loop alive.
                let _ = service.tick(temperature);
            }
            Err(error) => error!("cannot read temperature: {}", error),
        }
        thread::sleep(interval);
    }
}

/// Apply a fixed speed, reporting a clamped value without failing.
fn apply_fixed_speed(service: &mut Service, fan: usize, speed: f32) -> Result<()> {
    match service.set_fixed_speed(fan, speed) {
        Err(error) if error.is_warning() => {
            warn!("fan {}: {}", fan, error);
            eprintln!("warning: {}", error);
            Ok(())
        }
        Err(FanControlError::FanNotFound(index)) => Err(FanControlError::FanNotFound(index))
            .with_context(|| format!("model has {} fan(s)", service.fan_count())),
        other => Ok(other?),
    }
}
