//! Drives every fan of a model from one control loop.

use std::rc::Rc;
use std::time::Duration;

use log::{debug, error, info};

use crate::config::ModelConfig;
use crate::errors::FanControlError;
use crate::fan::{FanController, FanStatus};
use crate::platform::RegisterPort;

struct ManagedFan {
    name: String,
    controller: FanController,
}

pub struct Service {
    fans: Vec<ManagedFan>,
    poll_interval: Duration,
    read_only: bool,
}

impl Service {
    /// Build one controller per configured fan, all sharing `port`.
    pub fn new(model: &ModelConfig, port: Rc<dyn RegisterPort>) -> Result<Self, FanControlError> {
        let mut fans = Vec::with_capacity(model.fan_configurations.len());
        for (index, config) in model.fan_configurations.iter().enumerate() {
            let name = config.display_name(index);
            let controller = FanController::new(config, model, Rc::clone(&port)).map_err(
                |error| match error {
                    FanControlError::Configuration(message) => {
                        FanControlError::Configuration(format!("{}: {}", name, message))
                    }
                    other => other,
                },
            )?;
            fans.push(ManagedFan { name, controller });
        }

        info!(
            "service for '{}' with {} fan(s)",
            model.notebook_model,
            fans.len()
        );
        Ok(Self {
            fans,
            poll_interval: Duration::from_millis(model.ec_poll_interval),
            read_only: false,
        })
    }

    /// In read-only mode `tick` never writes to the EC.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn fan_count(&self) -> usize {
        self.fans.len()
    }

    fn fan_mut(&mut self, index: usize) -> Result<&mut ManagedFan, FanControlError> {
        self.fans
            .get_mut(index)
            .ok_or(FanControlError::FanNotFound(index))
    }

    /// Put a fan into fixed mode. A clamped speed is reported as a warning.
    pub fn set_fixed_speed(&mut self, index: usize, speed: f32) -> Result<(), FanControlError> {
        let fan = self.fan_mut(index)?;
        info!("{}: fixed speed {}%", fan.name, speed);
        fan.controller.set_fixed_speed(speed)
    }

    pub fn set_auto_speed(&mut self, index: usize) -> Result<(), FanControlError> {
        let fan = self.fan_mut(index)?;
        info!("{}: auto speed", fan.name);
        fan.controller.set_auto_speed();
        Ok(())
    }

    /// Feed a temperature to every fan without touching the EC.
    pub fn set_temperature(&mut self, temperature: f32) {
        for fan in &mut self.fans {
            fan.controller.set_temperature(temperature);
        }
    }

    /// Write one fan's target speed to the EC.
    pub fn flush_fan(&mut self, index: usize) -> Result<(), FanControlError> {
        let fan = self.fan_mut(index)?;
        fan.controller.flush()
    }

    /// One control cycle: update temperature, write targets, read speeds back.
    ///
    /// Every fan is attempted; the first error encountered is returned.
    pub fn tick(&mut self, temperature: f32) -> Result<(), FanControlError> {
        debug!("tick at {:.1}°C", temperature);
        let read_only = self.read_only;
        let mut outcome = Ok(());
        for fan in &mut self.fans {
            fan.controller.set_temperature(temperature);
            if !read_only {
                outcome = outcome.and(log_failure(&fan.name, "flush", fan.controller.flush()));
            }
            outcome = outcome.and(log_failure(
                &fan.name,
                "refresh",
                fan.controller.refresh_current_speed(),
            ));
        }
        outcome
    }

    /// Read every fan's current speed from the EC.
    pub fn refresh(&mut self) -> Result<(), FanControlError> {
        let mut outcome = Ok(());
        for fan in &mut self.fans {
            outcome = outcome.and(log_failure(
                &fan.name,
                "refresh",
                fan.controller.refresh_current_speed(),
            ));
        }
        outcome
    }

    /// Write the reset value of every fan that needs one.
    pub fn reset(&mut self) -> Result<(), FanControlError> {
        let mut outcome = Ok(());
        for fan in &self.fans {
            outcome = outcome.and(log_failure(&fan.name, "reset", fan.controller.reset()));
        }
        outcome
    }

    pub fn status(&self) -> Vec<FanStatus> {
        self.fans
            .iter()
            .map(|fan| fan.controller.status(&fan.name))
            .collect()
    }
}

fn log_failure(
    name: &str,
    action: &str,
    result: Result<(), FanControlError>,
) -> Result<(), FanControlError> {
    if let Err(ref error) = result {
        error!("{}: {} failed: {}", name, action, error);
    }
    result
}
