//! Control logic for a single EC-driven fan.
//!
//! A [`FanController`] keeps three views of one fan: the speed percentage the
//! user or the threshold table asks for, the raw register value written to
//! the embedded controller, and the percentage derived from what the EC
//! reports back. Critical temperature forces full speed on top of either
//! mode.

use std::fmt;
use std::rc::Rc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::{FanConfiguration, FanSpeedPercentageOverride, ModelConfig};
use crate::errors::FanControlError;
use crate::platform::RegisterPort;
use crate::threshold::{ThresholdManager, ThresholdSelector};

/// Percentages closer than this match a write override.
pub const OVERRIDE_PERCENTAGE_TOLERANCE: f32 = 0.06;

/// Reads attempted before an out-of-range value is accepted anyway.
const READ_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FanMode {
    /// Target speed follows the temperature thresholds.
    Auto,
    /// Target speed is the last requested fixed speed.
    Fixed,
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanMode::Auto => write!(f, "auto"),
            FanMode::Fixed => write!(f, "fixed"),
        }
    }
}

pub struct FanController<S: ThresholdSelector = ThresholdManager> {
    port: Rc<dyn RegisterPort>,
    thresholds: S,
    overrides: Vec<FanSpeedPercentageOverride>,

    read_register: u8,
    write_register: u8,
    read_write_words: bool,
    reset_required: bool,
    reset_value: i32,

    mode: FanMode,
    is_critical: bool,
    critical_temperature: f32,
    critical_temperature_offset: f32,

    min_speed_value_write: i32,
    max_speed_value_write: i32,
    min_speed_value_read: i32,
    max_speed_value_read: i32,
    min_speed_value_read_abs: i32,
    max_speed_value_read_abs: i32,
    fan_speed_steps: i32,

    target_fan_speed: f32,
    requested_speed: f32,
    current_speed: f32,
}

impl FanController<ThresholdManager> {
    /// Create a controller in auto mode using the default threshold manager.
    pub fn new(
        config: &FanConfiguration,
        model: &ModelConfig,
        port: Rc<dyn RegisterPort>,
    ) -> Result<Self, FanControlError> {
        Self::with_selector(config, model, port, ThresholdManager::new())
    }
}

impl<S: ThresholdSelector> FanController<S> {
    /// Create a controller in auto mode with a caller-supplied threshold selector.
    pub fn with_selector(
        config: &FanConfiguration,
        model: &ModelConfig,
        port: Rc<dyn RegisterPort>,
        mut thresholds: S,
    ) -> Result<Self, FanControlError> {
        if config.temperature_thresholds.is_empty() {
            return Err(FanControlError::Configuration(
                "fan has no temperature thresholds".into(),
            ));
        }

        let (min_read, max_read) = config.read_range();
        if min_read == max_read {
            return Err(FanControlError::Configuration(format!(
                "read range {}..{} is empty",
                min_read, max_read
            )));
        }
        let min_read_abs = min_read.min(max_read);
        let max_read_abs = min_read.max(max_read);

        thresholds.init(&config.temperature_thresholds)?;

        Ok(Self {
            port,
            thresholds,
            overrides: config.fan_speed_percentage_overrides.clone(),
            read_register: config.read_register,
            write_register: config.write_register,
            read_write_words: model.read_write_words,
            reset_required: config.reset_required,
            reset_value: config.fan_speed_reset_value,
            mode: FanMode::Auto,
            is_critical: false,
            critical_temperature: model.critical_temperature,
            critical_temperature_offset: model.critical_temperature_offset,
            min_speed_value_write: config.min_speed_value,
            max_speed_value_write: config.max_speed_value,
            min_speed_value_read: min_read,
            max_speed_value_read: max_read,
            min_speed_value_read_abs: min_read_abs,
            max_speed_value_read_abs: max_read_abs,
            fan_speed_steps: max_read_abs - min_read_abs,
            target_fan_speed: 0.0,
            requested_speed: 0.0,
            current_speed: 0.0,
        })
    }

    // -- conversion ---------------------------------------------------------

    fn override_by_value(&self, value: i32) -> Option<&FanSpeedPercentageOverride> {
        self.overrides
            .iter()
            .find(|o| o.target_operation.applies_to_read() && o.fan_speed_value == value)
    }

    fn override_by_percentage(&self, percentage: f32) -> Option<&FanSpeedPercentageOverride> {
        self.overrides.iter().find(|o| {
            o.target_operation.applies_to_write()
                && (o.fan_speed_percentage - percentage).abs() < OVERRIDE_PERCENTAGE_TOLERANCE
        })
    }

    /// Raw register value to write for a speed percentage.
    pub fn percentage_to_raw(&self, percentage: f32) -> i32 {
        let percentage = clamp_percentage(percentage);

        if let Some(entry) = self.override_by_percentage(percentage) {
            return entry.fan_speed_value;
        }

        let span = (self.max_speed_value_write - self.min_speed_value_write) as f32;
        (self.min_speed_value_write as f32 + span * percentage / 100.0).round() as i32
    }

    /// Speed percentage for a raw value read back from the EC.
    pub fn raw_to_percentage(&self, value: i32) -> f32 {
        if let Some(entry) = self.override_by_value(value) {
            return entry.fan_speed_percentage;
        }

        // The read range is never empty, see `with_selector`.
        (value - self.min_speed_value_read) as f32
            / (self.max_speed_value_read - self.min_speed_value_read) as f32
            * 100.0
    }

    // -- mode and target speed ----------------------------------------------

    /// Feed a temperature: updates critical state and, in auto mode, the target.
    pub fn set_temperature(&mut self, temperature: f32) {
        let was_critical = self.is_critical;
        if temperature > self.critical_temperature {
            self.is_critical = true;
        } else if temperature < self.critical_temperature - self.critical_temperature_offset {
            self.is_critical = false;
        }
        if self.is_critical != was_critical {
            if self.is_critical {
                warn!("critical temperature reached ({:.1}°C), forcing full speed", temperature);
            } else {
                info!("left critical mode at {:.1}°C", temperature);
            }
        }

        let threshold_speed = self
            .thresholds
            .select_for_temperature(temperature)
            .map(|threshold| threshold.fan_speed);
        if let (FanMode::Auto, Some(speed)) = (self.mode, threshold_speed) {
            self.target_fan_speed = speed;
        }
    }

    /// Switch to fixed mode at `speed`.
    ///
    /// Values outside 0–100 are clamped and applied, NaN becomes 0; the
    /// returned [`FanControlError::SpeedOutOfRange`] is only a warning.
    pub fn set_fixed_speed(&mut self, speed: f32) -> Result<(), FanControlError> {
        self.mode = FanMode::Fixed;

        let clamped = clamp_percentage(speed);
        let outcome = if clamped != speed {
            warn!("requested fan speed {} clamped to {}", speed, clamped);
            Err(FanControlError::SpeedOutOfRange(speed))
        } else {
            Ok(())
        };

        debug!("fixed speed {:.1}%", clamped);
        self.requested_speed = clamped;
        self.target_fan_speed = clamped;
        outcome
    }

    /// Switch to auto mode, adopting the current threshold if one is selected.
    pub fn set_auto_speed(&mut self) {
        self.mode = FanMode::Auto;
        if let Some(threshold) = self.thresholds.current() {
            self.target_fan_speed = threshold.fan_speed;
        }
        debug!("auto speed, target {:.1}%", self.target_fan_speed);
    }

    pub fn target_speed(&self) -> f32 {
        if self.is_critical {
            100.0
        } else {
            self.target_fan_speed
        }
    }

    pub fn requested_speed(&self) -> f32 {
        self.requested_speed
    }

    pub fn current_speed(&self) -> f32 {
        self.current_speed
    }

    pub fn speed_steps(&self) -> i32 {
        self.fan_speed_steps
    }

    pub fn mode(&self) -> FanMode {
        self.mode
    }

    pub fn is_critical(&self) -> bool {
        self.is_critical
    }

    // -- hardware -----------------------------------------------------------

    fn write_value(&self, value: i32) -> Result<(), FanControlError> {
        let register = self.write_register;
        let out_of_range = |_| FanControlError::ValueOutOfRange { register, value };
        if self.read_write_words {
            self.port.write_word(register, u16::try_from(value).map_err(out_of_range)?)
        } else {
            self.port.write_byte(register, u8::try_from(value).map_err(out_of_range)?)
        }
    }

    fn read_value(&self) -> Result<i32, FanControlError> {
        if self.read_write_words {
            self.port.read_word(self.read_register).map(i32::from)
        } else {
            self.port.read_byte(self.read_register).map(i32::from)
        }
    }

    /// Write the target speed to the EC.
    pub fn flush(&self) -> Result<(), FanControlError> {
        let speed = self.target_speed();
        let value = self.percentage_to_raw(speed);
        debug!("flush {:.1}% as {} to 0x{:02X}", speed, value, self.write_register);
        self.write_value(value)
    }

    /// Read the fan speed back from the EC.
    ///
    /// Out-of-range values are re-read; after three of them in a row the last
    /// one is used anyway, as the configured bounds are then likely wrong.
    /// The stored percentage is clamped to 0–100.
    pub fn refresh_current_speed(&mut self) -> Result<(), FanControlError> {
        let mut value = self.read_value()?;
        let mut attempt = 1;
        while !self.is_plausible(value) && attempt < READ_ATTEMPTS {
            debug!("discarding out-of-range read {} (attempt {})", value, attempt);
            value = self.read_value()?;
            attempt += 1;
        }
        if !self.is_plausible(value) {
            warn!(
                "fan speed value {} outside {}..={} after {} reads",
                value, self.min_speed_value_read_abs, self.max_speed_value_read_abs, READ_ATTEMPTS
            );
        }

        self.current_speed = clamp_percentage(self.raw_to_percentage(value));
        Ok(())
    }

    fn is_plausible(&self, value: i32) -> bool {
        (self.min_speed_value_read_abs..=self.max_speed_value_read_abs).contains(&value)
    }

    /// Write the configured reset value, if this fan needs one.
    pub fn reset(&self) -> Result<(), FanControlError> {
        if self.reset_required {
            debug!("reset 0x{:02X} to {}", self.write_register, self.reset_value);
            self.write_value(self.reset_value)
        } else {
            Ok(())
        }
    }

    /// Snapshot of this fan's state for display.
    pub fn status(&self, name: &str) -> FanStatus {
        FanStatus {
            name: name.to_string(),
            mode: self.mode(),
            critical: self.is_critical(),
            target_speed: self.target_speed(),
            requested_speed: self.requested_speed(),
            current_speed: self.current_speed(),
            speed_steps: self.speed_steps(),
        }
    }
}

/// Clamp to 0–100, mapping NaN to 0.
fn clamp_percentage(percentage: f32) -> f32 {
    if percentage.is_nan() {
        0.0
    } else {
        percentage.clamp(0.0, 100.0)
    }
}

/// State of one fan as shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct FanStatus {
    pub name: String,
    pub mode: FanMode,
    pub critical: bool,
    pub target_speed: f32,
    pub requested_speed: f32,
    pub current_speed: f32,
    pub speed_steps: i32,
}

impl fmt::Display for FanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.1}% (target {:.1}%) [{}{}]",
            self.name,
            self.current_speed,
            self.target_speed,
            self.mode,
            if self.critical { ", critical" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use crate::config::{OverrideTargetOperation, TemperatureThreshold};

    /// Register port returning scripted reads and recording writes.
    ///
    /// A `None` read simulates a transport failure.
    #[derive(Default)]
    struct ScriptedPort {
        reads: RefCell<VecDeque<Option<u16>>>,
        read_count: RefCell<usize>,
        writes: RefCell<Vec<(u8, u16, bool)>>,
    }

    impl ScriptedPort {
        fn with_reads(reads: &[Option<u16>]) -> Rc<Self> {
            Rc::new(Self {
                reads: RefCell::new(reads.iter().copied().collect()),
                ..Self::default()
            })
        }

        fn next_read(&self) -> Result<u16, FanControlError> {
            *self.read_count.borrow_mut() += 1;
            match self.reads.borrow_mut().pop_front() {
                Some(Some(value)) => Ok(value),
                _ => Err(FanControlError::Platform("scripted read failure".into())),
            }
        }

        fn writes(&self) -> Vec<(u8, u16, bool)> {
            self.writes.borrow().clone()
        }
    }

    impl RegisterPort for ScriptedPort {
        fn read_byte(&self, _register: u8) -> Result<u8, FanControlError> {
            self.next_read().map(|value| value as u8)
        }

        fn read_word(&self, _register: u8) -> Result<u16, FanControlError> {
            self.next_read()
        }

        fn write_byte(&self, register: u8, value: u8) -> Result<(), FanControlError> {
            self.writes.borrow_mut().push((register, value as u16, false));
            Ok(())
        }

        fn write_word(&self, register: u8, value: u16) -> Result<(), FanControlError> {
            self.writes.borrow_mut().push((register, value, true));
            Ok(())
        }
    }

    /// Selector that never selects anything.
    struct NoThresholds;

    impl ThresholdSelector for NoThresholds {
        fn init(&mut self, _thresholds: &[TemperatureThreshold]) -> Result<(), FanControlError> {
            Ok(())
        }

        fn select_for_temperature(&mut self, _temperature: f32) -> Option<&TemperatureThreshold> {
            None
        }

        fn current(&self) -> Option<&TemperatureThreshold> {
            None
        }
    }

    fn fan_config(min: i32, max: i32) -> FanConfiguration {
        FanConfiguration {
            fan_display_name: None,
            read_register: 0x2E,
            write_register: 0x2F,
            min_speed_value: min,
            max_speed_value: max,
            independent_read_min_max_values: false,
            min_speed_value_read: 0,
            max_speed_value_read: 0,
            reset_required: false,
            fan_speed_reset_value: 0,
            temperature_thresholds: vec![
                TemperatureThreshold {
                    up_threshold: 0.0,
                    down_threshold: 0.0,
                    fan_speed: 10.0,
                },
                TemperatureThreshold {
                    up_threshold: 50.0,
                    down_threshold: 40.0,
                    fan_speed: 60.0,
                },
            ],
            fan_speed_percentage_overrides: Vec::new(),
        }
    }

    fn model(read_write_words: bool) -> ModelConfig {
        ModelConfig {
            notebook_model: "test".into(),
            ec_poll_interval: 1000,
            read_write_words,
            critical_temperature: 80.0,
            critical_temperature_offset: 10.0,
            fan_configurations: Vec::new(),
        }
    }

    fn controller(config: &FanConfiguration, port: Rc<ScriptedPort>) -> FanController {
        FanController::new(config, &model(false), port).unwrap()
    }

    fn idle_port() -> Rc<ScriptedPort> {
        ScriptedPort::with_reads(&[])
    }

    // -- initialization -----------------------------------------------------

    #[test]
    fn starts_in_auto_mode() {
        let fan = controller(&fan_config(0, 255), idle_port());
        assert_eq!(fan.mode(), FanMode::Auto);
        assert!(!fan.is_critical());
        assert_eq!(fan.target_speed(), 0.0);
        assert_eq!(fan.speed_steps(), 255);
    }

    #[test]
    fn empty_threshold_table_is_rejected() {
        let mut config = fan_config(0, 255);
        config.temperature_thresholds.clear();
        let result = FanController::new(&config, &model(false), idle_port());
        assert!(matches!(result, Err(FanControlError::Configuration(_))));
    }

    #[test]
    fn empty_read_range_is_rejected() {
        let mut config = fan_config(0, 255);
        config.independent_read_min_max_values = true;
        config.min_speed_value_read = 7;
        config.max_speed_value_read = 7;
        let result = FanController::new(&config, &model(false), idle_port());
        assert!(matches!(result, Err(FanControlError::Configuration(_))));
    }

    #[test]
    fn independent_read_bounds_are_normalized() {
        let mut config = fan_config(0, 255);
        config.independent_read_min_max_values = true;
        config.min_speed_value_read = 200;
        config.max_speed_value_read = 50;
        let fan = controller(&config, idle_port());

        assert_eq!(fan.speed_steps(), 150);
        // Still converted along the configured direction.
        assert_eq!(fan.raw_to_percentage(200), 0.0);
        assert_eq!(fan.raw_to_percentage(50), 100.0);
        assert_eq!(fan.raw_to_percentage(125), 50.0);
    }

    #[test]
    fn inverted_write_bounds() {
        let fan = controller(&fan_config(255, 0), idle_port());
        assert_eq!(fan.percentage_to_raw(0.0), 255);
        assert_eq!(fan.percentage_to_raw(100.0), 0);
        assert_eq!(fan.speed_steps(), 255);
    }

    // -- conversion ---------------------------------------------------------

    #[test]
    fn percentage_to_raw_clamps_and_rounds() {
        let fan = controller(&fan_config(0, 255), idle_port());
        assert_eq!(fan.percentage_to_raw(-5.0), 0);
        assert_eq!(fan.percentage_to_raw(150.0), 255);
        assert_eq!(fan.percentage_to_raw(50.0), 128); // 127.5 rounds away from zero
        assert_eq!(fan.percentage_to_raw(10.0), 26); // 25.5
    }

    #[test]
    fn percentage_to_raw_is_monotonic() {
        let fan = controller(&fan_config(30, 200), idle_port());
        let mut previous = fan.percentage_to_raw(0.0);
        for step in 1..=1000 {
            let value = fan.percentage_to_raw(step as f32 / 10.0);
            assert!(value >= previous, "{} < {} at {}", value, previous, step);
            previous = value;
        }
    }

    #[test]
    fn round_trip_within_one_step() {
        let fan = controller(&fan_config(0, 255), idle_port());
        let tolerance = 100.0 / fan.speed_steps() as f32;
        for step in 0..=200 {
            let percentage = step as f32 / 2.0;
            let back = fan.raw_to_percentage(fan.percentage_to_raw(percentage));
            assert!(
                (back - percentage).abs() <= tolerance,
                "{} -> {}",
                percentage,
                back
            );
        }
    }

    #[test]
    fn write_override_matches_within_tolerance() {
        let mut config = fan_config(0, 255);
        config.fan_speed_percentage_overrides.push(FanSpeedPercentageOverride {
            fan_speed_percentage: 42.0,
            fan_speed_value: 5,
            target_operation: OverrideTargetOperation::Write,
        });
        let fan = controller(&config, idle_port());

        assert_eq!(fan.percentage_to_raw(42.0), 5);
        assert_eq!(fan.percentage_to_raw(42.05), 5);
        assert_eq!(fan.percentage_to_raw(42.1), 107);
        // Write-only overrides do not affect reads.
        assert_ne!(fan.raw_to_percentage(5), 42.0);
    }

    #[test]
    fn write_override_applies_after_clamping() {
        let mut config = fan_config(0, 255);
        config.fan_speed_percentage_overrides.push(FanSpeedPercentageOverride {
            fan_speed_percentage: 100.0,
            fan_speed_value: 250,
            target_operation: OverrideTargetOperation::ReadWrite,
        });
        let fan = controller(&config, idle_port());
        assert_eq!(fan.percentage_to_raw(130.0), 250);
    }

    #[test]
    fn read_override_matches_exact_value() {
        let mut config = fan_config(0, 255);
        config.fan_speed_percentage_overrides.push(FanSpeedPercentageOverride {
            fan_speed_percentage: 0.0,
            fan_speed_value: 255,
            target_operation: OverrideTargetOperation::Read,
        });
        let fan = controller(&config, idle_port());

        assert_eq!(fan.raw_to_percentage(255), 0.0);
        assert!((fan.raw_to_percentage(254) - 99.607_84).abs() < 0.001);
        // Read-only overrides do not affect writes.
        assert_eq!(fan.percentage_to_raw(0.0), 0);
    }

    #[test]
    fn first_matching_override_wins() {
        let mut config = fan_config(0, 255);
        config.fan_speed_percentage_overrides = vec![
            FanSpeedPercentageOverride {
                fan_speed_percentage: 20.0,
                fan_speed_value: 11,
                target_operation: OverrideTargetOperation::Write,
            },
            FanSpeedPercentageOverride {
                fan_speed_percentage: 20.02,
                fan_speed_value: 22,
                target_operation: OverrideTargetOperation::Write,
            },
        ];
        let fan = controller(&config, idle_port());
        assert_eq!(fan.percentage_to_raw(20.01), 11);
    }

    // -- mode and critical state --------------------------------------------

    #[test]
    fn critical_hysteresis() {
        let mut fan = controller(&fan_config(0, 255), idle_port());

        fan.set_temperature(81.0);
        assert!(fan.is_critical());
        fan.set_temperature(75.0);
        assert!(fan.is_critical(), "dead band keeps critical state");
        fan.set_temperature(80.0);
        assert!(fan.is_critical());
        fan.set_temperature(69.0);
        assert!(!fan.is_critical());
        fan.set_temperature(75.0);
        assert!(!fan.is_critical(), "dead band keeps normal state");
        fan.set_temperature(70.0);
        assert!(!fan.is_critical());
    }

    #[test]
    fn critical_boundaries_are_exclusive() {
        let mut fan = controller(&fan_config(0, 255), idle_port());

        // Exactly the critical temperature does not enter critical mode.
        fan.set_temperature(80.0);
        assert!(!fan.is_critical());

        fan.set_temperature(80.5);
        assert!(fan.is_critical());
        // Exactly critical minus offset does not leave it.
        fan.set_temperature(70.0);
        assert!(fan.is_critical());
        fan.set_temperature(69.9);
        assert!(!fan.is_critical());
    }

    #[test]
    fn critical_forces_full_speed_in_both_modes() {
        let mut fan = controller(&fan_config(0, 255), idle_port());
        fan.set_temperature(90.0);
        assert_eq!(fan.target_speed(), 100.0);

        fan.set_fixed_speed(20.0).unwrap();
        assert_eq!(fan.target_speed(), 100.0);
        assert_eq!(fan.requested_speed(), 20.0);

        fan.set_temperature(60.0);
        assert_eq!(fan.target_speed(), 20.0);
    }

    #[test]
    fn auto_mode_follows_thresholds() {
        let mut fan = controller(&fan_config(0, 255), idle_port());
        fan.set_temperature(30.0);
        assert_eq!(fan.target_speed(), 10.0);
        fan.set_temperature(55.0);
        assert_eq!(fan.target_speed(), 60.0);
    }

    #[test]
    fn fixed_mode_ignores_thresholds() {
        let mut fan = controller(&fan_config(0, 255), idle_port());
        fan.set_fixed_speed(35.0).unwrap();
        fan.set_temperature(55.0);
        assert_eq!(fan.mode(), FanMode::Fixed);
        assert_eq!(fan.target_speed(), 35.0);
    }

    #[test]
    fn fixed_speed_out_of_range_is_clamped_with_warning() {
        let mut fan = controller(&fan_config(0, 255), idle_port());

        let result = fan.set_fixed_speed(150.0);
        assert!(matches!(result, Err(FanControlError::SpeedOutOfRange(_))));
        assert!(result.unwrap_err().is_warning());
        assert_eq!(fan.target_speed(), 100.0);
        assert_eq!(fan.requested_speed(), 100.0);

        let result = fan.set_fixed_speed(-10.0);
        assert!(matches!(result, Err(FanControlError::SpeedOutOfRange(_))));
        assert_eq!(fan.target_speed(), 0.0);
        assert_eq!(fan.requested_speed(), 0.0);
    }

    #[test]
    fn fixed_speed_nan_becomes_zero_with_warning() {
        let port = idle_port();
        let mut fan = controller(&fan_config(30, 200), port.clone());

        let result = fan.set_fixed_speed(f32::NAN);
        assert!(matches!(result, Err(FanControlError::SpeedOutOfRange(_))));
        assert_eq!(fan.requested_speed(), 0.0);
        assert_eq!(fan.target_speed(), 0.0);

        fan.flush().unwrap();
        assert_eq!(port.writes(), vec![(0x2F, 30, false)]);
    }

    #[test]
    fn percentage_to_raw_treats_nan_as_zero() {
        let fan = controller(&fan_config(30, 200), idle_port());
        assert_eq!(fan.percentage_to_raw(f32::NAN), 30);
    }

    #[test]
    fn auto_adopts_threshold_selected_in_fixed_mode() {
        let mut fan = controller(&fan_config(0, 255), idle_port());
        fan.set_fixed_speed(35.0).unwrap();
        fan.set_temperature(55.0);

        fan.set_auto_speed();
        assert_eq!(fan.mode(), FanMode::Auto);
        assert_eq!(fan.target_speed(), 60.0);
        assert_eq!(fan.requested_speed(), 35.0);
    }

    #[test]
    fn auto_without_selection_keeps_target() {
        let mut fan = controller(&fan_config(0, 255), idle_port());
        fan.set_fixed_speed(35.0).unwrap();
        fan.set_auto_speed();
        assert_eq!(fan.target_speed(), 35.0);
    }

    #[test]
    fn selector_without_result_leaves_target() {
        let config = fan_config(0, 255);
        let mut fan =
            FanController::with_selector(&config, &model(false), idle_port(), NoThresholds)
                .unwrap();
        fan.set_temperature(55.0);
        assert_eq!(fan.target_speed(), 0.0);
    }

    // -- hardware -----------------------------------------------------------

    #[test]
    fn flush_writes_target_byte() {
        let port = idle_port();
        let mut fan = controller(&fan_config(0, 255), port.clone());
        fan.set_fixed_speed(100.0).unwrap();
        fan.flush().unwrap();
        assert_eq!(port.writes(), vec![(0x2F, 255, false)]);
    }

    #[test]
    fn flush_uses_words_when_configured() {
        let port = idle_port();
        let mut fan = FanController::new(&fan_config(0, 1000), &model(true), port.clone()).unwrap();
        fan.set_fixed_speed(50.0).unwrap();
        fan.flush().unwrap();
        assert_eq!(port.writes(), vec![(0x2F, 500, true)]);
    }

    #[test]
    fn flush_rejects_value_wider_than_register() {
        let mut fan = controller(&fan_config(0, 4800), idle_port());
        fan.set_fixed_speed(100.0).unwrap();
        assert!(matches!(
            fan.flush(),
            Err(FanControlError::ValueOutOfRange { register: 0x2F, value: 4800 })
        ));
    }

    #[test]
    fn flush_while_critical_writes_full_speed() {
        let port = idle_port();
        let mut fan = controller(&fan_config(0, 255), port.clone());
        fan.set_fixed_speed(0.0).unwrap();
        fan.set_temperature(85.0);
        fan.flush().unwrap();
        assert_eq!(port.writes(), vec![(0x2F, 255, false)]);
    }

    #[test]
    fn refresh_takes_first_in_range_read() {
        let port = ScriptedPort::with_reads(&[Some(9999), Some(9999), Some(50), Some(70)]);
        let mut fan =
            FanController::new(&fan_config(0, 100), &model(true), port.clone()).unwrap();
        fan.refresh_current_speed().unwrap();
        assert_eq!(fan.current_speed(), 50.0);
        assert_eq!(*port.read_count.borrow(), 3);
    }

    #[test]
    fn refresh_stops_at_first_plausible_read() {
        let port = ScriptedPort::with_reads(&[Some(20), Some(90)]);
        let mut fan = controller(&fan_config(0, 100), port.clone());
        fan.refresh_current_speed().unwrap();
        assert_eq!(fan.current_speed(), 20.0);
        assert_eq!(*port.read_count.borrow(), 1);
    }

    #[test]
    fn refresh_accepts_last_read_when_all_out_of_range() {
        let mut config = fan_config(0, 255);
        config.independent_read_min_max_values = true;
        config.min_speed_value_read = 0;
        config.max_speed_value_read = 100;
        let port = ScriptedPort::with_reads(&[Some(200), Some(180), Some(150), Some(10)]);
        let mut fan = controller(&config, port.clone());

        fan.refresh_current_speed().unwrap();
        assert_eq!(fan.current_speed(), 100.0);
        assert_eq!(*port.read_count.borrow(), 3);
    }

    #[test]
    fn refresh_uses_read_override_of_last_value() {
        let mut config = fan_config(0, 100);
        config.fan_speed_percentage_overrides.push(FanSpeedPercentageOverride {
            fan_speed_percentage: 12.5,
            fan_speed_value: 140,
            target_operation: OverrideTargetOperation::Read,
        });
        let port = ScriptedPort::with_reads(&[Some(130), Some(120), Some(140)]);
        let mut fan = controller(&config, port);
        fan.refresh_current_speed().unwrap();
        assert_eq!(fan.current_speed(), 12.5);
    }

    #[test]
    fn refresh_aborts_on_transport_error() {
        let port = ScriptedPort::with_reads(&[Some(200), None, Some(50)]);
        let mut fan = controller(&fan_config(0, 100), port.clone());
        let result = fan.refresh_current_speed();
        assert!(matches!(result, Err(FanControlError::Platform(_))));
        assert_eq!(*port.read_count.borrow(), 2);
        assert_eq!(fan.current_speed(), 0.0);
    }

    #[test]
    fn reset_writes_reset_value_when_required() {
        let mut config = fan_config(0, 255);
        config.reset_required = true;
        config.fan_speed_reset_value = 128;
        let port = idle_port();
        let fan = controller(&config, port.clone());
        fan.reset().unwrap();
        assert_eq!(port.writes(), vec![(0x2F, 128, false)]);
    }

    #[test]
    fn reset_is_noop_when_not_required() {
        let port = idle_port();
        let fan = controller(&fan_config(0, 255), port.clone());
        fan.reset().unwrap();
        assert!(port.writes().is_empty());
    }

    #[test]
    fn status_reflects_state() {
        let mut fan = controller(&fan_config(0, 255), idle_port());
        fan.set_fixed_speed(40.0).unwrap();
        let status = fan.status("CPU fan");
        assert_eq!(status.name, "CPU fan");
        assert_eq!(status.mode, FanMode::Fixed);
        assert_eq!(status.target_speed, 40.0);
        assert_eq!(status.to_string(), "CPU fan: 0.0% (target 40.0%) [fixed]");
    }
}
