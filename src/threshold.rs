//! Temperature threshold selection.
//!
//! Each threshold has an up and a down temperature. A threshold becomes active
//! once the temperature reaches its `up_threshold` and stays active until the
//! temperature drops below its `down_threshold`, so a fan does not flap
//! between two speeds around a single boundary.

use log::debug;

use crate::config::TemperatureThreshold;
use crate::errors::FanControlError;

/// Maps temperatures to threshold entries and remembers the last selection.
pub trait ThresholdSelector {
    /// Load a threshold table, discarding any previous selection.
    fn init(&mut self, thresholds: &[TemperatureThreshold]) -> Result<(), FanControlError>;

    /// Select the threshold for `temperature`, updating the current selection.
    fn select_for_temperature(&mut self, temperature: f32) -> Option<&TemperatureThreshold>;

    /// The most recently selected threshold, if any.
    fn current(&self) -> Option<&TemperatureThreshold>;
}

#[derive(Debug, Default)]
pub struct ThresholdManager {
    thresholds: Vec<TemperatureThreshold>,
    current: Option<usize>,
}

impl ThresholdManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn initial_index(&self, temperature: f32) -> usize {
        self.thresholds
            .iter()
            .rposition(|threshold| threshold.up_threshold <= temperature)
            .unwrap_or(0)
    }
}

impl ThresholdSelector for ThresholdManager {
    fn init(&mut self, thresholds: &[TemperatureThreshold]) -> Result<(), FanControlError> {
        if thresholds.is_empty() {
            return Err(FanControlError::Configuration(
                "threshold table must not be empty".into(),
            ));
        }

        let mut sorted = thresholds.to_vec();
        sorted.sort_by(|a, b| a.up_threshold.total_cmp(&b.up_threshold));
        self.thresholds = sorted;
        self.current = None;
        Ok(())
    }

    fn select_for_temperature(&mut self, temperature: f32) -> Option<&TemperatureThreshold> {
        if self.thresholds.is_empty() {
            return None;
        }

        let mut index = match self.current {
            None => self.initial_index(temperature),
            Some(index) => index,
        };

        while index + 1 < self.thresholds.len()
            && temperature >= self.thresholds[index + 1].up_threshold
        {
            index += 1;
        }
        while index > 0 && temperature < self.thresholds[index].down_threshold {
            index -= 1;
        }

        if self.current != Some(index) {
            debug!(
                "threshold {} selected at {:.1}°C (fan speed {:.1}%)",
                index, temperature, self.thresholds[index].fan_speed
            );
        }
        self.current = Some(index);
        self.thresholds.get(index)
    }

    fn current(&self) -> Option<&TemperatureThreshold> {
        self.current.and_then(|index| self.thresholds.get(index))
    }
}
