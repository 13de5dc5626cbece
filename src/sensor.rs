use std::fs;
use std::path::Path;

use crate::errors::FanControlError;
use crate::platform::map_io_error;

pub const DEFAULT_SENSOR: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Read a sysfs temperature file holding millidegrees Celsius.
pub fn read_temperature(path: &Path) -> Result<f32, FanControlError> {
    let content = fs::read_to_string(path).map_err(|error| map_io_error(error, path))?;
    let millidegrees = content.trim().parse::<i64>().map_err(|parse_error| {
        FanControlError::Platform(format!(
            "failed to parse '{}' from {}: {}",
            content.trim(),
            path.display(),
            parse_error
        ))
    })?;
    Ok(millidegrees as f32 / 1000.0)
}
