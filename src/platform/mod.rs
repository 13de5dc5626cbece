pub mod dummy;
#[cfg(target_os = "linux")]
mod ec_sys;

use std::io::ErrorKind;
use std::path::Path;
use std::rc::Rc;

use clap::ValueEnum;

use crate::errors::FanControlError;

/// Byte/word access to embedded controller registers.
///
/// Words are little-endian: the low byte lives at `register`, the high byte
/// at `register + 1`.
pub trait RegisterPort {
    fn read_byte(&self, register: u8) -> Result<u8, FanControlError>;

    fn read_word(&self, register: u8) -> Result<u16, FanControlError>;

    fn write_byte(&self, register: u8, value: u8) -> Result<(), FanControlError>;

    fn write_word(&self, register: u8, value: u16) -> Result<(), FanControlError>;
}

/// Available register backends.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortKind {
    /// Linux `ec_sys` debugfs interface
    EcSys,
    /// In-memory registers, nothing touches the hardware
    Dummy,
}

/// Create the requested register backend.
pub fn create_port(kind: PortKind) -> Result<Rc<dyn RegisterPort>, FanControlError> {
    match kind {
        PortKind::Dummy => Ok(Rc::new(dummy::DummyPort::new())),
        #[cfg(target_os = "linux")]
        PortKind::EcSys => Ok(Rc::new(ec_sys::EcSysPort::open()?)),
        #[cfg(not(target_os = "linux"))]
        PortKind::EcSys => Err(FanControlError::Platform(
            "ec_sys is only available on Linux".into(),
        )),
    }
}

/// Map an `std::io::Error` to the appropriate `FanControlError` variant,
/// converting `PermissionDenied` errors to a descriptive message.
pub(crate) fn map_io_error(error: std::io::Error, path: &Path) -> FanControlError {
    match error.kind() {
        ErrorKind::PermissionDenied => {
            FanControlError::PermissionDenied(format!("{}: {}", path.display(), error))
        }
        _ => FanControlError::Io(error),
    }
}

/// The register holding the high byte of a word starting at `register`.
pub(crate) fn high_byte_register(register: u8) -> Result<u8, FanControlError> {
    register
        .checked_add(1)
        .ok_or(FanControlError::RegisterOutOfRange(register))
}
