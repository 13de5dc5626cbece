use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use log::trace;

use super::{high_byte_register, map_io_error, RegisterPort};
use crate::errors::FanControlError;

const EC_SYS_IO: &str = "/sys/kernel/debug/ec/ec0/io";

/// Register access through the `ec_sys` kernel module.
///
/// The debugfs file exposes the 256 EC registers as bytes at their offsets.
/// Writing requires the module to be loaded with `write_support=1`.
pub struct EcSysPort {
    io_path: PathBuf,
}

impl EcSysPort {
    /// Open the default debugfs path, failing early if it is missing.
    pub fn open() -> Result<Self, FanControlError> {
        Self::with_path(PathBuf::from(EC_SYS_IO))
    }

    /// Use a custom io file (useful for testing).
    pub fn with_path(io_path: PathBuf) -> Result<Self, FanControlError> {
        if !io_path.exists() {
            return Err(FanControlError::Platform(format!(
                "{} not found: load the ec_sys module (modprobe ec_sys write_support=1)",
                io_path.display()
            )));
        }
        Ok(Self { io_path })
    }

    fn open_for_read(&self) -> Result<File, FanControlError> {
        File::open(&self.io_path).map_err(|error| map_io_error(error, &self.io_path))
    }

    fn open_for_write(&self) -> Result<File, FanControlError> {
        OpenOptions::new()
            .write(true)
            .open(&self.io_path)
            .map_err(|error| match error.kind() {
                ErrorKind::PermissionDenied => FanControlError::PermissionDenied(format!(
                    "cannot write {}: run as root and load ec_sys with write_support=1",
                    self.io_path.display()
                )),
                _ => FanControlError::Io(error),
            })
    }

    fn read_at(&self, register: u8, buffer: &mut [u8]) -> Result<(), FanControlError> {
        let file = self.open_for_read()?;
        file.read_exact_at(buffer, register as u64)
            .map_err(|error| map_io_error(error, &self.io_path))
    }

    fn write_at(&self, register: u8, buffer: &[u8]) -> Result<(), FanControlError> {
        let file = self.open_for_write()?;
        file.write_all_at(buffer, register as u64)
            .map_err(|error| map_io_error(error, &self.io_path))
    }
}

impl RegisterPort for EcSysPort {
    fn read_byte(&self, register: u8) -> Result<u8, FanControlError> {
        let mut buffer = [0u8; 1];
        self.read_at(register, &mut buffer)?;
        trace!("ec_sys: read 0x{:02X} -> {}", register, buffer[0]);
        Ok(buffer[0])
    }

    fn read_word(&self, register: u8) -> Result<u16, FanControlError> {
        high_byte_register(register)?;
        let mut buffer = [0u8; 2];
        self.read_at(register, &mut buffer)?;
        let value = u16::from_le_bytes(buffer);
        trace!("ec_sys: read word 0x{:02X} -> {}", register, value);
        Ok(value)
    }

    fn write_byte(&self, register: u8, value: u8) -> Result<(), FanControlError> {
        trace!("ec_sys: write 0x{:02X} <- {}", register, value);
        self.write_at(register, &[value])
    }

    fn write_word(&self, register: u8, value: u16) -> Result<(), FanControlError> {
        high_byte_register(register)?;
        trace!("ec_sys: write word 0x{:02X} <- {}", register, value);
        self.write_at(register, &value.to_le_bytes())
    }
}
