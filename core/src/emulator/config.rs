//! Emulator settings and runtime options

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amiga::agnus::AgnusRevision;
use crate::amiga::beam::VideoFormat;
use crate::bus::Address;
use crate::tickable::Ticks;
use crate::types::Word;

pub const SPEED_MIN: u16 = 10;
pub const SPEED_MAX: u16 = 1000;

/// Smallest and largest supported chip RAM
const CHIP_RAM_MIN: usize = 256 * 1024;
const CHIP_RAM_MAX: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("speed {0}% is out of range (10..=1000)")]
    SpeedOutOfRange(u16),
    #[error("inspection interval must be non-zero")]
    ZeroInspectionInterval,
    #[error("address {0:06X} is not word aligned")]
    UnalignedAddress(Address),
    #[error("address {0:06X} is outside of chip memory")]
    AddressOutOfRange(Address),
    #[error("{0:03X} is not a custom register")]
    InvalidRegister(Word),
    #[error("chip RAM size {0} is not a power of two between 256K and 2M")]
    ChipRamSize(usize),
}

/// Initial emulator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub video_format: VideoFormat,
    pub revision: AgnusRevision,
    /// Chip RAM size in bytes
    pub chip_ram: usize,
    pub dma_debug: bool,
    pub warp: bool,
    /// Speed in percent of real time
    pub speed: u16,
    /// Interval of the inspection snapshot in milliseconds
    pub inspection_interval: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            video_format: VideoFormat::Pal,
            revision: AgnusRevision::Ocs,
            chip_ram: 512 * 1024,
            dma_debug: false,
            warp: false,
            speed: 100,
            inspection_interval: 100,
        }
    }
}

impl EmulatorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Cannot parse emulator config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.chip_ram.is_power_of_two()
            || !(CHIP_RAM_MIN..=CHIP_RAM_MAX).contains(&self.chip_ram)
        {
            return Err(ConfigError::ChipRamSize(self.chip_ram));
        }
        EmulatorOption::Speed(self.speed).validate(self.chip_ram)?;
        EmulatorOption::InspectionInterval(self.inspection_interval).validate(self.chip_ram)
    }

    /// Inspection interval in master clock ticks
    pub fn inspection_ticks(&self) -> Ticks {
        self.video_format.master_clock() * Ticks::from(self.inspection_interval) / 1000
    }
}

/// A setting that can be changed while the emulator is suspended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmulatorOption {
    VideoFormat(VideoFormat),
    AgnusRevision(AgnusRevision),
    DmaDebug(bool),
    WarpMode(bool),
    Speed(u16),
    InspectionInterval(u32),
    AddCopperBreakpoint(Address),
    RemoveCopperBreakpoint(Address),
    /// Custom register offset
    AddCopperWatchpoint(Word),
    RemoveCopperWatchpoint(Word),
}

impl EmulatorOption {
    /// Checks the option against a machine with `chip_ram` bytes of chip RAM
    pub fn validate(&self, chip_ram: usize) -> Result<(), ConfigError> {
        match *self {
            Self::Speed(s) if !(SPEED_MIN..=SPEED_MAX).contains(&s) => {
                Err(ConfigError::SpeedOutOfRange(s))
            }
            Self::InspectionInterval(0) => Err(ConfigError::ZeroInspectionInterval),
            Self::AddCopperBreakpoint(addr) | Self::RemoveCopperBreakpoint(addr) => {
                if addr & 1 != 0 {
                    Err(ConfigError::UnalignedAddress(addr))
                } else if addr as usize >= chip_ram {
                    Err(ConfigError::AddressOutOfRange(addr))
                } else {
                    Ok(())
                }
            }
            Self::AddCopperWatchpoint(reg) | Self::RemoveCopperWatchpoint(reg) => {
                if reg & 1 != 0 || reg > 0x1FE {
                    Err(ConfigError::InvalidRegister(reg))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}
