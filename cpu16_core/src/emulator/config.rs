use serde::{Deserialize, Serialize};

use super::RESET_VECTOR;

/// A contiguous memory region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub base: u16,
    /// Size in bytes.
    pub size: u32,
    #[serde(default)]
    pub wait_states: u32,
}

impl RegionConfig {
    pub fn end(&self) -> u32 {
        self.base as u32 + self.size
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioConfig {
    pub base: u16,
}

/// Memory map and reset vector of a machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub reset_vector: u16,
    pub ram: RegionConfig,
    pub rom: RegionConfig,
    pub gpio: GpioConfig,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            reset_vector: RESET_VECTOR,
            ram: RegionConfig {
                base: 0x0000,
                size: 0x8000,
                wait_states: 0,
            },
            rom: RegionConfig {
                base: 0xF000,
                size: 0x1000,
                wait_states: 0,
            },
            gpio: GpioConfig { base: 0xE000 },
        }
    }
}

impl MachineConfig {
    /// Same map with every region stretched by `wait_states`.
    pub fn with_wait_states(mut self, wait_states: u32) -> Self {
        self.ram.wait_states = wait_states;
        self.rom.wait_states = wait_states;
        self
    }
}
