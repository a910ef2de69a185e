pub mod alu;
pub mod bus;
pub mod config;
pub mod control_unit;
pub mod controller;
pub mod datapath;
pub mod gpio;
pub mod memory;
pub mod memory_module;
mod register_file;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod wait_state_fuzz_test;

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::trace;

use crate::assembler::AssembledProgram;
use bus::{BusDevice, BusResponse};
use config::MachineConfig;
use control_unit::ControlUnit;
use memory_module::MemoryModule;

pub use register_file::{ReadPorts, RegisterFile};

/// Address loaded into the PC on reset.
pub const RESET_VECTOR: u16 = 0xF000;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("no device is mapped at {address:#06x}")]
    Unmapped { address: u16 },
    #[error("{first} overlaps {second}")]
    Overlap {
        first: &'static str,
        second: &'static str,
    },
    #[error("{region} extends past the top of memory (ends at {end:#x})")]
    OutOfRange { region: &'static str, end: u32 },
}

/// The whole machine: register file, the devices on the bus and the core.
#[derive(Clone, Debug, PartialEq)]
pub struct EmulatorState {
    pub x: RegisterFile,
    pub memory: MemoryModule,
    pub core: ControlUnit,
    pub cycles: u64,
}

impl EmulatorState {
    pub fn new(program: &AssembledProgram, config: &MachineConfig) -> Result<Self, MachineError> {
        let mut memory = MemoryModule::new(config)?;
        memory.load_image(&program.image)?;

        Ok(EmulatorState {
            x: RegisterFile::default(),
            memory,
            core: ControlUnit::new(config.reset_vector),
            cycles: 0,
        })
    }

    /// Advance the whole machine by one clock edge.
    ///
    /// The devices answer the request lines the core drove last cycle, then
    /// the core samples that answer. While the core is stalled the devices
    /// are held as well, so a pending transaction resumes where it left off
    /// and is acknowledged once after the stall is released.
    pub fn clock(&mut self) {
        if self.core.stall {
            self.core.clock(&mut self.x, BusResponse::default());
            self.cycles += 1;
            return;
        }

        let request = self.core.bus_request();
        let response = self.memory.clock(&request);
        if response.acknowledge {
            trace!(
                address = request.address,
                write = request.write_enable,
                data = response.read_data,
                "bus acknowledge"
            );
        }
        self.core.clock(&mut self.x, response);
        self.cycles += 1;
    }

    pub fn reset(&mut self) {
        self.core.reset();
    }

    pub fn set_stall(&mut self, stall: bool) {
        self.core.stall = stall;
    }

    pub fn pc(&self) -> u16 {
        self.core.pc
    }

    /// The program jumped to itself and will never leave.
    pub fn is_halted(&self) -> bool {
        self.core.spinning
    }

    pub fn clock_until_next_instruction(&self, max_clocks: usize) -> Self {
        let mut state = self.clone();
        let retired = state.core.retired;
        for _ in 0..max_clocks {
            state.clock();
            if state.core.retired != retired {
                break;
            }
        }
        state
    }

    /// Run until the next instruction to fetch is on a breakpoint line,
    /// the program halts, or `max_clocks` have passed.
    pub fn clock_until_break(
        &self,
        program: &AssembledProgram,
        breakpoints: &BTreeSet<usize>,
        max_clocks: usize,
    ) -> Self {
        let mut state = self.clone();

        for _ in 0..max_clocks {
            let retired = state.core.retired;
            state.clock();
            if state.core.retired == retired {
                continue;
            }

            if state.is_halted() {
                break;
            }

            let hit_breakpoint = program
                .source_map
                .get_by_left(&state.pc())
                .is_some_and(|line_num| breakpoints.contains(line_num));
            if hit_breakpoint {
                break;
            }
        }
        state
    }
}
