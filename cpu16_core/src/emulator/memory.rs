use tracing::warn;

use super::bus::{BusDevice, BusRequest, BusResponse, WaitStates};

/// Word addressed RAM or ROM occupying `[base, base + size)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Memory {
    base: u16,
    words: Vec<u16>,
    writable: bool,
    waits: WaitStates,
}

impl Memory {
    pub fn ram(base: u16, size: u32, wait_states: u32) -> Self {
        Self::new(base, size, wait_states, true)
    }

    pub fn rom(base: u16, size: u32, wait_states: u32) -> Self {
        Self::new(base, size, wait_states, false)
    }

    fn new(base: u16, size: u32, wait_states: u32, writable: bool) -> Self {
        Self {
            base: base & !1,
            words: vec![0; (size / 2) as usize],
            writable,
            waits: WaitStates::new(wait_states),
        }
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    /// Size in bytes.
    pub fn size(&self) -> u32 {
        self.words.len() as u32 * 2
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn contains(&self, address: u16) -> bool {
        address >= self.base && ((address - self.base) as u32) < self.size()
    }

    fn index(&self, address: u16) -> usize {
        ((address - self.base) >> 1) as usize
    }

    pub fn get(&self, address: u16) -> u16 {
        self.words[self.index(address)]
    }

    /// Store a word regardless of writability (image loading).
    pub fn load(&mut self, address: u16, value: u16) {
        let index = self.index(address);
        self.words[index] = value;
    }
}

impl BusDevice for Memory {
    fn clock(&mut self, request: &BusRequest) -> BusResponse {
        if !self.waits.clock(request) {
            return BusResponse::default();
        }

        let address = request.word_address();
        if request.write_enable {
            if self.writable {
                self.load(address, request.write_data);
            } else {
                warn!(
                    "write of {:#06x} to ROM at {:#06x} ignored",
                    request.write_data, address
                );
            }
            BusResponse::ack(0)
        } else {
            BusResponse::ack(self.get(address))
        }
    }

    fn peek(&self, address: u16) -> Option<u16> {
        let address = address & !1;
        self.contains(address).then(|| self.get(address))
    }
}
