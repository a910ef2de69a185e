use tracing::debug;

use super::{
    MachineError,
    bus::{BusDevice, BusRequest, BusResponse},
    config::MachineConfig,
    gpio::Gpio,
    memory::Memory,
};

/// Address decoder owning every device on the bus.
///
/// Each strobed request is routed to exactly one device; the others see
/// an idle bus. Nobody answers an unmapped address, so the master waits
/// there forever.
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryModule {
    ram: Memory,
    rom: Memory,
    gpio: Gpio,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    Ram,
    Rom,
    Gpio,
}

impl MemoryModule {
    pub fn new(config: &MachineConfig) -> Result<Self, MachineError> {
        let regions = [
            ("ram", config.ram.base as u32, config.ram.end()),
            ("rom", config.rom.base as u32, config.rom.end()),
            ("gpio", config.gpio.base as u32, config.gpio.base as u32 + 4),
        ];
        for (i, (first, start, end)) in regions.iter().enumerate() {
            if *end > 0x10000 {
                return Err(MachineError::OutOfRange {
                    region: *first,
                    end: *end,
                });
            }
            for (second, other_start, other_end) in &regions[i + 1..] {
                if start < other_end && other_start < end {
                    return Err(MachineError::Overlap {
                        first: *first,
                        second: *second,
                    });
                }
            }
        }

        Ok(Self {
            ram: Memory::ram(config.ram.base, config.ram.size, config.ram.wait_states),
            rom: Memory::rom(config.rom.base, config.rom.size, config.rom.wait_states),
            gpio: Gpio::new(config.gpio.base),
        })
    }

    fn decode(&self, address: u16) -> Option<Target> {
        if self.ram.contains(address) {
            Some(Target::Ram)
        } else if self.rom.contains(address) {
            Some(Target::Rom)
        } else if self.gpio.contains(address) {
            Some(Target::Gpio)
        } else {
            None
        }
    }

    /// Place a word into whichever memory holds `address`, ROM included.
    pub fn load_word(&mut self, address: u16, value: u16) -> Result<(), MachineError> {
        match self.decode(address) {
            Some(Target::Ram) => self.ram.load(address & !1, value),
            Some(Target::Rom) => self.rom.load(address & !1, value),
            _ => return Err(MachineError::Unmapped { address }),
        }
        Ok(())
    }

    pub fn load_image<'a>(
        &mut self,
        image: impl IntoIterator<Item = (&'a u16, &'a u16)>,
    ) -> Result<(), MachineError> {
        for (&address, &value) in image {
            self.load_word(address, value)?;
        }
        Ok(())
    }

    pub fn ram(&self) -> &Memory {
        &self.ram
    }

    pub fn rom(&self) -> &Memory {
        &self.rom
    }

    pub fn gpio(&self) -> &Gpio {
        &self.gpio
    }

    pub fn gpio_mut(&mut self) -> &mut Gpio {
        &mut self.gpio
    }
}

impl BusDevice for MemoryModule {
    fn clock(&mut self, request: &BusRequest) -> BusResponse {
        let target = if request.is_active() {
            self.decode(request.address)
        } else {
            None
        };
        if request.is_active() && target.is_none() {
            debug!("no device at {:#06x}, request left pending", request.address);
        }

        let idle = BusRequest::idle();
        let route = |device: Target| if target == Some(device) { request } else { &idle };

        let ram = self.ram.clock(route(Target::Ram));
        let rom = self.rom.clock(route(Target::Rom));
        let gpio = self.gpio.clock(route(Target::Gpio));

        match target {
            Some(Target::Ram) => ram,
            Some(Target::Rom) => rom,
            Some(Target::Gpio) => gpio,
            None => BusResponse::default(),
        }
    }

    fn peek(&self, address: u16) -> Option<u16> {
        match self.decode(address)? {
            Target::Ram => self.ram.peek(address),
            Target::Rom => self.rom.peek(address),
            Target::Gpio => self.gpio.peek(address),
        }
    }
}
