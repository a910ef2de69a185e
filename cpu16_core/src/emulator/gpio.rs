use super::bus::{BusDevice, BusRequest, BusResponse};

/// An input/output port pair. The input port sits at `base` and is read
/// only; the output port at `base + 2` latches whatever is written to it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Gpio {
    base: u16,
    input: u16,
    output: u16,
}

impl Gpio {
    pub fn new(base: u16) -> Self {
        Self {
            base: base & !1,
            ..Default::default()
        }
    }

    pub fn input_address(&self) -> u16 {
        self.base
    }

    pub fn output_address(&self) -> u16 {
        self.base.wrapping_add(2)
    }

    pub fn contains(&self, address: u16) -> bool {
        let address = address & !1;
        address == self.input_address() || address == self.output_address()
    }

    /// Drive the input port from outside the machine.
    pub fn set_input(&mut self, value: u16) {
        self.input = value;
    }

    pub fn input(&self) -> u16 {
        self.input
    }

    pub fn output(&self) -> u16 {
        self.output
    }
}

impl BusDevice for Gpio {
    fn clock(&mut self, request: &BusRequest) -> BusResponse {
        if !request.is_active() {
            return BusResponse::default();
        }

        let address = request.word_address();
        if request.write_enable {
            if address == self.output_address() {
                self.output = request.write_data;
            }
            BusResponse::ack(0)
        } else {
            BusResponse::ack(self.peek(address).unwrap_or_default())
        }
    }

    fn peek(&self, address: u16) -> Option<u16> {
        let address = address & !1;
        if address == self.input_address() {
            Some(self.input)
        } else if address == self.output_address() {
            Some(self.output)
        } else {
            None
        }
    }
}
