//! Request/acknowledge bus between the core (the only master) and the
//! memory mapped devices.
//!
//! The master holds `cycle_active` and `strobe` with a valid address (and
//! write data) until the device raises `acknowledge`. A device may stretch
//! the transaction for any number of cycles. There is no error or retry
//! signal: a request nobody acknowledges stays pending forever.

/// Lines driven by the master.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusRequest {
    pub cycle_active: bool,
    pub strobe: bool,
    pub address: u16,
    pub write_enable: bool,
    pub write_data: u16,
}

/// Lines driven by the addressed device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BusResponse {
    pub acknowledge: bool,
    pub read_data: u16,
}

impl BusRequest {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn read(address: u16) -> Self {
        Self {
            cycle_active: true,
            strobe: true,
            address,
            write_enable: false,
            write_data: 0,
        }
    }

    pub fn write(address: u16, data: u16) -> Self {
        Self {
            cycle_active: true,
            strobe: true,
            address,
            write_enable: true,
            write_data: data,
        }
    }

    /// A data phase is in progress.
    pub fn is_active(&self) -> bool {
        self.cycle_active && self.strobe
    }

    /// Word address, the least significant bit is ignored.
    pub fn word_address(&self) -> u16 {
        self.address & !1
    }
}

impl BusResponse {
    pub fn ack(read_data: u16) -> Self {
        Self {
            acknowledge: true,
            read_data,
        }
    }
}

/// A memory mapped device.
pub trait BusDevice {
    /// Advance the device by one clock with the master's current request
    /// lines and return the response lines for this cycle.
    fn clock(&mut self, request: &BusRequest) -> BusResponse;

    /// Read a word without side effects or wait states (used for
    /// inspection, never by the core).
    fn peek(&self, address: u16) -> Option<u16>;
}

/// Counts how long a device has been stretching the current transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WaitStates {
    pub wait_states: u32,
    elapsed: u32,
}

impl WaitStates {
    pub fn new(wait_states: u32) -> Self {
        Self {
            wait_states,
            elapsed: 0,
        }
    }

    /// Returns true on the cycle the device should acknowledge.
    /// An idle bus restarts the count.
    pub fn clock(&mut self, request: &BusRequest) -> bool {
        if !request.is_active() {
            self.elapsed = 0;
            return false;
        }
        if self.elapsed < self.wait_states {
            self.elapsed += 1;
            false
        } else {
            self.elapsed = 0;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_states_stretch_the_transaction() {
        let mut waits = WaitStates::new(2);
        let request = BusRequest::read(0x10);
        assert!(!waits.clock(&request));
        assert!(!waits.clock(&request));
        assert!(waits.clock(&request));
    }

    #[test]
    fn test_zero_wait_acks_immediately() {
        let mut waits = WaitStates::new(0);
        assert!(waits.clock(&BusRequest::write(0x10, 1)));
        assert!(!waits.clock(&BusRequest::idle()));
    }

    #[test]
    fn test_idle_restarts_the_count() {
        let mut waits = WaitStates::new(1);
        assert!(!waits.clock(&BusRequest::read(0)));
        assert!(!waits.clock(&BusRequest::idle()));
        assert!(!waits.clock(&BusRequest::read(0)));
        assert!(waits.clock(&BusRequest::read(0)));
    }

    #[test]
    fn test_request_needs_cycle_and_strobe() {
        let request = BusRequest {
            strobe: true,
            ..BusRequest::read(4)
        };
        assert!(request.is_active());
        let request = BusRequest {
            cycle_active: false,
            ..BusRequest::read(4)
        };
        assert!(!request.is_active());
        assert_eq!(BusRequest::read(0x1235).word_address(), 0x1234);
    }
}
