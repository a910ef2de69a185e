use std::ops::{Index, IndexMut};

/// Seven general registers plus the hardwired zero register `r0`.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    pub r: [u16; 8],
}

/// Values presented on the two read ports.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct ReadPorts {
    pub channel_a: u16,
    pub channel_b: u16,
    /// Channel A is all zero.
    pub zero: bool,
}

impl RegisterFile {
    /// Combinational read. Channel A always reads `op_a`; channel B reads
    /// `op_c` when `rb_sel` is set, `op_b` otherwise.
    pub fn read(&self, op_a: u8, op_b: u8, op_c: u8, rb_sel: bool) -> ReadPorts {
        let channel_a = self[op_a as usize];
        let channel_b = if rb_sel {
            self[op_c as usize]
        } else {
            self[op_b as usize]
        };
        ReadPorts {
            channel_a,
            channel_b,
            zero: channel_a == 0,
        }
    }

    /// Destination register of the write port, the complement of the
    /// channel B selection.
    pub fn write_destination(op_b: u8, op_c: u8, rb_sel: bool) -> u8 {
        if rb_sel { op_b } else { op_c }
    }

    pub fn write(&mut self, op_b: u8, op_c: u8, rb_sel: bool, data: u16) {
        let dest = Self::write_destination(op_b, op_c, rb_sel) as usize;
        if dest != 0 {
            self.r[dest] = data;
        }
    }
}

impl Index<usize> for RegisterFile {
    type Output = u16;

    fn index(&self, index: usize) -> &Self::Output {
        if index == 0 { &0 } else { &self.r[index] }
    }
}

impl IndexMut<usize> for RegisterFile {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        self.r[0] = 0;
        &mut self.r[index]
    }
}
