use super::{
    alu::AluFlags,
    bus::{BusRequest, BusResponse},
};

/// Lines in the datapath, as last driven by the control unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Datapath {
    // Bus interface
    pub bus_o: BusRequest,  // Registered request lines driven by the core.
    pub bus_i: BusResponse, // Response lines sampled on the last edge.

    // Decoded instruction
    pub op_a: u8,
    pub op_b: u8,
    pub op_c: u8,

    // Register file outputs
    pub channel_a: u16,
    pub channel_b: u16,
    pub zero: bool, // Channel A is all zero.

    // ALU
    pub pc_plus_2: u16,
    pub alu_op_a: u16, // Operand A input.
    pub alu_op_b: u16, // Operand B input.
    pub alu_out: u16,
    pub alu_flags: AluFlags,

    // Write back
    pub mem_rdata: u16, // Word latched from a load.
    pub reg_write_data: u16,

    // Program counter
    pub branch_taken: bool,
    pub next_pc: u16,
}
