//! Arithmetic-logic unit.
//!
//! Four functional units (adder, boolean, shifter, comparator) always
//! compute in parallel; the top two bits of the function code pick which
//! result is forwarded.

use crate::{bitmask, bits};

/// Per-bit truth tables for the boolean unit, indexed by `ALUFN[2:0]`.
/// Output bit i is `table[(B_i << 1) | A_i]`.
const BOOLE_TABLES: [u8; 8] = [
    0b0001, // NOR
    0b0111, // NAND
    0b0100, // B & !A
    0b0110, // XOR
    0b1000, // AND
    0b1010, // A
    0b1100, // B
    0b1110, // OR
];

const UNIT_COMPARE: u8 = 0b11;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AluFlags {
    pub zero: bool,
    pub negative: bool,
    pub overflow: bool,
    pub carry: bool,
    pub less_than: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AluOutput {
    pub result: u16,
    pub flags: AluFlags,
}

/// Selects one of four inputs with the low two bits of `sel`.
pub fn mux4<T: Copy>(sel: u8, inputs: [T; 4]) -> T {
    inputs[bits!(sel, 1;0) as usize]
}

pub fn bit_reverse(value: u16) -> u16 {
    value.reverse_bits()
}

/// Adds or subtracts over a 17 bit intermediate.
/// Returns the sum, the carry out and the signed overflow.
pub fn adder(a: u16, b: u16, subtract: bool) -> (u16, bool, bool) {
    let b_in = if subtract { !b } else { b };
    let wide = a as u32 + b_in as u32 + subtract as u32;
    let sum = wide as u16;
    let carry = bits!(wide, 16) != 0;
    let overflow = bits!((a ^ sum) & (b_in ^ sum), 15) != 0;
    (sum, carry, overflow)
}

pub fn boole(a: u16, b: u16, func: u8) -> u16 {
    let table = BOOLE_TABLES[bits!(func, 2;0) as usize];
    (0..16).fold(0, |out, i| {
        let index = (bits!(b, i) << 1) | bits!(a, i);
        out | ((bits!(table, index) as u16) << i)
    })
}

/// Barrel shift of `value` by `amount[3:0]`.
///
/// Left shifts reverse the operand, shift right and reverse back, so with
/// `sign_extend` a left shift replicates bit 0 into the vacated low bits.
pub fn shifter(value: u16, amount: u16, right: bool, sign_extend: bool) -> u16 {
    let mut x = if right { value } else { bit_reverse(value) };
    let fill = sign_extend && bits!(x, 15) != 0;
    for stage in [8, 4, 2, 1] {
        if amount & stage != 0 {
            let vacated: u16 = if fill { bitmask!(15;16 - stage) } else { 0 };
            x = (x >> stage) | vacated;
        }
    }
    if right { x } else { bit_reverse(x) }
}

/// Evaluates one of EQ, ULT, LT, LE from the adder flags.
pub fn compare(flags: AluFlags, func: u8) -> bool {
    mux4(
        func,
        [
            flags.zero,
            !flags.carry,
            flags.less_than,
            flags.less_than || flags.zero,
        ],
    )
}

/// Computes the ALU output for a 5 bit function code.
pub fn alu(func: u8, a: u16, b: u16) -> AluOutput {
    let unit = bits!(func, 4;3);
    let subtract = bits!(func, 0) != 0 || unit == UNIT_COMPARE;

    let (sum, carry, overflow) = adder(a, b, subtract);
    let negative = bits!(sum, 15) != 0;
    let flags = AluFlags {
        zero: sum == 0,
        negative,
        overflow,
        carry,
        less_than: negative ^ overflow,
    };

    let boolean = boole(a, b, func);
    let shifted = shifter(a, b, bits!(func, 0) != 0, bits!(func, 1) != 0);
    let compared = compare(flags, func) as u16;

    AluOutput {
        result: mux4(unit, [sum, boolean, shifted, compared]),
        flags,
    }
}
