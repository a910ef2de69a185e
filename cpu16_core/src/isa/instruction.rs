use std::fmt;

use super::{AluFunction, MemBranchOp};
use crate::bits;

/// A fetched 16-bit instruction word.
///
/// | Bits  | Field       |
/// |-------|-------------|
/// | 15:11 | opcode      |
/// | 10    | hasConst    |
/// | 9     | memOrBranch |
/// | 8:6   | opB / subop |
/// | 5:3   | opC         |
/// | 2:0   | opA         |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Instruction {
    instr: u16,
}

#[derive(Debug)]
pub struct InstructionBuildError {
    pub error_message: String,
    pub error_type: InstructionBuildErrorType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionBuildErrorType {
    InvalidOpcode,
    InvalidOpA,
    InvalidOpB,
    InvalidOpC,
}

impl fmt::Display for InstructionBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.error_message)
    }
}

impl std::error::Error for InstructionBuildError {}

impl Instruction {
    pub fn new(opcode: u8, has_const: bool, mem_or_branch: bool, op_b: u8, op_c: u8, op_a: u8) -> Instruction {
        Self::try_build(opcode, has_const, mem_or_branch, op_b, op_c, op_a)
            .expect("Invalid instruction")
    }

    pub fn try_build(
        opcode: u8,
        has_const: bool,
        mem_or_branch: bool,
        op_b: u8,
        op_c: u8,
        op_a: u8,
    ) -> Result<Instruction, InstructionBuildError> {
        if opcode != bits!(opcode, 4;0) {
            Err(InstructionBuildError {
                error_message: format!("Opcode {opcode:#04x} is out of range."),
                error_type: InstructionBuildErrorType::InvalidOpcode,
            })
        } else if op_b != bits!(op_b, 2;0) {
            Err(InstructionBuildError {
                error_message: format!("OpB {op_b:#04x} is out of range."),
                error_type: InstructionBuildErrorType::InvalidOpB,
            })
        } else if op_c != bits!(op_c, 2;0) {
            Err(InstructionBuildError {
                error_message: format!("OpC {op_c:#04x} is out of range."),
                error_type: InstructionBuildErrorType::InvalidOpC,
            })
        } else if op_a != bits!(op_a, 2;0) {
            Err(InstructionBuildError {
                error_message: format!("OpA {op_a:#04x} is out of range."),
                error_type: InstructionBuildErrorType::InvalidOpA,
            })
        } else {
            let instr = (opcode as u16) << 11
                | (has_const as u16) << 10
                | (mem_or_branch as u16) << 9
                | (op_b as u16) << 6
                | (op_c as u16) << 3
                | op_a as u16;
            Ok(Instruction { instr })
        }
    }

    pub fn from_raw(instr: u16) -> Instruction {
        Instruction { instr }
    }

    pub fn raw(&self) -> u16 {
        self.instr
    }

    /// ALU function code, bits 15:11
    pub fn opcode(&self) -> u8 {
        bits!(self.instr, 15;11) as u8
    }

    pub fn has_const(&self) -> bool {
        bits!(self.instr, 10) != 0
    }

    pub fn is_mem_or_branch(&self) -> bool {
        bits!(self.instr, 9) != 0
    }

    pub fn op_b(&self) -> u8 {
        bits!(self.instr, 8;6) as u8
    }

    pub fn op_c(&self) -> u8 {
        bits!(self.instr, 5;3) as u8
    }

    pub fn op_a(&self) -> u8 {
        bits!(self.instr, 2;0) as u8
    }

    /// The memory/branch sub-opcode. Only meaningful when bit 9 is set;
    /// returns `None` for ALU instructions and for undefined sub-opcodes.
    pub fn mem_branch_op(&self) -> Option<MemBranchOp> {
        if self.is_mem_or_branch() {
            MemBranchOp::from_subcode(self.op_b())
        } else {
            None
        }
    }

    /// A load or store. Undefined sub-opcodes run as plain ALU operations
    /// and never touch memory.
    pub fn is_memory_access(&self) -> bool {
        self.mem_branch_op().is_some_and(MemBranchOp::is_memory)
    }

    pub fn alu_function(&self) -> Option<AluFunction> {
        AluFunction::from_code(self.opcode())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = match self.alu_function() {
            Some(func) => func.to_string(),
            None => format!("ALU<{:05b}>", self.opcode()),
        };
        let operand_b = if self.has_const() {
            "#".to_string()
        } else {
            format!("r{}", self.op_b())
        };

        if !self.is_mem_or_branch() {
            return write!(f, "{} r{}, r{}, {}", func, self.op_c(), self.op_a(), operand_b);
        }

        match self.mem_branch_op() {
            Some(MemBranchOp::Store) => write!(f, "ST.{} r{}, {}", func, self.op_c(), operand_b),
            Some(op) if op.is_memory() => {
                write!(f, "{}.{} r{}, {}", op, func, self.op_c(), operand_b)
            }
            Some(op) => write!(
                f,
                "{}.{} r{}, r{}, {}",
                op,
                func,
                self.op_c(),
                self.op_a(),
                operand_b
            ),
            None => write!(f, "???.{} r{}, {}", func, self.op_c(), operand_b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_layout() {
        // opcode 10110, const, mem, opB 011, opC 101, opA 110
        let instr = Instruction::from_raw(0b10110_1_1_011_101_110);
        assert_eq!(instr.opcode(), 0b10110);
        assert!(instr.has_const());
        assert!(instr.is_mem_or_branch());
        assert_eq!(instr.op_b(), 0b011);
        assert_eq!(instr.op_c(), 0b101);
        assert_eq!(instr.op_a(), 0b110);
        assert_eq!(instr.mem_branch_op(), Some(MemBranchOp::Store));
        assert!(instr.is_memory_access());
    }

    #[test]
    fn test_every_word_decodes_to_its_fields() {
        for raw in 0..=u16::MAX {
            let instr = Instruction::from_raw(raw);
            let rebuilt = Instruction::new(
                instr.opcode(),
                instr.has_const(),
                instr.is_mem_or_branch(),
                instr.op_b(),
                instr.op_c(),
                instr.op_a(),
            );
            assert_eq!(rebuilt.raw(), raw);
            assert_eq!(instr.opcode() as u16, raw >> 11);
            assert_eq!(instr.op_a() as u16, raw & 0x7);
        }
    }

    #[test]
    fn test_build_rejects_out_of_range_fields() {
        let err = Instruction::try_build(0b100000, false, false, 0, 0, 0).unwrap_err();
        assert_eq!(err.error_type, InstructionBuildErrorType::InvalidOpcode);
        let err = Instruction::try_build(0, false, false, 8, 0, 0).unwrap_err();
        assert_eq!(err.error_type, InstructionBuildErrorType::InvalidOpB);
        let err = Instruction::try_build(0, false, false, 0, 9, 0).unwrap_err();
        assert_eq!(err.error_type, InstructionBuildErrorType::InvalidOpC);
        let err = Instruction::try_build(0, false, false, 0, 0, 15).unwrap_err();
        assert_eq!(err.error_type, InstructionBuildErrorType::InvalidOpA);
    }

    #[test]
    fn test_memory_access_matches_sub_opcode() {
        // branch-if-zero: bit 9 set, subop 100 (bit 7 clear)
        assert!(!Instruction::from_raw(0b00000_0_1_100_000_000).is_memory_access());
        // bit 7 set without bit 9 is an ALU op reading r2
        assert!(!Instruction::from_raw(0b00000_0_0_010_000_000).is_memory_access());
        // load
        assert!(Instruction::from_raw(0b00000_0_1_010_000_000).is_memory_access());
        // load relative and store
        assert!(Instruction::from_raw(0b00000_0_1_110_000_000).is_memory_access());
        assert!(Instruction::from_raw(0b00000_0_1_011_000_000).is_memory_access());
        // undefined subop 111 has both bits set but runs as an ALU op
        assert!(!Instruction::from_raw(0b00000_0_1_111_000_000).is_memory_access());
        assert_eq!(Instruction::from_raw(0b00000_0_1_111_000_000).mem_branch_op(), None);
    }
}
