use strum::{Display, EnumIter, EnumString};

use super::Instruction;

/// Named ALU function codes (the `opcode` field of an instruction).
///
/// The top two bits pick the functional unit, the low three configure it.
/// Codes not listed here still drive the ALU; they just have no mnemonic.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum AluFunction {
    ADD = 0b00000,
    SUB = 0b00001,
    NOR = 0b01000,
    NAND = 0b01001,
    ANDN = 0b01010,
    XOR = 0b01011,
    AND = 0b01100,
    MOVA = 0b01101,
    MOV = 0b01110,
    OR = 0b01111,
    SHL = 0b10000,
    SHR = 0b10001,
    SHLX = 0b10010,
    SAR = 0b10011,
    CMPEQ = 0b11000,
    CMPULT = 0b11001,
    CMPLT = 0b11010,
    CMPLE = 0b11011,
}

impl AluFunction {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<AluFunction> {
        use strum::IntoEnumIterator;
        AluFunction::iter().find(|func| func.code() == code)
    }
}

/// Sub-opcodes carried in bits 8:6 when bit 9 of the instruction is set.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum MemBranchOp {
    #[strum(serialize = "JMP")]
    Jump = 0b000,
    #[strum(serialize = "BZ")]
    BranchZero = 0b100,
    #[strum(serialize = "BNZ")]
    BranchNotZero = 0b101,
    #[strum(serialize = "LD")]
    Load = 0b010,
    #[strum(serialize = "LDR")]
    LoadRelative = 0b110,
    #[strum(serialize = "ST")]
    Store = 0b011,
}

impl MemBranchOp {
    pub fn subcode(self) -> u8 {
        self as u8
    }

    pub fn from_subcode(subcode: u8) -> Option<MemBranchOp> {
        match subcode {
            0b000 => Some(MemBranchOp::Jump),
            0b100 => Some(MemBranchOp::BranchZero),
            0b101 => Some(MemBranchOp::BranchNotZero),
            0b010 => Some(MemBranchOp::Load),
            0b110 => Some(MemBranchOp::LoadRelative),
            0b011 => Some(MemBranchOp::Store),
            _ => None,
        }
    }

    pub fn is_memory(self) -> bool {
        matches!(
            self,
            MemBranchOp::Load | MemBranchOp::LoadRelative | MemBranchOp::Store
        )
    }

    pub fn is_branch(self) -> bool {
        !self.is_memory()
    }
}

/// Instruction operands used by [`ISA::build`].
///
/// For memory and branch instructions `b` is ignored since those bits hold
/// the sub-opcode.
#[derive(Clone, Copy, Debug, Default)]
pub struct Operands {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub constant: bool,
}

/// Every instruction the assembler knows how to emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumIter, EnumString)]
#[strum(ascii_case_insensitive, serialize_all = "UPPERCASE")]
pub enum ISA {
    ADD,
    SUB,
    NOR,
    NAND,
    ANDN,
    XOR,
    AND,
    MOVA,
    MOV,
    OR,
    SHL,
    SHR,
    SHLX,
    SAR,
    CMPEQ,
    CMPULT,
    CMPLT,
    CMPLE,
    JMP,
    BZ,
    BNZ,
    LD,
    LDR,
    ST,
}

impl ISA {
    /// The sub-opcode for memory/branch mnemonics, `None` for ALU ones.
    pub fn mem_branch_op(self) -> Option<MemBranchOp> {
        match self {
            ISA::JMP => Some(MemBranchOp::Jump),
            ISA::BZ => Some(MemBranchOp::BranchZero),
            ISA::BNZ => Some(MemBranchOp::BranchNotZero),
            ISA::LD => Some(MemBranchOp::Load),
            ISA::LDR => Some(MemBranchOp::LoadRelative),
            ISA::ST => Some(MemBranchOp::Store),
            _ => None,
        }
    }

    /// The ALU function the instruction computes with.
    ///
    /// Jumps, branches and absolute loads/stores pass the constant straight
    /// through, relative loads add it to PC + 2.
    pub fn alu_function(self) -> AluFunction {
        match self {
            ISA::ADD => AluFunction::ADD,
            ISA::SUB => AluFunction::SUB,
            ISA::NOR => AluFunction::NOR,
            ISA::NAND => AluFunction::NAND,
            ISA::ANDN => AluFunction::ANDN,
            ISA::XOR => AluFunction::XOR,
            ISA::AND => AluFunction::AND,
            ISA::MOVA => AluFunction::MOVA,
            ISA::MOV => AluFunction::MOV,
            ISA::OR => AluFunction::OR,
            ISA::SHL => AluFunction::SHL,
            ISA::SHR => AluFunction::SHR,
            ISA::SHLX => AluFunction::SHLX,
            ISA::SAR => AluFunction::SAR,
            ISA::CMPEQ => AluFunction::CMPEQ,
            ISA::CMPULT => AluFunction::CMPULT,
            ISA::CMPLT => AluFunction::CMPLT,
            ISA::CMPLE => AluFunction::CMPLE,
            ISA::JMP | ISA::BZ | ISA::BNZ | ISA::LD | ISA::ST => AluFunction::MOV,
            ISA::LDR => AluFunction::ADD,
        }
    }

    pub fn build(self, operands: Operands) -> Instruction {
        let (mem_or_branch, op_b) = match self.mem_branch_op() {
            Some(op) => (true, op.subcode()),
            None => (false, operands.b),
        };
        Instruction::new(
            self.alu_function().code(),
            operands.constant,
            mem_or_branch,
            op_b,
            operands.c,
            operands.a,
        )
    }
}
