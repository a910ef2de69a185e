mod definitions;
mod instruction;

pub use definitions::{AluFunction, ISA, MemBranchOp, Operands};
pub use instruction::{Instruction, InstructionBuildError, InstructionBuildErrorType};
