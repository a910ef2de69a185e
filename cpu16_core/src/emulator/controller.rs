use crate::isa::{Instruction, MemBranchOp};

/// Control signals derived from the latched instruction.
///
/// They are a pure function of the instruction word, computed once when
/// the instruction is latched and held through the execute phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Control {
    // ALU Control
    pub alu_fn: u8,              // ALU function code, the opcode field.
    pub alu_op_a_sel: OpASel,    // Mux control for selecting operand A.
    pub alu_op_b_sel: OpBSel,    // Mux control for selecting operand B.

    // Register File Control
    pub rb_sel: bool,                 // Channel B reads opC, write port targets opB.
    pub reg_write: bool,              // Register write enable.
    pub data_dest_sel: DataDestSel,   // Mux control for the write-back data.

    // Memory Control
    pub mem_request: bool, // Execute needs a bus transaction.
    pub mem_write: bool,   // That transaction is a write.

    // PC Control
    pub branch: Option<BranchCond>, // Redirect the PC to the ALU output when taken.
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OpASel {
    #[default]
    RF,
    PC2,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OpBSel {
    #[default]
    RF,
    Const,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DataDestSel {
    #[default]
    ALU,
    Memory,
    PC2,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BranchCond {
    Always,
    Zero,
    NotZero,
}

impl BranchCond {
    /// Whether the branch is taken given the register file zero flag.
    pub fn taken(self, zero: bool) -> bool {
        match self {
            BranchCond::Always => true,
            BranchCond::Zero => zero,
            BranchCond::NotZero => !zero,
        }
    }
}

impl Control {
    /// Plain ALU operation writing its result to `opC`.
    ///
    /// Also the fallback for undefined memory/branch sub-opcodes, which
    /// keep `alu_op_a_sel` tied to bit 9.
    pub fn arithmetic(instr: Instruction) -> Self {
        Self {
            alu_fn: instr.opcode(),
            alu_op_a_sel: if instr.is_mem_or_branch() {
                OpASel::PC2
            } else {
                OpASel::RF
            },
            alu_op_b_sel: if instr.has_const() {
                OpBSel::Const
            } else {
                OpBSel::RF
            },
            reg_write: true,
            data_dest_sel: DataDestSel::ALU,
            ..Default::default()
        }
    }

    pub fn branch(instr: Instruction, cond: BranchCond) -> Self {
        Self {
            // link PC + 2 into opC
            data_dest_sel: DataDestSel::PC2,
            branch: Some(cond),
            ..Self::arithmetic(instr)
        }
    }

    pub fn load(instr: Instruction) -> Self {
        Self {
            data_dest_sel: DataDestSel::Memory,
            mem_request: true,
            mem_write: false,
            ..Self::arithmetic(instr)
        }
    }

    pub fn store(instr: Instruction) -> Self {
        Self {
            // read the value to store from opC
            rb_sel: true,
            reg_write: false,
            mem_request: true,
            mem_write: true,
            ..Self::arithmetic(instr)
        }
    }
}

pub fn get_control_signals(instr: Instruction) -> Control {
    let Some(op) = instr.mem_branch_op() else {
        return Control::arithmetic(instr);
    };

    match op {
        MemBranchOp::Jump => Control::branch(instr, BranchCond::Always),
        MemBranchOp::BranchZero => Control::branch(instr, BranchCond::Zero),
        MemBranchOp::BranchNotZero => Control::branch(instr, BranchCond::NotZero),
        MemBranchOp::Load | MemBranchOp::LoadRelative => Control::load(instr),
        MemBranchOp::Store => Control::store(instr),
    }
}
