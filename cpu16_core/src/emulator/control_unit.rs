use tracing::{debug, trace};

use super::{
    RESET_VECTOR,
    alu::alu,
    bus::{BusRequest, BusResponse},
    controller::{Control, DataDestSel, OpASel, OpBSel, get_control_signals},
    datapath::Datapath,
    register_file::RegisterFile,
};
use crate::isa::Instruction;

/// States of the instruction-cycle state machine.
///
/// Every bus phase is split into an issue state, which drives the request
/// lines, and a wait state, which holds them until acknowledge.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CoreState {
    #[default]
    FetchInstr,
    FetchInstrWait,
    FetchConst,
    FetchConstWait,
    Execute,
    ExecuteWithMemory,
    ExecuteWithMemoryWait,
}

impl CoreState {
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            CoreState::FetchInstrWait | CoreState::FetchConstWait | CoreState::ExecuteWithMemoryWait
        )
    }
}

/// The instruction-cycle control unit: fetch, optional constant fetch,
/// execute, optional memory access. One instruction at a time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ControlUnit {
    pub state: CoreState,
    pub pc: u16,
    pub instruction: Option<Instruction>, // Latched instruction word
    pub instruction_pc: u16,              // Address the instruction was fetched from
    pub constant: u16,                    // Latched constant word
    pub control: Control,
    pub datapath: Datapath,
    /// Holds the state machine when set. Bus lines already driven stay put.
    pub stall: bool,
    /// Number of completed instructions.
    pub retired: u64,
    /// The last instruction jumped to itself.
    pub spinning: bool,
    reset_vector: u16,
}

impl Default for ControlUnit {
    fn default() -> Self {
        Self::new(RESET_VECTOR)
    }
}

impl ControlUnit {
    pub fn new(reset_vector: u16) -> Self {
        Self {
            state: CoreState::FetchInstr,
            pc: reset_vector & !1,
            instruction: None,
            instruction_pc: reset_vector & !1,
            constant: 0,
            control: Control::default(),
            datapath: Datapath::default(),
            stall: false,
            retired: 0,
            spinning: false,
            reset_vector,
        }
    }

    /// Synchronous reset: back to the first fetch at the reset vector with
    /// any in-flight bus request dropped. The register file is untouched.
    pub fn reset(&mut self) {
        let stall = self.stall;
        *self = Self::new(self.reset_vector);
        self.stall = stall;
    }

    /// Request lines currently driven onto the bus.
    pub fn bus_request(&self) -> BusRequest {
        self.datapath.bus_o
    }

    /// Advance one clock edge, sampling the bus response for this cycle.
    pub fn clock(&mut self, registers: &mut RegisterFile, response: BusResponse) {
        if self.stall {
            trace!(state = ?self.state, "stalled");
            return;
        }
        self.datapath.bus_i = response;

        let next_state = match self.state {
            CoreState::FetchInstr => {
                self.run_bus_issue(BusRequest::read(self.pc));
                CoreState::FetchInstrWait
            }
            CoreState::FetchInstrWait if response.acknowledge => {
                self.run_bus_release();
                let instr = Instruction::from_raw(response.read_data);
                self.run_decode(instr);
                if instr.has_const() {
                    self.pc = self.pc.wrapping_add(2);
                    CoreState::FetchConst
                } else {
                    CoreState::Execute
                }
            }
            CoreState::FetchConst => {
                self.run_bus_issue(BusRequest::read(self.pc));
                CoreState::FetchConstWait
            }
            CoreState::FetchConstWait if response.acknowledge => {
                self.run_bus_release();
                self.constant = response.read_data;
                CoreState::Execute
            }
            CoreState::Execute => {
                self.run_read_registers(registers);
                self.run_operand_muxes();
                self.run_alu();
                if self.control.mem_request {
                    CoreState::ExecuteWithMemory
                } else {
                    self.run_write_back(registers);
                    CoreState::FetchInstr
                }
            }
            CoreState::ExecuteWithMemory => {
                let address = self.datapath.alu_out;
                self.run_bus_issue(if self.control.mem_write {
                    BusRequest::write(address, self.datapath.channel_b)
                } else {
                    BusRequest::read(address)
                });
                CoreState::ExecuteWithMemoryWait
            }
            CoreState::ExecuteWithMemoryWait if response.acknowledge => {
                self.run_bus_release();
                if !self.control.mem_write {
                    self.datapath.mem_rdata = response.read_data;
                }
                self.run_write_back(registers);
                CoreState::FetchInstr
            }
            waiting => waiting,
        };

        if next_state != self.state {
            trace!(from = ?self.state, to = ?next_state, pc = self.pc, "transition");
        }
        self.state = next_state;
    }

    fn run_bus_issue(&mut self, request: BusRequest) {
        self.datapath.bus_o = request;
    }

    fn run_bus_release(&mut self) {
        self.datapath.bus_o = BusRequest::idle();
    }

    fn run_decode(&mut self, instr: Instruction) {
        self.instruction = Some(instr);
        self.instruction_pc = self.pc;
        self.control = get_control_signals(instr);
        self.datapath.op_a = instr.op_a();
        self.datapath.op_b = instr.op_b();
        self.datapath.op_c = instr.op_c();
    }

    fn run_read_registers(&mut self, registers: &RegisterFile) {
        let ports = registers.read(
            self.datapath.op_a,
            self.datapath.op_b,
            self.datapath.op_c,
            self.control.rb_sel,
        );
        self.datapath.channel_a = ports.channel_a;
        self.datapath.channel_b = ports.channel_b;
        self.datapath.zero = ports.zero;
    }

    fn run_operand_muxes(&mut self) {
        self.datapath.pc_plus_2 = self.pc.wrapping_add(2);
        self.datapath.alu_op_a = match self.control.alu_op_a_sel {
            OpASel::RF => self.datapath.channel_a,
            OpASel::PC2 => self.datapath.pc_plus_2,
        };
        self.datapath.alu_op_b = match self.control.alu_op_b_sel {
            OpBSel::RF => self.datapath.channel_b,
            OpBSel::Const => self.constant,
        };
    }

    fn run_alu(&mut self) {
        let output = alu(
            self.control.alu_fn,
            self.datapath.alu_op_a,
            self.datapath.alu_op_b,
        );
        self.datapath.alu_out = output.result;
        self.datapath.alu_flags = output.flags;
    }

    fn run_pc_mux(&mut self) {
        self.datapath.branch_taken = self
            .control
            .branch
            .is_some_and(|cond| cond.taken(self.datapath.zero));
        self.datapath.next_pc = if self.datapath.branch_taken {
            self.datapath.alu_out & !1
        } else {
            self.datapath.pc_plus_2
        };
    }

    fn run_write_data_mux(&mut self) {
        self.datapath.reg_write_data = match self.control.data_dest_sel {
            DataDestSel::ALU => self.datapath.alu_out,
            DataDestSel::Memory => self.datapath.mem_rdata,
            DataDestSel::PC2 => self.datapath.pc_plus_2,
        };
    }

    fn run_write_register(&mut self, registers: &mut RegisterFile) {
        if self.control.reg_write {
            registers.write(
                self.datapath.op_b,
                self.datapath.op_c,
                self.control.rb_sel,
                self.datapath.reg_write_data,
            );
        }
    }

    /// Last step of every instruction: pick the next PC, write the result
    /// back and count the instruction as retired.
    fn run_write_back(&mut self, registers: &mut RegisterFile) {
        self.run_pc_mux();
        self.run_write_data_mux();
        self.run_write_register(registers);

        self.spinning = self.datapath.branch_taken && self.datapath.next_pc == self.instruction_pc;
        self.pc = self.datapath.next_pc;
        self.retired += 1;

        if let Some(instr) = self.instruction {
            debug!(
                "retired {instr} at {:#06x}, next pc {:#06x}",
                self.instruction_pc, self.pc
            );
        }
    }
}
