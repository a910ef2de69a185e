#![allow(non_snake_case)]

use std::collections::BTreeSet;

use super::*;
use crate::assembler::assemble;
use crate::include_test_file;
use crate::isa::{ISA, Instruction, Operands};
use bus::BusRequest;
use control_unit::CoreState;

// used to create programs at the reset vector for testing
fn populate(words: &[u16]) -> AssembledProgram {
    let mut program = AssembledProgram::new();
    for (i, &word) in words.iter().enumerate() {
        program.image.insert(RESET_VECTOR + 2 * i as u16, word);
    }
    program
}

fn reg(isa: ISA, c: u8, a: u8, b: u8) -> u16 {
    isa.build(Operands {
        a,
        b,
        c,
        constant: false,
    })
    .raw()
}

fn imm(isa: ISA, c: u8, a: u8) -> u16 {
    isa.build(Operands {
        a,
        c,
        constant: true,
        ..Default::default()
    })
    .raw()
}

fn boot(program: &AssembledProgram) -> EmulatorState {
    EmulatorState::new(program, &MachineConfig::default()).unwrap()
}

fn clock_n(state: &mut EmulatorState, cycles: usize) {
    for _ in 0..cycles {
        state.clock();
    }
}

#[test]
fn test_plain_instruction_takes_three_cycles() {
    // ADD r1, r2, r3
    let program = populate(&[reg(ISA::ADD, 1, 2, 3)]);
    let mut state = boot(&program);
    state.x[2] = 5;
    state.x[3] = 7;

    state.clock(); // issue fetch
    assert_eq!(state.core.state, CoreState::FetchInstrWait);
    assert_eq!(state.core.bus_request(), BusRequest::read(0xF000));

    state.clock(); // fetch acknowledged
    assert_eq!(state.core.state, CoreState::Execute);
    assert!(!state.core.bus_request().is_active());
    assert_eq!(state.x[1], 0);

    state.clock(); // execute and write back
    assert_eq!(state.x[1], 12);
    assert_eq!(state.pc(), 0xF002);
    assert_eq!(state.core.state, CoreState::FetchInstr);
    assert_eq!(state.core.retired, 1);
}

#[test]
fn test_constant_adds_two_cycles() {
    // ADD r1, r0, 0x1234
    let program = populate(&[imm(ISA::ADD, 1, 0), 0x1234]);
    let mut state = boot(&program);

    clock_n(&mut state, 4);
    assert_eq!(state.x[1], 0);
    assert_eq!(state.core.state, CoreState::Execute);
    assert_eq!(state.core.constant, 0x1234);

    state.clock();
    assert_eq!(state.x[1], 0x1234);
    assert_eq!(state.pc(), 0xF004);
}

#[test]
fn test_memory_access_adds_two_cycles() {
    // LD r1, 0x0010
    let program = populate(&[imm(ISA::LD, 1, 0), 0x0010]);
    let mut state = boot(&program);
    state.memory.load_word(0x0010, 0xBEEF).unwrap();

    clock_n(&mut state, 5);
    assert_eq!(state.core.state, CoreState::ExecuteWithMemory);
    clock_n(&mut state, 1);
    assert_eq!(state.core.bus_request(), BusRequest::read(0x0010));
    assert_eq!(state.x[1], 0);

    state.clock();
    assert_eq!(state.x[1], 0xBEEF);
    assert_eq!(state.pc(), 0xF004);
    assert_eq!(state.cycles, 7);
}

#[test]
fn test_writes_to_r0_are_ignored() {
    // ADD r0, r0, 5
    // MOVA r1, r0, r0
    let program = populate(&[imm(ISA::ADD, 0, 0), 5, reg(ISA::MOVA, 1, 0, 0)]);
    let mut state = boot(&program);
    state.x[1] = 0xFFFF;

    clock_n(&mut state, 8);
    assert_eq!(state.x[0], 0);
    assert_eq!(state.x.r[0], 0);
    assert_eq!(state.x[1], 0);
}

#[test]
fn test_register_write_then_read() {
    // SUB r4, r0, 1
    // XOR r5, r4, r0
    let program = populate(&[imm(ISA::SUB, 4, 0), 1, reg(ISA::XOR, 5, 4, 0)]);
    let mut state = boot(&program);

    clock_n(&mut state, 8);
    assert_eq!(state.x[4], 0xFFFF);
    assert_eq!(state.x[5], 0xFFFF);
    assert_eq!(state.pc(), 0xF006);
}

#[test]
fn test_JMP_links_return_address() {
    // JMP r7, 0xF010
    let program = populate(&[imm(ISA::JMP, 7, 0), 0xF010]);
    let mut state = boot(&program);

    clock_n(&mut state, 5);
    assert_eq!(state.pc(), 0xF010);
    assert_eq!(state.x[7], 0xF004);
    assert!(state.core.datapath.branch_taken);
    assert!(!state.is_halted());
}

#[test]
fn test_JMP_clears_target_lsb() {
    // JMP 0xF011
    let program = populate(&[imm(ISA::JMP, 0, 0), 0xF011]);
    let mut state = boot(&program);

    clock_n(&mut state, 5);
    assert_eq!(state.pc(), 0xF010);
}

#[test]
fn test_BZ() {
    // BZ r1, 0xF020
    let program = populate(&[imm(ISA::BZ, 0, 1), 0xF020]);

    let mut state = boot(&program);
    clock_n(&mut state, 5);
    assert_eq!(state.pc(), 0xF020);

    let mut state = boot(&program);
    state.x[1] = 1;
    clock_n(&mut state, 5);
    assert_eq!(state.pc(), 0xF004);
    assert!(!state.core.datapath.branch_taken);
}

#[test]
fn test_BNZ() {
    // BNZ r1, 0xF020, r6
    let program = populate(&[imm(ISA::BNZ, 6, 1), 0xF020]);

    let mut state = boot(&program);
    state.x[1] = 0x8000;
    clock_n(&mut state, 5);
    assert_eq!(state.pc(), 0xF020);
    assert_eq!(state.x[6], 0xF004);

    let mut state = boot(&program);
    clock_n(&mut state, 5);
    assert_eq!(state.pc(), 0xF004);
    // the link is written whether or not the branch is taken
    assert_eq!(state.x[6], 0xF004);
}

#[test]
fn test_store_then_load() {
    // ADD r1, r0, 0x55AA
    // ST r1, 0x0020
    // LD r2, 0x0020
    let program = populate(&[
        imm(ISA::ADD, 1, 0),
        0x55AA,
        imm(ISA::ST, 1, 0),
        0x0020,
        imm(ISA::LD, 2, 0),
        0x0020,
    ]);
    let mut state = boot(&program);

    clock_n(&mut state, 5 + 7);
    assert_eq!(state.memory.ram().get(0x0020), 0x55AA);
    assert_eq!(state.x[2], 0);

    clock_n(&mut state, 7);
    assert_eq!(state.x[2], 0x55AA);
    assert_eq!(state.pc(), 0xF00C);
}

#[test]
fn test_LDR_is_relative_to_next_instruction() {
    // LDR r3, 0xF100
    let mut program = populate(&[imm(ISA::LDR, 3, 0), 0xF100 - 0xF004]);
    program.image.insert(0xF100, 0xCAFE);
    let mut state = boot(&program);

    clock_n(&mut state, 7);
    assert_eq!(state.core.datapath.alu_out, 0xF100);
    assert_eq!(state.x[3], 0xCAFE);
}

#[test]
fn test_store_to_rom_is_acknowledged_and_ignored() {
    // ST r1, 0xF000
    let program = populate(&[imm(ISA::ST, 1, 0), 0xF000]);
    let mut state = boot(&program);
    state.x[1] = 0x1111;

    clock_n(&mut state, 7);
    assert_eq!(state.core.retired, 1);
    assert_eq!(state.memory.rom().get(0xF000), imm(ISA::ST, 1, 0));
}

#[test]
fn test_gpio_loopback() {
    let program = assemble(include_test_file!("gpio-loopback.s")).unwrap();
    let mut state = boot(&program);
    state.memory.gpio_mut().set_input(41);

    let state = state.clock_until_break(&program, &BTreeSet::new(), 1000);
    assert!(state.is_halted());
    assert_eq!(state.memory.gpio().output(), 42);
}

#[test]
fn test_undefined_subop_is_plain_alu() {
    // sub-opcode 001 with the memory/branch bit set: ADD r1, PC + 2, 0x10
    let undefined = Instruction::new(0b00000, true, true, 0b001, 1, 0);
    let program = populate(&[undefined.raw(), 0x0010]);
    let mut state = boot(&program);

    clock_n(&mut state, 5);
    assert_eq!(state.x[1], 0xF014);
    assert_eq!(state.pc(), 0xF004);
    assert_eq!(state.core.retired, 1);
}

#[test]
fn test_unmapped_access_waits_forever() {
    // LD r1, 0x9000
    let program = populate(&[imm(ISA::LD, 1, 0), 0x9000]);
    let mut state = boot(&program);
    state.x[1] = 0x7777;

    clock_n(&mut state, 1000);
    assert_eq!(state.core.state, CoreState::ExecuteWithMemoryWait);
    assert_eq!(state.core.bus_request(), BusRequest::read(0x9000));
    assert_eq!(state.core.instruction_pc, 0xF000);
    assert_eq!(state.core.retired, 0);
    assert_eq!(state.x[1], 0x7777);
}

#[test]
fn test_stall_freezes_core() {
    let program = populate(&[reg(ISA::ADD, 1, 2, 3), reg(ISA::ADD, 1, 1, 3)]);
    let mut state = boot(&program);
    state.x[3] = 1;

    clock_n(&mut state, 2);
    state.set_stall(true);
    let frozen = state.clone();
    clock_n(&mut state, 50);
    assert_eq!(state.core, frozen.core);
    assert_eq!(state.x, frozen.x);

    state.set_stall(false);
    clock_n(&mut state, 1 + 3);
    assert_eq!(state.x[1], 2);
}

#[test]
fn test_stall_holds_pending_fetch() {
    let program = populate(&[reg(ISA::ADD, 1, 2, 3)]);
    let config = MachineConfig::default().with_wait_states(2);
    let mut state = EmulatorState::new(&program, &config).unwrap();
    state.x[2] = 5;
    state.x[3] = 7;

    clock_n(&mut state, 2);
    assert_eq!(state.core.state, CoreState::FetchInstrWait);
    state.set_stall(true);
    let frozen = state.clone();
    clock_n(&mut state, 20);
    assert_eq!(state.core, frozen.core);
    assert_eq!(state.memory, frozen.memory);
    assert_eq!(state.core.bus_request(), BusRequest::read(0xF000));

    // the device picks up its wait count where it stopped
    state.set_stall(false);
    state.clock();
    assert_eq!(state.core.state, CoreState::FetchInstrWait);
    state.clock();
    assert_eq!(state.core.state, CoreState::Execute);
    assert_eq!(state.core.instruction, Some(Instruction::from_raw(program.image[&0xF000])));
    state.clock();
    assert_eq!(state.x[1], 12);
    assert_eq!(state.core.retired, 1);
}

#[test]
fn test_stall_holds_pending_memory_access() {
    // LD r2, 0x0020
    let mut program = populate(&[imm(ISA::LD, 2, 0), 0x0020]);
    program.image.insert(0x0020, 0xBEEF);
    let config = MachineConfig::default().with_wait_states(2);
    let mut state = EmulatorState::new(&program, &config).unwrap();

    // 4 + 4 for the two fetches, execute, issue, one wait state
    clock_n(&mut state, 11);
    assert_eq!(state.core.state, CoreState::ExecuteWithMemoryWait);
    assert_eq!(state.core.bus_request(), BusRequest::read(0x0020));

    state.set_stall(true);
    let frozen = state.clone();
    clock_n(&mut state, 20);
    assert_eq!(state.core, frozen.core);
    assert_eq!(state.x, frozen.x);
    assert_eq!(state.memory, frozen.memory);
    assert_eq!(state.core.bus_request(), BusRequest::read(0x0020));
    assert_eq!(state.pc(), 0xF002);

    state.set_stall(false);
    state.clock();
    assert_eq!(state.core.retired, 0);
    assert_eq!(state.x[2], 0);
    state.clock();
    assert_eq!(state.core.retired, 1);
    assert_eq!(state.x[2], 0xBEEF);
    assert_eq!(state.core.state, CoreState::FetchInstr);
    assert!(!state.core.bus_request().is_active());

    // the next request is the following fetch, not a repeat of the load
    state.clock();
    assert_eq!(state.core.bus_request(), BusRequest::read(0xF004));
    assert_eq!(state.core.retired, 1);
}

#[test]
fn test_LDR_from_rom_reaches_low_ram() {
    let program = assemble(
        "
        .org 0x0010
        .word 0x4242
        .org 0xF000
        LDR r1, 0x0010
        halt: JMP halt
        ",
    )
    .unwrap();
    assert_eq!(program.image[&0xF002], 0x0010u16.wrapping_sub(0xF004));
    let state = boot(&program);

    let state = state.clock_until_break(&program, &BTreeSet::new(), 1000);
    assert!(state.is_halted());
    assert_eq!(state.x[1], 0x4242);
}

#[test]
fn test_reset_keeps_registers() {
    let program = assemble(include_test_file!("countdown.s")).unwrap();
    let mut state = boot(&program);

    clock_n(&mut state, 20);
    let registers = state.x;
    assert_ne!(state.pc(), 0xF000);

    state.reset();
    assert_eq!(state.pc(), 0xF000);
    assert_eq!(state.core.state, CoreState::FetchInstr);
    assert!(!state.core.bus_request().is_active());
    assert_eq!(state.x, registers);

    // and runs the program again from the top
    let state = state.clock_until_break(&program, &BTreeSet::new(), 10_000);
    assert!(state.is_halted());
    assert_eq!(state.x[2], 15);
}

#[test]
fn test_countdown_program() {
    let program = assemble(include_test_file!("countdown.s")).unwrap();
    let state = boot(&program).clock_until_break(&program, &BTreeSet::new(), 10_000);

    assert!(state.is_halted());
    assert_eq!(state.x[1], 0);
    assert_eq!(state.x[2], 15);
    assert_eq!(state.pc(), 0xF010);
    // 5 + 3, five passes of 3 + 5 + 5, then the halt jump
    assert_eq!(state.cycles, 78);
    assert_eq!(state.core.retired, 2 + 5 * 3 + 1);
}

#[test]
fn test_memory_program() {
    let program = assemble(include_test_file!("memory.s")).unwrap();
    let state = boot(&program).clock_until_break(&program, &BTreeSet::new(), 10_000);

    assert!(state.is_halted());
    assert_eq!(state.x[1], 0x1234);
    assert_eq!(state.x[2], 0x1234);
    assert_eq!(state.x[3], 0x2468);
    assert_eq!(state.memory.ram().get(0x0010), 0x2468);
}

#[test]
fn test_breakpoints() {
    let program = assemble(include_test_file!("countdown.s")).unwrap();
    // SUB r1, r1, 1
    let breakpoints = BTreeSet::from([7]);

    let state = boot(&program).clock_until_break(&program, &breakpoints, 10_000);
    assert_eq!(state.pc(), 0xF008);
    assert_eq!((state.x[1], state.x[2]), (5, 5));

    let state = state.clock_until_break(&program, &breakpoints, 10_000);
    assert_eq!(state.pc(), 0xF008);
    assert_eq!((state.x[1], state.x[2]), (4, 9));
}

#[test]
fn test_clock_until_next_instruction() {
    let program = assemble(include_test_file!("countdown.s")).unwrap();
    let state = boot(&program);

    let state = state.clock_until_next_instruction(100);
    assert_eq!(state.core.retired, 1);
    assert_eq!(state.cycles, 5);
    assert_eq!(state.x[1], 5);

    let state = state.clock_until_next_instruction(100);
    assert_eq!(state.core.retired, 2);
    assert_eq!(state.cycles, 8);
}

#[test]
fn test_wait_states_stretch_every_access() {
    let program = populate(&[reg(ISA::ADD, 1, 2, 3)]);
    let config = MachineConfig::default().with_wait_states(2);
    let mut state = EmulatorState::new(&program, &config).unwrap();
    state.x[2] = 5;
    state.x[3] = 7;

    clock_n(&mut state, 4);
    assert_eq!(state.x[1], 0);
    state.clock();
    assert_eq!(state.x[1], 12);
}

#[test]
fn test_program_outside_memory_rejected() {
    let mut program = AssembledProgram::new();
    program.image.insert(0x9000, 1);
    assert!(matches!(
        EmulatorState::new(&program, &MachineConfig::default()),
        Err(MachineError::Unmapped { address: 0x9000 })
    ));
}
