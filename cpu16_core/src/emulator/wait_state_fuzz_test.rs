use std::collections::BTreeSet;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::{
    assembler::assemble,
    emulator::{EmulatorState, config::MachineConfig},
};

const ALU_MNEMONICS: [&str; 18] = [
    "ADD", "SUB", "NOR", "NAND", "ANDN", "XOR", "AND", "MOVA", "MOV", "OR", "SHL", "SHR", "SHLX",
    "SAR", "CMPEQ", "CMPULT", "CMPLT", "CMPLE",
];

// Random straight-line instructions :)
fn gen_random_instruction<R: Rng>(rng: &mut R) -> String {
    let reg = |rng: &mut R| format!("r{}", rng.random_range(0..8));
    match rng.random_range(0..4) {
        0 => {
            let instr = ALU_MNEMONICS[rng.random_range(0..ALU_MNEMONICS.len())];
            format!("{} {}, {}, {}", instr, reg(rng), reg(rng), reg(rng))
        }
        1 => {
            let instr = ALU_MNEMONICS[rng.random_range(0..ALU_MNEMONICS.len())];
            let value: i32 = rng.random_range(-0x8000..0x10000);
            format!("{} {}, {}, {}", instr, reg(rng), reg(rng), value)
        }
        2 => format!("LD {}, {}", reg(rng), 2 * rng.random_range(0..0x80)),
        3 => format!("ST {}, {}", reg(rng), 2 * rng.random_range(0..0x80)),
        _ => unreachable!(),
    }
}

#[test]
fn test_wait_states_do_not_change_results() {
    let seed = [42u8; 32];
    let mut rng = StdRng::from_seed(seed);

    let mut errors_panic = String::new();

    for i in 0..100 {
        let mut source = String::new();
        for _ in 0..rng.random_range(5..30) {
            source += &gen_random_instruction(&mut rng);
            source.push('\n');
        }
        source += "halt: JMP halt\n";

        let program = assemble(&source).unwrap_or_else(|errors| {
            panic!("Iteration {i} failed to assemble:\n{source}\n{errors:?}")
        });

        let wait_states = rng.random_range(1..5);
        let run = |config: MachineConfig| {
            EmulatorState::new(&program, &config)
                .unwrap()
                .clock_until_break(&program, &BTreeSet::new(), 100_000)
        };
        let fast = run(MachineConfig::default());
        let slow = run(MachineConfig::default().with_wait_states(wait_states));

        if !fast.is_halted() || !slow.is_halted() {
            errors_panic += &format!("Iteration {i}: did not halt\n{source}\n");
            continue;
        }

        if fast.x != slow.x {
            errors_panic += &format!(
                "Iteration {i}: registers differ with {wait_states} wait states\n{source}\n{:04X?}\n{:04X?}\n",
                fast.x.r, slow.x.r
            );
        }

        for address in (0..0x100).step_by(2) {
            let (a, b) = (fast.memory.ram().get(address), slow.memory.ram().get(address));
            if a != b {
                errors_panic += &format!(
                    "Iteration {i}: memory at {address:#06x} differs: {a:#06x} vs {b:#06x}\n{source}\n"
                );
            }
        }

        // same instructions, only stretched
        assert_eq!(fast.core.retired, slow.core.retired);
        assert!(slow.cycles > fast.cycles);
    }

    if !errors_panic.is_empty() {
        panic!("Fuzz test failed:\n{}", errors_panic);
    }
}
