mod tester;
mod ui;

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use cpu16_core::{
    assembler::{AssembledProgram, assemble},
    emulator::EmulatorState,
    isa::Instruction,
};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};
use tracing_subscriber::EnvFilter;

use tester::{NewArgs, TestArgs, TestInfo, load_config, new_project, parse_hex_word};

/// Assembler, simulator and test runner for the 16-bit core
#[derive(Parser, Debug)]
#[command(version, about)]
struct Arguments {
    /// More logging on stderr, repeat for more detail
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    New(NewArgs),
    Asm(AsmArgs),
    Run(RunArgs),
    Test(TestArgs),
}

#[derive(Args, Debug)]
#[command(about)]
/// Assemble a program and print its listing
struct AsmArgs {
    /// Assembly source file
    file: PathBuf,
}

#[derive(Args, Debug)]
#[command(about)]
/// Run a program until it halts, hits a breakpoint or runs out of cycles
struct RunArgs {
    /// Assembly source file
    file: PathBuf,

    /// Machine configuration (JSON). Falls back to ./machine.json, then the built-in map
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum number of clock cycles to simulate
    #[arg(long, default_value_t = 1_000_000)]
    max_cycles: usize,

    /// Stop before executing the instruction on this source line
    #[arg(long = "break", value_name = "LINE")]
    breakpoints: Vec<usize>,

    /// Value driven on the GPIO input port, in hex
    #[arg(long, value_parser = parse_hex_word)]
    input: Option<u16>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Arguments::parse();
    init_logging(args.verbose);

    match args.command {
        Command::New(new_args) => new_project(new_args),
        Command::Asm(asm_args) => print_listing(asm_args),
        Command::Run(run_args) => run_program(run_args),
        Command::Test(test_args) => run_tests(test_args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn assemble_file(path: &Path) -> Result<(String, AssembledProgram)> {
    let source = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let program = assemble(&source).map_err(|errors| {
        let report: Vec<String> = errors.iter().map(|error| error.to_string()).collect();
        eyre!(
            "Failed to assemble {}:\n{}",
            path.display(),
            report.join("\n")
        )
    })?;
    Ok((source, program))
}

fn print_listing(args: AsmArgs) -> Result<()> {
    let (source, program) = assemble_file(&args.file)?;
    let lines: Vec<&str> = source.lines().collect();

    for (address, word, line) in program.listing() {
        match line {
            Some(line) => println!(
                "{address:04X}: {word:04X}  {:<24} {line:>4} | {}",
                Instruction::from_raw(word).to_string(),
                lines.get(line - 1).map_or("", |text| text.trim())
            ),
            None => println!("{address:04X}: {word:04X}"),
        }
    }

    let mut symbols: Vec<_> = program.symbol_table.iter().collect();
    symbols.sort_by_key(|(_, value)| **value);
    if !symbols.is_empty() {
        println!();
        for (name, value) in symbols {
            println!("{value:04X}  {name}");
        }
    }
    Ok(())
}

fn run_program(args: RunArgs) -> Result<()> {
    let (_, program) = assemble_file(&args.file)?;
    let config = load_config(args.config.as_deref())?;

    let mut state =
        EmulatorState::new(&program, &config).wrap_err("Failed to load program into memory")?;
    if let Some(input) = args.input {
        state.memory.gpio_mut().set_input(input);
    }

    let breakpoints: BTreeSet<usize> = args.breakpoints.into_iter().collect();
    let state = state.clock_until_break(&program, &breakpoints, args.max_cycles);

    let breakpoint_line = program
        .source_map
        .get_by_left(&state.pc())
        .filter(|line| breakpoints.contains(*line));
    match (state.is_halted(), breakpoint_line) {
        (true, _) => println!("Halted"),
        (false, Some(line)) => println!("Breakpoint at line {line}"),
        (false, None) => println!("Stopped after {} cycles", args.max_cycles),
    }

    println!("pc:      {:04X}", state.pc());
    println!("cycles:  {}", state.cycles);
    println!("retired: {}", state.core.retired);
    for reg in 0..8 {
        println!("r{reg}:      {:04X}", state.x[reg]);
    }
    println!("gpio:    {:04X}", state.memory.gpio().output());
    Ok(())
}

fn run_tests(args: TestArgs) -> Result<()> {
    let mut info = TestInfo::prepare_to_test(args)?;

    let mut terminal = ratatui::init();
    let result = ui::run(&mut terminal, &mut info);
    ratatui::restore();

    if !result? {
        println!("Aborted");
    }
    println!("{}", info.finish_up());
    Ok(())
}
