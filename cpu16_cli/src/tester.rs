use clap::Args;
use color_eyre::eyre::{Result, WrapErr, eyre};
use cpu16_core::{
    assembler::assemble,
    emulator::{EmulatorState, bus::BusDevice, config::MachineConfig},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    fs::OpenOptions,
    io::prelude::*,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Final machine state a test expects. Anything left out is not checked.
#[derive(Debug, Deserialize, Serialize, Default)]
struct ExpectedState {
    #[serde(default)]
    registers: HashMap<u8, HexValue>,
    #[serde(default)]
    memory: HashMap<HexValue, HexValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gpio_output: Option<HexValue>,
}

/// A big-endian 16-bit word written as four hex digits.
#[derive(Serialize, Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(transparent)]
struct HexValue {
    #[serde(with = "hex::serde")]
    value: [u8; 2],
}

impl From<u16> for HexValue {
    fn from(word: u16) -> Self {
        HexValue {
            value: word.to_be_bytes(),
        }
    }
}

impl From<HexValue> for u16 {
    fn from(hex: HexValue) -> Self {
        u16::from_be_bytes(hex.value)
    }
}

#[derive(Args, Debug)]
#[command(about)]
/// Create scaffolding folder for a new project
pub struct NewArgs {
    /// Name of the new folder containing the scaffolding
    name: String,
}

///
/// Runs a set of tests on each input program, outputing the score for each program
///
#[derive(Args, Debug)]
#[command(about)]
pub struct TestArgs {
    /// Folder containing the programs to be simulated
    #[arg(long, default_value = "programs")]
    programs: PathBuf,

    /// Folder containing the tests to be run
    #[arg(long, default_value = "tests")]
    tests: PathBuf,

    /// Maximum number of clock cycles to simulate a program
    #[arg(short, long, default_value_t = 1_000_000)]
    timeout: usize,

    /// Machine configuration (JSON). Falls back to ./machine.json, then the built-in map
    #[arg(long)]
    config: Option<PathBuf>,
}

const EXAMPLE_JSON: &str = r##"{
    "registers": {
        "1": "002a"
    },
    "memory": {},
    "gpio_output": "002a"
}
"##;

pub fn new_project(args: NewArgs) -> Result<()> {
    // create the new project folder relative to the current directory
    let project_path = Path::new(&args.name);
    if project_path.exists() {
        return Err(eyre!("Folder {} already exists", project_path.display()));
    }
    std::fs::create_dir(project_path).wrap_err("Failed to create project directory")?;

    let programs_path = project_path.join("programs");
    std::fs::create_dir(&programs_path).wrap_err("Failed to create programs directory")?;

    // one folder per test case
    let test_path = project_path.join("tests").join("example_test");
    std::fs::create_dir_all(&test_path).wrap_err("Failed to create example test directory")?;

    std::fs::write(
        programs_path.join("example_program.s"),
        include_str!("example_program.s"),
    )
    .wrap_err("Failed to create example program")?;
    std::fs::write(test_path.join("input.txt"), "0029\n").wrap_err("Failed to create input file")?;
    std::fs::write(test_path.join("final_state.json"), EXAMPLE_JSON)
        .wrap_err("Failed to create final state file")?;

    let machine = serde_json::to_string_pretty(&MachineConfig::default())?;
    std::fs::write(project_path.join("machine.json"), machine + "\n")
        .wrap_err("Failed to create machine configuration")?;

    info!("created project in {}", project_path.display());
    Ok(())
}

/// Reads a machine configuration, falling back to `machine.json` in the
/// working directory and then to the default memory map.
pub fn load_config(path: Option<&Path>) -> Result<MachineConfig> {
    let path = match path {
        Some(path) => path,
        None if Path::new("machine.json").is_file() => Path::new("machine.json"),
        None => return Ok(MachineConfig::default()),
    };

    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&json)
        .wrap_err_with(|| format!("Failed to parse config {}", path.display()))?;
    debug!(?config, "loaded machine configuration");
    Ok(config)
}

/// Parses the GPIO input word, hex with an optional `0x` prefix.
pub fn parse_hex_word(text: &str) -> Result<u16, String> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).map_err(|e| format!("'{text}' is not a hex word: {e}"))
}

#[derive(Debug)]
struct TestCase {
    name: String,
    input: Option<u16>,
    expected_state: Option<ExpectedState>,
}

#[derive(Debug, Default)]
pub struct TestInfo {
    program_files: Vec<(String, String)>,
    pub position: usize,
    test_dirs: Vec<TestCase>,
    output_path: PathBuf,
    timeout: usize,
    config: MachineConfig,
    pub num_programs: usize,
    pub currently_testing: String,
    pub failures: Vec<String>,
}

fn read_test_case(path: &Path) -> Result<Option<TestCase>> {
    if !path.is_dir() {
        return Ok(None);
    }
    let Some(name) = path.file_stem().and_then(|name| name.to_str()) else {
        return Ok(None);
    };

    let mut test = TestCase {
        name: name.to_string(),
        input: None,
        expected_state: None,
    };

    // read files in test directory
    for entry in std::fs::read_dir(path).wrap_err("Failed to read test directory")? {
        let file_path = entry?.path();
        let Some(file_name) = file_path.file_stem().and_then(|name| name.to_str()) else {
            continue;
        };
        if !file_path.is_file() {
            continue;
        }

        if file_name.contains("input") {
            let text = std::fs::read_to_string(&file_path)?;
            test.input = Some(
                parse_hex_word(&text)
                    .map_err(|e| eyre!(e))
                    .wrap_err_with(|| format!("Bad input in {}", file_path.display()))?,
            );
        } else if file_name.contains("state") || file_name.contains("registers") {
            let json = std::fs::read_to_string(&file_path)
                .wrap_err("Failed to open expected state file.")?;
            test.expected_state = Some(parse_expected_state(&json).wrap_err_with(|| {
                format!("Failed to read {}, improperly formatted", file_path.display())
            })?);
        }
    }

    Ok(Some(test))
}

fn parse_expected_state(json: &str) -> Result<ExpectedState> {
    let expected: ExpectedState = serde_json::from_str(json)?;
    if let Some(reg) = expected.registers.keys().find(|&&reg| reg >= 8) {
        return Err(eyre!("Register r{reg} does not exist (r0-r7)"));
    }
    Ok(expected)
}

/// Compares the end of a run with what the test expects, returning the
/// actual values of everything that differs.
fn compare(expected: &ExpectedState, ending_state: &EmulatorState) -> Option<ExpectedState> {
    let mut state_diff = ExpectedState::default();

    for (&reg, &data) in &expected.registers {
        let actual = ending_state.x[reg as usize];
        if actual != u16::from(data) {
            state_diff.registers.insert(reg, actual.into());
        }
    }

    for (&address, &data) in &expected.memory {
        let actual = ending_state.memory.peek(address.into());
        if actual != Some(data.into()) {
            state_diff
                .memory
                .insert(address, actual.unwrap_or_default().into());
        }
    }

    let actual_output = ending_state.memory.gpio().output();
    if expected
        .gpio_output
        .is_some_and(|output| u16::from(output) != actual_output)
    {
        state_diff.gpio_output = Some(actual_output.into());
    }

    let pass = state_diff.registers.is_empty()
        && state_diff.memory.is_empty()
        && state_diff.gpio_output.is_none();
    (!pass).then_some(state_diff)
}

impl TestInfo {
    pub fn prepare_to_test(args: TestArgs) -> Result<Self> {
        // get (name, source) pairs from the programs folder
        let mut program_files = Vec::new();
        for entry in std::fs::read_dir(&args.programs).wrap_err("Failed to read programs directory")? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|name| name.to_str()) {
                let source = std::fs::read_to_string(&path)
                    .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
                program_files.push((name.to_string(), source));
            }
        }
        program_files.sort();

        let mut test_dirs = Vec::new();
        for entry in std::fs::read_dir(&args.tests).wrap_err("Failed to read tests dir")? {
            let path = entry?.path();
            if path.file_name().is_some_and(|name| name == "test_output") {
                continue;
            }
            if let Some(test) = read_test_case(&path)? {
                test_dirs.push(test);
            }
        }
        test_dirs.sort_by(|a, b| a.name.cmp(&b.name));

        // check that output dir exists (or create it) and is valid
        let output_path = args
            .tests
            .parent()
            .unwrap_or(Path::new("."))
            .join("test_output");
        std::fs::create_dir_all(&output_path).wrap_err("Failed to create test output directory")?;

        let tests_str: String = test_dirs.iter().map(|test| format!(",{}", test.name)).collect();

        // write header to .csv file
        let output_csv_path = output_path.join("testresults.csv");
        std::fs::write(&output_csv_path, format!("program name{}\n", tests_str))
            .wrap_err("Failed to create test output file")?;

        Ok(TestInfo {
            num_programs: program_files.len(),
            currently_testing: program_files
                .first()
                .map(|(name, _)| name.clone())
                .unwrap_or_default(),
            program_files,
            position: 0,
            test_dirs,
            output_path,
            timeout: args.timeout,
            config: load_config(args.config.as_deref())?,
            failures: Vec::new(),
        })
    }

    // tests a program against all tests and appends results to .csv file.
    pub fn test_program(&mut self) -> Result<bool> {
        // get program information
        if self.position >= self.program_files.len() {
            return Ok(false);
        }
        let (name, source) = &self.program_files[self.position];
        self.position += 1;

        let mut test_results: Vec<&str> = Vec::new();
        match assemble(source) {
            Ok(program) => {
                // run program for each test
                for test in &self.test_dirs {
                    let mut starting_state = EmulatorState::new(&program, &self.config)
                        .wrap_err_with(|| format!("Failed to load {name}"))?;
                    if let Some(input) = test.input {
                        starting_state.memory.gpio_mut().set_input(input);
                    }

                    let ending_state =
                        starting_state.clock_until_break(&program, &BTreeSet::new(), self.timeout);
                    if !ending_state.is_halted() {
                        warn!(program = %name, test = %test.name, "timed out after {} cycles", ending_state.cycles);
                    }

                    let state_diff = test
                        .expected_state
                        .as_ref()
                        .and_then(|expected| compare(expected, &ending_state));

                    let test_dir = self.output_path.join(&test.name);
                    std::fs::create_dir_all(&test_dir)
                        .wrap_err("Failed to create output subdirectory for a test")?;
                    let test_result_path = test_dir.join(name.to_owned() + "_finalstate.json");

                    match state_diff {
                        Some(state_diff) => {
                            test_results.push("false");
                            let json_string = serde_json::to_string_pretty(&state_diff)
                                .wrap_err("Couldn't convert state difference to string!")?;
                            std::fs::write(&test_result_path, json_string)
                                .wrap_err("Failed to create test output file")?;
                        }
                        None => {
                            test_results.push("true");
                            let _ = std::fs::remove_file(&test_result_path);
                        }
                    }
                }
            }
            Err(errors) => {
                for error in &errors {
                    warn!(program = %name, "{error}");
                }
                self.failures.push(format!("{name}: {} assembly error(s)", errors.len()));
                test_results.resize(self.test_dirs.len(), "error");
            }
        }

        // append results of tests to .csv file.
        let mut file = OpenOptions::new()
            .append(true)
            .open(self.output_path.join("testresults.csv"))
            .wrap_err("Failed to open testresults.csv")?;
        let results: String = test_results.iter().map(|val| format!(",{val}")).collect();
        writeln!(file, "{}{}", name, results)?;

        // return false if there are no more programs to be tested
        match self.program_files.get(self.position) {
            Some((name, _)) => {
                self.currently_testing = name.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn finish_up(&self) -> String {
        let mut summary = format!(
            "Tested {} of {} programs. The difference between ending states for failed tests can be found in: {}",
            self.position,
            self.num_programs,
            self.output_path.display()
        );
        for failure in &self.failures {
            summary.push_str("\n  ");
            summary.push_str(failure);
        }
        summary
    }
}
