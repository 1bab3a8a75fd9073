use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use file_cabinet::{
    engine::{
        FilesystemService, Logger, MemoryService, Meter, RecordService, RulesCatalog,
        ValidationMode, ValidatorBuilder,
    },
    shell::{run, Session},
};
use std::{
    fs::OpenOptions,
    io::{self, BufWriter},
    path::Path,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Main entry point for the file cabinet shell.
///
/// This function:
/// 1. Parses command-line arguments for storage, validation and decorators
/// 2. Initializes structured logging with tracing
/// 3. Loads validation profiles and opens the chosen store
/// 4. Runs the command loop over stdin/stdout
///
/// # Arguments
/// - `-v, --validation-rules default|custom`: validation profile (default: default)
/// - `-s, --storage memory|file`: record store (default: memory)
/// - `--data PATH`: data file for file storage (default: cabinet.db)
/// - `--rules PATH`: JSON validation profiles (default: validation-rules.json if present, a missing explicit path is an error)
/// - `--use-stopwatch`: log how long every store call takes
/// - `--use-logger`: append every store call to `--log-file`
///
/// # Example Usage
/// ```bash
/// cargo run -- -s file --data ./cabinet.db -v custom --use-logger
/// ```
fn main() -> Result<()> {
    let matches = Command::new("file_cabinet")
        .about("Personal record cabinet with memory and binary file storage")
        .arg(Arg::new("validation-rules")
            .short('v')
            .long("validation-rules")
            .value_name("RULES")
            .value_parser(["default", "custom"])
            .ignore_case(true)
            .default_value("default")
            .help("Validation profile applied to new and edited records"))
        .arg(Arg::new("storage")
            .short('s')
            .long("storage")
            .value_name("KIND")
            .value_parser(["memory", "file"])
            .ignore_case(true)
            .default_value("memory")
            .help("Keep records in memory or in the binary data file"))
        .arg(Arg::new("data")
            .long("data")
            .value_name("PATH")
            .default_value("cabinet.db")
            .help("Binary data file used by file storage"))
        .arg(Arg::new("rules")
            .long("rules")
            .value_name("PATH")
            .help("JSON file with the default and custom validation profiles"))
        .arg(Arg::new("use-stopwatch")
            .long("use-stopwatch")
            .action(ArgAction::SetTrue)
            .help("Measure every storage call"))
        .arg(Arg::new("use-logger")
            .long("use-logger")
            .action(ArgAction::SetTrue)
            .help("Write every storage call to the log file"))
        .arg(Arg::new("log-file")
            .long("log-file")
            .value_name("PATH")
            .default_value("cabinet.log")
            .help("Call log written by --use-logger"))
        .get_matches();

    let arg = |name: &str| matches.get_one::<String>(name).cloned().unwrap_or_default();
    let mode: ValidationMode = arg("validation-rules").parse()?;

    // Initialize structured logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let rules = RulesCatalog::resolve(matches.get_one::<String>("rules").map(Path::new))?;
    let validator = ValidatorBuilder::from_profile(rules.profile(mode)).create();

    let mut service: Box<dyn RecordService> = if arg("storage").eq_ignore_ascii_case("file") {
        let data = arg("data");
        let store = FilesystemService::open(&data, validator)
            .with_context(|| format!("cannot open data file {}", data))?;
        Box::new(store)
    } else {
        Box::new(MemoryService::new(validator))
    };
    if matches.get_flag("use-stopwatch") {
        service = Box::new(Meter::new(service));
    }
    if matches.get_flag("use-logger") {
        let path = arg("log-file");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("cannot open log file {}", path))?;
        service = Box::new(Logger::new(service, BufWriter::new(file)));
    }

    info!(%mode, storage = %arg("storage"), "file cabinet ready");
    println!("File Cabinet Application. Using {} validation rules.", mode);
    println!("Enter your command, or enter 'help' to get help.");

    let mut session = Session::new(service);
    let stdin = io::stdin();
    run(&mut session, stdin.lock(), io::stdout().lock())?;
    Ok(())
}
