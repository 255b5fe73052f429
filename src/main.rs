use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::PathBuf;

use yao::circuit::CircuitFile;
use yao::garble::GarbledCircuit;
use yao::party::{Alice, Bob};
use yao::transport;

/// Run one party of the Yao two-party computation protocol.
#[derive(Parser, Debug)]
#[command(name = "yao")]
#[command(about = "Secure two-party circuit evaluation with garbled circuits")]
#[command(version)]
struct Args {
    /// The protocol party to run
    #[arg(value_enum)]
    party: Party,

    /// JSON circuit file (used by alice and for local table printing)
    #[arg(
        short = 'c',
        long = "circuit",
        default_value = "circuits/default.json",
        value_name = "circuit.json"
    )]
    circuit: PathBuf,

    /// Disable the oblivious-transfer sub-protocol. Testing only: the
    /// evaluator then sees both labels of each of its input wires.
    #[arg(long = "no-oblivious-transfer")]
    no_oblivious_transfer: bool,

    /// What alice prints: the evaluated truth table, or the clear garbled
    /// tables without running the protocol
    #[arg(short = 'm', value_enum, default_value = "circuit", value_name = "mode")]
    mode: PrintMode,

    /// The log level
    #[arg(
        short = 'l',
        long = "loglevel",
        value_enum,
        default_value = "warning",
        value_name = "level"
    )]
    loglevel: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Party {
    Alice,
    Bob,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PrintMode {
    Circuit,
    Table,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error | LogLevel::Critical => log::LevelFilter::Error,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.loglevel.into())
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    let ot_enabled = !args.no_oblivious_transfer;
    match args.party {
        Party::Alice => match args.mode {
            PrintMode::Circuit => {
                let mut alice =
                    Alice::connect(&args.circuit, transport::GARBLER_CONNECT, ot_enabled)?;
                alice.run()?;
            }
            PrintMode::Table => {
                let file = CircuitFile::load(&args.circuit)?;
                for circuit in &file.circuits {
                    let garbling = GarbledCircuit::garble(circuit)?;
                    garbling.print_tables(circuit);
                }
            }
        },
        Party::Bob => {
            Bob::new(ot_enabled).listen(transport::EVALUATOR_BIND)?;
        }
    }
    Ok(())
}
