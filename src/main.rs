use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};

use rawtoevent::{DecodeOptions, Decoder};

/// Turn a raw binary trace file into an ASCII event listing on stdout.
#[derive(Debug, Parser)]
#[command(name = "rawtoevent", disable_help_flag = true)]
struct Command {
    /// Raw trace file; reads stdin when omitted
    trace_file: Option<PathBuf>,

    /// Echo decode details while running
    #[arg(short = 'v')]
    verbose: bool,

    /// Prefix each event with its raw entry in hex
    #[arg(short = 'h')]
    hexevent: bool,

    /// Stop after this many blocks
    #[arg(long)]
    maxblock: Option<u64>,

    #[arg(long, action = ArgAction::Help, help = "Print help")]
    help: Option<bool>,
}

fn main() -> Result<()> {
    let opts = Command::parse();

    let decode_opts = DecodeOptions {
        verbose: opts.verbose,
        hexevent: opts.hexevent,
        maxblock: opts.maxblock.unwrap_or(u64::MAX),
    };

    let stdout = io::stdout();
    let out = BufWriter::new(stdout.lock());

    let mut decoder = Decoder::new(decode_opts);
    match &opts.trace_file {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("rawtoevent: {} did not open", path.display()))?;
            decoder.run(BufReader::new(file), out)?;
        }
        None => {
            let stdin = io::stdin();
            decoder.run(stdin.lock(), out)?;
        }
    }

    decoder.print_summary();
    Ok(())
}
