//! `rnx2crx`: compresses a RINEX observation file to Compact RINEX.
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::process::ExitCode;

use clap::Parser;
use log::{error, warn};

use rnx2crx::cli::{derive_output_path, Cli};
use rnx2crx::driver::{self, Config};
use rnx2crx::error::Error;
use rnx2crx::header;
use rnx2crx::line_source::LineSource;

const EXIT_SUCCESS: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_WARNING: u8 = 2;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    // Unlike clap's own default (help to stdout, exit 0), both help and
    // usage errors are treated as the same "bad invocation" outcome:
    // printed to stderr, exit 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprint!("{e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    match run(&cli) {
        Ok(warnings) => {
            if cli.delete && !cli.use_stdio() {
                if let Some(path) = &cli.file {
                    if let Err(e) = std::fs::remove_file(path) {
                        warn!("could not delete \"{}\": {}", path.display(), e);
                    }
                }
            }
            ExitCode::from(if warnings > 0 { EXIT_WARNING } else { EXIT_SUCCESS })
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(cli: &Cli) -> Result<u64, Error> {
    if cli.use_stdio() {
        let stdin = io::stdin();
        let stdout = io::stdout();
        return encode(cli, BufReader::new(stdin.lock()), BufWriter::new(stdout.lock()));
    }

    let input_path = cli.file.as_ref().expect("file is Some when not use_stdio");
    let output_path = derive_output_path(input_path)?;

    if output_path.exists() && !cli.force {
        eprint!(
            "The file {} already exists. Overwrite?(n) ",
            output_path.display()
        );
        io::stderr().flush().ok();
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if !answer.trim_start().starts_with(['y', 'Y']) {
            return Ok(0);
        }
    }

    let input = File::open(input_path)?;
    let output = File::create(&output_path)?;
    encode(cli, BufReader::new(input), BufWriter::new(output))
}

fn encode<R: Read, W: Write>(cli: &Cli, reader: BufReader<R>, mut writer: W) -> Result<u64, Error> {
    let mut source = LineSource::new(reader);
    let (version, counts) = header::copy_header(&mut source, &mut writer)?;
    let config = Config {
        reset_interval: cli.reset_interval.unwrap_or(0),
        skip_strange: cli.skip_strange,
    };
    let summary = driver::run(&mut source, &mut writer, version, counts, &config)?;
    writer.flush()?;
    Ok(summary.warnings)
}
