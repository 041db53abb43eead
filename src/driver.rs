//! Drives the encoder over the observation body: the header must
//! already have been copied. Walks epoch by epoch, applying the
//! periodic reset, event-record, and resynchronization policies.
use std::io::{BufRead, Write};

use log::warn;

use crate::arc::ArcStore;
use crate::differ::encode_epoch;
use crate::epoch::{EpochOutcome, EpochReader};
use crate::error::Error;
use crate::line_source::LineSource;
use crate::version::{ObservableCount, RinexVersion};

/// Tunables that come from the command line.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Force a full reset every `reset_interval` epochs; `0` disables it.
    pub reset_interval: u32,
    /// Warn and resynchronize on recoverable errors instead of aborting.
    pub skip_strange: bool,
}

/// Outcome of encoding the whole body.
#[derive(Debug, Default)]
pub struct Summary {
    pub epochs_written: u64,
    pub warnings: u64,
}

/// Encodes every epoch in `source` to `out` as CRINEX text.
pub fn run<R: BufRead, W: Write>(
    source: &mut LineSource<R>,
    out: &mut W,
    version: RinexVersion,
    mut counts: ObservableCount,
    config: &Config,
) -> Result<Summary, Error> {
    let mut reader = EpochReader::new(source, version);
    let mut store = ArcStore::new();
    let mut summary = Summary::default();

    loop {
        match reader.read_next(&mut counts) {
            Ok(EpochOutcome::EndOfStream) => break,

            Ok(EpochOutcome::Event(event)) => {
                for line in &event.output_lines {
                    writeln!(out, "{}", line)?;
                }
                store.full_reset(0);
            }

            Ok(EpochOutcome::Regular(epoch)) => {
                if config.reset_interval > 0 {
                    store.epoch_count += 1;
                    if store.epoch_count > config.reset_interval {
                        store.full_reset(1);
                    }
                }

                let line_no = source_line_no(&reader);
                let encoded = encode_epoch(&epoch, &store, version, line_no)?;
                out.write_all(encoded.text.as_bytes())?;
                store.commit_epoch(
                    encoded.epoch_line,
                    encoded.clock,
                    encoded.obs_arcs,
                    encoded.flags,
                );
                summary.epochs_written += 1;
            }

            Err(e) if config.skip_strange && e.is_recoverable() => {
                warn!("line {}", e);
                summary.warnings += 1;
                store.full_reset(0);
                reader.resync()?;
            }

            Err(e) => return Err(e),
        }
    }

    if reader.trailing_nulls() {
        warn!("null character is found at the end of file -- neglected");
        summary.warnings += 1;
    }

    Ok(summary)
}

fn source_line_no<R: BufRead>(reader: &EpochReader<'_, R>) -> u64 {
    reader.current_line_no()
}
