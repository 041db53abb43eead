//! Per-epoch encoding: combines the text differ, per-satellite sample
//! arcs, and the clock arc into one epoch's CRINEX text.
//!
//! Nothing here mutates [ArcStore]; [encode_epoch] computes the next
//! state alongside the text and hands both back, so the driver only
//! commits it once the whole epoch is known to have been read and
//! encoded successfully.
use std::collections::HashMap;

use crate::arc::{diff_sample, ArcStore, ClockArc, SampleArc, ARC_ORDER};
use crate::epoch::{Cell, RegularEpoch};
use crate::error::Error;
use crate::split::{format_diff, parse_fixed_point, Split, CLOCK_BASE, OBS_BASE};
use crate::textdiff::diff_line;
use crate::version::RinexVersion;

fn clock_fraction_width(version: RinexVersion) -> usize {
    if version.is_v2() {
        9
    } else {
        12
    }
}

/// Parses the raw clock-field substring into a [Split]. The field is 2
/// integer digits, a decimal point, and a version-dependent number of
/// fractional digits; the sign may occupy either of the 2 integer
/// columns.
fn parse_clock(raw: &str, version: RinexVersion, line_no: u64) -> Result<Split, Error> {
    let chars: Vec<char> = raw.chars().collect();
    let frac_len = clock_fraction_width(version);
    if chars.len() < 3 + frac_len || chars[2] != '.' {
        return Err(Error::BadClockFormat(line_no));
    }
    let int_part: String = chars[0..2].iter().collect();
    let frac_part: String = chars[3..3 + frac_len].iter().collect();
    let raw_value = parse_fixed_point(&int_part, &frac_part, line_no)?;
    Ok(Split::from_scaled(raw_value, CLOCK_BASE))
}

/// Maps every space in `s` to `&`, passing every other character
/// through unchanged. Used for a brand new RINEX 3/4 satellite's
/// flags, which are announced rather than diffed.
fn mark_spaces(s: &str) -> String {
    s.chars().map(|c| if c == ' ' { '&' } else { c }).collect()
}

/// The text produced for one epoch, plus the differencing state that
/// should replace [ArcStore]'s current one if the caller accepts it.
pub struct EncodedEpoch {
    pub text: String,
    pub epoch_line: String,
    pub clock: ClockArc,
    pub obs_arcs: HashMap<String, Vec<Option<SampleArc>>>,
    pub flags: HashMap<String, String>,
}

/// Encodes one regular epoch against `store`'s current history.
pub fn encode_epoch(
    epoch: &RegularEpoch,
    store: &ArcStore,
    version: RinexVersion,
    line_no: u64,
) -> Result<EncodedEpoch, Error> {
    let mut text = String::new();

    text.push_str(&diff_line(&store.epoch_line, &epoch.header_line));
    text.push('\n');

    let (clock_text, clock_arc) = match &epoch.clock_field {
        Some(raw) => {
            let value = parse_clock(raw, version, line_no)?;
            let (reset, printed, arc) = store.clock.diff(value);
            let mut out = String::new();
            if reset {
                out.push_str(&format!("{}&", ARC_ORDER));
            }
            out.push_str(&format_diff(printed, CLOCK_BASE));
            (out, arc)
        }
        None => (String::new(), ClockArc::absent()),
    };
    text.push_str(&clock_text);
    text.push('\n');

    let mut obs_arcs = HashMap::with_capacity(epoch.sats.len());
    let mut flags_out = HashMap::with_capacity(epoch.sats.len());

    for sat in &epoch.sats {
        let is_new = !store.has_sat(&sat.id);

        // RINEX 2 only: a field blank this epoch for a satellite seen
        // last epoch blanks the corresponding two flag columns of the
        // stored baseline before diffing, without persisting the
        // change into the next baseline.
        let mut flag_baseline: Option<Vec<char>> = if is_new {
            None
        } else {
            Some(
                store
                    .sat_flags(&sat.id)
                    .unwrap_or("")
                    .chars()
                    .collect(),
            )
        };

        let mut arcs = Vec::with_capacity(sat.cells.len());
        for (j, cell) in sat.cells.iter().enumerate() {
            match cell {
                Cell::Numeric(value) => {
                    let previous = if is_new { None } else { store.sat_arc(&sat.id, j) };
                    let outcome = diff_sample(*value, previous);
                    if outcome.reset_marker {
                        text.push_str(&format!("{}&", ARC_ORDER));
                    }
                    text.push_str(&format_diff(outcome.value, OBS_BASE));
                    arcs.push(Some(outcome.arc));
                }
                Cell::Blank => {
                    if !is_new && version.is_v2() {
                        if let Some(baseline) = flag_baseline.as_mut() {
                            if baseline.len() > 2 * j + 1 {
                                baseline[2 * j] = ' ';
                                baseline[2 * j + 1] = ' ';
                            }
                        }
                    }
                    arcs.push(None);
                }
            }
            if j + 1 < sat.cells.len() {
                text.push(' ');
            }
        }
        text.push(' ');

        let flags_diff = if is_new {
            if version.is_v2() {
                diff_line("", &sat.flags)
            } else {
                mark_spaces(&sat.flags)
            }
        } else {
            let baseline: String = flag_baseline.unwrap_or_default().into_iter().collect();
            diff_line(&baseline, &sat.flags)
        };
        text.push_str(&flags_diff);
        text.push('\n');

        obs_arcs.insert(sat.id.clone(), arcs);
        flags_out.insert(sat.id.clone(), sat.flags.clone());
    }

    Ok(EncodedEpoch {
        text,
        epoch_line: epoch.header_line.clone(),
        clock: clock_arc,
        obs_arcs,
        flags: flags_out,
    })
}
