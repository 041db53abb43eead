//! Header pass: validates the input is an observation file, emits the
//! two synthetic CRINEX header lines, copies the rest of the header
//! verbatim, and extracts the per-system observable counts the rest of
//! the encoder needs.
use std::io::{BufRead, Write};

use chrono::Utc;

use crate::error::Error;
use crate::line_source::{LineEvent, LineSource};
use crate::version::{ObservableCount, RinexVersion};

const MAX_TYPE: i64 = 100;

fn field(line: &str, start: usize, len: usize) -> Option<&str> {
    line.get(start..start + len)
}

fn major_version(line: &str) -> Option<i32> {
    let head = line.get(0..9)?;
    let digits = head.split('.').next().unwrap_or(head);
    digits.trim().parse().ok()
}

/// Copies the RINEX header from `source` to `out`, returning the
/// detected version and observable counts. `out` already contains the
/// two synthetic CRINEX lines and the original version line when this
/// returns successfully.
pub fn copy_header<R: BufRead, W: Write>(
    source: &mut LineSource<R>,
    out: &mut W,
) -> Result<(RinexVersion, ObservableCount), Error> {
    let first = match source.read_line()? {
        LineEvent::Line(l) => l,
        LineEvent::EndOfFile => return Err(Error::NotRinex),
    };

    let label = field(&first, 60, 20).map(str::trim_end).unwrap_or("");
    if label != "RINEX VERSION / TYPE" {
        return Err(Error::NotRinex);
    }
    let file_type = field(&first, 20, 1).unwrap_or(" ");
    if file_type != "O" {
        return Err(Error::NotObservationFile(file_type.to_string()));
    }
    let major = major_version(&first).ok_or(Error::NotRinex)?;
    let version = RinexVersion::from_major(major).ok_or(Error::UnsupportedVersion(major))?;

    write_synthetic_lines(out, version)?;
    writeln!(out, "{}", first)?;

    let mut counts = ObservableCount::new(version);
    loop {
        let line = match source.read_line()? {
            LineEvent::Line(l) => l,
            LineEvent::EndOfFile => return Err(Error::MissingEndOfHeader),
        };
        writeln!(out, "{}", line)?;

        let label = field(&line, 60, 19).unwrap_or("");
        if version.is_v2() && label == "# / TYPES OF OBSERV" && field(&line, 5, 1) != Some(" ") {
            let n: i64 = field(&line, 0, 6)
                .unwrap_or("0")
                .trim()
                .parse()
                .unwrap_or(0);
            if n > MAX_TYPE {
                return Err(Error::TooManyObservablesV2(n as usize));
            }
            counts.set_v2(n.max(0) as usize);
        } else if !version.is_v2()
            && field(&line, 60, 19).unwrap_or("") == "SYS / # / OBS TYPES"
            && !line.is_empty()
            && field(&line, 0, 1) != Some(" ")
        {
            let sys = line.chars().next().unwrap();
            let n: i64 = field(&line, 3, 3).unwrap_or("0").trim().parse().unwrap_or(0);
            if n > MAX_TYPE {
                return Err(Error::TooManyObservables(n as usize));
            }
            counts.set_system(sys, n.max(0) as usize);
        }

        if field(&line, 60, 13).unwrap_or("") == "END OF HEADER" {
            break;
        }
    }

    Ok((version, counts))
}

fn write_synthetic_lines<W: Write>(out: &mut W, version: RinexVersion) -> Result<(), Error> {
    writeln!(
        out,
        "{:<20.20}{:<40.40}{:<20.20}",
        version.crinex_version_str(),
        "COMPACT RINEX FORMAT",
        "CRINEX VERS   / TYPE"
    )?;
    let prog = format!("rnx2crx-{}", env!("CARGO_PKG_VERSION"));
    let now = Utc::now();
    let date = now.format("%d-%b-%y %H:%M").to_string();
    writeln!(out, "{:<40.40}{:<20.20}CRINEX PROG / DATE", prog, date)?;
    Ok(())
}
