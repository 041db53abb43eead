//! Epoch-by-epoch reading: header lines, event records, satellite
//! lists, and per-satellite observation records.
use crate::error::Error;
use crate::line_source::{LineEvent, LineSource};
use crate::split::{parse_fixed_point, Split, OBS_BASE};
use crate::textdiff::pad_to;
use crate::version::{ObservableCount, RinexVersion};
use std::io::BufRead;

pub const MAX_SAT: usize = 100;

/// One observable's value for one satellite: either a numeric cell with
/// its two LLI/signal-strength flag characters, or a blank cell with
/// its own (normally blank) flag characters.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Numeric(Split),
    Blank,
}

#[derive(Debug, Clone)]
pub struct SatObs {
    pub id: String,
    pub cells: Vec<Cell>,
    /// Concatenation of every cell's two flag characters, `2*cells.len()` long.
    pub flags: String,
}

#[derive(Debug, Clone)]
pub struct RegularEpoch {
    /// Normalized epoch header line text (trailing-space stripped; for
    /// RINEX 3/4 padded to at least 41 columns), used as the diff
    /// input for the epoch line itself.
    pub header_line: String,
    /// Raw clock-field substring (from its column to end of line), if
    /// the line reaches that far.
    pub clock_field: Option<String>,
    pub sats: Vec<SatObs>,
}

#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Fully formatted lines, ready to write verbatim.
    pub output_lines: Vec<String>,
}

pub enum EpochOutcome {
    Regular(RegularEpoch),
    Event(EventRecord),
    EndOfStream,
}

/// Column layout that differs between RINEX 2 and RINEX 3/4.
struct Layout {
    event: usize,
    nsat: usize,
    satlist: usize,
    clock: usize,
}

fn layout(version: RinexVersion) -> Layout {
    if version.is_v2() {
        Layout {
            event: 28,
            nsat: 29,
            satlist: 32,
            clock: 68,
        }
    } else {
        Layout {
            event: 31,
            nsat: 32,
            satlist: 41,
            clock: 41,
        }
    }
}

fn looks_like_epoch_header(line: &str, version: RinexVersion) -> bool {
    let b = line.as_bytes();
    if version.is_v2() {
        b.len() >= 29
            && b[0] == b' '
            && b.get(27) == Some(&b' ')
            && b.get(28).is_some_and(|c| c.is_ascii_digit())
            && b.get(29)
                .map_or(true, |&c| c == b' ' || c.is_ascii_digit())
    } else {
        b.first() == Some(&b'>')
    }
}

fn resync_looks_valid(line: &str, version: RinexVersion) -> bool {
    if version.is_v2() {
        let b = line.as_bytes();
        b.len() >= 29
            && b[0] == b' '
            && b.get(3) == Some(&b' ')
            && b.get(6) == Some(&b' ')
            && b.get(9) == Some(&b' ')
            && b.get(12) == Some(&b' ')
            && b.get(15) == Some(&b' ')
            && b.get(26) == Some(&b' ')
            && b.get(27) == Some(&b' ')
            && b.get(28).is_some_and(|c| c.is_ascii_digit())
            && b.get(29).is_some_and(|c| c.is_ascii_whitespace())
            && (b.len() <= 68 || b.get(70) == Some(&b'.'))
    } else {
        line.as_bytes().first() == Some(&b'>')
    }
}

pub struct EpochReader<'a, R> {
    source: &'a mut LineSource<R>,
    version: RinexVersion,
    /// A header line already consumed by [Self::resync] and not yet
    /// handed back through [Self::read_next].
    pending: Option<String>,
}

impl<'a, R: BufRead> EpochReader<'a, R> {
    pub fn new(source: &'a mut LineSource<R>, version: RinexVersion) -> Self {
        Self {
            source,
            version,
            pending: None,
        }
    }

    pub fn current_line_no(&self) -> u64 {
        self.source.line_no
    }

    pub fn trailing_nulls(&self) -> bool {
        self.source.trailing_nulls
    }

    fn read_line_checked(&mut self) -> Result<String, Error> {
        match self.source.read_line()? {
            LineEvent::Line(l) => Ok(l),
            LineEvent::EndOfFile => Err(Error::UnexpectedEof),
        }
    }

    /// Advances the line stream until a line matching the epoch-header
    /// shape is found. Used after a recoverable error to resynchronize.
    pub fn resync(&mut self) -> Result<(), Error> {
        loop {
            let line = self.read_line_checked()?;
            if resync_looks_valid(&line, self.version) {
                self.pending = Some(line);
                return Ok(());
            }
        }
    }

    /// Reads the next epoch: a header line, possibly an event record,
    /// or end of stream.
    pub fn read_next(&mut self, counts: &mut ObservableCount) -> Result<EpochOutcome, Error> {
        let line = match self.pending.take() {
            Some(l) => l,
            None => match self.source.read_line()? {
                LineEvent::Line(l) => l,
                LineEvent::EndOfFile => return Ok(EpochOutcome::EndOfStream),
            },
        };

        let line_no = self.source.line_no;
        if !looks_like_epoch_header(&line, self.version) {
            return Err(Error::BadEpochHeader(line_no, self.version));
        }

        let layout = layout(self.version);
        let event_flag = line
            .as_bytes()
            .get(layout.event)
            .and_then(|&b| (b as char).to_digit(10))
            .unwrap_or(0);

        if event_flag > 1 {
            return self.read_event(&line, counts).map(EpochOutcome::Event);
        }

        let clock_field = if line.chars().count() > layout.clock {
            Some(line.chars().skip(layout.clock).collect::<String>())
        } else {
            None
        };

        let nsat_str: String = line
            .chars()
            .skip(layout.nsat)
            .take(3)
            .collect();
        let nsat: i64 = nsat_str.trim().parse().unwrap_or(0);
        if nsat as usize > MAX_SAT {
            return Err(Error::TooManySatellites(line_no, nsat as usize));
        }
        let nsat = nsat as usize;

        // The clock field is diffed numerically (via ClockArc), not as
        // text, so it is clipped out of the line handed to the text
        // differ. RINEX 2 also carries its satellite list on this line;
        // anything past the last listed satellite (including the gap
        // before the clock column, when one exists) is clipped too.
        let mut sat_ids = Vec::with_capacity(nsat);
        let header_line = if self.version.is_v2() {
            // Cap the line-1 slice at the clock column (satlist..clock)
            // before folding in any continuation lines: a >12-satellite
            // epoch with a clock field would otherwise splice the
            // continuation satellites in after the clock digits instead
            // of overwriting them, corrupting both the satellite table
            // and the diffed header line.
            let mut satlist: String = line
                .chars()
                .skip(layout.satlist)
                .take(layout.clock - layout.satlist)
                .collect();
            if nsat > 12 {
                self.read_more_sat(nsat, &mut satlist)?;
            }
            for i in 0..nsat {
                let id: String = satlist.chars().skip(i * 3).take(3).collect();
                sat_ids.push(pad_to(&id, 3));
            }
            let prefix: String = line.chars().take(layout.satlist).collect();
            pad_to(&format!("{}{}", prefix, satlist), layout.satlist + 3 * nsat)
        } else {
            pad_to(&line, layout.clock)
        };

        let mut sats = Vec::with_capacity(nsat);
        for i in 0..nsat {
            let hint = sat_ids.get(i).cloned().unwrap_or_default();
            let sat = self.read_observation_line(&hint, counts)?;
            sat_ids_push_if_modern(self.version, &mut sat_ids, i, &sat.id);
            sats.push(sat);
        }

        if let Some(dup) = crate::arc::find_duplicate(&sat_ids) {
            return Err(Error::DuplicateSat(line_no, dup.clone()));
        }

        Ok(EpochOutcome::Regular(RegularEpoch {
            header_line,
            clock_field,
            sats,
        }))
    }

    fn read_more_sat(&mut self, nsat: usize, satlist: &mut String) -> Result<(), Error> {
        let mut remaining = nsat as i64;
        loop {
            let line = self.read_line_checked()?;
            let extra: String = if line.as_bytes().get(2) == Some(&b' ') {
                line.chars().skip(32).collect()
            } else {
                line.clone()
            };
            satlist.push_str(&extra);
            remaining -= 12;
            if remaining <= 12 {
                break;
            }
        }
        Ok(())
    }

    fn read_observation_line(
        &mut self,
        sat_id_hint: &str,
        counts: &mut ObservableCount,
    ) -> Result<SatObs, Error> {
        let mut cells = Vec::new();
        let mut flags = String::new();
        let mut sat_id = sat_id_hint.to_string();

        let mut ntype: Option<usize> = None;
        let mut remaining: usize = usize::MAX;
        let mut first_pass = true;

        loop {
            let mut line = self.read_line_checked()?;
            let line_no = self.source.line_no;

            let (record_offset, max_field, system) = if self.version.is_v2() {
                (0usize, 5usize, None)
            } else {
                let id: String = line.chars().take(3).collect();
                if first_pass {
                    sat_id = id.clone();
                }
                let sys = id.chars().next().unwrap_or(' ');
                (3usize, usize::MAX, Some(sys))
            };

            if first_pass {
                ntype = Some(if self.version.is_v2() {
                    match counts {
                        ObservableCount::V2(n) => *n,
                        _ => 0,
                    }
                } else {
                    let sys = system.unwrap();
                    match counts.for_system(sys) {
                        Some(n) => n,
                        None => return Err(Error::UndefinedGnss(line_no, sys)),
                    }
                });
                remaining = ntype.unwrap();
                first_pass = false;
            }

            let max_field = if self.version.is_v2() {
                max_field
            } else {
                remaining
            };
            let nfield = remaining.min(max_field);
            let expected_len = record_offset + 16 * nfield;
            line = pad_or_check(&line, expected_len, line_no)?;

            for j in 0..nfield {
                let start = record_offset + 16 * j;
                let chunk: String = line.chars().skip(start).take(16).collect();
                let (cell, f1, f2) = parse_cell(&chunk, line_no, self.version)?;
                cells.push(cell);
                flags.push(f1);
                flags.push(f2);
            }
            remaining -= nfield;
            if remaining == 0 {
                break;
            }
        }

        Ok(SatObs {
            id: pad_to(&sat_id, 3),
            cells,
            flags,
        })
    }

    fn read_event(
        &mut self,
        line: &str,
        counts: &mut ObservableCount,
    ) -> Result<EventRecord, Error> {
        let mut output_lines = Vec::new();
        if self.version.is_v2() {
            if line.as_bytes().get(26) == Some(&b'.') {
                return Err(Error::BadEpochHeader(self.source.line_no, self.version));
            }
            let rest: String = line.chars().skip(1).collect();
            output_lines.push(format!("&{}", rest));
            if line.chars().count() > 29 {
                let n: usize = line
                    .chars()
                    .skip(29)
                    .collect::<String>()
                    .trim()
                    .parse()
                    .unwrap_or(0);
                for _ in 0..n {
                    let l = self.read_line_checked()?;
                    if l.get(60..).unwrap_or("").trim_end() == "# / TYPES OF OBSERV"
                        && l.as_bytes().get(5) != Some(&b' ')
                    {
                        let n: i64 = l.get(0..6).unwrap_or("0").trim().parse().unwrap_or(0);
                        if n > 100 {
                            return Err(Error::TooManyObservablesV2(n as usize));
                        }
                        counts.set_v2(n.max(0) as usize);
                    }
                    output_lines.push(l.clone());
                    let _ = l;
                }
            }
        } else {
            let mut line = line.to_string();
            if line.chars().count() < 35 || line.as_bytes().get(29) == Some(&b'.') {
                return Err(Error::BadEpochHeader(self.source.line_no, self.version));
            }
            line = line.trim_end().to_string();
            let n: i64 = line.get(32..35).unwrap_or("0").trim().parse().unwrap_or(0);
            output_lines.push(line);
            for _ in 0..n.max(0) {
                let l = self.read_line_checked()?;
                if l.get(60..).unwrap_or("").trim_end() == "SYS / # / OBS TYPES"
                    && l.as_bytes().first() != Some(&b' ')
                {
                    let sys = l.chars().next().unwrap_or(' ');
                    let m: i64 = l.get(3..6).unwrap_or("0").trim().parse().unwrap_or(0);
                    if m > 100 {
                        return Err(Error::TooManyObservables(m as usize));
                    }
                    counts.set_system(sys, m.max(0) as usize);
                }
                output_lines.push(l);
            }
        }
        Ok(EventRecord { output_lines })
    }
}

fn sat_ids_push_if_modern(version: RinexVersion, sat_ids: &mut Vec<String>, i: usize, id: &str) {
    if !version.is_v2() {
        if i < sat_ids.len() {
            sat_ids[i] = id.to_string();
        } else {
            sat_ids.push(id.to_string());
        }
    }
}

fn pad_or_check(line: &str, expected_len: usize, line_no: u64) -> Result<String, Error> {
    let len = line.chars().count();
    if len < expected_len {
        Ok(pad_to(line, expected_len))
    } else {
        let tail: String = line.chars().skip(expected_len).collect();
        if tail.trim().is_empty() {
            Ok(line.chars().take(expected_len).collect())
        } else {
            Err(Error::TypeCountMismatch(line_no))
        }
    }
}

fn parse_cell(chunk: &str, line_no: u64, version: RinexVersion) -> Result<(Cell, char, char), Error> {
    let chunk = pad_to(chunk, 16);
    let bytes: Vec<char> = chunk.chars().collect();
    let f1 = bytes[14];
    let f2 = bytes[15];

    if bytes[10] == '.' {
        let int_part: String = bytes[0..10].iter().collect();
        let frac_part: String = bytes[11..14].iter().collect();
        let raw = parse_fixed_point(&int_part, &frac_part, line_no)?;
        let split = Split::from_scaled(raw, OBS_BASE);
        Ok((Cell::Numeric(split), f1, f2))
    } else if bytes[0..14].iter().all(|&c| c == ' ') {
        if version.is_v2() && (f1 != ' ' || f2 != ' ') {
            return Err(Error::BlankWithFlag(line_no));
        }
        Ok((Cell::Blank, f1, f2))
    } else {
        Err(Error::BadField(line_no))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader_over(data: &str) -> LineSource<Cursor<Vec<u8>>> {
        LineSource::new(Cursor::new(data.as_bytes().to_vec()))
    }

    /// One satellite, no clock field, matching the layout the driver
    /// tests also build against.
    fn v2_epoch_header() -> String {
        let mut header: Vec<char> = std::iter::repeat(' ').take(35).collect();
        header[28] = '0';
        for (i, c) in "  1".chars().enumerate() {
            header[29 + i] = c;
        }
        for (i, c) in "G01".chars().enumerate() {
            header[32 + i] = c;
        }
        header.into_iter().collect()
    }

    fn v2_epoch_body() -> String {
        format!("{}\n         1.234 5\n", v2_epoch_header())
    }

    #[test]
    fn v2_regular_epoch_reads_one_satellite() {
        let mut source = reader_over(&v2_epoch_body());
        let mut reader = EpochReader::new(&mut source, RinexVersion::V2);
        let mut counts = ObservableCount::new(RinexVersion::V2);
        counts.set_v2(1);

        match reader.read_next(&mut counts).unwrap() {
            EpochOutcome::Regular(epoch) => {
                assert!(epoch.clock_field.is_none());
                assert_eq!(epoch.sats.len(), 1);
                assert_eq!(epoch.sats[0].id, "G01");
                assert_eq!(epoch.sats[0].cells.len(), 1);
                assert!(matches!(epoch.sats[0].cells[0], Cell::Numeric(_)));
                assert_eq!(epoch.sats[0].flags, " 5");
            }
            _ => panic!("expected a regular epoch"),
        }
    }

    #[test]
    fn v3_regular_epoch_reads_one_satellite() {
        let mut header: Vec<char> = std::iter::repeat(' ').take(35).collect();
        header[0] = '>';
        header[31] = '0';
        for (i, c) in "  1".chars().enumerate() {
            header[32 + i] = c;
        }
        let header: String = header.into_iter().collect();
        let body = format!("{}\nG01         1.234 5\n", header);

        let mut source = reader_over(&body);
        let mut reader = EpochReader::new(&mut source, RinexVersion::V3);
        let mut counts = ObservableCount::new(RinexVersion::V3);
        counts.set_system('G', 1);

        match reader.read_next(&mut counts).unwrap() {
            EpochOutcome::Regular(epoch) => {
                assert_eq!(epoch.sats.len(), 1);
                assert_eq!(epoch.sats[0].id, "G01");
                assert_eq!(epoch.sats[0].cells.len(), 1);
                assert!(matches!(epoch.sats[0].cells[0], Cell::Numeric(_)));
            }
            _ => panic!("expected a regular epoch"),
        }
    }

    #[test]
    fn event_record_is_reported_verbatim() {
        let mut header: Vec<char> = std::iter::repeat(' ').take(35).collect();
        header[28] = '4';
        for (i, c) in "  0".chars().enumerate() {
            header[29 + i] = c;
        }
        let header: String = header.into_iter().collect();

        let mut source = reader_over(&format!("{}\n", header));
        let mut reader = EpochReader::new(&mut source, RinexVersion::V2);
        let mut counts = ObservableCount::new(RinexVersion::V2);
        counts.set_v2(1);

        match reader.read_next(&mut counts).unwrap() {
            EpochOutcome::Event(event) => {
                assert_eq!(event.output_lines.len(), 1);
                assert!(event.output_lines[0].starts_with('&'));
            }
            _ => panic!("expected an event record"),
        }
    }

    #[test]
    fn resync_skips_garbage_then_reads_the_next_epoch() {
        let input = format!("this is not an epoch header\n{}", v2_epoch_body());
        let mut source = reader_over(&input);
        let mut reader = EpochReader::new(&mut source, RinexVersion::V2);
        let mut counts = ObservableCount::new(RinexVersion::V2);
        counts.set_v2(1);

        reader.resync().unwrap();
        match reader.read_next(&mut counts).unwrap() {
            EpochOutcome::Regular(epoch) => {
                assert_eq!(epoch.sats.len(), 1);
                assert_eq!(epoch.sats[0].id, "G01");
            }
            _ => panic!("expected a regular epoch after resync"),
        }
    }

    /// Builds a 15-satellite V2 epoch (header line + one continuation
    /// line + 15 one-field observation lines), optionally carrying a
    /// receiver clock offset on the header line.
    fn fifteen_sat_v2_epoch(clock: Option<&str>) -> (String, Vec<String>) {
        let ids: Vec<String> = (1..=15).map(|n| format!("G{:02}", n)).collect();

        let base_len = 32 + 12 * 3;
        let mut header: Vec<char> = std::iter::repeat(' ')
            .take(base_len + clock.map_or(0, str::len))
            .collect();
        header[28] = '0';
        for (i, c) in " 15".chars().enumerate() {
            header[29 + i] = c;
        }
        for (i, id) in ids[..12].iter().enumerate() {
            for (j, c) in id.chars().enumerate() {
                header[32 + i * 3 + j] = c;
            }
        }
        if let Some(clock) = clock {
            for (i, c) in clock.chars().enumerate() {
                header[base_len + i] = c;
            }
        }
        let header: String = header.into_iter().collect();

        let mut continuation: Vec<char> = std::iter::repeat(' ').take(32 + 3 * 3).collect();
        for (i, id) in ids[12..].iter().enumerate() {
            for (j, c) in id.chars().enumerate() {
                continuation[32 + i * 3 + j] = c;
            }
        }
        let continuation: String = continuation.into_iter().collect();

        let obs_line = "         1.234 5\n";
        let mut body = format!("{}\n{}\n", header, continuation);
        for _ in 0..15 {
            body.push_str(obs_line);
        }
        (body, ids)
    }

    #[test]
    fn v2_fifteen_satellites_span_a_continuation_line() {
        let (body, ids) = fifteen_sat_v2_epoch(None);

        let mut source = reader_over(&body);
        let mut reader = EpochReader::new(&mut source, RinexVersion::V2);
        let mut counts = ObservableCount::new(RinexVersion::V2);
        counts.set_v2(1);

        match reader.read_next(&mut counts).unwrap() {
            EpochOutcome::Regular(epoch) => {
                assert_eq!(epoch.sats.len(), 15);
                let read_ids: Vec<&str> = epoch.sats.iter().map(|s| s.id.as_str()).collect();
                assert_eq!(read_ids, ids);
                assert!(crate::arc::find_duplicate(&read_ids.iter().map(|s| s.to_string()).collect::<Vec<_>>()).is_none());
            }
            _ => panic!("expected a regular epoch"),
        }
    }

    #[test]
    fn v2_fifteen_satellites_header_line_carries_the_continuation_satellites() {
        let (body, ids) = fifteen_sat_v2_epoch(None);
        let mut source = reader_over(&body);
        let mut reader = EpochReader::new(&mut source, RinexVersion::V2);
        let mut counts = ObservableCount::new(RinexVersion::V2);
        counts.set_v2(1);

        match reader.read_next(&mut counts).unwrap() {
            EpochOutcome::Regular(epoch) => {
                assert!(epoch.clock_field.is_none());
                // The stitched header line must carry satellites 13-15,
                // not blanks -- a decompressor reconstructs the full
                // satellite list from this line alone.
                for id in &ids[12..] {
                    assert!(
                        epoch.header_line.contains(id.as_str()),
                        "header line {:?} is missing satellite {}",
                        epoch.header_line,
                        id
                    );
                }
                let encoded =
                    crate::differ::encode_epoch(&epoch, &crate::arc::ArcStore::new(), RinexVersion::V2, 1)
                        .unwrap();
                let first_line = encoded.text.lines().next().unwrap();
                for id in &ids[12..] {
                    assert!(first_line.contains(id.as_str()));
                }
            }
            _ => panic!("expected a regular epoch"),
        }
    }

    #[test]
    fn v2_fifteen_satellites_with_a_clock_field_keeps_the_clock_separate() {
        let (body, ids) = fifteen_sat_v2_epoch(Some(" 0.123456789"));
        let mut source = reader_over(&body);
        let mut reader = EpochReader::new(&mut source, RinexVersion::V2);
        let mut counts = ObservableCount::new(RinexVersion::V2);
        counts.set_v2(1);

        match reader.read_next(&mut counts).unwrap() {
            EpochOutcome::Regular(epoch) => {
                let read_ids: Vec<&str> = epoch.sats.iter().map(|s| s.id.as_str()).collect();
                assert_eq!(read_ids, ids, "the clock digits must not be read as satellite 13");
                assert_eq!(epoch.clock_field.as_deref(), Some(" 0.123456789"));
                for id in &ids[12..] {
                    assert!(epoch.header_line.contains(id.as_str()));
                }
                assert!(!epoch.header_line.contains('.'));

                let encoded =
                    crate::differ::encode_epoch(&epoch, &crate::arc::ArcStore::new(), RinexVersion::V2, 1)
                        .unwrap();
                let mut lines = encoded.text.lines();
                let header_text = lines.next().unwrap();
                let clock_text = lines.next().unwrap();
                for id in &ids[12..] {
                    assert!(header_text.contains(id.as_str()));
                }
                assert!(clock_text.starts_with("3&"));
            }
            _ => panic!("expected a regular epoch"),
        }
    }

    #[test]
    fn end_of_stream_is_reported() {
        let mut source = reader_over("");
        let mut reader = EpochReader::new(&mut source, RinexVersion::V2);
        let mut counts = ObservableCount::new(RinexVersion::V2);
        assert!(matches!(
            reader.read_next(&mut counts).unwrap(),
            EpochOutcome::EndOfStream
        ));
    }
}
