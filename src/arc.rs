//! Per-satellite and clock-offset differencing arcs.
//!
//! Each tracked quantity (one observable slot per satellite, plus the
//! receiver clock offset) keeps a short history of backward differences
//! up to [ARC_ORDER]. A quantity that is brand new, was blank last
//! epoch, or jumps by more than the cycle-slip threshold restarts its
//! arc from scratch and is announced with a `"3&"` marker in the
//! output.
use std::collections::{HashMap, HashSet};

use crate::split::Split;

/// Maximum backward-difference order the encoder will carry.
pub const ARC_ORDER: i32 = 3;

/// One observable's difference history for one satellite.
#[derive(Debug, Clone, Copy)]
pub struct SampleArc {
    order: i32,
    u: [i64; ARC_ORDER as usize + 1],
    l: [i64; ARC_ORDER as usize + 1],
}

impl SampleArc {
    fn fresh(value: Split) -> Self {
        let mut arc = Self {
            order: 0,
            u: [0; ARC_ORDER as usize + 1],
            l: [0; ARC_ORDER as usize + 1],
        };
        arc.u[0] = value.upper;
        arc.l[0] = value.lower;
        arc
    }
}

/// Result of differencing one sample against its prior arc.
pub struct DiffOutcome {
    /// Whether a `"3&"` reset marker must precede the printed value.
    pub reset_marker: bool,
    /// The (unnormalized) value to format and print.
    pub value: Split,
    /// The arc state to keep for the next epoch.
    pub arc: SampleArc,
}

/// Differences `value` against `previous` (the satellite's arc at the
/// end of the prior epoch, if any -- `None` covers both "new satellite"
/// and "was blank last epoch").
pub fn diff_sample(value: Split, previous: Option<&SampleArc>) -> DiffOutcome {
    let previous = match previous {
        Some(p) => p,
        None => {
            return DiffOutcome {
                reset_marker: true,
                value,
                arc: SampleArc::fresh(value),
            }
        }
    };

    let mut order = previous.order;
    if order < ARC_ORDER {
        order += 1;
    }
    let mut arc = SampleArc::fresh(value);
    arc.order = order;
    for k in 0..order as usize {
        arc.u[k + 1] = arc.u[k] - previous.u[k];
        arc.l[k + 1] = arc.l[k] - previous.l[k];
    }

    let idx = order as usize;
    if arc.u[idx].abs() > 100_000 {
        DiffOutcome {
            reset_marker: true,
            value,
            arc: SampleArc::fresh(value),
        }
    } else {
        DiffOutcome {
            reset_marker: false,
            value: Split::new(arc.u[idx], arc.l[idx]),
            arc,
        }
    }
}

/// Receiver clock offset's difference history. Unlike [SampleArc] there
/// is no cycle-slip reset: the order simply grows (capped at
/// [ARC_ORDER]) for as long as the clock field keeps appearing, and
/// resets only when the field is absent for an epoch or a full reset
/// occurs.
#[derive(Debug, Clone, Copy)]
pub struct ClockArc {
    order: i32,
    u: [i64; ARC_ORDER as usize + 1],
    l: [i64; ARC_ORDER as usize + 1],
}

impl ClockArc {
    pub fn absent() -> Self {
        Self {
            order: -1,
            u: [0; ARC_ORDER as usize + 1],
            l: [0; ARC_ORDER as usize + 1],
        }
    }

    /// Differences `value` against this arc, returning whether a
    /// `"3&"` marker is needed, the value to print, and the new arc
    /// state.
    pub fn diff(self, value: Split) -> (bool, Split, ClockArc) {
        let mut order = self.order;
        if order < ARC_ORDER {
            order += 1;
        }
        let mut arc = ClockArc {
            order,
            u: [0; ARC_ORDER as usize + 1],
            l: [0; ARC_ORDER as usize + 1],
        };
        arc.u[0] = value.upper;
        arc.l[0] = value.lower;
        if self.order >= 0 {
            for k in 0..order as usize {
                arc.u[k + 1] = arc.u[k] - self.u[k];
                arc.l[k + 1] = arc.l[k] - self.l[k];
            }
        }
        let idx = order as usize;
        (order == 0, Split::new(arc.u[idx], arc.l[idx]), arc)
    }
}

/// All differencing state that survives across epochs: the epoch
/// header line's text baseline, the clock arc, and one [SampleArc] +
/// one raw flags string per (satellite, observable) and per satellite
/// respectively.
///
/// Arcs are keyed by satellite ID rather than list position. A
/// satellite missing from one epoch keeps its entry untouched -- it is
/// not "new" if it reappears later, it simply resumes differencing
/// from wherever it left off -- mirroring the reference's satellite
/// table, which only clears a slot on a full reset, never merely
/// because one epoch omitted that satellite.
pub struct ArcStore {
    pub epoch_line: String,
    pub clock: ClockArc,
    obs_arcs: HashMap<String, Vec<Option<SampleArc>>>,
    flags: HashMap<String, String>,
    pub epoch_count: u32,
}

/// Sentinel previous-epoch-line value used on startup and after every
/// full reset. A single, never-matched character rather than an empty
/// string so the first diff after a reset runs the ordinary
/// match/space/literal comparison at every column (including column 0)
/// instead of treating the whole line as an unconditional tail-copy.
const EPOCH_LINE_SENTINEL: &str = "&";

impl ArcStore {
    pub fn new() -> Self {
        Self {
            epoch_line: EPOCH_LINE_SENTINEL.to_string(),
            clock: ClockArc::absent(),
            obs_arcs: HashMap::new(),
            flags: HashMap::new(),
            epoch_count: 0,
        }
    }

    /// Drops all differencing history. `epoch_count` seeds the periodic
    /// reset counter (0 for event/resync resets, 1 for a periodic reset
    /// since the triggering epoch itself counts).
    pub fn full_reset(&mut self, epoch_count: u32) {
        self.epoch_line = EPOCH_LINE_SENTINEL.to_string();
        self.clock = ClockArc::absent();
        self.obs_arcs.clear();
        self.flags.clear();
        self.epoch_count = epoch_count;
    }

    /// Arc for observable slot `j` of `sat_id` at the end of the prior
    /// epoch, or `None` if the satellite is new or that slot was blank.
    pub fn sat_arc(&self, sat_id: &str, j: usize) -> Option<&SampleArc> {
        self.obs_arcs.get(sat_id)?.get(j)?.as_ref()
    }

    pub fn has_sat(&self, sat_id: &str) -> bool {
        self.obs_arcs.contains_key(sat_id)
    }

    pub fn sat_flags(&self, sat_id: &str) -> Option<&str> {
        self.flags.get(sat_id).map(|s| s.as_str())
    }

    /// Folds in the per-satellite state just computed for the epoch
    /// that succeeded. `obs_arcs`/`flags` carry an entry only for
    /// satellites present in that epoch; those entries overwrite the
    /// stored ones, while satellites absent this epoch keep whatever
    /// they already had, so they resume differencing rather than
    /// restarting when they reappear. The epoch-line baseline and
    /// clock arc are single values and are always replaced outright.
    pub fn commit_epoch(
        &mut self,
        epoch_line: String,
        clock: ClockArc,
        obs_arcs: HashMap<String, Vec<Option<SampleArc>>>,
        flags: HashMap<String, String>,
    ) {
        self.epoch_line = epoch_line;
        self.clock = clock;
        self.obs_arcs.extend(obs_arcs);
        self.flags.extend(flags);
    }
}

impl Default for ArcStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks `sat_ids` for an ID occurring more than once, mirroring
/// `set_sat_table`'s double-entry scan.
pub fn find_duplicate(sat_ids: &[String]) -> Option<&String> {
    let mut seen = HashSet::new();
    for id in sat_ids {
        if !seen.insert(id.as_str()) {
            return Some(id);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_and_full_reset_use_the_epoch_line_sentinel() {
        let mut store = ArcStore::new();
        assert_eq!(store.epoch_line, "&");
        store.epoch_line = " 26  1  1  0  0  0.0000000  0 0".to_string();
        store.full_reset(0);
        assert_eq!(store.epoch_line, "&");
    }

    #[test]
    fn absent_satellite_survives_a_merge_commit() {
        let mut store = ArcStore::new();
        let mut arcs = HashMap::new();
        arcs.insert("G01".to_string(), vec![Some(SampleArc::fresh(Split::new(0, 1)))]);
        let mut flags = HashMap::new();
        flags.insert("G01".to_string(), "  ".to_string());
        store.commit_epoch("line one".to_string(), ClockArc::absent(), arcs, flags);
        assert!(store.has_sat("G01"));

        // An epoch with no satellites at all must not drop G01's arc.
        store.commit_epoch(
            "line two".to_string(),
            ClockArc::absent(),
            HashMap::new(),
            HashMap::new(),
        );
        assert!(store.has_sat("G01"));
        assert!(store.sat_arc("G01", 0).is_some());
    }

    #[test]
    fn new_satellite_gets_reset_marker() {
        let outcome = diff_sample(Split::new(0, 12345), None);
        assert!(outcome.reset_marker);
        assert_eq!(outcome.value, Split::new(0, 12345));
    }

    #[test]
    fn continuing_arc_differences_twice() {
        let first = diff_sample(Split::new(0, 100), None);
        let second = diff_sample(Split::new(0, 105), Some(&first.arc));
        assert!(!second.reset_marker);
        assert_eq!(second.value, Split::new(0, 5));
    }

    #[test]
    fn large_jump_triggers_cycle_slip_reset() {
        let first = diff_sample(Split::new(0, 100), None);
        let second = diff_sample(Split::new(200_000, 0), Some(&first.arc));
        assert!(second.reset_marker);
        assert_eq!(second.value, Split::new(200_000, 0));
    }

    #[test]
    fn clock_arc_grows_order_until_capped() {
        let mut clock = ClockArc::absent();
        let (reset0, _, arc0) = clock.diff(Split::new(0, 1000));
        assert!(reset0);
        clock = arc0;
        let (reset1, _, arc1) = clock.diff(Split::new(0, 1010));
        assert!(!reset1);
        clock = arc1;
        let (reset2, _, _) = clock.diff(Split::new(0, 1025));
        assert!(!reset2);
    }

    #[test]
    fn duplicate_detection() {
        let sats = vec!["G01".to_string(), "G02".to_string(), "G01".to_string()];
        assert_eq!(find_duplicate(&sats), Some(&"G01".to_string()));
        let sats = vec!["G01".to_string(), "G02".to_string()];
        assert_eq!(find_duplicate(&sats), None);
    }
}
