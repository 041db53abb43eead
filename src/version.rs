//! RINEX version handling and per-system observable counts.
use std::collections::HashMap;

/// RINEX major revision. Fixes column offsets and several behavioral
/// flags throughout the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RinexVersion {
    V2,
    V3,
    V4,
}

impl RinexVersion {
    /// Builds a [RinexVersion] from the leading integer of the
    /// "RINEX VERSION / TYPE" header line.
    pub fn from_major(major: i32) -> Option<Self> {
        match major {
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            4 => Some(Self::V4),
            _ => None,
        }
    }

    pub fn is_v2(&self) -> bool {
        matches!(self, Self::V2)
    }

    /// CRINEX header version string synthesized by [crate::header].
    pub fn crinex_version_str(&self) -> &'static str {
        match self {
            Self::V2 => "1.0",
            Self::V3 | Self::V4 => "3.0",
        }
    }
}

/// Observables-per-satellite, as extracted by the header pass.
///
/// For RINEX 2 this is a single count shared by every satellite.
/// For RINEX 3/4 it is indexed by the GNSS system letter (`G`, `R`, `E`, ...).
#[derive(Debug, Clone)]
pub enum ObservableCount {
    V2(usize),
    Modern(HashMap<char, usize>),
}

impl ObservableCount {
    pub fn new(version: RinexVersion) -> Self {
        match version {
            RinexVersion::V2 => Self::V2(0),
            RinexVersion::V3 | RinexVersion::V4 => Self::Modern(HashMap::new()),
        }
    }

    /// Number of observables declared for `system`. `system` is ignored
    /// for RINEX 2. `None` means "undefined".
    pub fn for_system(&self, system: char) -> Option<usize> {
        match self {
            Self::V2(n) => Some(*n),
            Self::Modern(map) => map.get(&system).copied(),
        }
    }

    pub fn set_v2(&mut self, n: usize) {
        if let Self::V2(v) = self {
            *v = n;
        }
    }

    pub fn set_system(&mut self, system: char, n: usize) {
        if let Self::Modern(map) = self {
            map.insert(system, n);
        }
    }
}
