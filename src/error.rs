//! Error taxonomy for the compressor.
use thiserror::Error;

/// Everything that can go wrong while copying a header or encoding the
/// observation body.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {0} exceeds the maximum supported length")]
    LineTooLong(u64),

    #[error("line {0} was truncated (no newline before end of file)")]
    Truncated(u64),

    #[error("input does not look like a RINEX observation file (missing \"RINEX VERSION / TYPE\" on line 1)")]
    NotRinex,

    #[error("unsupported RINEX version major {0}")]
    UnsupportedVersion(i32),

    #[error("\"END OF HEADER\" was never found")]
    MissingEndOfHeader,

    #[error("file type \"{0}\" is not an observation file (only \"O\" is supported)")]
    NotObservationFile(String),

    #[error("\"SYS / # / OBS TYPES\" declares {0} observables, which exceeds the supported maximum")]
    TooManyObservables(usize),

    #[error("\"# / TYPES OF OBSERV\" declares {0} observables, which exceeds the supported maximum")]
    TooManyObservablesV2(usize),

    #[error("unexpected end of file while reading an epoch")]
    UnexpectedEof,

    #[error("line {0}: epoch header does not match the expected RINEX {1:?} layout")]
    BadEpochHeader(u64, crate::version::RinexVersion),

    #[error("line {0}: satellite count {1} exceeds the supported maximum")]
    TooManySatellites(u64, usize),

    #[error("line {0}: satellite \"{1}\" appears twice in the same epoch")]
    DuplicateSat(u64, String),

    #[error("line {0}: no observable count is defined for GNSS system \"{1}\"")]
    UndefinedGnss(u64, char),

    #[error("line {0}: observation record does not contain the declared number of fields")]
    TypeCountMismatch(u64),

    #[error("line {0}: observation field does not match the expected layout")]
    BadField(u64),

    #[error("line {0}: blank observation value carries a non-blank LLI/strength flag")]
    BlankWithFlag(u64),

    #[error("line {0}: clock offset field is missing its decimal point")]
    BadClockFormat(u64),

    #[error("invalid file name \"{0}\": the extension should be \".??o\" or \".rnx\"")]
    InvalidFileName(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Whether an error is one the driver can recover from by resynchronizing
/// the line stream, when running with `skip_strange` enabled.
impl Error {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::BadEpochHeader(..)
                | Error::TooManySatellites(..)
                | Error::DuplicateSat(..)
                | Error::UndefinedGnss(..)
                | Error::TypeCountMismatch(..)
                | Error::BadField(..)
        )
    }
}
