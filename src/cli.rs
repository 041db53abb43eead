//! Command-line surface and output file naming.
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::Error;

/// Compresses a RINEX observation file to Compact RINEX (CRINEX).
#[derive(Debug, Parser)]
#[command(name = "rnx2crx", version, about)]
pub struct Cli {
    /// RINEX observation file to compress. Reads standard input and
    /// writes standard output when omitted or given as "-".
    pub file: Option<PathBuf>,

    /// Overwrite the output file if it already exists.
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Force a full differencing reset every N epochs, trading file
    /// size for resilience against data loss further along the file.
    #[arg(short = 'e', long = "reset-interval", value_name = "N")]
    pub reset_interval: Option<u32>,

    /// Warn and resynchronize on strange or malformed epochs instead
    /// of stopping with an error.
    #[arg(short = 's', long)]
    pub skip_strange: bool,

    /// Delete the input file once the conversion finishes without errors.
    #[arg(short = 'd', long)]
    pub delete: bool,
}

impl Cli {
    /// Whether input/output should go through stdin/stdout rather than
    /// a named file.
    pub fn use_stdio(&self) -> bool {
        match &self.file {
            None => true,
            Some(p) => p.as_os_str() == "-",
        }
    }
}

/// Validates that `input` has one of the extensions CRINEX compression
/// is defined for (`*.??o`/`*.??O` or `*.rnx`/`*.RNX`), then derives the
/// output file name by swapping it for the corresponding CRINEX one.
pub fn derive_output_path(input: &Path) -> Result<PathBuf, Error> {
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidFileName(input.display().to_string()))?;

    let dot = name
        .rfind('.')
        .ok_or_else(|| Error::InvalidFileName(name.to_string()))?;
    let ext = &name[dot + 1..];

    let new_ext = if ext.len() == 3 && ext.ends_with('o') {
        format!("{}d", &ext[..2])
    } else if ext.len() == 3 && ext.ends_with('O') {
        format!("{}D", &ext[..2])
    } else if ext == "rnx" {
        "crx".to_string()
    } else if ext == "RNX" {
        "CRX".to_string()
    } else {
        return Err(Error::InvalidFileName(name.to_string()));
    };

    let mut out = input.to_path_buf();
    out.set_extension(new_ext);
    Ok(out)
}
