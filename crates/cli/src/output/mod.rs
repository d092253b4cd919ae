//! Output formatting
//!
//! Commands print through [`Formatter`] so `--json`, `--quiet` and
//! `--no-color` behave the same everywhere.

mod formatter;

pub use formatter::Formatter;

/// Global output options
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Emit strict JSON only
    pub json: bool,
    pub no_color: bool,
    /// Suppress everything but errors
    pub quiet: bool,
}
