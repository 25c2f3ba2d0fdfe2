//! Pure path handling
//!
//! [`PurePath`] is the common currency between the transformation engine, the
//! crawl scheduler and the output directory: an immutable, ordered sequence of
//! string segments with no notion of a filesystem root.

mod pure;

pub use pure::PurePath;

/// Formats a path for log messages and prompts.
///
/// The root path is rendered as `.` so messages about the output root stay
/// readable.
pub fn fmt_path(path: &PurePath) -> String {
    format!("{}", path)
}
