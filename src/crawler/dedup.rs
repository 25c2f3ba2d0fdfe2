//! Output path deduplication
//!
//! Two remote files can map to the same output path after transformation, and
//! names that are legal remotely may be unrepresentable on Windows. The
//! deduplicator rewrites such paths to free, representable ones and remembers
//! every path (and ancestor directory) it has handed out.

use crate::path::{fmt_path, PurePath};
use std::collections::HashSet;
use tracing::debug;

/// Characters Windows refuses in file names, plus all control characters
const FORBIDDEN_CHARS: &str = "<>:\"/\\|?*";

/// Device names Windows reserves regardless of extension
const FORBIDDEN_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Splits a file name into stem and extension. The extension includes its
/// dot; names without one (and dotfiles) have an empty extension.
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    }
}

/// Yields "name 1.ext", "name 2.ext", ... using an underscore as separator
/// when the stem contains no space.
fn name_variant(name: &str, i: u32) -> String {
    let (stem, suffix) = split_name(name);
    let separator = if stem.contains(' ') { ' ' } else { '_' };
    format!("{stem}{separator}{i}{suffix}")
}

/// Hands out unique, representable output paths
pub struct Deduplicator {
    windows_paths: bool,
    known: HashSet<PurePath>,
}

impl Deduplicator {
    pub fn new(windows_paths: bool) -> Self {
        Self {
            windows_paths,
            known: HashSet::new(),
        }
    }

    fn add(&mut self, path: &PurePath) {
        self.known.insert(path.clone());
        for ancestor in path.ancestors() {
            if ancestor.is_root() {
                break;
            }
            self.known.insert(ancestor);
        }
    }

    fn fixup_element(name: &str) -> String {
        let mut fixed: String = name
            .chars()
            .map(|c| {
                if FORBIDDEN_CHARS.contains(c) || (c as u32) < 32 {
                    '_'
                } else {
                    c
                }
            })
            .collect();

        let (stem, suffix) = split_name(&fixed);
        if FORBIDDEN_NAMES.contains(&stem) {
            fixed = format!("{stem}_{suffix}");
        }

        if fixed.ends_with(' ') || fixed.ends_with('.') {
            fixed.push('_');
        }

        fixed
    }

    fn fixup_for_windows(&self, path: &PurePath) -> PurePath {
        let fixed = PurePath::from_parts(path.parts().iter().map(|p| Self::fixup_element(p)));
        if fixed != *path {
            debug!(
                "Changed path to {} for windows compatibility",
                fmt_path(&fixed)
            );
        }
        fixed
    }

    /// Claims a path, renaming it if it is taken or unrepresentable.
    pub fn mark(&mut self, path: &PurePath) -> PurePath {
        let path = if self.windows_paths {
            self.fixup_for_windows(path)
        } else {
            path.clone()
        };

        if !self.known.contains(&path) {
            self.add(&path);
            return path;
        }

        debug!(
            "Path {} is already taken, finding a new name",
            fmt_path(&path)
        );

        let parent = path.parent();
        let name = path.name().unwrap_or_default().to_string();
        for i in 1.. {
            let variant = parent.child(&name_variant(&name, i));
            if self.known.contains(&variant) {
                continue;
            }
            debug!("Found unused path {}", fmt_path(&variant));
            self.add(&variant);
            return variant;
        }
        unreachable!("name variants are infinite")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_claim_is_unchanged() {
        let mut dedup = Deduplicator::new(false);
        assert_eq!(
            dedup.mark(&PurePath::parse("a/b.txt")),
            PurePath::parse("a/b.txt")
        );
    }

    #[test]
    fn test_duplicate_gets_numbered() {
        let mut dedup = Deduplicator::new(false);
        dedup.mark(&PurePath::parse("a/b.txt"));
        assert_eq!(
            dedup.mark(&PurePath::parse("a/b.txt")),
            PurePath::parse("a/b_1.txt")
        );
        assert_eq!(
            dedup.mark(&PurePath::parse("a/b.txt")),
            PurePath::parse("a/b_2.txt")
        );
    }

    #[test]
    fn test_duplicate_at_root_gets_numbered() {
        let mut dedup = Deduplicator::new(false);
        dedup.mark(&PurePath::parse("notes.md"));
        assert_eq!(
            dedup.mark(&PurePath::parse("notes.md")),
            PurePath::parse("notes_1.md")
        );
    }

    #[test]
    fn test_space_in_stem_uses_space_separator() {
        let mut dedup = Deduplicator::new(false);
        dedup.mark(&PurePath::parse("my file.pdf"));
        assert_eq!(
            dedup.mark(&PurePath::parse("my file.pdf")),
            PurePath::parse("my file 1.pdf")
        );
    }

    #[test]
    fn test_ancestors_count_as_taken() {
        let mut dedup = Deduplicator::new(false);
        dedup.mark(&PurePath::parse("a/b/c.txt"));
        // "a/b" was claimed as a directory, so a file named "a/b" collides
        assert_eq!(dedup.mark(&PurePath::parse("a/b")), PurePath::parse("a/b_1"));
    }

    #[test]
    fn test_windows_forbidden_chars() {
        let mut dedup = Deduplicator::new(true);
        assert_eq!(
            dedup.mark(&PurePath::parse("que?stion.txt")),
            PurePath::parse("que_stion.txt")
        );
    }

    #[test]
    fn test_windows_reserved_names() {
        let mut dedup = Deduplicator::new(true);
        assert_eq!(
            dedup.mark(&PurePath::parse("CON.txt")),
            PurePath::parse("CON_.txt")
        );
    }

    #[test]
    fn test_windows_trailing_dot_and_space() {
        let mut dedup = Deduplicator::new(true);
        assert_eq!(
            dedup.mark(&PurePath::parse("dir./file")),
            PurePath::parse("dir._/file")
        );
    }

    #[test]
    fn test_non_windows_leaves_names_alone() {
        let mut dedup = Deduplicator::new(false);
        assert_eq!(
            dedup.mark(&PurePath::parse("que?stion.txt")),
            PurePath::parse("que?stion.txt")
        );
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("a.txt"), ("a", ".txt"));
        assert_eq!(split_name("a.tar.gz"), ("a.tar", ".gz"));
        assert_eq!(split_name("noext"), ("noext", ""));
        assert_eq!(split_name(".hidden"), (".hidden", ""));
    }
}
