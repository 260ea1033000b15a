//! Path exclusion rules.
//!
//! An exclusion file holds one pattern per line; blank lines and `#`
//! comments are skipped. Patterns support `*` and `?` wildcards and match
//! against both the file name and the path relative to the sync root. A
//! trailing `/` restricts a pattern to directories. Failing to load the
//! file is non-fatal to the session; the caller logs and continues.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// One exclusion pattern.
#[derive(Debug, Clone)]
struct Pattern {
    glob: String,
    dir_only: bool,
}

/// The set of exclusion rules attached to a sync context.
#[derive(Debug, Clone, Default)]
pub struct ExcludeList {
    patterns: Vec<Pattern>,
}

impl ExcludeList {
    /// Load patterns from an exclusion file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn load(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut list = Self::default();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            list.add(trimmed);
        }

        debug!(file = %path.display(), patterns = list.len(), "exclusion list loaded");
        Ok(list)
    }

    /// Add a single pattern.
    pub fn add(&mut self, pattern: &str) {
        let (glob, dir_only) = match pattern.strip_suffix('/') {
            Some(stripped) => (stripped, true),
            None => (pattern, false),
        };
        if glob.is_empty() {
            return;
        }
        self.patterns.push(Pattern {
            glob: glob.to_string(),
            dir_only,
        });
    }

    /// Whether a path (relative to the sync root) is excluded.
    #[must_use]
    pub fn is_excluded(&self, relative: &str, is_dir: bool) -> bool {
        let name = relative.rsplit('/').next().unwrap_or(relative);

        self.patterns.iter().any(|p| {
            if p.dir_only && !is_dir {
                return false;
            }
            glob_match(&p.glob, name) || glob_match(&p.glob, relative)
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Wildcard match: `*` spans any run of characters, `?` exactly one.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn literal_and_wildcard_patterns() {
        let mut list = ExcludeList::default();
        list.add("*.tmp");
        list.add("Thumbs.db");

        assert!(list.is_excluded("notes/draft.tmp", false));
        assert!(list.is_excluded("Thumbs.db", false));
        assert!(!list.is_excluded("notes/draft.txt", false));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let mut list = ExcludeList::default();
        list.add("file?.log");

        assert!(list.is_excluded("file1.log", false));
        assert!(!list.is_excluded("file12.log", false));
    }

    #[test]
    fn dir_only_patterns_skip_files() {
        let mut list = ExcludeList::default();
        list.add("build/");

        assert!(list.is_excluded("build", true));
        assert!(!list.is_excluded("build", false));
    }

    #[test]
    fn matches_full_relative_path() {
        let mut list = ExcludeList::default();
        list.add("vendor/*");

        assert!(list.is_excluded("vendor/lib.rs", false));
        assert!(!list.is_excluded("src/lib.rs", false));
    }

    #[test]
    fn loads_file_skipping_comments_and_blanks() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# editor droppings").unwrap();
        writeln!(file, "*.swp").unwrap();
        writeln!(file).unwrap();
        writeln!(file, ".git/").unwrap();

        let list = ExcludeList::load(file.path()).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.is_excluded("main.rs.swp", false));
        assert!(list.is_excluded(".git", true));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ExcludeList::load(Path::new("/no/such/excludes")).is_err());
    }
}
