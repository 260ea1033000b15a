//! Configuration management.
//!
//! Resolves the paths the client derives rather than takes on the command
//! line (the journal under the source directory, `~/.netrc`), and defines
//! [`SessionOptions`], the owned options struct handed to the session
//! controller. Every stage reads configuration from that struct; there is
//! no process-wide options state.

use crate::target::TargetUrl;
use std::path::{Path, PathBuf};

/// File name of the sync journal inside the source directory.
pub const JOURNAL_FILE_NAME: &str = ".dirsync_journal.db";

/// Path of the journal for a given source directory.
#[must_use]
pub fn journal_path(source_dir: &Path) -> PathBuf {
    source_dir.join(JOURNAL_FILE_NAME)
}

/// Path of the netrc file consulted by `-n`.
///
/// Priority:
/// 1. `NETRC` environment variable
/// 2. `~/.netrc`
#[must_use]
pub fn netrc_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("NETRC") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".netrc"))
}

/// Everything one sync session needs to know, resolved once at startup and
/// passed by ownership into the controller.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Local directory to synchronize.
    pub source_dir: PathBuf,
    /// Remote endpoint, already parsed and stripped of credentials.
    pub target: TargetUrl,
    /// Login name from `--user` or the URL.
    pub user: Option<String>,
    /// Password from `--password` or the URL.
    pub password: Option<String>,
    /// Raw `--httpproxy` argument, parsed during context configuration.
    pub proxy: Option<String>,
    /// Exclusion-list file from `--exclude`.
    pub exclude_file: Option<PathBuf>,
    /// Trust the server certificate chain (`--trust`).
    pub trust_ssl: bool,
    /// Read login data from netrc (`-n`).
    pub use_netrc: bool,
    /// Whether missing credentials may be prompted for.
    pub interactive: bool,
    /// Reduced output (`--silent`).
    pub silent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_lives_under_the_source_dir() {
        let path = journal_path(Path::new("/data/photos"));
        assert_eq!(path, PathBuf::from("/data/photos/.dirsync_journal.db"));
    }

    #[test]
    fn netrc_path_resolves() {
        // Either the env override or a home directory must yield a path on
        // any machine the tests run on.
        assert!(netrc_path().is_some());
    }
}
