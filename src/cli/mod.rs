//! CLI definitions using clap.

use crate::config::SessionOptions;
use crate::error::{Error, Result};
use crate::target::TargetUrl;
use clap::Parser;
use std::path::PathBuf;

/// dirsync - command line directory synchronization client
///
/// A proxy can either be set manually using --httpproxy. Otherwise the
/// proxy configured in the environment is used.
#[derive(Parser, Debug)]
#[command(name = "dirsync", version, about, long_about = None)]
pub struct Cli {
    /// Local directory to synchronize
    pub source_dir: PathBuf,

    /// Remote server URL (scheme://host[:port][/path])
    pub server_url: String,

    /// Don't be so verbose
    #[arg(short = 's', long)]
    pub silent: bool,

    /// Specify a http proxy to use (http://server:port)
    #[arg(long = "httpproxy", value_name = "PROXY", env = "DIRSYNC_PROXY")]
    pub httpproxy: Option<String>,

    /// Trust the SSL certification
    #[arg(long)]
    pub trust: bool,

    /// Exclude list file
    #[arg(long, value_name = "FILE")]
    pub exclude: Option<PathBuf>,

    /// Use [name] as the login name
    #[arg(short = 'u', long, value_name = "NAME", env = "DIRSYNC_USER")]
    pub user: Option<String>,

    /// Use [pass] as password
    #[arg(short = 'p', long, value_name = "PASS", env = "DIRSYNC_PASSWORD")]
    pub password: Option<String>,

    /// Use netrc (5) for login
    #[arg(short = 'n')]
    pub netrc: bool,

    /// Do not block execution with interaction
    #[arg(long)]
    pub non_interactive: bool,
}

impl Cli {
    /// Resolve the parsed arguments into session options.
    ///
    /// # Errors
    ///
    /// Returns an error when the source directory does not exist or the
    /// server URL does not parse.
    pub fn into_session_options(self) -> Result<SessionOptions> {
        if !self.source_dir.exists() {
            return Err(Error::SourceDirMissing {
                path: self.source_dir,
            });
        }

        let target = TargetUrl::parse(&self.server_url)?;

        Ok(SessionOptions {
            source_dir: self.source_dir,
            target,
            user: self.user,
            password: self.password,
            proxy: self.httpproxy,
            exclude_file: self.exclude,
            trust_ssl: self.trust,
            use_netrc: self.netrc,
            interactive: !self.non_interactive,
            silent: self.silent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("dirsync").chain(args.iter().copied()))
    }

    #[test]
    fn positionals_are_required() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["/tmp"]).is_err());
        assert!(parse(&["/tmp", "https://files.example.org/"]).is_ok());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(parse(&["/tmp", "https://files.example.org/", "--frobnicate"]).is_err());
    }

    #[test]
    fn flags_parse() {
        let cli = parse(&[
            "-s",
            "--httpproxy",
            "http://proxy:8080",
            "--trust",
            "--exclude",
            "excl.lst",
            "-u",
            "alice",
            "-p",
            "s3cret",
            "-n",
            "--non-interactive",
            "/tmp",
            "https://files.example.org/dav",
        ])
        .unwrap();

        assert!(cli.silent);
        assert_eq!(cli.httpproxy.as_deref(), Some("http://proxy:8080"));
        assert!(cli.trust);
        assert_eq!(cli.exclude.as_deref(), Some(std::path::Path::new("excl.lst")));
        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert_eq!(cli.password.as_deref(), Some("s3cret"));
        assert!(cli.netrc);
        assert!(cli.non_interactive);
    }

    #[test]
    fn options_require_an_existing_source_dir() {
        let cli = parse(&["/definitely/not/here", "https://files.example.org/"]).unwrap();
        assert!(matches!(
            cli.into_session_options(),
            Err(Error::SourceDirMissing { .. })
        ));
    }

    #[test]
    fn options_resolve_from_valid_input() {
        let dir = TempDir::new().unwrap();
        let dir_arg = dir.path().to_str().unwrap();
        let cli = parse(&[dir_arg, "https://bob:pw@files.example.org/dav"]).unwrap();

        let options = cli.into_session_options().unwrap();
        assert_eq!(options.target.host(), "files.example.org");
        assert_eq!(options.target.username(), Some("bob"));
        assert!(options.interactive);
        assert!(!options.use_netrc);
    }

    #[test]
    fn bad_url_is_rejected() {
        let dir = TempDir::new().unwrap();
        let dir_arg = dir.path().to_str().unwrap();
        let cli = parse(&[dir_arg, "files.example.org/dav"]).unwrap();
        assert!(matches!(
            cli.into_session_options(),
            Err(Error::InvalidServerUrl { .. })
        ));
    }
}
