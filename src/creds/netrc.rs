//! netrc(5) parsing.
//!
//! Only the subset the client needs: `machine`, `default`, `login`,
//! `password`. `account` values are skipped, `macdef` bodies are consumed
//! up to their terminating blank line as the format requires.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Login data for one machine entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetrcEntry {
    pub login: Option<String>,
    pub password: Option<String>,
}

/// A parsed netrc file.
#[derive(Debug, Clone, Default)]
pub struct Netrc {
    machines: HashMap<String, NetrcEntry>,
    default: Option<NetrcEntry>,
}

impl Netrc {
    /// Load and parse the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read. Malformed content does
    /// not error; unknown tokens are skipped.
    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Parse netrc content.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut netrc = Self::default();
        let mut current: Option<(Option<String>, NetrcEntry)> = None;

        let mut tokens = Tokens::new(content);
        while let Some(token) = tokens.next_token() {
            match token {
                "machine" => {
                    netrc.finish(current.take());
                    let name = tokens.next_token().map(str::to_string);
                    current = name.map(|n| (Some(n), NetrcEntry::default()));
                }
                "default" => {
                    netrc.finish(current.take());
                    current = Some((None, NetrcEntry::default()));
                }
                "login" => {
                    if let (Some((_, entry)), Some(value)) = (current.as_mut(), tokens.next_token())
                    {
                        entry.login = Some(value.to_string());
                    }
                }
                "password" => {
                    if let (Some((_, entry)), Some(value)) = (current.as_mut(), tokens.next_token())
                    {
                        entry.password = Some(value.to_string());
                    }
                }
                "account" => {
                    tokens.next_token();
                }
                "macdef" => {
                    tokens.next_token();
                    tokens.skip_macro_body();
                }
                _ => {}
            }
        }
        netrc.finish(current);

        netrc
    }

    /// Entry for `host`, falling back to the `default` entry.
    #[must_use]
    pub fn find(&self, host: &str) -> Option<&NetrcEntry> {
        self.machines.get(host).or(self.default.as_ref())
    }

    fn finish(&mut self, current: Option<(Option<String>, NetrcEntry)>) {
        match current {
            Some((Some(name), entry)) => {
                self.machines.insert(name, entry);
            }
            Some((None, entry)) => self.default = Some(entry),
            None => {}
        }
    }
}

/// Whitespace tokenizer that can also skip a macdef body.
struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    fn new(content: &'a str) -> Self {
        Self { rest: content }
    }

    fn next_token(&mut self) -> Option<&'a str> {
        self.rest = self.rest.trim_start();
        if self.rest.is_empty() {
            return None;
        }
        let end = self
            .rest
            .find(char::is_whitespace)
            .unwrap_or(self.rest.len());
        let (token, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(token)
    }

    /// A macro body runs to the first blank line.
    fn skip_macro_body(&mut self) {
        // Drop the remainder of the macdef line first.
        if let Some(idx) = self.rest.find('\n') {
            self.rest = &self.rest[idx + 1..];
        } else {
            self.rest = "";
            return;
        }

        let mut offset = 0;
        for line in self.rest.split_inclusive('\n') {
            offset += line.len();
            if line.trim().is_empty() {
                break;
            }
        }
        self.rest = &self.rest[offset.min(self.rest.len())..];
    }
}
