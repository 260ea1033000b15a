//! dirsync - directory synchronization client
//!
//! This crate provides the core functionality for the `dirsync` CLI tool:
//! a client that synchronizes a local directory tree against a remote
//! server, persisting sync state in an embedded SQLite journal so repeated
//! runs are incremental.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Session options and derived paths
//! - [`creds`] - Credential providers and hook points
//! - [`engine`] - Reconciliation engine seam and the local scan engine
//! - [`error`] - Error types and handling
//! - [`exclude`] - Path exclusion rules
//! - [`journal`] - The embedded sync journal
//! - [`proxy`] - Proxy parsing and auto-detection
//! - [`session`] - Sync context and session controller
//! - [`target`] - Server URL handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod creds;
pub mod engine;
pub mod error;
pub mod exclude;
pub mod journal;
pub mod proxy;
pub mod session;
pub mod target;

pub use error::{Error, Result};
