//! Per-context session configuration.

use crate::proxy::ProxyConfig;
use std::path::PathBuf;

/// Configuration attached to a sync context.
///
/// Populated once while the context is configured, read-only during the
/// reconciliation pass, and dropped with the context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Proxy the transport should use. Explicit configuration beats
    /// auto-detection; see the controller's configure step.
    pub proxy: ProxyConfig,
    /// Where the exclusion rules were loaded from, if anywhere.
    pub exclusion_path: Option<PathBuf>,
}
