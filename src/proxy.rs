//! Proxy configuration and resolution.
//!
//! Two sources feed the session's proxy setting: an explicit
//! `--httpproxy scheme://host:port` argument, or auto-detection through a
//! [`SystemProxyResolver`]. Explicit configuration always wins; resolution
//! happens once during context configuration.

use crate::target::TargetUrl;
use tracing::warn;

/// Proxy setting attached to a sync context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProxyConfig {
    /// Direct connection.
    #[default]
    None,
    /// HTTP proxy. The port is optional; transports fall back to their
    /// scheme default when it is absent.
    Http {
        host: String,
        port: Option<u16>,
    },
}

/// Parse an explicit proxy argument of the form `scheme://host:port`.
///
/// A parseable host is enough to yield a proxy; an unparseable port is
/// dropped rather than rejecting the whole argument. Anything without a
/// host falls back to [`ProxyConfig::None`].
#[must_use]
pub fn parse_proxy(raw: &str) -> ProxyConfig {
    // scheme: //host : port
    //   0        1      2
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 3 {
        warn!(proxy = raw, "malformed proxy argument, ignoring");
        return ProxyConfig::None;
    }

    let host = parts[1].trim_start_matches("//");
    if host.is_empty() {
        warn!(proxy = raw, "proxy argument has no host, ignoring");
        return ProxyConfig::None;
    }

    let port = match parts[2].parse::<u16>() {
        Ok(p) if p > 0 => Some(p),
        _ => {
            warn!(proxy = raw, "proxy port did not parse, using scheme default");
            None
        }
    };

    ProxyConfig::Http {
        host: host.to_string(),
        port,
    }
}

/// System-level proxy auto-detection.
///
/// Consulted only when no explicit proxy was given. Implementations answer
/// "what proxy would the surrounding system use for this endpoint".
pub trait SystemProxyResolver {
    fn resolve(&self, target: &TargetUrl) -> ProxyConfig;
}

/// Resolver backed by the conventional environment variables
/// (`http_proxy`, `HTTP_PROXY`, `all_proxy`), honoring `no_proxy`.
#[derive(Debug, Default)]
pub struct EnvProxyResolver;

impl SystemProxyResolver for EnvProxyResolver {
    fn resolve(&self, target: &TargetUrl) -> ProxyConfig {
        let no_proxy = std::env::var("no_proxy")
            .or_else(|_| std::env::var("NO_PROXY"))
            .ok();

        let value = ["http_proxy", "HTTP_PROXY", "all_proxy", "ALL_PROXY"]
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()));

        resolve_from_values(value.as_deref(), no_proxy.as_deref(), target.host())
    }
}

/// Core of the environment resolver, split out so it is testable without
/// mutating process environment.
fn resolve_from_values(
    proxy_value: Option<&str>,
    no_proxy: Option<&str>,
    host: &str,
) -> ProxyConfig {
    if let Some(exceptions) = no_proxy {
        let bypassed = exceptions
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .any(|entry| entry == "*" || host == entry || host.ends_with(&format!(".{entry}")));
        if bypassed {
            return ProxyConfig::None;
        }
    }

    match proxy_value {
        Some(value) => parse_proxy(value),
        None => ProxyConfig::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_proxy() {
        assert_eq!(
            parse_proxy("http://192.168.178.23:8080"),
            ProxyConfig::Http {
                host: "192.168.178.23".to_string(),
                port: Some(8080),
            }
        );
    }

    #[test]
    fn bad_port_keeps_host() {
        assert_eq!(
            parse_proxy("http://proxy.example.org:http"),
            ProxyConfig::Http {
                host: "proxy.example.org".to_string(),
                port: None,
            }
        );
    }

    #[test]
    fn missing_port_segment_is_malformed() {
        assert_eq!(parse_proxy("http://proxy.example.org"), ProxyConfig::None);
    }

    #[test]
    fn empty_host_is_malformed() {
        assert_eq!(parse_proxy("http://:8080"), ProxyConfig::None);
    }

    #[test]
    fn env_value_feeds_the_parser() {
        let config = resolve_from_values(Some("http://proxy:3128"), None, "files.example.org");
        assert_eq!(
            config,
            ProxyConfig::Http {
                host: "proxy".to_string(),
                port: Some(3128),
            }
        );
    }

    #[test]
    fn no_proxy_exception_bypasses() {
        let config = resolve_from_values(
            Some("http://proxy:3128"),
            Some("internal.test, example.org"),
            "files.example.org",
        );
        assert_eq!(config, ProxyConfig::None);
    }

    #[test]
    fn absent_env_means_direct() {
        assert_eq!(
            resolve_from_values(None, None, "files.example.org"),
            ProxyConfig::None
        );
    }
}
