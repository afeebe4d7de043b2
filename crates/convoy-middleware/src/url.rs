//! LCM provider URLs.
//!
//! ```text
//! provider://network?option=value&option=value
//! ```
//!
//! | Provider | Network | Options |
//! |---|---|---|
//! | `udpm` | `group:port` (IPv4 multicast) | `ttl` (0–255, default 0), `recv_buf_size` (bytes) |
//! | `memq` | – | – |
//!
//! An empty URL resolves to `$LCM_DEFAULT_URL`, falling back to
//! [`DEFAULT_URL`]. With `ttl=0` datagrams never leave the host.

use std::net::Ipv4Addr;

use convoy_types::{ConvoyError, Result};
use tracing::warn;

/// Bus used by every convoy program unless told otherwise.
pub const DEFAULT_URL: &str = "udpm://239.255.76.67:7667?ttl=0";

/// Environment variable consulted when an empty URL is given.
pub const DEFAULT_URL_ENV: &str = "LCM_DEFAULT_URL";

/// Parameters of the UDP multicast provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpmParams {
    pub group: Ipv4Addr,
    pub port: u16,
    pub ttl: u8,
    pub recv_buf_size: Option<usize>,
}

/// A parsed provider URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderUrl {
    Udpm(UdpmParams),
    Memq,
}

impl ProviderUrl {
    /// Parse `url`, resolving the empty string to the default bus.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            let fallback = std::env::var(DEFAULT_URL_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_URL.to_string());
            return Self::parse_explicit(&fallback);
        }
        Self::parse_explicit(url)
    }

    fn parse_explicit(url: &str) -> Result<Self> {
        let (provider, rest) = url
            .split_once("://")
            .ok_or_else(|| ConvoyError::InvalidUrl(format!("missing '://' in '{url}'")))?;
        let (network, query) = match rest.split_once('?') {
            Some((network, query)) => (network, query),
            None => (rest, ""),
        };

        match provider {
            "udpm" => parse_udpm(url, network, query).map(ProviderUrl::Udpm),
            "memq" => {
                for (key, _) in options(query) {
                    warn!(option = key, "ignoring option not understood by memq://");
                }
                Ok(ProviderUrl::Memq)
            }
            other => Err(ConvoyError::InvalidUrl(format!(
                "unsupported provider '{other}' in '{url}'"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderUrl::Udpm(p) => {
                write!(f, "udpm://{}:{}?ttl={}", p.group, p.port, p.ttl)?;
                if let Some(size) = p.recv_buf_size {
                    write!(f, "&recv_buf_size={size}")?;
                }
                Ok(())
            }
            ProviderUrl::Memq => write!(f, "memq://"),
        }
    }
}

fn options(query: &str) -> impl Iterator<Item = (&str, &str)> {
    query
        .split('&')
        .filter(|kv| !kv.is_empty())
        .map(|kv| kv.split_once('=').unwrap_or((kv, "")))
}

fn parse_udpm(url: &str, network: &str, query: &str) -> Result<UdpmParams> {
    let (default_group, default_port) = ("239.255.76.67", "7667");
    let (group, port) = if network.is_empty() {
        (default_group, default_port)
    } else {
        network.rsplit_once(':').ok_or_else(|| {
            ConvoyError::InvalidUrl(format!("expected group:port in '{url}'"))
        })?
    };

    let group: Ipv4Addr = group
        .parse()
        .map_err(|_| ConvoyError::InvalidUrl(format!("invalid multicast group '{group}'")))?;
    if !group.is_multicast() {
        return Err(ConvoyError::InvalidUrl(format!(
            "{group} is not an IPv4 multicast address"
        )));
    }
    let port: u16 = port
        .parse()
        .ok()
        .filter(|&p| p != 0)
        .ok_or_else(|| ConvoyError::InvalidUrl(format!("invalid port '{port}'")))?;

    let mut params = UdpmParams {
        group,
        port,
        ttl: 0,
        recv_buf_size: None,
    };
    for (key, value) in options(query) {
        match key {
            "ttl" => {
                params.ttl = value
                    .parse()
                    .map_err(|_| ConvoyError::InvalidUrl(format!("invalid ttl '{value}'")))?;
            }
            "recv_buf_size" => {
                let size = value.parse().map_err(|_| {
                    ConvoyError::InvalidUrl(format!("invalid recv_buf_size '{value}'"))
                })?;
                params.recv_buf_size = Some(size);
            }
            other => warn!(option = other, "ignoring unknown udpm:// option"),
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_bus() {
        let url = ProviderUrl::parse(DEFAULT_URL).unwrap();
        assert_eq!(
            url,
            ProviderUrl::Udpm(UdpmParams {
                group: Ipv4Addr::new(239, 255, 76, 67),
                port: 7667,
                ttl: 0,
                recv_buf_size: None,
            })
        );
    }

    #[test]
    fn empty_url_uses_env_then_default() {
        // SAFETY: single-threaded test; no other test touches LCM_DEFAULT_URL.
        unsafe { std::env::set_var(DEFAULT_URL_ENV, "memq://") };
        assert_eq!(ProviderUrl::parse("").unwrap(), ProviderUrl::Memq);
        unsafe { std::env::remove_var(DEFAULT_URL_ENV) };
        assert_eq!(
            ProviderUrl::parse("  ").unwrap(),
            ProviderUrl::parse(DEFAULT_URL).unwrap()
        );
    }

    #[test]
    fn parses_ttl_and_recv_buf_size() {
        let url = ProviderUrl::parse("udpm://239.1.2.3:9000?ttl=1&recv_buf_size=2097152").unwrap();
        let ProviderUrl::Udpm(p) = url else {
            panic!("expected udpm");
        };
        assert_eq!(p.ttl, 1);
        assert_eq!(p.port, 9000);
        assert_eq!(p.recv_buf_size, Some(2_097_152));
    }

    #[test]
    fn unknown_options_are_ignored() {
        assert!(ProviderUrl::parse("udpm://239.1.2.3:9000?foo=bar").is_ok());
    }

    #[test]
    fn udpm_without_network_uses_default_group() {
        let url = ProviderUrl::parse("udpm://?ttl=1").unwrap();
        assert_eq!(url.to_string(), "udpm://239.255.76.67:7667?ttl=1");
    }

    #[test]
    fn rejects_unicast_group() {
        let err = ProviderUrl::parse("udpm://10.0.0.1:7667").unwrap_err();
        assert!(err.to_string().contains("multicast"));
    }

    #[test]
    fn rejects_bad_port_and_ttl() {
        assert!(ProviderUrl::parse("udpm://239.255.76.67:0").is_err());
        assert!(ProviderUrl::parse("udpm://239.255.76.67:port").is_err());
        assert!(ProviderUrl::parse("udpm://239.255.76.67:7667?ttl=300").is_err());
    }

    #[test]
    fn rejects_unknown_provider_and_garbage() {
        assert!(matches!(
            ProviderUrl::parse("tcpq://localhost:7700"),
            Err(ConvoyError::InvalidUrl(_))
        ));
        assert!(matches!(
            ProviderUrl::parse("not a url"),
            Err(ConvoyError::InvalidUrl(_))
        ));
    }

    #[test]
    fn display_roundtrips() {
        let raw = "udpm://239.255.76.67:7667?ttl=0&recv_buf_size=1024";
        let url = ProviderUrl::parse(raw).unwrap();
        assert_eq!(url.to_string(), raw);
        assert_eq!(ProviderUrl::parse(&url.to_string()).unwrap(), url);
    }
}
