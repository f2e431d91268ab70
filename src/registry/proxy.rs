// src/registry/proxy.rs

//! Proxy selection and HTTP CONNECT tunneling for registry connections
//!
//! The proxy is taken from the first non-empty of `GRPC_PROXY`, `HTTPS_PROXY`
//! and `HTTP_PROXY` (upper or lower case). `NO_PROXY` excludes hosts:
//!
//! ```text
//! *                 no proxying at all
//! example.com       example.com and any subdomain
//! .example.com      subdomains only
//! example.com:8443  only that port
//! 10.0.0.1          that address
//! ```
//!
//! Loopback hosts are never proxied.

use std::net::IpAddr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

const PROXY_VARS: &[&[&str]] = &[
    &["GRPC_PROXY", "grpc_proxy"],
    &["HTTPS_PROXY", "https_proxy"],
    &["HTTP_PROXY", "http_proxy"],
];

/// Largest CONNECT response header accepted from a proxy
const MAX_RESPONSE_HEADER: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
struct NoProxyRule {
    host: String,
    port: Option<u16>,
    /// Leading dot: only subdomains match
    subdomains_only: bool,
}

impl NoProxyRule {
    fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim().to_ascii_lowercase();
        if entry.is_empty() {
            return None;
        }
        let (host, port) = match split_host_port(&entry) {
            Some((host, port)) => (host.to_string(), Some(port)),
            None => (entry.trim_start_matches('[').trim_end_matches(']').to_string(), None),
        };
        let host = host.strip_prefix('*').map(str::to_string).unwrap_or(host);
        let subdomains_only = host.starts_with('.');
        Some(Self {
            host: host.trim_start_matches('.').to_string(),
            port,
            subdomains_only,
        })
    }

    fn matches(&self, host: &str, port: u16) -> bool {
        if self.port.is_some_and(|p| p != port) {
            return false;
        }
        if host.ends_with(&format!(".{}", self.host)) {
            return true;
        }
        !self.subdomains_only && host == self.host
    }
}

/// Proxy settings resolved from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    proxy: Option<String>,
    no_proxy_all: bool,
    no_proxy: Vec<NoProxyRule>,
}

impl ProxyConfig {
    /// Read proxy settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read proxy settings through a variable lookup function
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first_set = |names: &[&str]| {
            names
                .iter()
                .filter_map(|&name| lookup(name))
                .find(|value| !value.trim().is_empty())
        };

        let proxy = PROXY_VARS.iter().find_map(|names| first_set(*names));
        let no_proxy = first_set(&["NO_PROXY", "no_proxy"]).unwrap_or_default();

        let mut config = Self {
            proxy,
            ..Default::default()
        };
        for entry in no_proxy.split(',') {
            if entry.trim() == "*" {
                config.no_proxy_all = true;
            } else if let Some(rule) = NoProxyRule::parse(entry) {
                config.no_proxy.push(rule);
            }
        }
        config
    }

    /// No proxying for any address
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Proxy to use for a `host:port` address, if any
    pub fn proxy_for(&self, address: &str) -> Result<Option<Url>> {
        let (host, port) = split_host_port(address)
            .ok_or_else(|| Error::Proxy(format!("address {address}: missing port in address")))?;

        let Some(proxy) = &self.proxy else {
            return Ok(None);
        };

        let host = host.to_ascii_lowercase();
        if self.no_proxy_all || is_loopback(&host) {
            return Ok(None);
        }
        if self.no_proxy.iter().any(|rule| rule.matches(&host, port)) {
            debug!(address, "Address excluded from proxying by NO_PROXY");
            return Ok(None);
        }

        let url = parse_proxy_url(proxy)?;
        Ok(Some(url))
    }
}

fn parse_proxy_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| Error::Proxy(format!("invalid proxy address {raw:?}: {e}")))?;
    if url.scheme() != "http" {
        return Err(Error::Proxy(format!(
            "unsupported proxy scheme {:?} in {raw:?}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(Error::Proxy(format!("proxy address {raw:?} has no host")));
    }
    Ok(url)
}

/// Split `host:port`, accepting bracketed IPv6 hosts
fn split_host_port(address: &str) -> Option<(&str, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = match host.strip_prefix('[') {
        Some(inner) => inner.strip_suffix(']')?,
        None if host.contains(':') => return None,
        None => host,
    };
    Some((host, port))
}

fn is_loopback(host: &str) -> bool {
    host == "localhost"
        || host.ends_with(".localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Open a TCP connection to `target` through an HTTP proxy
pub async fn connect_via_proxy(proxy: &Url, target: &str) -> std::io::Result<TcpStream> {
    let proxy_host = proxy
        .host_str()
        .ok_or_else(|| std::io::Error::other(format!("proxy {proxy} has no host")))?;
    let proxy_port = proxy.port_or_known_default().unwrap_or(80);

    let mut stream = TcpStream::connect((proxy_host, proxy_port)).await?;

    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if !proxy.username().is_empty() {
        let credentials = format!("{}:{}", proxy.username(), proxy.password().unwrap_or(""));
        request.push_str(&format!(
            "Proxy-Authorization: Basic {}\r\n",
            STANDARD.encode(credentials)
        ));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    // Read byte by byte so no tunneled data is consumed with the header
    let mut header = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !header.ends_with(b"\r\n\r\n") {
        if header.len() >= MAX_RESPONSE_HEADER {
            return Err(std::io::Error::other("proxy response header too large"));
        }
        if stream.read(&mut byte).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "proxy closed connection during CONNECT",
            ));
        }
        header.push(byte[0]);
    }

    let header = String::from_utf8_lossy(&header);
    let status_line = header.lines().next().unwrap_or_default();
    let status = status_line.split_whitespace().nth(1);
    if status != Some("200") {
        return Err(std::io::Error::other(format!(
            "proxy CONNECT to {target} failed: {status_line}"
        )));
    }

    debug!(proxy = %proxy_host, target, "Established proxy tunnel");
    Ok(stream)
}
