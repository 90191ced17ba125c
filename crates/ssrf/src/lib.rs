//! SSRF validation for every HTTP-fetching code path (§4.1).
//!
//! Blocks crawling of internal network resources by checking URL scheme,
//! hostname, and (optionally) resolved IP addresses against a fixed
//! allow/deny list before a request is allowed to go out.

use std::net::IpAddr;

use thiserror::Error;
use url::Url;

/// Maximum URL length accepted for validation.
pub const MAX_URL_LENGTH: usize = 4096;

#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum SsrfError {
    #[error("URL exceeds maximum length of {MAX_URL_LENGTH} ({0} bytes)")]
    TooLong(usize),

    #[error("URL could not be parsed: {0}")]
    Unparseable(String),

    #[error("scheme '{0}' not allowed; must be http or https")]
    SchemeNotAllowed(String),

    #[error("URL has no hostname")]
    NoHostname,

    #[error("hostname '{0}' is blocked")]
    BlockedHostname(String),

    #[error("IP address {0} is in a private/reserved range")]
    BlockedIp(IpAddr),

    #[error("DNS resolution failed for '{0}': {1}")]
    ResolutionFailed(String, String),
}

/// Cloud metadata endpoints and other hostnames blocked outright.
const BLOCKED_HOSTNAMES: &[&str] = &["metadata.google.internal", "169.254.169.254", "[fd00:ec2::254]"];

/// Validate `url` for safe external fetching. Checks length, scheme,
/// and hostname against the blocked lists; if `resolve_dns` is set, also
/// resolves the hostname and checks every returned address.
///
/// This is the synchronous, non-DNS-resolving half of validation; use
/// [`validate_resolved`] when DNS resolution is required.
pub fn validate(url: &str) -> Result<Url, SsrfError> {
    if url.len() > MAX_URL_LENGTH {
        return Err(SsrfError::TooLong(url.len()));
    }

    let parsed = Url::parse(url).map_err(|e| SsrfError::Unparseable(e.to_string()))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(SsrfError::SchemeNotAllowed(parsed.scheme().to_owned()));
    }

    let host = parsed.host_str().ok_or(SsrfError::NoHostname)?;
    if host.is_empty() {
        return Err(SsrfError::NoHostname);
    }

    if let Err(e) = check_hostname(host) {
        tracing::warn!(host, "ssrf_blocked_hostname");
        return Err(e);
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_blocked_ip(ip) {
            tracing::warn!(%ip, "ssrf_blocked_ip");
            return Err(SsrfError::BlockedIp(ip));
        }
    }

    Ok(parsed)
}

/// Re-validates the final URL reached after following redirects. Performs
/// the same non-DNS checks as [`validate`]; callers that followed a
/// redirect chain should call this on the terminal URL before acting on it.
pub fn validate_post_redirect(final_url: &str) -> Result<Url, SsrfError> {
    validate(final_url)
}

/// Resolve `host` and reject if any returned address is private/reserved.
/// Used after [`validate`] when DNS resolution is desired (crawl workers
/// opt in; redirect re-validation does not resolve by default).
pub async fn check_resolved_host(host: &str) -> Result<(), SsrfError> {
    let lookup_target = format!("{host}:0");
    let addrs = tokio::net::lookup_host(&lookup_target)
        .await
        .map_err(|e| SsrfError::ResolutionFailed(host.to_owned(), e.to_string()))?;

    for addr in addrs {
        let ip = addr.ip();
        if is_blocked_ip(ip) {
            return Err(SsrfError::BlockedIp(ip));
        }
    }
    Ok(())
}

fn check_hostname(host: &str) -> Result<(), SsrfError> {
    let lower = host.to_ascii_lowercase();
    if BLOCKED_HOSTNAMES.contains(&lower.as_str()) {
        return Err(SsrfError::BlockedHostname(host.to_owned()));
    }
    if lower == "localhost"
        || lower.ends_with(".local")
        || lower.ends_with(".internal")
        || lower.ends_with(".intranet")
    {
        return Err(SsrfError::BlockedHostname(host.to_owned()));
    }
    Ok(())
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_multicast()
                || o[0] == 0
                || o[0] == 10
                || o[0] == 127
                || (o[0] == 172 && (16..=31).contains(&o[1]))
                || (o[0] == 192 && o[1] == 168)
                || (o[0] == 192 && o[1] == 0 && o[2] == 0)
                || (o[0] == 192 && o[1] == 0 && o[2] == 2)
                || (o[0] == 198 && (o[1] == 18 || o[1] == 19))
                || (o[0] == 198 && o[1] == 51 && o[2] == 100)
                || (o[0] == 203 && o[1] == 0 && o[2] == 113)
                || o[0] >= 240
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                || is_unique_local_v6(v6)
                || is_link_local_v6(v6)
        }
    }
}

fn is_unique_local_v6(v6: std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

fn is_link_local_v6(v6: std::net::Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_https_url() {
        assert!(validate("https://example.com/page").is_ok());
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert_eq!(
            validate("ftp://example.com/file").unwrap_err(),
            SsrfError::SchemeNotAllowed("ftp".to_owned())
        );
    }

    #[test]
    fn rejects_localhost() {
        assert!(matches!(
            validate("http://localhost/admin"),
            Err(SsrfError::BlockedHostname(_))
        ));
    }

    #[test]
    fn rejects_dotted_internal_hostnames() {
        assert!(validate("http://service.internal/status").is_err());
        assert!(validate("http://box.local/status").is_err());
    }

    #[test]
    fn rejects_metadata_endpoint() {
        assert!(validate("http://169.254.169.254/latest/meta-data").is_err());
    }

    #[test]
    fn rejects_private_ipv4_ranges() {
        assert!(validate("http://10.0.0.5/").is_err());
        assert!(validate("http://192.168.1.1/").is_err());
        assert!(validate("http://172.16.0.1/").is_err());
        assert!(validate("http://127.0.0.1/").is_err());
    }

    #[test]
    fn rejects_full_zero_slash_eight_range() {
        assert!(validate("http://0.0.0.0/").is_err());
        assert!(validate("http://0.0.0.1/").is_err());
        assert!(validate("http://0.1.2.3/").is_err());
    }

    #[test]
    fn accepts_public_ipv4_literal() {
        assert!(validate("http://8.8.8.8/").is_ok());
    }

    #[test]
    fn rejects_oversized_url() {
        let url = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(matches!(validate(&url), Err(SsrfError::TooLong(_))));
    }

    #[test]
    fn rejects_ipv6_loopback_and_unique_local() {
        assert!(validate("http://[::1]/").is_err());
        assert!(validate("http://[fc00::1]/").is_err());
        assert!(validate("http://[fe80::1]/").is_err());
    }

    #[tokio::test]
    async fn resolved_loopback_is_rejected() {
        let result = check_resolved_host("localhost").await;
        assert!(result.is_err());
    }
}
