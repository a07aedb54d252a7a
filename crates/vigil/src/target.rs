//! Parsing of `resource_url` values into probe targets.

use url::{Host, Url};

use crate::error::{Error, Result};

/// Parse an HTTP/HTTPS target, requiring a scheme and a host
pub fn http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::configuration(format!("invalid URL {raw:?}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::configuration(format!(
                "invalid scheme for HTTP check: {other}"
            )));
        }
    }

    if host_of(&url).is_none() {
        return Err(Error::configuration(format!("URL {raw:?} has no host")));
    }

    Ok(url)
}

/// Extract `host` and `port` from `tcp://host:port`, `host:port` or an HTTP URL
pub fn host_port(raw: &str) -> Result<(String, u16)> {
    let url = with_scheme(raw, "tcp")?;
    let host = host_of(&url)
        .ok_or_else(|| Error::configuration(format!("target {raw:?} has no host")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::configuration(format!("target {raw:?} has no port")))?;

    if port == 0 {
        return Err(Error::configuration("port 0 is not valid"));
    }

    Ok((host, port))
}

/// Extract the bare hostname from `dns://host`, `host` or any URL
pub fn hostname(raw: &str) -> Result<String> {
    let url = with_scheme(raw, "dns")?;
    host_of(&url).ok_or_else(|| Error::configuration(format!("target {raw:?} has no host")))
}

/// Host without IPv6 brackets, suitable for socket connects and DNS queries
pub(crate) fn host_of(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) if domain.is_empty() => None,
        Host::Domain(domain) => Some(domain.to_string()),
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Ipv6(addr) => Some(addr.to_string()),
    }
}

fn with_scheme(raw: &str, default_scheme: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::configuration("target must not be empty"));
    }

    let qualified = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("{default_scheme}://{raw}")
    };

    Url::parse(&qualified).map_err(|e| Error::configuration(format!("invalid target {raw:?}: {e}")))
}
