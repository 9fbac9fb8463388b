use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

/// An upstream server address that may or may not be resolved to an IP yet.
///
/// Hostname forms stay unresolved until the pool expands them through the
/// bootstrap resolver at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpstreamAddr {
    Resolved(SocketAddr),
    Unresolved { hostname: Arc<str>, port: u16 },
}

impl UpstreamAddr {
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            UpstreamAddr::Resolved(addr) => Some(*addr),
            UpstreamAddr::Unresolved { .. } => None,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            UpstreamAddr::Resolved(addr) => addr.port(),
            UpstreamAddr::Unresolved { port, .. } => *port,
        }
    }

    pub fn hostname_str(&self) -> Option<&str> {
        match self {
            UpstreamAddr::Resolved(_) => None,
            UpstreamAddr::Unresolved { hostname, .. } => Some(hostname),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, UpstreamAddr::Unresolved { .. })
    }

    /// Returns (hostname, port) if this address is unresolved.
    pub fn unresolved_parts(&self) -> Option<(&str, u16)> {
        match self {
            UpstreamAddr::Unresolved { hostname, port } => Some((hostname, *port)),
            UpstreamAddr::Resolved(_) => None,
        }
    }
}

impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamAddr::Resolved(addr) => write!(f, "{}", addr),
            UpstreamAddr::Unresolved { hostname, port } => write!(f, "{}:{}", hostname, port),
        }
    }
}

/// One configured upstream resolver. The variant is inferred from the
/// address form at parse time and fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Udp {
        addr: UpstreamAddr,
    },
    Tcp {
        addr: UpstreamAddr,
    },
    Tls {
        addr: UpstreamAddr,
        hostname: Arc<str>,
    },
    Quic {
        addr: UpstreamAddr,
        hostname: Arc<str>,
    },
    Https {
        url: Arc<str>,
        hostname: Arc<str>,
    },
}

impl Endpoint {
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Endpoint::Udp { addr }
            | Endpoint::Tcp { addr }
            | Endpoint::Tls { addr, .. }
            | Endpoint::Quic { addr, .. } => addr.socket_addr(),
            Endpoint::Https { .. } => None,
        }
    }

    pub fn hostname(&self) -> Option<&str> {
        match self {
            Endpoint::Tls { hostname, .. }
            | Endpoint::Quic { hostname, .. }
            | Endpoint::Https { hostname, .. } => Some(hostname),
            _ => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Endpoint::Https { url, .. } => Some(url),
            _ => None,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            Endpoint::Udp { .. } => "UDP",
            Endpoint::Tcp { .. } => "TCP",
            Endpoint::Tls { .. } => "TLS",
            Endpoint::Quic { .. } => "QUIC",
            Endpoint::Https { .. } => "HTTPS",
        }
    }

    /// Returns `true` if this endpoint carries a hostname that must go
    /// through the bootstrap resolver before it can be dialed.
    pub fn needs_resolution(&self) -> bool {
        match self {
            Endpoint::Udp { addr }
            | Endpoint::Tcp { addr }
            | Endpoint::Tls { addr, .. }
            | Endpoint::Quic { addr, .. } => addr.is_unresolved(),
            // HTTPS carries its hostname into the HTTP client, which gets a
            // resolver override instead of a rewritten address.
            Endpoint::Https { .. } => false,
        }
    }

    /// Copy of this endpoint with the hostname replaced by a resolved address.
    pub fn with_resolved_addr(&self, resolved: SocketAddr) -> Self {
        match self {
            Endpoint::Udp { .. } => Endpoint::Udp {
                addr: UpstreamAddr::Resolved(resolved),
            },
            Endpoint::Tcp { .. } => Endpoint::Tcp {
                addr: UpstreamAddr::Resolved(resolved),
            },
            Endpoint::Tls { hostname, .. } => Endpoint::Tls {
                addr: UpstreamAddr::Resolved(resolved),
                hostname: hostname.clone(),
            },
            Endpoint::Quic { hostname, .. } => Endpoint::Quic {
                addr: UpstreamAddr::Resolved(resolved),
                hostname: hostname.clone(),
            },
            Endpoint::Https { .. } => self.clone(),
        }
    }
}

fn parse_host_port(s: &str) -> Option<(&str, u16)> {
    if s.starts_with('[') {
        let end = s.find(']')?;
        let host = &s[1..end];
        let rest = &s[end + 1..];
        let port_str = rest.strip_prefix(':')?;
        let port = port_str.parse::<u16>().ok()?;
        Some((host, port))
    } else {
        let (host, port_str) = s.rsplit_once(':')?;
        let port = port_str.parse::<u16>().ok()?;
        Some((host, port))
    }
}

fn parse_upstream_addr(addr_str: &str) -> Option<UpstreamAddr> {
    if let Ok(addr) = addr_str.parse::<SocketAddr>() {
        return Some(UpstreamAddr::Resolved(addr));
    }
    let (host, port) = parse_host_port(addr_str)?;
    Some(UpstreamAddr::Unresolved {
        hostname: host.into(),
        port,
    })
}

/// Parses `HOST:PORT` where the host doubles as the TLS server name.
/// An IP form keeps the IP string as the name; a hostname form stays
/// unresolved until bootstrap resolution.
fn parse_named_addr(rest: &str) -> Option<(UpstreamAddr, Arc<str>)> {
    if let Ok(addr) = rest.parse::<SocketAddr>() {
        let (host, _) = parse_host_port(rest)?;
        return Some((UpstreamAddr::Resolved(addr), host.into()));
    }
    let (host, port) = parse_host_port(rest)?;
    Some((
        UpstreamAddr::Unresolved {
            hostname: host.into(),
            port,
        },
        host.into(),
    ))
}

fn parse_https_url(s: &str) -> Option<(Arc<str>, Arc<str>)> {
    let authority = s.strip_prefix("https://")?.split('/').next()?;
    if authority.is_empty() {
        return None;
    }
    // The authority may carry an explicit port; the hostname never does.
    let host = match parse_host_port(authority) {
        Some((host, _)) => host,
        None => authority.trim_start_matches('[').trim_end_matches(']'),
    };
    Some((s.into(), host.into()))
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr_str) = s.strip_prefix("udp://") {
            let addr = parse_upstream_addr(addr_str)
                .ok_or_else(|| format!("Invalid UDP address '{}'", addr_str))?;
            return Ok(Endpoint::Udp { addr });
        }
        if let Some(addr_str) = s.strip_prefix("tcp://") {
            let addr = parse_upstream_addr(addr_str)
                .ok_or_else(|| format!("Invalid TCP address '{}'", addr_str))?;
            return Ok(Endpoint::Tcp { addr });
        }
        if let Some(rest) = s.strip_prefix("tls://") {
            let (addr, hostname) = parse_named_addr(rest).ok_or_else(|| {
                format!(
                    "Invalid TLS format '{}'. Expected 'tls://IP:PORT' or 'tls://HOSTNAME:PORT'",
                    s
                )
            })?;
            return Ok(Endpoint::Tls { addr, hostname });
        }
        if let Some(rest) = s.strip_prefix("doq://") {
            let (addr, hostname) = parse_named_addr(rest).ok_or_else(|| {
                format!(
                    "Invalid QUIC format '{}'. Expected 'doq://IP:PORT' or 'doq://HOSTNAME:PORT'",
                    s
                )
            })?;
            return Ok(Endpoint::Quic { addr, hostname });
        }
        if s.starts_with("https://") {
            let (url, hostname) =
                parse_https_url(s).ok_or_else(|| format!("Invalid HTTPS URL: {}", s))?;
            return Ok(Endpoint::Https { url, hostname });
        }
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Endpoint::Udp {
                addr: UpstreamAddr::Resolved(addr),
            });
        }
        Err(format!(
            "Invalid DNS endpoint format: '{}'. Expected: udp://IP:PORT, tcp://IP:PORT, tls://HOST:PORT, doq://HOST:PORT, https://URL, or IP:PORT",
            s
        ))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Udp { addr } => write!(f, "udp://{}", addr),
            Endpoint::Tcp { addr } => write!(f, "tcp://{}", addr),
            Endpoint::Tls { addr, hostname } => {
                write!(f, "tls://{}:{}", hostname, addr.port())
            }
            Endpoint::Quic { addr, hostname } => {
                write!(f, "doq://{}:{}", hostname, addr.port())
            }
            Endpoint::Https { url, .. } => write!(f, "{}", url),
        }
    }
}
