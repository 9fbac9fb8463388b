use fleet_dns_domain::{Endpoint, UpstreamAddr};

#[test]
fn test_parse_udp() {
    let endpoint: Endpoint = "udp://8.8.8.8:53".parse().unwrap();
    assert!(matches!(endpoint, Endpoint::Udp { .. }));
}

#[test]
fn test_parse_bare_addr_defaults_to_udp() {
    let endpoint: Endpoint = "8.8.8.8:53".parse().unwrap();
    assert!(matches!(endpoint, Endpoint::Udp { .. }));
}

#[test]
fn test_parse_tcp() {
    let endpoint: Endpoint = "tcp://8.8.8.8:53".parse().unwrap();
    assert!(matches!(endpoint, Endpoint::Tcp { .. }));
}

#[test]
fn test_parse_tls_with_ip() {
    let endpoint: Endpoint = "tls://1.1.1.1:853".parse().unwrap();
    if let Endpoint::Tls { addr, hostname } = endpoint {
        assert_eq!(addr.socket_addr(), Some("1.1.1.1:853".parse().unwrap()));
        assert_eq!(&*hostname, "1.1.1.1");
    } else {
        panic!("Expected Tls variant");
    }
}

#[test]
fn test_parse_tls_with_hostname() {
    let endpoint: Endpoint = "tls://dns.google:853".parse().unwrap();
    if let Endpoint::Tls { hostname, addr } = endpoint {
        assert_eq!(&*hostname, "dns.google");
        assert_eq!(addr.port(), 853);
        assert!(addr.is_unresolved());
    } else {
        panic!("Expected Tls variant");
    }
}

#[test]
fn test_parse_doq_with_ip() {
    let endpoint: Endpoint = "doq://1.1.1.1:853".parse().unwrap();
    if let Endpoint::Quic { addr, hostname } = endpoint {
        assert_eq!(addr.port(), 853);
        assert_eq!(&*hostname, "1.1.1.1");
    } else {
        panic!("Expected Quic variant");
    }
}

#[test]
fn test_parse_doq_with_hostname() {
    let endpoint: Endpoint = "doq://dns.cloudflare.com:853".parse().unwrap();
    if let Endpoint::Quic { addr, hostname } = endpoint {
        assert_eq!(addr.port(), 853);
        assert_eq!(&*hostname, "dns.cloudflare.com");
    } else {
        panic!("Expected Quic variant");
    }
}

#[test]
fn test_parse_https() {
    let endpoint: Endpoint = "https://dns.google/dns-query".parse().unwrap();
    if let Endpoint::Https { url, hostname } = endpoint {
        assert_eq!(&*url, "https://dns.google/dns-query");
        assert_eq!(&*hostname, "dns.google");
    } else {
        panic!("Expected Https variant");
    }
}

#[test]
fn test_parse_https_with_port_strips_port_from_hostname() {
    let endpoint: Endpoint = "https://dns.google:8443/dns-query".parse().unwrap();
    if let Endpoint::Https { hostname, .. } = endpoint {
        assert_eq!(&*hostname, "dns.google");
    } else {
        panic!("Expected Https variant");
    }
}

#[test]
fn test_protocol_name() {
    let udp: Endpoint = "udp://8.8.8.8:53".parse().unwrap();
    assert_eq!(udp.protocol_name(), "UDP");

    let tcp: Endpoint = "tcp://8.8.8.8:53".parse().unwrap();
    assert_eq!(tcp.protocol_name(), "TCP");

    let tls: Endpoint = "tls://1.1.1.1:853".parse().unwrap();
    assert_eq!(tls.protocol_name(), "TLS");

    let quic: Endpoint = "doq://1.1.1.1:853".parse().unwrap();
    assert_eq!(quic.protocol_name(), "QUIC");

    let https: Endpoint = "https://1.1.1.1/dns-query".parse().unwrap();
    assert_eq!(https.protocol_name(), "HTTPS");
}

#[test]
fn test_socket_addr_extraction() {
    let udp: Endpoint = "udp://8.8.8.8:53".parse().unwrap();
    assert!(udp.socket_addr().is_some());

    let tls: Endpoint = "tls://1.1.1.1:853".parse().unwrap();
    assert!(tls.socket_addr().is_some());

    let https: Endpoint = "https://1.1.1.1/dns-query".parse().unwrap();
    assert!(https.socket_addr().is_none());
}

#[test]
fn test_hostname_extraction() {
    let tls: Endpoint = "tls://dns.google:853".parse().unwrap();
    assert_eq!(tls.hostname(), Some("dns.google"));

    let https: Endpoint = "https://dns.google/dns-query".parse().unwrap();
    assert_eq!(https.hostname(), Some("dns.google"));

    let udp: Endpoint = "udp://8.8.8.8:53".parse().unwrap();
    assert_eq!(udp.hostname(), None);
}

#[test]
fn test_display_round_trip() {
    let udp: Endpoint = "udp://8.8.8.8:53".parse().unwrap();
    assert_eq!(format!("{}", udp), "udp://8.8.8.8:53");

    let tls: Endpoint = "tls://dns.google:853".parse().unwrap();
    assert_eq!(format!("{}", tls), "tls://dns.google:853");

    let quic: Endpoint = "doq://dns.cloudflare.com:853".parse().unwrap();
    assert_eq!(format!("{}", quic), "doq://dns.cloudflare.com:853");

    let https: Endpoint = "https://dns.google/dns-query".parse().unwrap();
    assert_eq!(format!("{}", https), "https://dns.google/dns-query");
}

#[test]
fn test_invalid_endpoint_parsing() {
    assert!("invalid://8.8.8.8:53".parse::<Endpoint>().is_err());
    assert!("not-an-endpoint".parse::<Endpoint>().is_err());
    assert!("udp://8.8.8.8".parse::<Endpoint>().is_err());
    assert!("tls://dns.google".parse::<Endpoint>().is_err());
    assert!("".parse::<Endpoint>().is_err());
}

#[test]
fn test_endpoint_equality() {
    let udp1: Endpoint = "udp://8.8.8.8:53".parse().unwrap();
    let udp2: Endpoint = "8.8.8.8:53".parse().unwrap();
    assert_eq!(udp1, udp2);
}

#[test]
fn test_parse_ipv6() {
    let udp: Endpoint = "udp://[2001:4860:4860::8888]:53".parse().unwrap();
    let sa = udp.socket_addr().unwrap();
    assert!(sa.is_ipv6());
    assert_eq!(sa.port(), 53);

    let quic: Endpoint = "doq://[2606:4700:4700::1111]:853".parse().unwrap();
    let sa = quic.socket_addr().unwrap();
    assert!(sa.is_ipv6());
    assert_eq!(sa.port(), 853);
}

// ── UpstreamAddr + hostname resolution ───────────────────────────────────────

#[test]
fn test_parse_udp_hostname() {
    let endpoint: Endpoint = "udp://dns.google:53".parse().unwrap();
    if let Endpoint::Udp { addr } = &endpoint {
        assert!(addr.is_unresolved());
        assert_eq!(addr.hostname_str(), Some("dns.google"));
        assert_eq!(addr.port(), 53);
        assert!(addr.socket_addr().is_none());
    } else {
        panic!("Expected Udp variant");
    }
}

#[test]
fn test_needs_resolution() {
    let udp: Endpoint = "udp://dns.google:53".parse().unwrap();
    assert!(udp.needs_resolution());

    let tls: Endpoint = "tls://dns.google:853".parse().unwrap();
    assert!(tls.needs_resolution());

    let resolved: Endpoint = "udp://8.8.8.8:53".parse().unwrap();
    assert!(!resolved.needs_resolution());

    // HTTPS hostnames go through the HTTP client's resolver override
    // instead of address rewriting.
    let https: Endpoint = "https://dns.google/dns-query".parse().unwrap();
    assert!(!https.needs_resolution());
}

#[test]
fn test_with_resolved_addr_udp() {
    let endpoint: Endpoint = "udp://dns.google:53".parse().unwrap();
    let resolved_addr: std::net::SocketAddr = "8.8.8.8:53".parse().unwrap();
    let resolved = endpoint.with_resolved_addr(resolved_addr);

    if let Endpoint::Udp { addr } = &resolved {
        assert_eq!(addr.socket_addr(), Some(resolved_addr));
        assert!(!addr.is_unresolved());
    } else {
        panic!("Expected Udp variant");
    }
}

#[test]
fn test_with_resolved_addr_keeps_tls_hostname() {
    let endpoint: Endpoint = "tls://dns.google:853".parse().unwrap();
    let resolved_addr: std::net::SocketAddr = "8.8.8.8:853".parse().unwrap();
    let resolved = endpoint.with_resolved_addr(resolved_addr);

    if let Endpoint::Tls { addr, hostname } = &resolved {
        assert_eq!(addr.socket_addr(), Some(resolved_addr));
        assert_eq!(&**hostname, "dns.google");
    } else {
        panic!("Expected Tls variant");
    }
}

#[test]
fn test_with_resolved_addr_https_returns_clone() {
    let endpoint: Endpoint = "https://dns.google/dns-query".parse().unwrap();
    let resolved_addr: std::net::SocketAddr = "8.8.8.8:443".parse().unwrap();
    let resolved = endpoint.with_resolved_addr(resolved_addr);
    assert_eq!(endpoint, resolved);
}

#[test]
fn test_upstream_addr_display() {
    let resolved = UpstreamAddr::Resolved("8.8.8.8:53".parse().unwrap());
    assert_eq!(format!("{}", resolved), "8.8.8.8:53");

    let unresolved = UpstreamAddr::Unresolved {
        hostname: "dns.google".into(),
        port: 53,
    };
    assert_eq!(format!("{}", unresolved), "dns.google:53");
}

#[test]
fn test_upstream_addr_unresolved_parts() {
    let unresolved = UpstreamAddr::Unresolved {
        hostname: "dns.google".into(),
        port: 53,
    };
    let (host, port) = unresolved.unresolved_parts().unwrap();
    assert_eq!(host, "dns.google");
    assert_eq!(port, 53);

    let resolved = UpstreamAddr::Resolved("8.8.8.8:53".parse().unwrap());
    assert!(resolved.unresolved_parts().is_none());
}
