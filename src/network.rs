use axum::http::HeaderMap;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::{IpAddr, SocketAddr};

// CIDR notation, or a bare address as a single-host network
pub fn parse_network(s: &str) -> Result<IpNet, ipnet::AddrParseError> {
    let s = s.trim();
    match s.parse::<IpNet>() {
        Ok(net) => Ok(net),
        Err(e) => match s.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => Ipv4Net::new(v4, 32).map(IpNet::V4).map_err(|_| e),
            Ok(IpAddr::V6(v6)) => Ipv6Net::new(v6, 128).map(IpNet::V6).map_err(|_| e),
            Err(_) => Err(e),
        },
    }
}

// IPv4-mapped IPv6 peers (dual-stack sockets) are matched as plain IPv4
pub fn in_networks(networks: &[IpNet], ip: &IpAddr) -> bool {
    let ip = ip.to_canonical();
    networks.iter().any(|net| net.contains(&ip))
}

// Address a request is attributed to. Forwarding headers only count when trusted.
pub fn client_addr(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> Option<IpAddr> {
    if trust_forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if forwarded.is_some() {
            return forwarded;
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if real_ip.is_some() {
            return real_ip;
        }
    }
    peer.map(|p| p.ip())
}
