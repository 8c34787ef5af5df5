//! Address parsing and construction helpers

use url::Url;

use crate::types::{Location, DEFAULT_P2P_PORT, DEFAULT_RPC_PORT};

/// Extract the bare host from a node address.
///
/// Accepts `scheme://host:port`, `id@host:port` and `host:port` forms.
pub fn parse_ip(node_addr: &str) -> String {
    let without_id = node_addr.rsplit('@').next().unwrap_or(node_addr);
    let without_scheme = without_id.rsplit("//").next().unwrap_or(without_id);

    // Bracketed IPv6 literal
    if let Some(rest) = without_scheme.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[..end].to_string();
        }
    }

    without_scheme
        .split(|c| c == ':' || c == '/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Extract the explicit port from a node address, or an empty string when
/// the address has no parseable port.
pub fn parse_port(node_addr: &str) -> String {
    Url::parse(node_addr)
        .ok()
        .and_then(|u| u.port())
        .map(|p| p.to_string())
        .unwrap_or_default()
}

fn host_for_addr(ip: &str) -> String {
    if ip.contains(':') {
        format!("[{}]", ip)
    } else {
        ip.to_string()
    }
}

/// P2P dial address (`host:26656`) of a node
pub fn p2p_address(ip: &str) -> String {
    format!("{}:{}", host_for_addr(ip), DEFAULT_P2P_PORT)
}

/// Base URL of a node's Tendermint RPC server (`http://host:26657`)
pub fn rpc_endpoint(ip: &str) -> String {
    format!("http://{}:{}", host_for_addr(ip), DEFAULT_RPC_PORT)
}

/// Frontier entry for a node, falling back to the default RPC port
pub fn rpc_address(ip: &str, rpc_port: &str) -> String {
    let port = if rpc_port.is_empty() {
        DEFAULT_RPC_PORT
    } else {
        rpc_port
    };
    format!("http://{}:{}", host_for_addr(ip), port)
}

/// Map a geolocation service response onto a stored location
pub fn location_from_coordinates(
    country: &str,
    region: &str,
    city: &str,
    latitude: f64,
    longitude: f64,
) -> Location {
    Location {
        country: country.to_string(),
        region: region.to_string(),
        city: city.to_string(),
        latitude: format!("{:.6}", latitude),
        longitude: format!("{:.6}", longitude),
    }
}
