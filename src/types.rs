//! Core crawler types
//!
//! Records persisted for every crawled node, their storage keys, and the
//! compact binary codec used on disk. The HTTP API re-encodes the same
//! records as JSON.

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Conventional Tendermint P2P port
pub const DEFAULT_P2P_PORT: &str = "26656";

/// Conventional Tendermint RPC port
pub const DEFAULT_RPC_PORT: &str = "26657";

/// Key prefix for persisted nodes
pub const NODE_KEY_PREFIX: &[u8] = b"node/";

/// Key prefix for cached geolocations
pub const LOCATION_KEY_PREFIX: &[u8] = b"location/";

// =============================================================================
// KEYS
// =============================================================================

/// Storage key for a node, addressed by its IP
pub fn node_key(ip: &str) -> Vec<u8> {
    prefixed_key(NODE_KEY_PREFIX, ip)
}

/// Storage key for a cached location, addressed by its IP
pub fn location_key(ip: &str) -> Vec<u8> {
    prefixed_key(LOCATION_KEY_PREFIX, ip)
}

fn prefixed_key(prefix: &[u8], ip: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + ip.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(ip.as_bytes());
    key
}

// =============================================================================
// CODEC
// =============================================================================

/// Failure to encode or decode a stored record
#[derive(Debug, thiserror::Error)]
#[error("codec error: {0}")]
pub struct CodecError(#[from] bincode::Error);

/// Records stored in the key-value store share one binary encoding
pub trait Record: Serialize + for<'de> Deserialize<'de> + Sized {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serialize(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

// =============================================================================
// LOCATION
// =============================================================================

/// Geolocation of a node IP.
///
/// Coordinates are kept as decimal text so the stored encoding is stable
/// across platforms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: String,
    pub longitude: String,
}

impl Record for Location {}

// =============================================================================
// NODE
// =============================================================================

/// Protocol versions advertised by a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub p2p: u64,
    pub block: u64,
    pub app: u64,
}

/// Free-form node info reported alongside the node identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfoOther {
    pub tx_index: String,
    pub rpc_address: String,
}

/// Sync status snapshot taken at crawl time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInfo {
    pub latest_block_hash: String,
    pub latest_app_hash: String,
    pub latest_block_height: i64,
    pub latest_block_time: String,
    pub earliest_block_hash: String,
    pub earliest_app_hash: String,
    pub earliest_block_height: i64,
    pub earliest_block_time: String,
    pub catching_up: bool,
}

/// A full node discovered in a Tendermint network.
///
/// Identity fields (`ip`, ports, `last_sync`) and `location` are set on every
/// crawl that finds the node reachable. The remaining metadata is only filled
/// when the RPC status query succeeds; otherwise it stays at zero values.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub ip: String,
    pub rpc_port: String,
    pub p2p_port: String,
    /// RFC 3339 UTC time of the last successful crawl
    pub last_sync: String,

    pub moniker: String,
    pub id: String,
    pub network: String,
    #[serde(rename = "version")]
    pub protocol_version: ProtocolVersion,

    pub other_info: NodeInfoOther,
    pub sync_info: SyncInfo,
    pub location: Location,

    pub validator_address: String,
    pub validator_pubkey_address: String,
    #[serde(rename = "validator_pubkey_byte")]
    #[serde_as(as = "Base64")]
    pub validator_pubkey_bytes: Vec<u8>,
    pub validator_voting_power: i64,
}

impl Node {
    /// Addressable storage key of this node
    pub fn key(&self) -> Vec<u8> {
        node_key(&self.ip)
    }

    /// Copy status metadata onto this node
    pub fn apply_status(&mut self, status: &StatusResponse) {
        let info = &status.node_info;
        self.moniker = info.moniker.clone();
        self.id = info.id.clone();
        self.network = info.network.clone();
        self.protocol_version = info.protocol_version.clone();
        self.other_info = info.other.clone();
        self.sync_info = status.sync_info.clone();

        let validator = &status.validator_info;
        self.validator_address = validator.address.clone();
        self.validator_pubkey_address = validator.pubkey_address.clone();
        self.validator_pubkey_bytes = validator.pubkey_bytes.clone();
        self.validator_voting_power = validator.voting_power;
    }
}

impl Record for Node {}

// =============================================================================
// PROBE RESPONSES
// =============================================================================

/// Identity reported by a node's RPC status endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: String,
    pub moniker: String,
    pub network: String,
    pub version: String,
    pub protocol_version: ProtocolVersion,
    pub other: NodeInfoOther,
}

/// Validator identity reported by a node's RPC status endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorInfo {
    pub address: String,
    pub pubkey_address: String,
    pub pubkey_bytes: Vec<u8>,
    pub voting_power: i64,
}

/// Result of an RPC status query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusResponse {
    pub node_info: NodeInfo,
    pub sync_info: SyncInfo,
    pub validator_info: ValidatorInfo,
}

/// A peer reported by a node's net-info endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerInfo {
    pub node_id: String,
    pub remote_ip: String,
}

/// Result of an RPC net-info query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetInfoResponse {
    pub peer_count: u64,
    pub peers: Vec<PeerInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_location() -> Location {
        Location {
            country: "United States".to_string(),
            region: "Virginia".to_string(),
            city: "Ashburn".to_string(),
            latitude: "39.043701".to_string(),
            longitude: "-77.474197".to_string(),
        }
    }

    fn create_test_node() -> Node {
        Node {
            ip: "127.0.0.1".to_string(),
            rpc_port: "26657".to_string(),
            p2p_port: "26656".to_string(),
            last_sync: "2024-03-01T12:00:00Z".to_string(),
            moniker: "test-node-0".to_string(),
            id: "5a8a6061c8a2e2e02d497060d5325b6588051cc6".to_string(),
            network: "chain-0".to_string(),
            protocol_version: ProtocolVersion { p2p: 8, block: 11, app: 0 },
            other_info: NodeInfoOther {
                tx_index: "on".to_string(),
                rpc_address: "tcp://0.0.0.0:26657".to_string(),
            },
            sync_info: SyncInfo {
                latest_block_height: 1200,
                catching_up: true,
                ..Default::default()
            },
            location: create_test_location(),
            validator_address: "AB12".to_string(),
            validator_pubkey_address: "AB12".to_string(),
            validator_pubkey_bytes: vec![1, 2, 3, 4],
            validator_voting_power: 10,
        }
    }

    #[test]
    fn test_node_key() {
        assert_eq!(node_key("127.0.0.1"), b"node/127.0.0.1".to_vec());
        assert_eq!(location_key("127.0.0.1"), b"location/127.0.0.1".to_vec());
    }

    #[test]
    fn test_empty_node_key_is_prefix() {
        assert_eq!(Node::default().key(), NODE_KEY_PREFIX.to_vec());
        assert_eq!(create_test_node().key(), b"node/127.0.0.1".to_vec());
    }

    #[test]
    fn test_node_codec() {
        let node = create_test_node();
        let bytes = node.encode().unwrap();
        assert_eq!(Node::decode(&bytes).unwrap(), node);

        let empty = Node::default();
        assert_eq!(Node::decode(&empty.encode().unwrap()).unwrap(), empty);
    }

    #[test]
    fn test_location_codec() {
        let location = create_test_location();
        let bytes = location.encode().unwrap();
        assert_eq!(Location::decode(&bytes).unwrap(), location);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Node::decode(&[0xff, 0x01]).is_err());
    }

    #[test]
    fn test_node_json_shape() {
        let json = serde_json::to_value(create_test_node()).unwrap();
        assert_eq!(json["ip"], "127.0.0.1");
        assert_eq!(json["version"]["block"], 11);
        assert_eq!(json["location"]["city"], "Ashburn");
        assert_eq!(json["validator_pubkey_byte"], "AQIDBA==");
    }

    #[test]
    fn test_apply_status() {
        let mut node = Node {
            ip: "10.0.0.1".to_string(),
            ..Default::default()
        };
        let status = StatusResponse {
            node_info: NodeInfo {
                id: "abc".to_string(),
                moniker: "val-1".to_string(),
                network: "cosmoshub-4".to_string(),
                ..Default::default()
            },
            sync_info: SyncInfo {
                latest_block_height: 42,
                ..Default::default()
            },
            validator_info: ValidatorInfo {
                voting_power: 7,
                ..Default::default()
            },
        };

        node.apply_status(&status);
        assert_eq!(node.ip, "10.0.0.1");
        assert_eq!(node.moniker, "val-1");
        assert_eq!(node.network, "cosmoshub-4");
        assert_eq!(node.sync_info.latest_block_height, 42);
        assert_eq!(node.validator_voting_power, 7);
    }
}
