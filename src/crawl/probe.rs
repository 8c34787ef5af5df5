//! Node Probe Client
//!
//! Talks to a remote Tendermint node: a P2P-level handshake and raw TCP
//! connect for reachability, and JSON-RPC `status` / `net_info` queries for
//! metadata and peers.
//!
//! ## Handshake
//!
//! The handshake is the opening leg of a SecretConnection: both sides send
//! an ephemeral Curve25519 public key as a length-delimited message. A peer
//! that answers with its own 32-byte key is speaking the Tendermint P2P
//! protocol. We hang up before the authenticated part of the exchange.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::types::{
    NetInfoResponse, NodeInfo, NodeInfoOther, PeerInfo, ProtocolVersion, StatusResponse, SyncInfo,
    ValidatorInfo,
};

/// Size of an ephemeral Curve25519 public key
const EPHEMERAL_KEY_LEN: usize = 32;

/// Upper bound on the handshake reply we are willing to read
const MAX_HANDSHAKE_MESSAGE: usize = 1024;

/// Length of an address derived from a public key
const PUBKEY_ADDRESS_LEN: usize = 20;

const ED25519_KEY_TYPE: &str = "tendermint/PubKeyEd25519";

/// Errors raised while probing a node
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("rpc request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid rpc response: {0}")]
    InvalidResponse(String),
}

/// Request/response contract with a remote node
#[async_trait]
pub trait ProbeClient: Send + Sync {
    /// P2P protocol handshake against `addr` (`host:port`)
    async fn handshake(&self, addr: &str, timeout: Duration) -> Result<(), ProbeError>;

    /// Raw TCP reachability check against `addr` (`host:port`)
    async fn tcp_probe(&self, addr: &str, timeout: Duration) -> Result<(), ProbeError>;

    /// Node status from the RPC server at `endpoint` (`http://host:port`)
    async fn status(&self, endpoint: &str) -> Result<StatusResponse, ProbeError>;

    /// Connected peers from the RPC server at `endpoint`
    async fn net_info(&self, endpoint: &str) -> Result<NetInfoResponse, ProbeError>;
}

/// Probe client for Tendermint-based networks
pub struct TendermintProbe {
    http: reqwest::Client,
}

impl TendermintProbe {
    pub fn new(rpc_timeout: Duration) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder().timeout(rpc_timeout).build()?;
        Ok(Self { http })
    }

    async fn rpc_call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: &str,
    ) -> Result<T, ProbeError> {
        let url = format!("{}/{}", endpoint.trim_end_matches('/'), method);
        let response: RpcEnvelope<T> = self.http.get(&url).send().await?.json().await?;

        if let Some(error) = response.error {
            let message = if error.data.is_empty() {
                error.message
            } else {
                format!("{} ({})", error.message, error.data)
            };
            return Err(ProbeError::Rpc {
                code: error.code,
                message,
            });
        }

        response
            .result
            .ok_or_else(|| ProbeError::InvalidResponse(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl ProbeClient for TendermintProbe {
    async fn handshake(&self, addr: &str, dial_timeout: Duration) -> Result<(), ProbeError> {
        timeout(dial_timeout, exchange_ephemeral_keys(addr))
            .await
            .map_err(|_| ProbeError::Timeout(dial_timeout))?
    }

    async fn tcp_probe(&self, addr: &str, dial_timeout: Duration) -> Result<(), ProbeError> {
        timeout(dial_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProbeError::Timeout(dial_timeout))??;
        Ok(())
    }

    async fn status(&self, endpoint: &str) -> Result<StatusResponse, ProbeError> {
        let raw: RawStatus = self.rpc_call(endpoint, "status").await?;
        raw.try_into()
    }

    async fn net_info(&self, endpoint: &str) -> Result<NetInfoResponse, ProbeError> {
        let raw: RawNetInfo = self.rpc_call(endpoint, "net_info").await?;
        raw.try_into()
    }
}

// =============================================================================
// HANDSHAKE
// =============================================================================

async fn exchange_ephemeral_keys(addr: &str) -> Result<(), ProbeError> {
    let mut stream = TcpStream::connect(addr).await?;

    let ephemeral = SigningKey::generate(&mut OsRng)
        .verifying_key()
        .to_montgomery()
        .to_bytes();

    stream.write_all(&encode_ephemeral_key(&ephemeral)).await?;
    stream.flush().await?;

    let len = read_uvarint(&mut stream).await?;
    if len == 0 || len > MAX_HANDSHAKE_MESSAGE {
        return Err(ProbeError::Handshake(format!("unexpected message length {}", len)));
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;

    decode_ephemeral_key(&body)
        .map(|_| ())
        .ok_or_else(|| ProbeError::Handshake("peer did not send an ephemeral key".to_string()))
}

/// Length-delimited protobuf `BytesValue` carrying a 32-byte key
fn encode_ephemeral_key(key: &[u8; EPHEMERAL_KEY_LEN]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(EPHEMERAL_KEY_LEN + 3);
    msg.push((EPHEMERAL_KEY_LEN + 2) as u8);
    msg.push(0x0a);
    msg.push(EPHEMERAL_KEY_LEN as u8);
    msg.extend_from_slice(key);
    msg
}

/// Accepts protobuf `BytesValue` framing and the legacy amino framing
fn decode_ephemeral_key(body: &[u8]) -> Option<&[u8]> {
    let framed = match body {
        [0x0a, rest @ ..] if body.len() == EPHEMERAL_KEY_LEN + 2 => rest,
        _ if body.len() == EPHEMERAL_KEY_LEN + 1 => body,
        _ => return None,
    };

    match framed {
        [len, key @ ..] if *len as usize == EPHEMERAL_KEY_LEN => Some(key),
        _ => None,
    }
}

async fn read_uvarint(stream: &mut TcpStream) -> Result<usize, ProbeError> {
    let mut value: u64 = 0;
    for shift in (0..64).step_by(7) {
        let byte = stream.read_u8().await?;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return usize::try_from(value)
                .map_err(|_| ProbeError::Handshake("varint overflow".to_string()));
        }
    }
    Err(ProbeError::Handshake("varint overflow".to_string()))
}

// =============================================================================
// RPC WIRE FORMAT
// =============================================================================

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    node_info: RawNodeInfo,
    sync_info: RawSyncInfo,
    validator_info: RawValidatorInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNodeInfo {
    protocol_version: RawProtocolVersion,
    id: String,
    network: String,
    version: String,
    moniker: String,
    other: RawNodeInfoOther,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProtocolVersion {
    p2p: String,
    block: String,
    app: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNodeInfoOther {
    tx_index: String,
    rpc_address: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSyncInfo {
    latest_block_hash: String,
    latest_app_hash: String,
    latest_block_height: String,
    latest_block_time: String,
    earliest_block_hash: String,
    earliest_app_hash: String,
    earliest_block_height: String,
    earliest_block_time: String,
    catching_up: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawValidatorInfo {
    address: String,
    pub_key: Option<RawPubKey>,
    voting_power: String,
}

#[derive(Debug, Deserialize)]
struct RawPubKey {
    #[serde(rename = "type")]
    key_type: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct RawNetInfo {
    #[serde(default)]
    n_peers: String,
    #[serde(default)]
    peers: Vec<RawPeer>,
}

#[derive(Debug, Deserialize)]
struct RawPeer {
    #[serde(default)]
    node_info: RawNodeInfo,
    remote_ip: String,
}

/// Parse a string-encoded integer; empty strings are zero
fn parse_int<T: std::str::FromStr + Default>(field: &str, value: &str) -> Result<T, ProbeError> {
    if value.is_empty() {
        return Ok(T::default());
    }
    value
        .parse()
        .map_err(|_| ProbeError::InvalidResponse(format!("{} is not an integer: {:?}", field, value)))
}

/// Address of a validator public key: truncated SHA-256 for Ed25519 keys,
/// otherwise the address the node reported.
fn pubkey_address(key_type: &str, key_bytes: &[u8], reported: &str) -> String {
    if key_type == ED25519_KEY_TYPE {
        let digest = Sha256::digest(key_bytes);
        hex::encode_upper(&digest[..PUBKEY_ADDRESS_LEN])
    } else {
        reported.to_string()
    }
}

impl TryFrom<RawNodeInfo> for NodeInfo {
    type Error = ProbeError;

    fn try_from(raw: RawNodeInfo) -> Result<Self, Self::Error> {
        Ok(NodeInfo {
            id: raw.id,
            moniker: raw.moniker,
            network: raw.network,
            version: raw.version,
            protocol_version: ProtocolVersion {
                p2p: parse_int("protocol_version.p2p", &raw.protocol_version.p2p)?,
                block: parse_int("protocol_version.block", &raw.protocol_version.block)?,
                app: parse_int("protocol_version.app", &raw.protocol_version.app)?,
            },
            other: NodeInfoOther {
                tx_index: raw.other.tx_index,
                rpc_address: raw.other.rpc_address,
            },
        })
    }
}

impl TryFrom<RawStatus> for StatusResponse {
    type Error = ProbeError;

    fn try_from(raw: RawStatus) -> Result<Self, Self::Error> {
        let sync = raw.sync_info;
        let sync_info = SyncInfo {
            latest_block_height: parse_int("latest_block_height", &sync.latest_block_height)?,
            earliest_block_height: parse_int("earliest_block_height", &sync.earliest_block_height)?,
            latest_block_hash: sync.latest_block_hash,
            latest_app_hash: sync.latest_app_hash,
            latest_block_time: sync.latest_block_time,
            earliest_block_hash: sync.earliest_block_hash,
            earliest_app_hash: sync.earliest_app_hash,
            earliest_block_time: sync.earliest_block_time,
            catching_up: sync.catching_up,
        };

        let validator = raw.validator_info;
        let (pubkey_address, pubkey_bytes) = match validator.pub_key {
            Some(key) => {
                let bytes = BASE64.decode(&key.value).map_err(|e| {
                    ProbeError::InvalidResponse(format!("validator pub_key is not base64: {}", e))
                })?;
                (pubkey_address(&key.key_type, &bytes, &validator.address), bytes)
            }
            None => (validator.address.clone(), Vec::new()),
        };

        Ok(StatusResponse {
            node_info: raw.node_info.try_into()?,
            sync_info,
            validator_info: ValidatorInfo {
                voting_power: parse_int("voting_power", &validator.voting_power)?,
                address: validator.address,
                pubkey_address,
                pubkey_bytes,
            },
        })
    }
}

impl TryFrom<RawNetInfo> for NetInfoResponse {
    type Error = ProbeError;

    fn try_from(raw: RawNetInfo) -> Result<Self, Self::Error> {
        Ok(NetInfoResponse {
            peer_count: parse_int("n_peers", &raw.n_peers)?,
            peers: raw
                .peers
                .into_iter()
                .map(|p| PeerInfo {
                    node_id: p.node_info.id,
                    remote_ip: p.remote_ip,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const STATUS_JSON: &str = r#"{
        "jsonrpc": "2.0",
        "id": -1,
        "result": {
            "node_info": {
                "protocol_version": {"p2p": "8", "block": "11", "app": "0"},
                "id": "5a8a6061c8a2e2e02d497060d5325b6588051cc6",
                "listen_addr": "tcp://0.0.0.0:26656",
                "network": "cosmoshub-4",
                "version": "0.34.24",
                "channels": "40202122233038606100",
                "moniker": "node-0",
                "other": {"tx_index": "on", "rpc_address": "tcp://0.0.0.0:26657"}
            },
            "sync_info": {
                "latest_block_hash": "AAAA",
                "latest_app_hash": "BBBB",
                "latest_block_height": "1200",
                "latest_block_time": "2024-03-01T12:00:00.000000000Z",
                "earliest_block_hash": "CCCC",
                "earliest_app_hash": "DDDD",
                "earliest_block_height": "1",
                "earliest_block_time": "2023-01-01T00:00:00Z",
                "catching_up": false
            },
            "validator_info": {
                "address": "0A1B",
                "pub_key": {"type": "tendermint/PubKeyEd25519", "value": "AQIDBA=="},
                "voting_power": "25"
            }
        }
    }"#;

    const NET_INFO_JSON: &str = r#"{
        "jsonrpc": "2.0",
        "id": -1,
        "result": {
            "listening": true,
            "listeners": [],
            "n_peers": "2",
            "peers": [
                {"node_info": {"id": "aaa", "moniker": "p1"}, "is_outbound": true, "remote_ip": "10.0.0.1"},
                {"node_info": {"id": "bbb", "moniker": "p2"}, "is_outbound": false, "remote_ip": "10.0.0.2"}
            ]
        }
    }"#;

    #[test]
    fn test_decode_status() {
        let envelope: RpcEnvelope<RawStatus> = serde_json::from_str(STATUS_JSON).unwrap();
        let status: StatusResponse = envelope.result.unwrap().try_into().unwrap();

        assert_eq!(status.node_info.moniker, "node-0");
        assert_eq!(status.node_info.network, "cosmoshub-4");
        assert_eq!(status.node_info.protocol_version, ProtocolVersion { p2p: 8, block: 11, app: 0 });
        assert_eq!(status.node_info.other.tx_index, "on");
        assert_eq!(status.sync_info.latest_block_height, 1200);
        assert_eq!(status.sync_info.earliest_block_height, 1);
        assert_eq!(status.validator_info.voting_power, 25);
        assert_eq!(status.validator_info.pubkey_bytes, vec![1, 2, 3, 4]);

        let expected = hex::encode_upper(&Sha256::digest([1u8, 2, 3, 4])[..20]);
        assert_eq!(status.validator_info.pubkey_address, expected);
    }

    #[test]
    fn test_decode_status_bad_height() {
        let json = STATUS_JSON.replace("\"1200\"", "\"twelve\"");
        let envelope: RpcEnvelope<RawStatus> = serde_json::from_str(&json).unwrap();
        let result: Result<StatusResponse, _> = envelope.result.unwrap().try_into();
        assert!(matches!(result, Err(ProbeError::InvalidResponse(_))));
    }

    #[test]
    fn test_decode_net_info() {
        let envelope: RpcEnvelope<RawNetInfo> = serde_json::from_str(NET_INFO_JSON).unwrap();
        let net_info: NetInfoResponse = envelope.result.unwrap().try_into().unwrap();

        assert_eq!(net_info.peer_count, 2);
        let ips: Vec<_> = net_info.peers.iter().map(|p| p.remote_ip.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(net_info.peers[0].node_id, "aaa");
    }

    #[test]
    fn test_decode_rpc_error() {
        let json = r#"{"jsonrpc":"2.0","id":-1,"error":{"code":-32601,"message":"Method not found"}}"#;
        let envelope: RpcEnvelope<RawNetInfo> = serde_json::from_str(json).unwrap();
        assert!(envelope.result.is_none());
        assert_eq!(envelope.error.unwrap().code, -32601);
    }

    #[test]
    fn test_ephemeral_key_framing() {
        let key = [7u8; EPHEMERAL_KEY_LEN];
        let msg = encode_ephemeral_key(&key);
        assert_eq!(msg.len(), 35);
        assert_eq!(msg[0], 34);

        // Protobuf framing
        assert_eq!(decode_ephemeral_key(&msg[1..]), Some(&key[..]));

        // Legacy amino framing
        let mut amino = vec![0x20];
        amino.extend_from_slice(&key);
        assert_eq!(decode_ephemeral_key(&amino), Some(&key[..]));

        assert_eq!(decode_ephemeral_key(&[0x0a, 0x20, 1, 2]), None);
        assert_eq!(decode_ephemeral_key(&[]), None);
    }

    #[tokio::test]
    async fn test_handshake_with_responding_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 35];
            socket.read_exact(&mut buf).await.unwrap();
            // Answer with our own key
            socket.write_all(&encode_ephemeral_key(&[9u8; 32])).await.unwrap();
        });

        let probe = TendermintProbe::new(Duration::from_secs(2)).unwrap();
        probe
            .handshake(&addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handshake_with_silent_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let probe = TendermintProbe::new(Duration::from_secs(2)).unwrap();
        let result = probe.handshake(&addr.to_string(), Duration::from_secs(2)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap();

        let probe = TendermintProbe::new(Duration::from_secs(2)).unwrap();
        probe.tcp_probe(&open.to_string(), Duration::from_secs(2)).await.unwrap();

        drop(listener);
        let result = probe.tcp_probe(&open.to_string(), Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}
