//! Binary IPC transport to the configuration daemon
//!
//! Every request is a single round-trip over the daemon's Unix-domain
//! socket: an 8-byte header (message id, payload length, both u32 LE)
//! followed by the payload. The response carries an i32 LE status (zero on
//! success, `-errno` on daemon failure), a u32 LE data length, and the data.
//! The transport is kind-agnostic; the payload encoders for each message
//! layout live alongside it.

use crate::error::{QuorumFsError, Result};
use async_trait::async_trait;
use bytes::BufMut;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Fixed width of the name fields in status messages, terminator included
pub const STATUS_NAME_LEN: usize = 256;

/// Daemon errno for "file does not exist"
const ENOENT: i32 = 2;

/// Upper bound on a single response body; anything larger is a framing error
const MAX_RESPONSE_LEN: usize = 64 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    GetVersionVector = 1,
    GetMembership = 2,
    GetGuestList = 3,
    GetConfig = 4,
    StatusUpdate = 5,
    StatusGet = 6,
    LogAppend = 7,
    GetClusterLog = 8,
}

impl MessageKind {
    pub fn id(self) -> u32 {
        self as u32
    }
}

/// Seam between the runtime and the daemon; everything above this trait is
/// transport-agnostic, which is also what the test suite relies on.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// Send one request and return the raw response body.
    ///
    /// Never blocks beyond the IPC round-trip; failures return immediately
    /// and retry policy is the caller's decision.
    async fn send(&self, kind: MessageKind, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Send a request and decode the response body as JSON
pub async fn send_json<T: DeserializeOwned>(
    transport: &dyn ClusterTransport,
    kind: MessageKind,
    payload: &[u8],
) -> Result<T> {
    let raw = transport.send(kind, payload).await?;
    serde_json::from_slice(&raw).map_err(|e| QuorumFsError::MalformedResponse {
        details: e.to_string(),
    })
}

/// Fetch a configuration file's raw bytes; an absent file is a legitimate
/// outcome, reported as `None` rather than an error.
pub async fn fetch_config(
    transport: &dyn ClusterTransport,
    path: &str,
) -> Result<Option<Vec<u8>>> {
    match transport.send(MessageKind::GetConfig, &encode_path(path)).await {
        Ok(raw) => Ok(Some(raw)),
        Err(QuorumFsError::DaemonError { errno }) if errno == ENOENT => Ok(None),
        Err(e) => Err(e),
    }
}

/// NUL-terminated path payload for `GetConfig`
pub fn encode_path(path: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(path.len() + 1);
    buf.extend_from_slice(path.as_bytes());
    buf.push(0);
    buf
}

fn put_fixed_name(buf: &mut Vec<u8>, name: &str) {
    // Fixed-width field with a guaranteed terminator; longer names are
    // truncated at the last byte that still leaves room for the NUL.
    let bytes = name.as_bytes();
    let len = bytes.len().min(STATUS_NAME_LEN - 1);
    buf.extend_from_slice(&bytes[..len]);
    buf.resize(buf.len() + (STATUS_NAME_LEN - len), 0);
}

/// `StatusUpdate` payload: fixed-width key name, then the blob
pub fn encode_status_update(key: &str, blob: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(STATUS_NAME_LEN + blob.len());
    put_fixed_name(&mut buf, key);
    buf.extend_from_slice(blob);
    buf
}

/// `StatusGet` payload: fixed-width node name, then fixed-width key name
pub fn encode_status_get(node: &str, key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 * STATUS_NAME_LEN);
    put_fixed_name(&mut buf, node);
    put_fixed_name(&mut buf, key);
    buf
}

/// `LogAppend` payload: priority byte, then NUL-terminated ident, tag, message
pub fn encode_log_append(priority: u8, ident: &str, tag: &str, message: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + ident.len() + tag.len() + message.len());
    buf.push(priority);
    for field in [ident, tag, message] {
        buf.extend_from_slice(field.as_bytes());
        buf.push(0);
    }
    buf
}

/// `GetClusterLog` payload: u32 LE max entries, optional NUL-terminated user filter
pub fn encode_cluster_log_request(max_entries: u32, user: Option<&str>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + user.map_or(0, |u| u.len() + 1));
    buf.put_u32_le(max_entries);
    if let Some(user) = user {
        buf.extend_from_slice(user.as_bytes());
        buf.push(0);
    }
    buf
}

/// Transport over the daemon's local Unix-domain socket, one connection per
/// request.
pub struct UnixTransport {
    socket_path: PathBuf,
}

impl UnixTransport {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }
}

fn channel_error(op: &str, err: std::io::Error) -> QuorumFsError {
    QuorumFsError::ChannelUnavailable {
        details: format!("{}: {}", op, err),
    }
}

#[async_trait]
impl ClusterTransport for UnixTransport {
    async fn send(&self, kind: MessageKind, payload: &[u8]) -> Result<Vec<u8>> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| channel_error("connect", e))?;

        let mut request = Vec::with_capacity(8 + payload.len());
        request.put_u32_le(kind.id());
        request.put_u32_le(payload.len() as u32);
        request.extend_from_slice(payload);
        stream
            .write_all(&request)
            .await
            .map_err(|e| channel_error("write", e))?;
        stream
            .shutdown()
            .await
            .map_err(|e| channel_error("shutdown", e))?;

        let mut header = [0u8; 8];
        stream
            .read_exact(&mut header)
            .await
            .map_err(|e| channel_error("read header", e))?;
        let status = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

        if status < 0 {
            return Err(QuorumFsError::DaemonError { errno: -status });
        }
        if len > MAX_RESPONSE_LEN {
            return Err(QuorumFsError::MalformedResponse {
                details: format!("response length {} exceeds limit", len),
            });
        }

        let mut data = vec![0u8; len];
        stream
            .read_exact(&mut data)
            .await
            .map_err(|e| channel_error("read body", e))?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::net::UnixListener;

    #[test]
    fn test_path_encoding() {
        assert_eq!(encode_path("datacenter.cfg"), b"datacenter.cfg\0");
    }

    #[test]
    fn test_status_update_layout() {
        let payload = encode_status_update("tasks", b"{}");
        assert_eq!(payload.len(), STATUS_NAME_LEN + 2);
        assert_eq!(&payload[..5], b"tasks");
        assert_eq!(payload[5], 0);
        assert_eq!(&payload[STATUS_NAME_LEN..], b"{}");
    }

    #[test]
    fn test_status_get_layout() {
        let payload = encode_status_get("node1", "tasks");
        assert_eq!(payload.len(), 2 * STATUS_NAME_LEN);
        assert_eq!(&payload[..5], b"node1");
        assert_eq!(&payload[STATUS_NAME_LEN..STATUS_NAME_LEN + 5], b"tasks");
        assert_eq!(payload[STATUS_NAME_LEN + 5], 0);
    }

    #[test]
    fn test_status_name_truncation() {
        let long = "x".repeat(STATUS_NAME_LEN + 10);
        let payload = encode_status_update(&long, b"");
        assert_eq!(payload.len(), STATUS_NAME_LEN);
        assert_eq!(payload[STATUS_NAME_LEN - 1], 0);
    }

    #[test]
    fn test_log_append_layout() {
        let payload = encode_log_append(5, "vmctl", "start", "guest 100 started");
        assert_eq!(payload[0], 5);
        assert_eq!(&payload[1..], b"vmctl\0start\0guest 100 started\0");
    }

    #[test]
    fn test_cluster_log_request_layout() {
        assert_eq!(encode_cluster_log_request(50, None), 50u32.to_le_bytes());
        let with_user = encode_cluster_log_request(10, Some("root"));
        assert_eq!(&with_user[..4], &10u32.to_le_bytes());
        assert_eq!(&with_user[4..], b"root\0");
    }

    async fn serve_one(listener: UnixListener, status: i32, body: &'static [u8]) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut header = [0u8; 8];
        stream.read_exact(&mut header).await.unwrap();
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();

        let mut response = Vec::new();
        response.put_i32_le(status);
        response.put_u32_le(body.len() as u32);
        response.extend_from_slice(body);
        stream.write_all(&response).await.unwrap();
    }

    #[tokio::test]
    async fn test_unix_round_trip() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = tokio::spawn(serve_one(listener, 0, b"pong"));

        let transport = UnixTransport::new(socket);
        let data = transport
            .send(MessageKind::GetConfig, &encode_path("datacenter.cfg"))
            .await
            .unwrap();
        assert_eq!(data, b"pong");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_daemon_errno_is_preserved() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = tokio::spawn(serve_one(listener, -2, b""));

        let transport = UnixTransport::new(socket);
        let err = transport
            .send(MessageKind::GetConfig, &encode_path("missing.cfg"))
            .await
            .unwrap_err();
        assert!(matches!(err, QuorumFsError::DaemonError { errno: 2 }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_maps_to_none() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = tokio::spawn(serve_one(listener, -2, b""));

        let transport = UnixTransport::new(socket);
        let fetched = fetch_config(&transport, "missing.cfg").await.unwrap();
        assert!(fetched.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_socket_is_channel_unavailable() {
        let dir = TempDir::new().unwrap();
        let transport = UnixTransport::new(dir.path().join("absent.sock"));
        let err = transport
            .send(MessageKind::GetVersionVector, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, QuorumFsError::ChannelUnavailable { .. }));
    }
}
