//! NetworkSink - UDP fire-and-forget streaming of depth events
//!
//! 一条事件一个数据报；超过 `max_packet_size` 的事件不发送并记为写失败。

use contracts::{ContractError, DataSink, DepthEvent};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, error, instrument, warn};

/// 65507 is the IPv4 UDP payload limit
const DEFAULT_MAX_PACKET_SIZE: usize = 65000;

/// Serialization format for network transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    /// JSON (human-readable, larger)
    #[default]
    Json,
    /// Bincode (binary, compact)
    Bincode,
}

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    pub addr: SocketAddr,
    pub format: NetworkFormat,
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            format: NetworkFormat::default(),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    /// Create config from params map
    ///
    /// `addr` is required; `format` (`json` | `bincode`) and `max_packet_size` are optional.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{addr_str}': {e}"))?;

        let format = match params.get("format").map(String::as_str) {
            Some("bincode") => NetworkFormat::Bincode,
            Some("json") | None => NetworkFormat::Json,
            Some(other) => return Err(format!("unknown format '{other}'")),
        };

        let max_packet_size = match params.get("max_packet_size") {
            Some(s) => s
                .parse()
                .map_err(|e| format!("invalid max_packet_size '{s}': {e}"))?,
            None => DEFAULT_MAX_PACKET_SIZE,
        };

        Ok(Self {
            addr,
            format,
            max_packet_size,
        })
    }
}

/// Sink that sends depth events over UDP
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: Option<UdpSocket>,
}

impl NetworkSink {
    #[instrument(name = "network_sink_new", skip(name, config), fields(target = %config.addr))]
    pub async fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        let bind_addr = if config.addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(&config.addr).await?;

        debug!(sink = %name, target = %config.addr, "NetworkSink connected");

        Ok(Self {
            name,
            config,
            socket: Some(socket),
        })
    }

    /// Create from params (for factory)
    #[instrument(name = "network_sink_from_params", skip(name, params))]
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::sink_connection(&name, e))?;

        Self::new(name.clone(), config)
            .await
            .map_err(|e| ContractError::sink_connection(&name, e.to_string()))
    }

    fn serialize_event(&self, event: &DepthEvent) -> Result<Vec<u8>, String> {
        match self.config.format {
            NetworkFormat::Json => serde_json::to_vec(event).map_err(|e| format!("json error: {e}")),
            NetworkFormat::Bincode => {
                bincode::serialize(event).map_err(|e| format!("bincode error: {e}"))
            }
        }
    }

    fn socket(&self) -> Result<&UdpSocket, ContractError> {
        self.socket
            .as_ref()
            .ok_or_else(|| ContractError::sink_write(&self.name, "socket not connected"))
    }

    fn prepare_payload(&self, event: &DepthEvent) -> Result<Vec<u8>, ContractError> {
        let data = self
            .serialize_event(event)
            .map_err(|e| ContractError::sink_write(&self.name, e))?;

        if data.len() > self.config.max_packet_size {
            warn!(
                sink = %self.name,
                size = data.len(),
                max = self.config.max_packet_size,
                "Packet too large, event not sent"
            );
            return Err(ContractError::sink_write(
                &self.name,
                format!(
                    "payload of {} bytes exceeds max_packet_size {}",
                    data.len(),
                    self.config.max_packet_size
                ),
            ));
        }

        Ok(data)
    }

    async fn transmit(&self, socket: &UdpSocket, data: &[u8], timestamp_ms: u64) {
        match socket.send(data).await {
            Ok(sent) => debug!(sink = %self.name, timestamp_ms, bytes = sent, "Sent"),
            // UDP is best-effort
            Err(e) => error!(sink = %self.name, error = %e, "UDP send failed"),
        }
    }
}

impl DataSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_write",
        skip(self, event),
        fields(sink = %self.name, timestamp_ms = event.timestamp_ms)
    )]
    async fn write(&mut self, event: &DepthEvent) -> Result<(), ContractError> {
        let socket = self.socket()?;
        let data = self.prepare_payload(event)?;
        self.transmit(socket, &data, event.timestamp_ms).await;
        Ok(())
    }

    #[instrument(name = "network_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.socket = None;
        debug!(sink = %self.name, "NetworkSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::tests::event;
    use tokio::time::{timeout, Duration};

    async fn receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    #[test]
    fn test_config_parsing() {
        let mut params = HashMap::new();
        params.insert("addr".to_string(), "127.0.0.1:9999".to_string());
        params.insert("format".to_string(), "bincode".to_string());

        let config = NetworkSinkConfig::from_params(&params).unwrap();
        assert_eq!(config.addr.port(), 9999);
        assert_eq!(config.format, NetworkFormat::Bincode);
        assert_eq!(config.max_packet_size, DEFAULT_MAX_PACKET_SIZE);
    }

    #[test]
    fn test_config_requires_addr() {
        let err = NetworkSinkConfig::from_params(&HashMap::new()).unwrap_err();
        assert!(err.contains("addr"));
    }

    #[tokio::test]
    async fn test_json_datagram_received() {
        let (rx, addr) = receiver().await;
        let mut sink = NetworkSink::new("net", NetworkSinkConfig::new(addr)).await.unwrap();

        sink.write(&event(4_000)).await.unwrap();

        let mut buf = vec![0u8; 65536];
        let n = timeout(Duration::from_secs(1), rx.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(value["timestamp_ms"], 4000);
        assert_eq!(value["record"]["samples"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_bincode_is_smaller_than_json() {
        let (_rx, addr) = receiver().await;
        let json = NetworkSink::new("net", NetworkSinkConfig::new(addr)).await.unwrap();
        let bin = NetworkSink::new(
            "net",
            NetworkSinkConfig {
                format: NetworkFormat::Bincode,
                ..NetworkSinkConfig::new(addr)
            },
        )
        .await
        .unwrap();

        let e = event(1);
        assert!(bin.prepare_payload(&e).unwrap().len() < json.prepare_payload(&e).unwrap().len());
    }

    #[tokio::test]
    async fn test_oversized_payload_is_rejected() {
        let (_rx, addr) = receiver().await;
        let config = NetworkSinkConfig {
            max_packet_size: 16,
            ..NetworkSinkConfig::new(addr)
        };
        let mut sink = NetworkSink::new("net", config).await.unwrap();
        assert!(sink.write(&event(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (_rx, addr) = receiver().await;
        let mut sink = NetworkSink::new("net", NetworkSinkConfig::new(addr)).await.unwrap();
        sink.close().await.unwrap();
        assert!(sink.write(&event(1)).await.is_err());
    }
}
