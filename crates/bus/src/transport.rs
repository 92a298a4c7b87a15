use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BusError;

const IPC_DIR: &str = "/tmp/floorline";

/// ZeroMQ endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Unix domain socket, named relative to `/tmp/floorline/` or given as an absolute path.
    Ipc(String),

    Tcp { host: String, port: u16 },
}

impl Transport {
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(name.to_string())
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parse an endpoint string such as `tcp://127.0.0.1:5555` or `ipc:///tmp/x.sock`.
    pub fn parse(endpoint: &str) -> Result<Self, BusError> {
        let endpoint = endpoint.trim();
        if let Some(path) = endpoint.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(BusError::InvalidEndpoint(endpoint.to_string()));
            }
            return Ok(Self::Ipc(path.to_string()));
        }
        if let Some(addr) = endpoint.strip_prefix("tcp://") {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| BusError::InvalidEndpoint(endpoint.to_string()))?;
            let port = port
                .parse::<u16>()
                .map_err(|_| BusError::InvalidEndpoint(endpoint.to_string()))?;
            if host.is_empty() {
                return Err(BusError::InvalidEndpoint(endpoint.to_string()));
            }
            return Ok(Self::tcp(host, port));
        }
        Err(BusError::InvalidEndpoint(endpoint.to_string()))
    }

    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(name) if name.starts_with('/') => format!("ipc://{name}"),
            Self::Ipc(name) => format!("ipc://{IPC_DIR}/{name}.sock"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// Create the socket directory for IPC endpoints. No-op for TCP.
    pub fn ensure_ipc_dir(&self) -> std::io::Result<()> {
        if let Self::Ipc(_) = self {
            let endpoint = self.endpoint();
            let path = endpoint.strip_prefix("ipc://").unwrap_or(&endpoint);
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}
