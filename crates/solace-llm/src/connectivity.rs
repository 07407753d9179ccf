use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use solace_core::connectivity::ConnectivityProbe;
use solace_core::errors::GatewayError;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Online when a TCP connection to the provider host opens in time.
#[derive(Clone, Debug)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Probe the host and port a provider base URL points at.
    pub fn for_base_url(base_url: &str, timeout: Option<Duration>) -> Result<Self, GatewayError> {
        let url = reqwest::Url::parse(base_url)
            .map_err(|e| GatewayError::Configuration(format!("invalid base URL {base_url}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| GatewayError::Configuration(format!("base URL has no host: {base_url}")))?;
        let port = url.port_or_known_default().unwrap_or(443);
        Ok(Self::new(host, port, timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT)))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn is_online(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, port = self.port, error = %e, "connectivity probe failed");
                false
            }
            Err(_) => {
                debug!(host = %self.host, port = self.port, "connectivity probe timed out");
                false
            }
        }
    }
}

/// Fixed answer, switchable at runtime. Used in tests and when probing is disabled.
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for StaticConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
