//! Byte transports to the adapter

use crate::config::{LinkConfig, TransportConfig};
use crate::error::ObdError;
use crate::mock::MockAdapter;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

/// Bidirectional byte stream to an adapter
pub trait AdapterStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AdapterStream for T {}

pub type BoxedStream = Box<dyn AdapterStream>;

/// Open the stream described by `config.transport`
pub async fn open_transport(config: &LinkConfig) -> Result<BoxedStream, ObdError> {
    match &config.transport {
        TransportConfig::Tcp { host, port } => {
            let target = format!("{}:{}", host, port);
            info!("Connecting to adapter at {}", target);

            let stream = tokio::time::timeout(config.timeout(), TcpStream::connect(&target))
                .await
                .map_err(|_| ObdError::ConnectTimeout {
                    target: target.clone(),
                    timeout_ms: config.timeout_ms,
                })??;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        TransportConfig::Serial { device, baud_rate } => {
            info!("Opening serial adapter {} at {} baud", device, baud_rate);
            let port = tokio_serial::new(device.as_str(), *baud_rate)
                .timeout(config.timeout())
                .open_native_async()?;
            Ok(Box::new(port))
        }
        TransportConfig::Mock => {
            debug!("Using simulated adapter");
            Ok(Box::new(MockAdapter::default().spawn()))
        }
    }
}
