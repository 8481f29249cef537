//! Outbound peer connections
//!
//! One message per connection: connect, write the encoded message, shut the
//! write half down and drop the stream.

use lamport_protocol::{Message, NodeAddress};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::NodeError;

/// Sends single messages to peers
#[derive(Debug, Clone)]
pub struct PeerClient {
    connect_timeout: Duration,
}

impl PeerClient {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Open a fresh connection to `target`, transmit `message`, close
    pub async fn send(&self, target: &NodeAddress, message: &Message) -> Result<(), NodeError> {
        let payload = message.encode()?;
        let mut stream = connect(target, self.connect_timeout).await?;

        stream.write_all(&payload).await?;
        stream.shutdown().await?;

        debug!(peer = %target, clock = message.clock, "message delivered");
        Ok(())
    }
}

/// Connect to `addr`, giving up after `timeout`
pub(crate) async fn connect(addr: &NodeAddress, timeout: Duration) -> Result<TcpStream, NodeError> {
    match tokio::time::timeout(timeout, TcpStream::connect((addr.host.as_str(), addr.port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(NodeError::Connect {
            addr: addr.to_string(),
            source: e,
        }),
        Err(_) => Err(NodeError::ConnectTimeout {
            addr: addr.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_writes_one_message_then_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = PeerClient::new(Duration::from_secs(1));
        let target = NodeAddress::new("127.0.0.1", port);
        let send = tokio::spawn(async move { client.send(&target, &Message::new(4, 12)).await });

        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();

        send.await.unwrap().unwrap();
        assert_eq!(Message::decode(&buf).unwrap(), Message::new(4, 12));
    }

    #[tokio::test]
    async fn test_send_to_closed_port_fails() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let client = PeerClient::new(Duration::from_secs(1));
        let result = client
            .send(&NodeAddress::new("127.0.0.1", port), &Message::new(1, 1))
            .await;

        assert!(matches!(
            result,
            Err(NodeError::Connect { .. }) | Err(NodeError::ConnectTimeout { .. })
        ));
    }
}
