//! UDP Transport
//!
//! Sends queued keep-alive datagrams to peers and delivers decoded
//! inbound datagrams to an event handler.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::protocol::{Message, MAX_DATAGRAM_SIZE};
use crate::error::{Error, Result};

/// Capacity of the outbound event queue
pub const OUTBOUND_QUEUE_SIZE: usize = 1024;

/// A datagram addressed to, or received from, `address` ("host:port")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpEvent {
    pub message: Message,
    pub address: String,
}

impl UdpEvent {
    pub fn new(message: Message, address: impl Into<String>) -> Self {
        Self {
            message,
            address: address.into(),
        }
    }

    /// Host part of the address, without port or IPv6 brackets
    pub fn host(&self) -> &str {
        let host = match self.address.rsplit_once(':') {
            Some((host, port)) if port.parse::<u16>().is_ok() => host,
            _ => self.address.as_str(),
        };
        host.trim_start_matches('[').trim_end_matches(']')
    }
}

/// Receives decoded inbound datagrams
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: UdpEvent);
}

/// UDP socket shared by the sender and receiver tasks
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the transport socket
    pub async fn bind(address: &str) -> Result<Self> {
        let socket = UdpSocket::bind(address).await.map_err(|e| {
            Error::Network(format!("Failed to bind keep-alive socket on {}: {}", address, e))
        })?;

        tracing::info!("Keep-alive transport listening on {}", socket.local_addr()?);

        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Create an outbound queue
    pub fn channel() -> (mpsc::Sender<UdpEvent>, mpsc::Receiver<UdpEvent>) {
        mpsc::channel(OUTBOUND_QUEUE_SIZE)
    }

    /// Start the sender task
    /// Each datagram is sent independently; a failure only affects that peer
    pub fn spawn_sender(&self, mut outbound_rx: mpsc::Receiver<UdpEvent>) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                if let Err(e) = send_event(&socket, &event).await {
                    tracing::debug!("Failed to send {} to {}: {}", event.message.message_type(), event.address, e);
                }
            }
            tracing::debug!("Outbound queue closed, sender stopped");
        })
    }

    /// Start the receiver task
    pub fn spawn_receiver(&self, handler: Arc<dyn EventHandler>) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];

            loop {
                let (len, src) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::trace!("Keep-alive recv error: {}", e);
                        continue;
                    }
                };

                let src = canonical_peer(src);

                match Message::decode(&buf[..len]) {
                    Ok(message) => {
                        tracing::trace!("Received {} from {}", message.message_type(), src);
                        handler.handle_event(UdpEvent::new(message, src.to_string()));
                    }
                    Err(e) => {
                        tracing::debug!("Dropping undecodable datagram from {}: {}", src, e);
                    }
                }
            }
        })
    }
}

/// Peer address as members are configured: IPv4-mapped IPv6 senders
/// (seen on a dual-stack socket) are reported as plain IPv4
fn canonical_peer(src: SocketAddr) -> SocketAddr {
    SocketAddr::new(src.ip().to_canonical(), src.port())
}

/// Destination for `address` on `socket`; IPv4 targets are mapped when
/// the socket is IPv6
fn resolve_target(socket: &UdpSocket, address: &str) -> Result<SocketAddr> {
    let target: SocketAddr = address
        .parse()
        .map_err(|_| Error::Network(format!("Invalid peer address: {}", address)))?;

    match (socket.local_addr()?, target) {
        (SocketAddr::V6(_), SocketAddr::V4(v4)) => Ok(SocketAddr::new(
            IpAddr::V6(v4.ip().to_ipv6_mapped()),
            v4.port(),
        )),
        _ => Ok(target),
    }
}

async fn send_event(socket: &UdpSocket, event: &UdpEvent) -> Result<()> {
    let datagram = event.message.encode()?;
    let target = resolve_target(socket, &event.address)?;
    socket
        .send_to(&datagram, target)
        .await
        .map_err(|e| Error::SendFailed {
            address: event.address.clone(),
            reason: e.to_string(),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupManager, BackupStatus};
    use crate::config::BackupConfig;
    use crate::network::protocol::KeepAliveMessage;
    use std::time::Duration;

    struct ChannelHandler {
        tx: mpsc::UnboundedSender<UdpEvent>,
    }

    impl EventHandler for ChannelHandler {
        fn handle_event(&self, event: UdpEvent) {
            let _ = self.tx.send(event);
        }
    }

    #[test]
    fn test_event_host() {
        let msg = Message::KeepAlive(KeepAliveMessage::new(true, 1));
        assert_eq!(UdpEvent::new(msg.clone(), "10.0.0.2:10001").host(), "10.0.0.2");
        assert_eq!(UdpEvent::new(msg.clone(), "[fd00::2]:10001").host(), "fd00::2");
        assert_eq!(UdpEvent::new(msg, "backup-a").host(), "backup-a");
    }

    #[tokio::test]
    async fn test_send_and_receive_keepalive() {
        let receiver = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let receiver_addr = receiver.local_addr().unwrap();
        let sender_addr = sender.local_addr().unwrap();

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let _recv_task = receiver.spawn_receiver(Arc::new(ChannelHandler { tx: event_tx }));

        let (outbound_tx, outbound_rx) = UdpTransport::channel();
        let _send_task = sender.spawn_sender(outbound_rx);

        let msg = Message::KeepAlive(KeepAliveMessage::new(true, 9));
        outbound_tx
            .send(UdpEvent::new(msg.clone(), receiver_addr.to_string()))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.message, msg);
        assert_eq!(event.host(), "127.0.0.1");
        assert_eq!(event.address, sender_addr.to_string());
    }

    #[tokio::test]
    async fn test_bad_destination_does_not_stop_sender() {
        let receiver = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let receiver_addr = receiver.local_addr().unwrap();

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let _recv_task = receiver.spawn_receiver(Arc::new(ChannelHandler { tx: event_tx }));

        let (outbound_tx, outbound_rx) = UdpTransport::channel();
        let _send_task = sender.spawn_sender(outbound_rx);

        let msg = Message::KeepAlive(KeepAliveMessage::new(false, 2));
        outbound_tx
            .send(UdpEvent::new(msg.clone(), "not a valid address"))
            .await
            .unwrap();
        outbound_tx
            .send(UdpEvent::new(msg.clone(), receiver_addr.to_string()))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.message, msg);
    }

    #[test]
    fn test_canonical_peer_unmaps_ipv4() {
        let mapped: SocketAddr = "[::ffff:10.0.0.2]:10001".parse().unwrap();
        assert_eq!(canonical_peer(mapped).to_string(), "10.0.0.2:10001");

        let native: SocketAddr = "[fd00::2]:10001".parse().unwrap();
        assert_eq!(canonical_peer(native), native);
    }

    #[tokio::test]
    async fn test_dual_stack_receiver_recognizes_ipv4_member() {
        // Skip where the host has no IPv6 stack
        let receiver = match UdpTransport::bind("[::]:0").await {
            Ok(t) => t,
            Err(_) => return,
        };
        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let receiver_port = receiver.local_addr().unwrap().port();

        let config = BackupConfig {
            members: vec!["127.0.0.1".to_string()],
            port: receiver_port,
            priority: 1,
            keepalive_timeout_ms: 3000,
        };
        let (manager_tx, _manager_rx) = mpsc::channel(8);
        let manager = Arc::new(BackupManager::new(&config, manager_tx));
        let _recv_task = receiver.spawn_receiver(Arc::clone(&manager) as Arc<dyn EventHandler>);

        let (outbound_tx, outbound_rx) = UdpTransport::channel();
        let _send_task = sender.spawn_sender(outbound_rx);
        outbound_tx
            .send(UdpEvent::new(
                Message::KeepAlive(KeepAliveMessage::new(true, 9)),
                format!("127.0.0.1:{}", receiver_port),
            ))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.status() != BackupStatus::Standby {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_dual_stack_sender_reaches_ipv4_peer() {
        let sender = match UdpTransport::bind("[::]:0").await {
            Ok(t) => t,
            Err(_) => return,
        };
        let receiver = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let receiver_addr = receiver.local_addr().unwrap();

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let _recv_task = receiver.spawn_receiver(Arc::new(ChannelHandler { tx: event_tx }));

        let (outbound_tx, outbound_rx) = UdpTransport::channel();
        let _send_task = sender.spawn_sender(outbound_rx);

        let msg = Message::KeepAlive(KeepAliveMessage::new(false, 4));
        outbound_tx
            .send(UdpEvent::new(msg.clone(), receiver_addr.to_string()))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.message, msg);
        assert_eq!(event.host(), "127.0.0.1");
    }
}
