//! The UDP socket and its receive loop.

use crate::config::ClientOptions;
use crate::error::{Error, Result};
use lifx_core::{decode, Packet};
use log::{debug, trace, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Receives every packet that decodes successfully.
pub(crate) trait InboundHandler: Send + Sync + 'static {
    fn handle(&self, packet: Packet, from: SocketAddr);
}

struct Running {
    socket: Arc<UdpSocket>,
    shutdown: CancellationToken,
    recv_task: JoinHandle<()>,
}

/// Owns the one socket used for all traffic, plus the identifier and sequence counters.
pub(crate) struct Transport {
    options: ClientOptions,
    running: Mutex<Option<Running>>,
    identifier: AtomicU32,
    sequence: AtomicU8,
}

impl Transport {
    pub fn new(options: ClientOptions) -> Transport {
        Transport {
            options,
            running: Mutex::new(None),
            identifier: AtomicU32::new(rand::random()),
            sequence: AtomicU8::new(rand::random()),
        }
    }

    /// Binds the socket and spawns the receive loop.
    pub async fn start(&self, handler: Arc<dyn InboundHandler>) -> Result<()> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let socket = Arc::new(UdpSocket::from_std(bind_socket(self.options.port)?)?);
        debug!("Listening on {}", socket.local_addr()?);
        let shutdown = CancellationToken::new();
        let recv_task = tokio::spawn(receive_loop(socket.clone(), shutdown.clone(), handler));

        *running = Some(Running {
            socket,
            shutdown,
            recv_task,
        });
        Ok(())
    }

    /// Cancels the receive loop, waits for it to finish and releases the socket.
    ///
    /// Does nothing if the transport is not running.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.shutdown.cancel();
            if let Err(e) = running.recv_task.await {
                warn!("Receive loop ended abnormally: {}", e);
            }
            debug!("Transport stopped");
        }
    }

    /// Signals the receive loop and all waiters to stop without waiting for them.
    pub fn cancel(&self) {
        if let Some(running) = &*self.running.lock().unwrap_or_else(PoisonError::into_inner) {
            running.shutdown.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// A token that fires when the transport is stopped.
    pub fn shutdown_token(&self) -> Result<CancellationToken> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.shutdown.clone())
            .ok_or(Error::NotStarted)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket()?.local_addr()?)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Next request identifier.  Zero is reserved for "no reply expected" and is skipped.
    pub fn next_identifier(&self) -> u32 {
        loop {
            let id = self.identifier.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    pub fn next_sequence(&self) -> u8 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends `bytes` to `target`, or to the broadcast address when `target` is `None`.
    pub async fn send(&self, target: Option<SocketAddr>, bytes: &[u8]) -> Result<()> {
        let socket = self.socket()?;
        let addr = target.unwrap_or_else(|| {
            SocketAddr::V4(SocketAddrV4::new(
                self.options.broadcast_address,
                self.options.device_port,
            ))
        });
        trace!("Sending {} bytes to {}", bytes.len(), addr);
        socket.send_to(bytes, addr).await?;
        Ok(())
    }

    fn socket(&self) -> Result<Arc<UdpSocket>> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.socket.clone())
            .ok_or(Error::NotStarted)
    }
}

/// Address reuse has to be enabled before binding, which tokio cannot do.
fn bind_socket(port: u16) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;
    Ok(std::net::UdpSocket::from(socket))
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    shutdown: CancellationToken,
    handler: Arc<dyn InboundHandler>,
) {
    let mut buf = [0; 1024];
    loop {
        let (nbytes, addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = socket.recv_from(&mut buf) => match res {
                Ok(r) => r,
                Err(e) => {
                    warn!("Error receiving from socket: {}", e);
                    continue;
                }
            },
        };
        trace!("Received {} bytes from {}: {:02x?}", nbytes, addr, &buf[..nbytes]);

        match decode(&buf[..nbytes]) {
            Ok(packet) => handler.handle(packet, addr),
            Err(e) => debug!("Dropping packet from {}: {}", addr, e),
        }
    }
    debug!("Receive loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifx_core::{encode, FrameHeader, MessageType};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Forward(mpsc::UnboundedSender<Packet>);

    impl InboundHandler for Forward {
        fn handle(&self, packet: Packet, _from: SocketAddr) {
            let _ = self.0.send(packet);
        }
    }

    fn loopback_options() -> ClientOptions {
        ClientOptions {
            port: 0,
            broadcast_address: Ipv4Addr::LOCALHOST,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let transport = Transport::new(loopback_options());
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler = Arc::new(Forward(tx));

        assert!(matches!(transport.send(None, &[]).await, Err(Error::NotStarted)));
        assert!(matches!(transport.shutdown_token(), Err(Error::NotStarted)));

        transport.start(handler.clone()).await.unwrap();
        assert!(transport.is_running());
        assert!(matches!(
            transport.start(handler.clone()).await,
            Err(Error::AlreadyStarted)
        ));

        let token = transport.shutdown_token().unwrap();
        transport.stop().await;
        assert!(token.is_cancelled());
        assert!(!transport.is_running());
        transport.stop().await;

        // restart after stop
        transport.start(handler).await.unwrap();
        transport.stop().await;
    }

    #[tokio::test]
    async fn test_failed_start_leaves_nothing_running() {
        // held without address reuse, so our bind has to fail
        let taken = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let transport = Transport::new(ClientOptions {
            port: taken.local_addr().unwrap().port(),
            ..loopback_options()
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler = Arc::new(Forward(tx));

        assert!(matches!(transport.start(handler.clone()).await, Err(Error::Io(_))));
        assert!(!transport.is_running());
        assert!(matches!(transport.shutdown_token(), Err(Error::NotStarted)));
        // only the failed attempt held the handler
        assert_eq!(Arc::strong_count(&handler), 1);

        drop(taken);
        transport.start(handler).await.unwrap();
        transport.stop().await;
    }

    #[tokio::test]
    async fn test_routes_decoded_packets_and_drops_garbage() {
        let transport = Transport::new(loopback_options());
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.start(Arc::new(Forward(tx))).await.unwrap();
        let port = transport.local_addr().unwrap().port();
        let dest = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(&[1, 2, 3], dest).await.unwrap();
        let bytes = encode(&FrameHeader::new(77), MessageType::DeviceStateLabel, &[0; 32]).unwrap();
        peer.send_to(&bytes, dest).await.unwrap();

        let packet = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(packet.source, 77);
        assert_eq!(packet.typ, MessageType::DeviceStateLabel);

        transport.stop().await;
    }

    #[test]
    fn test_identifier_skips_zero() {
        let transport = Transport::new(ClientOptions::default());
        transport.identifier.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(transport.next_identifier(), u32::MAX);
        assert_eq!(transport.next_identifier(), 1);
    }
}
