use crate::config::ClientOptions;
use crate::correlation::{self, ExpectedResponse, PendingRequests};
use crate::device::{Device, LightBulb};
use crate::discovery::{Discovery, DiscoveryEvent};
use crate::error::{Error, Result};
use crate::transport::{InboundHandler, Transport};
use lifx_core::{Acknowledgement, FrameHeader, MessageType, Packet, Response};
use log::{debug, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::lookup_host;
use tokio::sync::mpsc;

/// Routes StateService replies to discovery, everything else to waiting requests.
struct Dispatcher {
    pending: Arc<PendingRequests>,
    discovery: Arc<Discovery>,
}

impl InboundHandler for Dispatcher {
    fn handle(&self, packet: Packet, from: SocketAddr) {
        let response = match Response::from_packet(&packet) {
            Ok(response) => response,
            Err(e) => {
                debug!("Dropping {:?} from {}: {}", packet.typ, from, e);
                return;
            }
        };
        match response {
            Response::StateService(service) => self.discovery.handle_state_service(
                packet.source,
                packet.header.target_mac(),
                from.ip().to_string(),
                service,
            ),
            response => {
                self.pending.resolve(packet.source, response);
            }
        }
    }
}

/// A LIFX LAN client: one UDP socket, request/response matching, and device discovery.
///
/// ```no_run
/// # async fn run() -> Result<(), lifx_lan::Error> {
/// use lifx_lan::{ClientOptions, LanClient};
///
/// let client = LanClient::new(ClientOptions::default());
/// client.start().await?;
/// client.start_discovery().await?;
/// tokio::time::sleep(std::time::Duration::from_secs(3)).await;
/// for bulb in client.devices() {
///     println!("{}: {}", bulb, client.get_device_label(&bulb).await?);
/// }
/// client.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct LanClient {
    transport: Arc<Transport>,
    pending: Arc<PendingRequests>,
    discovery: Arc<Discovery>,
}

impl LanClient {
    pub fn new(options: ClientOptions) -> LanClient {
        LanClient {
            transport: Arc::new(Transport::new(options)),
            pending: Arc::new(PendingRequests::default()),
            discovery: Arc::new(Discovery::default()),
        }
    }

    /// Binds the socket and starts receiving.  Fails with [Error::AlreadyStarted] if running.
    pub async fn start(&self) -> Result<()> {
        let handler = Arc::new(Dispatcher {
            pending: self.pending.clone(),
            discovery: self.discovery.clone(),
        });
        self.transport.start(handler).await?;
        info!("LIFX client listening on {}", self.transport.local_addr()?);
        Ok(())
    }

    /// Stops discovery and the receive loop, failing every in-flight request with
    /// [Error::Cancelled].  Calling it again, or before [start](LanClient::start), does nothing.
    ///
    /// The client can be started again afterwards.
    pub async fn stop(&self) {
        self.discovery.end().await;
        self.transport.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.transport.is_running()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn options(&self) -> &ClientOptions {
        self.transport.options()
    }

    /// Begins broadcasting GetService periodically under a fresh session identifier.
    ///
    /// Does nothing if discovery is already running.
    pub async fn start_discovery(&self) -> Result<()> {
        let shutdown = self.transport.shutdown_token()?;
        let session_id = self.transport.next_identifier();
        if !self.discovery.begin(
            self.transport.clone(),
            self.pending.clone(),
            session_id,
            &shutdown,
        ) {
            debug!("Discovery is already running");
        }
        Ok(())
    }

    /// Stops the discovery loop.  Known devices stay in the registry.
    pub async fn stop_discovery(&self) {
        self.discovery.end().await;
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.is_running()
    }

    /// Receives a [DiscoveryEvent] for every device found or lost from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DiscoveryEvent> {
        self.discovery.subscribe()
    }

    /// A snapshot of every known device.
    pub fn devices(&self) -> Vec<LightBulb> {
        self.discovery.devices()
    }

    pub fn device_by_mac(&self, mac: [u8; 6]) -> Option<LightBulb> {
        self.discovery.device_by_mac(&mac)
    }

    /// Sends a message and waits for a reply of type `T`.
    ///
    /// `target` of `None` broadcasts.  Returns `Ok(None)` without waiting when
    /// `header.identifier` is zero or `T` is [UnknownResponse](lifx_core::UnknownResponse).
    /// Fails with [Error::Timeout] if no matching reply arrives within
    /// [response_timeout](ClientOptions::response_timeout).
    pub async fn send_and_await<T: ExpectedResponse>(
        &self,
        target: Option<SocketAddr>,
        header: &FrameHeader,
        typ: MessageType,
        payload: &[u8],
    ) -> Result<Option<T>> {
        correlation::send_and_await(&self.transport, &self.pending, target, header, typ, payload)
            .await
    }

    /// A header with a fresh identifier and sequence number.
    pub fn new_header(&self) -> FrameHeader {
        FrameHeader {
            identifier: self.transport.next_identifier(),
            sequence: self.transport.next_sequence(),
            ..Default::default()
        }
    }

    /// Sends a Get message to `device` and waits for the `T` it answers with.
    pub(crate) async fn get<T, D>(&self, device: &D, typ: MessageType) -> Result<T>
    where
        T: ExpectedResponse,
        D: Device + ?Sized,
    {
        let mut header = self.new_header();
        header.res_required = true;
        self.request(device, &header, typ, &[]).await
    }

    /// Sends a Set message to `device` and waits for its acknowledgement.
    pub(crate) async fn set<D>(&self, device: &D, typ: MessageType, payload: &[u8]) -> Result<()>
    where
        D: Device + ?Sized,
    {
        let mut header = self.new_header();
        header.ack_required = true;
        let _: Acknowledgement = self.request(device, &header, typ, payload).await?;
        Ok(())
    }

    async fn request<T, D>(
        &self,
        device: &D,
        header: &FrameHeader,
        typ: MessageType,
        payload: &[u8],
    ) -> Result<T>
    where
        T: ExpectedResponse,
        D: Device + ?Sized,
    {
        // checked first so an unresolvable host on a stopped client reports NotStarted
        self.transport.shutdown_token()?;
        let target = self.resolve(device.host_name()).await?;
        self.send_and_await::<T>(Some(target), header, typ, payload)
            .await?
            .ok_or(Error::UnexpectedResponse(typ))
    }

    async fn resolve(&self, host: &str) -> Result<SocketAddr> {
        let port = self.transport.options().device_port;
        let mut addrs = lookup_host((host, port)).await.map_err(|e| {
            debug!("Lookup of {} failed: {}", host, e);
            Error::UnresolvedHost(host.to_owned())
        })?;
        addrs
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| Error::UnresolvedHost(host.to_owned()))
    }
}

impl Drop for LanClient {
    fn drop(&mut self) {
        self.discovery.cancel();
        self.transport.cancel();
    }
}
