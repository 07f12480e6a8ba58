//! Periodic device discovery and the registry of known devices.

use crate::correlation::{send_and_await, PendingRequests};
use crate::device::{Device, LightBulb};
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use lifx_core::{FrameHeader, MessageType, StateService, UnknownResponse};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Notifications delivered to [subscribe](crate::LanClient::subscribe)rs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A device answered discovery for the first time.
    Discovered(LightBulb),
    /// A device stopped answering and was removed from the registry.
    Lost(LightBulb),
}

/// Known devices keyed by MAC address.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    devices: HashMap<[u8; 6], LightBulb>,
}

impl Registry {
    /// Records a sighting.  Returns the new device if this MAC was not known before.
    pub fn observe(
        &mut self,
        mac: [u8; 6],
        host_name: String,
        service: StateService,
        seen: DateTime<Utc>,
    ) -> Option<LightBulb> {
        if let Some(bulb) = self.devices.get_mut(&mac) {
            bulb.refresh(host_name, seen);
            return None;
        }
        match LightBulb::new(host_name, mac, service.service, service.port) {
            Ok(mut bulb) => {
                bulb.set_last_seen(seen);
                self.devices.insert(mac, bulb.clone());
                Some(bulb)
            }
            Err(e) => {
                warn!("Ignoring device {:?}: {}", mac, e);
                None
            }
        }
    }

    /// Removes and returns every device unseen for at least `expiry`.
    pub fn sweep(&mut self, now: DateTime<Utc>, expiry: chrono::Duration) -> Vec<LightBulb> {
        let expired: Vec<[u8; 6]> = self
            .devices
            .iter()
            .filter(|(_, bulb)| now - bulb.last_seen() >= expiry)
            .map(|(mac, _)| *mac)
            .collect();
        expired
            .into_iter()
            .filter_map(|mac| self.devices.remove(&mac))
            .collect()
    }

    pub fn get(&self, mac: &[u8; 6]) -> Option<&LightBulb> {
        self.devices.get(mac)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LightBulb> {
        self.devices.values()
    }
}

struct Session {
    id: u32,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Discovery state shared between the client, the receive loop and the probe loop.
#[derive(Default)]
pub(crate) struct Discovery {
    registry: Mutex<Registry>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<DiscoveryEvent>>>,
    session: Mutex<Option<Session>>,
}

impl Discovery {
    /// Starts a probe loop under `session_id`, unless one is already running.
    ///
    /// Returns false if a session was already active.
    pub fn begin(
        self: &Arc<Self>,
        transport: Arc<Transport>,
        pending: Arc<PendingRequests>,
        session_id: u32,
        shutdown: &CancellationToken,
    ) -> bool {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(s) = &*session {
            if !s.cancel.is_cancelled() {
                return false;
            }
        }

        let cancel = shutdown.child_token();
        let task = tokio::spawn(probe_loop(
            transport,
            pending,
            self.clone(),
            session_id,
            cancel.clone(),
        ));
        info!("Starting discovery session {}", session_id);
        *session = Some(Session {
            id: session_id,
            cancel,
            task,
        });
        true
    }

    /// Cancels the probe loop and waits for it to exit.  Does nothing if none is running.
    pub async fn end(&self) {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            session.cancel.cancel();
            if let Err(e) = session.task.await {
                warn!("Discovery loop ended abnormally: {}", e);
            }
            info!("Stopped discovery session {}", session.id);
        }
    }

    pub fn cancel(&self) {
        if let Some(session) = &*self.session.lock().unwrap_or_else(PoisonError::into_inner) {
            session.cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        match &*self.session.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(session) => !session.cancel.is_cancelled(),
            None => false,
        }
    }

    /// Handles a StateService reply.
    ///
    /// Replies whose source is not the live session's identifier are stale and dropped.
    pub fn handle_state_service(
        &self,
        source: u32,
        mac: [u8; 6],
        host_name: String,
        service: StateService,
    ) {
        let accepted = match &*self.session.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(session) => session.id == source && !session.cancel.is_cancelled(),
            None => false,
        };
        if !accepted {
            debug!("Ignoring StateService from {} for session {}", host_name, source);
            return;
        }

        let discovered = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(mac, host_name, service, Utc::now());
        if let Some(bulb) = discovered {
            info!("Discovered {}", bulb);
            self.emit(DiscoveryEvent::Discovered(bulb));
        }
    }

    /// Evicts stale devices and notifies subscribers about each one.
    pub fn sweep(&self, now: DateTime<Utc>, expiry: chrono::Duration) {
        let lost = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sweep(now, expiry);
        for bulb in lost {
            info!("Lost {}", bulb);
            self.emit(DiscoveryEvent::Lost(bulb));
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DiscoveryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn devices(&self) -> Vec<LightBulb> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn device_by_mac(&self, mac: &[u8; 6]) -> Option<LightBulb> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(mac)
            .cloned()
    }

    fn emit(&self, event: DiscoveryEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Broadcasts GetService, sleeps, then evicts stale devices, until cancelled.
async fn probe_loop(
    transport: Arc<Transport>,
    pending: Arc<PendingRequests>,
    discovery: Arc<Discovery>,
    session_id: u32,
    cancel: CancellationToken,
) {
    let interval = transport.options().discovery_interval;
    let expiry = chrono::Duration::from_std(transport.options().device_expiry)
        .unwrap_or(chrono::Duration::MAX);

    loop {
        let header = FrameHeader {
            identifier: session_id,
            sequence: transport.next_sequence(),
            ..Default::default()
        };
        let probe = send_and_await::<UnknownResponse>(
            &transport,
            &pending,
            None,
            &header,
            MessageType::DeviceGetService,
            &[],
        );
        if let Err(e) = probe.await {
            warn!("Failed to send discovery probe: {}", e);
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        discovery.sweep(Utc::now(), expiry);
    }
    debug!("Discovery loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientOptions;

    const MAC: [u8; 6] = [0xD0, 0x73, 0xD5, 0x00, 0x00, 0x01];
    const SERVICE: StateService = StateService {
        service: 1,
        port: 56700,
    };

    fn minutes(n: i64) -> chrono::Duration {
        chrono::Duration::minutes(n)
    }

    #[test]
    fn test_registry_observe_and_refresh() {
        let mut registry = Registry::default();
        let t0 = Utc::now();

        let bulb = registry
            .observe(MAC, "10.0.0.2".into(), SERVICE, t0)
            .unwrap();
        assert_eq!(bulb.host_name(), "10.0.0.2");
        assert_eq!(bulb.port(), 56700);
        assert_eq!(bulb.last_seen(), t0);

        let t1 = t0 + minutes(1);
        assert!(registry
            .observe(MAC, "10.0.0.3".into(), SERVICE, t1)
            .is_none());
        let bulb = registry.get(&MAC).unwrap();
        assert_eq!(bulb.host_name(), "10.0.0.3");
        assert_eq!(bulb.last_seen(), t1);
    }

    #[test]
    fn test_registry_sweep() {
        let mut registry = Registry::default();
        let t0 = Utc::now();
        let other = [0xD0, 0x73, 0xD5, 0x00, 0x00, 0x02];
        registry.observe(MAC, "10.0.0.2".into(), SERVICE, t0);
        registry.observe(other, "10.0.0.4".into(), SERVICE, t0 + minutes(3));

        assert!(registry.sweep(t0 + minutes(4), minutes(5)).is_empty());

        // exactly at the threshold counts as expired
        let lost = registry.sweep(t0 + minutes(5), minutes(5));
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].mac_address(), MAC);
        assert!(registry.get(&MAC).is_none());
        assert!(registry.get(&other).is_some());

        // already removed, so no second notification
        assert!(registry.sweep(t0 + minutes(6), minutes(5)).is_empty());
    }

    #[test]
    fn test_blank_host_not_registered() {
        let mut registry = Registry::default();
        assert!(registry.observe(MAC, "".into(), SERVICE, Utc::now()).is_none());
        assert!(registry.get(&MAC).is_none());
    }

    #[tokio::test]
    async fn test_events_and_stale_sessions() {
        let discovery = Discovery::default();
        let mut events = discovery.subscribe();

        // no session running
        discovery.handle_state_service(7, MAC, "10.0.0.2".into(), SERVICE);
        assert!(discovery.devices().is_empty());

        *discovery.session.lock().unwrap() = Some(Session {
            id: 7,
            cancel: CancellationToken::new(),
            task: tokio::spawn(async {}),
        });

        discovery.handle_state_service(8, MAC, "10.0.0.2".into(), SERVICE);
        assert!(discovery.devices().is_empty());

        discovery.handle_state_service(7, MAC, "10.0.0.2".into(), SERVICE);
        discovery.handle_state_service(7, MAC, "10.0.0.9".into(), SERVICE);
        assert_eq!(discovery.devices().len(), 1);
        assert_eq!(
            discovery.device_by_mac(&MAC).unwrap().host_name(),
            "10.0.0.9"
        );

        match events.try_recv() {
            Ok(DiscoveryEvent::Discovered(bulb)) => assert_eq!(bulb.host_name(), "10.0.0.2"),
            other => panic!("expected a discovered event, got {:?}", other),
        }
        assert!(events.try_recv().is_err());

        discovery.sweep(Utc::now() + minutes(5), minutes(5));
        assert!(matches!(events.try_recv(), Ok(DiscoveryEvent::Lost(_))));
        assert!(events.try_recv().is_err());
        assert!(discovery.devices().is_empty());
    }

    #[test]
    fn test_closed_subscribers_are_dropped() {
        let discovery = Discovery::default();
        let rx = discovery.subscribe();
        drop(rx);
        let mut live = discovery.subscribe();
        discovery.emit(DiscoveryEvent::Lost(
            LightBulb::new("10.0.0.2", MAC, 1, 56700).unwrap(),
        ));
        assert_eq!(discovery.subscribers.lock().unwrap().len(), 1);
        assert!(live.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_begin_is_idempotent() {
        let options = ClientOptions {
            port: 0,
            broadcast_address: std::net::Ipv4Addr::LOCALHOST,
            ..Default::default()
        };
        let transport = Arc::new(Transport::new(options));
        let pending = Arc::new(PendingRequests::default());
        let discovery = Arc::new(Discovery::default());

        struct Ignore;
        impl crate::transport::InboundHandler for Ignore {
            fn handle(&self, _: lifx_core::Packet, _: std::net::SocketAddr) {}
        }
        transport.start(Arc::new(Ignore)).await.unwrap();
        let shutdown = transport.shutdown_token().unwrap();

        assert!(discovery.begin(transport.clone(), pending.clone(), 11, &shutdown));
        assert!(!discovery.begin(transport.clone(), pending.clone(), 12, &shutdown));
        assert!(discovery.is_running());

        discovery.end().await;
        assert!(!discovery.is_running());
        discovery.end().await;

        transport.stop().await;
    }
}
