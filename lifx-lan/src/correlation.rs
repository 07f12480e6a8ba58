//! Matching replies to the requests that asked for them.
//!
//! Every request that wants a reply carries a non-zero source identifier.  Before the packet is
//! sent, a one-shot slot is registered under that identifier; the receive loop resolves it with
//! the first reply of the expected type.  The slot is removed when the waiter finishes, whether
//! it got a reply, timed out, or was cancelled.

use crate::error::{Error, Result};
use crate::transport::Transport;
use lifx_core::{
    encode, Acknowledgement, FrameHeader, InfraredState, LightState, LightStatePower,
    MessageType, Response, StateGroup, StateHostFirmware, StateLabel, StatePower, StateService,
    StateVersion, UnknownResponse,
};
use log::trace;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A reply type that [send_and_await](crate::LanClient::send_and_await) can wait for.
pub trait ExpectedResponse: Sized + Send + 'static {
    /// `false` makes the request fire-and-forget.
    const AWAITS_REPLY: bool = true;

    fn matches(response: &Response) -> bool;

    fn extract(response: Response) -> Option<Self>;
}

macro_rules! expected_response {
    ( $( $variant:ident ),* ) => {
        $(
            impl ExpectedResponse for $variant {
                fn matches(response: &Response) -> bool {
                    matches!(response, Response::$variant(..))
                }

                fn extract(response: Response) -> Option<$variant> {
                    match response {
                        Response::$variant(r) => Some(r),
                        _ => None,
                    }
                }
            }
        )*
    };
}

expected_response!(
    Acknowledgement,
    StateService,
    StateLabel,
    StatePower,
    StateVersion,
    StateHostFirmware,
    StateGroup,
    LightState,
    LightStatePower,
    InfraredState
);

impl ExpectedResponse for UnknownResponse {
    const AWAITS_REPLY: bool = false;

    fn matches(response: &Response) -> bool {
        matches!(response, Response::Unknown(..))
    }

    fn extract(response: Response) -> Option<UnknownResponse> {
        match response {
            Response::Unknown(r) => Some(r),
            _ => None,
        }
    }
}

struct Pending {
    accepts: fn(&Response) -> bool,
    tx: oneshot::Sender<Response>,
}

/// Identifier to waiting caller.  Shared by callers and the receive loop.
#[derive(Default)]
pub(crate) struct PendingRequests {
    inner: Mutex<HashMap<u32, Pending>>,
}

impl PendingRequests {
    /// Registers a slot for `identifier` that only accepts replies of type `T`.
    pub fn register<T: ExpectedResponse>(
        self: &Arc<Self>,
        identifier: u32,
    ) -> Result<PendingGuard> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&identifier) {
            return Err(Error::InvalidArgument {
                name: "identifier",
                reason: format!("{} is already awaiting a response", identifier),
            });
        }
        let (tx, rx) = oneshot::channel();
        map.insert(
            identifier,
            Pending {
                accepts: T::matches,
                tx,
            },
        );
        Ok(PendingGuard {
            pending: self.clone(),
            identifier,
            rx: Some(rx),
        })
    }

    /// Hands `response` to the caller waiting on `identifier`.
    ///
    /// Returns false, leaving any waiter in place, if nobody is waiting or the waiter expects
    /// a different type.
    pub fn resolve(&self, identifier: u32, response: Response) -> bool {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match map.get(&identifier) {
            Some(pending) if (pending.accepts)(&response) => {}
            Some(_) => {
                trace!(
                    "Ignoring {:?} for request {}: not the expected type",
                    response.message_type(),
                    identifier
                );
                return false;
            }
            None => {
                trace!(
                    "Ignoring {:?} for request {}: nobody is waiting",
                    response.message_type(),
                    identifier
                );
                return false;
            }
        }
        match map.remove(&identifier) {
            Some(pending) => pending.tx.send(response).is_ok(),
            None => false,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn remove(&self, identifier: u32) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&identifier);
    }
}

/// Removes its slot when dropped, so a dropped or timed-out waiter never leaks an entry.
pub(crate) struct PendingGuard {
    pending: Arc<PendingRequests>,
    identifier: u32,
    rx: Option<oneshot::Receiver<Response>>,
}

impl PendingGuard {
    /// Waits for the reply, failing after `timeout` or when `shutdown` fires.
    pub async fn wait<T: ExpectedResponse>(
        mut self,
        timeout: Duration,
        shutdown: &CancellationToken,
    ) -> Result<T> {
        let rx = self.rx.take().ok_or(Error::Cancelled)?;
        tokio::select! {
            res = rx => match res {
                Ok(response) => {
                    let typ = response.message_type();
                    T::extract(response).ok_or(Error::UnexpectedResponse(typ))
                }
                Err(_) => Err(Error::Cancelled),
            },
            _ = tokio::time::sleep(timeout) => Err(Error::Timeout(timeout)),
            _ = shutdown.cancelled() => Err(Error::Cancelled),
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.remove(self.identifier);
    }
}

/// Encodes and sends a message, then waits for a reply of type `T` if one is expected.
///
/// Returns `Ok(None)` straight after sending when `header.identifier` is zero or `T` is
/// [UnknownResponse].  Otherwise the slot is registered before the packet goes out, so a fast
/// reply cannot be missed.
pub(crate) async fn send_and_await<T: ExpectedResponse>(
    transport: &Transport,
    pending: &Arc<PendingRequests>,
    target: Option<SocketAddr>,
    header: &FrameHeader,
    typ: MessageType,
    payload: &[u8],
) -> Result<Option<T>> {
    let shutdown = transport.shutdown_token()?;
    let bytes = encode(header, typ, payload)?;

    if header.identifier == 0 || !T::AWAITS_REPLY {
        transport.send(target, &bytes).await?;
        return Ok(None);
    }

    let guard = pending.register::<T>(header.identifier)?;
    transport.send(target, &bytes).await?;
    let timeout = transport.options().response_timeout;
    guard.wait::<T>(timeout, &shutdown).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(s: &str) -> Response {
        Response::StateLabel(StateLabel {
            label: s.to_owned(),
        })
    }

    #[tokio::test]
    async fn test_resolves_matching_response() {
        let pending = Arc::new(PendingRequests::default());
        let guard = pending.register::<StateLabel>(5).unwrap();
        assert_eq!(pending.len(), 1);

        assert!(pending.resolve(5, label("Lamp")));
        let shutdown = CancellationToken::new();
        let reply: StateLabel = guard.wait(Duration::from_secs(1), &shutdown).await.unwrap();
        assert_eq!(reply.label, "Lamp");
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_mismatch_stays_pending_until_timeout() {
        let pending = Arc::new(PendingRequests::default());
        let guard = pending.register::<StateLabel>(9).unwrap();

        // wrong type, then wrong identifier
        assert!(!pending.resolve(9, Response::Acknowledgement(Acknowledgement { sequence: 1 })));
        assert!(!pending.resolve(10, label("Other")));
        assert_eq!(pending.len(), 1);

        let shutdown = CancellationToken::new();
        let res = guard
            .wait::<StateLabel>(Duration::from_millis(50), &shutdown)
            .await;
        assert!(matches!(res, Err(Error::Timeout(_))));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_resolves_only_once() {
        let pending = Arc::new(PendingRequests::default());
        let guard = pending.register::<StateLabel>(3).unwrap();
        assert!(pending.resolve(3, label("First")));
        assert!(!pending.resolve(3, label("Second")));

        let shutdown = CancellationToken::new();
        let reply: StateLabel = guard.wait(Duration::from_secs(1), &shutdown).await.unwrap();
        assert_eq!(reply.label, "First");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_waiter() {
        let pending = Arc::new(PendingRequests::default());
        let guard = pending.register::<Acknowledgement>(1).unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let res = guard
            .wait::<Acknowledgement>(Duration::from_secs(5), &shutdown)
            .await;
        assert!(matches!(res, Err(Error::Cancelled)));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_dropped_guard_removes_entry() {
        let pending = Arc::new(PendingRequests::default());
        let guard = pending.register::<StatePower>(42).unwrap();
        assert!(matches!(
            pending.register::<StatePower>(42),
            Err(Error::InvalidArgument { .. })
        ));
        drop(guard);
        assert_eq!(pending.len(), 0);
        assert!(!pending.resolve(42, Response::StatePower(StatePower { level: 0 })));
    }

    #[test]
    fn test_unknown_response_is_fire_and_forget() {
        assert!(!<UnknownResponse as ExpectedResponse>::AWAITS_REPLY);
        assert!(<Acknowledgement as ExpectedResponse>::AWAITS_REPLY);
    }
}
