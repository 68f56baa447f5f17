//! Connection Registry (component C7): keys live adapters by destination
//! and decides between an HTTP/2 singleton and an HTTP/1 pool (§4.7).
use std::{collections::HashMap, collections::VecDeque, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    adapter::{Adapter, AdapterHandle},
    error::Error,
    transport::{DestinationKey, NegotiatedProtocol},
};

/// An HTTP/1 pool never holds more than this many established connections.
const HTTP1_POOL_SIZE: usize = 10;
/// Above [`HTTP1_POOL_SIZE`], the registry still opens connections on demand
/// up to this much further before refusing checkout (§4.7 "pool + overflow").
const HTTP1_POOL_OVERFLOW: usize = 20;

enum Slot {
    /// HTTP/2 multiplexes every request over one connection.
    Singleton(AdapterHandle),
    /// HTTP/1 serializes requests per connection, so the registry pools several.
    Pool(Http1Pool),
}

struct Http1Pool {
    idle: VecDeque<AdapterHandle>,
    checked_out: usize,
}

impl Http1Pool {
    fn total(&self) -> usize {
        self.idle.len() + self.checked_out
    }
}

/// What a caller needs to (re)connect a destination: the host to dial, the
/// `Host`/`:authority` header value to send, and the CA bundle to verify
/// against (`None` falls back to the platform trust store, §4.5).
#[derive(Clone)]
pub struct ConnectParams {
    /// The destination this registry key identifies.
    pub key: DestinationKey,
    /// `Host`/`:authority` value for requests made over this connection.
    pub authority: String,
    /// PEM-encoded CA bundle, if the connection specified one.
    pub ca_certificate_pem: Option<String>,
}

/// Pools and shares [`AdapterHandle`]s keyed by [`DestinationKey`] (§4.7).
///
/// A fresh registry has no connections; the first [`Self::checkout`] for a
/// given key probes the destination to learn which protocol it negotiates,
/// then commits to a singleton or a pool for that key for as long as the
/// registry lives.
pub struct ConnectionRegistry {
    slots: Mutex<HashMap<DestinationKey, Slot>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Check out an adapter for `params.key`, connecting or pooling as
    /// needed, run `f` against it, and check the adapter back in (for an
    /// HTTP/1 pool; a no-op for an HTTP/2 singleton).
    pub async fn run<F, Fut, T>(self: &Arc<Self>, params: &ConnectParams, f: F) -> Result<T, Error>
    where
        F: FnOnce(AdapterHandle) -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        let guard = self.checkout(params).await?;
        let handle = guard.handle.clone();
        f(handle).await
    }

    /// Check out an adapter for `params.key` without running anything
    /// against it yet, for callers that hold it across several messages
    /// (the List/Watch/Exec streaming runners, C9-C11). The returned guard
    /// returns the adapter to its pool when dropped, and owns a clone of the
    /// registry's `Arc` so it can outlive the call that checked it out.
    pub async fn checkout(self: &Arc<Self>, params: &ConnectParams) -> Result<PooledAdapter, Error> {
        let mut slots = self.slots.lock().await;

        if let Some(slot) = slots.get_mut(&params.key) {
            match slot {
                Slot::Singleton(handle) => {
                    if handle.is_closed() {
                        let (fresh, _) = Adapter::connect(
                            params.key.clone(),
                            params.authority.clone(),
                            params.ca_certificate_pem.clone(),
                        )
                        .await?;
                        *handle = fresh.clone();
                        return Ok(PooledAdapter::singleton(self.clone(), fresh));
                    }
                    return Ok(PooledAdapter::singleton(self.clone(), handle.clone()));
                }
                Slot::Pool(pool) => {
                    while let Some(handle) = pool.idle.pop_front() {
                        if !handle.is_closed() {
                            pool.checked_out += 1;
                            return Ok(PooledAdapter::pooled(self.clone(), params.key.clone(), handle));
                        }
                    }
                    if pool.total() >= HTTP1_POOL_SIZE + HTTP1_POOL_OVERFLOW {
                        tracing::warn!(authority = %params.authority, "http/1 pool exhausted");
                        return Err(Error::PoolExhausted);
                    }
                    pool.checked_out += 1;
                    drop(slots);
                    let (handle, _) =
                        Adapter::connect(params.key.clone(), params.authority.clone(), params.ca_certificate_pem.clone())
                            .await?;
                    return Ok(PooledAdapter::pooled(self.clone(), params.key.clone(), handle));
                }
            }
        }

        drop(slots);
        let (handle, protocol) =
            Adapter::connect(params.key.clone(), params.authority.clone(), params.ca_certificate_pem.clone()).await?;

        let mut slots = self.slots.lock().await;
        match protocol {
            NegotiatedProtocol::Http2 => {
                slots.insert(params.key.clone(), Slot::Singleton(handle.clone()));
                Ok(PooledAdapter::singleton(self.clone(), handle))
            }
            NegotiatedProtocol::Http1 => {
                slots.insert(
                    params.key.clone(),
                    Slot::Pool(Http1Pool {
                        idle: VecDeque::new(),
                        checked_out: 1,
                    }),
                );
                Ok(PooledAdapter::pooled(self.clone(), params.key.clone(), handle))
            }
        }
    }

    async fn check_in_pool(&self, key: &DestinationKey, handle: AdapterHandle) {
        let mut slots = self.slots.lock().await;
        if let Some(Slot::Pool(pool)) = slots.get_mut(key) {
            pool.checked_out = pool.checked_out.saturating_sub(1);
            if !handle.is_closed() {
                pool.idle.push_back(handle);
            }
        }
    }

    /// Drop every tracked adapter whose transport has closed. The Registry
    /// is never polled in the background; callers drive this from whatever
    /// periodic task they already run (health checks, a watch reconnect
    /// loop).
    pub async fn reap_closed(&self) {
        let mut slots = self.slots.lock().await;
        slots.retain(|_, slot| match slot {
            Slot::Singleton(handle) => !handle.is_closed(),
            Slot::Pool(pool) => {
                pool.idle.retain(|h| !h.is_closed());
                pool.total() > 0
            }
        });
    }
}

/// A checked-out adapter; returns itself to its pool on drop (HTTP/1) or is
/// simply discarded (HTTP/2, where the handle stays shared in the registry).
/// Owns an `Arc` clone of its registry so it can be held across an `await`
/// point by a streaming runner without borrowing anything.
pub struct PooledAdapter {
    registry: Arc<ConnectionRegistry>,
    handle: AdapterHandle,
    pool_key: Option<DestinationKey>,
}

impl PooledAdapter {
    fn singleton(registry: Arc<ConnectionRegistry>, handle: AdapterHandle) -> Self {
        Self {
            registry,
            handle,
            pool_key: None,
        }
    }

    fn pooled(registry: Arc<ConnectionRegistry>, key: DestinationKey, handle: AdapterHandle) -> Self {
        Self {
            registry,
            handle,
            pool_key: Some(key),
        }
    }

    /// The checked-out adapter handle.
    pub fn handle(&self) -> &AdapterHandle {
        &self.handle
    }
}

impl Drop for PooledAdapter {
    fn drop(&mut self) {
        let Some(key) = self.pool_key.take() else { return };
        let registry = self.registry.clone();
        let handle = self.handle.clone();
        tokio::spawn(async move {
            registry.check_in_pool(&key, handle).await;
        });
    }
}
