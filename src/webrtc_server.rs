//! Shared UDP/TCP sockets for many WebRTC transports of one worker.
//!
//! Sockets belong to the worker process, so every worker needs its own server on its own ports.


use crate::data_structures::{AppData, ListenIp, NonEmptyList, Protocol};
use crate::messages::{WebRtcServerDumpRequest, WorkerCloseWebRtcServerRequest};
use crate::transport::{TransportId, WeakTransport};
use crate::uuid_based_wrapper_type;
use crate::webrtc_transport::WebRtcTransport;
use crate::worker::{Channel, RequestError};
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use hash_hasher::{HashedMap, HashedSet};
use log::{debug, error};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

uuid_based_wrapper_type!(
    WebRtcServerId
);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[doc(hidden)]
pub struct WebRtcServerIpPort {
    pub ip: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
pub struct WebRtcServerIceUsernameFragment {
    pub local_ice_username_fragment: String,
    #[serde(rename = "webRtcTransportId")]
    pub webrtc_transport_id: TransportId,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
#[non_exhaustive]
pub struct WebRtcServerDump {
    pub id: WebRtcServerId,
    #[serde(default)]
    pub udp_sockets: Vec<WebRtcServerIpPort>,
    #[serde(default)]
    pub tcp_servers: Vec<WebRtcServerIpPort>,
    #[serde(default, rename = "webRtcTransportIds")]
    pub webrtc_transport_ids: HashedSet<TransportId>,
    #[serde(default)]
    pub local_ice_username_fragments: Vec<WebRtcServerIceUsernameFragment>,
}

/// One socket of a [`WebRtcServer`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcServerListenInfo {
    pub protocol: Protocol,
    /// Flattened into `ip` and `announcedIp` on the wire.
    #[serde(flatten)]
    pub listen_ip: ListenIp,
    pub port: u16,
}

/// Sockets a WebRTC server opens, in order of preference.
pub type WebRtcServerListenInfos = NonEmptyList<WebRtcServerListenInfo>;

pub use crate::data_structures::EmptyListError;

/// Arguments of [`Worker::create_webrtc_server`](crate::worker::Worker::create_webrtc_server).
#[derive(Debug)]
#[non_exhaustive]
pub struct WebRtcServerOptions {
    pub listen_infos: WebRtcServerListenInfos,
    pub app_data: AppData,
}

impl WebRtcServerOptions {
    #[must_use]
    pub fn new(listen_infos: WebRtcServerListenInfos) -> Self {
        Self {
            listen_infos,
            app_data: AppData::default(),
        }
    }
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    new_webrtc_transport: Bag<Arc<dyn Fn(&WebRtcTransport) + Send + Sync>>,
    worker_close: BagOnce<Box<dyn FnOnce() + Send>>,
    close: BagOnce<Box<dyn FnOnce() + Send>>,
}

struct Inner {
    id: WebRtcServerId,
    channel: Channel,
    webrtc_transports: Mutex<HashedMap<TransportId, WeakTransport>>,
    handlers: Handlers,
    app_data: AppData,
    closed: AtomicBool,
}

impl Inner {
    fn close_webrtc_transports(&self) {
        let webrtc_transports = mem::take(&mut *self.webrtc_transports.lock());
        for webrtc_transport in webrtc_transports.into_values() {
            if let Some(webrtc_transport) = webrtc_transport.upgrade() {
                webrtc_transport.webrtc_server_closed();
            }
        }
    }
}

/// Set of worker sockets multiplexing ICE traffic of many [`WebRtcTransport`]s.
///
/// Transports created on the server are tracked here and get `webrtc_server_closed()` when the
/// server goes away, without a request of their own.
#[derive(Clone)]
pub struct WebRtcServer {
    inner: Arc<Inner>,
}

impl fmt::Debug for WebRtcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcServer")
            .field("id", &self.inner.id)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl WebRtcServer {
    pub(crate) fn new(id: WebRtcServerId, channel: Channel, app_data: AppData) -> Self {
        debug!("new()");

        let inner = Arc::new(Inner {
            id,
            channel,
            webrtc_transports: Mutex::default(),
            handlers: Handlers::default(),
            app_data,
            closed: AtomicBool::new(false),
        });

        Self { inner }
    }

    #[must_use]
    pub fn id(&self) -> WebRtcServerId {
        self.inner.id
    }

    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Ids of WebRTC transports currently using this server.
    #[must_use]
    pub fn webrtc_transport_ids(&self) -> Vec<TransportId> {
        self.inner.webrtc_transports.lock().keys().copied().collect()
    }

    #[doc(hidden)]
    pub async fn dump(&self) -> Result<WebRtcServerDump, RequestError> {
        debug!("dump()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner
            .channel
            .request(self.inner.id, WebRtcServerDumpRequest {})
            .await
    }

    /// Sends `worker.closeWebRtcServer` and closes every transport using the server. Idempotent.
    pub async fn close(&self) {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("close()");

        if let Err(error) = inner
            .channel
            .request(
                "",
                WorkerCloseWebRtcServerRequest {
                    web_rtc_server_id: inner.id,
                },
            )
            .await
        {
            error!("WebRTC server closing failed: {}", error);
        }

        inner.close_webrtc_transports();
        inner.handlers.close.call_simple();
    }

    /// Same cascade as `close()` but the worker is already gone, so nothing is sent.
    pub(crate) fn worker_closed(&self) {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("worker_closed()");

        inner.close_webrtc_transports();
        inner.handlers.worker_close.call_simple();
        inner.handlers.close.call_simple();
    }

    pub(crate) fn handle_new_webrtc_transport(&self, webrtc_transport: &WebRtcTransport) {
        let transport_id = webrtc_transport.id();

        self.inner
            .webrtc_transports
            .lock()
            .insert(transport_id, webrtc_transport.downgrade());

        webrtc_transport
            .on_close({
                let inner_weak = Arc::downgrade(&self.inner);

                move || {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.webrtc_transports.lock().remove(&transport_id);
                    }
                }
            })
            .detach();

        self.inner.handlers.new_webrtc_transport.call(|callback| {
            callback(webrtc_transport);
        });

        // Server might have been closed while request to worker was in flight
        if self.closed() {
            webrtc_transport.webrtc_server_closed();
        }
    }

    /// Fires before [`WebRtcServer::on_close`] when the close came from the worker.
    pub fn on_worker_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.worker_close.add(Box::new(callback))
    }

    /// A [`WebRtcTransport`] was created on top of this server.
    pub fn on_new_webrtc_transport<F>(&self, callback: F) -> HandlerId
    where
        F: Fn(&WebRtcTransport) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .new_webrtc_transport
            .add(Arc::new(callback))
    }

    /// Fires once, or immediately if the server is already closed.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner.handlers.close.add(Box::new(callback));
        if self.inner.closed.load(Ordering::Relaxed) {
            self.inner.handlers.close.call_simple();
        }
        handler_id
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakWebRtcServer {
        WeakWebRtcServer {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning handle to a [`WebRtcServer`].
#[derive(Clone)]
pub struct WeakWebRtcServer {
    inner: Weak<Inner>,
}

impl fmt::Debug for WeakWebRtcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakWebRtcServer").finish()
    }
}

impl WeakWebRtcServer {
    #[must_use]
    pub fn upgrade(&self) -> Option<WebRtcServer> {
        let inner = self.inner.upgrade()?;

        Some(WebRtcServer { inner })
    }
}
