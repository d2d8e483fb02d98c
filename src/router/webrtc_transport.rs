
use crate::data_structures::{
    AppData, DtlsParameters, DtlsState, IceCandidate, IceParameters, IceRole, IceState, ListenIp,
    NonEmptyList, SctpState, TransportTuple,
};
use crate::messages::{
    TransportConnectWebRtcRequest, TransportRestartIceRequest, WebRtcTransportData,
};
use crate::sctp_parameters::{NumSctpStreams, SctpParameters};
use crate::transport::{
    Transport, TransportDumpCommon, TransportStatCommon, TransportTraceEventData,
};
use crate::webrtc_server::{WebRtcServer, WebRtcServerId};
use crate::worker::RequestError;
use event_listener_primitives::{Bag, HandlerId};
use log::{debug, error};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Listen IPs of a WebRTC transport in order of preference.
pub type TransportListenIps = NonEmptyList<ListenIp>;

pub use crate::data_structures::EmptyListError;

/// How [`WebRtcTransport`] should listen on interfaces.
#[derive(Debug, Clone)]
pub enum WebRtcTransportListen {
    /// Listen on individual IPs with ports allocated from the worker's port range.
    Individual {
        /// Listening IP addresses in order of preference (first one is the preferred one).
        listen_ips: TransportListenIps,
        /// Fixed port to listen on instead of selecting automatically from the worker's port
        /// range.
        port: Option<u16>,
    },
    /// Share the sockets of a [`WebRtcServer`].
    Server {
        /// WebRTC server to use.
        webrtc_server: WebRtcServer,
    },
}

/// [`WebRtcTransport`] options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct WebRtcTransportOptions {
    /// How transport should listen on interfaces.
    pub listen: WebRtcTransportListen,
    /// Listen in UDP. Default true.
    pub enable_udp: bool,
    /// Listen in TCP. Default false.
    pub enable_tcp: bool,
    /// Prefer UDP. Default false.
    pub prefer_udp: bool,
    /// Prefer TCP. Default false.
    pub prefer_tcp: bool,
    /// Initial available outgoing bitrate (in bps). Default 600000.
    pub initial_available_outgoing_bitrate: u32,
    /// Create a SCTP association. Default false.
    pub enable_sctp: bool,
    /// SCTP streams number.
    pub num_sctp_streams: NumSctpStreams,
    /// Maximum allowed size for SCTP messages sent by DataProducers. Default 262144.
    pub max_sctp_message_size: u32,
    /// Maximum SCTP send buffer used by DataConsumers. Default 262144.
    pub sctp_send_buffer_size: u32,
    pub app_data: AppData,
}

impl WebRtcTransportOptions {
    /// Create WebRTC transport options with given listen IPs.
    #[must_use]
    pub fn new(listen_ips: TransportListenIps) -> Self {
        Self::with_listen(WebRtcTransportListen::Individual {
            listen_ips,
            port: None,
        })
    }

    /// Create WebRTC transport options that will use given WebRTC server.
    #[must_use]
    pub fn new_with_server(webrtc_server: WebRtcServer) -> Self {
        Self::with_listen(WebRtcTransportListen::Server { webrtc_server })
    }

    fn with_listen(listen: WebRtcTransportListen) -> Self {
        Self {
            listen,
            enable_udp: true,
            enable_tcp: false,
            prefer_udp: false,
            prefer_tcp: false,
            initial_available_outgoing_bitrate: 600_000,
            enable_sctp: false,
            num_sctp_streams: NumSctpStreams::default(),
            max_sctp_message_size: 262_144,
            sctp_send_buffer_size: 262_144,
            app_data: AppData::default(),
        }
    }
}

/// Dump of the WebRTC transport.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct WebRtcTransportDump {
    #[serde(flatten)]
    pub common: TransportDumpCommon,
    pub ice_role: IceRole,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub ice_state: IceState,
    pub ice_selected_tuple: Option<TransportTuple>,
    pub dtls_parameters: DtlsParameters,
    pub dtls_state: DtlsState,
    pub sctp_parameters: Option<SctpParameters>,
    pub sctp_state: Option<SctpState>,
}

/// RTC statistics of the WebRTC transport.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct WebRtcTransportStat {
    #[serde(flatten)]
    pub common: TransportStatCommon,
    pub sctp_state: Option<SctpState>,
    pub ice_role: IceRole,
    pub ice_state: IceState,
    pub ice_selected_tuple: Option<TransportTuple>,
    pub dtls_state: DtlsState,
}

/// Remote parameters for [`WebRtcTransport::connect`].
#[derive(Debug, Clone)]
pub struct WebRtcTransportRemoteParameters {
    /// Remote DTLS parameters.
    pub dtls_parameters: DtlsParameters,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    #[serde(rename_all = "camelCase")]
    IceStateChange { ice_state: IceState },
    #[serde(rename_all = "camelCase")]
    IceSelectedTupleChange { ice_selected_tuple: TransportTuple },
    #[serde(rename_all = "camelCase")]
    DtlsStateChange {
        dtls_state: DtlsState,
        dtls_remote_cert: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SctpStateChange { sctp_state: SctpState },
    Trace(TransportTraceEventData),
}

#[derive(Debug)]
struct State {
    ice_role: IceRole,
    ice_parameters: IceParameters,
    ice_candidates: Vec<IceCandidate>,
    ice_state: IceState,
    ice_selected_tuple: Option<TransportTuple>,
    dtls_parameters: DtlsParameters,
    dtls_state: DtlsState,
    dtls_remote_cert: Option<String>,
    sctp_parameters: Option<SctpParameters>,
    sctp_state: Option<SctpState>,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    ice_state_change: Bag<Arc<dyn Fn(IceState) + Send + Sync>>,
    ice_selected_tuple_change: Bag<Arc<dyn Fn(&TransportTuple) + Send + Sync>>,
    dtls_state_change: Bag<Arc<dyn Fn(DtlsState) + Send + Sync>>,
    sctp_state_change: Bag<Arc<dyn Fn(SctpState) + Send + Sync>>,
}

struct Inner {
    state: Mutex<State>,
    handlers: Handlers,
    webrtc_server_id: Option<WebRtcServerId>,
}

/// A WebRTC transport represents a network path negotiated by both, a WebRTC endpoint and
/// mediasoup, via ICE and DTLS procedures. A WebRTC transport may be used to receive media, to send
/// media or to both receive and send. There is no limitation in mediasoup. However, due to their
/// design, mediasoup-client and libmediasoupclient require separate WebRTC transports for sending
/// and receiving.
///
/// The WebRTC transport implementation of mediasoup is
/// [ICE Lite](https://tools.ietf.org/html/rfc5245#section-2.7), meaning that it does not initiate
/// ICE connections but expects ICE Binding Requests from endpoints.
#[derive(Clone)]
pub struct WebRtcTransport {
    transport: Transport,
    inner: Arc<Inner>,
}

impl fmt::Debug for WebRtcTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcTransport")
            .field("transport", &self.transport)
            .field("state", &self.inner.state)
            .field("webrtc_server_id", &self.inner.webrtc_server_id)
            .finish()
    }
}

impl Deref for WebRtcTransport {
    type Target = Transport;

    fn deref(&self) -> &Self::Target {
        &self.transport
    }
}

impl WebRtcTransport {
    pub(super) fn new(
        transport: Transport,
        data: WebRtcTransportData,
        webrtc_server: Option<&WebRtcServer>,
    ) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                ice_role: data.ice_role,
                ice_parameters: data.ice_parameters,
                ice_candidates: data.ice_candidates,
                ice_state: data.ice_state,
                ice_selected_tuple: data.ice_selected_tuple,
                dtls_parameters: data.dtls_parameters,
                dtls_state: data.dtls_state,
                dtls_remote_cert: None,
                sctp_parameters: data.sctp_parameters,
                sctp_state: data.sctp_state,
            }),
            handlers: Handlers::default(),
            webrtc_server_id: webrtc_server.map(WebRtcServer::id),
        });

        let subscription_handler = {
            let inner_weak = Arc::downgrade(&inner);
            let transport_weak = transport.downgrade();

            transport
                .channel()
                .subscribe_to_notifications(transport.id().into(), move |notification| {
                    let inner = match inner_weak.upgrade() {
                        Some(inner) => inner,
                        None => {
                            return;
                        }
                    };
                    match serde_json::from_value::<Notification>(notification) {
                        Ok(notification) => match notification {
                            Notification::IceStateChange { ice_state } => {
                                inner.state.lock().ice_state = ice_state;
                                inner.handlers.ice_state_change.call(|callback| {
                                    callback(ice_state);
                                });
                            }
                            Notification::IceSelectedTupleChange { ice_selected_tuple } => {
                                inner.state.lock().ice_selected_tuple = Some(ice_selected_tuple);
                                inner.handlers.ice_selected_tuple_change.call(|callback| {
                                    callback(&ice_selected_tuple);
                                });
                            }
                            Notification::DtlsStateChange {
                                dtls_state,
                                dtls_remote_cert,
                            } => {
                                {
                                    let mut state = inner.state.lock();
                                    state.dtls_state = dtls_state;
                                    if dtls_state == DtlsState::Connected {
                                        state.dtls_remote_cert = dtls_remote_cert;
                                    }
                                }
                                inner.handlers.dtls_state_change.call(|callback| {
                                    callback(dtls_state);
                                });
                            }
                            Notification::SctpStateChange { sctp_state } => {
                                inner.state.lock().sctp_state = Some(sctp_state);
                                inner.handlers.sctp_state_change.call(|callback| {
                                    callback(sctp_state);
                                });
                            }
                            Notification::Trace(trace_event_data) => {
                                if let Some(transport) = transport_weak.upgrade() {
                                    transport.emit_trace(&trace_event_data);
                                }
                            }
                        },
                        Err(error) => {
                            error!("Failed to parse notification: {}", error);
                        }
                    }
                })
        };

        transport.add_subscription_handler(subscription_handler);

        transport
            .on_close({
                let inner_weak = Arc::downgrade(&inner);

                move || {
                    if let Some(inner) = inner_weak.upgrade() {
                        let mut state = inner.state.lock();
                        state.ice_state = IceState::Closed;
                        state.ice_selected_tuple = None;
                        state.dtls_state = DtlsState::Closed;
                        if state.sctp_state.is_some() {
                            state.sctp_state = Some(SctpState::Closed);
                        }
                    }
                }
            })
            .detach();

        Self { transport, inner }
    }

    /// Shared transport part, the same one this type dereferences to.
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Id of the WebRTC server this transport uses, if any.
    #[must_use]
    pub fn webrtc_server_id(&self) -> Option<WebRtcServerId> {
        self.inner.webrtc_server_id
    }

    /// Local ICE role. Due to the ICE Lite design, this is always `Controlled`.
    #[must_use]
    pub fn ice_role(&self) -> IceRole {
        self.inner.state.lock().ice_role
    }

    /// Local ICE parameters.
    #[must_use]
    pub fn ice_parameters(&self) -> IceParameters {
        self.inner.state.lock().ice_parameters.clone()
    }

    /// Local ICE candidates.
    #[must_use]
    pub fn ice_candidates(&self) -> Vec<IceCandidate> {
        self.inner.state.lock().ice_candidates.clone()
    }

    /// Current ICE state.
    #[must_use]
    pub fn ice_state(&self) -> IceState {
        self.inner.state.lock().ice_state
    }

    /// The selected transport tuple if ICE is in `Connected` or `Completed` state.
    #[must_use]
    pub fn ice_selected_tuple(&self) -> Option<TransportTuple> {
        self.inner.state.lock().ice_selected_tuple
    }

    /// Local DTLS parameters.
    #[must_use]
    pub fn dtls_parameters(&self) -> DtlsParameters {
        self.inner.state.lock().dtls_parameters.clone()
    }

    /// Current DTLS state.
    #[must_use]
    pub fn dtls_state(&self) -> DtlsState {
        self.inner.state.lock().dtls_state
    }

    /// The remote certificate in PEM format. It is set once the DTLS state becomes `Connected`.
    #[must_use]
    pub fn dtls_remote_cert(&self) -> Option<String> {
        self.inner.state.lock().dtls_remote_cert.clone()
    }

    /// Local SCTP parameters. Or `None` if SCTP is not enabled.
    #[must_use]
    pub fn sctp_parameters(&self) -> Option<SctpParameters> {
        self.inner.state.lock().sctp_parameters
    }

    /// Current SCTP state. Or `None` if SCTP is not enabled.
    #[must_use]
    pub fn sctp_state(&self) -> Option<SctpState> {
        self.inner.state.lock().sctp_state
    }

    /// Dump WebRtcTransport.
    pub async fn dump(&self) -> Result<WebRtcTransportDump, RequestError> {
        self.transport.dump_impl().await
    }

    /// Returns current RTC statistics of the WebRTC transport.
    pub async fn get_stats(&self) -> Result<Vec<WebRtcTransportStat>, RequestError> {
        self.transport.get_stats_impl().await
    }

    /// Provide the WebRTC transport with the endpoint parameters.
    pub async fn connect(
        &self,
        remote_parameters: WebRtcTransportRemoteParameters,
    ) -> Result<(), RequestError> {
        debug!("connect()");

        if self.closed() {
            return Ok(());
        }

        let response = self
            .transport
            .channel()
            .request(
                self.id(),
                TransportConnectWebRtcRequest {
                    dtls_parameters: remote_parameters.dtls_parameters,
                },
            )
            .await?;

        self.inner.state.lock().dtls_parameters.role = response.dtls_local_role;

        Ok(())
    }

    /// Restarts the ICE layer by generating new local ICE parameters that must be signaled to the
    /// remote endpoint.
    pub async fn restart_ice(&self) -> Result<IceParameters, RequestError> {
        debug!("restart_ice()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        let response = self
            .transport
            .channel()
            .request(self.id(), TransportRestartIceRequest {})
            .await?;

        self.inner.state.lock().ice_parameters = response.ice_parameters.clone();

        Ok(response.ice_parameters)
    }

    /// Callback is called when the transport ICE state changes.
    pub fn on_ice_state_change<F: Fn(IceState) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.ice_state_change.add(Arc::new(callback))
    }

    /// Callback is called after ICE state becomes `Completed` and when the ICE selected tuple
    /// changes.
    pub fn on_ice_selected_tuple_change<F: Fn(&TransportTuple) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner
            .handlers
            .ice_selected_tuple_change
            .add(Arc::new(callback))
    }

    /// Callback is called when the transport DTLS state changes.
    pub fn on_dtls_state_change<F: Fn(DtlsState) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.dtls_state_change.add(Arc::new(callback))
    }

    /// Callback is called when the transport SCTP state changes.
    pub fn on_sctp_state_change<F: Fn(SctpState) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.sctp_state_change.add(Arc::new(callback))
    }
}
