
use crate::data_structures::{AppData, ListenIp, SctpState, TransportTuple};
use crate::messages::{PlainTransportData, TransportConnectPlainRequest};
use crate::sctp_parameters::{NumSctpStreams, SctpParameters};
use crate::srtp_parameters::{SrtpCryptoSuite, SrtpParameters};
use crate::transport::{
    Transport, TransportDumpCommon, TransportStatCommon, TransportTraceEventData,
};
use crate::worker::RequestError;
use event_listener_primitives::{Bag, HandlerId};
use log::{debug, error};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::ops::Deref;
use std::sync::Arc;

/// Arguments of [`Router::create_plain_transport`](crate::router::Router::create_plain_transport).
///
/// `comedia` learns the remote address from the first packet received, so it only works for
/// endpoints that send media. Receive-only endpoints need an explicit [`PlainTransport::connect`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PlainTransportOptions {
    pub listen_ip: ListenIp,
    /// `None` picks a free port from the worker's RTC port range.
    pub port: Option<u16>,
    /// RTP and RTCP on one port, on by default.
    pub rtcp_mux: bool,
    pub comedia: bool,
    pub enable_sctp: bool,
    pub num_sctp_streams: NumSctpStreams,
    /// Largest message data producers may send, 262144 bytes by default.
    pub max_sctp_message_size: u32,
    /// SCTP send buffer shared by data consumers, 262144 bytes by default.
    pub sctp_send_buffer_size: u32,
    /// When set, [`PlainTransport::connect`] has to provide the remote keys.
    pub enable_srtp: bool,
    pub srtp_crypto_suite: SrtpCryptoSuite,
    pub app_data: AppData,
}

impl PlainTransportOptions {
    /// Defaults listed on each field.
    #[must_use]
    pub fn new(listen_ip: ListenIp) -> Self {
        Self {
            listen_ip,
            port: None,
            rtcp_mux: true,
            comedia: false,
            enable_sctp: false,
            num_sctp_streams: NumSctpStreams::default(),
            max_sctp_message_size: 262_144,
            sctp_send_buffer_size: 262_144,
            enable_srtp: false,
            srtp_crypto_suite: SrtpCryptoSuite::default(),
            app_data: AppData::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct PlainTransportDump {
    #[serde(flatten)]
    pub common: TransportDumpCommon,
    pub rtcp_mux: bool,
    pub comedia: bool,
    pub tuple: TransportTuple,
    pub rtcp_tuple: Option<TransportTuple>,
    pub sctp_parameters: Option<SctpParameters>,
    pub sctp_state: Option<SctpState>,
    pub srtp_parameters: Option<SrtpParameters>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct PlainTransportStat {
    #[serde(flatten)]
    pub common: TransportStatCommon,
    pub sctp_state: Option<SctpState>,
    pub rtcp_mux: bool,
    pub comedia: bool,
    pub tuple: Option<TransportTuple>,
    pub rtcp_tuple: Option<TransportTuple>,
}

/// Remote parameters for [`PlainTransport::connect`].
#[derive(Debug, Clone, Default)]
///
/// Address fields are left empty in `comedia` mode, `rtcp_port` is only meaningful without
/// RTCP-mux and `srtp_parameters` is required whenever SRTP was enabled.
pub struct PlainTransportRemoteParameters {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
    pub rtcp_port: Option<u16>,
    /// Keys the remote side encrypts with. The local crypto suite is switched to match.
    pub srtp_parameters: Option<SrtpParameters>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    Tuple {
        tuple: TransportTuple,
    },
    #[serde(rename_all = "camelCase")]
    RtcpTuple {
        rtcp_tuple: TransportTuple,
    },
    #[serde(rename_all = "camelCase")]
    SctpStateChange {
        sctp_state: SctpState,
    },
    Trace(TransportTraceEventData),
}

#[derive(Debug)]
struct State {
    rtcp_mux: bool,
    comedia: bool,
    tuple: TransportTuple,
    rtcp_tuple: Option<TransportTuple>,
    sctp_parameters: Option<SctpParameters>,
    sctp_state: Option<SctpState>,
    srtp_parameters: Option<SrtpParameters>,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    tuple: Bag<Arc<dyn Fn(&TransportTuple) + Send + Sync>>,
    rtcp_tuple: Bag<Arc<dyn Fn(&TransportTuple) + Send + Sync>>,
    sctp_state_change: Bag<Arc<dyn Fn(SctpState) + Send + Sync>>,
}

struct Inner {
    state: Mutex<State>,
    handlers: Handlers,
}

/// Bare RTP/RTCP over UDP, optionally with SRTP and SCTP, for endpoints such as FFmpeg or
/// GStreamer that do not speak ICE and DTLS.
#[derive(Clone)]
pub struct PlainTransport {
    transport: Transport,
    inner: Arc<Inner>,
}

impl fmt::Debug for PlainTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainTransport")
            .field("transport", &self.transport)
            .field("state", &self.inner.state)
            .finish()
    }
}

impl Deref for PlainTransport {
    type Target = Transport;

    fn deref(&self) -> &Self::Target {
        &self.transport
    }
}

impl PlainTransport {
    pub(super) fn new(transport: Transport, data: PlainTransportData) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                rtcp_mux: data.rtcp_mux,
                comedia: data.comedia,
                tuple: data.tuple,
                rtcp_tuple: data.rtcp_tuple,
                sctp_parameters: data.sctp_parameters,
                sctp_state: data.sctp_state,
                srtp_parameters: data.srtp_parameters,
            }),
            handlers: Handlers::default(),
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
                            Notification::Tuple { tuple } => {
                                inner.state.lock().tuple = tuple;
                                inner.handlers.tuple.call(|callback| {
                                    callback(&tuple);
                                });
                            }
                            Notification::RtcpTuple { rtcp_tuple } => {
                                inner.state.lock().rtcp_tuple = Some(rtcp_tuple);
                                inner.handlers.rtcp_tuple.call(|callback| {
                                    callback(&rtcp_tuple);
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

    /// Whether RTP and RTCP share the same port.
    #[must_use]
    pub fn rtcp_mux(&self) -> bool {
        self.inner.state.lock().rtcp_mux
    }

    /// Whether remote IP:port is auto-detected from the first received packet.
    #[must_use]
    pub fn comedia(&self) -> bool {
        self.inner.state.lock().comedia
    }

    /// RTP tuple, also used for RTCP with RTCP-mux. The remote half is filled in by
    /// [`PlainTransport::connect`] or by `comedia` detection.
    #[must_use]
    pub fn tuple(&self) -> TransportTuple {
        self.inner.state.lock().tuple
    }

    /// Separate RTCP tuple, `None` with RTCP-mux.
    #[must_use]
    pub fn rtcp_tuple(&self) -> Option<TransportTuple> {
        self.inner.state.lock().rtcp_tuple
    }

    #[must_use]
    pub fn sctp_parameters(&self) -> Option<SctpParameters> {
        self.inner.state.lock().sctp_parameters
    }

    /// `None` unless SCTP was enabled.
    #[must_use]
    pub fn sctp_state(&self) -> Option<SctpState> {
        self.inner.state.lock().sctp_state
    }

    /// Keys used to encrypt what this transport sends. The crypto suite follows the one given to
    /// [`PlainTransport::connect`].
    #[must_use]
    pub fn srtp_parameters(&self) -> Option<SrtpParameters> {
        self.inner.state.lock().srtp_parameters.clone()
    }

    pub async fn dump(&self) -> Result<PlainTransportDump, RequestError> {
        self.transport.dump_impl().await
    }

    pub async fn get_stats(&self) -> Result<Vec<PlainTransportStat>, RequestError> {
        self.transport.get_stats_impl().await
    }

    /// Sets the remote address and keys. The worker answers with the updated tuples, which
    /// replace the cached ones.
    pub async fn connect(
        &self,
        remote_parameters: PlainTransportRemoteParameters,
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
                TransportConnectPlainRequest {
                    ip: remote_parameters.ip,
                    port: remote_parameters.port,
                    rtcp_port: remote_parameters.rtcp_port,
                    srtp_parameters: remote_parameters.srtp_parameters,
                },
            )
            .await?;

        let mut state = self.inner.state.lock();
        if let Some(tuple) = response.tuple {
            state.tuple = tuple;
        }
        if let Some(rtcp_tuple) = response.rtcp_tuple {
            state.rtcp_tuple = Some(rtcp_tuple);
        }
        if let Some(srtp_parameters) = response.srtp_parameters {
            state.srtp_parameters = Some(srtp_parameters);
        }

        Ok(())
    }

    /// Remote RTP address detected in `comedia` mode.
    pub fn on_tuple<F: Fn(&TransportTuple) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.tuple.add(Arc::new(callback))
    }

    /// Remote RTCP address detected in `comedia` mode without RTCP-mux.
    pub fn on_rtcp_tuple<F: Fn(&TransportTuple) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.rtcp_tuple.add(Arc::new(callback))
    }

    pub fn on_sctp_state_change<F: Fn(SctpState) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.sctp_state_change.add(Arc::new(callback))
    }
}
