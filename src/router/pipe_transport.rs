
use crate::data_structures::{AppData, ListenIp, SctpState, TransportTuple};
use crate::messages::{PipeTransportData, TransportConnectPipeRequest};
use crate::sctp_parameters::{NumSctpStreams, SctpParameters};
use crate::srtp_parameters::SrtpParameters;
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

/// Arguments of [`Router::create_pipe_transport`](crate::router::Router::create_pipe_transport).
///
/// `enable_rtx` and `enable_srtp` only matter when the two routers live on different hosts, and
/// both ends of a pair have to agree on them.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PipeTransportOptions {
    pub listen_ip: ListenIp,
    /// `None` picks a free port from the worker's RTC port range.
    pub port: Option<u16>,
    pub enable_sctp: bool,
    pub num_sctp_streams: NumSctpStreams,
    /// 256 MiB by default, large enough for anything a data producer may send.
    pub max_sctp_message_size: u32,
    /// 256 MiB by default.
    pub sctp_send_buffer_size: u32,
    pub enable_rtx: bool,
    pub enable_srtp: bool,
    pub app_data: AppData,
}

impl PipeTransportOptions {
    /// Everything off, ports picked by the worker.
    #[must_use]
    pub fn new(listen_ip: ListenIp) -> Self {
        Self {
            listen_ip,
            port: None,
            enable_sctp: false,
            num_sctp_streams: NumSctpStreams::default(),
            max_sctp_message_size: 268_435_456,
            sctp_send_buffer_size: 268_435_456,
            enable_rtx: false,
            enable_srtp: false,
            app_data: AppData::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct PipeTransportDump {
    #[serde(flatten)]
    pub common: TransportDumpCommon,
    pub tuple: TransportTuple,
    pub sctp_parameters: Option<SctpParameters>,
    pub sctp_state: Option<SctpState>,
    pub rtx: bool,
    pub srtp_parameters: Option<SrtpParameters>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct PipeTransportStat {
    #[serde(flatten)]
    pub common: TransportStatCommon,
    pub sctp_state: Option<SctpState>,
    pub tuple: TransportTuple,
}

/// Remote parameters for [`PipeTransport::connect`].
///
/// Taken from the local tuple and SRTP parameters of the other end of the pair.
#[derive(Debug, Clone)]
pub struct PipeTransportRemoteParameters {
    pub ip: IpAddr,
    pub port: u16,
    pub srtp_parameters: Option<SrtpParameters>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    #[serde(rename_all = "camelCase")]
    SctpStateChange { sctp_state: SctpState },
    Trace(TransportTraceEventData),
}

#[derive(Debug)]
struct State {
    tuple: TransportTuple,
    sctp_parameters: Option<SctpParameters>,
    sctp_state: Option<SctpState>,
    rtx: bool,
    srtp_parameters: Option<SrtpParameters>,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    sctp_state_change: Bag<Arc<dyn Fn(SctpState) + Send + Sync>>,
}

struct Inner {
    state: Mutex<State>,
    handlers: Handlers,
}

/// Link between two [`Router`](crate::router::Router)s, on the same worker, on different workers
/// or on different hosts.
///
/// Consumers created here forward every encoding of the producer untouched and keep the
/// producer's CNAME, and no MID is assigned to them. Usually created in pairs by
/// [`Router::pipe_producer_to_router`](crate::router::Router::pipe_producer_to_router).
#[derive(Clone)]
pub struct PipeTransport {
    transport: Transport,
    inner: Arc<Inner>,
}

impl fmt::Debug for PipeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeTransport")
            .field("transport", &self.transport)
            .field("state", &self.inner.state)
            .finish()
    }
}

impl Deref for PipeTransport {
    type Target = Transport;

    fn deref(&self) -> &Self::Target {
        &self.transport
    }
}

impl PipeTransport {
    pub(super) fn new(transport: Transport, data: PipeTransportData) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                tuple: data.tuple,
                sctp_parameters: data.sctp_parameters,
                sctp_state: data.sctp_state,
                rtx: data.rtx,
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
                    match serde_json::from_value::<Notification>(notification) {
                        Ok(notification) => match notification {
                            Notification::SctpStateChange { sctp_state } => {
                                if let Some(inner) = inner_weak.upgrade() {
                                    inner.state.lock().sctp_state = Some(sctp_state);
                                    inner.handlers.sctp_state_change.call(|callback| {
                                        callback(sctp_state);
                                    });
                                }
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

    /// Single tuple for RTP and RTCP. The remote half is known once
    /// [`PipeTransport::connect`] succeeded.
    #[must_use]
    pub fn tuple(&self) -> TransportTuple {
        self.inner.state.lock().tuple
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

    #[must_use]
    pub fn rtx(&self) -> bool {
        self.inner.state.lock().rtx
    }

    /// Keys the other end of the pair has to receive in its `connect()`.
    #[must_use]
    pub fn srtp_parameters(&self) -> Option<SrtpParameters> {
        self.inner.state.lock().srtp_parameters.clone()
    }

    pub async fn dump(&self) -> Result<PipeTransportDump, RequestError> {
        self.transport.dump_impl().await
    }

    pub async fn get_stats(&self) -> Result<Vec<PipeTransportStat>, RequestError> {
        self.transport.get_stats_impl().await
    }

    /// Points the transport at the other end of the pair.
    pub async fn connect(
        &self,
        remote_parameters: PipeTransportRemoteParameters,
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
                TransportConnectPipeRequest {
                    ip: remote_parameters.ip,
                    port: remote_parameters.port,
                    srtp_parameters: remote_parameters.srtp_parameters,
                },
            )
            .await?;

        self.inner.state.lock().tuple = response.tuple;

        Ok(())
    }

    pub fn on_sctp_state_change<F: Fn(SctpState) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.sctp_state_change.add(Arc::new(callback))
    }
}
