
use crate::data_structures::AppData;
use crate::messages::TransportSendRtcpNotification;
use crate::transport::{
    Transport, TransportDumpCommon, TransportStatCommon, TransportTraceEventData,
};
use crate::worker::{NotificationError, RequestError};
use bytes::Bytes;
use event_listener_primitives::{Bag, HandlerId};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// [`DirectTransport`] options.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DirectTransportOptions {
    /// Maximum allowed size for direct messages sent from DataProducers.
    /// Default 262_144.
    pub max_message_size: u32,
    pub app_data: AppData,
}

impl Default for DirectTransportOptions {
    fn default() -> Self {
        Self {
            max_message_size: 262_144,
            app_data: AppData::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct DirectTransportDump {
    #[serde(flatten)]
    pub common: TransportDumpCommon,
    #[serde(default)]
    pub direct: bool,
}

/// RTC statistics of the direct transport.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct DirectTransportStat {
    #[serde(flatten)]
    pub common: TransportStatCommon,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    Trace(TransportTraceEventData),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum PayloadNotification {
    Rtcp,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    rtcp: Bag<Arc<dyn Fn(&Bytes) + Send + Sync>>,
}

struct Inner {
    handlers: Handlers,
}

/// A direct transport represents a direct connection between the mediasoup Rust process and a
/// [`Router`](crate::router::Router) instance in a mediasoup-worker thread.
///
/// A direct transport can be used to directly send and receive data messages from/to Rust by means
/// of [`DataProducer`](crate::data_producer::DataProducer)s and
/// [`DataConsumer`](crate::data_consumer::DataConsumer)s of type `Direct` created on a direct
/// transport. Direct messages sent by a [`DataProducer`](crate::data_producer::DataProducer) in a
/// direct transport can be consumed by endpoints connected through a SCTP capable transport
/// ([`WebRtcTransport`](crate::webrtc_transport::WebRtcTransport),
/// [`PlainTransport`](crate::plain_transport::PlainTransport),
/// [`PipeTransport`](crate::pipe_transport::PipeTransport)) and also by the Rust application by
/// means of a [`DataConsumer`](crate::data_consumer::DataConsumer) created on a [`DirectTransport`]
/// (and vice-versa: messages sent over SCTP/DataChannel can be consumed by the Rust application by
/// means of a [`DataConsumer`](crate::data_consumer::DataConsumer) created on a
/// [`DirectTransport`]).
///
/// A direct transport can also be used to inject and directly consume RTP and RTCP packets in Rust
/// by using the [`DirectProducer::send`](crate::producer::DirectProducer::send) and
/// [`Consumer::on_rtp`](crate::consumer::Consumer::on_rtp) API (plus
/// [`DirectTransport::send_rtcp`] and [`DirectTransport::on_rtcp`] API).
#[derive(Clone)]
pub struct DirectTransport {
    transport: Transport,
    inner: Arc<Inner>,
}

impl fmt::Debug for DirectTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectTransport")
            .field("transport", &self.transport)
            .finish()
    }
}

impl Deref for DirectTransport {
    type Target = Transport;

    fn deref(&self) -> &Self::Target {
        &self.transport
    }
}

impl DirectTransport {
    pub(super) fn new(transport: Transport) -> Self {
        let inner = Arc::new(Inner {
            handlers: Handlers::default(),
        });

        let subscription_handler = {
            let transport_weak = transport.downgrade();

            transport
                .channel()
                .subscribe_to_notifications(transport.id().into(), move |notification| {
                    match serde_json::from_value::<Notification>(notification) {
                        Ok(Notification::Trace(trace_event_data)) => {
                            if let Some(transport) = transport_weak.upgrade() {
                                transport.emit_trace(&trace_event_data);
                            }
                        }
                        Err(error) => {
                            error!("Failed to parse notification: {}", error);
                        }
                    }
                })
        };
        transport.add_subscription_handler(subscription_handler);

        let payload_subscription_handler = {
            let inner_weak = Arc::downgrade(&inner);

            transport.payload_channel().subscribe_to_notifications(
                transport.id().into(),
                move |notification| {
                    match serde_json::from_value::<PayloadNotification>(notification.message) {
                        Ok(PayloadNotification::Rtcp) => {
                            if let Some(inner) = inner_weak.upgrade() {
                                inner.handlers.rtcp.call(|callback| {
                                    callback(&notification.payload);
                                });
                            }
                        }
                        Err(error) => {
                            error!("Failed to parse payload notification: {}", error);
                        }
                    }
                },
            )
        };
        transport.add_subscription_handler(payload_subscription_handler);

        Self { transport, inner }
    }

    /// Shared transport part, the same one this type dereferences to.
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Dump DirectTransport.
    pub async fn dump(&self) -> Result<DirectTransportDump, RequestError> {
        self.transport.dump_impl().await
    }

    /// Returns current RTC statistics of the direct transport.
    pub async fn get_stats(&self) -> Result<Vec<DirectTransportStat>, RequestError> {
        self.transport.get_stats_impl().await
    }

    /// Send a RTCP packet from the Rust process.
    ///
    /// * `rtcp_packet` - Bytes containing a valid RTCP packet (can be a compound packet).
    pub async fn send_rtcp(&self, rtcp_packet: Bytes) -> Result<(), NotificationError> {
        debug!("send_rtcp()");

        if self.closed() {
            return Ok(());
        }

        self.transport
            .payload_channel()
            .notify(self.id(), TransportSendRtcpNotification {}, rtcp_packet)
            .await
    }

    /// Callback is called when the direct transport receives a RTCP packet from its router.
    pub fn on_rtcp<F: Fn(&Bytes) + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.rtcp.add(Arc::new(callback))
    }
}
