
use crate::data_structures::{AppData, RtpTraceEvent, RtpTraceEventType};
use crate::messages::{
    ProducerDumpRequest, ProducerEnableTraceEventRequest, ProducerGetStatsRequest,
    ProducerPauseRequest, ProducerResumeRequest, ProducerSendNotification,
    TransportCloseProducerRequest,
};
use crate::rtp_parameters::{MediaKind, MimeType, RtpParameters};
use crate::transport::TransportId;
use crate::uuid_based_wrapper_type;
use crate::worker::{
    Channel, NotificationError, PayloadChannel, RequestError, SubscriptionHandler,
};
use bytes::Bytes;
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use log::{debug, error};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

uuid_based_wrapper_type!(
    /// Id of a [`Producer`], kept across routers when the producer is piped.
    ProducerId
);

/// Arguments of [`Transport::produce`](crate::transport::Transport::produce).
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProducerOptions {
    /// Only set when re-creating a producer on the far side of a pipe transport.
    pub(super) id: Option<ProducerId>,
    pub kind: MediaKind,
    /// What the sending endpoint puts on the wire.
    pub rtp_parameters: RtpParameters,
    pub paused: bool,
    /// Minimum interval in milliseconds between two key frame requests sent upstream, video only.
    pub key_frame_request_delay: u32,
    pub app_data: AppData,
}

impl ProducerOptions {
    /// Options for the mirror of `producer_id` on a pipe transport.
    #[must_use]
    pub fn new_pipe_transport(
        producer_id: ProducerId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Self {
        Self {
            id: Some(producer_id),
            kind,
            rtp_parameters,
            paused: false,
            key_frame_request_delay: 0,
            app_data: AppData::default(),
        }
    }

    /// Options for a fresh producer, the id is generated on creation.
    #[must_use]
    pub fn new(kind: MediaKind, rtp_parameters: RtpParameters) -> Self {
        Self {
            id: None,
            kind,
            rtp_parameters,
            paused: false,
            key_frame_request_delay: 0,
            app_data: AppData::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
#[non_exhaustive]
pub struct ProducerDump {
    pub id: ProducerId,
    pub kind: MediaKind,
    pub paused: bool,
    pub rtp_mapping: Value,
    pub r#type: ProducerType,
    #[serde(default)]
    pub trace_event_types: Vec<ProducerTraceEventType>,
}

/// Layout of the incoming streams, decided by the worker from the encodings.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerType {
    /// One stream, no layers.
    Simple,
    /// Several streams, one per encoding.
    Simulcast,
    /// One stream carrying spatial and temporal layers.
    Svc,
}

/// Quality of one incoming stream, 0 to 10.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerScore {
    /// Position in `rtp_parameters.encodings`.
    #[serde(default)]
    pub encoding_idx: u32,
    pub ssrc: u32,
    pub rid: Option<String>,
    pub score: u8,
}

/// As documented in
/// [WebRTC Video Processing and Codec Requirements](https://tools.ietf.org/html/rfc7742#section-4).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct ProducerVideoOrientation {
    pub camera: bool,
    pub flip: bool,
    /// One of 0, 90, 180 or 270.
    pub rotation: u16,
}

/// Inbound stream statistics, one entry per encoding.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct ProducerStat {
    pub timestamp: u64,
    pub ssrc: u32,
    pub rtx_ssrc: Option<u32>,
    pub rid: Option<String>,
    pub kind: MediaKind,
    pub mime_type: MimeType,
    pub packets_lost: u64,
    pub fraction_lost: u8,
    pub packet_count: u64,
    pub byte_count: u64,
    pub bitrate: u32,
    pub score: u8,
    pub jitter: u32,
    #[serde(default)]
    pub bitrate_by_layer: HashMap<String, u32>,
}

/// Payload of a producer `trace` notification.
pub type ProducerTraceEventData = RtpTraceEvent;

/// Packet kinds accepted by [`Producer::enable_trace_event`].
pub type ProducerTraceEventType = RtpTraceEventType;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    Score(Vec<ProducerScore>),
    VideoOrientationChange(ProducerVideoOrientation),
    Trace(ProducerTraceEventData),
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    score: Bag<Arc<dyn Fn(&[ProducerScore]) + Send + Sync>>,
    video_orientation_change: Bag<Arc<dyn Fn(ProducerVideoOrientation) + Send + Sync>>,
    pause: Bag<Arc<dyn Fn() + Send + Sync>>,
    resume: Bag<Arc<dyn Fn() + Send + Sync>>,
    trace: Bag<Arc<dyn Fn(&ProducerTraceEventData) + Send + Sync>>,
    transport_close: BagOnce<Box<dyn FnOnce() + Send>>,
    close: BagOnce<Box<dyn FnOnce() + Send>>,
}

struct Inner {
    id: ProducerId,
    kind: MediaKind,
    r#type: ProducerType,
    rtp_parameters: RtpParameters,
    consumable_rtp_parameters: RtpParameters,
    direct: bool,
    paused: AtomicBool,
    score: Arc<Mutex<Vec<ProducerScore>>>,
    transport_id: TransportId,
    channel: Channel,
    payload_channel: PayloadChannel,
    handlers: Arc<Handlers>,
    app_data: AppData,
    closed: AtomicBool,
    subscription_handler: Mutex<Option<SubscriptionHandler>>,
}

impl Inner {
    /// Drop notification subscription and fire close handlers, closed flag must be set already.
    fn finish_close(&self) {
        self.subscription_handler.lock().take();
        self.handlers.close.call_simple();
    }
}

/// Producer created on transport other than
/// [`DirectTransport`](crate::direct_transport::DirectTransport).
#[derive(Clone)]
pub struct RegularProducer {
    inner: Arc<Inner>,
}

impl fmt::Debug for RegularProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegularProducer")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("type", &self.inner.r#type)
            .field("paused", &self.inner.paused)
            .field("transport_id", &self.inner.transport_id)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl From<RegularProducer> for Producer {
    fn from(producer: RegularProducer) -> Self {
        Producer::Regular(producer)
    }
}

/// Producer created on [`DirectTransport`](crate::direct_transport::DirectTransport), RTP packets
/// are injected with [`DirectProducer::send`].
#[derive(Clone)]
pub struct DirectProducer {
    inner: Arc<Inner>,
}

impl fmt::Debug for DirectProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectProducer")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("type", &self.inner.r#type)
            .field("paused", &self.inner.paused)
            .field("transport_id", &self.inner.transport_id)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl From<DirectProducer> for Producer {
    fn from(producer: DirectProducer) -> Self {
        Producer::Direct(producer)
    }
}

/// A producer represents an audio or video source being injected into a router. It's created on
/// top of a transport that defines how the media packets are carried.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Producer {
    /// Producer created on transport other than
    /// [`DirectTransport`](crate::direct_transport::DirectTransport).
    Regular(RegularProducer),
    /// Producer created on [`DirectTransport`](crate::direct_transport::DirectTransport).
    Direct(DirectProducer),
}

impl Producer {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        id: ProducerId,
        kind: MediaKind,
        r#type: ProducerType,
        rtp_parameters: RtpParameters,
        consumable_rtp_parameters: RtpParameters,
        paused: bool,
        transport_id: TransportId,
        channel: Channel,
        payload_channel: PayloadChannel,
        app_data: AppData,
        direct: bool,
    ) -> Self {
        debug!("new()");

        let handlers = Arc::<Handlers>::default();
        let score = Arc::<Mutex<Vec<ProducerScore>>>::default();

        let subscription_handler = {
            let handlers = Arc::clone(&handlers);
            let score = Arc::clone(&score);

            channel.subscribe_to_notifications(id.into(), move |notification| {
                match serde_json::from_value::<Notification>(notification) {
                    Ok(notification) => match notification {
                        Notification::Score(scores) => {
                            *score.lock() = scores.clone();
                            handlers.score.call(|callback| {
                                callback(&scores);
                            });
                        }
                        Notification::VideoOrientationChange(video_orientation) => {
                            handlers.video_orientation_change.call(|callback| {
                                callback(video_orientation);
                            });
                        }
                        Notification::Trace(trace_event_data) => {
                            handlers.trace.call(|callback| {
                                callback(&trace_event_data);
                            });
                        }
                    },
                    Err(error) => {
                        error!("Failed to parse notification: {}", error);
                    }
                }
            })
        };

        let inner = Arc::new(Inner {
            id,
            kind,
            r#type,
            rtp_parameters,
            consumable_rtp_parameters,
            direct,
            paused: AtomicBool::new(paused),
            score,
            transport_id,
            channel,
            payload_channel,
            handlers,
            app_data,
            closed: AtomicBool::new(false),
            subscription_handler: Mutex::new(Some(subscription_handler)),
        });

        if direct {
            Self::Direct(DirectProducer { inner })
        } else {
            Self::Regular(RegularProducer { inner })
        }
    }

    #[must_use]
    pub fn id(&self) -> ProducerId {
        self.inner().id
    }

    #[must_use]
    pub fn transport_id(&self) -> TransportId {
        self.inner().transport_id
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.inner().kind
    }

    /// Parameters as given by the sending endpoint.
    #[must_use]
    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.inner().rtp_parameters
    }

    #[must_use]
    pub fn r#type(&self) -> ProducerType {
        self.inner().r#type
    }

    #[must_use]
    pub fn paused(&self) -> bool {
        self.inner().paused.load(Ordering::SeqCst)
    }

    /// Scores from the last `score` notification.
    #[must_use]
    pub fn score(&self) -> Vec<ProducerScore> {
        self.inner().score.lock().clone()
    }

    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner().app_data
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner().closed.load(Ordering::SeqCst)
    }

    #[doc(hidden)]
    pub async fn dump(&self) -> Result<ProducerDump, RequestError> {
        debug!("dump()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner()
            .channel
            .request(self.id(), ProducerDumpRequest {})
            .await
    }

    /// Returns current RTC statistics of the producer.
    pub async fn get_stats(&self) -> Result<Vec<ProducerStat>, RequestError> {
        debug!("get_stats()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner()
            .channel
            .request(self.id(), ProducerGetStatsRequest {})
            .await
    }

    /// Stops forwarding to every consumer, they learn about it through a `producerpause`
    /// notification.
    pub async fn pause(&self) -> Result<(), RequestError> {
        debug!("pause()");

        if self.closed() {
            return Ok(());
        }

        self.inner()
            .channel
            .request(self.id(), ProducerPauseRequest {})
            .await?;

        let was_paused = self.inner().paused.swap(true, Ordering::SeqCst);

        if !was_paused {
            self.inner().handlers.pause.call_simple();
        }

        Ok(())
    }

    pub async fn resume(&self) -> Result<(), RequestError> {
        debug!("resume()");

        if self.closed() {
            return Ok(());
        }

        self.inner()
            .channel
            .request(self.id(), ProducerResumeRequest {})
            .await?;

        let was_paused = self.inner().paused.swap(false, Ordering::SeqCst);

        if was_paused {
            self.inner().handlers.resume.call_simple();
        }

        Ok(())
    }

    /// Replaces the set of packet kinds reported through [`Producer::on_trace`].
    pub async fn enable_trace_event(
        &self,
        types: Vec<ProducerTraceEventType>,
    ) -> Result<(), RequestError> {
        debug!("enable_trace_event()");

        if self.closed() {
            return Ok(());
        }

        self.inner()
            .channel
            .request(self.id(), ProducerEnableTraceEventRequest { types })
            .await
    }

    /// Closes the producer and, on the worker side, every consumer of it. Idempotent.
    pub async fn close(&self) {
        let inner = self.inner();

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("close()");

        if let Err(error) = inner
            .channel
            .request(
                inner.transport_id,
                TransportCloseProducerRequest {
                    producer_id: inner.id,
                },
            )
            .await
        {
            error!("producer closing failed: {}", error);
        }

        inner.finish_close();
    }

    /// Transport this producer belongs to was closed, worker side producer is gone already.
    pub(super) fn transport_closed(&self) {
        let inner = self.inner();

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("transport_closed()");

        inner.subscription_handler.lock().take();
        inner.handlers.transport_close.call_simple();
        inner.handlers.close.call_simple();
    }

    pub fn on_score<F: Fn(&[ProducerScore]) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner().handlers.score.add(Arc::new(callback))
    }

    /// Requires the `urn:3gpp:video-orientation` header extension.
    pub fn on_video_orientation_change<F: Fn(ProducerVideoOrientation) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner()
            .handlers
            .video_orientation_change
            .add(Arc::new(callback))
    }

    /// Fires on the running to paused edge only.
    pub fn on_pause<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner().handlers.pause.add(Arc::new(callback))
    }

    pub fn on_resume<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner().handlers.resume.add(Arc::new(callback))
    }

    pub fn on_trace<F: Fn(&ProducerTraceEventData) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner().handlers.trace.add(Arc::new(callback))
    }

    /// Owning transport closed, fired right before [`Producer::on_close`].
    pub fn on_transport_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner().handlers.transport_close.add(Box::new(callback))
    }

    /// Fires once whatever caused the close, immediately if already closed.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner().handlers.close.add(Box::new(callback));
        if self.inner().closed.load(Ordering::Relaxed) {
            self.inner().handlers.close.call_simple();
        }
        handler_id
    }

    /// Parameters consumers are derived from, with router-side payload types and SSRCs.
    pub(super) fn consumable_rtp_parameters(&self) -> &RtpParameters {
        &self.inner().consumable_rtp_parameters
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakProducer {
        WeakProducer {
            inner: Arc::downgrade(self.inner()),
        }
    }

    fn inner(&self) -> &Arc<Inner> {
        match self {
            Producer::Regular(producer) => &producer.inner,
            Producer::Direct(producer) => &producer.inner,
        }
    }
}

impl DirectProducer {
    /// Injects an RTP packet as if it was received on the transport.
    pub async fn send(&self, rtp_packet: Bytes) -> Result<(), NotificationError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.inner
            .payload_channel
            .notify(self.inner.id, ProducerSendNotification {}, rtp_packet)
            .await
    }
}

/// Non-owning handle to a [`Producer`], used by routers and consumers for lookups.
#[derive(Clone)]
pub struct WeakProducer {
    inner: Weak<Inner>,
}

impl fmt::Debug for WeakProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakProducer").finish()
    }
}

impl WeakProducer {
    #[must_use]
    pub fn upgrade(&self) -> Option<Producer> {
        let inner = self.inner.upgrade()?;

        let producer = if inner.direct {
            Producer::Direct(DirectProducer { inner })
        } else {
            Producer::Regular(RegularProducer { inner })
        };

        Some(producer)
    }
}
