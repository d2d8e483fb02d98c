
use crate::data_structures::{AppData, RtpTraceEvent, RtpTraceEventType};
use crate::messages::{
    ConsumerDumpRequest, ConsumerEnableTraceEventRequest, ConsumerGetStatsRequest,
    ConsumerPauseRequest, ConsumerRequestKeyFrameRequest, ConsumerResumeRequest,
    ConsumerSetPreferredLayersRequest, ConsumerSetPriorityRequest, TransportCloseConsumerRequest,
};
use crate::producer::{Producer, ProducerId, ProducerStat, ProducerType};
use crate::rtp_parameters::{
    MediaKind, MimeType, RtpCapabilities, RtpEncodingParameters, RtpParameters,
};
use crate::transport::TransportId;
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, PayloadChannel, RequestError, SubscriptionHandler};
use bytes::Bytes;
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use log::{debug, error};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

uuid_based_wrapper_type!(
    /// Id assigned to a [`Consumer`] on creation.
    ConsumerId
);

/// Zero-based spatial and temporal layer pair of a simulcast or SVC stream.
#[derive(Debug, Copy, Clone, PartialOrd, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerLayers {
    pub spatial_layer: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_layer: Option<u8>,
}

/// Quality scores in the 0..=10 range reported with the `score` notification.
#[derive(Debug, Clone, PartialOrd, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerScore {
    /// Outgoing stream of this consumer.
    pub score: u8,
    /// Producer stream currently forwarded.
    pub producer_score: u8,
    /// Every producer stream, one per encoding.
    #[serde(default)]
    pub producer_scores: Vec<u8>,
}

/// Arguments of [`Transport::consume`](crate::transport::Transport::consume).
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ConsumerOptions {
    pub producer_id: ProducerId,
    /// What the receiving endpoint is able to decode.
    pub rtp_capabilities: RtpCapabilities,
    /// Start paused, `false` by default. Video consumers are usually started paused and resumed
    /// once the remote side is ready, so that the first frame it gets is a key frame.
    pub paused: bool,
    /// Explicit MID, otherwise taken from the transport counter.
    pub mid: Option<String>,
    /// Initial preferred layers for simulcast and SVC sources, highest available when `None`.
    pub preferred_layers: Option<ConsumerLayers>,
    /// RTX negotiation, defaults to on for video and off for audio.
    pub enable_rtx: Option<bool>,
    /// Drop Opus DTX packets.
    pub ignore_dtx: bool,
    /// Forward every producer stream untouched, used between pipe transports.
    pub pipe: bool,
    pub app_data: AppData,
}

impl ConsumerOptions {
    /// Options with everything else at its default.
    #[must_use]
    pub fn new(producer_id: ProducerId, rtp_capabilities: RtpCapabilities) -> Self {
        Self {
            producer_id,
            rtp_capabilities,
            paused: false,
            mid: None,
            preferred_layers: None,
            enable_rtx: None,
            ignore_dtx: false,
            pipe: false,
            app_data: AppData::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
#[non_exhaustive]
pub struct ConsumerDump {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub r#type: ConsumerType,
    pub rtp_parameters: RtpParameters,
    #[serde(default)]
    pub consumable_rtp_encodings: Vec<RtpEncodingParameters>,
    pub paused: bool,
    pub producer_paused: bool,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub trace_event_types: Vec<ConsumerTraceEventType>,
}

/// How the consumed streams are laid out, derived from the producer type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerType {
    Simple,
    Simulcast,
    Svc,
    /// Every encoding forwarded as is, only on
    /// [`PipeTransport`](crate::pipe_transport::PipeTransport).
    Pipe,
}

impl From<ProducerType> for ConsumerType {
    fn from(producer_type: ProducerType) -> Self {
        match producer_type {
            ProducerType::Simple => ConsumerType::Simple,
            ProducerType::Simulcast => ConsumerType::Simulcast,
            ProducerType::Svc => ConsumerType::Svc,
        }
    }
}

/// Outbound stream statistics as reported by `consumer.getStats`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct ConsumerStat {
    pub timestamp: u64,
    pub ssrc: u32,
    pub rtx_ssrc: Option<u32>,
    pub kind: MediaKind,
    pub mime_type: MimeType,
    pub packets_lost: u64,
    pub fraction_lost: u8,
    pub packets_discarded: u64,
    pub packets_retransmitted: u64,
    pub packets_repaired: u64,
    pub nack_count: u64,
    pub nack_packet_count: u64,
    pub pli_count: u64,
    pub fir_count: u64,
    pub score: u8,
    pub packet_count: u64,
    pub byte_count: u64,
    pub bitrate: u32,
    pub round_trip_time: Option<f32>,
}

/// The worker appends the producer entry when the producer lives on the same worker.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ConsumerStats {
    JustConsumer((ConsumerStat,)),
    WithProducer((ConsumerStat, ProducerStat)),
}

impl ConsumerStats {
    #[must_use]
    pub fn consumer_stats(&self) -> &ConsumerStat {
        match self {
            ConsumerStats::JustConsumer((consumer_stat,)) => consumer_stat,
            ConsumerStats::WithProducer((consumer_stat, _)) => consumer_stat,
        }
    }
}

/// Payload of a consumer `trace` notification.
pub type ConsumerTraceEventData = RtpTraceEvent;

/// Packet kinds accepted by [`Consumer::enable_trace_event`].
pub type ConsumerTraceEventType = RtpTraceEventType;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum Notification {
    ProducerClose,
    ProducerPause,
    ProducerResume,
    Score(ConsumerScore),
    LayersChange(Option<ConsumerLayers>),
    Trace(ConsumerTraceEventData),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase", content = "data")]
enum PayloadNotification {
    Rtp,
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    rtp: Bag<Arc<dyn Fn(&Bytes) + Send + Sync>>,
    pause: Bag<Arc<dyn Fn() + Send + Sync>>,
    resume: Bag<Arc<dyn Fn() + Send + Sync>>,
    producer_pause: Bag<Arc<dyn Fn() + Send + Sync>>,
    producer_resume: Bag<Arc<dyn Fn() + Send + Sync>>,
    score: Bag<Arc<dyn Fn(&ConsumerScore) + Send + Sync>>,
    layers_change: Bag<Arc<dyn Fn(&Option<ConsumerLayers>) + Send + Sync>>,
    trace: Bag<Arc<dyn Fn(&ConsumerTraceEventData) + Send + Sync>>,
    producer_close: BagOnce<Box<dyn FnOnce() + Send>>,
    transport_close: BagOnce<Box<dyn FnOnce() + Send>>,
    close: BagOnce<Box<dyn FnOnce() + Send>>,
}

#[derive(Debug, Copy, Clone)]
struct PausedState {
    paused: bool,
    producer_paused: bool,
}

impl PausedState {
    fn effective(self) -> bool {
        self.paused || self.producer_paused
    }
}

struct Inner {
    id: ConsumerId,
    producer_id: ProducerId,
    kind: MediaKind,
    r#type: ConsumerType,
    rtp_parameters: RtpParameters,
    paused_state: Mutex<PausedState>,
    priority: Mutex<u8>,
    score: Mutex<ConsumerScore>,
    preferred_layers: Mutex<Option<ConsumerLayers>>,
    current_layers: Mutex<Option<ConsumerLayers>>,
    transport_id: TransportId,
    channel: Channel,
    handlers: Handlers,
    app_data: AppData,
    closed: AtomicBool,
    subscription_handlers: Mutex<Vec<SubscriptionHandler>>,
    producer_close_handler: Mutex<Option<HandlerId>>,
}

impl Inner {
    fn handle_notification(&self, notification: Notification) {
        match notification {
            Notification::ProducerClose => {
                self.producer_closed();
            }
            Notification::ProducerPause => {
                self.set_producer_paused(true);
            }
            Notification::ProducerResume => {
                self.set_producer_paused(false);
            }
            Notification::Score(consumer_score) => {
                *self.score.lock() = consumer_score.clone();
                self.handlers.score.call(|callback| {
                    callback(&consumer_score);
                });
            }
            Notification::LayersChange(consumer_layers) => {
                *self.current_layers.lock() = consumer_layers;
                self.handlers.layers_change.call(|callback| {
                    callback(&consumer_layers);
                });
            }
            Notification::Trace(trace_event_data) => {
                self.handlers.trace.call(|callback| {
                    callback(&trace_event_data);
                });
            }
        }
    }

    fn set_producer_paused(&self, producer_paused: bool) {
        let (before, after) = {
            let mut paused_state = self.paused_state.lock();
            let before = *paused_state;
            paused_state.producer_paused = producer_paused;
            (before, *paused_state)
        };

        if before.producer_paused == after.producer_paused {
            return;
        }

        if producer_paused {
            self.handlers.producer_pause.call_simple();
        } else {
            self.handlers.producer_resume.call_simple();
        }

        self.emit_paused_edge(before, after);
    }

    fn emit_paused_edge(&self, before: PausedState, after: PausedState) {
        match (before.effective(), after.effective()) {
            (false, true) => {
                self.handlers.pause.call_simple();
            }
            (true, false) => {
                self.handlers.resume.call_simple();
            }
            _ => {}
        }
    }

    /// Associated producer is gone, either locally or because the worker said so.
    fn producer_closed(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("producer_closed()");

        self.subscription_handlers.lock().clear();
        self.handlers.producer_close.call_simple();
        self.handlers.close.call_simple();
    }
}

/// Outbound media stream forwarding one producer to the endpoint behind a transport.
///
/// The effective pause state is the union of its own pause and the producer pause, and the
/// `on_pause`/`on_resume` handlers only fire when that union changes.
#[derive(Clone)]
pub struct Consumer {
    inner: Arc<Inner>,
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.inner.id)
            .field("producer_id", &self.inner.producer_id)
            .field("kind", &self.inner.kind)
            .field("type", &self.inner.r#type)
            .field("rtp_parameters", &self.inner.rtp_parameters)
            .field("paused_state", &self.inner.paused_state)
            .field("priority", &self.inner.priority)
            .field("score", &self.inner.score)
            .field("preferred_layers", &self.inner.preferred_layers)
            .field("current_layers", &self.inner.current_layers)
            .field("transport_id", &self.inner.transport_id)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl Consumer {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        id: ConsumerId,
        producer: &Producer,
        r#type: ConsumerType,
        rtp_parameters: RtpParameters,
        paused: bool,
        producer_paused: bool,
        score: ConsumerScore,
        preferred_layers: Option<ConsumerLayers>,
        transport_id: TransportId,
        channel: Channel,
        payload_channel: Option<PayloadChannel>,
        app_data: AppData,
    ) -> Self {
        debug!("new()");

        let inner = Arc::new(Inner {
            id,
            producer_id: producer.id(),
            kind: producer.kind(),
            r#type,
            rtp_parameters,
            paused_state: Mutex::new(PausedState {
                paused,
                producer_paused,
            }),
            priority: Mutex::new(1_u8),
            score: Mutex::new(score),
            preferred_layers: Mutex::new(preferred_layers),
            current_layers: Mutex::default(),
            transport_id,
            channel,
            handlers: Handlers::default(),
            app_data,
            closed: AtomicBool::new(false),
            subscription_handlers: Mutex::default(),
            producer_close_handler: Mutex::default(),
        });

        let inner_weak = Arc::downgrade(&inner);

        let mut subscription_handlers = vec![inner.channel.subscribe_to_notifications(id.into(), {
            let inner_weak = Weak::clone(&inner_weak);

            move |notification| match serde_json::from_value::<Notification>(notification) {
                Ok(notification) => {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.handle_notification(notification);
                    }
                }
                Err(error) => {
                    error!("Failed to parse notification: {}", error);
                }
            }
        })];

        if let Some(payload_channel) = payload_channel {
            subscription_handlers.push(payload_channel.subscribe_to_notifications(id.into(), {
                let inner_weak = Weak::clone(&inner_weak);

                move |notification| {
                    match serde_json::from_value::<PayloadNotification>(notification.message) {
                        Ok(PayloadNotification::Rtp) => {
                            if let Some(inner) = inner_weak.upgrade() {
                                inner.handlers.rtp.call(|callback| {
                                    callback(&notification.payload);
                                });
                            }
                        }
                        Err(error) => {
                            error!("Failed to parse payload notification: {}", error);
                        }
                    }
                }
            }));
        }

        *inner.subscription_handlers.lock() = subscription_handlers;

        let producer_close_handler = producer.on_close(move || {
            if let Some(inner) = inner_weak.upgrade() {
                inner.producer_closed();
            }
        });
        inner
            .producer_close_handler
            .lock()
            .replace(producer_close_handler);

        Self { inner }
    }

    #[must_use]
    pub fn id(&self) -> ConsumerId {
        self.inner.id
    }

    /// Producer being forwarded.
    #[must_use]
    pub fn producer_id(&self) -> ProducerId {
        self.inner.producer_id
    }

    #[must_use]
    pub fn transport_id(&self) -> TransportId {
        self.inner.transport_id
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    /// Parameters the receiving endpoint must use, including the assigned MID.
    #[must_use]
    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.inner.rtp_parameters
    }

    #[must_use]
    pub fn r#type(&self) -> ConsumerType {
        self.inner.r#type
    }

    /// Own pause flag only, see [`Consumer::producer_paused`].
    #[must_use]
    pub fn paused(&self) -> bool {
        self.inner.paused_state.lock().paused
    }

    /// Last pause state reported for the producer.
    #[must_use]
    pub fn producer_paused(&self) -> bool {
        self.inner.paused_state.lock().producer_paused
    }

    #[must_use]
    pub fn priority(&self) -> u8 {
        *self.inner.priority.lock()
    }

    /// Latest `score` notification, or the score returned on creation.
    #[must_use]
    pub fn score(&self) -> ConsumerScore {
        self.inner.score.lock().clone()
    }

    /// `None` for simple and pipe consumers.
    #[must_use]
    pub fn preferred_layers(&self) -> Option<ConsumerLayers> {
        *self.inner.preferred_layers.lock()
    }

    /// Layers being sent right now, as of the last `layerschange` notification.
    #[must_use]
    pub fn current_layers(&self) -> Option<ConsumerLayers> {
        *self.inner.current_layers.lock()
    }

    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    #[doc(hidden)]
    pub async fn dump(&self) -> Result<ConsumerDump, RequestError> {
        debug!("dump()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner
            .channel
            .request(self.id(), ConsumerDumpRequest {})
            .await
    }

    /// Fetches statistics from the worker.
    pub async fn get_stats(&self) -> Result<ConsumerStats, RequestError> {
        debug!("get_stats()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner
            .channel
            .request(self.id(), ConsumerGetStatsRequest {})
            .await
    }

    /// Stops forwarding. No-op once closed.
    pub async fn pause(&self) -> Result<(), RequestError> {
        debug!("pause()");

        if self.closed() {
            return Ok(());
        }

        self.inner
            .channel
            .request(self.id(), ConsumerPauseRequest {})
            .await?;

        let (before, after) = {
            let mut paused_state = self.inner.paused_state.lock();
            let before = *paused_state;
            paused_state.paused = true;
            (before, *paused_state)
        };

        self.inner.emit_paused_edge(before, after);

        Ok(())
    }

    /// Resumes forwarding, media only flows if the producer is not paused too.
    pub async fn resume(&self) -> Result<(), RequestError> {
        debug!("resume()");

        if self.closed() {
            return Ok(());
        }

        self.inner
            .channel
            .request(self.id(), ConsumerResumeRequest {})
            .await?;

        let (before, after) = {
            let mut paused_state = self.inner.paused_state.lock();
            let before = *paused_state;
            paused_state.paused = false;
            (before, *paused_state)
        };

        self.inner.emit_paused_edge(before, after);

        Ok(())
    }

    /// Caps the layers forwarded to the endpoint. The worker answers with the layers it settled
    /// on, which become [`Consumer::preferred_layers`].
    pub async fn set_preferred_layers(
        &self,
        consumer_layers: ConsumerLayers,
    ) -> Result<(), RequestError> {
        debug!("set_preferred_layers()");

        if self.closed() {
            return Ok(());
        }

        let consumer_layers = self
            .inner
            .channel
            .request(
                self.id(),
                ConsumerSetPreferredLayersRequest {
                    spatial_layer: consumer_layers.spatial_layer,
                    temporal_layer: consumer_layers.temporal_layer,
                },
            )
            .await?;

        *self.inner.preferred_layers.lock() = consumer_layers;

        Ok(())
    }

    /// Weight used by the worker when splitting the available outgoing bitrate between video
    /// consumers of the same transport.
    pub async fn set_priority(&self, priority: u8) -> Result<(), RequestError> {
        debug!("set_priority()");

        if self.closed() {
            return Ok(());
        }

        let result = self
            .inner
            .channel
            .request(self.id(), ConsumerSetPriorityRequest { priority })
            .await?;

        *self.inner.priority.lock() = result.priority;

        Ok(())
    }

    /// Back to the default priority of 1.
    pub async fn unset_priority(&self) -> Result<(), RequestError> {
        debug!("unset_priority()");

        self.set_priority(1).await
    }

    /// Asks the producer side for a key frame, video only.
    pub async fn request_key_frame(&self) -> Result<(), RequestError> {
        debug!("request_key_frame()");

        if self.closed() {
            return Ok(());
        }

        self.inner
            .channel
            .request(self.id(), ConsumerRequestKeyFrameRequest {})
            .await
    }

    /// Replaces the set of packet kinds reported through [`Consumer::on_trace`].
    pub async fn enable_trace_event(
        &self,
        types: Vec<ConsumerTraceEventType>,
    ) -> Result<(), RequestError> {
        debug!("enable_trace_event()");

        if self.closed() {
            return Ok(());
        }

        self.inner
            .channel
            .request(self.id(), ConsumerEnableTraceEventRequest { types })
            .await
    }

    /// Closes the consumer.
    ///
    /// Does nothing if the consumer is already closed.
    pub async fn close(&self) {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("close()");

        if let Err(error) = inner
            .channel
            .request(
                inner.transport_id,
                TransportCloseConsumerRequest {
                    consumer_id: inner.id,
                },
            )
            .await
        {
            error!("consumer closing failed: {}", error);
        }

        inner.subscription_handlers.lock().clear();
        inner.producer_close_handler.lock().take();
        inner.handlers.close.call_simple();
    }

    /// Transport this consumer belongs to was closed, worker side consumer is gone already.
    pub(super) fn transport_closed(&self) {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("transport_closed()");

        inner.subscription_handlers.lock().clear();
        inner.producer_close_handler.lock().take();
        inner.handlers.transport_close.call_simple();
        inner.handlers.close.call_simple();
    }

    /// Raw RTP forwarded to a consumer of a
    /// [`DirectTransport`](crate::direct_transport::DirectTransport). Never fires on other
    /// transport kinds.
    pub fn on_rtp<F: Fn(&Bytes) + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.rtp.add(Arc::new(callback))
    }

    /// Effective pause state went from running to paused.
    pub fn on_pause<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.pause.add(Arc::new(callback))
    }

    /// Effective pause state went from paused to running.
    pub fn on_resume<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.resume.add(Arc::new(callback))
    }

    pub fn on_producer_pause<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.producer_pause.add(Arc::new(callback))
    }

    pub fn on_producer_resume<F: Fn() + Send + Sync + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.producer_resume.add(Arc::new(callback))
    }

    pub fn on_score<F: Fn(&ConsumerScore) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.score.add(Arc::new(callback))
    }

    /// `None` means nothing is being sent, for example while the producer is paused.
    pub fn on_layers_change<F: Fn(&Option<ConsumerLayers>) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.layers_change.add(Arc::new(callback))
    }

    pub fn on_trace<F: Fn(&ConsumerTraceEventData) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.trace.add(Arc::new(callback))
    }

    /// Producer went away, fired right before [`Consumer::on_close`].
    pub fn on_producer_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.producer_close.add(Box::new(callback))
    }

    /// Owning transport closed, fired right before [`Consumer::on_close`].
    pub fn on_transport_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.transport_close.add(Box::new(callback))
    }

    /// Fires once, whatever caused the close. Runs immediately when already closed.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner.handlers.close.add(Box::new(callback));
        if self.inner.closed.load(Ordering::Relaxed) {
            self.inner.handlers.close.call_simple();
        }
        handler_id
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakConsumer {
        WeakConsumer {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning handle to a [`Consumer`].
#[derive(Clone)]
pub struct WeakConsumer {
    inner: Weak<Inner>,
}

impl fmt::Debug for WeakConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakConsumer").finish()
    }
}

impl WeakConsumer {
    #[must_use]
    pub fn upgrade(&self) -> Option<Consumer> {
        let inner = self.inner.upgrade()?;

        Some(Consumer { inner })
    }
}
