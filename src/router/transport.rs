
use crate::consumer::{Consumer, ConsumerId, ConsumerOptions, ConsumerType};
use crate::data_consumer::{DataConsumer, DataConsumerId, DataConsumerOptions, DataConsumerType};
use crate::data_producer::{DataProducer, DataProducerId, DataProducerOptions, DataProducerType};
use crate::data_structures::{AppData, TraceEventDirection};
use crate::messages::{
    RouterCloseTransportRequest, TransportConsumeDataRequest, TransportConsumeRequest,
    TransportDumpRequest, TransportEnableTraceEventRequest, TransportGetStatsRequest,
    TransportProduceDataRequest, TransportProduceRequest, TransportSetMaxIncomingBitrateRequest,
    TransportSetMaxOutgoingBitrateRequest, TransportSetMinOutgoingBitrateRequest,
};
use crate::ortc::{
    self, ConsumerRtpParametersError, RtpParametersError, RtpParametersMappingError,
    SctpParametersError,
};
use crate::producer::{Producer, ProducerId, ProducerOptions};
use crate::router::{RouterId, WeakRouter};
use crate::rtp_parameters::MediaKind;
use crate::sctp_parameters::SctpStreamParameters;
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, PayloadChannel, RequestError, SubscriptionHandler};
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use hash_hasher::{HashedMap, HashedSet};
use log::{debug, error, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use uuid::Uuid;

uuid_based_wrapper_type!(
    /// Transport identifier.
    TransportId
);

/// Consumer MIDs wrap around to 0 once this value is reached.
const MAX_MID_FOR_CONSUMERS: u32 = 100_000_000;

/// Kind of the transport, decides the few places where transports behave differently.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TransportKind {
    /// [`WebRtcTransport`](crate::webrtc_transport::WebRtcTransport).
    WebRtc,
    /// [`PlainTransport`](crate::plain_transport::PlainTransport).
    Plain,
    /// [`DirectTransport`](crate::direct_transport::DirectTransport).
    Direct,
    /// [`PipeTransport`](crate::pipe_transport::PipeTransport).
    Pipe,
}

impl TransportKind {
    /// Pipe transports carry streams between routers verbatim, including the producer's CNAME.
    fn keeps_producer_cname(self) -> bool {
        self == TransportKind::Pipe
    }

    fn consumes_as_pipe(self) -> bool {
        self == TransportKind::Pipe
    }

    fn supports_bitrate_control(self) -> bool {
        self != TransportKind::Direct
    }

    fn is_direct(self) -> bool {
        self == TransportKind::Direct
    }
}

/// Valid types for "trace" event.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportTraceEventType {
    /// RTP probation packet.
    Probation,
    /// Transport bandwidth estimation changed.
    Bwe,
}

/// 'trace' event data.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportTraceEventData {
    /// RTP probation packet.
    Probation {
        /// Event timestamp.
        timestamp: u64,
        /// Event direction.
        direction: TraceEventDirection,
        /// Per type information.
        info: Value,
    },
    /// Transport bandwidth estimation changed.
    Bwe {
        /// Event timestamp.
        timestamp: u64,
        /// Event direction.
        direction: TraceEventDirection,
        /// Per type information.
        info: Value,
    },
}

/// Part of the dump shared by every transport kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TransportDumpCommon {
    /// Transport id.
    pub id: TransportId,
    /// Ids of producers created on the transport.
    #[serde(default)]
    pub producer_ids: Vec<ProducerId>,
    /// Ids of consumers created on the transport.
    #[serde(default)]
    pub consumer_ids: Vec<ConsumerId>,
    /// Ids of data producers created on the transport.
    #[serde(default)]
    pub data_producer_ids: Vec<DataProducerId>,
    /// Ids of data consumers created on the transport.
    #[serde(default)]
    pub data_consumer_ids: Vec<DataConsumerId>,
    /// Maximum size of SCTP messages.
    #[serde(default)]
    pub max_message_size: Option<u32>,
    /// Enabled trace event types.
    #[serde(default)]
    pub trace_event_types: Vec<TransportTraceEventType>,
}

/// Part of the stats shared by every transport kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
#[non_exhaustive]
pub struct TransportStatCommon {
    pub transport_id: TransportId,
    pub timestamp: u64,
    #[serde(default)]
    pub bytes_received: u64,
    #[serde(default)]
    pub recv_bitrate: u32,
    #[serde(default)]
    pub bytes_sent: u64,
    #[serde(default)]
    pub send_bitrate: u32,
    #[serde(default)]
    pub rtp_bytes_received: u64,
    #[serde(default)]
    pub rtp_recv_bitrate: u32,
    #[serde(default)]
    pub rtp_bytes_sent: u64,
    #[serde(default)]
    pub rtp_send_bitrate: u32,
    #[serde(default)]
    pub rtx_bytes_received: u64,
    #[serde(default)]
    pub rtx_recv_bitrate: u32,
    #[serde(default)]
    pub rtx_bytes_sent: u64,
    #[serde(default)]
    pub rtx_send_bitrate: u32,
    #[serde(default)]
    pub probation_bytes_sent: u64,
    #[serde(default)]
    pub probation_send_bitrate: u32,
    pub available_outgoing_bitrate: Option<u32>,
    pub available_incoming_bitrate: Option<u32>,
    pub max_incoming_bitrate: Option<u32>,
}

/// Error that caused [`Transport::produce`] to fail.
#[derive(Debug, Error)]
pub enum ProduceError {
    /// Transport is already closed.
    #[error("Transport is closed")]
    TransportClosed,
    /// Producer with the same id already exists.
    #[error("Producer with the same id \"{0}\" already exists")]
    AlreadyExists(ProducerId),
    /// Router this transport belongs to is gone.
    #[error("Router is gone")]
    RouterGone,
    /// Incorrect RTP parameters.
    #[error("Incorrect RTP parameters: {0}")]
    IncorrectRtpParameters(RtpParametersError),
    /// RTP capabilities of the router don't cover the RTP parameters.
    #[error("RTP mapping error: {0}")]
    FailedRtpParametersMapping(RtpParametersMappingError),
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
}

/// Error that caused [`Transport::consume`] to fail.
#[derive(Debug, Error)]
pub enum ConsumeError {
    /// Transport is already closed.
    #[error("Transport is closed")]
    TransportClosed,
    /// Router this transport belongs to is gone.
    #[error("Router is gone")]
    RouterGone,
    /// Producer with specified id not found
    #[error("Producer with id \"{0}\" not found")]
    ProducerNotFound(ProducerId),
    /// RTP capabilities can't consume the producer.
    #[error("Bad consumer RTP parameters: {0}")]
    BadConsumerRtpParameters(ConsumerRtpParametersError),
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
}

/// Error that caused [`Transport::produce_data`] to fail.
#[derive(Debug, Error)]
pub enum ProduceDataError {
    /// Transport is already closed.
    #[error("Transport is closed")]
    TransportClosed,
    /// Data producer with the same id already exists.
    #[error("Data producer with the same id \"{0}\" already exists")]
    AlreadyExists(DataProducerId),
    /// SCTP stream parameters are required for this transport.
    #[error("SCTP stream parameters are required for this transport")]
    SctpStreamParametersRequired,
    /// Incorrect SCTP stream parameters.
    #[error("Incorrect SCTP stream parameters: {0}")]
    IncorrectSctpStreamParameters(SctpParametersError),
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
}

/// Error that caused [`Transport::consume_data`] to fail.
#[derive(Debug, Error)]
pub enum ConsumeDataError {
    /// Transport is already closed.
    #[error("Transport is closed")]
    TransportClosed,
    /// Router this transport belongs to is gone.
    #[error("Router is gone")]
    RouterGone,
    /// Data producer with specified id not found
    #[error("Data producer with id \"{0}\" not found")]
    DataProducerNotFound(DataProducerId),
    /// Transport has no SCTP association to carry data.
    #[error("SCTP is not enabled on this transport")]
    SctpNotEnabled,
    /// All SCTP stream ids are taken.
    #[error("No SCTP stream id available")]
    NoSctpStreamId,
    /// Incorrect SCTP stream parameters.
    #[error("Incorrect SCTP stream parameters: {0}")]
    IncorrectSctpStreamParameters(SctpParametersError),
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(RequestError),
}

/// Error that caused bitrate setters to fail.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SetBitrateError {
    /// Transport kind doesn't do bitrate control.
    #[error("{0} is not implemented for this transport")]
    NotImplemented(&'static str),
    /// Request to worker failed
    #[error("Request to worker failed: {0}")]
    Request(#[from] RequestError),
}

/// Id claimed by a creation request that is still in flight, released on drop.
struct PendingId<'a, Id: Copy + Eq + Hash> {
    pending_ids: &'a Mutex<HashedSet<Id>>,
    id: Id,
}

impl<'a, Id: Copy + Eq + Hash> PendingId<'a, Id> {
    /// Fails if an entity with this id exists or is being created.
    fn claim<V>(
        entities: &Mutex<HashedMap<Id, V>>,
        pending_ids: &'a Mutex<HashedSet<Id>>,
        id: Id,
    ) -> Option<Self> {
        let entities = entities.lock();
        if entities.contains_key(&id) || !pending_ids.lock().insert(id) {
            return None;
        }

        Some(Self { pending_ids, id })
    }
}

impl<Id: Copy + Eq + Hash> Drop for PendingId<'_, Id> {
    fn drop(&mut self) {
        self.pending_ids.lock().remove(&self.id);
    }
}

/// Round-robin allocator of SCTP stream ids for data consumers, sized by the negotiated number of
/// incoming streams on first use.
#[derive(Debug, Default)]
pub(super) struct SctpStreamIds {
    used: Option<Vec<bool>>,
    next: usize,
}

impl SctpStreamIds {
    pub(super) fn allocate(&mut self, num_streams: u16) -> Option<u16> {
        let used = self
            .used
            .get_or_insert_with(|| vec![false; usize::from(num_streams)]);
        let len = used.len();

        for offset in 0..len {
            let stream_id = (self.next + offset) % len;
            if !used[stream_id] {
                used[stream_id] = true;
                self.next = stream_id + 1;
                return u16::try_from(stream_id).ok();
            }
        }

        None
    }

    pub(super) fn release(&mut self, stream_id: u16) {
        if let Some(used) = self.used.as_mut() {
            if let Some(slot) = used.get_mut(usize::from(stream_id)) {
                *slot = false;
            }
        }
    }
}

/// Returns the MID to use and moves the counter forward, wrapping around to 0.
pub(super) fn next_mid(counter: &AtomicU32) -> u32 {
    let mut current = counter.load(Ordering::SeqCst);
    loop {
        let next = if current + 1 >= MAX_MID_FOR_CONSUMERS {
            0
        } else {
            current + 1
        };
        match counter.compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => {
                return current;
            }
            Err(actual) => {
                current = actual;
            }
        }
    }
}

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    new_producer: Bag<Arc<dyn Fn(&Producer) + Send + Sync>>,
    new_consumer: Bag<Arc<dyn Fn(&Consumer) + Send + Sync>>,
    new_data_producer: Bag<Arc<dyn Fn(&DataProducer) + Send + Sync>>,
    new_data_consumer: Bag<Arc<dyn Fn(&DataConsumer) + Send + Sync>>,
    producer_close: Bag<Arc<dyn Fn(ProducerId) + Send + Sync>>,
    data_producer_close: Bag<Arc<dyn Fn(DataProducerId) + Send + Sync>>,
    trace: Bag<Arc<dyn Fn(&TransportTraceEventData) + Send + Sync>>,
    router_close: BagOnce<Box<dyn FnOnce() + Send>>,
    webrtc_server_close: BagOnce<Box<dyn FnOnce() + Send>>,
    close: BagOnce<Box<dyn FnOnce() + Send>>,
}

struct Inner {
    id: TransportId,
    kind: TransportKind,
    router_id: RouterId,
    router: WeakRouter,
    channel: Channel,
    payload_channel: PayloadChannel,
    num_sctp_streams: Option<u16>,
    pipe_rtx: bool,
    cname_for_producers: Mutex<Option<String>>,
    next_mid_for_consumers: AtomicU32,
    sctp_stream_ids: Mutex<SctpStreamIds>,
    producers: Mutex<HashedMap<ProducerId, Producer>>,
    pending_producer_ids: Mutex<HashedSet<ProducerId>>,
    consumers: Mutex<HashedMap<ConsumerId, Consumer>>,
    data_producers: Mutex<HashedMap<DataProducerId, DataProducer>>,
    pending_data_producer_ids: Mutex<HashedSet<DataProducerId>>,
    data_consumers: Mutex<HashedMap<DataConsumerId, DataConsumer>>,
    handlers: Handlers,
    app_data: AppData,
    closed: AtomicBool,
    subscription_handlers: Mutex<Vec<SubscriptionHandler>>,
}

impl Inner {
    /// Snapshot every child collection and close children outside of the locks.
    fn close_children(&self) {
        self.subscription_handlers.lock().clear();

        let consumers = mem::take(&mut *self.consumers.lock());
        for consumer in consumers.into_values() {
            consumer.transport_closed();
        }

        let data_consumers = mem::take(&mut *self.data_consumers.lock());
        for data_consumer in data_consumers.into_values() {
            data_consumer.transport_closed();
        }

        let producers = mem::take(&mut *self.producers.lock());
        for producer in producers.into_values() {
            producer.transport_closed();
        }

        let data_producers = mem::take(&mut *self.data_producers.lock());
        for data_producer in data_producers.into_values() {
            data_producer.transport_closed();
        }
    }
}

/// Part shared by every transport kind: owns producers, consumers, data producers and data
/// consumers created on it and takes care of their lifecycle.
///
/// Kind-specific wrappers ([`WebRtcTransport`](crate::webrtc_transport::WebRtcTransport),
/// [`PlainTransport`](crate::plain_transport::PlainTransport),
/// [`PipeTransport`](crate::pipe_transport::PipeTransport) and
/// [`DirectTransport`](crate::direct_transport::DirectTransport)) dereference to this type.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Inner>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("router_id", &self.inner.router_id)
            .field("next_mid_for_consumers", &self.inner.next_mid_for_consumers)
            .field("cname_for_producers", &self.inner.cname_for_producers)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl Transport {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        id: TransportId,
        kind: TransportKind,
        router_id: RouterId,
        router: WeakRouter,
        channel: Channel,
        payload_channel: PayloadChannel,
        num_sctp_streams: Option<u16>,
        pipe_rtx: bool,
        app_data: AppData,
    ) -> Self {
        debug!("new()");

        let inner = Arc::new(Inner {
            id,
            kind,
            router_id,
            router,
            channel,
            payload_channel,
            num_sctp_streams,
            pipe_rtx,
            cname_for_producers: Mutex::default(),
            next_mid_for_consumers: AtomicU32::new(0),
            sctp_stream_ids: Mutex::default(),
            producers: Mutex::default(),
            pending_producer_ids: Mutex::default(),
            consumers: Mutex::default(),
            data_producers: Mutex::default(),
            pending_data_producer_ids: Mutex::default(),
            data_consumers: Mutex::default(),
            handlers: Handlers::default(),
            app_data,
            closed: AtomicBool::new(false),
            subscription_handlers: Mutex::default(),
        });

        Self { inner }
    }

    /// Transport id.
    #[must_use]
    pub fn id(&self) -> TransportId {
        self.inner.id
    }

    /// Kind of the transport.
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        self.inner.kind
    }

    /// Id of the router this transport belongs to.
    #[must_use]
    pub fn router_id(&self) -> RouterId {
        self.inner.router_id
    }

    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Producers currently alive on this transport.
    #[must_use]
    pub fn producers(&self) -> Vec<Producer> {
        self.inner.producers.lock().values().cloned().collect()
    }

    /// Consumers currently alive on this transport.
    #[must_use]
    pub fn consumers(&self) -> Vec<Consumer> {
        self.inner.consumers.lock().values().cloned().collect()
    }

    /// Data producers currently alive on this transport.
    #[must_use]
    pub fn data_producers(&self) -> Vec<DataProducer> {
        self.inner.data_producers.lock().values().cloned().collect()
    }

    /// Data consumers currently alive on this transport.
    #[must_use]
    pub fn data_consumers(&self) -> Vec<DataConsumer> {
        self.inner.data_consumers.lock().values().cloned().collect()
    }

    pub(super) fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    pub(super) fn payload_channel(&self) -> &PayloadChannel {
        &self.inner.payload_channel
    }

    /// Keep kind-specific notification subscription alive for as long as transport is open.
    pub(super) fn add_subscription_handler(&self, subscription_handler: SubscriptionHandler) {
        self.inner
            .subscription_handlers
            .lock()
            .push(subscription_handler);
    }

    pub(super) fn emit_trace(&self, trace_event_data: &TransportTraceEventData) {
        self.inner.handlers.trace.call(|callback| {
            callback(trace_event_data);
        });
    }

    pub(super) async fn dump_impl<Dump>(&self) -> Result<Dump, RequestError>
    where
        Dump: DeserializeOwned + fmt::Debug + Send + 'static,
    {
        debug!("dump()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner
            .channel
            .request(
                self.id(),
                TransportDumpRequest {
                    phantom_data: PhantomData::<Dump>,
                },
            )
            .await
    }

    pub(super) async fn get_stats_impl<Stat>(&self) -> Result<Vec<Stat>, RequestError>
    where
        Stat: DeserializeOwned + fmt::Debug + Send + 'static,
    {
        debug!("get_stats()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner
            .channel
            .request(
                self.id(),
                TransportGetStatsRequest {
                    phantom_data: PhantomData::<Stat>,
                },
            )
            .await
    }

    /// Instructs the router to receive audio or video RTP (or SRTP depending on the transport).
    /// This is the way to inject media into the router.
    ///
    /// Transport will be kept alive as long as at least one producer instance is alive.
    pub async fn produce(&self, producer_options: ProducerOptions) -> Result<Producer, ProduceError> {
        debug!("produce()");

        if self.closed() {
            return Err(ProduceError::TransportClosed);
        }

        let ProducerOptions {
            id,
            kind,
            mut rtp_parameters,
            paused,
            key_frame_request_delay,
            app_data,
        } = producer_options;

        let producer_id = id.unwrap_or_else(ProducerId::new);
        let _pending_id = PendingId::claim(
            &self.inner.producers,
            &self.inner.pending_producer_ids,
            producer_id,
        )
        .ok_or(ProduceError::AlreadyExists(producer_id))?;

        ortc::validate_rtp_parameters(&rtp_parameters)
            .map_err(ProduceError::IncorrectRtpParameters)?;

        if !self.inner.kind.keeps_producer_cname() {
            let cname = {
                let mut cname_for_producers = self.inner.cname_for_producers.lock();
                cname_for_producers
                    .get_or_insert_with(|| {
                        rtp_parameters.rtcp.cname.clone().unwrap_or_else(|| {
                            Uuid::new_v4().to_string().chars().take(8).collect()
                        })
                    })
                    .clone()
            };
            rtp_parameters.rtcp.cname = Some(cname);
        }

        let router = self.inner.router.upgrade().ok_or(ProduceError::RouterGone)?;

        let rtp_mapping =
            ortc::get_producer_rtp_parameters_mapping(&rtp_parameters, router.rtp_capabilities())
                .map_err(ProduceError::FailedRtpParametersMapping)?;

        let consumable_rtp_parameters = ortc::get_consumable_rtp_parameters(
            kind,
            &rtp_parameters,
            router.rtp_capabilities(),
            &rtp_mapping,
        );

        let response = self
            .inner
            .channel
            .request(
                self.id(),
                TransportProduceRequest {
                    producer_id,
                    kind,
                    rtp_parameters: rtp_parameters.clone(),
                    rtp_mapping,
                    key_frame_request_delay,
                    paused,
                },
            )
            .await
            .map_err(ProduceError::Request)?;

        let producer = Producer::new(
            producer_id,
            kind,
            response.r#type,
            rtp_parameters,
            consumable_rtp_parameters,
            paused,
            self.id(),
            self.inner.channel.clone(),
            self.inner.payload_channel.clone(),
            app_data,
            self.inner.kind.is_direct(),
        );

        self.register_producer(&producer);

        Ok(producer)
    }

    fn register_producer(&self, producer: &Producer) {
        self.inner
            .producers
            .lock()
            .insert(producer.id(), producer.clone());

        producer
            .on_close({
                let inner_weak = Arc::downgrade(&self.inner);
                let producer_id = producer.id();

                move || {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.producers.lock().remove(&producer_id);
                        inner.handlers.producer_close.call(|callback| {
                            callback(producer_id);
                        });
                    }
                }
            })
            .detach();

        self.inner.handlers.new_producer.call(|callback| {
            callback(producer);
        });

        // Transport might have been closed while request to worker was in flight
        if self.closed() {
            producer.transport_closed();
        }
    }

    /// Instructs the router to send audio or video RTP (or SRTP depending on the transport).
    /// This is the way to extract media from the router.
    pub async fn consume(&self, consumer_options: ConsumerOptions) -> Result<Consumer, ConsumeError> {
        debug!("consume()");

        if self.closed() {
            return Err(ConsumeError::TransportClosed);
        }

        let ConsumerOptions {
            producer_id,
            rtp_capabilities,
            paused,
            mid,
            preferred_layers,
            enable_rtx,
            ignore_dtx,
            pipe,
            app_data,
        } = consumer_options;

        let router = self.inner.router.upgrade().ok_or(ConsumeError::RouterGone)?;

        let producer = router
            .get_producer(&producer_id)
            .ok_or(ConsumeError::ProducerNotFound(producer_id))?;

        let (rtp_parameters, r#type) = if self.inner.kind.consumes_as_pipe() {
            let rtp_parameters = ortc::get_pipe_consumer_rtp_parameters(
                producer.consumable_rtp_parameters(),
                self.inner.pipe_rtx,
            );

            (rtp_parameters, ConsumerType::Pipe)
        } else {
            let enable_rtx = enable_rtx.unwrap_or(producer.kind() == MediaKind::Video);
            let mut rtp_parameters = ortc::get_consumer_rtp_parameters(
                producer.consumable_rtp_parameters(),
                &rtp_capabilities,
                pipe,
                enable_rtx,
            )
            .map_err(ConsumeError::BadConsumerRtpParameters)?;

            if !pipe {
                rtp_parameters.mid = Some(match mid {
                    Some(mid) => mid,
                    None => next_mid(&self.inner.next_mid_for_consumers).to_string(),
                });
            }

            let r#type = if pipe {
                ConsumerType::Pipe
            } else {
                producer.r#type().into()
            };

            (rtp_parameters, r#type)
        };

        let consumer_id = ConsumerId::new();

        let response = self
            .inner
            .channel
            .request(
                self.id(),
                TransportConsumeRequest {
                    consumer_id,
                    producer_id: producer.id(),
                    kind: producer.kind(),
                    rtp_parameters: rtp_parameters.clone(),
                    r#type,
                    consumable_rtp_encodings: producer
                        .consumable_rtp_parameters()
                        .encodings
                        .clone(),
                    paused,
                    preferred_layers,
                    ignore_dtx,
                },
            )
            .await
            .map_err(ConsumeError::Request)?;

        let consumer = Consumer::new(
            consumer_id,
            &producer,
            r#type,
            rtp_parameters,
            response.paused,
            response.producer_paused,
            response.score,
            response.preferred_layers,
            self.id(),
            self.inner.channel.clone(),
            self.inner
                .kind
                .is_direct()
                .then(|| self.inner.payload_channel.clone()),
            app_data,
        );

        self.inner
            .consumers
            .lock()
            .insert(consumer.id(), consumer.clone());

        consumer
            .on_close({
                let inner_weak = Arc::downgrade(&self.inner);

                move || {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.consumers.lock().remove(&consumer_id);
                    }
                }
            })
            .detach();

        self.inner.handlers.new_consumer.call(|callback| {
            callback(&consumer);
        });

        if self.closed() {
            consumer.transport_closed();
        }

        Ok(consumer)
    }

    /// Instructs the router to receive data messages. Those messages can be delivered by an
    /// endpoint via SCTP protocol (AKA DataChannel in WebRTC) or can be directly sent from the Rust
    /// application if the transport is a `DirectTransport`.
    pub async fn produce_data(
        &self,
        data_producer_options: DataProducerOptions,
    ) -> Result<DataProducer, ProduceDataError> {
        debug!("produce_data()");

        if self.closed() {
            return Err(ProduceDataError::TransportClosed);
        }

        let DataProducerOptions {
            id,
            sctp_stream_parameters,
            label,
            protocol,
            paused,
            app_data,
        } = data_producer_options;

        let data_producer_id = id.unwrap_or_else(DataProducerId::new);
        let _pending_id = PendingId::claim(
            &self.inner.data_producers,
            &self.inner.pending_data_producer_ids,
            data_producer_id,
        )
        .ok_or(ProduceDataError::AlreadyExists(data_producer_id))?;

        let (r#type, sctp_stream_parameters) = if self.inner.kind.is_direct() {
            if sctp_stream_parameters.is_some() {
                warn!(
                    "sctp_stream_parameters are ignored when producing data on a DirectTransport",
                );
            }

            (DataProducerType::Direct, None)
        } else {
            let sctp_stream_parameters =
                sctp_stream_parameters.ok_or(ProduceDataError::SctpStreamParametersRequired)?;
            ortc::validate_sctp_stream_parameters(&sctp_stream_parameters)
                .map_err(ProduceDataError::IncorrectSctpStreamParameters)?;

            (DataProducerType::Sctp, Some(sctp_stream_parameters))
        };

        let response = self
            .inner
            .channel
            .request(
                self.id(),
                TransportProduceDataRequest {
                    data_producer_id,
                    r#type,
                    sctp_stream_parameters,
                    label,
                    protocol,
                    paused,
                },
            )
            .await
            .map_err(ProduceDataError::Request)?;

        let data_producer = DataProducer::new(
            data_producer_id,
            response.r#type,
            response.sctp_stream_parameters,
            response.label,
            response.protocol,
            paused,
            self.id(),
            self.inner.channel.clone(),
            self.inner.payload_channel.clone(),
            app_data,
            self.inner.kind.is_direct(),
        );

        self.inner
            .data_producers
            .lock()
            .insert(data_producer.id(), data_producer.clone());

        data_producer
            .on_close({
                let inner_weak = Arc::downgrade(&self.inner);

                move || {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.data_producers.lock().remove(&data_producer_id);
                        inner.handlers.data_producer_close.call(|callback| {
                            callback(data_producer_id);
                        });
                    }
                }
            })
            .detach();

        self.inner.handlers.new_data_producer.call(|callback| {
            callback(&data_producer);
        });

        if self.closed() {
            data_producer.transport_closed();
        }

        Ok(data_producer)
    }

    /// Instructs the router to send data messages to the endpoint via SCTP protocol (AKA
    /// DataChannel in WebRTC) or directly to the Rust process if the transport is a
    /// `DirectTransport`.
    pub async fn consume_data(
        &self,
        data_consumer_options: DataConsumerOptions,
    ) -> Result<DataConsumer, ConsumeDataError> {
        debug!("consume_data()");

        if self.closed() {
            return Err(ConsumeDataError::TransportClosed);
        }

        let DataConsumerOptions {
            data_producer_id,
            ordered,
            max_packet_life_time,
            max_retransmits,
            paused,
            app_data,
        } = data_consumer_options;

        let router = self
            .inner
            .router
            .upgrade()
            .ok_or(ConsumeDataError::RouterGone)?;

        let data_producer = router
            .get_data_producer(&data_producer_id)
            .ok_or(ConsumeDataError::DataProducerNotFound(data_producer_id))?;

        let (r#type, sctp_stream_parameters) = if self.inner.kind.is_direct() {
            if ordered.is_some() || max_packet_life_time.is_some() || max_retransmits.is_some() {
                warn!("SCTP options are ignored when consuming data on a DirectTransport");
            }

            (DataConsumerType::Direct, None)
        } else {
            let num_sctp_streams = self
                .inner
                .num_sctp_streams
                .ok_or(ConsumeDataError::SctpNotEnabled)?;

            let mut sctp_stream_parameters = data_producer
                .sctp_stream_parameters()
                .unwrap_or_else(|| SctpStreamParameters::new_ordered(0));

            if let Some(ordered) = ordered {
                sctp_stream_parameters.ordered = ordered;
            }
            if max_packet_life_time.is_some() || max_retransmits.is_some() {
                sctp_stream_parameters.max_packet_life_time = max_packet_life_time;
                sctp_stream_parameters.max_retransmits = max_retransmits;
            }

            ortc::validate_sctp_stream_parameters(&sctp_stream_parameters)
                .map_err(ConsumeDataError::IncorrectSctpStreamParameters)?;

            let stream_id = self
                .inner
                .sctp_stream_ids
                .lock()
                .allocate(num_sctp_streams)
                .ok_or(ConsumeDataError::NoSctpStreamId)?;

            (
                DataConsumerType::Sctp,
                Some(sctp_stream_parameters.with_stream_id(stream_id)),
            )
        };

        let data_consumer_id = DataConsumerId::new();

        let response = match self
            .inner
            .channel
            .request(
                self.id(),
                TransportConsumeDataRequest {
                    data_consumer_id,
                    data_producer_id: data_producer.id(),
                    r#type,
                    sctp_stream_parameters,
                    label: data_producer.label().clone(),
                    protocol: data_producer.protocol().clone(),
                    paused,
                },
            )
            .await
        {
            Ok(response) => response,
            Err(error) => {
                if let Some(sctp_stream_parameters) = sctp_stream_parameters {
                    self.inner
                        .sctp_stream_ids
                        .lock()
                        .release(sctp_stream_parameters.stream_id);
                }
                return Err(ConsumeDataError::Request(error));
            }
        };

        let data_consumer = DataConsumer::new(
            data_consumer_id,
            response.r#type,
            response.sctp_stream_parameters,
            response.label,
            response.protocol,
            response.paused,
            &data_producer,
            response.data_producer_paused,
            self.id(),
            self.inner.channel.clone(),
            self.inner.payload_channel.clone(),
            app_data,
        );

        self.inner
            .data_consumers
            .lock()
            .insert(data_consumer.id(), data_consumer.clone());

        data_consumer
            .on_close({
                let inner_weak = Arc::downgrade(&self.inner);

                move || {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.data_consumers.lock().remove(&data_consumer_id);
                        if let Some(sctp_stream_parameters) = sctp_stream_parameters {
                            inner
                                .sctp_stream_ids
                                .lock()
                                .release(sctp_stream_parameters.stream_id);
                        }
                    }
                }
            })
            .detach();

        self.inner.handlers.new_data_consumer.call(|callback| {
            callback(&data_consumer);
        });

        if self.closed() {
            data_consumer.transport_closed();
        }

        Ok(data_consumer)
    }

    /// Set maximum incoming bitrate for media streams sent by the remote endpoint over this
    /// transport.
    pub async fn set_max_incoming_bitrate(&self, bitrate: u32) -> Result<(), SetBitrateError> {
        debug!("set_max_incoming_bitrate() [bitrate:{}]", bitrate);

        if !self.inner.kind.supports_bitrate_control() {
            return Err(SetBitrateError::NotImplemented("set_max_incoming_bitrate"));
        }

        if self.closed() {
            return Ok(());
        }

        self.inner
            .channel
            .request(self.id(), TransportSetMaxIncomingBitrateRequest { bitrate })
            .await?;

        Ok(())
    }

    /// Set maximum outgoing bitrate for media streams sent by the router to the remote endpoint
    /// over this transport.
    pub async fn set_max_outgoing_bitrate(&self, bitrate: u32) -> Result<(), SetBitrateError> {
        debug!("set_max_outgoing_bitrate() [bitrate:{}]", bitrate);

        if !self.inner.kind.supports_bitrate_control() {
            return Err(SetBitrateError::NotImplemented("set_max_outgoing_bitrate"));
        }

        if self.closed() {
            return Ok(());
        }

        self.inner
            .channel
            .request(self.id(), TransportSetMaxOutgoingBitrateRequest { bitrate })
            .await?;

        Ok(())
    }

    /// Set minimum outgoing bitrate for media streams sent by the router to the remote endpoint
    /// over this transport.
    pub async fn set_min_outgoing_bitrate(&self, bitrate: u32) -> Result<(), SetBitrateError> {
        debug!("set_min_outgoing_bitrate() [bitrate:{}]", bitrate);

        if !self.inner.kind.supports_bitrate_control() {
            return Err(SetBitrateError::NotImplemented("set_min_outgoing_bitrate"));
        }

        if self.closed() {
            return Ok(());
        }

        self.inner
            .channel
            .request(self.id(), TransportSetMinOutgoingBitrateRequest { bitrate })
            .await?;

        Ok(())
    }

    /// Instructs the transport to emit "trace" events. For monitoring purposes. Use with caution.
    pub async fn enable_trace_event(
        &self,
        types: Vec<TransportTraceEventType>,
    ) -> Result<(), RequestError> {
        debug!("enable_trace_event()");

        if self.closed() {
            return Ok(());
        }

        self.inner
            .channel
            .request(self.id(), TransportEnableTraceEventRequest { types })
            .await
    }

    /// Closes the transport together with all producers, consumers, data producers and data
    /// consumers created on it.
    ///
    /// Does nothing if the transport is already closed.
    pub async fn close(&self) {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("close()");

        if let Err(error) = inner
            .channel
            .request(
                inner.router_id,
                RouterCloseTransportRequest {
                    transport_id: inner.id,
                },
            )
            .await
        {
            error!("transport closing failed: {}", error);
        }

        inner.close_children();
        inner.handlers.close.call_simple();
    }

    /// Router this transport belongs to was closed.
    pub(crate) fn router_closed(&self) {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("router_closed()");

        inner.close_children();
        inner.handlers.router_close.call_simple();
        inner.handlers.close.call_simple();
    }

    /// WebRTC server this transport was created on was closed.
    pub(crate) fn webrtc_server_closed(&self) {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("webrtc_server_closed()");

        inner.close_children();
        inner.handlers.webrtc_server_close.call_simple();
        inner.handlers.close.call_simple();
    }

    /// Callback is called when a new producer is created.
    pub fn on_new_producer<F: Fn(&Producer) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.new_producer.add(Arc::new(callback))
    }

    /// Callback is called when a new consumer is created.
    pub fn on_new_consumer<F: Fn(&Consumer) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.new_consumer.add(Arc::new(callback))
    }

    /// Callback is called when a new data producer is created.
    pub fn on_new_data_producer<F: Fn(&DataProducer) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.new_data_producer.add(Arc::new(callback))
    }

    /// Callback is called when a new data consumer is created.
    pub fn on_new_data_consumer<F: Fn(&DataConsumer) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.new_data_consumer.add(Arc::new(callback))
    }

    pub(crate) fn on_producer_close<F: Fn(ProducerId) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.producer_close.add(Arc::new(callback))
    }

    pub(crate) fn on_data_producer_close<F: Fn(DataProducerId) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner
            .handlers
            .data_producer_close
            .add(Arc::new(callback))
    }

    /// See [`Transport::enable_trace_event`] method.
    pub fn on_trace<F: Fn(&TransportTraceEventData) + Send + Sync + 'static>(
        &self,
        callback: F,
    ) -> HandlerId {
        self.inner.handlers.trace.add(Arc::new(callback))
    }

    /// Callback is called when the router this transport belongs to is closed for whatever reason.
    /// The transport itself is also closed.
    pub fn on_router_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.router_close.add(Box::new(callback))
    }

    /// Callback is called when the WebRTC server this transport was created on is closed. The
    /// transport itself is also closed.
    pub fn on_webrtc_server_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner
            .handlers
            .webrtc_server_close
            .add(Box::new(callback))
    }

    /// Fires once whatever caused the close, immediately if already closed.
    pub fn on_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        let handler_id = self.inner.handlers.close.add(Box::new(callback));
        if self.inner.closed.load(Ordering::Relaxed) {
            self.inner.handlers.close.call_simple();
        }
        handler_id
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakTransport {
        WeakTransport {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning handle to a [`Transport`].
#[derive(Clone)]
pub struct WeakTransport {
    inner: Weak<Inner>,
}

impl fmt::Debug for WeakTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakTransport").finish()
    }
}

impl WeakTransport {
    #[must_use]
    pub fn upgrade(&self) -> Option<Transport> {
        let inner = self.inner.upgrade()?;

        Some(Transport { inner })
    }
}
