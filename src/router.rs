//! A router enables injection, selection and forwarding of media streams through [`Transport`]
//! instances created on it.
//!
//! Developers may think of a mediasoup router as if it were a "multi-party conference room",
//! although mediasoup is much more low level than that and doesn't constrain itself to specific
//! high level use cases (for instance, a "multi-party conference room" could involve various
//! mediasoup routers, even in different physicals hosts).

pub mod active_speaker_observer;
pub mod audio_level_observer;
pub mod consumer;
pub mod data_consumer;
pub mod data_producer;
pub mod direct_transport;
pub mod pipe_transport;
pub mod plain_transport;
pub mod producer;
pub mod rtp_observer;
pub mod transport;
pub mod webrtc_transport;


use crate::consumer::{Consumer, ConsumerId, ConsumerOptions};
use crate::data_consumer::{DataConsumer, DataConsumerId, DataConsumerOptions};
use crate::data_producer::{DataProducer, DataProducerId, DataProducerOptions, WeakDataProducer};
use crate::data_structures::{AppData, ListenIp};
use crate::messages::{
    RouterCreateActiveSpeakerObserverRequest, RouterCreateAudioLevelObserverRequest,
    RouterCreateDirectTransportRequest, RouterCreatePipeTransportRequest,
    RouterCreatePlainTransportRequest, RouterCreateWebRtcTransportRequest,
    RouterCreateWebRtcTransportWithServerRequest, RouterDumpRequest, WorkerCloseRouterRequest,
};
use crate::ortc;
use crate::producer::{Producer, ProducerId, ProducerOptions, WeakProducer};
use crate::rtp_observer::RtpObserverId;
use crate::rtp_parameters::{RtpCapabilities, RtpCodecCapability};
use crate::sctp_parameters::NumSctpStreams;
use crate::transport::{
    ConsumeDataError, ConsumeError, ProduceDataError, ProduceError, Transport, TransportId,
    TransportKind,
};
use crate::uuid_based_wrapper_type;
use crate::worker::{Channel, PayloadChannel, RequestError};
use active_speaker_observer::{ActiveSpeakerObserver, ActiveSpeakerObserverOptions};
use async_executor::Executor;
use async_lock::Mutex as AsyncMutex;
use audio_level_observer::{AudioLevelObserver, AudioLevelObserverOptions};
use direct_transport::{DirectTransport, DirectTransportOptions};
use event_listener_primitives::{Bag, BagOnce, HandlerId};
use hash_hasher::{HashedMap, HashedSet};
use log::{debug, error, warn};
use parking_lot::Mutex;
use pipe_transport::{PipeTransport, PipeTransportOptions, PipeTransportRemoteParameters};
use plain_transport::{PlainTransport, PlainTransportOptions};
use rtp_observer::RtpObserverCommon;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::Deref;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use webrtc_transport::{WebRtcTransport, WebRtcTransportListen, WebRtcTransportOptions};

uuid_based_wrapper_type!(
    /// [`Router`] identifier.
    RouterId
);

/// [`Router`] options.
///
/// # Notes on usage
/// * Feature codecs such as RTX MUST NOT be placed into the mediaCodecs list.
/// * If `preferred_payload_type` is given in a [`RtpCodecCapability`] (although it's unnecessary)
///   it's extremely recommended to use a value in the 96-127 range.
#[derive(Debug)]
#[non_exhaustive]
pub struct RouterOptions {
    /// Router media codecs.
    pub media_codecs: Vec<RtpCodecCapability>,
    pub app_data: AppData,
}

impl RouterOptions {
    /// Create router options with given list of declared media codecs.
    #[must_use]
    pub fn new(media_codecs: Vec<RtpCodecCapability>) -> Self {
        Self {
            media_codecs,
            app_data: AppData::default(),
        }
    }
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self::new(vec![])
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[doc(hidden)]
#[non_exhaustive]
pub struct RouterDump {
    pub id: RouterId,
    #[serde(default)]
    pub map_consumer_id_producer_id: HashedMap<ConsumerId, ProducerId>,
    #[serde(default)]
    pub map_data_consumer_id_data_producer_id: HashedMap<DataConsumerId, DataProducerId>,
    #[serde(default)]
    pub map_data_producer_id_data_consumer_ids:
        HashedMap<DataProducerId, HashedSet<DataConsumerId>>,
    #[serde(default)]
    pub map_producer_id_consumer_ids: HashedMap<ProducerId, HashedSet<ConsumerId>>,
    #[serde(default)]
    pub map_producer_id_observer_ids: HashedMap<ProducerId, HashedSet<RtpObserverId>>,
    #[serde(default)]
    pub rtp_observer_ids: HashedSet<RtpObserverId>,
    #[serde(default)]
    pub transport_ids: HashedSet<TransportId>,
}

/// Options used for piping a producer or data producer into another router.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PipeToRouterOptions {
    /// Target Router instance.
    pub router: Router,
    /// IP used in the PipeTransport pair.
    ///
    /// Default `127.0.0.1`.
    pub listen_ip: ListenIp,
    /// Create a SCTP association.
    ///
    /// Default `true`.
    pub enable_sctp: bool,
    /// SCTP streams number.
    pub num_sctp_streams: NumSctpStreams,
    /// Enable RTX and NACK for RTP retransmission.
    ///
    /// Default `false`.
    pub enable_rtx: bool,
    /// Enable SRTP.
    ///
    /// Default `false`.
    pub enable_srtp: bool,
}

impl PipeToRouterOptions {
    /// Options for piping into given router.
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self {
            router,
            listen_ip: ListenIp {
                ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                announced_ip: None,
            },
            enable_sctp: true,
            num_sctp_streams: NumSctpStreams::default(),
            enable_rtx: false,
            enable_srtp: false,
        }
    }
}

/// Container for pipe consumer and pipe producer pair created when
/// [`Router::pipe_producer_to_router`] is called.
#[derive(Debug)]
pub struct PipeProducerToRouterPair {
    /// The consumer created in the current router.
    pub pipe_consumer: Consumer,
    /// The producer created in the target router, it has the same id as the original producer.
    pub pipe_producer: Producer,
}

/// Container for pipe data consumer and pipe data producer pair created when
/// [`Router::pipe_data_producer_to_router`] is called.
#[derive(Debug)]
pub struct PipeDataProducerToRouterPair {
    /// The data consumer created in the current router.
    pub pipe_data_consumer: DataConsumer,
    /// The data producer created in the target router, it has the same id as the original data
    /// producer.
    pub pipe_data_producer: DataProducer,
}

/// Error that caused creation of pipe transport pair between two routers to fail.
#[derive(Debug, Error)]
pub enum PipeTransportPairError {
    /// Failed to create pipe transport.
    #[error("Failed to create pipe transport: {0}")]
    FailedToCreate(RequestError),
    /// Failed to connect pipe transport.
    #[error("Failed to connect pipe transport: {0}")]
    FailedToConnect(RequestError),
}

/// Error that caused [`Router::pipe_producer_to_router()`] to fail.
#[derive(Debug, Error)]
pub enum PipeProducerToRouterError {
    /// Destination router must be different.
    #[error("Destination router must be different")]
    SameRouter,
    /// Producer with specified id not found.
    #[error("Producer with id \"{0}\" not found")]
    ProducerNotFound(ProducerId),
    /// Failed to create or connect pipe transport pair.
    #[error("Failed to create or connect pipe transport pair: {0}")]
    TransportFailed(#[from] PipeTransportPairError),
    /// Failed to consume.
    #[error("Failed to consume: {0}")]
    ConsumeFailed(#[from] ConsumeError),
    /// Failed to produce.
    #[error("Failed to produce: {0}")]
    ProduceFailed(#[from] ProduceError),
    /// Producer was closed while pipe pair was being created.
    #[error("Producer closed in the meantime")]
    ProducerClosed,
}

/// Error that caused [`Router::pipe_data_producer_to_router()`] to fail.
#[derive(Debug, Error)]
pub enum PipeDataProducerToRouterError {
    /// Destination router must be different.
    #[error("Destination router must be different")]
    SameRouter,
    /// Data producer with specified id not found.
    #[error("Data producer with id \"{0}\" not found")]
    DataProducerNotFound(DataProducerId),
    /// Failed to create or connect pipe transport pair.
    #[error("Failed to create or connect pipe transport pair: {0}")]
    TransportFailed(#[from] PipeTransportPairError),
    /// Failed to consume.
    #[error("Failed to consume: {0}")]
    ConsumeFailed(#[from] ConsumeDataError),
    /// Pipe data consumer has no SCTP stream parameters to produce with.
    #[error("Pipe data consumer has no SCTP stream parameters")]
    NoSctpStreamParameters,
    /// Failed to produce.
    #[error("Failed to produce: {0}")]
    ProduceFailed(#[from] ProduceDataError),
    /// Data producer was closed while pipe pair was being created.
    #[error("Data producer closed in the meantime")]
    DataProducerClosed,
}

/// New transport that was just created.
#[derive(Debug)]
pub enum NewTransport<'a> {
    /// Direct transport
    Direct(&'a DirectTransport),
    /// Pipe transport
    Pipe(&'a PipeTransport),
    /// Plain transport
    Plain(&'a PlainTransport),
    /// WebRtc transport
    WebRtc(&'a WebRtcTransport),
}

impl<'a> Deref for NewTransport<'a> {
    type Target = Transport;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Direct(transport) => transport,
            Self::Pipe(transport) => transport,
            Self::Plain(transport) => transport,
            Self::WebRtc(transport) => transport,
        }
    }
}

/// New RTP observer that was just created.
#[derive(Debug)]
pub enum NewRtpObserver<'a> {
    /// Audio level observer
    AudioLevel(&'a AudioLevelObserver),
    /// Active speaker observer
    ActiveSpeaker(&'a ActiveSpeakerObserver),
}

/// Pipe transports connecting this router with one other router.
#[derive(Debug, Clone)]
struct PipeTransportPair {
    local: PipeTransport,
    remote: PipeTransport,
}

/// Pipe transports of a router pair keyed by the router each one lives on, empty until created.
type PipeTransportPairSlot = Arc<AsyncMutex<HashedMap<RouterId, PipeTransport>>>;

#[derive(Default)]
#[allow(clippy::type_complexity)]
struct Handlers {
    new_transport: Bag<Arc<dyn Fn(NewTransport<'_>) + Send + Sync>>,
    new_rtp_observer: Bag<Arc<dyn Fn(NewRtpObserver<'_>) + Send + Sync>>,
    worker_close: BagOnce<Box<dyn FnOnce() + Send>>,
    close: BagOnce<Box<dyn FnOnce() + Send>>,
}

struct Inner {
    id: RouterId,
    executor: Arc<Executor<'static>>,
    rtp_capabilities: RtpCapabilities,
    channel: Channel,
    payload_channel: PayloadChannel,
    transports: Mutex<HashedMap<TransportId, Transport>>,
    rtp_observers: Mutex<HashedMap<RtpObserverId, Arc<RtpObserverCommon>>>,
    producers: Arc<Mutex<HashedMap<ProducerId, WeakProducer>>>,
    data_producers: Arc<Mutex<HashedMap<DataProducerId, WeakDataProducer>>>,
    mapped_pipe_transports: Arc<Mutex<HashedMap<RouterId, PipeTransportPairSlot>>>,
    handlers: Handlers,
    app_data: AppData,
    closed: AtomicBool,
}

impl Inner {
    fn close_children(&self) {
        let transports = mem::take(&mut *self.transports.lock());
        for transport in transports.into_values() {
            transport.router_closed();
        }

        let rtp_observers = mem::take(&mut *self.rtp_observers.lock());
        for rtp_observer in rtp_observers.into_values() {
            rtp_observer.router_closed();
        }

        self.producers.lock().clear();
        self.data_producers.lock().clear();
        self.mapped_pipe_transports.lock().clear();
    }
}

/// A router enables injection, selection and forwarding of media streams through [`Transport`]
/// instances created on it.
///
/// Developers may think of a mediasoup router as if it were a "multi-party conference room",
/// although mediasoup is much more low level than that and doesn't constrain itself to specific
/// high level use cases (for instance, a "multi-party conference room" could involve various
/// mediasoup routers, even in different physicals hosts).
#[derive(Clone)]
pub struct Router {
    inner: Arc<Inner>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.inner.id)
            .field("rtp_capabilities", &self.inner.rtp_capabilities)
            .field("closed", &self.inner.closed)
            .finish()
    }
}

impl Router {
    pub(crate) fn new(
        id: RouterId,
        executor: Arc<Executor<'static>>,
        rtp_capabilities: RtpCapabilities,
        channel: Channel,
        payload_channel: PayloadChannel,
        app_data: AppData,
    ) -> Self {
        debug!("new()");

        let inner = Arc::new(Inner {
            id,
            executor,
            rtp_capabilities,
            channel,
            payload_channel,
            transports: Mutex::default(),
            rtp_observers: Mutex::default(),
            producers: Arc::default(),
            data_producers: Arc::default(),
            mapped_pipe_transports: Arc::default(),
            handlers: Handlers::default(),
            app_data,
            closed: AtomicBool::new(false),
        });

        Self { inner }
    }

    /// Router id.
    #[must_use]
    pub fn id(&self) -> RouterId {
        self.inner.id
    }

    #[must_use]
    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    /// Whether router is closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// RTP capabilities of the router. These capabilities are typically needed by mediasoup
    /// clients to compute their sending RTP parameters.
    #[must_use]
    pub fn rtp_capabilities(&self) -> &RtpCapabilities {
        &self.inner.rtp_capabilities
    }

    /// Transports currently open on this router.
    #[must_use]
    pub fn transports(&self) -> Vec<Transport> {
        self.inner.transports.lock().values().cloned().collect()
    }

    /// Producer with given id created on any transport of this router, if still open.
    #[must_use]
    pub fn get_producer(&self, producer_id: &ProducerId) -> Option<Producer> {
        self.inner
            .producers
            .lock()
            .get(producer_id)
            .and_then(WeakProducer::upgrade)
    }

    /// Data producer with given id created on any transport of this router, if still open.
    #[must_use]
    pub fn get_data_producer(&self, data_producer_id: &DataProducerId) -> Option<DataProducer> {
        self.inner
            .data_producers
            .lock()
            .get(data_producer_id)
            .and_then(WeakDataProducer::upgrade)
    }

    #[doc(hidden)]
    pub async fn dump(&self) -> Result<RouterDump, RequestError> {
        debug!("dump()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        self.inner
            .channel
            .request(self.inner.id, RouterDumpRequest {})
            .await
    }

    /// Create a [`WebRtcTransport`].
    ///
    /// Router will be kept alive as long as at least one transport instance is alive.
    pub async fn create_webrtc_transport(
        &self,
        webrtc_transport_options: WebRtcTransportOptions,
    ) -> Result<WebRtcTransport, RequestError> {
        debug!("create_webrtc_transport()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        let WebRtcTransportOptions {
            listen,
            enable_udp,
            enable_tcp,
            prefer_udp,
            prefer_tcp,
            initial_available_outgoing_bitrate,
            enable_sctp,
            num_sctp_streams,
            max_sctp_message_size,
            sctp_send_buffer_size,
            app_data,
        } = webrtc_transport_options;

        let transport_id = TransportId::new();

        let (data, webrtc_server) = match listen {
            WebRtcTransportListen::Individual { listen_ips, port } => {
                let data = self
                    .inner
                    .channel
                    .request(
                        self.inner.id,
                        RouterCreateWebRtcTransportRequest {
                            transport_id,
                            listen_ips: listen_ips.to_vec(),
                            port,
                            enable_udp,
                            enable_tcp,
                            prefer_udp,
                            prefer_tcp,
                            initial_available_outgoing_bitrate,
                            enable_sctp,
                            num_sctp_streams,
                            max_sctp_message_size,
                            sctp_send_buffer_size,
                            is_data_channel: true,
                        },
                    )
                    .await?;

                (data, None)
            }
            WebRtcTransportListen::Server { webrtc_server } => {
                let data = self
                    .inner
                    .channel
                    .request(
                        self.inner.id,
                        RouterCreateWebRtcTransportWithServerRequest {
                            transport_id,
                            web_rtc_server_id: webrtc_server.id(),
                            enable_udp,
                            enable_tcp,
                            prefer_udp,
                            prefer_tcp,
                            initial_available_outgoing_bitrate,
                            enable_sctp,
                            num_sctp_streams,
                            max_sctp_message_size,
                            sctp_send_buffer_size,
                            is_data_channel: true,
                        },
                    )
                    .await?;

                (data, Some(webrtc_server))
            }
        };

        let transport = self.new_transport_core(
            transport_id,
            TransportKind::WebRtc,
            data.sctp_parameters.map(|sctp_parameters| sctp_parameters.mis),
            false,
            app_data,
        );
        let webrtc_transport = WebRtcTransport::new(transport, data, webrtc_server.as_ref());

        if let Some(webrtc_server) = &webrtc_server {
            webrtc_server.handle_new_webrtc_transport(&webrtc_transport);
        }

        self.register_transport(&webrtc_transport);
        self.inner.handlers.new_transport.call(|callback| {
            callback(NewTransport::WebRtc(&webrtc_transport));
        });

        Ok(webrtc_transport)
    }

    /// Create a [`PlainTransport`].
    ///
    /// Router will be kept alive as long as at least one transport instance is alive.
    pub async fn create_plain_transport(
        &self,
        plain_transport_options: PlainTransportOptions,
    ) -> Result<PlainTransport, RequestError> {
        debug!("create_plain_transport()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        let PlainTransportOptions {
            listen_ip,
            port,
            rtcp_mux,
            comedia,
            enable_sctp,
            num_sctp_streams,
            max_sctp_message_size,
            sctp_send_buffer_size,
            enable_srtp,
            srtp_crypto_suite,
            app_data,
        } = plain_transport_options;

        let transport_id = TransportId::new();

        let data = self
            .inner
            .channel
            .request(
                self.inner.id,
                RouterCreatePlainTransportRequest {
                    transport_id,
                    listen_ip,
                    port,
                    rtcp_mux,
                    comedia,
                    enable_sctp,
                    num_sctp_streams,
                    max_sctp_message_size,
                    sctp_send_buffer_size,
                    is_data_channel: false,
                    enable_srtp,
                    srtp_crypto_suite,
                },
            )
            .await?;

        let transport = self.new_transport_core(
            transport_id,
            TransportKind::Plain,
            data.sctp_parameters.map(|sctp_parameters| sctp_parameters.mis),
            false,
            app_data,
        );
        let plain_transport = PlainTransport::new(transport, data);

        self.register_transport(&plain_transport);
        self.inner.handlers.new_transport.call(|callback| {
            callback(NewTransport::Plain(&plain_transport));
        });

        Ok(plain_transport)
    }

    /// Create a [`PipeTransport`].
    ///
    /// Router will be kept alive as long as at least one transport instance is alive.
    pub async fn create_pipe_transport(
        &self,
        pipe_transport_options: PipeTransportOptions,
    ) -> Result<PipeTransport, RequestError> {
        debug!("create_pipe_transport()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        let PipeTransportOptions {
            listen_ip,
            port,
            enable_sctp,
            num_sctp_streams,
            max_sctp_message_size,
            sctp_send_buffer_size,
            enable_rtx,
            enable_srtp,
            app_data,
        } = pipe_transport_options;

        let transport_id = TransportId::new();

        let data = self
            .inner
            .channel
            .request(
                self.inner.id,
                RouterCreatePipeTransportRequest {
                    transport_id,
                    listen_ip,
                    port,
                    enable_sctp,
                    num_sctp_streams,
                    max_sctp_message_size,
                    sctp_send_buffer_size,
                    is_data_channel: false,
                    enable_rtx,
                    enable_srtp,
                },
            )
            .await?;

        let transport = self.new_transport_core(
            transport_id,
            TransportKind::Pipe,
            data.sctp_parameters.map(|sctp_parameters| sctp_parameters.mis),
            data.rtx,
            app_data,
        );
        let pipe_transport = PipeTransport::new(transport, data);

        self.register_transport(&pipe_transport);
        self.inner.handlers.new_transport.call(|callback| {
            callback(NewTransport::Pipe(&pipe_transport));
        });

        Ok(pipe_transport)
    }

    /// Create a [`DirectTransport`].
    ///
    /// Router will be kept alive as long as at least one transport instance is alive.
    pub async fn create_direct_transport(
        &self,
        direct_transport_options: DirectTransportOptions,
    ) -> Result<DirectTransport, RequestError> {
        debug!("create_direct_transport()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        let DirectTransportOptions {
            max_message_size,
            app_data,
        } = direct_transport_options;

        let transport_id = TransportId::new();

        self.inner
            .channel
            .request(
                self.inner.id,
                RouterCreateDirectTransportRequest {
                    transport_id,
                    direct: true,
                    max_message_size,
                },
            )
            .await?;

        let transport =
            self.new_transport_core(transport_id, TransportKind::Direct, None, false, app_data);
        let direct_transport = DirectTransport::new(transport);

        self.register_transport(&direct_transport);
        self.inner.handlers.new_transport.call(|callback| {
            callback(NewTransport::Direct(&direct_transport));
        });

        Ok(direct_transport)
    }

    /// Create an [`ActiveSpeakerObserver`].
    pub async fn create_active_speaker_observer(
        &self,
        active_speaker_observer_options: ActiveSpeakerObserverOptions,
    ) -> Result<ActiveSpeakerObserver, RequestError> {
        debug!("create_active_speaker_observer()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        let ActiveSpeakerObserverOptions { interval, app_data } = active_speaker_observer_options;

        let rtp_observer_id = RtpObserverId::new();

        self.inner
            .channel
            .request(
                self.inner.id,
                RouterCreateActiveSpeakerObserverRequest {
                    rtp_observer_id,
                    interval,
                },
            )
            .await?;

        let active_speaker_observer =
            ActiveSpeakerObserver::new(self.new_rtp_observer_common(rtp_observer_id, app_data));

        self.register_rtp_observer(active_speaker_observer.common());
        self.inner.handlers.new_rtp_observer.call(|callback| {
            callback(NewRtpObserver::ActiveSpeaker(&active_speaker_observer));
        });

        Ok(active_speaker_observer)
    }

    /// Create an [`AudioLevelObserver`].
    pub async fn create_audio_level_observer(
        &self,
        audio_level_observer_options: AudioLevelObserverOptions,
    ) -> Result<AudioLevelObserver, RequestError> {
        debug!("create_audio_level_observer()");

        if self.closed() {
            return Err(RequestError::EntityClosed);
        }

        let AudioLevelObserverOptions {
            max_entries,
            threshold,
            interval,
            app_data,
        } = audio_level_observer_options;

        let rtp_observer_id = RtpObserverId::new();

        self.inner
            .channel
            .request(
                self.inner.id,
                RouterCreateAudioLevelObserverRequest {
                    rtp_observer_id,
                    max_entries: max_entries.get(),
                    threshold,
                    interval,
                },
            )
            .await?;

        let audio_level_observer =
            AudioLevelObserver::new(self.new_rtp_observer_common(rtp_observer_id, app_data));

        self.register_rtp_observer(audio_level_observer.common());
        self.inner.handlers.new_rtp_observer.call(|callback| {
            callback(NewRtpObserver::AudioLevel(&audio_level_observer));
        });

        Ok(audio_level_observer)
    }

    /// Pipes [`Producer`] with the given `producer_id` into another [`Router`] on same host.
    ///
    /// Pipe transports connecting both routers are created on first use and reused afterwards.
    pub async fn pipe_producer_to_router(
        &self,
        producer_id: ProducerId,
        pipe_to_router_options: PipeToRouterOptions,
    ) -> Result<PipeProducerToRouterPair, PipeProducerToRouterError> {
        debug!("pipe_producer_to_router()");

        if pipe_to_router_options.router.id() == self.id() {
            return Err(PipeProducerToRouterError::SameRouter);
        }

        let producer = self
            .get_producer(&producer_id)
            .ok_or(PipeProducerToRouterError::ProducerNotFound(producer_id))?;

        let pipe_transport_pair = self
            .get_or_create_pipe_transport_pair(&pipe_to_router_options)
            .await?;

        let pipe_consumer = pipe_transport_pair
            .local
            .consume(ConsumerOptions::new(
                producer_id,
                self.inner.rtp_capabilities.clone(),
            ))
            .await?;

        let pipe_producer = {
            let mut producer_options = ProducerOptions::new_pipe_transport(
                producer_id,
                pipe_consumer.kind(),
                pipe_consumer.rtp_parameters().clone(),
            );
            producer_options.paused = pipe_consumer.producer_paused();
            producer_options.app_data = producer.app_data().clone();

            match pipe_transport_pair.remote.produce(producer_options).await {
                Ok(pipe_producer) => pipe_producer,
                Err(error) => {
                    error!(
                        "pipe_producer_to_router() | error creating pipe producer: {}",
                        error
                    );
                    pipe_consumer.close().await;
                    return Err(error.into());
                }
            }
        };

        if producer.closed() {
            pipe_consumer.close().await;
            pipe_producer.close().await;
            return Err(PipeProducerToRouterError::ProducerClosed);
        }

        // Source might have been paused or resumed while pipe producer was being created
        if pipe_producer.paused() != producer.paused() {
            let result = if producer.paused() {
                pipe_producer.pause().await
            } else {
                pipe_producer.resume().await
            };
            if let Err(error) = result {
                warn!("failed to sync pipe producer paused state: {}", error);
            }
        }

        self.mirror_pipe_consumer_to_pipe_producer(&pipe_consumer, &pipe_producer);

        Ok(PipeProducerToRouterPair {
            pipe_consumer,
            pipe_producer,
        })
    }

    /// Pipes [`DataProducer`] with the given `data_producer_id` into another [`Router`] on same
    /// host.
    ///
    /// Pipe transports connecting both routers are created on first use and reused afterwards.
    pub async fn pipe_data_producer_to_router(
        &self,
        data_producer_id: DataProducerId,
        pipe_to_router_options: PipeToRouterOptions,
    ) -> Result<PipeDataProducerToRouterPair, PipeDataProducerToRouterError> {
        debug!("pipe_data_producer_to_router()");

        if pipe_to_router_options.router.id() == self.id() {
            return Err(PipeDataProducerToRouterError::SameRouter);
        }

        let data_producer = self.get_data_producer(&data_producer_id).ok_or(
            PipeDataProducerToRouterError::DataProducerNotFound(data_producer_id),
        )?;

        let pipe_transport_pair = self
            .get_or_create_pipe_transport_pair(&pipe_to_router_options)
            .await?;

        let pipe_data_consumer = pipe_transport_pair
            .local
            .consume_data(DataConsumerOptions::new_sctp(data_producer_id))
            .await?;

        let sctp_stream_parameters = match pipe_data_consumer.sctp_stream_parameters() {
            Some(sctp_stream_parameters) => sctp_stream_parameters,
            None => {
                pipe_data_consumer.close().await;
                return Err(PipeDataProducerToRouterError::NoSctpStreamParameters);
            }
        };

        let pipe_data_producer = {
            let mut data_producer_options =
                DataProducerOptions::new_pipe_transport(data_producer_id, sctp_stream_parameters);
            data_producer_options.label = pipe_data_consumer.label().clone();
            data_producer_options.protocol = pipe_data_consumer.protocol().clone();
            data_producer_options.paused = pipe_data_consumer.data_producer_paused();
            data_producer_options.app_data = data_producer.app_data().clone();

            match pipe_transport_pair
                .remote
                .produce_data(data_producer_options)
                .await
            {
                Ok(pipe_data_producer) => pipe_data_producer,
                Err(error) => {
                    error!(
                        "pipe_data_producer_to_router() | error creating pipe data producer: {}",
                        error
                    );
                    pipe_data_consumer.close().await;
                    return Err(error.into());
                }
            }
        };

        if data_producer.closed() {
            pipe_data_consumer.close().await;
            pipe_data_producer.close().await;
            return Err(PipeDataProducerToRouterError::DataProducerClosed);
        }

        self.mirror_pipe_data_consumer_to_pipe_data_producer(
            &pipe_data_consumer,
            &pipe_data_producer,
        );

        Ok(PipeDataProducerToRouterPair {
            pipe_data_consumer,
            pipe_data_producer,
        })
    }

    /// Check whether the given RTP capabilities are valid to consume the given producer.
    #[must_use]
    pub fn can_consume(&self, producer_id: &ProducerId, rtp_capabilities: &RtpCapabilities) -> bool {
        match self.get_producer(producer_id) {
            Some(producer) => {
                match ortc::can_consume(producer.consumable_rtp_parameters(), rtp_capabilities) {
                    Ok(result) => result,
                    Err(error) => {
                        error!("can_consume() | unexpected error: {}", error);
                        false
                    }
                }
            }
            None => {
                error!(
                    "can_consume() | Producer with id \"{}\" not found",
                    producer_id
                );
                false
            }
        }
    }

    /// Closes the router together with every transport and RTP observer created on it.
    ///
    /// Does nothing if the router is already closed.
    pub async fn close(&self) {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("close()");

        if let Err(error) = inner
            .channel
            .request("", WorkerCloseRouterRequest { router_id: inner.id })
            .await
        {
            error!("router closing failed: {}", error);
        }

        inner.close_children();
        inner.handlers.close.call_simple();
    }

    /// Worker this router belongs to was closed, worker side router is gone already.
    pub(crate) fn worker_closed(&self) {
        let inner = &self.inner;

        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("worker_closed()");

        inner.close_children();
        inner.handlers.worker_close.call_simple();
        inner.handlers.close.call_simple();
    }

    /// Callback is called when a new transport is created.
    pub fn on_new_transport<F>(&self, callback: F) -> HandlerId
    where
        F: Fn(NewTransport<'_>) + Send + Sync + 'static,
    {
        self.inner.handlers.new_transport.add(Arc::new(callback))
    }

    /// Callback is called when a new RTP observer is created.
    pub fn on_new_rtp_observer<F>(&self, callback: F) -> HandlerId
    where
        F: Fn(NewRtpObserver<'_>) + Send + Sync + 'static,
    {
        self.inner.handlers.new_rtp_observer.add(Arc::new(callback))
    }

    /// Callback is called when the worker this router belongs to is closed for whatever reason.
    /// The router itself is also closed. A `on_router_close` callbacks are triggered in all its
    /// transports all RTP observers.
    pub fn on_worker_close<F: FnOnce() + Send + 'static>(&self, callback: F) -> HandlerId {
        self.inner.handlers.worker_close.add(Box::new(callback))
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
    pub fn downgrade(&self) -> WeakRouter {
        WeakRouter {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn new_transport_core(
        &self,
        transport_id: TransportId,
        kind: TransportKind,
        num_sctp_streams: Option<u16>,
        pipe_rtx: bool,
        app_data: AppData,
    ) -> Transport {
        Transport::new(
            transport_id,
            kind,
            self.inner.id,
            self.downgrade(),
            self.inner.channel.clone(),
            self.inner.payload_channel.clone(),
            num_sctp_streams,
            pipe_rtx,
            app_data,
        )
    }

    fn register_transport(&self, transport: &Transport) {
        let transport_id = transport.id();

        self.inner
            .transports
            .lock()
            .insert(transport_id, transport.clone());

        transport
            .on_close({
                let inner_weak = Arc::downgrade(&self.inner);

                move || {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.transports.lock().remove(&transport_id);
                    }
                }
            })
            .detach();

        transport
            .on_new_producer({
                let producers_weak = Arc::downgrade(&self.inner.producers);

                move |producer| {
                    if let Some(producers) = producers_weak.upgrade() {
                        producers.lock().insert(producer.id(), producer.downgrade());
                    }
                }
            })
            .detach();

        transport
            .on_producer_close({
                let producers_weak = Arc::downgrade(&self.inner.producers);

                move |producer_id| {
                    if let Some(producers) = producers_weak.upgrade() {
                        producers.lock().remove(&producer_id);
                    }
                }
            })
            .detach();

        transport
            .on_new_data_producer({
                let data_producers_weak = Arc::downgrade(&self.inner.data_producers);

                move |data_producer| {
                    if let Some(data_producers) = data_producers_weak.upgrade() {
                        data_producers
                            .lock()
                            .insert(data_producer.id(), data_producer.downgrade());
                    }
                }
            })
            .detach();

        transport
            .on_data_producer_close({
                let data_producers_weak = Arc::downgrade(&self.inner.data_producers);

                move |data_producer_id| {
                    if let Some(data_producers) = data_producers_weak.upgrade() {
                        data_producers.lock().remove(&data_producer_id);
                    }
                }
            })
            .detach();

        // Router might have been closed while request to worker was in flight
        if self.closed() {
            transport.router_closed();
        }
    }

    fn new_rtp_observer_common(
        &self,
        rtp_observer_id: RtpObserverId,
        app_data: AppData,
    ) -> Arc<RtpObserverCommon> {
        RtpObserverCommon::new(
            rtp_observer_id,
            self.inner.id,
            self.downgrade(),
            self.inner.channel.clone(),
            app_data,
        )
    }

    fn register_rtp_observer(&self, rtp_observer: &Arc<RtpObserverCommon>) {
        let rtp_observer_id = rtp_observer.id();

        self.inner
            .rtp_observers
            .lock()
            .insert(rtp_observer_id, Arc::clone(rtp_observer));

        rtp_observer
            .on_close({
                let inner_weak = Arc::downgrade(&self.inner);

                Box::new(move || {
                    if let Some(inner) = inner_weak.upgrade() {
                        inner.rtp_observers.lock().remove(&rtp_observer_id);
                    }
                })
            })
            .detach();

        if self.closed() {
            rtp_observer.router_closed();
        }
    }

    /// Slot shared by both routers of the pair, so piping in either direction uses the same one.
    fn pipe_transport_pair_slot(&self, remote_router: &Router) -> PipeTransportPairSlot {
        // Lock in id order, two routers piping into each other must not deadlock
        let (first, second) = if self.id() < remote_router.id() {
            (self, remote_router)
        } else {
            (remote_router, self)
        };
        let mut first_mapped = first.inner.mapped_pipe_transports.lock();
        let mut second_mapped = second.inner.mapped_pipe_transports.lock();

        let pair_slot = first_mapped
            .get(&second.id())
            .or_else(|| second_mapped.get(&first.id()))
            .cloned()
            .unwrap_or_default();

        first_mapped.insert(second.id(), Arc::clone(&pair_slot));
        second_mapped.insert(first.id(), Arc::clone(&pair_slot));

        pair_slot
    }

    async fn get_or_create_pipe_transport_pair(
        &self,
        pipe_to_router_options: &PipeToRouterOptions,
    ) -> Result<PipeTransportPair, PipeTransportPairError> {
        let PipeToRouterOptions {
            router: remote_router,
            listen_ip,
            enable_sctp,
            num_sctp_streams,
            enable_rtx,
            enable_srtp,
        } = pipe_to_router_options;

        let (pair_slot, mut pipe_transports) = loop {
            let pair_slot = self.pipe_transport_pair_slot(remote_router);
            // Held across the whole creation so that concurrent calls reuse a single pair
            let pipe_transports = pair_slot.lock_arc().await;

            if pipe_transports.is_empty() {
                break (pair_slot, pipe_transports);
            }

            if let (Some(local), Some(remote)) = (
                pipe_transports.get(&self.id()),
                pipe_transports.get(&remote_router.id()),
            ) {
                if !local.closed() && !remote.closed() {
                    return Ok(PipeTransportPair {
                        local: local.clone(),
                        remote: remote.clone(),
                    });
                }
            }

            // Pair is closing, its close handlers may not have detached the slot yet
            drop(pipe_transports);
            let pair_slot_weak = Arc::downgrade(&pair_slot);
            forget_pipe_transport_pair_slot(
                &self.inner.mapped_pipe_transports,
                remote_router.id(),
                &pair_slot_weak,
            );
            forget_pipe_transport_pair_slot(
                &remote_router.inner.mapped_pipe_transports,
                self.id(),
                &pair_slot_weak,
            );
        };

        let pipe_transport_options = {
            let mut pipe_transport_options = PipeTransportOptions::new(*listen_ip);
            pipe_transport_options.enable_sctp = *enable_sctp;
            pipe_transport_options.num_sctp_streams = *num_sctp_streams;
            pipe_transport_options.enable_rtx = *enable_rtx;
            pipe_transport_options.enable_srtp = *enable_srtp;
            pipe_transport_options
        };

        let local = self
            .create_pipe_transport(pipe_transport_options.clone())
            .await
            .map_err(PipeTransportPairError::FailedToCreate)?;

        let remote = match remote_router
            .create_pipe_transport(pipe_transport_options)
            .await
        {
            Ok(remote) => remote,
            Err(error) => {
                local.close().await;
                return Err(PipeTransportPairError::FailedToCreate(error));
            }
        };

        if let Err(error) = connect_pipe_transports(&local, &remote).await {
            local.close().await;
            remote.close().await;
            return Err(PipeTransportPairError::FailedToConnect(error));
        }

        pipe_transports.insert(self.id(), local.clone());
        pipe_transports.insert(remote_router.id(), remote.clone());

        let pipe_transport_pair = PipeTransportPair { local, remote };
        self.watch_pipe_transport_pair(remote_router, &pair_slot, &pipe_transport_pair);

        Ok(pipe_transport_pair)
    }

    /// Closing either pipe transport closes its sibling and forgets the pair on both routers.
    fn watch_pipe_transport_pair(
        &self,
        remote_router: &Router,
        pair_slot: &PipeTransportPairSlot,
        pipe_transport_pair: &PipeTransportPair,
    ) {
        let ends = [
            (&pipe_transport_pair.local, &pipe_transport_pair.remote),
            (&pipe_transport_pair.remote, &pipe_transport_pair.local),
        ];

        for (pipe_transport, sibling) in ends {
            pipe_transport
                .on_close({
                    let executor = Arc::clone(&self.inner.executor);
                    let sibling_weak = sibling.downgrade();
                    let pair_slot_weak = Arc::downgrade(pair_slot);
                    let mapped = [
                        (
                            Arc::downgrade(&self.inner.mapped_pipe_transports),
                            remote_router.id(),
                        ),
                        (
                            Arc::downgrade(&remote_router.inner.mapped_pipe_transports),
                            self.id(),
                        ),
                    ];

                    move || {
                        if let Some(sibling) = sibling_weak.upgrade() {
                            executor
                                .spawn(async move {
                                    sibling.close().await;
                                })
                                .detach();
                        }
                        for (mapped_pipe_transports_weak, other_router_id) in mapped {
                            if let Some(mapped_pipe_transports) =
                                mapped_pipe_transports_weak.upgrade()
                            {
                                forget_pipe_transport_pair_slot(
                                    &mapped_pipe_transports,
                                    other_router_id,
                                    &pair_slot_weak,
                                );
                            }
                        }
                    }
                })
                .detach();
        }
    }

    fn mirror_pipe_consumer_to_pipe_producer(
        &self,
        pipe_consumer: &Consumer,
        pipe_producer: &Producer,
    ) {
        let executor = &self.inner.executor;

        pipe_consumer
            .on_close({
                let executor = Arc::clone(executor);
                let pipe_producer_weak = pipe_producer.downgrade();

                move || {
                    if let Some(pipe_producer) = pipe_producer_weak.upgrade() {
                        executor
                            .spawn(async move {
                                pipe_producer.close().await;
                            })
                            .detach();
                    }
                }
            })
            .detach();

        pipe_consumer
            .on_pause({
                let executor = Arc::clone(executor);
                let pipe_producer_weak = pipe_producer.downgrade();

                move || {
                    if let Some(pipe_producer) = pipe_producer_weak.upgrade() {
                        executor
                            .spawn(async move {
                                if let Err(error) = pipe_producer.pause().await {
                                    error!("pipe producer pause failed: {}", error);
                                }
                            })
                            .detach();
                    }
                }
            })
            .detach();

        pipe_consumer
            .on_resume({
                let executor = Arc::clone(executor);
                let pipe_producer_weak = pipe_producer.downgrade();

                move || {
                    if let Some(pipe_producer) = pipe_producer_weak.upgrade() {
                        executor
                            .spawn(async move {
                                if let Err(error) = pipe_producer.resume().await {
                                    error!("pipe producer resume failed: {}", error);
                                }
                            })
                            .detach();
                    }
                }
            })
            .detach();

        pipe_producer
            .on_close({
                let executor = Arc::clone(executor);
                let pipe_consumer_weak = pipe_consumer.downgrade();

                move || {
                    if let Some(pipe_consumer) = pipe_consumer_weak.upgrade() {
                        executor
                            .spawn(async move {
                                pipe_consumer.close().await;
                            })
                            .detach();
                    }
                }
            })
            .detach();
    }

    fn mirror_pipe_data_consumer_to_pipe_data_producer(
        &self,
        pipe_data_consumer: &DataConsumer,
        pipe_data_producer: &DataProducer,
    ) {
        let executor = &self.inner.executor;

        pipe_data_consumer
            .on_close({
                let executor = Arc::clone(executor);
                let pipe_data_producer_weak = pipe_data_producer.downgrade();

                move || {
                    if let Some(pipe_data_producer) = pipe_data_producer_weak.upgrade() {
                        executor
                            .spawn(async move {
                                pipe_data_producer.close().await;
                            })
                            .detach();
                    }
                }
            })
            .detach();

        pipe_data_consumer
            .on_data_producer_pause({
                let executor = Arc::clone(executor);
                let pipe_data_producer_weak = pipe_data_producer.downgrade();

                move || {
                    if let Some(pipe_data_producer) = pipe_data_producer_weak.upgrade() {
                        executor
                            .spawn(async move {
                                if let Err(error) = pipe_data_producer.pause().await {
                                    error!("pipe data producer pause failed: {}", error);
                                }
                            })
                            .detach();
                    }
                }
            })
            .detach();

        pipe_data_consumer
            .on_data_producer_resume({
                let executor = Arc::clone(executor);
                let pipe_data_producer_weak = pipe_data_producer.downgrade();

                move || {
                    if let Some(pipe_data_producer) = pipe_data_producer_weak.upgrade() {
                        executor
                            .spawn(async move {
                                if let Err(error) = pipe_data_producer.resume().await {
                                    error!("pipe data producer resume failed: {}", error);
                                }
                            })
                            .detach();
                    }
                }
            })
            .detach();

        pipe_data_producer
            .on_close({
                let executor = Arc::clone(executor);
                let pipe_data_consumer_weak = pipe_data_consumer.downgrade();

                move || {
                    if let Some(pipe_data_consumer) = pipe_data_consumer_weak.upgrade() {
                        executor
                            .spawn(async move {
                                pipe_data_consumer.close().await;
                            })
                            .detach();
                    }
                }
            })
            .detach();
    }
}

fn forget_pipe_transport_pair_slot(
    mapped_pipe_transports: &Mutex<HashedMap<RouterId, PipeTransportPairSlot>>,
    other_router_id: RouterId,
    pair_slot: &Weak<AsyncMutex<HashedMap<RouterId, PipeTransport>>>,
) {
    let mut mapped_pipe_transports = mapped_pipe_transports.lock();
    // A newer pair may already own the entry
    let same_pair_slot = mapped_pipe_transports
        .get(&other_router_id)
        .map_or(false, |mapped| ptr::eq(Arc::as_ptr(mapped), pair_slot.as_ptr()));
    if same_pair_slot {
        mapped_pipe_transports.remove(&other_router_id);
    }
}

async fn connect_pipe_transports(
    local: &PipeTransport,
    remote: &PipeTransport,
) -> Result<(), RequestError> {
    local
        .connect(PipeTransportRemoteParameters {
            ip: remote.tuple().local_ip(),
            port: remote.tuple().local_port(),
            srtp_parameters: remote.srtp_parameters(),
        })
        .await?;

    remote
        .connect(PipeTransportRemoteParameters {
            ip: local.tuple().local_ip(),
            port: local.tuple().local_port(),
            srtp_parameters: local.srtp_parameters(),
        })
        .await
}

/// Non-owning handle to a [`Router`].
#[derive(Clone)]
pub struct WeakRouter {
    inner: Weak<Inner>,
}

impl fmt::Debug for WeakRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRouter").finish()
    }
}

impl WeakRouter {
    #[must_use]
    pub fn upgrade(&self) -> Option<Router> {
        let inner = self.inner.upgrade()?;

        Some(Router { inner })
    }
}
