//! Controller prelude.
//!
//! Re-exports commonly used traits and structs from this crate.
//!
//! # Examples
//!
//! Import the prelude with:
//!
//! ```
//! # #[allow(unused_imports)]
//! use mediasoup_controller::prelude::*;
//! ```
pub use crate::worker_manager::WorkerManager;

pub use crate::worker::{
    CreateRouterError, CreateWebRtcServerError, NotificationError, RequestError, WeakWorker,
    Worker, WorkerLogLevel, WorkerLogTag, WorkerSettings, WorkerUpdateSettings,
};

pub use crate::router::{
    NewRtpObserver, NewTransport, PipeDataProducerToRouterError, PipeDataProducerToRouterPair,
    PipeProducerToRouterError, PipeProducerToRouterPair, PipeToRouterOptions, Router, RouterId,
    RouterOptions, WeakRouter,
};

pub use crate::webrtc_server::{
    WebRtcServer, WebRtcServerId, WebRtcServerListenInfo, WebRtcServerListenInfos,
    WebRtcServerOptions, WeakWebRtcServer,
};

pub use crate::direct_transport::{DirectTransport, DirectTransportOptions};
pub use crate::pipe_transport::{
    PipeTransport, PipeTransportOptions, PipeTransportRemoteParameters,
};
pub use crate::plain_transport::{
    PlainTransport, PlainTransportOptions, PlainTransportRemoteParameters,
};
pub use crate::transport::{
    ConsumeDataError, ConsumeError, ProduceDataError, ProduceError, SetBitrateError, Transport,
    TransportId, TransportKind, WeakTransport,
};
pub use crate::webrtc_transport::{
    TransportListenIps, WebRtcTransport, WebRtcTransportOptions, WebRtcTransportRemoteParameters,
};

pub use crate::active_speaker_observer::{
    ActiveSpeakerObserver, ActiveSpeakerObserverDominantSpeaker, ActiveSpeakerObserverOptions,
    WeakActiveSpeakerObserver,
};
pub use crate::audio_level_observer::{
    AudioLevelObserver, AudioLevelObserverOptions, AudioLevelObserverVolume, WeakAudioLevelObserver,
};
pub use crate::rtp_observer::{RtpObserver, RtpObserverAddProducerOptions, RtpObserverId};

pub use crate::consumer::{Consumer, ConsumerId, ConsumerLayers, ConsumerOptions, WeakConsumer};
pub use crate::data_consumer::{
    DataConsumer, DataConsumerId, DataConsumerOptions, WeakDataConsumer,
};
pub use crate::data_producer::{
    DataProducer, DataProducerId, DataProducerOptions, DirectDataProducer, RegularDataProducer,
    WeakDataProducer,
};
pub use crate::producer::{
    DirectProducer, Producer, ProducerId, ProducerOptions, RegularProducer, WeakProducer,
};

pub use crate::data_structures::{
    AppData, DtlsParameters, IceCandidate, IceParameters, ListenIp, NonEmptyList, Protocol,
    WebRtcMessage,
};
pub use crate::rtp_parameters::{
    MediaKind, MimeType, MimeTypeAudio, MimeTypeVideo, RtcpFeedback, RtpCapabilities,
    RtpCodecCapability, RtpCodecParameters, RtpCodecParametersParameters, RtpEncodingParameters,
    RtpParameters,
};
pub use crate::sctp_parameters::{NumSctpStreams, SctpStreamParameters};
pub use crate::srtp_parameters::{SrtpCryptoSuite, SrtpParameters};
