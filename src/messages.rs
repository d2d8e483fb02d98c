use crate::consumer::{
    ConsumerDump, ConsumerId, ConsumerLayers, ConsumerScore, ConsumerStats, ConsumerTraceEventType,
    ConsumerType,
};
use crate::data_consumer::{DataConsumerDump, DataConsumerId, DataConsumerStat, DataConsumerType};
use crate::data_producer::{DataProducerDump, DataProducerId, DataProducerStat, DataProducerType};
use crate::data_structures::{
    DtlsParameters, DtlsRole, DtlsState, IceCandidate, IceParameters, IceRole, IceState,
    ListenIp, SctpState, TransportTuple,
};
use crate::ortc::RtpMapping;
use crate::producer::{ProducerDump, ProducerId, ProducerStat, ProducerTraceEventType, ProducerType};
use crate::router::{RouterDump, RouterId};
use crate::rtp_observer::RtpObserverId;
use crate::rtp_parameters::{MediaKind, RtpEncodingParameters, RtpParameters};
use crate::sctp_parameters::{NumSctpStreams, SctpParameters, SctpStreamParameters};
use crate::srtp_parameters::{SrtpCryptoSuite, SrtpParameters};
use crate::transport::{TransportId, TransportTraceEventType};
use crate::webrtc_server::{WebRtcServerDump, WebRtcServerId, WebRtcServerListenInfo};
use crate::worker::{WorkerDump, WorkerLogLevel, WorkerLogTag, WorkerResourceUsage};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::marker::PhantomData;
use std::net::IpAddr;

/// Request to the worker, `Response` is what `data` of the successful response deserializes into.
pub(crate) trait Request: Debug + Serialize {
    type Response: DeserializeOwned;

    fn as_method(&self) -> &'static str;
}

/// Fire-and-forget message sent over the payload channel together with binary payload.
pub(crate) trait Notification: Debug + Serialize {
    fn as_event(&self) -> &'static str;
}

macro_rules! request_response {
    (
        $method: literal,
        $request_struct_name: ident {
            $(
                $(#[$request_field_attributes: meta])*
                $request_field_name: ident: $request_field_type: ty,
            )*
        } $(,)?
    ) => {
        request_response!(
            $method,
            $request_struct_name {
                $(
                    $(#[$request_field_attributes])*
                    $request_field_name: $request_field_type,
                )*
            },
            (),
        );
    };
    (
        $method: literal,
        $request_struct_name: ident {
            $(
                $(#[$request_field_attributes: meta])*
                $request_field_name: ident: $request_field_type: ty,
            )*
        },
        $response_type: ty $(,)?
    ) => {
        #[derive(Debug, Serialize)]
        #[serde(rename_all = "camelCase")]
        pub(crate) struct $request_struct_name {
            $(
                $(#[$request_field_attributes])*
                pub(crate) $request_field_name: $request_field_type,
            )*
        }

        impl Request for $request_struct_name {
            type Response = $response_type;

            fn as_method(&self) -> &'static str {
                $method
            }
        }
    };
}

macro_rules! notification {
    (
        $event: literal,
        $notification_struct_name: ident {
            $(
                $notification_field_name: ident: $notification_field_type: ty,
            )*
        } $(,)?
    ) => {
        #[derive(Debug, Serialize)]
        #[serde(rename_all = "camelCase")]
        pub(crate) struct $notification_struct_name {
            $(
                pub(crate) $notification_field_name: $notification_field_type,
            )*
        }

        impl Notification for $notification_struct_name {
            fn as_event(&self) -> &'static str {
                $event
            }
        }
    };
}

// Worker

request_response!("worker.close", WorkerCloseRequest {});

request_response!("worker.dump", WorkerDumpRequest {}, WorkerDump);

request_response!(
    "worker.getResourceUsage",
    WorkerGetResourceRequest {},
    WorkerResourceUsage,
);

request_response!(
    "worker.updateSettings",
    WorkerUpdateSettingsRequest {
        #[serde(skip_serializing_if = "Option::is_none")]
        log_level: Option<WorkerLogLevel>,
        #[serde(skip_serializing_if = "Option::is_none")]
        log_tags: Option<Vec<WorkerLogTag>>,
    },
);

request_response!(
    "worker.createWebRtcServer",
    WorkerCreateWebRtcServerRequest {
        web_rtc_server_id: WebRtcServerId,
        listen_infos: Vec<WebRtcServerListenInfo>,
    },
);

request_response!(
    "worker.closeWebRtcServer",
    WorkerCloseWebRtcServerRequest {
        web_rtc_server_id: WebRtcServerId,
    },
);

request_response!(
    "worker.createRouter",
    WorkerCreateRouterRequest {
        router_id: RouterId,
    },
);

request_response!(
    "worker.closeRouter",
    WorkerCloseRouterRequest {
        router_id: RouterId,
    },
);

// WebRtcServer

request_response!("webRtcServer.dump", WebRtcServerDumpRequest {}, WebRtcServerDump);

// Router

request_response!("router.dump", RouterDumpRequest {}, RouterDump);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WebRtcTransportData {
    pub(crate) ice_role: IceRole,
    pub(crate) ice_parameters: IceParameters,
    pub(crate) ice_candidates: Vec<IceCandidate>,
    pub(crate) ice_state: IceState,
    pub(crate) ice_selected_tuple: Option<TransportTuple>,
    pub(crate) dtls_parameters: DtlsParameters,
    pub(crate) dtls_state: DtlsState,
    pub(crate) sctp_parameters: Option<SctpParameters>,
    pub(crate) sctp_state: Option<SctpState>,
}

request_response!(
    "router.createWebRtcTransport",
    RouterCreateWebRtcTransportRequest {
        transport_id: TransportId,
        listen_ips: Vec<ListenIp>,
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        enable_udp: bool,
        enable_tcp: bool,
        prefer_udp: bool,
        prefer_tcp: bool,
        initial_available_outgoing_bitrate: u32,
        enable_sctp: bool,
        num_sctp_streams: NumSctpStreams,
        max_sctp_message_size: u32,
        sctp_send_buffer_size: u32,
        is_data_channel: bool,
    },
    WebRtcTransportData,
);

request_response!(
    "router.createWebRtcTransportWithServer",
    RouterCreateWebRtcTransportWithServerRequest {
        transport_id: TransportId,
        web_rtc_server_id: WebRtcServerId,
        enable_udp: bool,
        enable_tcp: bool,
        prefer_udp: bool,
        prefer_tcp: bool,
        initial_available_outgoing_bitrate: u32,
        enable_sctp: bool,
        num_sctp_streams: NumSctpStreams,
        max_sctp_message_size: u32,
        sctp_send_buffer_size: u32,
        is_data_channel: bool,
    },
    WebRtcTransportData,
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlainTransportData {
    pub(crate) rtcp_mux: bool,
    pub(crate) comedia: bool,
    pub(crate) tuple: TransportTuple,
    pub(crate) rtcp_tuple: Option<TransportTuple>,
    pub(crate) sctp_parameters: Option<SctpParameters>,
    pub(crate) sctp_state: Option<SctpState>,
    pub(crate) srtp_parameters: Option<SrtpParameters>,
}

request_response!(
    "router.createPlainTransport",
    RouterCreatePlainTransportRequest {
        transport_id: TransportId,
        listen_ip: ListenIp,
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        rtcp_mux: bool,
        comedia: bool,
        enable_sctp: bool,
        num_sctp_streams: NumSctpStreams,
        max_sctp_message_size: u32,
        sctp_send_buffer_size: u32,
        is_data_channel: bool,
        enable_srtp: bool,
        srtp_crypto_suite: SrtpCryptoSuite,
    },
    PlainTransportData,
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PipeTransportData {
    pub(crate) tuple: TransportTuple,
    pub(crate) sctp_parameters: Option<SctpParameters>,
    pub(crate) sctp_state: Option<SctpState>,
    pub(crate) rtx: bool,
    pub(crate) srtp_parameters: Option<SrtpParameters>,
}

request_response!(
    "router.createPipeTransport",
    RouterCreatePipeTransportRequest {
        transport_id: TransportId,
        listen_ip: ListenIp,
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        enable_sctp: bool,
        num_sctp_streams: NumSctpStreams,
        max_sctp_message_size: u32,
        sctp_send_buffer_size: u32,
        is_data_channel: bool,
        enable_rtx: bool,
        enable_srtp: bool,
    },
    PipeTransportData,
);

request_response!(
    "router.createDirectTransport",
    RouterCreateDirectTransportRequest {
        transport_id: TransportId,
        direct: bool,
        max_message_size: u32,
    },
);

request_response!(
    "router.closeTransport",
    RouterCloseTransportRequest {
        transport_id: TransportId,
    },
);

request_response!(
    "router.createActiveSpeakerObserver",
    RouterCreateActiveSpeakerObserverRequest {
        rtp_observer_id: RtpObserverId,
        interval: u16,
    },
);

request_response!(
    "router.createAudioLevelObserver",
    RouterCreateAudioLevelObserverRequest {
        rtp_observer_id: RtpObserverId,
        max_entries: u16,
        threshold: i8,
        interval: u16,
    },
);

request_response!(
    "router.closeRtpObserver",
    RouterCloseRtpObserverRequest {
        rtp_observer_id: RtpObserverId,
    },
);

// Transport

/// Dump request whose response shape depends on the transport kind.
#[derive(Debug, Serialize)]
pub(crate) struct TransportDumpRequest<Dump> {
    #[serde(skip)]
    pub(crate) phantom_data: PhantomData<Dump>,
}

impl<Dump: Debug + DeserializeOwned> Request for TransportDumpRequest<Dump> {
    type Response = Dump;

    fn as_method(&self) -> &'static str {
        "transport.dump"
    }
}

/// Stats request whose response shape depends on the transport kind.
#[derive(Debug, Serialize)]
pub(crate) struct TransportGetStatsRequest<Stat> {
    #[serde(skip)]
    pub(crate) phantom_data: PhantomData<Stat>,
}

impl<Stat: Debug + DeserializeOwned> Request for TransportGetStatsRequest<Stat> {
    type Response = Vec<Stat>;

    fn as_method(&self) -> &'static str {
        "transport.getStats"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WebRtcTransportConnectResponse {
    pub(crate) dtls_local_role: DtlsRole,
}

request_response!(
    "transport.connect",
    TransportConnectWebRtcRequest {
        dtls_parameters: DtlsParameters,
    },
    WebRtcTransportConnectResponse,
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlainTransportConnectResponse {
    pub(crate) tuple: Option<TransportTuple>,
    pub(crate) rtcp_tuple: Option<TransportTuple>,
    pub(crate) srtp_parameters: Option<SrtpParameters>,
}

request_response!(
    "transport.connect",
    TransportConnectPlainRequest {
        #[serde(skip_serializing_if = "Option::is_none")]
        ip: Option<IpAddr>,
        #[serde(skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rtcp_port: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        srtp_parameters: Option<SrtpParameters>,
    },
    PlainTransportConnectResponse,
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PipeTransportConnectResponse {
    pub(crate) tuple: TransportTuple,
}

request_response!(
    "transport.connect",
    TransportConnectPipeRequest {
        ip: IpAddr,
        port: u16,
        #[serde(skip_serializing_if = "Option::is_none")]
        srtp_parameters: Option<SrtpParameters>,
    },
    PipeTransportConnectResponse,
);

request_response!(
    "transport.setMaxIncomingBitrate",
    TransportSetMaxIncomingBitrateRequest { bitrate: u32, },
);

request_response!(
    "transport.setMaxOutgoingBitrate",
    TransportSetMaxOutgoingBitrateRequest { bitrate: u32, },
);

request_response!(
    "transport.setMinOutgoingBitrate",
    TransportSetMinOutgoingBitrateRequest { bitrate: u32, },
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransportRestartIceResponse {
    pub(crate) ice_parameters: IceParameters,
}

request_response!(
    "transport.restartIce",
    TransportRestartIceRequest {},
    TransportRestartIceResponse,
);

request_response!(
    "transport.enableTraceEvent",
    TransportEnableTraceEventRequest {
        types: Vec<TransportTraceEventType>,
    },
);

#[derive(Debug, Deserialize)]
pub(crate) struct TransportProduceResponse {
    pub(crate) r#type: ProducerType,
}

request_response!(
    "transport.produce",
    TransportProduceRequest {
        producer_id: ProducerId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        rtp_mapping: RtpMapping,
        key_frame_request_delay: u32,
        paused: bool,
    },
    TransportProduceResponse,
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransportConsumeResponse {
    pub(crate) paused: bool,
    pub(crate) producer_paused: bool,
    pub(crate) score: ConsumerScore,
    pub(crate) preferred_layers: Option<ConsumerLayers>,
}

request_response!(
    "transport.consume",
    TransportConsumeRequest {
        consumer_id: ConsumerId,
        producer_id: ProducerId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        r#type: ConsumerType,
        consumable_rtp_encodings: Vec<RtpEncodingParameters>,
        paused: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        preferred_layers: Option<ConsumerLayers>,
        ignore_dtx: bool,
    },
    TransportConsumeResponse,
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransportProduceDataResponse {
    pub(crate) r#type: DataProducerType,
    pub(crate) sctp_stream_parameters: Option<SctpStreamParameters>,
    pub(crate) label: String,
    pub(crate) protocol: String,
}

request_response!(
    "transport.produceData",
    TransportProduceDataRequest {
        data_producer_id: DataProducerId,
        r#type: DataProducerType,
        #[serde(skip_serializing_if = "Option::is_none")]
        sctp_stream_parameters: Option<SctpStreamParameters>,
        label: String,
        protocol: String,
        paused: bool,
    },
    TransportProduceDataResponse,
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransportConsumeDataResponse {
    pub(crate) r#type: DataConsumerType,
    pub(crate) sctp_stream_parameters: Option<SctpStreamParameters>,
    pub(crate) label: String,
    pub(crate) protocol: String,
    #[serde(default)]
    pub(crate) paused: bool,
    #[serde(default)]
    pub(crate) data_producer_paused: bool,
}

request_response!(
    "transport.consumeData",
    TransportConsumeDataRequest {
        data_consumer_id: DataConsumerId,
        data_producer_id: DataProducerId,
        r#type: DataConsumerType,
        #[serde(skip_serializing_if = "Option::is_none")]
        sctp_stream_parameters: Option<SctpStreamParameters>,
        label: String,
        protocol: String,
        paused: bool,
    },
    TransportConsumeDataResponse,
);

request_response!(
    "transport.closeProducer",
    TransportCloseProducerRequest {
        producer_id: ProducerId,
    },
);

request_response!(
    "transport.closeConsumer",
    TransportCloseConsumerRequest {
        consumer_id: ConsumerId,
    },
);

request_response!(
    "transport.closeDataProducer",
    TransportCloseDataProducerRequest {
        data_producer_id: DataProducerId,
    },
);

request_response!(
    "transport.closeDataConsumer",
    TransportCloseDataConsumerRequest {
        data_consumer_id: DataConsumerId,
    },
);

notification!("transport.sendRtcp", TransportSendRtcpNotification {});

// Producer

request_response!("producer.dump", ProducerDumpRequest {}, ProducerDump);

request_response!(
    "producer.getStats",
    ProducerGetStatsRequest {},
    Vec<ProducerStat>,
);

request_response!("producer.pause", ProducerPauseRequest {});

request_response!("producer.resume", ProducerResumeRequest {});

request_response!(
    "producer.enableTraceEvent",
    ProducerEnableTraceEventRequest {
        types: Vec<ProducerTraceEventType>,
    },
);

notification!("producer.send", ProducerSendNotification {});

// Consumer

request_response!("consumer.dump", ConsumerDumpRequest {}, ConsumerDump);

request_response!("consumer.getStats", ConsumerGetStatsRequest {}, ConsumerStats);

request_response!("consumer.pause", ConsumerPauseRequest {});

request_response!("consumer.resume", ConsumerResumeRequest {});

request_response!(
    "consumer.setPreferredLayers",
    ConsumerSetPreferredLayersRequest {
        spatial_layer: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        temporal_layer: Option<u8>,
    },
    Option<ConsumerLayers>,
);

#[derive(Debug, Deserialize)]
pub(crate) struct ConsumerSetPriorityResponse {
    pub(crate) priority: u8,
}

request_response!(
    "consumer.setPriority",
    ConsumerSetPriorityRequest { priority: u8, },
    ConsumerSetPriorityResponse,
);

request_response!("consumer.requestKeyFrame", ConsumerRequestKeyFrameRequest {});

request_response!(
    "consumer.enableTraceEvent",
    ConsumerEnableTraceEventRequest {
        types: Vec<ConsumerTraceEventType>,
    },
);

// DataProducer

request_response!("dataProducer.dump", DataProducerDumpRequest {}, DataProducerDump);

request_response!(
    "dataProducer.getStats",
    DataProducerGetStatsRequest {},
    Vec<DataProducerStat>,
);

request_response!("dataProducer.pause", DataProducerPauseRequest {});

request_response!("dataProducer.resume", DataProducerResumeRequest {});

notification!("dataProducer.send", DataProducerSendNotification { ppid: u32, });

// DataConsumer

request_response!("dataConsumer.dump", DataConsumerDumpRequest {}, DataConsumerDump);

request_response!(
    "dataConsumer.getStats",
    DataConsumerGetStatsRequest {},
    Vec<DataConsumerStat>,
);

request_response!("dataConsumer.pause", DataConsumerPauseRequest {});

request_response!("dataConsumer.resume", DataConsumerResumeRequest {});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DataConsumerGetBufferedAmountResponse {
    pub(crate) buffered_amount: u32,
}

request_response!(
    "dataConsumer.getBufferedAmount",
    DataConsumerGetBufferedAmountRequest {},
    DataConsumerGetBufferedAmountResponse,
);

request_response!(
    "dataConsumer.setBufferedAmountLowThreshold",
    DataConsumerSetBufferedAmountLowThresholdRequest { threshold: u32, },
);

request_response!("dataConsumer.send", DataConsumerSendRequest { ppid: u32, });

// RtpObserver

request_response!("rtpObserver.pause", RtpObserverPauseRequest {});

request_response!("rtpObserver.resume", RtpObserverResumeRequest {});

request_response!(
    "rtpObserver.addProducer",
    RtpObserverAddProducerRequest {
        producer_id: ProducerId,
    },
);

request_response!(
    "rtpObserver.removeProducer",
    RtpObserverRemoveProducerRequest {
        producer_id: ProducerId,
    },
);
