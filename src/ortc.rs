
use crate::rtp_parameters::{
    MediaKind, MimeType, MimeTypeAudio, MimeTypeVideo, RtcpParameters,
    RtpCapabilities, RtpCodecCapability, RtpCodecParameters, RtpCodecParametersParameters,
    RtpCodecParametersParametersValue, RtpEncodingParameters, RtpEncodingParametersRtx,
    RtpHeaderExtensionDirection, RtpHeaderExtensionParameters, RtpHeaderExtensionUri,
    RtpParameters,
};
use crate::scalability_modes;
use crate::sctp_parameters::SctpStreamParameters;
use crate::supported_rtp_capabilities;
use log::debug;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use thiserror::Error;

const DYNAMIC_PAYLOAD_TYPES: &[u8] = &[
    100, 101, 102, 103, 104, 105, 106, 107, 108, 109, 110, 111, 112, 113, 114, 115, 116, 117, 118,
    119, 120, 121, 122, 123, 124, 125, 126, 127, 96, 97, 98, 99,
];

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RtpMappingCodec {
    pub(crate) payload_type: u8,
    pub(crate) mapped_payload_type: u8,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RtpMappingEncoding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ssrc: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) scalability_mode: Option<String>,
    pub(crate) mapped_ssrc: u32,
}

/// How payload types and SSRCs of a Producer are mapped into the ones used inside the Router.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize)]
pub(crate) struct RtpMapping {
    pub(crate) codecs: Vec<RtpMappingCodec>,
    pub(crate) encodings: Vec<RtpMappingEncoding>,
}

/// Error caused by invalid RTP parameters.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RtpParametersError {
    /// Invalid codec apt parameter.
    #[error("invalid codec apt parameter {0}")]
    InvalidAptParameter(String),
    /// Codec channels given for a video codec.
    #[error("channels given for video codec {0:?}")]
    ChannelsForVideoCodec(MimeType),
    /// Duplicated payload type.
    #[error("duplicated codec payload type {0}")]
    DuplicatedPayloadType(u8),
}

/// Error caused by invalid RTP capabilities.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RtpCapabilitiesError {
    /// Media codec not supported.
    #[error("media codec not supported [mime_type:{mime_type:?}]")]
    UnsupportedCodec {
        /// Mime type
        mime_type: MimeType,
    },
    /// Cannot allocate more dynamic codec payload types.
    #[error("cannot allocate more dynamic codec payload types")]
    CannotAllocate,
    /// Invalid codec apt parameter.
    #[error("invalid codec apt parameter {0}")]
    InvalidAptParameter(String),
    /// Duplicated preferred payload type.
    #[error("duplicated preferred payload type {0}")]
    DuplicatedPreferredPayloadType(u8),
    /// Codec kind doesn't match its MIME type.
    #[error("codec kind {kind} doesn't match mime type {mime_type:?}")]
    KindMismatch {
        /// Declared kind
        kind: MediaKind,
        /// Mime type
        mime_type: MimeType,
    },
}

/// Error caused by invalid SCTP stream parameters.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SctpParametersError {
    /// Ordered delivery can't be limited by packet life time or retransmissions.
    #[error("cannot be ordered with max_packet_life_time or max_retransmits")]
    OrderedWithReliabilityLimits,
    /// Only one of the reliability limits can be set.
    #[error("cannot provide both max_packet_life_time and max_retransmits")]
    BothReliabilityLimits,
}

/// Error caused by mismatch of Producer RTP parameters and Router capabilities.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RtpParametersMappingError {
    /// Unsupported codec.
    #[error("unsupported codec [mime_type:{mime_type:?}, payload_type:{payload_type}]")]
    UnsupportedCodec {
        /// Mime type
        mime_type: MimeType,
        /// Payload type
        payload_type: u8,
    },
    /// No RTX codec for capability codec PT.
    #[error("no RTX codec for capability codec PT {preferred_payload_type}")]
    UnsupportedRtxCodec {
        /// Preferred payload type
        preferred_payload_type: u8,
    },
    /// Missing media codec found for RTX PT.
    #[error("missing media codec found for RTX PT {payload_type}")]
    MissingMediaCodecForRtx {
        /// Payload type
        payload_type: u8,
    },
}

/// Error caused by impossibility to produce Consumer RTP parameters.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConsumerRtpParametersError {
    /// Invalid capabilities.
    #[error("invalid capabilities: {0}")]
    InvalidCapabilities(RtpCapabilitiesError),
    /// No compatible media codecs.
    #[error("no compatible media codecs")]
    NoCompatibleMediaCodecs,
}

fn apt_of(parameters: &RtpCodecParametersParameters) -> Option<u32> {
    match parameters.get("apt")? {
        RtpCodecParametersParametersValue::Number(apt) => Some(*apt),
        RtpCodecParametersParametersValue::String(_) => None,
    }
}

fn invalid_apt(parameters: &RtpCodecParametersParameters) -> Option<String> {
    match parameters.get("apt") {
        Some(RtpCodecParametersParametersValue::String(apt)) => Some(apt.clone()),
        Some(RtpCodecParametersParametersValue::Number(_)) => None,
        None => Some(String::new()),
    }
}

/// Validates RTP capabilities of an endpoint or a router.
pub(crate) fn validate_rtp_capabilities(
    caps: &RtpCapabilities,
) -> Result<(), RtpCapabilitiesError> {
    for codec in caps.codecs.iter() {
        validate_rtp_codec_capability(codec)?;
    }

    Ok(())
}

fn validate_rtp_codec_capability(codec: &RtpCodecCapability) -> Result<(), RtpCapabilitiesError> {
    if codec.kind != codec.mime_type.kind() {
        return Err(RtpCapabilitiesError::KindMismatch {
            kind: codec.kind,
            mime_type: codec.mime_type,
        });
    }

    if codec.mime_type.is_rtx() {
        if let Some(apt) = invalid_apt(&codec.parameters) {
            return Err(RtpCapabilitiesError::InvalidAptParameter(apt));
        }
    }

    Ok(())
}

/// Validates RTP parameters given by an endpoint when producing.
pub(crate) fn validate_rtp_parameters(
    rtp_parameters: &RtpParameters,
) -> Result<(), RtpParametersError> {
    let mut payload_types = Vec::with_capacity(rtp_parameters.codecs.len());

    for codec in rtp_parameters.codecs.iter() {
        if payload_types.contains(&codec.payload_type) {
            return Err(RtpParametersError::DuplicatedPayloadType(
                codec.payload_type,
            ));
        }
        payload_types.push(codec.payload_type);

        if codec.mime_type.kind() == MediaKind::Video && codec.channels.is_some() {
            return Err(RtpParametersError::ChannelsForVideoCodec(codec.mime_type));
        }

        if codec.mime_type.is_rtx() {
            if let Some(apt) = invalid_apt(&codec.parameters) {
                return Err(RtpParametersError::InvalidAptParameter(apt));
            }
        }
    }

    Ok(())
}

/// Validates SCTP stream parameters given by an endpoint.
pub(crate) fn validate_sctp_stream_parameters(
    params: &SctpStreamParameters,
) -> Result<(), SctpParametersError> {
    let has_life_time = params.max_packet_life_time.is_some();
    let has_retransmits = params.max_retransmits.is_some();

    if has_life_time && has_retransmits {
        return Err(SctpParametersError::BothReliabilityLimits);
    }

    if params.ordered && (has_life_time || has_retransmits) {
        return Err(SctpParametersError::OrderedWithReliabilityLimits);
    }

    Ok(())
}

/// Generate RTP capabilities for the Router based on the given media codecs and mediasoup
/// supported RTP capabilities.
pub(crate) fn generate_router_rtp_capabilities(
    media_codecs: Vec<RtpCodecCapability>,
) -> Result<RtpCapabilities, RtpCapabilitiesError> {
    let supported_rtp_capabilities = supported_rtp_capabilities::get_supported_rtp_capabilities();
    let mut dynamic_payload_types = DYNAMIC_PAYLOAD_TYPES.iter().copied();
    let mut taken_payload_types = Vec::<u8>::new();
    let mut caps = RtpCapabilities {
        codecs: vec![],
        header_extensions: supported_rtp_capabilities.header_extensions,
    };

    for media_codec in media_codecs {
        validate_rtp_codec_capability(&media_codec)?;

        let mut codec = supported_rtp_capabilities
            .codecs
            .iter()
            .find(|supported_codec| {
                match_codecs((&media_codec).into(), (*supported_codec).into(), false)
            })
            .cloned()
            .ok_or(RtpCapabilitiesError::UnsupportedCodec {
                mime_type: media_codec.mime_type,
            })?;

        // The given media codec preferred payload type wins, then the supported one, then the
        // first free dynamic one.
        let preferred_payload_type = match media_codec
            .preferred_payload_type
            .or(codec.preferred_payload_type)
        {
            Some(preferred_payload_type) => preferred_payload_type,
            None => next_dynamic_payload_type(&mut dynamic_payload_types, &taken_payload_types)?,
        };

        if taken_payload_types.contains(&preferred_payload_type) {
            return Err(RtpCapabilitiesError::DuplicatedPreferredPayloadType(
                preferred_payload_type,
            ));
        }
        taken_payload_types.push(preferred_payload_type);
        codec.preferred_payload_type = Some(preferred_payload_type);

        // Merge the media codec parameters.
        for (key, value) in media_codec.parameters.iter() {
            codec.parameters.insert(key.clone(), value.clone());
        }

        let kind = codec.kind;
        let clock_rate = codec.clock_rate;

        caps.codecs.push(codec);

        if kind == MediaKind::Video {
            let rtx_payload_type =
                next_dynamic_payload_type(&mut dynamic_payload_types, &taken_payload_types)?;
            taken_payload_types.push(rtx_payload_type);

            caps.codecs.push(RtpCodecCapability {
                kind,
                mime_type: MimeType::Video(MimeTypeVideo::Rtx),
                preferred_payload_type: Some(rtx_payload_type),
                clock_rate,
                channels: None,
                parameters: RtpCodecParametersParameters::from([(
                    "apt",
                    u32::from(preferred_payload_type).into(),
                )]),
                rtcp_feedback: vec![],
            });
        }
    }

    Ok(caps)
}

fn next_dynamic_payload_type(
    dynamic_payload_types: &mut impl Iterator<Item = u8>,
    taken_payload_types: &[u8],
) -> Result<u8, RtpCapabilitiesError> {
    dynamic_payload_types
        .find(|payload_type| !taken_payload_types.contains(payload_type))
        .ok_or(RtpCapabilitiesError::CannotAllocate)
}

/// Get a mapping of codec payloads and encodings of the given Producer RTP parameters as values
/// expected by the Router.
pub(crate) fn get_producer_rtp_parameters_mapping(
    rtp_parameters: &RtpParameters,
    rtp_capabilities: &RtpCapabilities,
) -> Result<RtpMapping, RtpParametersMappingError> {
    let mut rtp_mapping = RtpMapping::default();

    // Match parameters media codecs to capabilities media codecs.
    let mut codec_to_cap_codec = BTreeMap::<u8, (&RtpCodecParameters, &RtpCodecCapability)>::new();

    for codec in rtp_parameters.codecs.iter() {
        if codec.mime_type.is_rtx() {
            continue;
        }

        let cap_codec = rtp_capabilities
            .codecs
            .iter()
            .find(|cap_codec| match_codecs(codec.into(), (*cap_codec).into(), true))
            .ok_or(RtpParametersMappingError::UnsupportedCodec {
                mime_type: codec.mime_type,
                payload_type: codec.payload_type,
            })?;

        codec_to_cap_codec.insert(codec.payload_type, (codec, cap_codec));
    }

    // Match parameters RTX codecs to capabilities RTX codecs.
    for codec in rtp_parameters.codecs.iter() {
        if !codec.mime_type.is_rtx() {
            continue;
        }

        let cap_media_codec = apt_of(&codec.parameters)
            .and_then(|apt| u8::try_from(apt).ok())
            .and_then(|apt| codec_to_cap_codec.get(&apt))
            .map(|(_, cap_media_codec)| *cap_media_codec)
            .ok_or(RtpParametersMappingError::MissingMediaCodecForRtx {
                payload_type: codec.payload_type,
            })?;

        let preferred_payload_type = cap_media_codec.preferred_payload_type.unwrap_or_default();

        // Ensure that the capabilities media codec has a RTX codec.
        let cap_rtx_codec = rtp_capabilities
            .codecs
            .iter()
            .find(|cap_codec| {
                cap_codec.mime_type.is_rtx()
                    && apt_of(&cap_codec.parameters) == Some(u32::from(preferred_payload_type))
            })
            .ok_or(RtpParametersMappingError::UnsupportedRtxCodec {
                preferred_payload_type,
            })?;

        codec_to_cap_codec.insert(codec.payload_type, (codec, cap_rtx_codec));
    }

    // Generate codecs mapping.
    for (codec, cap_codec) in codec_to_cap_codec.into_values() {
        rtp_mapping.codecs.push(RtpMappingCodec {
            payload_type: codec.payload_type,
            mapped_payload_type: cap_codec.preferred_payload_type.unwrap_or_default(),
        });
    }

    // Generate encodings mapping.
    let mut mapped_ssrc = generate_ssrc();

    for encoding in rtp_parameters.encodings.iter() {
        rtp_mapping.encodings.push(RtpMappingEncoding {
            ssrc: encoding.ssrc,
            rid: encoding.rid.clone(),
            scalability_mode: encoding.scalability_mode.clone(),
            mapped_ssrc,
        });

        mapped_ssrc += 1;
    }

    Ok(rtp_mapping)
}

/// Generate RTP parameters to be internally used by Consumers given the RTP parameters of a
/// Producer and the RTP capabilities of the Router.
pub(crate) fn get_consumable_rtp_parameters(
    kind: MediaKind,
    params: &RtpParameters,
    caps: &RtpCapabilities,
    rtp_mapping: &RtpMapping,
) -> RtpParameters {
    let mut consumable_params = RtpParameters::default();

    for codec in params.codecs.iter() {
        if codec.mime_type.is_rtx() {
            continue;
        }

        let consumable_codec_pt = match rtp_mapping
            .codecs
            .iter()
            .find(|entry| entry.payload_type == codec.payload_type)
        {
            Some(entry) => entry.mapped_payload_type,
            None => continue,
        };

        let matched_cap_codec = match caps
            .codecs
            .iter()
            .find(|cap_codec| cap_codec.preferred_payload_type == Some(consumable_codec_pt))
        {
            Some(cap_codec) => cap_codec,
            None => continue,
        };

        consumable_params.codecs.push(RtpCodecParameters {
            mime_type: matched_cap_codec.mime_type,
            payload_type: consumable_codec_pt,
            clock_rate: matched_cap_codec.clock_rate,
            channels: matched_cap_codec.channels,
            // Keep the Producer codec parameters.
            parameters: codec.parameters.clone(),
            rtcp_feedback: matched_cap_codec.rtcp_feedback.clone(),
        });

        let consumable_cap_rtx_codec = caps.codecs.iter().find(|cap_rtx_codec| {
            cap_rtx_codec.mime_type.is_rtx()
                && apt_of(&cap_rtx_codec.parameters) == Some(u32::from(consumable_codec_pt))
        });

        if let Some(cap_rtx_codec) = consumable_cap_rtx_codec {
            consumable_params.codecs.push(RtpCodecParameters {
                mime_type: cap_rtx_codec.mime_type,
                payload_type: cap_rtx_codec.preferred_payload_type.unwrap_or_default(),
                clock_rate: cap_rtx_codec.clock_rate,
                channels: cap_rtx_codec.channels,
                parameters: cap_rtx_codec.parameters.clone(),
                rtcp_feedback: cap_rtx_codec.rtcp_feedback.clone(),
            });
        }
    }

    for cap_ext in caps.header_extensions.iter() {
        // Just take RTP header extension that can be used in Consumers.
        if cap_ext.kind != kind
            || !matches!(
                cap_ext.direction,
                RtpHeaderExtensionDirection::SendRecv | RtpHeaderExtensionDirection::SendOnly
            )
        {
            continue;
        }

        consumable_params
            .header_extensions
            .push(RtpHeaderExtensionParameters {
                uri: cap_ext.uri,
                id: cap_ext.preferred_id,
                encrypt: cap_ext.preferred_encrypt,
            });
    }

    for (encoding, mapped_encoding) in params.encodings.iter().zip(rtp_mapping.encodings.iter()) {
        let mut consumable_encoding = encoding.clone();
        // Remove useless fields.
        consumable_encoding.rid.take();
        consumable_encoding.rtx.take();
        consumable_encoding.codec_payload_type.take();

        // Set the mapped ssrc.
        consumable_encoding.ssrc = Some(mapped_encoding.mapped_ssrc);

        consumable_params.encodings.push(consumable_encoding);
    }

    consumable_params.rtcp = RtcpParameters {
        cname: params.rtcp.cname.clone(),
        reduced_size: true,
        mux: Some(true),
    };

    consumable_params
}

/// Check whether the given RTP capabilities can consume the given Producer.
pub(crate) fn can_consume(
    consumable_params: &RtpParameters,
    caps: &RtpCapabilities,
) -> Result<bool, RtpCapabilitiesError> {
    validate_rtp_capabilities(caps)?;

    let first_matching_codec = consumable_params.codecs.iter().find(|codec| {
        caps.codecs
            .iter()
            .any(|cap_codec| match_codecs((*codec).into(), cap_codec.into(), true))
    });

    // Ensure there is at least one media codec.
    Ok(matches!(first_matching_codec, Some(codec) if !codec.mime_type.is_rtx()))
}

/// Generate RTP parameters for a specific Consumer.
///
/// It reduces encodings to just one and takes into account given RTP capabilities to reduce codecs,
/// codecs' RTCP feedback and header extensions, and also enables or disables RTX.
pub(crate) fn get_consumer_rtp_parameters(
    consumable_params: &RtpParameters,
    caps: &RtpCapabilities,
    pipe: bool,
    enable_rtx: bool,
) -> Result<RtpParameters, ConsumerRtpParametersError> {
    validate_rtp_capabilities(caps).map_err(ConsumerRtpParametersError::InvalidCapabilities)?;

    let mut consumer_params = RtpParameters {
        rtcp: consumable_params.rtcp.clone(),
        ..RtpParameters::default()
    };

    for codec in consumable_params.codecs.iter() {
        if !enable_rtx && codec.mime_type.is_rtx() {
            continue;
        }

        let matched_cap_codec = match caps
            .codecs
            .iter()
            .find(|cap_codec| match_codecs((*cap_codec).into(), codec.into(), true))
        {
            Some(cap_codec) => cap_codec,
            None => continue,
        };

        let mut codec = codec.clone();
        codec.rtcp_feedback = matched_cap_codec
            .rtcp_feedback
            .iter()
            .filter(|fb| enable_rtx || fb.r#type != "nack" || !fb.parameter.is_empty())
            .cloned()
            .collect();

        consumer_params.codecs.push(codec);
    }

    // Must sanitize the list of matched codecs by removing useless RTX codecs.
    let media_payload_types = consumer_params
        .codecs
        .iter()
        .filter(|codec| !codec.mime_type.is_rtx())
        .map(|codec| u32::from(codec.payload_type))
        .collect::<Vec<_>>();
    consumer_params.codecs.retain(|codec| {
        !codec.mime_type.is_rtx()
            || apt_of(&codec.parameters)
                .map_or(false, |apt| media_payload_types.contains(&apt))
    });
    let rtx_supported = consumer_params
        .codecs
        .iter()
        .any(|codec| codec.mime_type.is_rtx());

    // Ensure there is at least one media codec.
    match consumer_params.codecs.first() {
        Some(codec) if !codec.mime_type.is_rtx() => {}
        _ => {
            return Err(ConsumerRtpParametersError::NoCompatibleMediaCodecs);
        }
    }

    consumer_params.header_extensions = consumable_params
        .header_extensions
        .iter()
        .filter(|ext| {
            caps.header_extensions
                .iter()
                .any(|cap_ext| cap_ext.preferred_id == ext.id && cap_ext.uri == ext.uri)
        })
        .cloned()
        .collect();

    // Reduce codecs' RTCP feedback. Use Transport-CC if available, REMB otherwise.
    let has_transport_cc = consumer_params
        .header_extensions
        .iter()
        .any(|ext| ext.uri == RtpHeaderExtensionUri::TransportWideCcDraft01);
    let has_abs_send_time = consumer_params
        .header_extensions
        .iter()
        .any(|ext| ext.uri == RtpHeaderExtensionUri::AbsSendTime);

    for codec in consumer_params.codecs.iter_mut() {
        codec.rtcp_feedback.retain(|fb| {
            if has_transport_cc {
                fb.r#type != "goog-remb"
            } else if has_abs_send_time {
                fb.r#type != "transport-cc"
            } else {
                fb.r#type != "transport-cc" && fb.r#type != "goog-remb"
            }
        });
    }

    if pipe {
        consumer_params.encodings =
            pipe_encodings(&consumable_params.encodings, rtx_supported);
    } else {
        let ssrc = generate_ssrc();
        let mut consumer_encoding = RtpEncodingParameters {
            ssrc: Some(ssrc),
            ..RtpEncodingParameters::default()
        };

        if rtx_supported {
            consumer_encoding.rtx = Some(RtpEncodingParametersRtx { ssrc: ssrc + 1 });
        }

        // If any of the consumable encodings has scalability mode, process it (assume all
        // encodings have the same value).
        let mut scalability_mode = consumable_params
            .encodings
            .iter()
            .find_map(|encoding| encoding.scalability_mode.clone());

        // If there is simulcast, mangle spatial layers in scalability mode.
        if consumable_params.encodings.len() > 1 {
            let temporal_layers =
                scalability_modes::parse(scalability_mode.as_deref()).temporal_layers;

            scalability_mode = Some(format!(
                "L{}T{}",
                consumable_params.encodings.len(),
                temporal_layers
            ));
        }

        consumer_encoding.scalability_mode = scalability_mode;

        // Use the maximum max bitrate in any encoding and honor it in the Consumer's encoding.
        consumer_encoding.max_bitrate = consumable_params
            .encodings
            .iter()
            .filter_map(|encoding| encoding.max_bitrate)
            .max();

        // Set a single encoding for the Consumer.
        consumer_params.encodings.push(consumer_encoding);
    }

    Ok(consumer_params)
}

/// Generate RTP parameters for a pipe Consumer.
///
/// It keeps all original consumable encodings and removes support for BWE. If enableRtx is false,
/// it also removes RTX and NACK support.
pub(crate) fn get_pipe_consumer_rtp_parameters(
    consumable_params: &RtpParameters,
    enable_rtx: bool,
) -> RtpParameters {
    let mut consumer_params = RtpParameters {
        rtcp: consumable_params.rtcp.clone(),
        ..RtpParameters::default()
    };

    for codec in consumable_params.codecs.iter() {
        if !enable_rtx && codec.mime_type.is_rtx() {
            continue;
        }

        let mut codec = codec.clone();
        codec.rtcp_feedback.retain(|fb| {
            (fb.r#type == "nack" && fb.parameter == "pli")
                || (fb.r#type == "ccm" && fb.parameter == "fir")
                || (enable_rtx && fb.r#type == "nack" && fb.parameter.is_empty())
        });

        consumer_params.codecs.push(codec);
    }

    // Reduce RTP extensions by disabling transport MID and BWE related ones.
    consumer_params.header_extensions = consumable_params
        .header_extensions
        .iter()
        .filter(|ext| {
            !matches!(
                ext.uri,
                RtpHeaderExtensionUri::Mid
                    | RtpHeaderExtensionUri::AbsSendTime
                    | RtpHeaderExtensionUri::TransportWideCcDraft01
            )
        })
        .cloned()
        .collect();

    consumer_params.encodings = pipe_encodings(&consumable_params.encodings, enable_rtx);

    consumer_params
}

fn pipe_encodings(
    consumable_encodings: &[RtpEncodingParameters],
    with_rtx: bool,
) -> Vec<RtpEncodingParameters> {
    let base_ssrc = generate_ssrc();
    let base_rtx_ssrc = generate_ssrc();

    consumable_encodings
        .iter()
        .zip(0..)
        .map(|(encoding, i)| {
            let mut encoding = encoding.clone();
            encoding.ssrc = Some(base_ssrc + i);
            encoding.rtx = with_rtx.then(|| RtpEncodingParametersRtx {
                ssrc: base_rtx_ssrc + i,
            });
            encoding
        })
        .collect()
}

fn generate_ssrc() -> u32 {
    rand::thread_rng().gen_range(100_000_000..999_999_999)
}

struct CodecToMatch<'a> {
    mime_type: MimeType,
    clock_rate: NonZeroU32,
    channels: Option<u8>,
    parameters: &'a RtpCodecParametersParameters,
}

impl<'a> From<&'a RtpCodecCapability> for CodecToMatch<'a> {
    fn from(codec: &'a RtpCodecCapability) -> Self {
        Self {
            mime_type: codec.mime_type,
            clock_rate: codec.clock_rate,
            channels: normalized_channels(codec.mime_type, codec.channels.map(|c| c.get())),
            parameters: &codec.parameters,
        }
    }
}

impl<'a> From<&'a RtpCodecParameters> for CodecToMatch<'a> {
    fn from(codec: &'a RtpCodecParameters) -> Self {
        Self {
            mime_type: codec.mime_type,
            clock_rate: codec.clock_rate,
            channels: normalized_channels(codec.mime_type, codec.channels.map(|c| c.get())),
            parameters: &codec.parameters,
        }
    }
}

// Audio codecs without explicit channels are mono.
fn normalized_channels(mime_type: MimeType, channels: Option<u8>) -> Option<u8> {
    match mime_type {
        MimeType::Audio(_) => Some(channels.unwrap_or(1)),
        MimeType::Video(_) => None,
    }
}

fn h264_profile(parameters: &RtpCodecParametersParameters) -> String {
    let profile_level_id = match parameters.get("profile-level-id") {
        Some(RtpCodecParametersParametersValue::String(s)) => s.to_lowercase(),
        Some(RtpCodecParametersParametersValue::Number(n)) => n.to_string(),
        None => "42e01f".to_string(),
    };

    // Profile is encoded in the first two bytes, the last one is the level.
    profile_level_id
        .get(..4)
        .unwrap_or(profile_level_id.as_str())
        .to_string()
}

fn match_codecs(codec_a: CodecToMatch<'_>, codec_b: CodecToMatch<'_>, strict: bool) -> bool {
    if codec_a.mime_type != codec_b.mime_type {
        return false;
    }

    if codec_a.channels != codec_b.channels {
        return false;
    }

    if codec_a.clock_rate != codec_b.clock_rate {
        return false;
    }

    // Per codec special checks.
    match codec_a.mime_type {
        MimeType::Audio(MimeTypeAudio::MultiChannelOpus) => {
            for key in ["num_streams", "coupled_streams"] {
                if codec_a.parameters.get_number(key) != codec_b.parameters.get_number(key) {
                    return false;
                }
            }
        }
        MimeType::Video(MimeTypeVideo::H264 | MimeTypeVideo::H264Svc) => {
            if strict {
                let packetization_mode_a = codec_a
                    .parameters
                    .get_number("packetization-mode")
                    .unwrap_or_default();
                let packetization_mode_b = codec_b
                    .parameters
                    .get_number("packetization-mode")
                    .unwrap_or_default();

                if packetization_mode_a != packetization_mode_b {
                    return false;
                }

                if h264_profile(codec_a.parameters) != h264_profile(codec_b.parameters) {
                    debug!("H264 profile mismatch");
                    return false;
                }
            }
        }
        MimeType::Video(MimeTypeVideo::Vp9) => {
            // If strict matching check profile-id.
            if strict {
                let profile_id_a = codec_a.parameters.get_number("profile-id").unwrap_or(0);
                let profile_id_b = codec_b.parameters.get_number("profile-id").unwrap_or(0);

                if profile_id_a != profile_id_b {
                    return false;
                }
            }
        }
        _ => {}
    }

    true
}
