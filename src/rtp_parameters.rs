//! Collection of RTP-related data structures that are used to specify codec parameters and
//! capabilities of various endpoints.


use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::num::{NonZeroU32, NonZeroU8};

/// Media kind.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio.
    Audio,
    /// Video.
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        })
    }
}

/// Known audio or video MIME type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MimeType {
    /// Audio.
    Audio(MimeTypeAudio),
    /// Video.
    Video(MimeTypeVideo),
}

impl MimeType {
    /// Media kind implied by the MIME type.
    #[must_use]
    pub fn kind(self) -> MediaKind {
        match self {
            MimeType::Audio(_) => MediaKind::Audio,
            MimeType::Video(_) => MediaKind::Video,
        }
    }

    /// Whether this is the RTX (retransmission) pseudo codec.
    #[must_use]
    pub fn is_rtx(self) -> bool {
        matches!(
            self,
            MimeType::Audio(MimeTypeAudio::Rtx) | MimeType::Video(MimeTypeVideo::Rtx)
        )
    }

    /// Whether this is a feature pseudo codec (RED, ULPFEC) rather than a media codec.
    #[must_use]
    pub fn is_feature_codec(self) -> bool {
        matches!(
            self,
            MimeType::Audio(MimeTypeAudio::Red)
                | MimeType::Video(MimeTypeVideo::Red)
                | MimeType::Video(MimeTypeVideo::Ulpfec)
        )
    }
}

impl From<MimeTypeAudio> for MimeType {
    fn from(mime_type: MimeTypeAudio) -> Self {
        Self::Audio(mime_type)
    }
}

impl From<MimeTypeVideo> for MimeType {
    fn from(mime_type: MimeTypeVideo) -> Self {
        Self::Video(mime_type)
    }
}

/// Known audio MIME types.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum MimeTypeAudio {
    /// Opus.
    #[serde(rename = "audio/opus")]
    Opus,
    /// Multi-channel Opus.
    #[serde(rename = "audio/multiopus")]
    MultiChannelOpus,
    /// PCMU.
    #[serde(rename = "audio/PCMU")]
    Pcmu,
    /// PCMA.
    #[serde(rename = "audio/PCMA")]
    Pcma,
    /// ISAC.
    #[serde(rename = "audio/ISAC")]
    Isac,
    /// G722.
    #[serde(rename = "audio/G722")]
    G722,
    /// iLBC.
    #[serde(rename = "audio/iLBC")]
    Ilbc,
    /// SILK.
    #[serde(rename = "audio/SILK")]
    Silk,
    /// Comfort noise.
    #[serde(rename = "audio/CN")]
    Cn,
    /// DTMF.
    #[serde(rename = "audio/telephone-event")]
    TelephoneEvent,
    /// RTX.
    #[serde(rename = "audio/rtx")]
    Rtx,
    /// RED.
    #[serde(rename = "audio/red")]
    Red,
}

/// Known video MIME types.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum MimeTypeVideo {
    /// VP8.
    #[serde(rename = "video/VP8")]
    Vp8,
    /// VP9.
    #[serde(rename = "video/VP9")]
    Vp9,
    /// H264.
    #[serde(rename = "video/H264")]
    H264,
    /// H264-SVC.
    #[serde(rename = "video/H264-SVC")]
    H264Svc,
    /// H265.
    #[serde(rename = "video/H265")]
    H265,
    /// RTX.
    #[serde(rename = "video/rtx")]
    Rtx,
    /// RED.
    #[serde(rename = "video/red")]
    Red,
    /// ULPFEC.
    #[serde(rename = "video/ulpfec")]
    Ulpfec,
}

/// Value of a codec specific parameter.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RtpCodecParametersParametersValue {
    /// String value.
    String(String),
    /// Numerical value.
    Number(u32),
}

impl From<String> for RtpCodecParametersParametersValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RtpCodecParametersParametersValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<u8> for RtpCodecParametersParametersValue {
    fn from(n: u8) -> Self {
        Self::Number(u32::from(n))
    }
}

impl From<u16> for RtpCodecParametersParametersValue {
    fn from(n: u16) -> Self {
        Self::Number(u32::from(n))
    }
}

impl From<u32> for RtpCodecParametersParametersValue {
    fn from(n: u32) -> Self {
        Self::Number(n)
    }
}

/// Codec specific parameters. Some parameters (such as `packetization-mode` and `profile-level-id`
/// in H264 or `profile-id` in VP9) are critical for codec matching.
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct RtpCodecParametersParameters(BTreeMap<String, RtpCodecParametersParametersValue>);

impl RtpCodecParametersParameters {
    /// Insert another parameter into collection.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<RtpCodecParametersParametersValue>,
    {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Get specific parameter from collection.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RtpCodecParametersParametersValue> {
        self.0.get(key)
    }

    /// Numerical parameter, strings holding numbers are accepted as well.
    pub(crate) fn get_number(&self, key: &str) -> Option<u32> {
        match self.0.get(key)? {
            RtpCodecParametersParametersValue::Number(n) => Some(*n),
            RtpCodecParametersParametersValue::String(s) => s.parse().ok(),
        }
    }

    /// Iterate over parameters in collection.
    pub fn iter(
        &self,
    ) -> std::collections::btree_map::Iter<'_, String, RtpCodecParametersParametersValue> {
        self.0.iter()
    }
}

impl<K, const N: usize> From<[(K, RtpCodecParametersParametersValue); N]>
    for RtpCodecParametersParameters
where
    K: Into<String>,
{
    fn from(array: [(K, RtpCodecParametersParametersValue); N]) -> Self {
        Self(
            IntoIterator::into_iter(array)
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }
}

/// RTCP feedback mechanism supported by a codec.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct RtcpFeedback {
    /// RTCP feedback type.
    pub r#type: String,
    /// RTCP feedback parameter.
    #[serde(default)]
    pub parameter: String,
}

impl RtcpFeedback {
    fn new(r#type: &str, parameter: &str) -> Self {
        Self {
            r#type: r#type.to_string(),
            parameter: parameter.to_string(),
        }
    }

    /// NACK.
    #[must_use]
    pub fn nack() -> Self {
        Self::new("nack", "")
    }

    /// NACK PLI.
    #[must_use]
    pub fn nack_pli() -> Self {
        Self::new("nack", "pli")
    }

    /// CCM FIR.
    #[must_use]
    pub fn ccm_fir() -> Self {
        Self::new("ccm", "fir")
    }

    /// goog-remb.
    #[must_use]
    pub fn goog_remb() -> Self {
        Self::new("goog-remb", "")
    }

    /// transport-cc.
    #[must_use]
    pub fn transport_cc() -> Self {
        Self::new("transport-cc", "")
    }
}

/// Capabilities of a codec within the RTP capabilities.
///
/// Entries in [`RouterOptions::media_codecs`](crate::router::RouterOptions) do not require
/// `preferred_payload_type` (a dynamic one is chosen when unset). If given, make sure it's in the
/// 96-127 range.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    /// Media kind.
    pub kind: MediaKind,
    /// The codec MIME media type/subtype (e.g. 'audio/opus', 'video/VP8').
    pub mime_type: MimeType,
    /// The preferred RTP payload type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_payload_type: Option<u8>,
    /// Codec clock rate expressed in Hertz.
    pub clock_rate: NonZeroU32,
    /// The number of channels supported (e.g. two for stereo). Just for audio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<NonZeroU8>,
    /// Codec specific parameters.
    #[serde(default)]
    pub parameters: RtpCodecParametersParameters,
    /// Transport layer and codec-specific feedback messages for this codec.
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

impl RtpCodecCapability {
    /// Audio codec capability.
    #[must_use]
    pub fn audio(mime_type: MimeTypeAudio, clock_rate: NonZeroU32, channels: NonZeroU8) -> Self {
        Self {
            kind: MediaKind::Audio,
            mime_type: MimeType::Audio(mime_type),
            preferred_payload_type: None,
            clock_rate,
            channels: Some(channels),
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: vec![],
        }
    }

    /// Video codec capability.
    #[must_use]
    pub fn video(mime_type: MimeTypeVideo, clock_rate: NonZeroU32) -> Self {
        Self {
            kind: MediaKind::Video,
            mime_type: MimeType::Video(mime_type),
            preferred_payload_type: None,
            clock_rate,
            channels: None,
            parameters: RtpCodecParametersParameters::default(),
            rtcp_feedback: vec![],
        }
    }
}

/// The RTP capabilities define what mediasoup or an endpoint can receive at media level.
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCapabilities {
    /// Supported media and RTX codecs.
    pub codecs: Vec<RtpCodecCapability>,
    /// Supported RTP header extensions.
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtension>,
}

/// Direction of an RTP header extension.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RtpHeaderExtensionDirection {
    /// Send and receive.
    SendRecv,
    /// Send only.
    SendOnly,
    /// Receive only.
    RecvOnly,
    /// Neither send nor receive.
    Inactive,
}

impl Default for RtpHeaderExtensionDirection {
    fn default() -> Self {
        Self::SendRecv
    }
}

/// URI of an RTP header extension.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum RtpHeaderExtensionUri {
    /// urn:ietf:params:rtp-hdrext:sdes:mid
    #[serde(rename = "urn:ietf:params:rtp-hdrext:sdes:mid")]
    Mid,
    /// urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id
    #[serde(rename = "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id")]
    RtpStreamId,
    /// urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id
    #[serde(rename = "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id")]
    RepairRtpStreamId,
    /// urn:ietf:params:rtp-hdrext:framemarking
    #[serde(rename = "urn:ietf:params:rtp-hdrext:framemarking")]
    FrameMarking,
    /// urn:ietf:params:rtp-hdrext:ssrc-audio-level
    #[serde(rename = "urn:ietf:params:rtp-hdrext:ssrc-audio-level")]
    AudioLevel,
    /// urn:3gpp:video-orientation
    #[serde(rename = "urn:3gpp:video-orientation")]
    VideoOrientation,
    /// urn:ietf:params:rtp-hdrext:toffset
    #[serde(rename = "urn:ietf:params:rtp-hdrext:toffset")]
    TimeOffset,
    /// http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01
    #[serde(rename = "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01")]
    TransportWideCcDraft01,
    /// http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time
    #[serde(rename = "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time")]
    AbsSendTime,
    /// http://www.webrtc.org/experiments/rtp-hdrext/abs-capture-time
    #[serde(rename = "http://www.webrtc.org/experiments/rtp-hdrext/abs-capture-time")]
    AbsCaptureTime,
    #[doc(hidden)]
    #[serde(other, rename = "unsupported")]
    Unsupported,
}

/// Header extension supported by mediasoup or an endpoint.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpHeaderExtension {
    /// Media kind.
    pub kind: MediaKind,
    /// The URI of the RTP header extension.
    pub uri: RtpHeaderExtensionUri,
    /// The preferred numeric identifier that goes in the RTP packet.
    pub preferred_id: u16,
    /// If true, it is preferred that the value in the header be encrypted.
    #[serde(default)]
    pub preferred_encrypt: bool,
    /// If `SendRecv`, mediasoup supports sending and receiving this RTP extension.
    #[serde(default)]
    pub direction: RtpHeaderExtensionDirection,
}

/// Codec used by a Producer or Consumer.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecParameters {
    /// The codec MIME media type/subtype.
    pub mime_type: MimeType,
    /// The value that goes in the RTP Payload Type Field.
    pub payload_type: u8,
    /// Codec clock rate expressed in Hertz.
    pub clock_rate: NonZeroU32,
    /// The number of channels supported. Just for audio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<NonZeroU8>,
    /// Codec-specific parameters available for signaling.
    #[serde(default)]
    pub parameters: RtpCodecParametersParameters,
    /// Transport layer and codec-specific feedback messages for this codec.
    #[serde(default)]
    pub rtcp_feedback: Vec<RtcpFeedback>,
}

/// RTX stream information.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct RtpEncodingParametersRtx {
    /// The media SSRC.
    pub ssrc: u32,
}

/// Information about a single encoding (stream) of a Producer or Consumer.
#[derive(Debug, Default, Clone, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpEncodingParameters {
    /// The media SSRC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssrc: Option<u32>,
    /// The RID RTP extension value. Must be unique.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    /// Codec payload type this encoding affects. If unset, first media codec is chosen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_payload_type: Option<u8>,
    /// RTX stream information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtx: Option<RtpEncodingParametersRtx>,
    /// Discontinuous transmission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtx: Option<bool>,
    /// Number of spatial and temporal layers in the RTP stream (e.g. 'L1T3').
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scalability_mode: Option<String>,
    /// Resolution down scale factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_resolution_down_by: Option<f64>,
    /// Maximum bitrate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u32>,
}

/// Header extension used by a Producer or Consumer.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct RtpHeaderExtensionParameters {
    /// The URI of the RTP header extension.
    pub uri: RtpHeaderExtensionUri,
    /// The numeric identifier that goes in the RTP packet. Must be unique.
    pub id: u16,
    /// If true, the value in the header is encrypted.
    #[serde(default)]
    pub encrypt: bool,
}

/// RTCP parameters of a Producer or Consumer.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcpParameters {
    /// The Canonical Name (CNAME) used by RTCP (e.g. in SDES messages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    /// Whether reduced size RTCP RFC 5506 is configured (if true) or compound RTCP as specified in
    /// RFC 3550 (if false). Default true.
    #[serde(default = "default_true")]
    pub reduced_size: bool,
    /// Whether RTCP-mux is used. Default true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mux: Option<bool>,
}

impl Default for RtcpParameters {
    fn default() -> Self {
        Self {
            cname: None,
            reduced_size: true,
            mux: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// The RTP send parameters describe a media stream received by mediasoup from an endpoint through
/// its corresponding Producer, or sent by mediasoup through a Consumer.
#[derive(Debug, Default, Clone, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpParameters {
    /// The MID RTP extension value as defined in the BUNDLE specification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    /// Media and RTX codecs in use.
    pub codecs: Vec<RtpCodecParameters>,
    /// RTP header extensions in use.
    #[serde(default)]
    pub header_extensions: Vec<RtpHeaderExtensionParameters>,
    /// Transmitted RTP streams and their settings.
    #[serde(default)]
    pub encodings: Vec<RtpEncodingParameters>,
    /// Parameters used for RTCP.
    #[serde(default)]
    pub rtcp: RtcpParameters,
}
