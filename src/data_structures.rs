//! Miscellaneous data structures shared by transports, servers and data channel entities.


use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::net::IpAddr;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use thiserror::Error;

/// Container for arbitrary data attached to an entity by the application.
#[derive(Debug, Clone)]
pub struct AppData(Arc<dyn Any + Send + Sync>);

impl Default for AppData {
    fn default() -> Self {
        Self::new(())
    }
}

impl Deref for AppData {
    type Target = Arc<dyn Any + Send + Sync>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AppData {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AppData {
    /// Wrap application data.
    pub fn new<T: Any + Send + Sync>(app_data: T) -> Self {
        Self(Arc::new(app_data))
    }
}

/// List holding at least one element, serialized as a plain array.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NonEmptyList<T>(Vec<T>);

impl<T> NonEmptyList<T> {
    /// List with a single element.
    #[must_use]
    pub fn new(first: T) -> Self {
        Self(vec![first])
    }

    /// Appends another element, order is preserved.
    #[must_use]
    pub fn insert(mut self, item: T) -> Self {
        self.0.push(item);
        self
    }
}

impl<T> Deref for NonEmptyList<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> TryFrom<Vec<T>> for NonEmptyList<T> {
    type Error = EmptyListError;

    fn try_from(items: Vec<T>) -> Result<Self, Self::Error> {
        if items.is_empty() {
            Err(EmptyListError)
        } else {
            Ok(Self(items))
        }
    }
}

/// A [`NonEmptyList`] was built from an empty vector.
#[derive(Debug, Error, Eq, PartialEq)]
#[error("List must contain at least one element")]
pub struct EmptyListError;

/// IP to listen on, optionally announced under a different address (useful behind NAT).
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenIp {
    /// Listening IPv4 or IPv6.
    pub ip: IpAddr,
    /// Announced IPv4 or IPv6 (useful when running mediasoup behind NAT with private IP).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub announced_ip: Option<IpAddr>,
}

/// Network protocol.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
}

/// ICE role.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IceRole {
    /// The transport is the controlled agent.
    Controlled,
    /// The transport is the controlling agent.
    Controlling,
}

/// ICE parameters.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceParameters {
    /// ICE username fragment.
    pub username_fragment: String,
    /// ICE password.
    pub password: String,
    /// ICE Lite.
    pub ice_lite: Option<bool>,
}

/// ICE candidate type.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IceCandidateType {
    /// Host candidate, the only one mediasoup produces.
    Host,
    /// Server reflexive.
    Srflx,
    /// Peer reflexive.
    Prflx,
    /// Relayed.
    Relay,
}

/// ICE candidate TCP type.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IceCandidateTcpType {
    /// Passive.
    Passive,
}

/// ICE candidate.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Unique identifier that allows ICE to correlate candidates that appear on multiple
    /// transports.
    pub foundation: String,
    /// The assigned priority of the candidate.
    pub priority: u32,
    /// The IP address of the candidate.
    pub ip: IpAddr,
    /// The protocol of the candidate.
    pub protocol: Protocol,
    /// The port for the candidate.
    pub port: u16,
    /// The type of candidate (always `Host`).
    pub r#type: IceCandidateType,
    /// The type of TCP candidate (always `Passive`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_type: Option<IceCandidateTcpType>,
}

/// ICE state.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IceState {
    /// No ICE Binding Requests have been received yet.
    New,
    /// Valid ICE Binding Request have been received, but none with USE-CANDIDATE attribute.
    Connected,
    /// ICE Binding Request with USE_CANDIDATE attribute has been received.
    Completed,
    /// ICE was `Connected` or `Completed` but it has suddenly failed.
    Disconnected,
    /// ICE state when the transport has been closed.
    Closed,
}

/// Transport tuple with local and, once known, remote address.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TransportTuple {
    /// Transport tuple with remote endpoint info.
    #[serde(rename_all = "camelCase")]
    WithRemote {
        /// Local IP address.
        local_ip: IpAddr,
        /// Local port.
        local_port: u16,
        /// Remote IP address.
        remote_ip: IpAddr,
        /// Remote port.
        remote_port: u16,
        /// Protocol.
        protocol: Protocol,
    },
    /// Transport tuple without remote endpoint info.
    #[serde(rename_all = "camelCase")]
    LocalOnly {
        /// Local IP address.
        local_ip: IpAddr,
        /// Local port.
        local_port: u16,
        /// Protocol.
        protocol: Protocol,
    },
}

impl TransportTuple {
    /// Local IP address.
    #[must_use]
    pub fn local_ip(&self) -> IpAddr {
        let (Self::WithRemote { local_ip, .. } | Self::LocalOnly { local_ip, .. }) = self;
        *local_ip
    }

    /// Local port.
    #[must_use]
    pub fn local_port(&self) -> u16 {
        let (Self::WithRemote { local_port, .. } | Self::LocalOnly { local_port, .. }) = self;
        *local_port
    }

    /// Protocol.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        let (Self::WithRemote { protocol, .. } | Self::LocalOnly { protocol, .. }) = self;
        *protocol
    }

    /// Remote IP address, if known.
    #[must_use]
    pub fn remote_ip(&self) -> Option<IpAddr> {
        match self {
            Self::WithRemote { remote_ip, .. } => Some(*remote_ip),
            Self::LocalOnly { .. } => None,
        }
    }

    /// Remote port, if known.
    #[must_use]
    pub fn remote_port(&self) -> Option<u16> {
        match self {
            Self::WithRemote { remote_port, .. } => Some(*remote_port),
            Self::LocalOnly { .. } => None,
        }
    }
}

/// DTLS state.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsState {
    /// DTLS procedures not yet initiated.
    New,
    /// DTLS connecting.
    Connecting,
    /// DTLS successfully connected (SRTP keys already extracted).
    Connected,
    /// DTLS connection failed.
    Failed,
    /// DTLS state when the transport has been closed.
    Closed,
}

/// SCTP state.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SctpState {
    /// SCTP procedures not yet initiated.
    New,
    /// SCTP connecting.
    Connecting,
    /// SCTP successfully connected.
    Connected,
    /// SCTP connection failed.
    Failed,
    /// SCTP state when the transport has been closed.
    Closed,
}

/// DTLS role.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DtlsRole {
    /// The DTLS role is determined based on the resolved ICE role.
    Auto,
    /// DTLS client role.
    Client,
    /// DTLS server role.
    Server,
}

impl Default for DtlsRole {
    fn default() -> Self {
        Self::Auto
    }
}

/// Hash function algorithm used to compute a certificate fingerprint.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum FingerprintAlgorithm {
    /// SHA-1.
    #[serde(rename = "sha-1")]
    Sha1,
    /// SHA-224.
    #[serde(rename = "sha-224")]
    Sha224,
    /// SHA-256.
    #[serde(rename = "sha-256")]
    Sha256,
    /// SHA-384.
    #[serde(rename = "sha-384")]
    Sha384,
    /// SHA-512.
    #[serde(rename = "sha-512")]
    Sha512,
}

impl FingerprintAlgorithm {
    /// Length of the digest in bytes.
    #[must_use]
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// The hash function algorithm and its corresponding certificate fingerprint value.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(try_from = "DtlsFingerprintRaw", into = "DtlsFingerprintRaw")]
pub struct DtlsFingerprint {
    /// Hash function algorithm.
    pub algorithm: FingerprintAlgorithm,
    /// Digest bytes.
    pub value: Vec<u8>,
}

#[derive(Deserialize, Serialize)]
struct DtlsFingerprintRaw {
    algorithm: FingerprintAlgorithm,
    value: String,
}

/// Invalid DTLS fingerprint.
#[derive(Debug, Error, Eq, PartialEq)]
#[error("Invalid {algorithm:?} fingerprint: {value}")]
pub struct DtlsFingerprintError {
    algorithm: FingerprintAlgorithm,
    value: String,
}

impl TryFrom<DtlsFingerprintRaw> for DtlsFingerprint {
    type Error = DtlsFingerprintError;

    fn try_from(raw: DtlsFingerprintRaw) -> Result<Self, Self::Error> {
        let value = raw
            .value
            .split(':')
            .map(|byte| {
                if byte.len() == 2 {
                    u8::from_str_radix(byte, 16).ok()
                } else {
                    None
                }
            })
            .collect::<Option<Vec<u8>>>()
            .filter(|value| value.len() == raw.algorithm.digest_len());

        match value {
            Some(value) => Ok(Self {
                algorithm: raw.algorithm,
                value,
            }),
            None => Err(DtlsFingerprintError {
                algorithm: raw.algorithm,
                value: raw.value,
            }),
        }
    }
}

impl From<DtlsFingerprint> for DtlsFingerprintRaw {
    fn from(fingerprint: DtlsFingerprint) -> Self {
        Self {
            algorithm: fingerprint.algorithm,
            value: fingerprint.to_string(),
        }
    }
}

impl fmt::Display for DtlsFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, byte) in self.value.iter().enumerate() {
            if index > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// DTLS parameters.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct DtlsParameters {
    /// DTLS role.
    pub role: DtlsRole,
    /// DTLS fingerprints.
    pub fingerprints: Vec<DtlsFingerprint>,
}

/// Direction of a traced packet.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceEventDirection {
    /// Incoming.
    In,
    /// Outgoing.
    Out,
}

/// Packet kinds producers and consumers can trace.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RtpTraceEventType {
    Rtp,
    KeyFrame,
    Nack,
    Pli,
    Fir,
}

/// `trace` notification of a producer or consumer. `info` depends on the packet kind and is kept
/// as raw JSON.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RtpTraceEvent {
    pub r#type: RtpTraceEventType,
    pub timestamp: u64,
    pub direction: TraceEventDirection,
    #[serde(default)]
    pub info: Value,
}

/// Message carried over a data channel, as seen by the application.
///
/// The SCTP payload protocol identifier (PPID) is derived from the variant:
///
/// | Value                              | SCTP PPID |
/// |------------------------------------|-----------|
/// | WebRTC String                      | 51        |
/// | WebRTC Binary Partial (Deprecated) | 52        |
/// | WebRTC Binary                      | 53        |
/// | WebRTC String Partial (Deprecated) | 54        |
/// | WebRTC String Empty                | 56        |
/// | WebRTC Binary Empty                | 57        |
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WebRtcMessage {
    /// String message.
    String(String),
    /// Binary message.
    Binary(Bytes),
    /// Empty string message.
    EmptyString,
    /// Empty binary message.
    EmptyBinary,
}

/// Payload received from the worker can't be represented as [`WebRtcMessage`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum WebRtcMessageError {
    /// Unknown payload protocol identifier.
    #[error("Unsupported PPID {0}")]
    UnsupportedPpid(u32),
    /// String payload that is not valid UTF-8.
    #[error("String message is not valid UTF-8")]
    InvalidString,
}

impl WebRtcMessage {
    /// Create string message, empty string turns into [`WebRtcMessage::EmptyString`].
    pub fn string(string: impl Into<String>) -> Self {
        let string = string.into();
        if string.is_empty() {
            Self::EmptyString
        } else {
            Self::String(string)
        }
    }

    /// Create binary message, empty buffer turns into [`WebRtcMessage::EmptyBinary`].
    pub fn binary(binary: impl Into<Bytes>) -> Self {
        let binary = binary.into();
        if binary.is_empty() {
            Self::EmptyBinary
        } else {
            Self::Binary(binary)
        }
    }

    pub(crate) fn new(ppid: u32, payload: Bytes) -> Result<Self, WebRtcMessageError> {
        match ppid {
            51 | 54 => String::from_utf8(payload.to_vec())
                .map(WebRtcMessage::String)
                .map_err(|_| WebRtcMessageError::InvalidString),
            52 | 53 => Ok(WebRtcMessage::Binary(payload)),
            56 => Ok(WebRtcMessage::EmptyString),
            57 => Ok(WebRtcMessage::EmptyBinary),
            ppid => Err(WebRtcMessageError::UnsupportedPpid(ppid)),
        }
    }

    /// PPID that will be used for this message on the wire.
    #[must_use]
    pub fn ppid(&self) -> u32 {
        match self {
            WebRtcMessage::String(_) => 51,
            WebRtcMessage::Binary(_) => 53,
            WebRtcMessage::EmptyString => 56,
            WebRtcMessage::EmptyBinary => 57,
        }
    }

    // Empty messages still need one byte on the wire
    pub(crate) fn into_ppid_and_payload(self) -> (u32, Bytes) {
        let ppid = self.ppid();
        let payload = match self {
            WebRtcMessage::String(string) => Bytes::from(string),
            WebRtcMessage::Binary(binary) => binary,
            WebRtcMessage::EmptyString => Bytes::from_static(b" "),
            WebRtcMessage::EmptyBinary => Bytes::from_static(&[0]),
        };
        (ppid, payload)
    }
}
