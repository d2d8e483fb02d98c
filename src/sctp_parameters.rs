//! SCTP association and per-stream settings used by data producers and data consumers.

use serde::{Deserialize, Serialize};

/// Stream counts announced when opening the SCTP association.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct NumSctpStreams {
    /// Outgoing streams requested.
    #[serde(rename = "OS")]
    pub os: u16,
    /// Upper bound on incoming streams, also the size of the stream id pool for data consumers.
    #[serde(rename = "MIS")]
    pub mis: u16,
}

impl Default for NumSctpStreams {
    fn default() -> Self {
        Self {
            os: 1024,
            mis: 1024,
        }
    }
}

/// Association state negotiated by the worker and reported on transport creation.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SctpParameters {
    /// Always 5000.
    pub port: u16,
    #[serde(rename = "OS")]
    pub os: u16,
    #[serde(rename = "MIS")]
    pub mis: u16,
    pub max_message_size: u32,
}

/// Reliability settings of one SCTP stream.
///
/// Ordered streams carry neither limit, unordered ones carry at most one of them.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SctpStreamParameters {
    pub stream_id: u16,
    #[serde(default = "default_ordered")]
    pub ordered: bool,
    /// Milliseconds after which an unordered message is no longer retransmitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_packet_life_time: Option<u16>,
    /// Retransmission attempts allowed for an unordered message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retransmits: Option<u16>,
}

fn default_ordered() -> bool {
    true
}

impl SctpStreamParameters {
    /// Reliable, ordered delivery.
    #[must_use]
    pub fn new_ordered(stream_id: u16) -> Self {
        Self {
            stream_id,
            ordered: true,
            max_packet_life_time: None,
            max_retransmits: None,
        }
    }

    /// Unordered delivery that gives up after `max_packet_life_time` milliseconds.
    #[must_use]
    pub fn new_unordered_with_life_time(stream_id: u16, max_packet_life_time: u16) -> Self {
        Self {
            ordered: false,
            max_packet_life_time: Some(max_packet_life_time),
            ..Self::new_ordered(stream_id)
        }
    }

    /// Unordered delivery that gives up after `max_retransmits` attempts.
    #[must_use]
    pub fn new_unordered_with_retransmits(stream_id: u16, max_retransmits: u16) -> Self {
        Self {
            ordered: false,
            max_retransmits: Some(max_retransmits),
            ..Self::new_ordered(stream_id)
        }
    }

    /// Copy of these settings bound to another stream id.
    #[must_use]
    pub(crate) fn with_stream_id(self, stream_id: u16) -> Self {
        Self { stream_id, ..self }
    }
}
