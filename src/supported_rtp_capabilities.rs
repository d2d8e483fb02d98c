//! RTP capabilities supported by the media worker.

use crate::rtp_parameters::{
    MediaKind, MimeTypeAudio, MimeTypeVideo, RtcpFeedback, RtpCapabilities, RtpCodecCapability,
    RtpCodecParametersParameters, RtpHeaderExtension, RtpHeaderExtensionDirection,
    RtpHeaderExtensionUri,
};
use std::num::{NonZeroU32, NonZeroU8};

const ONE_CHANNEL: NonZeroU8 = match NonZeroU8::new(1) {
    Some(channels) => channels,
    None => unreachable!(),
};

const TWO_CHANNELS: NonZeroU8 = match NonZeroU8::new(2) {
    Some(channels) => channels,
    None => unreachable!(),
};

fn clock_rate(hz: u32) -> NonZeroU32 {
    NonZeroU32::new(hz).unwrap_or(NonZeroU32::MIN)
}

fn audio(
    mime_type: MimeTypeAudio,
    preferred_payload_type: Option<u8>,
    hz: u32,
    channels: NonZeroU8,
) -> RtpCodecCapability {
    RtpCodecCapability {
        preferred_payload_type,
        rtcp_feedback: vec![RtcpFeedback::transport_cc()],
        ..RtpCodecCapability::audio(mime_type, clock_rate(hz), channels)
    }
}

fn video(mime_type: MimeTypeVideo, parameters: RtpCodecParametersParameters) -> RtpCodecCapability {
    RtpCodecCapability {
        parameters,
        rtcp_feedback: vec![
            RtcpFeedback::nack(),
            RtcpFeedback::nack_pli(),
            RtcpFeedback::ccm_fir(),
            RtcpFeedback::goog_remb(),
            RtcpFeedback::transport_cc(),
        ],
        ..RtpCodecCapability::video(mime_type, clock_rate(90000))
    }
}

fn header_extension(
    kind: MediaKind,
    uri: RtpHeaderExtensionUri,
    preferred_id: u16,
    direction: RtpHeaderExtensionDirection,
) -> RtpHeaderExtension {
    RtpHeaderExtension {
        kind,
        uri,
        preferred_id,
        preferred_encrypt: false,
        direction,
    }
}

/// Capabilities of the worker, media codecs given to a router must be a subset of these.
#[must_use]
pub fn get_supported_rtp_capabilities() -> RtpCapabilities {
    use RtpHeaderExtensionDirection::{RecvOnly, SendRecv};

    RtpCapabilities {
        codecs: vec![
            audio(MimeTypeAudio::Opus, None, 48000, TWO_CHANNELS),
            audio(MimeTypeAudio::MultiChannelOpus, None, 48000, TWO_CHANNELS),
            audio(MimeTypeAudio::Pcmu, Some(0), 8000, ONE_CHANNEL),
            audio(MimeTypeAudio::Pcma, Some(8), 8000, ONE_CHANNEL),
            audio(MimeTypeAudio::Isac, None, 32000, ONE_CHANNEL),
            audio(MimeTypeAudio::Isac, None, 16000, ONE_CHANNEL),
            audio(MimeTypeAudio::G722, Some(9), 8000, ONE_CHANNEL),
            audio(MimeTypeAudio::Ilbc, None, 8000, ONE_CHANNEL),
            audio(MimeTypeAudio::Silk, None, 24000, ONE_CHANNEL),
            audio(MimeTypeAudio::Silk, None, 16000, ONE_CHANNEL),
            audio(MimeTypeAudio::Silk, None, 12000, ONE_CHANNEL),
            audio(MimeTypeAudio::Silk, None, 8000, ONE_CHANNEL),
            RtpCodecCapability {
                preferred_payload_type: Some(13),
                ..RtpCodecCapability::audio(MimeTypeAudio::Cn, clock_rate(32000), ONE_CHANNEL)
            },
            RtpCodecCapability {
                preferred_payload_type: Some(13),
                ..RtpCodecCapability::audio(MimeTypeAudio::Cn, clock_rate(16000), ONE_CHANNEL)
            },
            RtpCodecCapability {
                preferred_payload_type: Some(13),
                ..RtpCodecCapability::audio(MimeTypeAudio::Cn, clock_rate(8000), ONE_CHANNEL)
            },
            RtpCodecCapability::audio(
                MimeTypeAudio::TelephoneEvent,
                clock_rate(48000),
                ONE_CHANNEL,
            ),
            RtpCodecCapability::audio(
                MimeTypeAudio::TelephoneEvent,
                clock_rate(8000),
                ONE_CHANNEL,
            ),
            video(MimeTypeVideo::Vp8, RtpCodecParametersParameters::default()),
            video(MimeTypeVideo::Vp9, RtpCodecParametersParameters::default()),
            video(
                MimeTypeVideo::H264,
                RtpCodecParametersParameters::from([
                    ("level-asymmetry-allowed", 1_u32.into()),
                    ("packetization-mode", 1_u32.into()),
                ]),
            ),
            video(
                MimeTypeVideo::H264,
                RtpCodecParametersParameters::from([
                    ("level-asymmetry-allowed", 1_u32.into()),
                    ("packetization-mode", 0_u32.into()),
                ]),
            ),
            video(
                MimeTypeVideo::H264Svc,
                RtpCodecParametersParameters::from([
                    ("level-asymmetry-allowed", 1_u32.into()),
                    ("packetization-mode", 1_u32.into()),
                ]),
            ),
            video(MimeTypeVideo::H265, RtpCodecParametersParameters::default()),
        ],
        header_extensions: vec![
            header_extension(MediaKind::Audio, RtpHeaderExtensionUri::Mid, 1, SendRecv),
            header_extension(MediaKind::Video, RtpHeaderExtensionUri::Mid, 1, SendRecv),
            header_extension(MediaKind::Video, RtpHeaderExtensionUri::RtpStreamId, 2, RecvOnly),
            header_extension(
                MediaKind::Video,
                RtpHeaderExtensionUri::RepairRtpStreamId,
                3,
                RecvOnly,
            ),
            header_extension(MediaKind::Audio, RtpHeaderExtensionUri::AbsSendTime, 4, SendRecv),
            header_extension(MediaKind::Video, RtpHeaderExtensionUri::AbsSendTime, 4, SendRecv),
            // For audio transport-wide-cc-01 is only enabled when receiving media
            header_extension(
                MediaKind::Audio,
                RtpHeaderExtensionUri::TransportWideCcDraft01,
                5,
                RecvOnly,
            ),
            header_extension(
                MediaKind::Video,
                RtpHeaderExtensionUri::TransportWideCcDraft01,
                5,
                SendRecv,
            ),
            header_extension(MediaKind::Video, RtpHeaderExtensionUri::FrameMarking, 7, SendRecv),
            header_extension(MediaKind::Audio, RtpHeaderExtensionUri::AudioLevel, 10, SendRecv),
            header_extension(
                MediaKind::Video,
                RtpHeaderExtensionUri::VideoOrientation,
                11,
                SendRecv,
            ),
            header_extension(MediaKind::Video, RtpHeaderExtensionUri::TimeOffset, 12, SendRecv),
            header_extension(
                MediaKind::Audio,
                RtpHeaderExtensionUri::AbsCaptureTime,
                13,
                SendRecv,
            ),
            header_extension(
                MediaKind::Video,
                RtpHeaderExtensionUri::AbsCaptureTime,
                13,
                SendRecv,
            ),
        ],
    }
}
