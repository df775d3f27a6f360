//! Call-side collaborator types
//!
//! The call state machine, media engine and configuration store are external
//! to this crate. What they know about a call arrives here as a
//! [`CallSnapshot`]: plain owned data, refreshed by the caller at the
//! lifecycle points where the aggregator operations run.

use serde::{Deserialize, Serialize};

use crate::RtpSsrc;

/// Media stream kinds a call report can cover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
}

impl StreamKind {
    /// Number of stream kinds tracked per call
    pub const COUNT: usize = 2;

    pub(crate) fn index(self) -> usize {
        match self {
            StreamKind::Audio => 0,
            StreamKind::Video => 1,
        }
    }
}

/// Who initiated the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// Currently negotiated codec for one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecInfo {
    /// RTP payload type number
    pub payload_type: u8,

    /// MIME subtype, e.g. `opus` or `PCMU`
    pub mime_type: String,

    /// Clock rate in Hz
    pub clock_rate: u32,

    /// Negotiated format parameters, if any
    pub fmtp: Option<String>,
}

/// Negotiated RTP address of one stream in a media description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub kind: StreamKind,

    /// RTP connection address; may be empty in the remote description when
    /// only a session-level address was negotiated
    pub rtp_addr: String,

    pub rtp_port: u16,
}

/// Send and receive SSRCs of one RTP session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SsrcPair {
    pub send: RtpSsrc,
    pub recv: RtpSsrc,
}

/// Per-destination reporting configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Whether quality statistics are collected and published for calls to
    /// this destination
    pub collect_statistics: bool,

    /// Raw collector address, e.g. `sip:collector.example.org:5060`
    pub statistics_collector: Option<String>,
}

/// Read-only view of a call, assembled by the surrounding call stack
#[derive(Debug, Clone, PartialEq)]
pub struct CallSnapshot {
    pub call_id: String,
    pub direction: CallDirection,

    /// From address as a displayable string
    pub from: String,

    /// To address as a displayable string
    pub to: String,

    /// Dialog identifier, once signaling has established one
    pub dialog_id: Option<String>,

    /// Local user agent name
    pub user_agent: String,

    /// Remote user agent name, when learned from signaling
    pub remote_user_agent: Option<String>,

    /// Call start, epoch seconds; 0 when not yet connected
    pub start_time: i64,

    /// Call duration in seconds
    pub duration_secs: i64,

    /// Whether video is active in the current call parameters
    pub video_enabled: bool,

    /// Streams of the local media description
    pub local_media: Vec<MediaDescription>,

    /// Streams of the negotiated remote media description
    pub remote_media: Vec<MediaDescription>,

    /// Session-level remote connection address, the fallback when a remote
    /// stream has no address of its own
    pub remote_session_addr: Option<String>,

    pub audio_codec: Option<CodecInfo>,
    pub video_codec: Option<CodecInfo>,

    pub audio_ssrc: Option<SsrcPair>,
    pub video_ssrc: Option<SsrcPair>,

    /// Configuration of the destination this call was placed through
    pub destination: Option<DestinationConfig>,
}

impl Default for CallSnapshot {
    fn default() -> Self {
        Self {
            call_id: String::new(),
            direction: CallDirection::Incoming,
            from: String::new(),
            to: String::new(),
            dialog_id: None,
            user_agent: String::new(),
            remote_user_agent: None,
            start_time: 0,
            duration_secs: 0,
            video_enabled: false,
            local_media: Vec::new(),
            remote_media: Vec::new(),
            remote_session_addr: None,
            audio_codec: None,
            video_codec: None,
            audio_ssrc: None,
            video_ssrc: None,
            destination: None,
        }
    }
}

impl CallSnapshot {
    /// Whether quality reporting is enabled for this call's destination.
    ///
    /// Every aggregator and publisher operation checks this gate before doing
    /// any work; some run on the media statistics path.
    pub fn reporting_enabled(&self) -> bool {
        self.destination
            .as_ref()
            .map(|d| d.collect_statistics)
            .unwrap_or(false)
    }

    /// Local media description stream of the given kind
    pub fn local_stream(&self, kind: StreamKind) -> Option<&MediaDescription> {
        self.local_media.iter().find(|m| m.kind == kind)
    }

    /// Remote media description stream of the given kind
    pub fn remote_stream(&self, kind: StreamKind) -> Option<&MediaDescription> {
        self.remote_media.iter().find(|m| m.kind == kind)
    }

    /// Negotiated codec for the given stream kind
    pub fn codec(&self, kind: StreamKind) -> Option<&CodecInfo> {
        match kind {
            StreamKind::Audio => self.audio_codec.as_ref(),
            StreamKind::Video => self.video_codec.as_ref(),
        }
    }

    /// RTP session SSRCs for the given stream kind
    pub fn ssrc(&self, kind: StreamKind) -> Option<SsrcPair> {
        match kind {
            StreamKind::Audio => self.audio_ssrc,
            StreamKind::Video => self.video_ssrc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporting_gate() {
        let mut call = CallSnapshot::default();
        assert!(!call.reporting_enabled());

        call.destination = Some(DestinationConfig {
            collect_statistics: false,
            statistics_collector: Some("sip:collector.example.org".to_string()),
        });
        assert!(!call.reporting_enabled());

        if let Some(d) = call.destination.as_mut() {
            d.collect_statistics = true;
        }
        assert!(call.reporting_enabled());
    }

    #[test]
    fn test_stream_lookup() {
        let mut call = CallSnapshot::default();
        call.local_media.push(MediaDescription {
            kind: StreamKind::Audio,
            rtp_addr: "192.0.2.10".to_string(),
            rtp_port: 7078,
        });
        call.local_media.push(MediaDescription {
            kind: StreamKind::Video,
            rtp_addr: "192.0.2.10".to_string(),
            rtp_port: 9078,
        });

        assert_eq!(call.local_stream(StreamKind::Video).map(|m| m.rtp_port), Some(9078));
        assert!(call.remote_stream(StreamKind::Audio).is_none());
    }
}
