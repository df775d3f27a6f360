//! RTCP Extended Report (XR) packet handling
//!
//! Defined in RFC 3611. Only the VoIP Metrics report block is decoded into a
//! typed structure; every other block type is skipped over via its length
//! field so that packets from newer implementations never fail to parse.

use bytes::{Buf, BufMut, BytesMut};
use tracing::debug;

use crate::error::Error;
use crate::{Result, RtpSsrc};

use super::{is_xr_packet, RTCP_PT_XR, RTP_VERSION};

/// RTCP XR block types defined in RFC 3611
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum XrBlockType {
    /// Loss RLE Report Block
    LossRle = 1,

    /// Duplicate RLE Report Block
    DuplicateRle = 2,

    /// Packet Receipt Times Report Block
    PacketReceiptTimes = 3,

    /// Receiver Reference Time Report Block
    ReceiverReferenceTime = 4,

    /// DLRR Report Block
    Dlrr = 5,

    /// Statistics Summary Report Block
    StatisticsSummary = 6,

    /// VoIP Metrics Report Block
    VoipMetrics = 7,
}

impl XrBlockType {
    /// Map a wire value to a known block type.
    ///
    /// Unknown values yield `None` rather than an error; the parser skips
    /// those blocks for forward compatibility.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(XrBlockType::LossRle),
            2 => Some(XrBlockType::DuplicateRle),
            3 => Some(XrBlockType::PacketReceiptTimes),
            4 => Some(XrBlockType::ReceiverReferenceTime),
            5 => Some(XrBlockType::Dlrr),
            6 => Some(XrBlockType::StatisticsSummary),
            7 => Some(XrBlockType::VoipMetrics),
            _ => None,
        }
    }
}

/// RTCP Extended Report packet
///
/// Holds the originator SSRC and the report blocks this crate decodes.
/// Blocks of other types present on the wire are dropped during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpExtendedReport {
    /// SSRC of the packet sender
    pub ssrc: RtpSsrc,

    /// Decoded report blocks
    pub blocks: Vec<XrBlock>,
}

/// Decoded RTCP XR block variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XrBlock {
    /// VoIP Metrics Report Block
    VoipMetrics(VoipMetricsBlock),
}

impl RtcpExtendedReport {
    /// Create a new XR packet
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            blocks: Vec::new(),
        }
    }

    /// Add a VoIP metrics block
    pub fn add_voip_metrics(&mut self, metrics: VoipMetricsBlock) {
        self.blocks.push(XrBlock::VoipMetrics(metrics));
    }

    /// First VoIP metrics block carried by this packet, if any
    pub fn voip_metrics(&self) -> Option<&VoipMetricsBlock> {
        self.blocks
            .iter()
            .map(|XrBlock::VoipMetrics(block)| block)
            .next()
    }

    /// Total packet size in bytes, including the RTCP header
    pub fn size(&self) -> usize {
        8 + self.blocks.len() * (4 + VoipMetricsBlock::BODY_SIZE)
    }

    /// Parse an XR packet from a raw RTCP buffer.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::BufferTooSmall {
                required: 8,
                available: data.len(),
            });
        }
        if !is_xr_packet(data) {
            return Err(Error::InvalidPacket("not an RTCP XR packet".to_string()));
        }

        // RTCP length field counts 32-bit words following the first one
        let payload_len = u16::from_be_bytes([data[2], data[3]]) as usize * 4;
        if data.len() < 4 + payload_len {
            return Err(Error::BufferTooSmall {
                required: 4 + payload_len,
                available: data.len(),
            });
        }

        let mut buf = &data[4..4 + payload_len];
        if buf.remaining() < 4 {
            return Err(Error::InvalidPacket("XR packet without SSRC".to_string()));
        }
        let ssrc = buf.get_u32();

        let mut xr = RtcpExtendedReport::new(ssrc);
        while buf.remaining() >= 4 {
            let block_type = buf.get_u8();
            buf.advance(1); // type-specific byte, unused by the blocks we decode
            let block_len = buf.get_u16() as usize * 4;
            if buf.remaining() < block_len {
                return Err(Error::BufferTooSmall {
                    required: block_len,
                    available: buf.remaining(),
                });
            }

            match XrBlockType::from_u8(block_type) {
                Some(XrBlockType::VoipMetrics) => {
                    if block_len < VoipMetricsBlock::BODY_SIZE {
                        return Err(Error::InvalidPacket(format!(
                            "VoIP metrics block truncated to {} bytes",
                            block_len
                        )));
                    }
                    let mut body = &buf.chunk()[..block_len];
                    xr.add_voip_metrics(VoipMetricsBlock::parse(&mut body)?);
                    buf.advance(block_len);
                }
                other => {
                    debug!(
                        "skipping XR block type {} ({:?}), {} bytes",
                        block_type, other, block_len
                    );
                    buf.advance(block_len);
                }
            }
        }

        Ok(xr)
    }

    /// Serialize the XR packet, including its RTCP header.
    pub fn serialize(&self) -> Result<BytesMut> {
        let total_size = self.size();
        let mut buf = BytesMut::with_capacity(total_size);

        // V=2, P=0, reserved=0
        buf.put_u8(RTP_VERSION << 6);
        buf.put_u8(RTCP_PT_XR);
        // Length in 32-bit words minus one
        buf.put_u16((total_size / 4 - 1) as u16);
        buf.put_u32(self.ssrc);

        for block in &self.blocks {
            let XrBlock::VoipMetrics(metrics) = block;
            metrics.serialize(&mut buf)?;
        }

        Ok(buf)
    }
}

/// VoIP Metrics Report Block (RFC 3611 section 4.7)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoipMetricsBlock {
    /// SSRC of the stream the metrics describe
    pub ssrc: RtpSsrc,

    /// Network packet loss rate, fraction scaled by 256
    pub loss_rate: u8,

    /// Jitter buffer discard rate, fraction scaled by 256
    pub discard_rate: u8,

    /// Packet density during loss bursts
    pub burst_density: u8,

    /// Packet density during gaps
    pub gap_density: u8,

    /// Mean burst duration in milliseconds
    pub burst_duration: u16,

    /// Mean gap duration in milliseconds
    pub gap_duration: u16,

    /// Round-trip delay in milliseconds
    pub round_trip_delay: u16,

    /// End system delay in milliseconds
    pub end_system_delay: u16,

    /// Signal level in dBm (127 = unavailable)
    pub signal_level: i8,

    /// Noise level in dBm (127 = unavailable)
    pub noise_level: i8,

    /// Residual echo return loss in dB (127 = unavailable)
    pub rerl: u8,

    /// Gap threshold, in packets
    pub gmin: u8,

    /// Listening-quality R factor (127 = unavailable)
    pub r_factor: u8,

    /// External R factor (127 = unavailable)
    pub ext_r_factor: u8,

    /// MOS-LQ scaled by 10 (127 = unavailable)
    pub mos_lq: u8,

    /// MOS-CQ scaled by 10 (127 = unavailable)
    pub mos_cq: u8,

    /// Packed receiver configuration byte (PLC, jitter buffer modes)
    pub rx_config: u8,

    /// Jitter buffer nominal delay in milliseconds
    pub jb_nominal: u16,

    /// Jitter buffer maximum delay in milliseconds
    pub jb_maximum: u16,

    /// Jitter buffer absolute maximum delay in milliseconds
    pub jb_abs_max: u16,
}

impl VoipMetricsBlock {
    /// Block body size in bytes, excluding the 4-byte block header
    pub const BODY_SIZE: usize = 32;

    /// Create a block with every one-byte metric at its unavailable value
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            loss_rate: 0,
            discard_rate: 0,
            burst_density: 0,
            gap_density: 0,
            burst_duration: 0,
            gap_duration: 0,
            round_trip_delay: 0,
            end_system_delay: 0,
            signal_level: 127,
            noise_level: 127,
            rerl: 127,
            gmin: 16, // RFC 3611 default gap threshold
            r_factor: 127,
            ext_r_factor: 127,
            mos_lq: 127,
            mos_cq: 127,
            rx_config: 0,
            jb_nominal: 0,
            jb_maximum: 0,
            jb_abs_max: 0,
        }
    }

    /// Parse a block body (the bytes following the block header).
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < Self::BODY_SIZE {
            return Err(Error::BufferTooSmall {
                required: Self::BODY_SIZE,
                available: buf.remaining(),
            });
        }

        let ssrc = buf.get_u32();
        let loss_rate = buf.get_u8();
        let discard_rate = buf.get_u8();
        let burst_density = buf.get_u8();
        let gap_density = buf.get_u8();
        let burst_duration = buf.get_u16();
        let gap_duration = buf.get_u16();
        let round_trip_delay = buf.get_u16();
        let end_system_delay = buf.get_u16();
        let signal_level = buf.get_i8();
        let noise_level = buf.get_i8();
        let rerl = buf.get_u8();
        let gmin = buf.get_u8();
        let r_factor = buf.get_u8();
        let ext_r_factor = buf.get_u8();
        let mos_lq = buf.get_u8();
        let mos_cq = buf.get_u8();
        let rx_config = buf.get_u8();
        buf.advance(1); // Reserved
        let jb_nominal = buf.get_u16();
        let jb_maximum = buf.get_u16();
        let jb_abs_max = buf.get_u16();

        Ok(Self {
            ssrc,
            loss_rate,
            discard_rate,
            burst_density,
            gap_density,
            burst_duration,
            gap_duration,
            round_trip_delay,
            end_system_delay,
            signal_level,
            noise_level,
            rerl,
            gmin,
            r_factor,
            ext_r_factor,
            mos_lq,
            mos_cq,
            rx_config,
            jb_nominal,
            jb_maximum,
            jb_abs_max,
        })
    }

    /// Serialize the block, including its block header.
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(XrBlockType::VoipMetrics as u8);
        buf.put_u8(0); // Reserved
        buf.put_u16((Self::BODY_SIZE / 4) as u16);

        buf.put_u32(self.ssrc);
        buf.put_u8(self.loss_rate);
        buf.put_u8(self.discard_rate);
        buf.put_u8(self.burst_density);
        buf.put_u8(self.gap_density);
        buf.put_u16(self.burst_duration);
        buf.put_u16(self.gap_duration);
        buf.put_u16(self.round_trip_delay);
        buf.put_u16(self.end_system_delay);
        buf.put_i8(self.signal_level);
        buf.put_i8(self.noise_level);
        buf.put_u8(self.rerl);
        buf.put_u8(self.gmin);
        buf.put_u8(self.r_factor);
        buf.put_u8(self.ext_r_factor);
        buf.put_u8(self.mos_lq);
        buf.put_u8(self.mos_cq);
        buf.put_u8(self.rx_config);
        buf.put_u8(0); // Reserved
        buf.put_u16(self.jb_nominal);
        buf.put_u16(self.jb_maximum);
        buf.put_u16(self.jb_abs_max);

        Ok(())
    }
}
