use crate::feedback::{CastFeedback, ReceiverEvent};
use crate::frame_id::{FrameId, PacketId};
use crate::ntp::NtpTimestamp;
use crate::{RtpTimestamp, Ssrc};
use bytes::{BufMut, BytesMut};

pub(crate) const PT_SENDER_REPORT: u8 = 200;
pub(crate) const PT_RECEIVER_REPORT: u8 = 201;
pub(crate) const PT_APP: u8 = 204;
pub(crate) const PT_PAYLOAD_FEEDBACK: u8 = 206;

/// Feedback message type of application layer feedback.
pub(crate) const FMT_APPLICATION_FEEDBACK: u8 = 15;
/// APP packet subtype carrying the receiver event log.
pub(crate) const SUBTYPE_RECEIVER_LOG: u8 = 2;
/// Identifies Cast extension blocks inside feedback and APP packets.
pub(crate) const CAST_NAME: u32 = u32::from_be_bytes(*b"CAST");

const RTCP_VERSION: u8 = 2;

/// Sender report, RFC 3550 6.4.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: Ssrc,
    /// 64-bit 32.32 fixed-point NTP timestamp of the report.
    pub ntp_timestamp: u64,
    pub rtp_timestamp: RtpTimestamp,
    pub packet_count: u32,
    pub octet_count: u32,
    pub report_blocks: Vec<ReportBlock>,
}

/// Receiver report, RFC 3550 6.4.2. Carries zero report blocks in the
/// reduced-size form used before any RTP has been received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverReport {
    pub ssrc: Ssrc,
    pub report_blocks: Vec<ReportBlock>,
}

/// Per-source reception report block shared by SR and RR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportBlock {
    /// The source this block reports on.
    pub ssrc: Ssrc,
    pub fraction_lost: u8,
    /// 24 bits on the wire.
    pub cumulative_lost: u32,
    pub extended_highest_sequence: u32,
    pub jitter: u32,
    /// Truncated NTP timestamp of the last sender report received from
    /// `ssrc`, zero when none was observed yet.
    pub last_sender_report: u32,
    /// Delay between receiving that sender report and sending this block,
    /// in 16.16 fixed-point seconds.
    pub delay_since_last_sender_report: u32,
}

/// One packet of a decoded RTCP compound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    CastFeedback {
        sender_ssrc: Ssrc,
        message: CastFeedback,
    },
    ReceiverLog {
        ssrc: Ssrc,
        events: Vec<ReceiverEvent>,
    },
}

fn put_header(buf: &mut BytesMut, count: u8, packet_type: u8, length_words: u16) {
    debug_assert!(count <= 0x1f);

    buf.put_u8((RTCP_VERSION << 6) | count);
    buf.put_u8(packet_type);
    buf.put_u16(length_words);
}

impl ReportBlock {
    pub(crate) const SIZE: usize = 24;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.ssrc.0);
        buf.put_u8(self.fraction_lost);
        // cumulative lost is 24 bits
        buf.put_u8((self.cumulative_lost >> 16) as u8);
        buf.put_u8((self.cumulative_lost >> 8) as u8);
        buf.put_u8(self.cumulative_lost as u8);
        buf.put_u32(self.extended_highest_sequence);
        buf.put_u32(self.jitter);
        buf.put_u32(self.last_sender_report);
        buf.put_u32(self.delay_since_last_sender_report);
    }
}

impl SenderReport {
    pub fn encode(&self, buf: &mut BytesMut) {
        let blocks = self.report_blocks.len();
        put_header(
            buf,
            blocks as u8,
            PT_SENDER_REPORT,
            (6 + 6 * blocks) as u16,
        );

        buf.put_u32(self.ssrc.0);
        buf.put_u64(self.ntp_timestamp);
        buf.put_u32(self.rtp_timestamp.0);
        buf.put_u32(self.packet_count);
        buf.put_u32(self.octet_count);

        for block in &self.report_blocks {
            block.encode(buf);
        }
    }
}

impl ReceiverReport {
    pub fn encode(&self, buf: &mut BytesMut) {
        let blocks = self.report_blocks.len();
        put_header(
            buf,
            blocks as u8,
            PT_RECEIVER_REPORT,
            (1 + 6 * blocks) as u16,
        );

        buf.put_u32(self.ssrc.0);

        for block in &self.report_blocks {
            block.encode(buf);
        }
    }
}

/// Encode a Cast feedback message as a payload-specific feedback packet.
///
/// Loss fields are written oldest-first in wraparound order relative to the
/// ack frame; a frame with an empty missing set becomes a single
/// [`PacketId::ALL_PACKETS`] entry.
pub fn encode_cast_feedback(buf: &mut BytesMut, sender_ssrc: Ssrc, message: &CastFeedback) {
    let mut fields: Vec<(FrameId, Vec<PacketId>)> = message
        .missing_frames_and_packets
        .iter()
        .map(|(frame, packets)| {
            let packet_ids = if packets.is_empty() {
                vec![PacketId::ALL_PACKETS]
            } else {
                packets.iter().copied().collect()
            };

            (*frame, packet_ids)
        })
        .collect();
    fields.sort_by_key(|(frame, _)| frame.wrapping_difference(message.ack_frame_id));

    debug_assert!(fields.len() <= usize::from(u16::MAX));

    let field_bytes: usize = fields
        .iter()
        .map(|(_, packet_ids)| loss_field_size(packet_ids.len()))
        .sum();
    let total = 24 + field_bytes;

    put_header(
        buf,
        FMT_APPLICATION_FEEDBACK,
        PT_PAYLOAD_FEEDBACK,
        (total / 4 - 1) as u16,
    );

    buf.put_u32(sender_ssrc.0);
    buf.put_u32(message.media_ssrc.0);
    buf.put_u32(CAST_NAME);
    buf.put_u32(message.ack_frame_id.value());
    buf.put_u16(message.target_delay.as_millis().min(u128::from(u16::MAX)) as u16);
    buf.put_u16(fields.len() as u16);

    for (frame, packet_ids) in &fields {
        buf.put_u32(frame.value());
        buf.put_u16(packet_ids.len() as u16);

        for packet_id in packet_ids {
            buf.put_u16(packet_id.0);
        }

        // pad the loss field to a 32-bit boundary
        if packet_ids.len() % 2 == 0 {
            buf.put_u16(0);
        }
    }
}

/// Bytes one loss field occupies, including padding to a 32-bit boundary.
pub(crate) fn loss_field_size(packet_ids: usize) -> usize {
    let unpadded = 6 + 2 * packet_ids;
    unpadded + (unpadded % 4)
}

/// Encode the receiver event log as an APP packet named `CAST`.
///
/// Event times are written as millisecond deltas against the earliest
/// event, which is carried as a full 64-bit NTP timestamp so decoded events
/// keep their absolute time.
pub fn encode_receiver_log(buf: &mut BytesMut, ssrc: Ssrc, events: &[ReceiverEvent]) {
    let Some(base) = events.iter().map(|event| event.at).min() else {
        return;
    };
    let base_ntp = NtpTimestamp::from_instant(base);

    let total = 24 + 8 * events.len();
    put_header(buf, SUBTYPE_RECEIVER_LOG, PT_APP, (total / 4 - 1) as u16);

    buf.put_u32(ssrc.0);
    buf.put_u32(CAST_NAME);
    buf.put_u64(base_ntp.to_fixed_u64());
    buf.put_u32(events.len() as u32);

    for event in events {
        let delta = event.at.saturating_duration_since(base).as_millis();

        buf.put_u32(event.rtp_timestamp.0);
        buf.put_u8(event.kind.to_wire());
        buf.put_u8(0);
        buf.put_u16(delta.min(u128::from(u16::MAX)) as u16);
    }
}
