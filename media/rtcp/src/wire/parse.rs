use super::ParseError;
use super::packet::{
    CAST_NAME, FMT_APPLICATION_FEEDBACK, PT_APP, PT_PAYLOAD_FEEDBACK, PT_RECEIVER_REPORT,
    PT_SENDER_REPORT, ReceiverReport, ReportBlock, RtcpPacket, SUBTYPE_RECEIVER_LOG, SenderReport,
};
use crate::feedback::{CastFeedback, ReceiverEvent, ReceiverEventKind};
use crate::frame_id::{FrameId, PacketId};
use crate::ntp::NtpTimestamp;
use crate::{RtpTimestamp, Ssrc};
use bytes::Buf;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Parse an RTCP compound datagram into its packets.
///
/// Fails atomically: a malformed packet anywhere in the buffer rejects the
/// whole datagram and no partial result is returned. Packet types and
/// feedback formats this engine does not understand are skipped.
pub fn parse_compound(mut datagram: &[u8]) -> Result<Vec<RtcpPacket>, ParseError> {
    if datagram.is_empty() {
        return Err(ParseError::TooShort { len: 0 });
    }

    let mut packets = Vec::new();

    while !datagram.is_empty() {
        if datagram.len() < 4 {
            return Err(ParseError::TooShort {
                len: datagram.len(),
            });
        }

        let first = datagram[0];
        let version = first >> 6;
        if version != 2 {
            return Err(ParseError::BadVersion(version));
        }

        let has_padding = first & 0x20 != 0;
        let count = first & 0x1f;
        let packet_type = datagram[1];
        let length_words = usize::from(u16::from_be_bytes([datagram[2], datagram[3]]));
        let packet_len = (length_words + 1) * 4;

        if packet_len > datagram.len() {
            return Err(ParseError::BadLength {
                declared: packet_len,
                available: datagram.len(),
            });
        }

        let mut payload = &datagram[4..packet_len];
        if has_padding {
            let padding = usize::from(*payload.last().ok_or(ParseError::BadPadding)?);
            if padding == 0 || padding > payload.len() {
                return Err(ParseError::BadPadding);
            }

            payload = &payload[..payload.len() - padding];
        }

        match packet_type {
            PT_SENDER_REPORT => {
                packets.push(RtcpPacket::SenderReport(parse_sender_report(
                    count, payload,
                )?));
            }
            PT_RECEIVER_REPORT => {
                packets.push(RtcpPacket::ReceiverReport(parse_receiver_report(
                    count, payload,
                )?));
            }
            PT_PAYLOAD_FEEDBACK => {
                if let Some(packet) = parse_payload_feedback(count, payload)? {
                    packets.push(packet);
                }
            }
            PT_APP => {
                if let Some(packet) = parse_app(count, payload)? {
                    packets.push(packet);
                }
            }
            other => {
                log::debug!("skipping RTCP packet type {other} in compound datagram");
            }
        }

        datagram = &datagram[packet_len..];
    }

    Ok(packets)
}

fn parse_sender_report(count: u8, mut payload: &[u8]) -> Result<SenderReport, ParseError> {
    if payload.remaining() < 24 {
        return Err(ParseError::Truncated("sender report"));
    }

    let ssrc = Ssrc(payload.get_u32());
    let ntp_timestamp = payload.get_u64();
    let rtp_timestamp = RtpTimestamp(payload.get_u32());
    let packet_count = payload.get_u32();
    let octet_count = payload.get_u32();
    let report_blocks = parse_report_blocks(count, &mut payload)?;

    Ok(SenderReport {
        ssrc,
        ntp_timestamp,
        rtp_timestamp,
        packet_count,
        octet_count,
        report_blocks,
    })
}

fn parse_receiver_report(count: u8, mut payload: &[u8]) -> Result<ReceiverReport, ParseError> {
    if payload.remaining() < 4 {
        return Err(ParseError::Truncated("receiver report"));
    }

    let ssrc = Ssrc(payload.get_u32());
    let report_blocks = parse_report_blocks(count, &mut payload)?;

    Ok(ReceiverReport {
        ssrc,
        report_blocks,
    })
}

fn parse_report_blocks(count: u8, payload: &mut &[u8]) -> Result<Vec<ReportBlock>, ParseError> {
    let mut blocks = Vec::with_capacity(usize::from(count));

    for _ in 0..count {
        if payload.remaining() < ReportBlock::SIZE {
            return Err(ParseError::Truncated("report block"));
        }

        let ssrc = Ssrc(payload.get_u32());
        let fraction_lost = payload.get_u8();
        let cumulative_lost = u32::from(payload.get_u8()) << 16
            | u32::from(payload.get_u8()) << 8
            | u32::from(payload.get_u8());
        let extended_highest_sequence = payload.get_u32();
        let jitter = payload.get_u32();
        let last_sender_report = payload.get_u32();
        let delay_since_last_sender_report = payload.get_u32();

        blocks.push(ReportBlock {
            ssrc,
            fraction_lost,
            cumulative_lost,
            extended_highest_sequence,
            jitter,
            last_sender_report,
            delay_since_last_sender_report,
        });
    }

    Ok(blocks)
}

fn parse_payload_feedback(fmt: u8, mut payload: &[u8]) -> Result<Option<RtcpPacket>, ParseError> {
    if fmt != FMT_APPLICATION_FEEDBACK {
        log::debug!("skipping payload feedback with format {fmt}");
        return Ok(None);
    }

    if payload.remaining() < 12 {
        return Err(ParseError::Truncated("payload feedback"));
    }

    let sender_ssrc = Ssrc(payload.get_u32());
    let media_ssrc = Ssrc(payload.get_u32());

    if payload.get_u32() != CAST_NAME {
        return Ok(None);
    }

    if payload.remaining() < 8 {
        return Err(ParseError::Truncated("cast feedback"));
    }

    let ack_frame_id = FrameId::new(payload.get_u32());
    let target_delay = Duration::from_millis(u64::from(payload.get_u16()));
    let field_count = payload.get_u16();

    let mut missing_frames_and_packets = HashMap::new();

    for _ in 0..field_count {
        if payload.remaining() < 6 {
            return Err(ParseError::Truncated("cast loss field"));
        }

        let frame_id = FrameId::new(payload.get_u32());
        let id_count = usize::from(payload.get_u16());
        if id_count == 0 {
            return Err(ParseError::Malformed("cast loss field"));
        }

        if payload.remaining() < 2 * id_count {
            return Err(ParseError::Truncated("cast loss field"));
        }

        let mut packets = BTreeSet::new();
        let mut whole_frame = false;

        for _ in 0..id_count {
            let packet_id = PacketId(payload.get_u16());
            if packet_id == PacketId::ALL_PACKETS {
                whole_frame = true;
            } else {
                packets.insert(packet_id);
            }
        }

        // loss fields are padded to a 32-bit boundary
        if id_count % 2 == 0 {
            if payload.remaining() < 2 {
                return Err(ParseError::Truncated("cast loss field"));
            }
            payload.advance(2);
        }

        let packets = if whole_frame { BTreeSet::new() } else { packets };
        missing_frames_and_packets.insert(frame_id, packets);
    }

    Ok(Some(RtcpPacket::CastFeedback {
        sender_ssrc,
        message: CastFeedback {
            media_ssrc,
            ack_frame_id,
            target_delay,
            missing_frames_and_packets,
        },
    }))
}

fn parse_app(subtype: u8, mut payload: &[u8]) -> Result<Option<RtcpPacket>, ParseError> {
    if subtype != SUBTYPE_RECEIVER_LOG {
        return Ok(None);
    }

    if payload.remaining() < 8 {
        return Err(ParseError::Truncated("app packet"));
    }

    let ssrc = Ssrc(payload.get_u32());

    if payload.get_u32() != CAST_NAME {
        return Ok(None);
    }

    if payload.remaining() < 12 {
        return Err(ParseError::Truncated("receiver log"));
    }

    let base = NtpTimestamp::from_fixed_u64(payload.get_u64());
    let event_count = payload.get_u32();

    if u64::from(event_count) * 8 > payload.remaining() as u64 {
        return Err(ParseError::Truncated("receiver log"));
    }

    let mut events = Vec::with_capacity(event_count as usize);

    for _ in 0..event_count {
        let rtp_timestamp = RtpTimestamp(payload.get_u32());
        let kind = payload.get_u8();
        payload.advance(1);
        let delta = Duration::from_millis(u64::from(payload.get_u16()));

        let Some(kind) = ReceiverEventKind::from_wire(kind) else {
            log::debug!("skipping receiver log event of unknown kind {kind}");
            continue;
        };

        events.push(ReceiverEvent {
            rtp_timestamp,
            kind,
            at: (base + delta).to_instant(),
        });
    }

    Ok(Some(RtcpPacket::ReceiverLog { ssrc, events }))
}
