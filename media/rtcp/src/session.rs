use crate::feedback::{CastFeedback, CastFeedbackTracker, ReceiverEvent};
use crate::ntp::{self, NtpTimestamp};
use crate::rtt::{RttEstimator, RttReport};
use crate::transport::{
    CastFeedbackHandler, PacketTransport, ReceiverLogHandler, ReceiverStatistics, RttHandler,
};
use crate::wire::packet::{
    ReceiverReport, ReportBlock, RtcpPacket, SenderReport, encode_cast_feedback,
    encode_receiver_log,
};
use crate::wire::parse::parse_compound;
use crate::{RtpTimestamp, Ssrc};
use bytes::BytesMut;
use std::collections::VecDeque;
use std::time::Instant;

/// How many outgoing sender reports are kept for LSR matching. Receiver
/// reports may echo any of them, not just the most recent one.
const MAX_UNACKED_SENDER_REPORTS: usize = 32;

/// The last sender report observed from the remote end, kept for the DLSR
/// echo and for lip-sync extrapolation by the frame receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReportInfo {
    pub ntp_timestamp: NtpTimestamp,
    pub rtp_timestamp: RtpTimestamp,
    pub arrival: Instant,
}

/// RTCP endpoint for one media direction.
///
/// One instance exists per sender or receiver role of a stream and lives as
/// long as the owning frame sender/receiver. The session itself schedules
/// nothing; the owner decides when to emit reports and feeds incoming
/// datagrams in as they arrive. Exclusive `&mut` access is the concurrency
/// model: all calls must come from the stream's own pipeline context.
///
/// Registered handlers are invoked synchronously from within
/// [`incoming_rtcp_packet`](Self::incoming_rtcp_packet) and must not call
/// back into the session.
pub struct RtcpSession {
    local_ssrc: Ssrc,
    remote_ssrc: Ssrc,
    transport: Box<dyn PacketTransport>,

    rtt: RttEstimator,
    /// Truncated NTP send timestamps of our recent sender reports.
    sent_reports: VecDeque<(u32, Instant)>,
    last_received_sender_report: Option<SenderReportInfo>,

    feedback: CastFeedbackTracker,

    cast_feedback_handler: Option<Box<dyn CastFeedbackHandler>>,
    rtt_handler: Option<Box<dyn RttHandler>>,
    receiver_log_handler: Option<Box<dyn ReceiverLogHandler>>,
}

impl RtcpSession {
    pub fn new(local_ssrc: Ssrc, remote_ssrc: Ssrc, transport: Box<dyn PacketTransport>) -> Self {
        RtcpSession {
            local_ssrc,
            remote_ssrc,
            transport,
            rtt: RttEstimator::new(),
            sent_reports: VecDeque::new(),
            last_received_sender_report: None,
            feedback: CastFeedbackTracker::new(),
            cast_feedback_handler: None,
            rtt_handler: None,
            receiver_log_handler: None,
        }
    }

    pub fn set_cast_feedback_handler(&mut self, handler: Box<dyn CastFeedbackHandler>) {
        self.cast_feedback_handler = Some(handler);
    }

    pub fn set_rtt_handler(&mut self, handler: Box<dyn RttHandler>) {
        self.rtt_handler = Some(handler);
    }

    pub fn set_receiver_log_handler(&mut self, handler: Box<dyn ReceiverLogHandler>) {
        self.receiver_log_handler = Some(handler);
    }

    pub fn local_ssrc(&self) -> Ssrc {
        self.local_ssrc
    }

    pub fn remote_ssrc(&self) -> Ssrc {
        self.remote_ssrc
    }

    /// The ack/loss accumulator for the receiver role of this session.
    pub fn feedback(&mut self) -> &mut CastFeedbackTracker {
        &mut self.feedback
    }

    /// Round-trip estimate, `None` until a sender report of ours has been
    /// echoed back by the remote end.
    pub fn rtt(&self) -> Option<RttReport> {
        self.rtt.report()
    }

    pub fn last_received_sender_report(&self) -> Option<SenderReportInfo> {
        self.last_received_sender_report
    }

    /// Build and transmit a sender report.
    ///
    /// Returns the transport's verdict; on `false` the owner may retry on
    /// its own schedule.
    pub fn send_rtcp_from_rtp_sender(
        &mut self,
        now: Instant,
        rtp_timestamp: RtpTimestamp,
        packet_count: u32,
        octet_count: u32,
    ) -> bool {
        let ntp = NtpTimestamp::from_instant(now);
        self.save_sent_report(ntp.truncated(), now);

        let report = SenderReport {
            ssrc: self.local_ssrc,
            ntp_timestamp: ntp.to_fixed_u64(),
            rtp_timestamp,
            packet_count,
            octet_count,
            report_blocks: Vec::new(),
        };

        let mut buf = BytesMut::with_capacity(32);
        report.encode(&mut buf);

        log::trace!(
            "sending sender report, ssrc={:?} rtp_timestamp={rtp_timestamp:?}",
            self.local_ssrc
        );

        self.transport.send_rtcp_packet(self.local_ssrc, &buf)
    }

    /// Build and transmit a receiver report, optionally carrying Cast
    /// feedback and the receiver event log.
    ///
    /// Without `stats` the report is sent in its reduced-size form with no
    /// report block; the remote end treats that as "no reception data yet".
    /// The feedback packet is omitted entirely when `cast_feedback` is
    /// `None`, and the event log when `events` is empty.
    pub fn send_rtcp_from_rtp_receiver(
        &mut self,
        now: Instant,
        cast_feedback: Option<&CastFeedback>,
        events: &[ReceiverEvent],
        stats: Option<&mut dyn ReceiverStatistics>,
    ) -> bool {
        let mut report = ReceiverReport {
            ssrc: self.local_ssrc,
            report_blocks: Vec::new(),
        };

        if let Some(stats) = stats {
            let stats = stats.statistics();

            let (last_sender_report, delay) = match &self.last_received_sender_report {
                Some(sr) => (
                    sr.ntp_timestamp.truncated(),
                    ntp::to_ntp_diff(now.saturating_duration_since(sr.arrival)),
                ),
                None => (0, 0),
            };

            report.report_blocks.push(ReportBlock {
                ssrc: self.remote_ssrc,
                fraction_lost: stats.fraction_lost,
                cumulative_lost: stats.cumulative_lost,
                extended_highest_sequence: stats.extended_highest_sequence,
                jitter: stats.jitter,
                last_sender_report,
                delay_since_last_sender_report: delay,
            });
        }

        let mut buf = BytesMut::with_capacity(128);
        report.encode(&mut buf);

        if let Some(message) = cast_feedback {
            encode_cast_feedback(&mut buf, self.local_ssrc, message);
        }

        if !events.is_empty() {
            encode_receiver_log(&mut buf, self.local_ssrc, events);
        }

        self.transport.send_rtcp_packet(self.local_ssrc, &buf)
    }

    /// Ingest one incoming RTCP datagram.
    ///
    /// Malformed datagrams are dropped without touching any state, packets
    /// from an unexpected ssrc are filtered, and the registered handlers are
    /// invoked for whatever remains.
    pub fn incoming_rtcp_packet(&mut self, now: Instant, datagram: &[u8]) {
        let packets = match parse_compound(datagram) {
            Ok(packets) => packets,
            Err(e) => {
                log::warn!("dropping malformed RTCP datagram, {e}");
                return;
            }
        };

        for packet in packets {
            match packet {
                RtcpPacket::SenderReport(sr) => {
                    if sr.ssrc != self.remote_ssrc {
                        log::debug!("ignoring sender report from {:?}", sr.ssrc);
                        continue;
                    }

                    self.last_received_sender_report = Some(SenderReportInfo {
                        ntp_timestamp: NtpTimestamp::from_fixed_u64(sr.ntp_timestamp),
                        rtp_timestamp: sr.rtp_timestamp,
                        arrival: now,
                    });

                    for block in &sr.report_blocks {
                        self.handle_report_block(now, block);
                    }
                }
                RtcpPacket::ReceiverReport(rr) => {
                    if rr.ssrc != self.remote_ssrc {
                        log::debug!("ignoring receiver report from {:?}", rr.ssrc);
                        continue;
                    }

                    for block in &rr.report_blocks {
                        self.handle_report_block(now, block);
                    }
                }
                RtcpPacket::CastFeedback {
                    sender_ssrc,
                    message,
                } => {
                    if sender_ssrc != self.remote_ssrc || message.media_ssrc != self.local_ssrc {
                        log::debug!(
                            "ignoring cast feedback from {sender_ssrc:?} about {:?}",
                            message.media_ssrc
                        );
                        continue;
                    }

                    if let Some(handler) = &mut self.cast_feedback_handler {
                        handler.on_cast_feedback(&message);
                    }
                }
                RtcpPacket::ReceiverLog { ssrc, events } => {
                    if ssrc != self.remote_ssrc {
                        log::debug!("ignoring receiver log from {ssrc:?}");
                        continue;
                    }

                    if let Some(handler) = &mut self.receiver_log_handler {
                        handler.on_receiver_log(&events);
                    }
                }
            }
        }
    }

    fn handle_report_block(&mut self, now: Instant, block: &ReportBlock) {
        if block.ssrc != self.local_ssrc {
            // report about some other stream on a shared transport
            return;
        }

        if block.last_sender_report == 0 {
            // the peer has not seen a sender report of ours yet
            return;
        }

        let Some(&(_, sent_at)) = self
            .sent_reports
            .iter()
            .find(|(lsr, _)| *lsr == block.last_sender_report)
        else {
            log::debug!(
                "report block echoes unknown sender report timestamp {:#x}",
                block.last_sender_report
            );
            return;
        };

        let round_trip = now.saturating_duration_since(sent_at);
        let receiver_delay = ntp::ntp_diff_to_duration(block.delay_since_last_sender_report);
        let rtt = round_trip.saturating_sub(receiver_delay);

        self.rtt.update(rtt);

        if let Some(handler) = &mut self.rtt_handler {
            if let Some(report) = self.rtt.report() {
                handler.on_rtt_update(report);
            }
        }
    }

    fn save_sent_report(&mut self, truncated_ntp: u32, now: Instant) {
        self.sent_reports.push_back((truncated_ntp, now));

        while self.sent_reports.len() > MAX_UNACKED_SENDER_REPORTS {
            self.sent_reports.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const LOCAL: Ssrc = Ssrc(0x10203);
    const REMOTE: Ssrc = Ssrc(0x40506);

    /// Captures everything a session sends.
    #[derive(Default)]
    struct CaptureTransport {
        sent: Rc<RefCell<Vec<Vec<u8>>>>,
    }

    impl PacketTransport for CaptureTransport {
        fn send_rtcp_packet(&mut self, _ssrc: Ssrc, packet: &[u8]) -> bool {
            self.sent.borrow_mut().push(packet.to_vec());
            true
        }
    }

    fn capture_session() -> (RtcpSession, Rc<RefCell<Vec<Vec<u8>>>>) {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let transport = CaptureTransport { sent: sent.clone() };

        (
            RtcpSession::new(LOCAL, REMOTE, Box::new(transport)),
            sent,
        )
    }

    #[test]
    fn malformed_datagrams_are_dropped_without_state_changes() {
        let (mut session, _) = capture_session();

        session.incoming_rtcp_packet(Instant::now(), &[0xff; 40]);
        session.incoming_rtcp_packet(Instant::now(), &[0x80]);
        session.incoming_rtcp_packet(Instant::now(), &[]);

        assert_eq!(session.rtt(), None);
        assert_eq!(session.last_received_sender_report(), None);
    }

    #[test]
    fn sender_reports_from_unknown_ssrcs_are_filtered() {
        let (mut session, _) = capture_session();

        let report = SenderReport {
            ssrc: Ssrc(0x999),
            ntp_timestamp: NtpTimestamp::from_instant(Instant::now()).to_fixed_u64(),
            rtp_timestamp: RtpTimestamp(1),
            packet_count: 1,
            octet_count: 1,
            report_blocks: Vec::new(),
        };

        let mut buf = BytesMut::new();
        report.encode(&mut buf);
        session.incoming_rtcp_packet(Instant::now(), &buf);

        assert_eq!(session.last_received_sender_report(), None);
    }

    #[test]
    fn reduced_size_receiver_report_has_no_report_block() {
        let (mut session, sent) = capture_session();

        assert!(session.send_rtcp_from_rtp_receiver(Instant::now(), None, &[], None));

        let sent = sent.borrow();
        let packets = parse_compound(&sent[0]).unwrap();
        let [RtcpPacket::ReceiverReport(rr)] = packets.as_slice() else {
            panic!("expected a lone receiver report, got {packets:?}");
        };
        assert_eq!(rr.ssrc, LOCAL);
        assert!(rr.report_blocks.is_empty());
    }

    #[test]
    fn unmatched_report_block_echo_produces_no_sample() {
        let (mut session, _) = capture_session();

        let report = ReceiverReport {
            ssrc: REMOTE,
            report_blocks: vec![ReportBlock {
                ssrc: LOCAL,
                fraction_lost: 0,
                cumulative_lost: 0,
                extended_highest_sequence: 0,
                jitter: 0,
                last_sender_report: 0x1234_5678,
                delay_since_last_sender_report: 0,
            }],
        };

        let mut buf = BytesMut::new();
        report.encode(&mut buf);
        session.incoming_rtcp_packet(Instant::now(), &buf);

        assert_eq!(session.rtt(), None);
    }
}
