use crate::feedback::{CastFeedback, ReceiverEvent};
use crate::rtt::RttReport;
use crate::Ssrc;

/// Outgoing packet sink, typically shared by the RTP and RTCP sides of a
/// transport channel.
pub trait PacketTransport {
    /// Queue a serialized RTCP compound for delivery. Fire-and-forget:
    /// returning `true` means accepted for sending, not delivered. A `false`
    /// return means the transport declined the packet; the session does not
    /// retry on its own.
    fn send_rtcp_packet(&mut self, ssrc: Ssrc, packet: &[u8]) -> bool;
}

/// Reception quality counters for one incoming RTP stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceptionStats {
    /// Fraction of packets lost since the previous report, as a 8-bit
    /// fixed-point value (255 = 100%).
    pub fraction_lost: u8,
    pub cumulative_lost: u32,
    pub extended_highest_sequence: u32,
    /// Interarrival jitter in media clock units.
    pub jitter: u32,
}

/// Supplies [`ReceptionStats`] for the report block of an outgoing receiver
/// report. Implemented by the RTP receiver; absent while no RTP has been
/// received yet.
pub trait ReceiverStatistics {
    fn statistics(&mut self) -> ReceptionStats;
}

/// Receives decoded Cast feedback messages, once per message that survived
/// the network.
pub trait CastFeedbackHandler {
    fn on_cast_feedback(&mut self, message: &CastFeedback);
}

/// Receives a fresh [`RttReport`] each time a report echo completes a
/// measurement. Not invoked for intervals in which the echo was lost.
pub trait RttHandler {
    fn on_rtt_update(&mut self, report: RttReport);
}

/// Receives the receiver event log carried in incoming receiver reports.
pub trait ReceiverLogHandler {
    fn on_receiver_log(&mut self, events: &[ReceiverEvent]);
}
