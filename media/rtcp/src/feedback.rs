use crate::frame_id::{FrameId, PacketId};
use crate::{RtpTimestamp, Ssrc};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// Frame/packet acknowledgment state a receiver reports back to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastFeedback {
    /// The media stream this feedback is about (the sender's ssrc).
    pub media_ssrc: Ssrc,
    /// Every frame up to and including this one is acknowledged.
    pub ack_frame_id: FrameId,
    /// Playout delay the receiver is currently applying.
    pub target_delay: Duration,
    /// Frame id to the packet ids still missing from it. An empty set means
    /// the entire frame is missing.
    pub missing_frames_and_packets: HashMap<FrameId, BTreeSet<PacketId>>,
}

/// Receiver-side event shipped to the sender for end-to-end tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverEvent {
    pub rtp_timestamp: RtpTimestamp,
    pub kind: ReceiverEventKind,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverEventKind {
    PacketReceived,
    FrameAckSent,
    FrameDecoded,
    FramePlayedOut,
}

impl ReceiverEventKind {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            ReceiverEventKind::PacketReceived => 1,
            ReceiverEventKind::FrameAckSent => 2,
            ReceiverEventKind::FrameDecoded => 3,
            ReceiverEventKind::FramePlayedOut => 4,
        }
    }

    pub(crate) fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(ReceiverEventKind::PacketReceived),
            2 => Some(ReceiverEventKind::FrameAckSent),
            3 => Some(ReceiverEventKind::FrameDecoded),
            4 => Some(ReceiverEventKind::FramePlayedOut),
            _ => None,
        }
    }
}

/// Accumulates ack and loss state between outgoing receiver reports.
///
/// All recording operations are idempotent and wraparound-aware; anything
/// referring to a frame at or before the current ack is silently ignored.
///
/// Internally a whole-frame loss is kept as a set containing only
/// [`PacketId::ALL_PACKETS`]; [`build_message`](Self::build_message)
/// translates that back into the empty-set form of [`CastFeedback`].
#[derive(Debug, Default)]
pub struct CastFeedbackTracker {
    ack_frame_id: Option<FrameId>,
    missing: HashMap<FrameId, BTreeSet<PacketId>>,
}

impl CastFeedbackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The highest acknowledged frame, or [`FrameId::before_first`] when
    /// nothing has been acked yet.
    pub fn ack_frame_id(&self) -> FrameId {
        self.ack_frame_id.unwrap_or(FrameId::before_first())
    }

    pub fn record_ack(&mut self, frame_id: FrameId) {
        if !frame_id.is_newer_than(self.ack_frame_id()) {
            return;
        }

        self.ack_frame_id = Some(frame_id);
        self.missing.retain(|frame, _| frame.is_newer_than(frame_id));
    }

    /// Record packets missing from `frame_id`. Passing
    /// [`PacketId::ALL_PACKETS`] marks the whole frame as lost, which
    /// supersedes (and is not downgraded by) individual packet ids.
    pub fn record_missing(
        &mut self,
        frame_id: FrameId,
        packet_ids: impl IntoIterator<Item = PacketId>,
    ) {
        if !frame_id.is_newer_than(self.ack_frame_id()) {
            return;
        }

        let mut packet_ids = packet_ids.into_iter().peekable();
        if packet_ids.peek().is_none() {
            return;
        }

        let set = self.missing.entry(frame_id).or_default();
        if set.contains(&PacketId::ALL_PACKETS) {
            return;
        }

        for packet_id in packet_ids {
            if packet_id == PacketId::ALL_PACKETS {
                set.clear();
                set.insert(PacketId::ALL_PACKETS);
                return;
            }

            set.insert(packet_id);
        }
    }

    /// Snapshot the current state into a message; the tracker is unchanged.
    pub fn build_message(&self, media_ssrc: Ssrc, target_delay: Duration) -> CastFeedback {
        let missing_frames_and_packets = self
            .missing
            .iter()
            .map(|(frame, packets)| {
                let packets = if packets.contains(&PacketId::ALL_PACKETS) {
                    BTreeSet::new()
                } else {
                    packets.clone()
                };

                (*frame, packets)
            })
            .collect();

        CastFeedback {
            media_ssrc,
            ack_frame_id: self.ack_frame_id(),
            target_delay,
            missing_frames_and_packets,
        }
    }
}
