//! # RTCP session engine
//!
//! This crate implements the RTCP control channel used between a media
//! sender and receiver pair: sender/receiver reports, round-trip-time
//! estimation from the LSR/DLSR echo, and the Cast-style feedback extension
//! carrying frame ACKs and missing-packet NACKs.
//!
//! [`RtcpSession`] is the top level type. It is sans-io: it never blocks,
//! spawns nothing and owns no timers. Outgoing packets are handed to a
//! [`PacketTransport`] supplied by the owner, incoming datagrams are pushed
//! in via [`RtcpSession::incoming_rtcp_packet`], and every time-dependent
//! call takes the current `Instant` explicitly so the owning pipeline stays
//! in control of the clock.

use std::fmt;

mod feedback;
mod frame_id;
mod ntp;
mod rtt;
mod session;
mod transport;
pub mod wire;

pub use feedback::{CastFeedback, CastFeedbackTracker, ReceiverEvent, ReceiverEventKind};
pub use frame_id::{FrameId, PacketId};
pub use ntp::NtpTimestamp;
pub use rtt::{RttEstimator, RttReport};
pub use session::{RtcpSession, SenderReportInfo};
pub use transport::{
    CastFeedbackHandler, PacketTransport, ReceiverLogHandler, ReceiverStatistics, ReceptionStats,
    RttHandler,
};

/// Synchronization source identifier of an RTP/RTCP endpoint.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ssrc(pub u32);

impl fmt::Debug for Ssrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ssrc({:#x})", self.0)
    }
}

/// Timestamp in the media clock domain, as carried in sender reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RtpTimestamp(pub u32);
