//! RTCP wire model: typed packets, big-endian encoders and the compound
//! decoder.
//!
//! Every outgoing transmission is a single compound buffer starting with the
//! sender or receiver report. Decoding is atomic per datagram: one malformed
//! packet rejects the whole buffer without partial results, while packet
//! types this engine does not understand are skipped for forward
//! compatibility.

mod error;
pub mod packet;
pub mod parse;

pub use error::ParseError;
