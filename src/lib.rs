//! A dual-channel game transport layered directly on UDP, providing a
//!  reliable in-order channel next to a fire-and-forget channel between one
//!  pair of endpoints.
//!
//! ## Design goals
//!
//! * The abstraction is sending / receiving *messages* (defined-length chunks
//!   of data as opposed to streams of bytes)
//! * Two channels over one socket, chosen per message:
//!   * the reliable channel retransmits selectively (only unacknowledged
//!     sequences are re-sent), delivers in order, and delivers each sequence
//!     at most once
//!   * the unreliable channel stamps and sends - no retransmission, no
//!     ordering, no deduplication
//! * Bounded head-of-line blocking on the reliable channel: a missing
//!   sequence number may hold up delivery for at most a configured skip
//!   timeout, after which the receiver advances past it. This protocol is
//!   designed for skipping stale state and continuing with fresh data rather
//!   than maximising delivery reliability at the cost of latency - a game
//!   snapshot that arrives late is worth less than the one behind it.
//! * Acknowledgment is selective: every received data frame is answered with
//!   a cumulative ack plus a bitmap of sequences already buffered above it,
//!   so a single ack loss does not trigger spurious retransmits
//! * Retransmission timeouts adapt to the measured round trip (Jacobson's
//!   EWMA, clamped), with per-sequence timers and exponential backoff
//! * A fixed send window bounds the sender's buffer and the receiver's
//!   reorder buffer; payloads beyond the window queue up behind it
//! * No connection handshake: endpoints are constructed bound and ready, and
//!   all configuration is process-local
//!
//! ## Header
//!
//! Every frame starts with the same seven bytes - all numbers in network
//!  byte order (BE):
//!
//! ```ascii
//! 0: channel tag (u8):
//!    * 0x01 reliable data
//!    * 0x02 unreliable data
//!    * 0x03 SACK
//! 1: sequence number (u16): the reliable sequence for data frames, the
//!     emission counter for unreliable frames, the cumulative ack for SACKs
//! 3: timestamp (u32): the sender's monotonic clock at emission,
//!     milliseconds truncated to 32 bits
//! 7: payload
//! ```
//!
//! Sequence numbers live in a 16-bit wrapping space; all comparisons are
//!  modular, with `a < b` iff the forward distance from `a` to `b` is below
//!  half the space. Windows are required to stay far below that bound.
//!
//! ## SACK
//!
//! The SACK payload is a bitmap of at most eight bytes: bit `i` of byte `j`
//!  acknowledges sequence `cum_ack + 1 + 8*j + i`. The cumulative ack itself
//!  rides in the header's sequence field, and an empty bitmap is a valid
//!  cum-only acknowledgment.
//!
//! A receiver answers *every* reliable data frame with a SACK describing its
//!  state after processing that frame - duplicates included, so a sender
//!  retransmitting something already delivered is silenced after one round
//!  trip.
//!
//! ## Skipping
//!
//! When an out-of-order frame is buffered, the receiver arms a skip deadline.
//!  If the gap below the buffer has not filled by then, the receiver
//!  advances `next_expected` by one - a single sequence per tick - delivers
//!  whatever that unblocks, and re-arms the deadline while a gap remains.
//!  A skipped sequence is permanently lost to the application even if a
//!  retransmit of it arrives later: the duplicate check drops it.
//!
//! The sender gives up on a sequence after a configured number of
//!  retransmits, leaving the receiver's skip policy to step over the
//!  permanent hole.
//!
//! ## Related:
//! * TCP
//!   * cumulative acks and go-back-N-ish recovery; this protocol only ever
//!     re-sends what is actually missing
//!   * unbounded head-of-line blocking - the opposite trade-off to skipping
//! * QUIC
//!   * connection based, enforces encryption, stream multiplexing
//!   * ack ranges are the moral equivalent of the SACK bitmap here
//! * Aeron / UDT
//!   * negative-ack based recovery, optimized for bulk throughput rather
//!     than per-message freshness

pub mod clock;
pub mod config;
pub mod delivery;
pub mod end_point;
pub mod packet_header;
pub mod receive_channel;
pub mod rto;
pub mod sack;
pub mod send_channel;
pub mod send_pipeline;
pub mod seq;
pub mod stats;
pub mod timer;
pub mod unreliable;

pub use config::GameNetConfig;
pub use delivery::DeliveryRecord;
pub use end_point::EndPoint;
pub use seq::Seq;
pub use stats::StatsSnapshot;
