use anyhow::bail;
use std::net::SocketAddr;
use std::time::Duration;

/// Process-local transport configuration. There is no negotiation with the
/// peer - both endpoints are expected to run with compatible settings, which
/// is the natural deployment for a game client/server pair under shared
/// administration.
pub struct GameNetConfig {
    pub local_addr: SocketAddr,

    /// The single remote endpoint this one exchanges traffic with. Without a
    /// peer the endpoint is receive-only and `send` fails.
    pub peer_addr: Option<SocketAddr>,

    /// Maximum number of unacknowledged reliable packets inflight at a time.
    ///
    /// This bounds the sender's buffer and, transitively, the forward gap the
    /// receiver can ever observe, so it also bounds the reorder buffer. It
    /// must stay well below half the 16-bit sequence space for modular
    /// comparisons to be unambiguous.
    pub send_window: usize,

    /// How long a missing sequence number may block in-order delivery before
    /// the receiver gives up on it and advances past the gap. This is the
    /// latency/completeness trade-off knob: shorter values keep delivery
    /// fresh, longer values give retransmits more time to fill the hole.
    pub skip_timeout: Duration,

    /// Retransmission timeout before any RTT sample has been taken.
    pub rto_initial: Duration,
    pub rto_min: Duration,
    pub rto_max: Duration,

    /// Retransmits of one sequence before the sender abandons it. The
    /// receiver's skip policy advances past abandoned sequences on its own.
    pub max_retries: u32,

    /// Socket read timeout of the receive loop. This doubles as the tick
    /// granularity for the skip policy during idle periods.
    pub recv_idle_timeout: Duration,

    /// Number of sequences above the cumulative ack a SACK bitmap can carry.
    /// Eight bitmap bytes on the wire, so at most 64.
    pub sack_width: u16,

    /// Payloads queued beyond the send window before `send` reports
    /// backpressure to the caller.
    pub pending_queue_limit: usize,
}

impl GameNetConfig {
    pub fn new(local_addr: SocketAddr, peer_addr: Option<SocketAddr>) -> GameNetConfig {
        GameNetConfig {
            local_addr,
            peer_addr,
            send_window: 64,
            skip_timeout: Duration::from_millis(200),
            rto_initial: Duration::from_millis(500),
            rto_min: Duration::from_millis(100),
            rto_max: Duration::from_millis(2000),
            max_retries: 16,
            recv_idle_timeout: Duration::from_millis(50),
            sack_width: 64,
            pending_queue_limit: 1024,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.send_window == 0 {
            bail!("send window must be at least 1");
        }
        if self.send_window >= 1 << 15 {
            bail!("send window of {} is too large for 16-bit modular sequence comparison", self.send_window);
        }
        if self.sack_width == 0 || self.sack_width > 64 {
            bail!("SACK width of {} is outside the wire format's range of 1..=64", self.sack_width);
        }
        if self.rto_min > self.rto_max {
            bail!("RTO bounds are inverted: min {:?} > max {:?}", self.rto_min, self.rto_max);
        }
        if self.skip_timeout.is_zero() {
            bail!("skip timeout must be non-zero");
        }
        Ok(())
    }
}
