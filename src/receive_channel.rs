use crate::clock::Clock;
use crate::config::GameNetConfig;
use crate::delivery::{DeliveryQueue, DeliveryRecord};
use crate::packet_header::{Channel, PacketHeader};
use crate::sack::SackFrame;
use crate::send_pipeline::SendPipeline;
use crate::seq::Seq;
use crate::stats::TransportStats;
use rustc_hash::FxHashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

struct ReorderEntry {
    payload: Vec<u8>,
    ts_ms: u32,
    received_ms: u64,
}

struct ReceiveChannelInner {
    config: Arc<GameNetConfig>,
    clock: Arc<Clock>,
    pipeline: Arc<SendPipeline>,
    delivery: Arc<DeliveryQueue>,
    stats: Arc<TransportStats>,

    /// the lowest reliable sequence not yet handed to the application
    next_expected: Seq,
    /// out-of-order arrivals waiting for the gap below them to fill or be
    /// skipped. Bounded by the peer's send window.
    reorder_buffer: FxHashMap<Seq, ReorderEntry>,
    /// Armed whenever the reorder buffer holds packets above a gap. When it
    /// passes, `next_expected` advances by one regardless of whether the
    /// missing packet ever shows up - sequences sacrificed this way are
    /// gone for good, later copies are dropped as duplicates.
    skip_deadline: Option<u64>,
    skipped: Vec<Seq>,
}

impl ReceiveChannelInner {
    fn skip_timeout_ms(&self) -> u64 {
        self.config.skip_timeout.as_millis() as u64
    }

    /// hand every contiguous buffered sequence starting at `next_expected`
    /// to the delivery queue
    fn deliver_ready(&mut self, now: u64) {
        while let Some(entry) = self.reorder_buffer.remove(&self.next_expected) {
            trace!("delivering reliable seq {} (buffered for {} ms)", self.next_expected, now.saturating_sub(entry.received_ms));
            self.delivery.push(DeliveryRecord {
                seq: Some(self.next_expected),
                ts_ms: entry.ts_ms,
                payload: entry.payload,
            });
            self.stats.count_reliable_delivered();
            self.next_expected = self.next_expected.next();
        }
    }

    /// A gap left in the buffer gets a fresh skip budget; an empty buffer
    /// needs no deadline.
    fn rearm_or_clear_skip(&mut self, now: u64) {
        if self.reorder_buffer.is_empty() {
            self.skip_deadline = None;
        }
        else {
            self.skip_deadline = Some(now + self.skip_timeout_ms());
        }
    }

    /// The skip policy: once the deadline for the gap at `next_expected` has
    /// passed, advance past it - one sequence per evaluation - and deliver
    /// whatever that unblocks.
    fn evaluate_skip(&mut self, now: u64) {
        let Some(deadline) = self.skip_deadline else {
            return;
        };
        if now < deadline {
            return;
        }
        if self.reorder_buffer.contains_key(&self.next_expected) {
            // the gap filled in the meantime; contiguous delivery owns this
            return;
        }

        let skipped = self.next_expected;
        debug!("skip deadline passed - giving up on missing seq {} for liveness", skipped);
        self.next_expected = skipped.next();
        self.skipped.push(skipped);
        self.stats.count_skip();

        self.deliver_ready(now);
        self.rearm_or_clear_skip(now);
    }

    /// SACK the peer with the post-delivery state: cumulative ack just below
    /// `next_expected`, bitmap covering everything still buffered above it.
    async fn emit_sack(&self, to: SocketAddr) {
        let sack = SackFrame::for_buffered(
            self.next_expected,
            self.reorder_buffer.keys().copied(),
            self.config.sack_width,
        );

        let mut frame = Vec::with_capacity(PacketHeader::SERIALIZED_LEN + sack.bitmap.len());
        PacketHeader::new(Channel::Sack, sack.cum_ack, self.clock.wire_now()).ser(&mut frame);
        sack.ser_payload(&mut frame);

        trace!("sending SACK to {:?}: cum_ack {} + {} bitmap bytes", to, sack.cum_ack, sack.bitmap.len());
        self.pipeline.do_send_packet(to, &frame).await;
        self.stats.count_sack_sent();
    }
}

/// The reliable channel's receive half: deduplication, reordering, SACK
/// feedback, and the skip policy that bounds head-of-line blocking.
pub struct ReceiveChannel {
    inner: Arc<RwLock<ReceiveChannelInner>>,
}

impl ReceiveChannel {
    pub fn new(
        config: Arc<GameNetConfig>,
        clock: Arc<Clock>,
        pipeline: Arc<SendPipeline>,
        delivery: Arc<DeliveryQueue>,
        stats: Arc<TransportStats>,
    ) -> ReceiveChannel {
        let inner = ReceiveChannelInner {
            config,
            clock,
            pipeline,
            delivery,
            stats,
            next_expected: Seq::ZERO,
            reorder_buffer: FxHashMap::default(),
            skip_deadline: None,
            skipped: Vec::new(),
        };

        ReceiveChannel {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// A reliable data frame arrived. Every call answers with a SACK - that
    /// includes duplicates, so a peer retransmitting into the void gets told
    /// to stop quickly.
    pub async fn on_data(&self, seq: Seq, ts_ms: u32, payload: &[u8], from: SocketAddr) {
        let mut inner = self.inner.write().await;
        let now = inner.clock.now_ms();

        if seq.is_before(inner.next_expected) {
            trace!("seq {} is below next expected {} - already delivered or skipped, dropping", seq, inner.next_expected);
            inner.stats.count_duplicate_dropped();
        }
        else if seq == inner.next_expected {
            inner.reorder_buffer.insert(seq, ReorderEntry {
                payload: payload.to_vec(),
                ts_ms,
                received_ms: now,
            });
            inner.deliver_ready(now);
            inner.rearm_or_clear_skip(now);
        }
        else if inner.reorder_buffer.contains_key(&seq) {
            trace!("seq {} is already buffered - dropping duplicate", seq);
            inner.stats.count_duplicate_dropped();
        }
        else {
            debug!("seq {} is ahead of expected {} - buffering", seq, inner.next_expected);
            inner.reorder_buffer.insert(seq, ReorderEntry {
                payload: payload.to_vec(),
                ts_ms,
                received_ms: now,
            });
            if inner.skip_deadline.is_none() {
                let deadline = now + inner.skip_timeout_ms();
                inner.skip_deadline = Some(deadline);
            }
        }

        inner.evaluate_skip(now);
        inner.emit_sack(from).await;
    }

    /// The receive loop's idle tick: the only time source for the skip
    /// policy when no traffic arrives.
    pub async fn on_idle_tick(&self) {
        let mut inner = self.inner.write().await;
        if inner.skip_deadline.is_none() {
            return;
        }
        let now = inner.clock.now_ms();
        inner.evaluate_skip(now);
    }

    /// sequence numbers the skip policy has given up on, oldest first
    pub async fn skipped(&self) -> Vec<Seq> {
        self.inner.read().await.skipped.clone()
    }
}
