use crate::clock::Clock;
use crate::config::GameNetConfig;
use crate::packet_header::{Channel, PacketHeader};
use crate::rto::RtoEstimator;
use crate::sack::SackFrame;
use crate::send_pipeline::SendPipeline;
use crate::seq::Seq;
use crate::stats::TransportStats;
use crate::timer::TimerService;
use anyhow::bail;
use bytes::BufMut;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

struct SendBufferEntry {
    /// the serialized frame; retransmits re-emit these bytes verbatim, so
    /// the wire timestamp is the original emission time
    frame: Vec<u8>,
    first_sent_ms: u64,
    last_sent_ms: u64,
    retries: u32,
}

struct SendChannelInner {
    config: Arc<GameNetConfig>,
    clock: Arc<Clock>,
    timers: Arc<TimerService>,
    pipeline: Arc<SendPipeline>,
    peer_addr: SocketAddr,
    stats: Arc<TransportStats>,

    /// next reliable sequence number to assign
    next_seq: Seq,
    /// seq -> unacknowledged frame. Its key set mirrors the armed retransmit
    /// timers, and its size is the inflight count bounded by the send window.
    send_buffer: FxHashMap<Seq, SendBufferEntry>,
    /// payloads waiting for a window slot, oldest first
    pending: VecDeque<Vec<u8>>,
    rto: RtoEstimator,
}

impl SendChannelInner {
    fn inflight_count(&self) -> usize {
        self.send_buffer.len()
    }

    /// Assign the next sequence, emit the frame, and arm its retransmit
    /// timer. Precondition: a window slot is free.
    async fn send_one_reliable(&mut self, payload: Vec<u8>) {
        let seq = self.next_seq;
        self.next_seq = seq.next();

        let now = self.clock.now_ms();
        let mut frame = Vec::with_capacity(PacketHeader::SERIALIZED_LEN + payload.len());
        PacketHeader::new(Channel::ReliableData, seq, now as u32).ser(&mut frame);
        frame.put_slice(&payload);

        trace!("sending reliable seq {} ({} payload bytes) to {:?}", seq, payload.len(), self.peer_addr);
        self.pipeline.do_send_packet(self.peer_addr, &frame).await;

        self.timers.schedule(seq, now + self.rto.rto_ms());
        self.send_buffer.insert(seq, SendBufferEntry {
            frame,
            first_sent_ms: now,
            last_sent_ms: now,
            retries: 0,
        });
        self.stats.count_reliable_sent();
    }

    /// one queued payload per free window slot
    async fn fill_window_from_pending(&mut self) {
        while self.inflight_count() < self.config.send_window {
            let Some(payload) = self.pending.pop_front() else {
                break;
            };
            self.send_one_reliable(payload).await;
        }
    }

    fn ack_one(&mut self, seq: Seq, now: u64) {
        let Some(entry) = self.send_buffer.remove(&seq) else {
            return; // duplicate or late ack
        };
        self.timers.cancel(seq);

        // Karn's rule: only a sequence that was sent exactly once yields an
        //  unambiguous round-trip sample
        if entry.retries == 0 {
            self.rto.on_sample(now.saturating_sub(entry.first_sent_ms));
        }
        trace!("seq {} acknowledged ({} retransmits)", seq, entry.retries);
    }
}

/// The reliable channel's send half: windowed admission, per-sequence
/// retransmit timers, and SACK-driven cleanup.
pub struct SendChannel {
    config: Arc<GameNetConfig>,
    inner: Arc<RwLock<SendChannelInner>>,
}

impl SendChannel {
    pub fn new(
        config: Arc<GameNetConfig>,
        clock: Arc<Clock>,
        timers: Arc<TimerService>,
        pipeline: Arc<SendPipeline>,
        peer_addr: SocketAddr,
        stats: Arc<TransportStats>,
    ) -> SendChannel {
        let rto = RtoEstimator::new(config.rto_initial, config.rto_min, config.rto_max);

        let inner = SendChannelInner {
            config: config.clone(),
            clock,
            timers,
            pipeline,
            peer_addr,
            stats,
            next_seq: Seq::ZERO,
            send_buffer: FxHashMap::default(),
            pending: VecDeque::new(),
            rto,
        };

        SendChannel {
            config,
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    pub async fn inflight_count(&self) -> usize {
        self.inner.read().await.inflight_count()
    }

    /// Send a payload on the reliable channel, or queue it if the window is
    /// full. Fails only when the pending queue has hit its configured cap.
    pub async fn send_reliable(&self, payload: Vec<u8>) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;

        if inner.inflight_count() < self.config.send_window {
            inner.send_one_reliable(payload).await;
            return Ok(());
        }

        if inner.pending.len() >= self.config.pending_queue_limit {
            bail!("send window full and pending queue at its cap of {} payloads", self.config.pending_queue_limit);
        }
        trace!("send window full - queueing payload ({} already pending)", inner.pending.len());
        inner.pending.push_back(payload);
        Ok(())
    }

    /// Consume a SACK: cancel timers and free window slots for everything it
    /// acknowledges, then fill freed slots from the pending queue.
    pub async fn on_sack(&self, sack: SackFrame) {
        let mut inner = self.inner.write().await;
        let now = inner.clock.now_ms();
        trace!("received SACK from {:?}: cum_ack {} + {} bitmap bytes", inner.peer_addr, sack.cum_ack, sack.bitmap.len());

        let cum_acked = inner.send_buffer.keys()
            .copied()
            .filter(|seq| seq.is_at_or_before(sack.cum_ack))
            .collect::<Vec<_>>();
        for seq in cum_acked {
            inner.ack_one(seq, now);
        }

        for seq in sack.bitmap_acked() {
            inner.ack_one(seq, now);
        }

        inner.fill_window_from_pending().await;
    }

    /// Retransmit-timer expiry for `seq`. A sequence acknowledged since the
    /// timer fired is a no-op; one that exhausted its retry budget is
    /// abandoned, freeing its window slot.
    pub async fn on_timer_expired(&self, seq: Seq) {
        let mut inner = self.inner.write().await;
        let now = inner.clock.now_ms();

        if !inner.send_buffer.contains_key(&seq) {
            trace!("retransmit timer fired for seq {} which is no longer inflight - ignoring", seq);
            return;
        }

        let exhausted = inner.send_buffer.get(&seq)
            .map(|entry| entry.retries >= inner.config.max_retries)
            .unwrap_or(false);
        if exhausted {
            if let Some(entry) = inner.send_buffer.remove(&seq) {
                warn!("seq {}: no ack after {} retransmits - abandoning the packet", seq, entry.retries);
            }
            inner.timers.cancel(seq);
            inner.stats.count_retry_exhausted();
            inner.fill_window_from_pending().await;
            return;
        }

        let (frame, retries) = {
            let entry = inner.send_buffer.get_mut(&seq).expect("checked just above");
            entry.retries += 1;
            entry.last_sent_ms = now;
            (entry.frame.clone(), entry.retries)
        };

        debug!("seq {} timed out - retransmitting (retry {})", seq, retries);
        inner.stats.count_retransmit();
        inner.timers.schedule(seq, now + inner.rto.backoff_ms(retries));
        let peer_addr = inner.peer_addr;
        inner.pipeline.do_send_packet(peer_addr, &frame).await;
    }

    /// Drop all inflight and pending traffic and disarm the timers. Called
    /// on endpoint close; sequence numbering is not reset.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.write().await;

        for seq in inner.send_buffer.keys().copied().collect::<Vec<_>>() {
            inner.timers.cancel(seq);
        }
        let dropped_inflight = inner.send_buffer.len();
        let dropped_pending = inner.pending.len();
        inner.send_buffer.clear();
        inner.pending.clear();

        if dropped_inflight + dropped_pending > 0 {
            debug!("shutdown discarded {} inflight and {} pending payloads", dropped_inflight, dropped_pending);
        }
    }
}
