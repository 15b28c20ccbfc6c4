use crate::clock::Clock;
use crate::seq::Seq;
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use tokio::select;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tracing::trace;

/// One cancellable deadline per reliable sequence number, fired by a single
/// scheduling loop.
///
/// Entries live in a min-heap keyed by deadline; cancellation does not touch
/// the heap. Instead, every `schedule` stamps the sequence with a fresh
/// arming id in a side map, and a popped heap entry only fires if its id is
/// still the armed one. Cancelled and superseded entries drain out of the
/// heap as harmless no-ops.
///
/// Expirations are delivered over an mpsc channel rather than as inline
/// callbacks, so the consumer re-acquires whatever lock it needs before
/// acting - a sequence acknowledged between expiry and consumption is
/// filtered there a second time.
pub struct TimerService {
    clock: Arc<Clock>,
    state: Mutex<TimerState>,
    rearm: Notify,
    expired_tx: mpsc::UnboundedSender<Seq>,
}

struct TimerState {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    /// seq -> arming id of the live deadline; absent means not armed
    armed: FxHashMap<u16, u64>,
    next_arming_id: u64,
}

/// Ordered by deadline, then sequence number - simultaneous deadlines fire
/// in ascending sequence order.
#[derive(Eq, PartialEq, Ord, PartialOrd)]
struct HeapEntry {
    deadline_ms: u64,
    seq_raw: u16,
    arming_id: u64,
}

impl TimerService {
    pub fn new(clock: Arc<Clock>) -> (Arc<TimerService>, mpsc::UnboundedReceiver<Seq>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();

        let service = Arc::new(TimerService {
            clock,
            state: Mutex::new(TimerState {
                heap: BinaryHeap::new(),
                armed: FxHashMap::default(),
                next_arming_id: 0,
            }),
            rearm: Notify::new(),
            expired_tx,
        });

        (service, expired_rx)
    }

    /// Arm (or re-arm) the deadline for `seq`. A previously armed deadline
    /// for the same sequence is superseded.
    pub fn schedule(&self, seq: Seq, deadline_ms: u64) {
        {
            let mut state = self.state.lock().expect("timer lock poisoned");
            let arming_id = state.next_arming_id;
            state.next_arming_id += 1;
            state.armed.insert(seq.to_raw(), arming_id);
            state.heap.push(Reverse(HeapEntry {
                deadline_ms,
                seq_raw: seq.to_raw(),
                arming_id,
            }));
        }
        self.rearm.notify_one();
    }

    /// Disarm the deadline for `seq`. After this returns, no expiration for
    /// the cancelled arming will ever be emitted.
    pub fn cancel(&self, seq: Seq) {
        let mut state = self.state.lock().expect("timer lock poisoned");
        state.armed.remove(&seq.to_raw());
    }

    pub fn cancel_all(&self) {
        let mut state = self.state.lock().expect("timer lock poisoned");
        state.armed.clear();
        state.heap.clear();
    }

    pub fn armed_count(&self) -> usize {
        self.state.lock().expect("timer lock poisoned").armed.len()
    }

    /// The scheduling loop. Runs until the owning task is aborted.
    pub async fn run(self: Arc<Self>) {
        loop {
            let next_deadline = self.fire_due();

            match next_deadline {
                Some(deadline_ms) => {
                    select! {
                        _ = tokio::time::sleep_until(self.clock.instant_at(deadline_ms)) => {}
                        _ = self.rearm.notified() => {}
                    }
                }
                None => self.rearm.notified().await,
            }
        }
    }

    /// Emit every due, still-armed expiration; returns the next pending
    /// deadline, if any.
    fn fire_due(&self) -> Option<u64> {
        let mut state = self.state.lock().expect("timer lock poisoned");
        let now = self.clock.now_ms();

        while let Some(Reverse(entry)) = state.heap.peek() {
            if entry.deadline_ms > now {
                break;
            }
            let entry = state.heap.pop().expect("peeked just above").0;

            if state.armed.get(&entry.seq_raw) == Some(&entry.arming_id) {
                state.armed.remove(&entry.seq_raw);
                trace!("timer expired for seq {}", entry.seq_raw);
                // receiver dropped means the endpoint is shutting down
                let _ = self.expired_tx.send(Seq::from_raw(entry.seq_raw));
            }
        }

        state.heap.peek().map(|entry| entry.0.deadline_ms)
    }
}
