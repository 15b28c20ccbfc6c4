use crate::seq::Seq;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One message handed to the application, in the order the transport decided
/// on: reliable records in sequence order (modulo skips), unreliable records
/// in arrival order.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct DeliveryRecord {
    /// the sender-assigned sequence number for reliable records, `None` for
    /// unreliable ones
    pub seq: Option<Seq>,
    /// the sender's clock at emission - latency and jitter math is the
    /// application's business
    pub ts_ms: u32,
    pub payload: Vec<u8>,
}

/// The FIFO between the receive worker and the application. Pushes come from
/// the worker, pops from whatever thread calls `receive()` - both sides only
/// ever hold the lock for one queue operation.
#[derive(Default)]
pub struct DeliveryQueue {
    queue: Mutex<VecDeque<DeliveryRecord>>,
}

impl DeliveryQueue {
    pub fn push(&self, record: DeliveryRecord) {
        self.queue.lock()
            .expect("delivery queue lock poisoned")
            .push_back(record);
    }

    pub fn pop(&self) -> Option<DeliveryRecord> {
        self.queue.lock()
            .expect("delivery queue lock poisoned")
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock()
            .expect("delivery queue lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = DeliveryQueue::default();
        for i in 0..3u16 {
            queue.push(DeliveryRecord {
                seq: Some(Seq::from_raw(i)),
                ts_ms: i as u32,
                payload: vec![i as u8],
            });
        }

        assert_eq!(queue.len(), 3);
        for i in 0..3u16 {
            assert_eq!(queue.pop().unwrap().seq, Some(Seq::from_raw(i)));
        }
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_empty_pop_is_none() {
        let queue = DeliveryQueue::default();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(), None);
    }
}
