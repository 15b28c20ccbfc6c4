use crate::clock::Clock;
use crate::delivery::{DeliveryQueue, DeliveryRecord};
use crate::packet_header::{Channel, PacketHeader};
use crate::send_pipeline::SendPipeline;
use crate::seq::Seq;
use crate::stats::TransportStats;
use anyhow::bail;
use bytes::BufMut;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// The fire-and-forget channel: timestamped single-shot datagrams, no
/// buffering, no timers, no ordering. The wrapping counter in the header is
/// for observability on the wire only - the receive side ignores it.
pub struct UnreliableChannel {
    clock: Arc<Clock>,
    pipeline: Arc<SendPipeline>,
    peer_addr: Option<SocketAddr>,
    delivery: Arc<DeliveryQueue>,
    stats: Arc<TransportStats>,
    next_useq: Mutex<Seq>,
}

impl UnreliableChannel {
    pub fn new(
        clock: Arc<Clock>,
        pipeline: Arc<SendPipeline>,
        peer_addr: Option<SocketAddr>,
        delivery: Arc<DeliveryQueue>,
        stats: Arc<TransportStats>,
    ) -> UnreliableChannel {
        UnreliableChannel {
            clock,
            pipeline,
            peer_addr,
            delivery,
            stats,
            next_useq: Mutex::new(Seq::ZERO),
        }
    }

    pub async fn send(&self, payload: &[u8]) -> anyhow::Result<()> {
        let Some(peer_addr) = self.peer_addr else {
            bail!("endpoint has no remote peer - cannot send");
        };

        let useq = {
            let mut next = self.next_useq.lock().expect("unreliable counter lock poisoned");
            let useq = *next;
            *next = next.next();
            useq
        };

        let mut frame = Vec::with_capacity(PacketHeader::SERIALIZED_LEN + payload.len());
        PacketHeader::new(Channel::Unreliable, useq, self.clock.wire_now()).ser(&mut frame);
        frame.put_slice(payload);

        trace!("sending unreliable useq {} ({} payload bytes) to {:?}", useq, payload.len(), peer_addr);
        self.pipeline.do_send_packet(peer_addr, &frame).await;
        self.stats.count_unreliable_sent();
        Ok(())
    }

    /// ingress side: straight to the delivery queue, stamped and unordered
    pub fn on_datagram(&self, ts_ms: u32, payload: &[u8]) {
        self.delivery.push(DeliveryRecord {
            seq: None,
            ts_ms,
            payload: payload.to_vec(),
        });
        self.stats.count_unreliable_delivered();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::send_pipeline::MockSendSocket;
    use tokio::runtime::Builder;

    const PEER: ([u8; 4], u16) = ([127, 0, 0, 1], 9);

    fn channel(mock: MockSendSocket, peer: Option<SocketAddr>) -> (UnreliableChannel, Arc<DeliveryQueue>) {
        let delivery = Arc::new(DeliveryQueue::default());
        let channel = UnreliableChannel::new(
            Arc::new(Clock::new()),
            Arc::new(SendPipeline::new(Arc::new(mock))),
            peer,
            delivery.clone(),
            Arc::new(TransportStats::default()),
        );
        (channel, delivery)
    }

    #[test]
    fn test_send_stamps_counter_and_timestamp() {
        let rt = Builder::new_current_thread().enable_all().start_paused(true).build().unwrap();
        rt.block_on(async {
            let mut mock = MockSendSocket::new();
            let first = vec![2u8, 0, 0, 0, 0, 0, 0, b'a'];
            mock.expect_do_send_packet()
                .once()
                .withf(move |to, buf| to == &SocketAddr::from(PEER) && buf == first.as_slice())
                .return_const(());
            let second = vec![2u8, 0, 1, 0, 0, 0, 0, b'b'];
            mock.expect_do_send_packet()
                .once()
                .withf(move |to, buf| to == &SocketAddr::from(PEER) && buf == second.as_slice())
                .return_const(());

            let (channel, _delivery) = channel(mock, Some(SocketAddr::from(PEER)));
            channel.send(b"a").await.unwrap();
            channel.send(b"b").await.unwrap();
        });
    }

    #[test]
    fn test_send_without_peer_fails() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let (channel, _delivery) = channel(MockSendSocket::new(), None);
            assert!(channel.send(b"a").await.is_err());
        });
    }

    #[test]
    fn test_ingress_enqueues_with_null_seq() {
        let (channel, delivery) = channel(MockSendSocket::new(), None);

        channel.on_datagram(42, b"ping");

        let record = delivery.pop().unwrap();
        assert_eq!(record.seq, None);
        assert_eq!(record.ts_ms, 42);
        assert_eq!(record.payload, b"ping");
    }
}
