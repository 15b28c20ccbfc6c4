use crate::clock::Clock;
use crate::config::GameNetConfig;
use crate::delivery::{DeliveryQueue, DeliveryRecord};
use crate::packet_header::{Channel, PacketHeader};
use crate::receive_channel::ReceiveChannel;
use crate::sack::SackFrame;
use crate::send_channel::SendChannel;
use crate::send_pipeline::SendPipeline;
use crate::stats::{StatsSnapshot, TransportStats};
use crate::timer::TimerService;
use crate::unreliable::UnreliableChannel;
use anyhow::bail;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, span, trace, Level};
use uuid::Uuid;

/// EndPoint is the place where all other parts of the transport come
///  together: it owns the UDP socket, dispatches incoming frames to the
///  per-channel state machines, and has the API for application code to
///  send and receive messages.
///
/// Construction spawns three workers: the receive loop, the timer
///  scheduling loop, and the expiry consumer that turns fired deadlines
///  into retransmits. `close` stops all of them.
pub struct EndPoint {
    config: Arc<GameNetConfig>,
    socket: Arc<UdpSocket>,
    timers: Arc<TimerService>,
    send_channel: Option<Arc<SendChannel>>,
    receive_channel: Arc<ReceiveChannel>,
    unreliable: Arc<UnreliableChannel>,
    delivery: Arc<DeliveryQueue>,
    stats: Arc<TransportStats>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl EndPoint {
    pub async fn bind(config: Arc<GameNetConfig>) -> anyhow::Result<EndPoint> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(config.local_addr).await?);
        info!("bound endpoint socket to {:?}", socket.local_addr()?);
        if let Some(peer_addr) = config.peer_addr {
            info!("peer endpoint is {:?}", peer_addr);
        }

        let clock = Arc::new(Clock::new());
        let pipeline = Arc::new(SendPipeline::new(Arc::new(socket.clone())));
        let delivery = Arc::new(DeliveryQueue::default());
        let stats = Arc::new(TransportStats::default());
        let (timers, expired_rx) = TimerService::new(clock.clone());

        let receive_channel = Arc::new(ReceiveChannel::new(
            config.clone(),
            clock.clone(),
            pipeline.clone(),
            delivery.clone(),
            stats.clone(),
        ));
        let send_channel = config.peer_addr.map(|peer_addr| {
            Arc::new(SendChannel::new(
                config.clone(),
                clock.clone(),
                timers.clone(),
                pipeline.clone(),
                peer_addr,
                stats.clone(),
            ))
        });
        let unreliable = Arc::new(UnreliableChannel::new(
            clock,
            pipeline,
            config.peer_addr,
            delivery.clone(),
            stats.clone(),
        ));

        let end_point = EndPoint {
            config,
            socket,
            timers,
            send_channel,
            receive_channel,
            unreliable,
            delivery,
            stats,
            workers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        };
        end_point.spawn_workers(expired_rx);

        Ok(end_point)
    }

    fn spawn_workers(&self, mut expired_rx: mpsc::UnboundedReceiver<crate::seq::Seq>) {
        let mut workers = self.workers.lock().expect("worker list lock poisoned");

        workers.push(tokio::spawn(self.timers.clone().run()));

        if let Some(send_channel) = self.send_channel.clone() {
            workers.push(tokio::spawn(async move {
                while let Some(seq) = expired_rx.recv().await {
                    send_channel.on_timer_expired(seq).await;
                }
            }));
        }

        workers.push(tokio::spawn(Self::recv_loop(
            self.socket.clone(),
            self.config.clone(),
            self.receive_channel.clone(),
            self.unreliable.clone(),
            self.send_channel.clone(),
            self.stats.clone(),
        )));
    }

    async fn recv_loop(
        socket: Arc<UdpSocket>,
        config: Arc<GameNetConfig>,
        receive_channel: Arc<ReceiveChannel>,
        unreliable: Arc<UnreliableChannel>,
        send_channel: Option<Arc<SendChannel>>,
        stats: Arc<TransportStats>,
    ) {
        info!("starting receive loop");

        let mut buf = vec![0u8; 64 * 1024];
        loop {
            // the read timeout doubles as the idle tick for the skip policy
            let (num_read, from) = match tokio::time::timeout(config.recv_idle_timeout, socket.recv_from(&mut buf)).await {
                Err(_elapsed) => {
                    receive_channel.on_idle_tick().await;
                    continue;
                }
                Ok(Err(e)) => {
                    error!("socket error: {}", e);
                    continue;
                }
                Ok(Ok(x)) => x,
            };

            let correlation_id = Uuid::new_v4();
            let span = span!(Level::TRACE, "frame_received", ?correlation_id);
            let _entered = span.enter();

            let frame = &buf[..num_read];
            trace!("received {} bytes from {:?}", num_read, from);

            let mut parse_buf = frame;
            let header = match PacketHeader::deser(&mut parse_buf) {
                Ok(header) => header,
                Err(_) => {
                    debug!("malformed frame of {} bytes from {:?} - dropping", num_read, from);
                    stats.count_malformed_frame();
                    continue;
                }
            };

            match header.channel {
                Channel::ReliableData => {
                    receive_channel.on_data(header.seq, header.ts_ms, parse_buf, from).await;
                }
                Channel::Unreliable => {
                    unreliable.on_datagram(header.ts_ms, parse_buf);
                }
                Channel::Sack => {
                    match SackFrame::deser_payload(header.seq, &mut parse_buf) {
                        Ok(sack) => {
                            if let Some(send_channel) = &send_channel {
                                send_channel.on_sack(sack).await;
                            }
                            else {
                                debug!("received SACK on an endpoint without a send channel - ignoring");
                            }
                        }
                        Err(_) => {
                            debug!("malformed SACK frame from {:?} - dropping", from);
                            stats.count_malformed_frame();
                        }
                    }
                }
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
            .expect("UdpSocket should have an initialized local addr")
    }

    /// Send a payload to the peer - on the reliable channel (windowed,
    /// retransmitted, delivered in order) or the unreliable one (one UDP
    /// datagram, best effort).
    pub async fn send(&self, payload: &[u8], reliable: bool) -> anyhow::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("endpoint is closed");
        }

        if reliable {
            let Some(send_channel) = &self.send_channel else {
                bail!("endpoint has no remote peer - cannot send");
            };
            send_channel.send_reliable(payload.to_vec()).await
        }
        else {
            self.unreliable.send(payload).await
        }
    }

    /// Non-blocking: the next delivered record, or `None` if nothing is
    /// waiting (or the endpoint is closed).
    pub fn receive(&self) -> Option<DeliveryRecord> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.delivery.pop()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// reliable sequence numbers the receive side has skipped over, oldest
    /// first - the gaps an application should expect in delivered sequences
    pub async fn skipped(&self) -> Vec<crate::seq::Seq> {
        self.receive_channel.skipped().await
    }

    /// Stop all workers, disarm all timers, and discard inflight and pending
    /// sends. Idempotent; the socket itself is released when the endpoint is
    /// dropped.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("closing endpoint on {:?}", self.local_addr());

        self.timers.cancel_all();
        if let Some(send_channel) = &self.send_channel {
            send_channel.shutdown().await;
        }

        let workers = {
            let mut workers = self.workers.lock().expect("worker list lock poisoned");
            workers.drain(..).collect::<Vec<_>>()
        };
        for worker in &workers {
            worker.abort();
        }
        for worker in workers {
            // cancellation surfaces as a JoinError, which is the expected way out
            let _ = worker.await;
        }

        debug!("endpoint closed");
    }
}

impl Drop for EndPoint {
    fn drop(&mut self) {
        let workers = self.workers.lock().expect("worker list lock poisoned");
        for worker in workers.iter() {
            worker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost_config(peer: Option<SocketAddr>) -> Arc<GameNetConfig> {
        Arc::new(GameNetConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)), peer))
    }

    #[tokio::test]
    async fn test_bind_assigns_local_addr() {
        let end_point = EndPoint::bind(localhost_config(None)).await.unwrap();
        assert_ne!(end_point.local_addr().port(), 0);
        end_point.close().await;
    }

    #[tokio::test]
    async fn test_send_on_receiver_only_endpoint_fails() {
        let end_point = EndPoint::bind(localhost_config(None)).await.unwrap();

        assert!(end_point.send(b"x", true).await.is_err());
        assert!(end_point.send(b"x", false).await.is_err());

        end_point.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let end_point = EndPoint::bind(localhost_config(None)).await.unwrap();
        end_point.close().await;
        end_point.close().await;
    }

    #[tokio::test]
    async fn test_send_and_receive_after_close_are_rejected() {
        let peer = SocketAddr::from(([127, 0, 0, 1], 9999));
        let end_point = EndPoint::bind(localhost_config(Some(peer))).await.unwrap();
        end_point.close().await;

        assert!(end_point.send(b"x", true).await.is_err());
        assert!(end_point.send(b"x", false).await.is_err());
        assert_eq!(end_point.receive(), None);
    }

    #[tokio::test]
    async fn test_close_cancels_inflight_timers() {
        let peer = SocketAddr::from(([127, 0, 0, 1], 9999));
        let end_point = EndPoint::bind(localhost_config(Some(peer))).await.unwrap();

        // nobody is listening on the peer port, so these stay inflight
        end_point.send(b"a", true).await.unwrap();
        end_point.send(b"b", true).await.unwrap();
        assert_eq!(end_point.timers.armed_count(), 2);

        end_point.close().await;
        assert_eq!(end_point.timers.armed_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = GameNetConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)), None);
        config.send_window = 0;
        assert!(EndPoint::bind(Arc::new(config)).await.is_err());
    }
}
