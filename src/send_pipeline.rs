use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{error, trace};

/// This is an abstraction for sending a buffer on a UDP socket, introduced to
///  facilitate mocking the I/O part away for testing
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SendSocket: Send + Sync + 'static {
    async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]);

    fn local_addr(&self) -> SocketAddr;
}

#[async_trait]
impl SendSocket for Arc<UdpSocket> {
    async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]) {
        trace!("UDP socket: sending packet to {:?}", to);

        // a send error is not retried here - for reliable traffic the
        //  retransmission timer recovers from it the same way as from loss
        if let Err(e) = self.send_to(packet_buf, to).await {
            error!("error sending UDP packet to {:?}: {}", to, e);
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.as_ref().local_addr()
            .expect("UdpSocket should have an initialized local addr")
    }
}

#[derive(Clone)]
pub struct SendPipeline {
    socket: Arc<dyn SendSocket>,
}

impl SendPipeline {
    pub fn new(socket: Arc<dyn SendSocket>) -> SendPipeline {
        SendPipeline { socket }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    pub async fn do_send_packet(&self, to: SocketAddr, packet_buf: &[u8]) {
        self.socket.do_send_packet(to, packet_buf).await;
    }
}
