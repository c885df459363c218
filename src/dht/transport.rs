use super::error::DhtError;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace};

const RECV_BUFFER_SIZE: usize = 65536;

/// Delay before re-arming the receive after a socket error. Some platforms
/// surface ICMP port-unreachable as a receive error; backing off briefly
/// keeps a storm of those from spinning the loop.
const REARM_BACKOFF: Duration = Duration::from_millis(50);

/// Connectionless UDP socket with a continuous receive loop.
///
/// [`open`](UdpTransport::open) spawns a task that copies every datagram
/// into a fresh buffer and forwards it over a channel; receive errors are
/// logged and the loop always re-arms until [`close`](UdpTransport::close)
/// flips the connected flag. Sends are fire-and-forget unless the caller
/// asks to block.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    connected: Arc<AtomicBool>,
}

impl UdpTransport {
    /// Binds to `0.0.0.0:port`; port 0 picks an ephemeral port.
    pub async fn bind(port: u16) -> Result<Self, DhtError> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).await?;
        Ok(Self {
            socket: Arc::new(socket),
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DhtError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Starts the receive loop, forwarding `(source, datagram)` pairs to
    /// `dispatch`. Calling `open` on an already open transport is a no-op.
    pub fn open(&self, dispatch: mpsc::Sender<(SocketAddr, Vec<u8>)>) {
        if self.connected.swap(true, Ordering::SeqCst) {
            return;
        }

        let socket = self.socket.clone();
        let connected = self.connected.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];

            while connected.load(Ordering::SeqCst) {
                match socket.recv_from(&mut buf).await {
                    Ok((len, source)) => {
                        trace!(%source, len, "datagram received");
                        // Fresh copy per datagram; the shared buffer is
                        // reused by the next receive.
                        if dispatch.send((source, buf[..len].to_vec())).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        if !connected.load(Ordering::SeqCst) {
                            break;
                        }
                        debug!("udp receive failed, re-arming: {err}");
                        tokio::time::sleep(REARM_BACKOFF).await;
                    }
                }
            }
        });
    }

    /// Flips the connected flag. Idempotent; the receive loop exits on its
    /// next wakeup and in-flight sends finish or fail on their own.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Sends a datagram. With `blocking` the caller waits for the send to
    /// complete; otherwise the send is spawned and a failure is only
    /// logged. UDP gives no delivery guarantee either way, so retries are
    /// the protocol layer's business.
    pub async fn send(&self, addr: SocketAddr, data: Vec<u8>, blocking: bool) {
        if !self.is_open() {
            debug!(%addr, "send on closed transport dropped");
            return;
        }

        if blocking {
            if let Err(err) = self.socket.send_to(&data, addr).await {
                debug!(%addr, "udp send failed: {err}");
            }
        } else {
            let socket = self.socket.clone();
            tokio::spawn(async move {
                if let Err(err) = socket.send_to(&data, addr).await {
                    debug!(%addr, "udp send failed: {err}");
                }
            });
        }
    }
}
