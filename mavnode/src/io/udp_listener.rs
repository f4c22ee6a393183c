//! UDP-based listener.
//!
//! Turns a single bound datagram socket into per-peer pseudo-connections. A
//! single reader loop keys incoming datagrams on the peer address, routes
//! them into a bounded single-slot channel per peer (the rendezvous keeps
//! memory bounded regardless of peer count), and publishes new peers on an
//! accept queue. A sweeper evicts peers that stayed silent for the idle
//! window.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, UdpSocket};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::consts::{READ_BUF_SIZE, TRANSPORT_READ_TIMEOUT, UDP_SWEEP_INTERVAL};
use crate::utils::{sleep_while_open, SharedCloser};

struct PeerEntry {
    tx: mpsc::SyncSender<Vec<u8>>,
    last_seen: Instant,
}

struct ListenerShared {
    socket: UdpSocket,
    local_addr: SocketAddr,
    conns: Mutex<HashMap<SocketAddr, PeerEntry>>,
    // Datagram writes must not interleave.
    write_lock: Mutex<()>,
    state: SharedCloser,
}

/// A UDP listener multiplexing one socket into per-peer connections.
pub(crate) struct UdpListener {
    shared: Arc<ListenerShared>,
    accept_rx: Mutex<mpsc::Receiver<UdpPeerConn>>,
}

/// One accepted pseudo-connection: the peer address plus its transport
/// halves.
pub(crate) struct UdpPeerConn {
    pub(crate) peer_addr: SocketAddr,
    pub(crate) reader: UdpPeerReader,
    pub(crate) writer: UdpPeerWriter,
}

impl UdpListener {
    /// Binds the socket and spawns the reader and sweeper loops.
    pub(crate) fn bind(addr: SocketAddr, idle_timeout: Duration) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        let local_addr = socket.local_addr()?;

        let shared = Arc::new(ListenerShared {
            socket,
            local_addr,
            conns: Mutex::new(HashMap::new()),
            write_lock: Mutex::new(()),
            state: SharedCloser::new(),
        });

        let (accept_tx, accept_rx) = mpsc::channel();

        {
            let shared = shared.clone();
            thread::spawn(move || reader_loop(shared, accept_tx));
        }
        {
            let shared = shared.clone();
            thread::spawn(move || sweeper_loop(shared, idle_timeout));
        }

        Ok(Self {
            shared,
            accept_rx: Mutex::new(accept_rx),
        })
    }

    /// Local address of the bound socket.
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// Blocks until a new peer sends its first datagram.
    ///
    /// Returns `None` once the listener is closed.
    pub(crate) fn accept(&self) -> Option<UdpPeerConn> {
        self.accept_rx.lock().unwrap().recv().ok()
    }

    /// Closes the listener: stops accepting new peers and terminates the
    /// reader loop.
    ///
    /// Live pseudo-connections keep draining until their own channels close.
    pub(crate) fn close(&self) {
        if self.shared.state.is_closed() {
            return;
        }
        self.shared.state.close();

        // Wake up the blocking recv_from with a datagram to ourselves.
        if let Ok(socket) = UdpSocket::bind(("127.0.0.1", 0)) {
            _ = socket.send_to(&[0], self.shared.local_addr);
        }
    }
}

impl Drop for UdpListener {
    fn drop(&mut self) {
        self.close();
    }
}

fn reader_loop(shared: Arc<ListenerShared>, accept_tx: mpsc::Sender<UdpPeerConn>) {
    // One scratch buffer for all peers; the single-slot rendezvous below
    // keeps it reusable.
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        let (len, peer_addr) = match shared.socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                continue;
            }
            Err(_) => break,
        };

        if shared.state.is_closed() {
            break;
        }

        let tx = {
            let mut conns = shared.conns.lock().unwrap();
            match conns.get_mut(&peer_addr) {
                Some(entry) => {
                    entry.last_seen = Instant::now();
                    entry.tx.clone()
                }
                None => {
                    let (tx, rx) = mpsc::sync_channel(0);
                    conns.insert(
                        peer_addr,
                        PeerEntry {
                            tx: tx.clone(),
                            last_seen: Instant::now(),
                        },
                    );

                    let conn = UdpPeerConn {
                        peer_addr,
                        reader: UdpPeerReader { rx },
                        writer: UdpPeerWriter {
                            shared: shared.clone(),
                            peer_addr,
                        },
                    };
                    if accept_tx.send(conn).is_err() {
                        conns.remove(&peer_addr);
                        continue;
                    }
                    tx
                }
            }
        };

        // Rendezvous: wait until the consumer copied the datagram out. A
        // failed send means the peer was evicted or its channel closed.
        if tx.send(buf[..len].to_vec()).is_err() {
            shared.conns.lock().unwrap().remove(&peer_addr);
        }
    }

    log::trace!("[udp:{}] listener reader stopped", shared.local_addr);
}

fn sweeper_loop(shared: Arc<ListenerShared>, idle_timeout: Duration) {
    let state = shared.state.as_closable();
    loop {
        sleep_while_open(&state, UDP_SWEEP_INTERVAL);
        if state.is_closed() {
            return;
        }

        let mut conns = shared.conns.lock().unwrap();
        // Dropping an entry drops its sender, which terminates the peer's
        // read loop.
        conns.retain(|peer_addr, entry| {
            let keep = entry.last_seen.elapsed() <= idle_timeout;
            if !keep {
                log::debug!("[udp:{}] evicting idle peer {peer_addr}", shared.local_addr);
            }
            keep
        });
    }
}

/// Read half of a pseudo-connection.
pub(crate) struct UdpPeerReader {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl Read for UdpPeerReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let datagram = match self.rx.recv_timeout(TRANSPORT_READ_TIMEOUT) {
            Ok(datagram) => datagram,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                return Err(std::io::Error::new(ErrorKind::TimedOut, "udp read timed out"))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(std::io::Error::new(
                    ErrorKind::ConnectionAborted,
                    "peer connection terminated",
                ))
            }
        };

        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok(len)
    }
}

/// Write half of a pseudo-connection: a `WriteTo` with the remembered peer
/// address.
pub(crate) struct UdpPeerWriter {
    shared: Arc<ListenerShared>,
    peer_addr: SocketAddr,
}

impl Write for UdpPeerWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _guard = self.shared.write_lock.lock().unwrap();
        self.shared.socket.send_to(buf, self.peer_addr)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
