//! UDP transports.

use std::io::{Read, Write};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::consts::{DEFAULT_UDP_IDLE_TIMEOUT, RECONNECT_INTERVAL, SLEEP_POOLING_INTERVAL, TRANSPORT_READ_TIMEOUT};
use crate::error::Result;
use crate::io::channel::ChannelInfo;
use crate::io::endpoint::{resolve_addr, EndpointConf, EndpointContext};
use crate::io::udp_listener::UdpListener;
use crate::utils::sleep_while_open;

/// UDP server endpoint.
///
/// Spawns a per-peer channel for every remote address the bound socket hears
/// from; peers that stay silent for the idle window are evicted, closing
/// their channel.
#[derive(Clone, Debug)]
pub struct UdpServer {
    addr: SocketAddr,
    idle_timeout: Duration,
}

impl UdpServer {
    /// Creates a UDP server endpoint bound to `addr`.
    pub fn new(addr: &str) -> Result<Self> {
        Ok(Self {
            addr: resolve_addr(addr)?,
            idle_timeout: DEFAULT_UDP_IDLE_TIMEOUT,
        })
    }

    /// Overrides the idle window after which silent peers are evicted.
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

impl EndpointConf for UdpServer {
    fn start(&self, ctx: EndpointContext) -> Result<()> {
        let listener = Arc::new(UdpListener::bind(self.addr, self.idle_timeout)?);
        let bind_addr = listener.local_addr();

        // Close the listener when the node is closed.
        {
            let state = ctx.state();
            let listener = listener.clone();
            thread::spawn(move || {
                while !state.is_closed() {
                    thread::sleep(SLEEP_POOLING_INTERVAL);
                }
                listener.close();
            });
        }

        thread::spawn(move || {
            while let Some(conn) = listener.accept() {
                if ctx.is_closed() {
                    break;
                }
                ctx.open_channel(
                    ChannelInfo::UdpServer {
                        bind_addr,
                        peer_addr: conn.peer_addr,
                    },
                    conn.reader,
                    conn.writer,
                );
            }
            log::trace!("[udp:{bind_addr}] server stopped");
        });

        Ok(())
    }
}

/// UDP client endpoint: a single persistent channel over a connected socket.
#[derive(Clone, Debug)]
pub struct UdpClient {
    addr: SocketAddr,
}

impl UdpClient {
    /// Creates a UDP client endpoint sending to `addr`.
    pub fn new(addr: &str) -> Result<Self> {
        Ok(Self {
            addr: resolve_addr(addr)?,
        })
    }

    fn connect(&self) -> Result<UdpRw> {
        let socket = UdpSocket::bind(match self.addr {
            SocketAddr::V4(_) => "0.0.0.0:0",
            SocketAddr::V6(_) => "[::]:0",
        })?;
        socket.connect(self.addr)?;
        socket.set_read_timeout(Some(TRANSPORT_READ_TIMEOUT))?;
        Ok(UdpRw::connected(socket))
    }
}

impl EndpointConf for UdpClient {
    fn start(&self, ctx: EndpointContext) -> Result<()> {
        let remote_addr = self.addr;
        // The first socket is created eagerly so that `Node::new` surfaces
        // local binding problems.
        let first = self.connect()?;

        let conf = self.clone();
        let state = ctx.state();

        thread::spawn(move || {
            let mut transport = Some(first);
            while !state.is_closed() {
                let rw = match transport.take() {
                    Some(rw) => Ok(rw),
                    None => conf.connect(),
                };

                match rw.and_then(|rw| {
                    let reader = rw.try_clone()?;
                    Ok(ctx.open_channel(ChannelInfo::UdpClient { remote_addr }, reader, rw))
                }) {
                    Ok((_, channel_state)) => {
                        while !channel_state.is_closed() && !state.is_closed() {
                            thread::sleep(SLEEP_POOLING_INTERVAL);
                        }
                    }
                    Err(err) => log::trace!("[udp:{remote_addr}] socket error: {err}"),
                }

                sleep_while_open(&state, RECONNECT_INTERVAL);
            }
        });

        Ok(())
    }
}

/// UDP broadcast endpoint: binds locally and sends to the directed broadcast
/// address.
#[derive(Clone, Debug)]
pub struct UdpBroadcast {
    broadcast_addr: SocketAddr,
    local_addr: SocketAddr,
}

impl UdpBroadcast {
    /// Creates a UDP broadcast endpoint sending to `broadcast_addr` from the
    /// local `local_addr`.
    pub fn new(broadcast_addr: &str, local_addr: &str) -> Result<Self> {
        Ok(Self {
            broadcast_addr: resolve_addr(broadcast_addr)?,
            local_addr: resolve_addr(local_addr)?,
        })
    }
}

impl EndpointConf for UdpBroadcast {
    fn start(&self, ctx: EndpointContext) -> Result<()> {
        let socket = UdpSocket::bind(self.local_addr)?;
        socket.set_broadcast(true)?;
        socket.set_read_timeout(Some(TRANSPORT_READ_TIMEOUT))?;
        let bind_addr = socket.local_addr()?;
        let broadcast_addr = self.broadcast_addr;

        let writer = UdpRw::sending_to(socket, broadcast_addr);
        let reader = writer.try_clone()?;

        ctx.open_channel(
            ChannelInfo::UdpBroadcast {
                bind_addr,
                broadcast_addr,
            },
            reader,
            writer,
        );

        Ok(())
    }
}

/// [`Read`] / [`Write`] adapter over a datagram socket.
#[derive(Debug)]
pub(crate) struct UdpRw {
    socket: UdpSocket,
    send_to: Option<SocketAddr>,
}

impl UdpRw {
    /// Adapter over a connected socket.
    pub(crate) fn connected(socket: UdpSocket) -> Self {
        Self {
            socket,
            send_to: None,
        }
    }

    /// Adapter over an unconnected socket writing to a fixed address.
    pub(crate) fn sending_to(socket: UdpSocket, addr: SocketAddr) -> Self {
        Self {
            socket,
            send_to: Some(addr),
        }
    }

    pub(crate) fn try_clone(&self) -> std::io::Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone()?,
            send_to: self.send_to,
        })
    }
}

impl Read for UdpRw {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.send_to {
            Some(_) => self.socket.recv_from(buf).map(|(len, _)| len),
            None => self.socket.recv(buf),
        }
    }
}

impl Write for UdpRw {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.send_to {
            Some(addr) => self.socket.send_to(buf, addr),
            None => self.socket.send(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
