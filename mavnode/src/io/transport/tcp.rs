//! TCP transports.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

use crate::consts::{
    RECONNECT_INTERVAL, SERVER_HANG_UP_TIMEOUT, SLEEP_POOLING_INTERVAL, TRANSPORT_READ_TIMEOUT,
};
use crate::error::Result;
use crate::io::channel::ChannelInfo;
use crate::io::endpoint::{resolve_addr, EndpointConf, EndpointContext};
use crate::utils::sleep_while_open;

/// TCP server endpoint: every accepted connection becomes a channel.
#[derive(Clone, Debug)]
pub struct TcpServer {
    addr: SocketAddr,
}

impl TcpServer {
    /// Creates a TCP server endpoint bound to `addr`.
    pub fn new(addr: &str) -> Result<Self> {
        Ok(Self {
            addr: resolve_addr(addr)?,
        })
    }
}

impl EndpointConf for TcpServer {
    fn start(&self, ctx: EndpointContext) -> Result<()> {
        let listener = TcpListener::bind(self.addr)?;
        let bind_addr = listener.local_addr()?;

        on_close_wake_up(&ctx, bind_addr);

        thread::spawn(move || {
            for stream in listener.incoming() {
                if ctx.is_closed() {
                    break;
                }

                let writer = match stream {
                    Ok(stream) => stream,
                    Err(err) => {
                        log::trace!("[tcp:{bind_addr}] accept error: {err}");
                        continue;
                    }
                };

                let channel = try_open_stream_channel(&ctx, writer, bind_addr);
                if let Err(err) = channel {
                    log::trace!("[tcp:{bind_addr}] peer setup error: {err}");
                }
            }
            log::trace!("[tcp:{bind_addr}] server stopped");
        });

        Ok(())
    }
}

fn try_open_stream_channel(
    ctx: &EndpointContext,
    writer: TcpStream,
    bind_addr: SocketAddr,
) -> Result<()> {
    let peer_addr = writer.peer_addr()?;
    writer.set_read_timeout(Some(TRANSPORT_READ_TIMEOUT))?;
    let reader = writer.try_clone()?;

    ctx.open_channel(
        ChannelInfo::TcpServer {
            bind_addr,
            peer_addr,
        },
        reader,
        writer,
    );
    Ok(())
}

/// Wakes up a blocking accept loop once the node is closed.
fn on_close_wake_up(ctx: &EndpointContext, addr: SocketAddr) {
    let state = ctx.state();
    thread::spawn(move || {
        while !state.is_closed() {
            thread::sleep(SERVER_HANG_UP_TIMEOUT);
        }
        _ = TcpStream::connect(addr);
    });
}

/// TCP client endpoint: a single channel that re-dials with a backoff when
/// the connection is lost.
#[derive(Clone, Debug)]
pub struct TcpClient {
    addr: SocketAddr,
}

impl TcpClient {
    /// Creates a TCP client endpoint dialing `addr`.
    pub fn new(addr: &str) -> Result<Self> {
        Ok(Self {
            addr: resolve_addr(addr)?,
        })
    }
}

impl EndpointConf for TcpClient {
    fn start(&self, ctx: EndpointContext) -> Result<()> {
        let remote_addr = self.addr;
        let state = ctx.state();

        thread::spawn(move || {
            while !state.is_closed() {
                match TcpStream::connect(remote_addr) {
                    Ok(writer) => {
                        let channel = (|| -> Result<_> {
                            writer.set_read_timeout(Some(TRANSPORT_READ_TIMEOUT))?;
                            let reader = writer.try_clone()?;
                            Ok(ctx.open_channel(
                                ChannelInfo::TcpClient { remote_addr },
                                reader,
                                writer,
                            ))
                        })();

                        match channel {
                            Ok((_, channel_state)) => {
                                while !channel_state.is_closed() && !state.is_closed() {
                                    thread::sleep(SLEEP_POOLING_INTERVAL);
                                }
                            }
                            Err(err) => {
                                log::trace!("[tcp:{remote_addr}] connection setup error: {err}")
                            }
                        }
                    }
                    Err(err) => log::trace!("[tcp:{remote_addr}] dial error: {err}"),
                }

                sleep_while_open(&state, RECONNECT_INTERVAL);
            }
        });

        Ok(())
    }
}
