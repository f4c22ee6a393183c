//! Channels: one bidirectional conversation over one transport attachment.
//!
//! A channel pairs a `Read` half with a `Write` half. Its reader thread
//! drains the transport into the frame parser and forwards parser events to
//! the node event queue; its writer thread serves the per-channel queue of
//! pre-serialized frames. Both threads stop when the channel or the node is
//! closed.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::consts::READ_BUF_SIZE;
use crate::io::endpoint::EndpointContext;
use crate::node::Event;
use crate::protocol::{Parser, ParserEvent};
use crate::utils::{Closable, SharedCloser, UniqueId};

/// Information about a channel: the transport attachment it runs over.
#[derive(Clone, Debug)]
pub enum ChannelInfo {
    /// Connection accepted by a TCP server.
    TcpServer {
        /// Local server address.
        bind_addr: SocketAddr,
        /// Remote peer address.
        peer_addr: SocketAddr,
    },
    /// Outbound TCP connection.
    TcpClient {
        /// Remote server address.
        remote_addr: SocketAddr,
    },
    /// Per-peer pseudo-connection of a UDP server.
    UdpServer {
        /// Local server address.
        bind_addr: SocketAddr,
        /// Remote peer address.
        peer_addr: SocketAddr,
    },
    /// Outbound UDP connection.
    UdpClient {
        /// Remote server address.
        remote_addr: SocketAddr,
    },
    /// UDP broadcast attachment.
    UdpBroadcast {
        /// Local address.
        bind_addr: SocketAddr,
        /// Directed broadcast address.
        broadcast_addr: SocketAddr,
    },
    /// Serial port.
    Serial {
        /// Device path.
        path: String,
        /// Baud rate.
        baud_rate: u32,
    },
    /// Caller-supplied transport.
    Custom {
        /// Transport label.
        name: String,
    },
}

impl Display for ChannelInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelInfo::TcpServer { bind_addr, peer_addr } => {
                write!(f, "tcp:{bind_addr} <- {peer_addr}")
            }
            ChannelInfo::TcpClient { remote_addr } => write!(f, "tcp:{remote_addr}"),
            ChannelInfo::UdpServer { bind_addr, peer_addr } => {
                write!(f, "udp:{bind_addr} <- {peer_addr}")
            }
            ChannelInfo::UdpClient { remote_addr } => write!(f, "udp:{remote_addr}"),
            ChannelInfo::UdpBroadcast { bind_addr, broadcast_addr } => {
                write!(f, "udp:{bind_addr} -> {broadcast_addr}")
            }
            ChannelInfo::Serial { path, baud_rate } => write!(f, "serial:{path}:{baud_rate}"),
            ChannelInfo::Custom { name } => write!(f, "custom:{name}"),
        }
    }
}

/// Handle of a live channel.
///
/// Channels appear in [`Event`]s and address the
/// [`write_*_except`](crate::node::Node::write_message_except) operations.
/// The handle is cheap to clone; two clones compare equal when they refer to
/// the same attachment.
#[derive(Clone, Debug)]
pub struct Channel {
    id: UniqueId,
    info: Arc<ChannelInfo>,
}

impl Channel {
    /// Information about the transport attachment.
    pub fn info(&self) -> &ChannelInfo {
        &self.info
    }

    pub(crate) fn id(&self) -> UniqueId {
        self.id
    }

    #[cfg(test)]
    pub(crate) fn stub(id: UniqueId, info: ChannelInfo) -> Self {
        Self {
            id,
            info: Arc::new(info),
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.info, f)
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Channel {}

pub(crate) struct ChannelEntry {
    pub(crate) channel: Channel,
    pub(crate) writer: mpsc::Sender<Arc<Vec<u8>>>,
    pub(crate) state: SharedCloser,
}

/// The set of live channels of a node.
///
/// Writes fan out through the registry; channels deregister themselves when
/// their transport terminates.
#[derive(Clone, Default)]
pub(crate) struct ChannelRegistry {
    inner: Arc<Mutex<HashMap<UniqueId, ChannelEntry>>>,
}

impl ChannelRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn insert(&self, entry: ChannelEntry) {
        self.inner
            .lock()
            .unwrap()
            .insert(entry.channel.id(), entry);
    }

    fn remove(&self, id: UniqueId) -> Option<ChannelEntry> {
        self.inner.lock().unwrap().remove(&id)
    }

    /// Queues raw frame bytes on every channel, optionally skipping one.
    pub(crate) fn send_all(&self, bytes: &Arc<Vec<u8>>, except: Option<UniqueId>) {
        let registry = self.inner.lock().unwrap();
        for entry in registry.values() {
            if Some(entry.channel.id()) == except {
                continue;
            }
            // A failed send means the channel is shutting down.
            _ = entry.writer.send(bytes.clone());
        }
    }

    /// Queues raw frame bytes on a single channel.
    pub(crate) fn send_to(&self, id: UniqueId, bytes: Arc<Vec<u8>>) -> bool {
        let registry = self.inner.lock().unwrap();
        match registry.get(&id) {
            Some(entry) => entry.writer.send(bytes).is_ok(),
            None => false,
        }
    }

    pub(crate) fn close_all(&self) {
        let mut registry = self.inner.lock().unwrap();
        for entry in registry.values() {
            entry.state.close();
        }
        registry.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

/// Spawns the reader and writer threads of a new channel and registers it
/// with the node.
///
/// Returns the channel handle and a view of its close state.
pub(crate) fn spawn_channel<R, W>(
    ctx: &EndpointContext,
    info: ChannelInfo,
    reader: R,
    writer: W,
) -> (Channel, Closable)
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let node = ctx.node().clone();
    let channel = Channel {
        id: UniqueId::new(),
        info: Arc::new(info),
    };
    let state = SharedCloser::new();

    let (write_tx, write_rx) = mpsc::channel();
    node.registry.insert(ChannelEntry {
        channel: channel.clone(),
        writer: write_tx,
        state: state.clone(),
    });

    log::debug!("[{channel}] channel open");
    node.events.push(Event::ChannelOpen(channel.clone()));

    {
        let node = node.clone();
        let channel = channel.clone();
        let state = state.clone();
        thread::spawn(move || read_handler(node, channel, state, reader));
    }

    {
        let channel = channel.clone();
        let state = state.clone();
        thread::spawn(move || write_handler(channel, state, write_rx, writer));
    }

    (channel, state.as_closable())
}

fn read_handler<R: Read>(
    node: Arc<crate::node::NodeShared>,
    channel: Channel,
    state: SharedCloser,
    mut reader: R,
) {
    let mut parser = Parser::new(node.dialect.clone(), node.incoming_key.clone());
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        if node.state.is_closed() || state.is_closed() {
            break;
        }

        match reader.read(&mut buf) {
            Ok(0) => {
                log::trace!("[{channel}] transport EOF");
                break;
            }
            Ok(len) => {
                for event in parser.consume(&buf[..len]) {
                    match event {
                        ParserEvent::Frame(frame) => {
                            log::trace!("[{channel}] received frame");
                            node.on_incoming_frame(&frame, &channel);
                            node.events.push(Event::Frame(frame, channel.clone()));
                        }
                        ParserEvent::Error { error, raw } => {
                            log::trace!("[{channel}] parse error: {error}");
                            node.events.push(Event::ParseError {
                                error,
                                raw,
                                channel: channel.clone(),
                            });
                        }
                    }
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(err) => {
                log::trace!("[{channel}] transport error: {err}");
                break;
            }
        }
    }

    state.close();
    if node.registry.remove(channel.id()).is_some() {
        node.events.push(Event::ChannelClose(channel.clone()));
    }
    log::debug!("[{channel}] channel closed");
}

fn write_handler<W: Write>(
    channel: Channel,
    state: SharedCloser,
    write_rx: mpsc::Receiver<Arc<Vec<u8>>>,
    mut writer: W,
) {
    loop {
        let bytes = match write_rx.recv() {
            Ok(bytes) => bytes,
            // The channel was deregistered.
            Err(_) => break,
        };

        if state.is_closed() {
            break;
        }

        if let Err(err) = writer.write_all(&bytes).and_then(|_| writer.flush()) {
            log::trace!("[{channel}] write error: {err}");
            break;
        }
        log::trace!("[{channel}] written outgoing frame");
    }

    state.close();
}
