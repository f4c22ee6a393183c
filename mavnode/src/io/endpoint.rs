//! Endpoint configuration.
//!
//! Every transport attachment of a node starts from an endpoint
//! configuration implementing [`EndpointConf`]. `start` is called once from
//! [`Node::new`](crate::node::Node::new): endpoints that bind local
//! resources (servers, serial ports) fail there, outbound clients spawn a
//! dial loop and reconnect with a fixed backoff.

use std::fmt::Debug;
use std::io::{Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use crate::error::{ConfigError, Result};
use crate::io::channel::{spawn_channel, Channel, ChannelInfo};
use crate::node::NodeShared;
use crate::utils::Closable;

/// Configuration of a single transport endpoint.
///
/// Implemented by the built-in transports ([`TcpServer`], [`TcpClient`],
/// [`UdpServer`], [`UdpClient`], [`UdpBroadcast`], [`SerialPort`],
/// [`CustomEndpoint`]).
///
/// [`TcpServer`]: crate::io::TcpServer
/// [`TcpClient`]: crate::io::TcpClient
/// [`UdpServer`]: crate::io::UdpServer
/// [`UdpClient`]: crate::io::UdpClient
/// [`UdpBroadcast`]: crate::io::UdpBroadcast
/// [`SerialPort`]: crate::io::SerialPort
/// [`CustomEndpoint`]: crate::io::CustomEndpoint
pub trait EndpointConf: Debug + Send {
    /// Initializes the endpoint and spawns its background tasks.
    ///
    /// An error fails [`Node::new`](crate::node::Node::new).
    fn start(&self, ctx: EndpointContext) -> Result<()>;
}

/// Node runtime handle passed to endpoints: opens channels, exposes the node
/// close state.
#[derive(Clone)]
pub struct EndpointContext {
    node: Arc<NodeShared>,
}

impl EndpointContext {
    pub(crate) fn new(node: Arc<NodeShared>) -> Self {
        Self { node }
    }

    pub(crate) fn node(&self) -> &Arc<NodeShared> {
        &self.node
    }

    /// Opens a channel over the given transport halves and spawns its tasks.
    ///
    /// Returns the channel handle and a view of the channel close state.
    pub fn open_channel<R, W>(&self, info: ChannelInfo, reader: R, writer: W) -> (Channel, Closable)
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        spawn_channel(self, info, reader, writer)
    }

    /// Read-only view of the node close state.
    pub fn state(&self) -> Closable {
        self.node.state.clone()
    }

    /// Returns `true` if the node is closed.
    pub fn is_closed(&self) -> bool {
        self.node.state.is_closed()
    }
}

/// Resolves a textual address into a socket address.
pub(crate) fn resolve_addr(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|_| ConfigError::InvalidAddress(addr.to_string()))?
        .next()
        .ok_or_else(|| ConfigError::InvalidAddress(addr.to_string()).into())
}
