//! # I/O abstractions
//!
//! Channels, endpoint configurations, and the built-in transports:
//!
//! * TCP: [`TcpServer`], [`TcpClient`]
//! * UDP: [`UdpServer`], [`UdpClient`], [`UdpBroadcast`]
//! * Serial: [`SerialPort`]
//! * Caller-supplied byte streams: [`CustomEndpoint`]

pub(crate) mod channel;
mod endpoint;
mod transport;
pub(crate) mod udp_listener;

pub use channel::{Channel, ChannelInfo};
pub use endpoint::{EndpointConf, EndpointContext};
pub use transport::{
    CustomEndpoint, SerialPort, TcpClient, TcpServer, UdpBroadcast, UdpClient, UdpServer,
};

pub(crate) use channel::ChannelRegistry;
