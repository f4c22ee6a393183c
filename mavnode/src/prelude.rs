//! Common imports.

pub use crate::error::{Error, Result};
pub use crate::io::{
    Channel, ChannelInfo, CustomEndpoint, SerialPort, TcpClient, TcpServer, UdpBroadcast,
    UdpClient, UdpServer,
};
pub use crate::node::{Event, Events, Node, NodeConf};
pub use crate::protocol::{Dialect, Frame, MavlinkVersion, Message, SecretKey};
