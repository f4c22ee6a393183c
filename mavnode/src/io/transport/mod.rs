//! Built-in transport endpoints.

mod custom;
mod serial;
mod tcp;
mod udp;

pub use custom::CustomEndpoint;
pub use serial::SerialPort;
pub use tcp::{TcpClient, TcpServer};
pub use udp::{UdpBroadcast, UdpClient, UdpServer};
