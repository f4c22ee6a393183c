//! # Common constants

use std::time::Duration;

/// Default heartbeat emission period.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);

/// Default idle window after which a UDP server evicts a silent peer.
pub const DEFAULT_UDP_IDLE_TIMEOUT: Duration = Duration::from_secs(55);

/// Default requested message rate for ArduPilot stream requests.
pub const DEFAULT_STREAM_REQUEST_FREQUENCY: u16 = 4;

/// Minimal interval between stream requests towards the same remote device.
pub(crate) const STREAM_REQUEST_PERIOD: Duration = Duration::from_secs(30);

/// Interval between re-dial attempts of client endpoints.
pub(crate) const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Read timeout of channel transports, so reader loops can observe the
/// close state.
pub(crate) const TRANSPORT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Time after which it is guaranteed that a server loop has observed the
/// close state and its wake-up connection may be fired.
pub(crate) const SERVER_HANG_UP_TIMEOUT: Duration = Duration::from_millis(50);

/// Interval of the UDP idle-peer sweeper.
pub(crate) const UDP_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Granularity of interruptible sleeps (heartbeat period, reconnect backoff).
pub(crate) const SLEEP_POOLING_INTERVAL: Duration = Duration::from_millis(50);

/// Capacity of the node event queue.
pub(crate) const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Transport scratch buffer size. Larger than a typical MTU.
pub(crate) const READ_BUF_SIZE: usize = 2048;
