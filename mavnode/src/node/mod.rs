//! # MAVLink node
//!
//! A [`Node`] multiplexes several transport attachments, decodes and encodes
//! frames according to its dialect, and surfaces everything that happens as
//! [`Event`]s:
//!
//! ```rust,no_run
//! use mavnode::io::TcpServer;
//! use mavnode::node::{Event, Node, NodeConf};
//! use mavnode::protocol::Dialect;
//!
//! # fn main() -> mavnode::error::Result<()> {
//! let node = Node::new(
//!     NodeConf::new(Dialect::minimal(), 11, 1)
//!         .endpoint(TcpServer::new("127.0.0.1:5600")?),
//! )?;
//!
//! for event in node.events() {
//!     if let Event::Frame(frame, _channel) = event {
//!         println!("got message {} from {}", frame.message_id(), frame.system_id());
//!     }
//! }
//! # Ok(()) }
//! ```

mod event;
mod heartbeat;
mod stream_request;

pub use event::{Event, Events};

use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::consts::{DEFAULT_HEARTBEAT_PERIOD, DEFAULT_STREAM_REQUEST_FREQUENCY};
use crate::error::{ConfigError, Error, FrameError, Result};
use crate::io::{Channel, ChannelRegistry, EndpointConf, EndpointContext};
use crate::node::event::EventQueue;
use crate::node::heartbeat::HeartbeatEmitter;
use crate::node::stream_request::StreamRequestor;
use crate::protocol::minimal::{Heartbeat, RequestDataStream};
use crate::protocol::{
    assemble_frame, reseal_frame, Dialect, DialectEntry, Frame, FrameSigner, MavlinkVersion,
    Message, MessagePlan, SecretKey,
};
use crate::utils::{Closable, Closer};

/// Node configuration.
pub struct NodeConf {
    dialect: Arc<Dialect>,
    system_id: u8,
    component_id: u8,
    version: MavlinkVersion,
    endpoints: Vec<Box<dyn EndpointConf>>,
    heartbeat: bool,
    heartbeat_period: Duration,
    incoming_key: Option<SecretKey>,
    outgoing_key: Option<SecretKey>,
    stream_request: bool,
    stream_request_frequency: u16,
}

impl NodeConf {
    /// Creates a configuration with the required parameters: the dialect and
    /// the node identity.
    ///
    /// Defaults: `MAVLink 2` on the wire, heartbeats enabled every 5 s, no
    /// signing, no stream requests.
    pub fn new(dialect: Dialect, system_id: u8, component_id: u8) -> Self {
        Self {
            dialect: Arc::new(dialect),
            system_id,
            component_id,
            version: MavlinkVersion::V2,
            endpoints: Vec::new(),
            heartbeat: true,
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            incoming_key: None,
            outgoing_key: None,
            stream_request: false,
            stream_request_frequency: DEFAULT_STREAM_REQUEST_FREQUENCY,
        }
    }

    /// Adds a transport endpoint.
    pub fn endpoint(mut self, endpoint: impl EndpointConf + 'static) -> Self {
        self.endpoints.push(Box::new(endpoint));
        self
    }

    /// Sets the outgoing wire version.
    pub fn version(mut self, version: MavlinkVersion) -> Self {
        self.version = version;
        self
    }

    /// Disables the periodic heartbeat (routers usually do).
    pub fn no_heartbeat(mut self) -> Self {
        self.heartbeat = false;
        self
    }

    /// Overrides the heartbeat period.
    pub fn heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Sets the key validating incoming signed frames. With a key set,
    /// unsigned `MAVLink 2` frames are rejected.
    pub fn incoming_key(mut self, key: SecretKey) -> Self {
        self.incoming_key = Some(key);
        self
    }

    /// Sets the key signing outgoing `MAVLink 2` frames.
    pub fn outgoing_key(mut self, key: SecretKey) -> Self {
        self.outgoing_key = Some(key);
        self
    }

    /// Enables ArduPilot stream requests at the given rate, Hz.
    pub fn stream_request(mut self, frequency: u16) -> Self {
        self.stream_request = true;
        self.stream_request_frequency = frequency;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.system_id == 0 {
            return Err(ConfigError::InvalidSystemId(self.system_id).into());
        }
        if self.component_id == 0 {
            return Err(ConfigError::InvalidComponentId(self.component_id).into());
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints.into());
        }
        if self.heartbeat && !self.dialect.contains(Heartbeat::message_spec().id) {
            return Err(ConfigError::HeartbeatNotInDialect.into());
        }
        if self.stream_request && !self.dialect.contains(RequestDataStream::message_spec().id) {
            return Err(ConfigError::StreamRequestNotInDialect.into());
        }
        Ok(())
    }
}

impl Debug for NodeConf {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConf")
            .field("system_id", &self.system_id)
            .field("component_id", &self.component_id)
            .field("version", &self.version)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

/// Shared node runtime state: everything the channel and handler threads
/// need.
pub(crate) struct NodeShared {
    pub(crate) system_id: u8,
    pub(crate) component_id: u8,
    pub(crate) version: MavlinkVersion,
    pub(crate) dialect: Arc<Dialect>,
    pub(crate) sequence: AtomicU8,
    pub(crate) signer: Option<FrameSigner>,
    pub(crate) incoming_key: Option<SecretKey>,
    pub(crate) registry: ChannelRegistry,
    pub(crate) events: EventQueue,
    pub(crate) state: Closable,
    stream_requestor: Option<StreamRequestor>,
}

impl NodeShared {
    /// Next value of the node-global sequence counter (wraps at 255).
    pub(crate) fn next_sequence(&self) -> u8 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Encodes a message into raw frame bytes using the node identity,
    /// sequence, and signing state.
    pub(crate) fn encode_with_plan(
        &self,
        plan: &MessagePlan,
        message: &dyn Message,
    ) -> Result<Vec<u8>> {
        let bytes = assemble_frame(
            plan,
            message,
            self.version,
            self.next_sequence(),
            self.system_id,
            self.component_id,
            self.signer.as_ref(),
        )?;
        Ok(bytes)
    }

    /// Hook invoked by channel readers for every valid incoming frame.
    pub(crate) fn on_incoming_frame(self: &Arc<Self>, frame: &Frame, channel: &Channel) {
        if let Some(requestor) = &self.stream_requestor {
            requestor.observe(self, frame, channel);
        }
    }
}

/// A MAVLink node.
///
/// Created from a [`NodeConf`]; closed explicitly with [`Node::close`] or by
/// dropping it. An error on one channel never terminates the node: it is
/// surfaced as an [`Event`] and, for client endpoints, triggers a
/// reconnection.
pub struct Node {
    shared: Arc<NodeShared>,
    closer: Closer,
    events: EventQueue,
}

impl Node {
    /// Validates the configuration, initializes every endpoint, and starts
    /// the node tasks.
    ///
    /// Fails if the configuration is invalid or an endpoint cannot
    /// initialize (for instance, two UDP servers bound to the same address).
    pub fn new(conf: NodeConf) -> Result<Node> {
        conf.validate()?;

        let heartbeat_plan = MessagePlan::new(Heartbeat::message_spec())?;
        let stream_requestor = if conf.stream_request {
            Some(StreamRequestor::new(
                conf.stream_request_frequency,
                MessagePlan::new(RequestDataStream::message_spec())?,
                DialectEntry {
                    spec: Heartbeat::message_spec(),
                    plan: heartbeat_plan.clone(),
                },
            ))
        } else {
            None
        };

        let closer = Closer::new();
        let events = EventQueue::new();

        let shared = Arc::new(NodeShared {
            system_id: conf.system_id,
            component_id: conf.component_id,
            version: conf.version,
            dialect: conf.dialect.clone(),
            sequence: AtomicU8::new(0),
            signer: conf.outgoing_key.map(FrameSigner::new),
            incoming_key: conf.incoming_key,
            registry: ChannelRegistry::new(),
            events: events.clone(),
            state: closer.as_closable(),
            stream_requestor,
        });

        for endpoint in &conf.endpoints {
            if let Err(err) = endpoint.start(EndpointContext::new(shared.clone())) {
                log::debug!("endpoint {endpoint:?} failed to start: {err}");
                closer.close();
                shared.registry.close_all();
                events.close();
                return Err(err);
            }
        }

        if conf.heartbeat {
            HeartbeatEmitter {
                node: shared.clone(),
                period: conf.heartbeat_period,
                plan: heartbeat_plan,
            }
            .spawn();
        }

        Ok(Node {
            shared,
            closer,
            events,
        })
    }

    /// System `ID` of the node.
    pub fn system_id(&self) -> u8 {
        self.shared.system_id
    }

    /// Component `ID` of the node.
    pub fn component_id(&self) -> u8 {
        self.shared.component_id
    }

    /// Outgoing wire version of the node.
    pub fn version(&self) -> MavlinkVersion {
        self.shared.version
    }

    /// Returns an iterator over node events.
    ///
    /// The iterator blocks while the node is live and ends once the node is
    /// closed and in-flight events have been drained. Events are consumed:
    /// the queue has a single consumer.
    pub fn events(&self) -> Events {
        Events::new(self.events.clone())
    }

    /// Encodes a message once and queues it on every channel.
    pub fn write_message_all(&self, message: &dyn Message) -> Result<()> {
        self.write_message(message, None)
    }

    /// Encodes a message once and queues it on every channel except
    /// `channel`.
    pub fn write_message_except(&self, channel: &Channel, message: &dyn Message) -> Result<()> {
        self.write_message(message, Some(channel))
    }

    /// Forwards a received frame on every channel.
    ///
    /// The frame's raw bytes are re-emitted with the original source system
    /// and component `ID`s; only the sequence number is replaced with this
    /// node's counter. A node with an outgoing key re-signs the frame.
    pub fn write_frame_all(&self, frame: &Frame) -> Result<()> {
        self.write_frame(frame, None)
    }

    /// Forwards a received frame on every channel except `channel`.
    ///
    /// This is the routing primitive: consume [`Event::Frame`], decide, and
    /// re-emit everywhere but the originating channel.
    pub fn write_frame_except(&self, channel: &Channel, frame: &Frame) -> Result<()> {
        self.write_frame(frame, Some(channel))
    }

    /// Closes the node: stops the heartbeat, closes all channels, then
    /// closes the event stream. Idempotent.
    pub fn close(&self) {
        if self.closer.is_closed() {
            return;
        }
        log::debug!("closing node {}:{}", self.system_id(), self.component_id());
        self.closer.close();
        self.shared.registry.close_all();
        self.events.close();
    }

    fn write_message(&self, message: &dyn Message, except: Option<&Channel>) -> Result<()> {
        if self.closer.is_closed() {
            return Err(Error::Closed);
        }

        let id = message.spec().id;
        let entry = self
            .shared
            .dialect
            .get(id)
            .filter(|entry| std::ptr::eq(entry.spec, message.spec()))
            .ok_or(FrameError::UnknownId(id))?;

        let bytes = self.shared.encode_with_plan(&entry.plan, message)?;
        self.shared
            .registry
            .send_all(&Arc::new(bytes), except.map(Channel::id));
        Ok(())
    }

    fn write_frame(&self, frame: &Frame, except: Option<&Channel>) -> Result<()> {
        if self.closer.is_closed() {
            return Err(Error::Closed);
        }

        let id = frame.message_id();
        let entry = self
            .shared
            .dialect
            .get(id)
            .ok_or(FrameError::UnknownId(id))?;

        let bytes = reseal_frame(
            frame,
            self.shared.next_sequence(),
            entry.plan.crc_extra(),
            self.shared.signer.as_ref(),
        );
        self.shared
            .registry
            .send_all(&Arc::new(bytes), except.map(Channel::id));
        Ok(())
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("system_id", &self.shared.system_id)
            .field("component_id", &self.shared.component_id)
            .field("version", &self.shared.version)
            .field("channels", &self.shared.registry.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.close();
    }
}
