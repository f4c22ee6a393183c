//! ArduPilot stream requests.
//!
//! ArduPilot-family autopilots send telemetry streams only when asked to.
//! When enabled, the node answers heartbeats coming from such devices with a
//! `REQUEST_DATA_STREAM` at the configured rate, at most once per device
//! within the request window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::consts::STREAM_REQUEST_PERIOD;
use crate::io::Channel;
use crate::node::{Event, NodeShared};
use crate::protocol::minimal::{Heartbeat, MavAutopilot, RequestDataStream};
use crate::protocol::{decode_payload, DialectEntry, Frame, MessagePlan};
use crate::utils::UniqueId;

pub(crate) struct StreamRequestor {
    frequency: u16,
    plan: MessagePlan,
    heartbeat_entry: DialectEntry,
    recent: Mutex<HashMap<(UniqueId, u8, u8), Instant>>,
}

impl StreamRequestor {
    pub(crate) fn new(frequency: u16, plan: MessagePlan, heartbeat_entry: DialectEntry) -> Self {
        Self {
            frequency,
            plan,
            heartbeat_entry,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Inspects an incoming frame; answers ArduPilot heartbeats with a
    /// stream request on the originating channel.
    pub(crate) fn observe(&self, node: &Arc<NodeShared>, frame: &Frame, channel: &Channel) {
        if frame.message_id() != 0 {
            return;
        }

        // The node dialect may declare its own heartbeat type; go through
        // the wire payload instead of downcasting.
        let Ok(message) = decode_payload(&self.heartbeat_entry, frame.payload(), frame.version())
        else {
            return;
        };
        let Some(heartbeat) = message.downcast_ref::<Heartbeat>() else {
            return;
        };
        if heartbeat.autopilot != MavAutopilot::Ardupilotmega {
            return;
        }

        let key = (channel.id(), frame.system_id(), frame.component_id());
        {
            let mut recent = self.recent.lock().unwrap();
            if let Some(last) = recent.get(&key) {
                if last.elapsed() < STREAM_REQUEST_PERIOD {
                    return;
                }
            }
            recent.insert(key, Instant::now());
        }

        let request = RequestDataStream {
            target_system: frame.system_id(),
            target_component: frame.component_id(),
            req_stream_id: 0,
            req_message_rate: self.frequency,
            start_stop: 1,
        };

        match node.encode_with_plan(&self.plan, &request) {
            Ok(bytes) => {
                log::debug!("[{channel}] requesting streams at {} Hz", self.frequency);
                if node.registry.send_to(channel.id(), Arc::new(bytes)) {
                    node.events.push(Event::StreamRequested(channel.clone()));
                }
            }
            Err(err) => log::trace!("[{channel}] stream request can't be encoded: {err}"),
        }
    }
}
