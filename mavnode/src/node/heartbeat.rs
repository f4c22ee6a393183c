//! Periodic heartbeat emission.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::node::NodeShared;
use crate::protocol::minimal::{Heartbeat, MavAutopilot, MavState, MavType};
use crate::protocol::MessagePlan;
use crate::utils::sleep_while_open;

/// MAVLink protocol version reported inside emitted heartbeats.
const MAVLINK_VERSION: u8 = 3;

pub(crate) struct HeartbeatEmitter {
    pub(crate) node: Arc<NodeShared>,
    pub(crate) period: Duration,
    pub(crate) plan: MessagePlan,
}

impl HeartbeatEmitter {
    /// Spawns the emitter thread. It broadcasts a heartbeat with the node
    /// identity on every channel until the node is closed.
    pub(crate) fn spawn(self) {
        thread::spawn(move || {
            let message = Heartbeat {
                type_: MavType::Gcs,
                autopilot: MavAutopilot::Generic,
                base_mode: 0,
                custom_mode: 0,
                system_status: MavState::Active,
                mavlink_version: MAVLINK_VERSION,
            };

            loop {
                if self.node.state.is_closed() {
                    break;
                }

                match self.node.encode_with_plan(&self.plan, &message) {
                    Ok(bytes) => {
                        log::trace!("broadcasting heartbeat");
                        self.node.registry.send_all(&Arc::new(bytes), None);
                    }
                    Err(err) => log::trace!("heartbeat can't be encoded: {err}"),
                }

                sleep_while_open(&self.node.state, self.period);
            }
            log::debug!("heartbeat emitter stopped");
        });
    }
}
