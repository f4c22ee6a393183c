//! Built-in minimal dialect.
//!
//! Ships the two messages the node runtime itself emits: [`Heartbeat`]
//! (id 0) and [`RequestDataStream`] (id 66). They can also serve as a
//! starter dialect for applications that only track liveness:
//!
//! ```rust
//! use mavnode::protocol::Dialect;
//!
//! let dialect = Dialect::minimal();
//! assert!(dialect.contains(0));
//! ```

use crate::protocol::derive::{Enum, Message};

/// Vehicle or component type.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Enum)]
pub enum MavType {
    /// Generic micro air vehicle.
    #[default]
    Generic = 0,
    /// Fixed wing aircraft.
    FixedWing = 1,
    /// Quadrotor.
    Quadrotor = 2,
    /// Coaxial helicopter.
    Coaxial = 3,
    /// Normal helicopter with tail rotor.
    Helicopter = 4,
    /// Ground installation.
    AntennaTracker = 5,
    /// Operator control unit / ground control station.
    Gcs = 6,
    /// Airship, controlled.
    Airship = 7,
    /// Free balloon, uncontrolled.
    FreeBalloon = 8,
    /// Rocket.
    Rocket = 9,
    /// Ground rover.
    GroundRover = 10,
    /// Surface vessel, boat, ship.
    SurfaceBoat = 11,
    /// Submarine.
    Submarine = 12,
    /// Hexarotor.
    Hexarotor = 13,
    /// Octorotor.
    Octorotor = 14,
    /// Tricopter.
    Tricopter = 15,
    /// Flapping wing.
    FlappingWing = 16,
    /// Kite.
    Kite = 17,
    /// Onboard companion controller.
    OnboardController = 18,
}

/// Autopilot type / class.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Enum)]
pub enum MavAutopilot {
    /// Generic autopilot.
    #[default]
    Generic = 0,
    /// Reserved.
    Reserved = 1,
    /// SLUGS autopilot.
    Slugs = 2,
    /// ArduPilot autopilot.
    Ardupilotmega = 3,
    /// OpenPilot.
    Openpilot = 4,
    /// Generic autopilot only supporting simple waypoints.
    GenericWaypointsOnly = 5,
    /// Generic autopilot supporting waypoints and other simple navigation
    /// commands.
    GenericWaypointsAndSimpleNavigationOnly = 6,
    /// Generic autopilot supporting the full mission command set.
    GenericMissionFull = 7,
    /// No valid autopilot.
    Invalid = 8,
    /// PPZ UAV.
    Ppz = 9,
    /// UAV Dev Board.
    Udb = 10,
    /// FlexiPilot.
    Fp = 11,
    /// PX4 autopilot.
    Px4 = 12,
}

/// System status flag.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Enum)]
pub enum MavState {
    /// Uninitialized system.
    #[default]
    Uninit = 0,
    /// Booting.
    Boot = 1,
    /// Calibrating, not ready to fly.
    Calibrating = 2,
    /// Grounded and on standby.
    Standby = 3,
    /// Active, motors may be engaged.
    Active = 4,
    /// Non-normal flight mode, can still navigate.
    Critical = 5,
    /// Lost control over whole or parts of the airframe.
    Emergency = 6,
    /// Shutting down.
    Poweroff = 7,
    /// Flight termination in progress.
    FlightTermination = 8,
}

/// The heartbeat message shows that a system or component is present and
/// responding.
#[derive(Clone, Debug, Default, PartialEq, Message)]
#[message_id(0)]
pub struct Heartbeat {
    /// Vehicle or component type.
    #[base_type(u8)]
    pub type_: MavType,
    /// Autopilot type.
    #[base_type(u8)]
    pub autopilot: MavAutopilot,
    /// System mode bitmap.
    pub base_mode: u8,
    /// Autopilot-specific flags.
    pub custom_mode: u32,
    /// System status flag.
    #[base_type(u8)]
    pub system_status: MavState,
    /// MAVLink version.
    pub mavlink_version: u8,
}

/// Requests a data stream (ArduPilot-specific rate control).
#[derive(Clone, Debug, Default, PartialEq, Message)]
#[message_id(66)]
pub struct RequestDataStream {
    /// Target requested to send the stream.
    pub target_system: u8,
    /// Target requested to send the stream.
    pub target_component: u8,
    /// The `ID` of the requested data stream.
    pub req_stream_id: u8,
    /// Requested message rate, Hz.
    pub req_message_rate: u16,
    /// `1` to start sending, `0` to stop.
    pub start_stop: u8,
}
