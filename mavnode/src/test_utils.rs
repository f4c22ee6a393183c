//! Message declarations used across the crate's test-suite.
//!
//! The messages mirror a slice of the common MAVLink dialect and exercise
//! every declaration feature: arrays, char strings, extension fields, and
//! wire-name overrides. Golden byte vectors for them live in the codec
//! tests.

use crate::protocol::derive::Message;
use crate::protocol::Dialect;

/// General system state.
#[derive(Clone, Debug, Default, PartialEq, Message)]
#[message_id(1)]
pub struct SysStatus {
    /// Sensors present in the system.
    pub onboard_control_sensors_present: u32,
    /// Sensors enabled in the system.
    pub onboard_control_sensors_enabled: u32,
    /// Sensors with an error (or not operational).
    pub onboard_control_sensors_health: u32,
    /// Maximum usage of the mainloop time, in 0.1%.
    pub load: u16,
    /// Battery voltage, mV.
    pub voltage_battery: u16,
    /// Battery current, 10 mA.
    pub current_battery: i16,
    /// Remaining battery energy, %.
    pub battery_remaining: i8,
    /// Communication drop rate, in 0.01%.
    pub drop_rate_comm: u16,
    /// Communication errors.
    pub errors_comm: u16,
    /// Autopilot-specific error count.
    pub errors_count1: u16,
    /// Autopilot-specific error count.
    pub errors_count2: u16,
    /// Autopilot-specific error count.
    pub errors_count3: u16,
    /// Autopilot-specific error count.
    pub errors_count4: u16,
}

/// Request to control this MAV.
#[derive(Clone, Debug, Default, PartialEq, Message)]
#[message_id(5)]
pub struct ChangeOperatorControl {
    /// System the GCS requests control for.
    pub target_system: u8,
    /// `0` to request control, `1` to release control.
    pub control_request: u8,
    /// Talk-back version.
    pub version: u8,
    /// Password / key.
    #[string_len(25)]
    pub passkey: String,
}

/// Attitude quaternion with covariance.
#[derive(Clone, Debug, Default, PartialEq, Message)]
#[message_id(61)]
pub struct AttitudeQuaternionCov {
    /// Timestamp, µs.
    pub time_usec: u64,
    /// Quaternion components.
    pub q: [f32; 4],
    /// Roll angular speed, rad/s.
    pub rollspeed: f32,
    /// Pitch angular speed, rad/s.
    pub pitchspeed: f32,
    /// Yaw angular speed, rad/s.
    pub yawspeed: f32,
    /// Attitude covariance matrix.
    pub covariance: [f32; 9],
}

/// Optical flow from a flow sensor.
#[derive(Clone, Debug, Default, PartialEq, Message)]
#[message_id(100)]
pub struct OpticalFlow {
    /// Timestamp, µs.
    pub time_usec: u64,
    /// Sensor `ID`.
    pub sensor_id: u8,
    /// Flow in x-sensor direction.
    pub flow_x: i16,
    /// Flow in y-sensor direction.
    pub flow_y: i16,
    /// Flow in x-sensor direction, angular-speed compensated.
    pub flow_comp_m_x: f32,
    /// Flow in y-sensor direction, angular-speed compensated.
    pub flow_comp_m_y: f32,
    /// Optical flow quality.
    pub quality: u8,
    /// Ground distance, m.
    pub ground_distance: f32,
    /// Flow rate about the x axis.
    #[extension]
    pub flow_rate_x: f32,
    /// Flow rate about the y axis.
    #[extension]
    pub flow_rate_y: f32,
}

/// Status of the DCM attitude estimator.
#[derive(Clone, Debug, Default, PartialEq, Message)]
#[message_id(163)]
pub struct Ahrs {
    /// X gyro drift estimate, rad/s.
    #[field_name("omegaIx")]
    pub omega_ix: f32,
    /// Y gyro drift estimate, rad/s.
    #[field_name("omegaIy")]
    pub omega_iy: f32,
    /// Z gyro drift estimate, rad/s.
    #[field_name("omegaIz")]
    pub omega_iz: f32,
    /// Average accel_weight.
    pub accel_weight: f32,
    /// Average renormalization value.
    pub renorm_val: f32,
    /// Average error roll/pitch value.
    pub error_rp: f32,
    /// Average error yaw value.
    pub error_yaw: f32,
}

/// Play a tune on the vehicle buzzer.
#[derive(Clone, Debug, Default, PartialEq, Message)]
#[message_id(258)]
pub struct PlayTune {
    /// Target system.
    pub target_system: u8,
    /// Target component.
    pub target_component: u8,
    /// Tune in board-specific format.
    #[string_len(30)]
    pub tune: String,
    /// Tune extension, exclusive to MAVLink 2.
    #[extension]
    #[string_len(200)]
    pub tune2: String,
}

/// Time-ordered sequence of trajectory waypoints.
#[derive(Clone, Debug, Default, PartialEq, Message)]
#[message_id(332)]
pub struct TrajectoryRepresentationWaypoints {
    /// Timestamp, µs.
    pub time_usec: u64,
    /// Number of valid points.
    pub valid_points: u8,
    /// X positions, m.
    pub pos_x: [f32; 5],
    /// Y positions, m.
    pub pos_y: [f32; 5],
    /// Z positions, m.
    pub pos_z: [f32; 5],
    /// X velocities, m/s.
    pub vel_x: [f32; 5],
    /// Y velocities, m/s.
    pub vel_y: [f32; 5],
    /// Z velocities, m/s.
    pub vel_z: [f32; 5],
    /// X accelerations, m/s².
    pub acc_x: [f32; 5],
    /// Y accelerations, m/s².
    pub acc_y: [f32; 5],
    /// Z accelerations, m/s².
    pub acc_z: [f32; 5],
    /// Yaw angles, rad.
    pub pos_yaw: [f32; 5],
    /// Yaw rates, rad/s.
    pub vel_yaw: [f32; 5],
    /// Commands associated with the waypoints.
    pub command: [u16; 5],
}

/// A dialect containing the built-in minimal messages plus every message of
/// this module.
pub fn testing_dialect() -> Dialect {
    use crate::protocol::minimal::{Heartbeat, RequestDataStream};

    Dialect::new(&[
        Heartbeat::message_spec(),
        RequestDataStream::message_spec(),
        SysStatus::message_spec(),
        ChangeOperatorControl::message_spec(),
        AttitudeQuaternionCov::message_spec(),
        OpticalFlow::message_spec(),
        Ahrs::message_spec(),
        PlayTune::message_spec(),
        TrajectoryRepresentationWaypoints::message_spec(),
    ])
    .expect("the testing dialect is valid")
}
