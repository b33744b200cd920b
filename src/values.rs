//! Semantic values shared by the model tables
//!
//! Each type groups the [`SemanticValue`]s of one string-kind command. The raw
//! vendor tokens that map onto them live in the per-model tables.

use crate::types::{SemanticValue, StringValue};

/// Manual driving directions
pub struct Direction;

impl Direction {
    /// Drive forwards
    pub const FORWARD: SemanticValue = SemanticValue::new(0, "forwards");
    /// Turn left
    pub const LEFT: SemanticValue = SemanticValue::new(1, "left");
    /// Turn right
    pub const RIGHT: SemanticValue = SemanticValue::new(2, "right");
    /// Drive backwards
    pub const BACK: SemanticValue = SemanticValue::new(3, "backwards");
    /// Stop moving
    pub const BRAKE: SemanticValue = SemanticValue::new(4, "brake");
}

/// Cleaning programs
pub struct WorkMode;

impl WorkMode {
    /// Program not recognised
    pub const UNKNOWN: SemanticValue = SemanticValue::new(0, "unknown");
    /// Automatic cleaning
    pub const AUTO: SemanticValue = SemanticValue::new(1, "auto");
    /// Small room program
    pub const SMALL_ROOM: SemanticValue = SemanticValue::new(2, "small room");
    /// Spot cleaning
    pub const SPOT: SemanticValue = SemanticValue::new(3, "spot");
    /// Edge cleaning
    pub const EDGE: SemanticValue = SemanticValue::new(4, "edge");
    /// Driving without suction
    pub const NO_SWEEP: SemanticValue = SemanticValue::new(5, "no sweep");
    /// Paused
    pub const PAUSE: SemanticValue = SemanticValue::new(6, "pause");
    /// Heading back to the base
    pub const RETURN_HOME: SemanticValue = SemanticValue::new(7, "return home");
    /// Vacuum and mop in one pass
    pub const VACUUM_AND_MOP: SemanticValue = SemanticValue::new(8, "vacuum and mop");
    /// Idle
    pub const STANDBY: SemanticValue = SemanticValue::new(9, "standby");
    /// Clean a single room
    pub const SINGLE_ROOM: SemanticValue = SemanticValue::new(10, "single room");
}

/// What the robot is currently doing
pub struct WorkStatus;

impl WorkStatus {
    /// Status not recognised
    pub const UNKNOWN: SemanticValue = SemanticValue::new(0, "Unknown");
    /// Cleaning
    pub const RUNNING: SemanticValue = SemanticValue::new(1, "Running");
    /// Paused
    pub const PAUSED: SemanticValue = SemanticValue::new(2, "Paused");
    /// Idle
    pub const STANDBY: SemanticValue = SemanticValue::new(3, "Standby");
    /// Sleeping
    pub const SLEEPING: SemanticValue = SemanticValue::new(4, "Sleeping");
    /// Charging on the base
    pub const CHARGING: SemanticValue = SemanticValue::new(5, "Charging");
    /// Fully charged
    pub const CHARGING_COMPLETED: SemanticValue = SemanticValue::new(6, "Charging completed");
    /// Battery must be recharged
    pub const RECHARGE_NEEDED: SemanticValue = SemanticValue::new(7, "Recharge needed");
    /// Cleaning a room
    pub const ROOM_CLEANING: SemanticValue = SemanticValue::new(8, "Room cleaning");
    /// Locating itself inside a room
    pub const ROOM_POSITIONING: SemanticValue = SemanticValue::new(9, "Room positioning");
    /// Heading back to the base
    pub const RETURNING_HOME: SemanticValue = SemanticValue::new(10, "Returning home");
    /// Station is adding water
    pub const ADDING_WATER: SemanticValue = SemanticValue::new(11, "Adding water");
    /// Station is drying the mop
    pub const DRYING_MOP: SemanticValue = SemanticValue::new(12, "Drying mop");
    /// Station is washing the mop
    pub const WASHING_MOP: SemanticValue = SemanticValue::new(13, "Washing mop");
    /// Station is removing dirty water
    pub const REMOVING_WATER: SemanticValue = SemanticValue::new(14, "Removing dirty water");
    /// Driven manually
    pub const MANUAL_CONTROL: SemanticValue = SemanticValue::new(15, "Manual control");
    /// Station is emptying the dust bin
    pub const EMPTYING_DUST: SemanticValue = SemanticValue::new(16, "Emptying dust");
    /// Automatic cleaning
    pub const AUTO_CLEANING: SemanticValue = SemanticValue::new(17, "Auto cleaning");
    /// Temporary trip to the base mid-clean
    pub const TEMPORARY_RETURN: SemanticValue = SemanticValue::new(18, "Temporary return");
    /// Locating the spot to clean
    pub const SPOT_POSITIONING: SemanticValue = SemanticValue::new(19, "Spot positioning");
    /// Device reports an error
    pub const ERROR: SemanticValue = SemanticValue::new(99, "Error");

    /// True when the status means the robot sits on its charger
    #[must_use]
    pub fn is_charging(status: &StringValue) -> bool {
        status
            .semantic()
            .is_some_and(|s| s.id == Self::CHARGING.id || s.id == Self::CHARGING_COMPLETED.id)
    }
}

/// Suction power levels
pub struct FanSpeed;

impl FanSpeed {
    /// Standard suction
    pub const STANDARD: SemanticValue = SemanticValue::new(0, "Standard");
    /// Automatic boost on carpets
    pub const BOOST_IQ: SemanticValue = SemanticValue::new(1, "Boost IQ");
    /// Suction off
    pub const NO_SUCTION: SemanticValue = SemanticValue::new(2, "No Suction");
    /// Maximum suction
    pub const MAX: SemanticValue = SemanticValue::new(3, "Max");
    /// Turbo suction
    pub const TURBO: SemanticValue = SemanticValue::new(4, "Turbo");
    /// Quiet suction
    pub const QUIET: SemanticValue = SemanticValue::new(5, "Quiet");
}

/// Actions multiplexed onto one data point by newer models
pub struct SpecialCommand;

impl SpecialCommand {
    /// Return to the base
    pub const RETURN_HOME: SemanticValue = SemanticValue::new(0, "Return home");
    /// Make the robot beep
    pub const FIND_ROBOT: SemanticValue = SemanticValue::new(1, "Find robot");
}

/// Device error codes
pub struct DeviceError;

impl DeviceError {
    /// No error
    pub const NO_ERROR: SemanticValue = SemanticValue::new(0, "No error");
    /// Stuck for a while
    pub const STUCK_5_MIN: SemanticValue =
        SemanticValue::new(101, "The robovac is stuck for more than 5 minutes");
    /// Bumper jammed
    pub const CRASH_BAR_STUCK: SemanticValue = SemanticValue::new(102, "The crash bar is stuck");
    /// Dirty cliff or wall sensor
    pub const SENSOR_DIRTY: SemanticValue = SemanticValue::new(103, "A sensor is dirty");
    /// Battery too low to continue
    pub const NOT_ENOUGH_POWER: SemanticValue =
        SemanticValue::new(104, "The robovac does not have enough power");
    /// Wheel jammed
    pub const WHEEL_STUCK: SemanticValue = SemanticValue::new(105, "A wheel is stuck");
    /// Side brush jammed
    pub const SIDE_BRUSH_STUCK: SemanticValue = SemanticValue::new(106, "The side brush is stuck");
    /// Rolling brush jammed
    pub const ROLLER_BRUSH_STUCK: SemanticValue =
        SemanticValue::new(107, "The rolling brush is stuck");
    /// Fan jammed
    pub const FAN_STUCK: SemanticValue = SemanticValue::new(108, "The fan is stuck");

    /// True when the value reports an actual error
    ///
    /// Unmapped tokens count as errors: a new error code is far more likely
    /// than a new spelling of "no error".
    #[must_use]
    pub fn is_error(value: &StringValue) -> bool {
        value.id() != Some(Self::NO_ERROR.id)
    }
}
