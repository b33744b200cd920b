use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

/// Semantic, model-independent name of a device attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Command {
    /// Cleaning is in progress
    Running,
    /// Manual driving direction
    Direction,
    /// Selected cleaning program
    WorkMode,
    /// What the robot is currently doing
    WorkStatus,
    /// Return to the charging base
    ReturnHome,
    /// Suction power
    FanSpeed,
    /// Make the robot beep
    FindRobot,
    /// Battery charge in percent
    BatteryLevel,
    /// Current device error
    Error,
    /// Multiplexed command code used by some newer models
    SpecialCommand,
}

impl Command {
    /// Every command of the vocabulary
    pub const ALL: [Self; 10] = [
        Self::Running,
        Self::Direction,
        Self::WorkMode,
        Self::WorkStatus,
        Self::ReturnHome,
        Self::FanSpeed,
        Self::FindRobot,
        Self::BatteryLevel,
        Self::Error,
        Self::SpecialCommand,
    ];
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Direction => write!(f, "Direction"),
            Self::WorkMode => write!(f, "Work Mode"),
            Self::WorkStatus => write!(f, "Work Status"),
            Self::ReturnHome => write!(f, "Return Home"),
            Self::FanSpeed => write!(f, "Fan Speed"),
            Self::FindRobot => write!(f, "Find Robot"),
            Self::BatteryLevel => write!(f, "Battery Level"),
            Self::Error => write!(f, "Error"),
            Self::SpecialCommand => write!(f, "Special Command"),
        }
    }
}

/// How a command's raw wire value is decoded and validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// JSON boolean
    Boolean,
    /// JSON integer that fits in an `i64`
    ///
    /// Fractions and larger unsigned values are not narrowed; they decode to
    /// [`CommandValue::Unexpected`] with the raw JSON kept.
    Number,
    /// Vendor string token mapped to a [`SemanticValue`]
    StringEnum,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "Boolean"),
            Self::Number => write!(f, "Number"),
            Self::StringEnum => write!(f, "String"),
        }
    }
}

/// Stable meaning of a vendor string token
///
/// Several raw tokens may alias one semantic value. Ids are only meaningful
/// within one model's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SemanticValue {
    /// Identity used for reverse lookups when writing
    pub id: u16,
    /// Human readable description
    pub friendly_message: &'static str,
}

impl SemanticValue {
    /// Create a new semantic value
    #[must_use]
    pub const fn new(id: u16, friendly_message: &'static str) -> Self {
        Self {
            id,
            friendly_message,
        }
    }
}

impl fmt::Display for SemanticValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.friendly_message)
    }
}

/// Decoded value of a string-kind command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StringValue {
    /// Token found in the model's string table
    Mapped(SemanticValue),
    /// Token not (yet) present in the string table, kept verbatim
    Unmapped(String),
}

impl StringValue {
    /// The semantic value, if the token was mapped
    #[must_use]
    pub const fn semantic(&self) -> Option<&SemanticValue> {
        match self {
            Self::Mapped(value) => Some(value),
            Self::Unmapped(_) => None,
        }
    }

    /// Semantic id, if the token was mapped
    #[must_use]
    pub const fn id(&self) -> Option<u16> {
        match self {
            Self::Mapped(value) => Some(value.id),
            Self::Unmapped(_) => None,
        }
    }
}

impl fmt::Display for StringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mapped(value) => write!(f, "{value}"),
            Self::Unmapped(raw) => write!(f, "{raw}"),
        }
    }
}

/// Decoded value of one command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CommandValue {
    /// Boolean command value
    Boolean(bool),
    /// Numeric command value
    Number(i64),
    /// String-enum command value
    Text(StringValue),
    /// Raw value whose JSON type did not match the command's kind
    Unexpected(serde_json::Value),
}

impl CommandValue {
    /// Name of the value's kind, used in error messages
    #[must_use]
    pub fn kind_name(&self) -> String {
        match self {
            Self::Boolean(_) => ValueKind::Boolean.to_string(),
            Self::Number(_) => ValueKind::Number.to_string(),
            Self::Text(_) => ValueKind::StringEnum.to_string(),
            Self::Unexpected(raw) => format!("unexpected JSON {raw}"),
        }
    }

    /// Boolean payload
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric payload
    #[must_use]
    pub const fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// String-enum payload
    #[must_use]
    pub const fn as_text(&self) -> Option<&StringValue> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for CommandValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for CommandValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<SemanticValue> for CommandValue {
    fn from(value: SemanticValue) -> Self {
        Self::Text(StringValue::Mapped(value))
    }
}

impl fmt::Display for CommandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
            Self::Unexpected(raw) => write!(f, "{raw}"),
        }
    }
}

/// Last known values of every command reported by a device
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RobovacStatus {
    values: HashMap<Command, CommandValue>,
}

impl RobovacStatus {
    /// Value of a command, if it has been reported
    #[must_use]
    pub fn get(&self, command: Command) -> Option<&CommandValue> {
        self.values.get(&command)
    }

    /// Store a value, returning `true` if it differs from the previous one
    pub fn set(&mut self, command: Command, value: CommandValue) -> bool {
        match self.values.insert(command, value) {
            Some(previous) => self.values.get(&command) != Some(&previous),
            None => true,
        }
    }

    /// Number of commands with a known value
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no command has been reported yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over all known values
    pub fn iter(&self) -> impl Iterator<Item = (&Command, &CommandValue)> {
        self.values.iter()
    }

    /// Running state
    #[must_use]
    pub fn running(&self) -> Option<bool> {
        self.get(Command::Running).and_then(CommandValue::as_bool)
    }

    /// Manual driving direction
    #[must_use]
    pub fn direction(&self) -> Option<StringValue> {
        self.text(Command::Direction)
    }

    /// Cleaning program
    #[must_use]
    pub fn work_mode(&self) -> Option<StringValue> {
        self.text(Command::WorkMode)
    }

    /// Work status
    #[must_use]
    pub fn work_status(&self) -> Option<StringValue> {
        self.text(Command::WorkStatus)
    }

    /// Return-home flag
    #[must_use]
    pub fn return_home(&self) -> Option<bool> {
        self.get(Command::ReturnHome).and_then(CommandValue::as_bool)
    }

    /// Fan speed
    #[must_use]
    pub fn fan_speed(&self) -> Option<StringValue> {
        self.text(Command::FanSpeed)
    }

    /// Find-robot flag
    #[must_use]
    pub fn find_robot(&self) -> Option<bool> {
        self.get(Command::FindRobot).and_then(CommandValue::as_bool)
    }

    /// Battery level in percent
    #[must_use]
    pub fn battery_level(&self) -> Option<i64> {
        self.get(Command::BatteryLevel)
            .and_then(CommandValue::as_number)
    }

    /// Device error
    #[must_use]
    pub fn error_code(&self) -> Option<StringValue> {
        self.text(Command::Error)
    }

    fn text(&self, command: Command) -> Option<StringValue> {
        self.get(command).and_then(CommandValue::as_text).cloned()
    }
}

/// Connection lifecycle of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection, or the last operation failed
    Disconnected,
    /// Discovery or connect in progress
    Connecting,
    /// Transport reports an open session
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Device address and credentials
///
/// Opaque to the state engine apart from `device_ip`: without an address the
/// device is located with a discovery broadcast before connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Tuya device id
    pub device_id: String,
    /// Tuya local key
    pub local_key: String,
    /// Fixed device address
    #[serde(default)]
    pub device_ip: Option<String>,
    /// Tuya protocol version
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

fn default_protocol_version() -> String {
    "3.3".to_string()
}

impl ConnectionConfig {
    /// Create a config without a fixed address
    #[must_use]
    pub fn new(device_id: impl Into<String>, local_key: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            local_key: local_key.into(),
            device_ip: None,
            protocol_version: default_protocol_version(),
        }
    }

    /// Set a fixed device address
    #[must_use]
    pub fn with_ip(mut self, device_ip: impl Into<String>) -> Self {
        self.device_ip = Some(device_ip.into());
        self
    }

    /// True when the device can be connected without discovery
    #[must_use]
    pub fn is_direct_connect(&self) -> bool {
        self.device_ip.as_deref().is_some_and(|ip| !ip.is_empty())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

/// Configuration of one RoboVac device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobovacConfig {
    /// Hardware model id, e.g. `T2118`
    #[serde(default)]
    pub model: Option<String>,
    /// How long a fetched status is served from cache, in milliseconds
    #[serde(default = "default_caching_duration_ms")]
    pub caching_duration_ms: u64,
    /// Deadline for presentation-layer reads, in milliseconds
    #[serde(default = "default_callback_timeout_ms")]
    pub callback_timeout_ms: u64,
    /// Device address and credentials
    #[serde(default)]
    pub connection: ConnectionConfig,
}

const fn default_caching_duration_ms() -> u64 {
    60_000
}

const fn default_callback_timeout_ms() -> u64 {
    1_000
}

impl Default for RobovacConfig {
    fn default() -> Self {
        Self {
            model: None,
            caching_duration_ms: default_caching_duration_ms(),
            callback_timeout_ms: default_callback_timeout_ms(),
            connection: ConnectionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display() {
        assert_eq!(Command::WorkMode.to_string(), "Work Mode");
        assert_eq!(Command::BatteryLevel.to_string(), "Battery Level");
        assert_eq!(Command::ALL.len(), 10);
    }

    #[test]
    fn test_status_set_reports_changes() {
        let mut status = RobovacStatus::default();
        assert!(status.is_empty());

        assert!(status.set(Command::Running, CommandValue::Boolean(true)));
        assert!(!status.set(Command::Running, CommandValue::Boolean(true)));
        assert!(status.set(Command::Running, CommandValue::Boolean(false)));

        assert_eq!(status.running(), Some(false));
        assert_eq!(status.len(), 1);
    }

    #[test]
    fn test_typed_status_getters() {
        let stuck = SemanticValue::new(101, "The robovac is stuck for more than 5 minutes");
        let mut status = RobovacStatus::default();
        status.set(Command::BatteryLevel, CommandValue::Number(57));
        status.set(Command::Error, stuck.into());
        status.set(
            Command::WorkStatus,
            CommandValue::Text(StringValue::Unmapped("BgoAEAUyAA==".to_string())),
        );

        assert_eq!(status.battery_level(), Some(57));
        assert_eq!(status.error_code().and_then(|e| e.id()), Some(101));
        assert_eq!(
            status.work_status().map(|s| s.to_string()),
            Some("BgoAEAUyAA==".to_string())
        );
        assert_eq!(status.running(), None);
    }

    #[test]
    fn test_unexpected_value_is_not_typed() {
        let mut status = RobovacStatus::default();
        status.set(
            Command::Running,
            CommandValue::Unexpected(serde_json::json!("true")),
        );
        assert_eq!(status.running(), None);
        assert!(status.get(Command::Running).is_some());
    }

    #[test]
    fn test_config_defaults() {
        let config = RobovacConfig::default();
        assert_eq!(config.caching_duration_ms, 60_000);
        assert_eq!(config.callback_timeout_ms, 1_000);
        assert!(config.model.is_none());
        assert!(!config.connection.is_direct_connect());
        assert_eq!(config.connection.protocol_version, "3.3");
    }

    #[test]
    fn test_direct_connect() {
        let config = ConnectionConfig::new("id", "key").with_ip("192.168.1.20");
        assert!(config.is_direct_connect());

        let empty = ConnectionConfig::new("id", "key").with_ip("");
        assert!(!empty.is_direct_connect());
    }

    #[test]
    fn test_config_deserialization() {
        let config: RobovacConfig = serde_json::from_str(
            r#"{"model":"T2118","connection":{"device_id":"abc","local_key":"k"}}"#,
        )
        .unwrap();
        assert_eq!(config.model.as_deref(), Some("T2118"));
        assert_eq!(config.caching_duration_ms, 60_000);
        assert_eq!(config.connection.device_id, "abc");
        assert!(config.connection.device_ip.is_none());
    }
}
