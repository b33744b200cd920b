//! Static command tables of the supported RoboVac models
//!
//! Every model is described by a [`ModelDefinition`]: the commands it takes
//! unchanged from the shared [`DEFAULT_COMMANDS`] table plus its own overrides.
//! The merged list is indexed into a [`ModelRegistry`] when a device is set up.
//!
//! Data point codes and tokens follow the community reverse engineering of the
//! Eufy app (<https://github.com/damacus/robovac>).

use tracing::debug;

use crate::{
    error::{Result, RobovacError},
    registry::{CommandSpec, ModelRegistry, StringTable},
    types::{Command, SemanticValue, ValueKind},
    values::{DeviceError, Direction, FanSpeed, SpecialCommand, WorkMode, WorkStatus},
};

/// Model id used for hardware without a dedicated table
pub const FALLBACK_MODEL_ID: &str = "T0000";

type TokenTable = &'static [(&'static str, SemanticValue)];

/// Compile-time description of one command spec
#[derive(Debug, Clone, Copy)]
pub struct SpecDef {
    /// Semantic command
    pub command: Command,
    /// Data point code
    pub code: u32,
    /// Value kind
    pub kind: ValueKind,
    /// Token table for string commands
    pub tokens: Option<TokenTable>,
}

impl SpecDef {
    const fn boolean(command: Command, code: u32) -> Self {
        Self {
            command,
            code,
            kind: ValueKind::Boolean,
            tokens: None,
        }
    }

    const fn number(command: Command, code: u32) -> Self {
        Self {
            command,
            code,
            kind: ValueKind::Number,
            tokens: None,
        }
    }

    const fn string(command: Command, code: u32, tokens: TokenTable) -> Self {
        Self {
            command,
            code,
            kind: ValueKind::StringEnum,
            tokens: Some(tokens),
        }
    }

    const fn raw_string(command: Command, code: u32) -> Self {
        Self {
            command,
            code,
            kind: ValueKind::StringEnum,
            tokens: None,
        }
    }

    fn to_spec(self) -> CommandSpec {
        CommandSpec {
            command: self.command,
            code: self.code,
            kind: self.kind,
            string_values: self
                .tokens
                .map(|tokens| StringTable::new(tokens.iter().copied())),
        }
    }
}

/// Commands a model inherits from the default table, plus its own specs
#[derive(Debug, Clone, Copy)]
pub struct ModelDefinition {
    /// Commands copied unchanged from [`DEFAULT_COMMANDS`]
    pub inherits: &'static [Command],
    /// Model specific specs, replacing inherited ones with the same command
    pub overrides: &'static [SpecDef],
}

impl ModelDefinition {
    /// Merge the inherited defaults with the overrides
    #[must_use]
    pub fn specs(&self) -> Vec<CommandSpec> {
        let mut specs: Vec<CommandSpec> = self
            .inherits
            .iter()
            .filter_map(|command| DEFAULT_COMMANDS.iter().find(|d| d.command == *command))
            .map(|def| def.to_spec())
            .collect();

        for def in self.overrides {
            let spec = def.to_spec();
            match specs.iter_mut().find(|s| s.command == spec.command) {
                Some(existing) => *existing = spec,
                None => specs.push(spec),
            }
        }

        specs
    }
}

/// A model id with its name and command table
#[derive(Debug, Clone, Copy)]
pub struct SupportedModel {
    /// Model id as printed on the device, e.g. `T2118`
    pub model_id: &'static str,
    /// Marketing name
    pub model_name: &'static str,
    /// Command table
    pub definition: &'static ModelDefinition,
}

impl SupportedModel {
    /// Build the registry of this model
    ///
    /// # Errors
    ///
    /// Returns [`RobovacError::DuplicateSpec`] if the table is inconsistent.
    pub fn registry(&self) -> Result<ModelRegistry> {
        ModelRegistry::new(self.model_id, self.model_name, self.definition.specs())
    }
}

const ERROR_TOKENS: TokenTable = &[
    ("no_error", DeviceError::NO_ERROR),
    ("Stuck_5_min", DeviceError::STUCK_5_MIN),
    ("Crash_bar_stuck", DeviceError::CRASH_BAR_STUCK),
    ("sensor_dirty", DeviceError::SENSOR_DIRTY),
    ("N_enough_pow", DeviceError::NOT_ENOUGH_POWER),
    ("Wheel_stuck", DeviceError::WHEEL_STUCK),
    ("S_brush_stuck", DeviceError::SIDE_BRUSH_STUCK),
    ("Fan_stuck", DeviceError::FAN_STUCK),
    ("R_brush_stuck", DeviceError::ROLLER_BRUSH_STUCK),
];

const DIRECTION_TOKENS: TokenTable = &[
    ("forward", Direction::FORWARD),
    ("left", Direction::LEFT),
    ("right", Direction::RIGHT),
    ("back", Direction::BACK),
];

const PLAIN_WORK_STATUS_TOKENS: TokenTable = &[
    ("running", WorkStatus::RUNNING),
    ("paused", WorkStatus::PAUSED),
    ("standby", WorkStatus::STANDBY),
    ("sleeping", WorkStatus::SLEEPING),
    ("charging", WorkStatus::CHARGING),
    ("completed", WorkStatus::CHARGING_COMPLETED),
    ("recharge", WorkStatus::RECHARGE_NEEDED),
];

const FAN_SPEED_TOKENS: TokenTable = &[
    ("quiet", FanSpeed::QUIET),
    ("standard", FanSpeed::STANDARD),
    ("turbo", FanSpeed::TURBO),
    ("max", FanSpeed::MAX),
];

/// Command table shared by the classic Tuya models
pub const DEFAULT_COMMANDS: &[SpecDef] = &[
    SpecDef::boolean(Command::Running, 2),
    SpecDef::string(Command::Direction, 3, DIRECTION_TOKENS),
    SpecDef::string(Command::WorkStatus, 15, PLAIN_WORK_STATUS_TOKENS),
    SpecDef::boolean(Command::ReturnHome, 101),
    SpecDef::boolean(Command::FindRobot, 103),
    SpecDef::number(Command::BatteryLevel, 104),
    SpecDef::string(Command::Error, 106, ERROR_TOKENS),
];

/// Classic models use the default table unchanged
pub const DEFAULT_MODEL: ModelDefinition = ModelDefinition {
    inherits: &[
        Command::Running,
        Command::Direction,
        Command::WorkStatus,
        Command::ReturnHome,
        Command::FindRobot,
        Command::BatteryLevel,
        Command::Error,
    ],
    overrides: &[],
};

/// RoboVac S1 Pro
pub const T2080: ModelDefinition = ModelDefinition {
    inherits: &[
        Command::Running,
        Command::FindRobot,
        Command::BatteryLevel,
        Command::Error,
    ],
    overrides: &[
        SpecDef::string(
            Command::WorkMode,
            152,
            &[
                ("BBoCCAE=", WorkMode::AUTO),
                ("AggN", WorkMode::PAUSE),
                ("AA==", WorkMode::SPOT),
                ("AggG", WorkMode::RETURN_HOME),
                ("AggO", WorkMode::NO_SWEEP),
                ("AggB", WorkMode::VACUUM_AND_MOP),
            ],
        ),
        SpecDef::string(
            Command::WorkStatus,
            153,
            &[
                ("CAoAEAUyAggB", WorkStatus::PAUSED),
                ("CAoCCAEQBTIA", WorkStatus::ROOM_CLEANING),
                ("CAoCCAEQBVIA", WorkStatus::ROOM_POSITIONING),
                ("DAoCCAEQBTICEAFSAA==", WorkStatus::ROOM_POSITIONING),
                ("CgoCCAEQBTICCAE=", WorkStatus::PAUSED),
                ("BhAHQgBSAA==", WorkStatus::STANDBY),
                ("BBAHQgA=", WorkStatus::RETURNING_HOME),
                ("BBADGgA=", WorkStatus::CHARGING),
                ("BhADGgIIAQ==", WorkStatus::CHARGING_COMPLETED),
                ("AA==", WorkStatus::STANDBY),
                ("AgoA", WorkStatus::RETURNING_HOME),
                ("AhAB", WorkStatus::SLEEPING),
                ("DAoCCAEQCRoCCAEyAA==", WorkStatus::ADDING_WATER),
                ("DgoAEAkaAggBMgA6AhAB", WorkStatus::ADDING_WATER),
                ("DAoAEAUaADICEAFSAA==", WorkStatus::ADDING_WATER),
                ("BhAJOgIQAg==", WorkStatus::DRYING_MOP),
                ("CBAJGgA6AhAC", WorkStatus::DRYING_MOP),
                ("ChAJGgIIAToCEAI=", WorkStatus::DRYING_MOP),
                ("DgoAEAUaAggBMgIQAVIA", WorkStatus::WASHING_MOP),
                ("EAoCCAEQCRoCCAEyADoCEAE=", WorkStatus::WASHING_MOP),
                ("BhAJOgIQAQ==", WorkStatus::WASHING_MOP),
                ("AhAJ", WorkStatus::REMOVING_WATER),
                ("BhAGGgIIAQ==", WorkStatus::MANUAL_CONTROL),
                ("BRAJ+gEA", WorkStatus::EMPTYING_DUST),
                ("BgoAEAUyAA==", WorkStatus::AUTO_CLEANING),
                ("CgoAEAkaAggBMgA=", WorkStatus::AUTO_CLEANING),
                ("CgoAEAUyAhABUgA=", WorkStatus::AUTO_CLEANING),
                // charging mid-clean
                ("DAoCCAEQAxoAMgIIAQ==", WorkStatus::CHARGING),
                // emptying dust mid-clean
                ("DQoCCAEQCTICCAH6AQA=", WorkStatus::EMPTYING_DUST),
                ("CAoAEAIyAggB", WorkStatus::ERROR),
            ],
        ),
        SpecDef::string(Command::FanSpeed, 158, FAN_SPEED_TOKENS),
    ],
};

/// RoboVac L60 family
pub const T2267: ModelDefinition = ModelDefinition {
    inherits: &[],
    overrides: &[
        SpecDef::boolean(Command::Running, 156),
        SpecDef::string(
            Command::Direction,
            155,
            &[
                ("forward", Direction::FORWARD),
                ("left", Direction::LEFT),
                ("right", Direction::RIGHT),
                ("back", Direction::BACK),
                ("brake", Direction::BRAKE),
            ],
        ),
        // tokens are known to occur but not decoded yet
        SpecDef::string(
            Command::WorkStatus,
            153,
            &[
                ("BgoAEAUyAA===", WorkStatus::UNKNOWN),
                ("BgoAEAVSAA===", WorkStatus::UNKNOWN),
                ("CAoAEAUyAggB", WorkStatus::UNKNOWN),
                ("CAoCCAEQBTIA", WorkStatus::UNKNOWN),
                ("CAoCCAEQBVIA", WorkStatus::UNKNOWN),
                ("CgoCCAEQBTICCAE=", WorkStatus::UNKNOWN),
                ("CAoCCAIQBTIA", WorkStatus::UNKNOWN),
                ("CAoCCAIQBVIA", WorkStatus::UNKNOWN),
                ("CgoCCAIQBTICCAE=", WorkStatus::UNKNOWN),
                ("BAoAEAY=", WorkStatus::UNKNOWN),
                ("BBAHQgA=", WorkStatus::UNKNOWN),
                ("BBADGgA=", WorkStatus::UNKNOWN),
                ("BhADGgIIAQ==", WorkStatus::UNKNOWN),
                ("AA==", WorkStatus::UNKNOWN),
                ("AhAB", WorkStatus::UNKNOWN),
            ],
        ),
        SpecDef::string(
            Command::FanSpeed,
            158,
            &[
                ("quiet", FanSpeed::QUIET),
                ("standard", FanSpeed::STANDARD),
                ("turbo", FanSpeed::TURBO),
                ("max", FanSpeed::MAX),
                ("boost_iq", FanSpeed::BOOST_IQ),
            ],
        ),
        SpecDef::boolean(Command::ReturnHome, 173),
        SpecDef::boolean(Command::FindRobot, 160),
        SpecDef::number(Command::BatteryLevel, 163),
        SpecDef::string(Command::Error, 177, ERROR_TOKENS),
    ],
};

/// RoboVac L50 SES
pub const T2275: ModelDefinition = ModelDefinition {
    inherits: &[],
    overrides: &[
        SpecDef::string(
            Command::WorkMode,
            152,
            &[
                ("AA==", WorkMode::SMALL_ROOM),
                ("AggN", WorkMode::PAUSE),
                ("AggG", WorkMode::EDGE),
                ("BBoCCAE=", WorkMode::AUTO),
                ("AggO", WorkMode::NO_SWEEP),
            ],
        ),
        SpecDef::string(Command::WorkStatus, 173, PLAIN_WORK_STATUS_TOKENS),
        SpecDef::string(
            Command::SpecialCommand,
            153,
            &[
                ("AggB", SpecialCommand::RETURN_HOME),
                ("AggC", SpecialCommand::FIND_ROBOT),
            ],
        ),
        SpecDef::number(Command::BatteryLevel, 172),
        SpecDef::string(Command::Error, 169, ERROR_TOKENS),
    ],
};

/// RoboVac L60 SES
pub const T2277: ModelDefinition = ModelDefinition {
    inherits: &[],
    overrides: &[
        SpecDef::string(
            Command::WorkMode,
            152,
            &[
                ("AA==", WorkMode::STANDBY),
                ("AggN", WorkMode::PAUSE),
                ("AggG", WorkMode::RETURN_HOME),
                ("BBoCCAE=", WorkMode::AUTO),
                ("AggO", WorkMode::NO_SWEEP),
            ],
        ),
        SpecDef::string(
            Command::WorkStatus,
            153,
            &[
                ("BgoAEAUyAA===", WorkStatus::AUTO_CLEANING),
                ("BgoAEAUyAA==", WorkStatus::AUTO_CLEANING),
                ("BgoAEAVSAA===", WorkStatus::ROOM_POSITIONING),
                ("BgoAEAVSAA==", WorkStatus::ROOM_POSITIONING),
                ("CAoAEAUyAggB", WorkStatus::PAUSED),
                ("AggB", WorkStatus::PAUSED),
                ("CAoCCAEQBTIA", WorkStatus::ROOM_CLEANING),
                ("CAoCCAEQBVIA", WorkStatus::ROOM_POSITIONING),
                ("CgoCCAEQBTICCAE=", WorkStatus::PAUSED),
                ("CAoCCAIQBTIA", WorkStatus::RUNNING),
                ("CAoCCAIQBVIA", WorkStatus::SPOT_POSITIONING),
                ("CgoCCAIQBTICCAE=", WorkStatus::PAUSED),
                ("BAoAEAY=", WorkStatus::MANUAL_CONTROL),
                ("BBAHQgA=", WorkStatus::RETURNING_HOME),
                ("BBADGgA=", WorkStatus::CHARGING),
                ("BhADGgIIAQ==", WorkStatus::CHARGING_COMPLETED),
                ("AA==", WorkStatus::STANDBY),
                ("AhAB", WorkStatus::SLEEPING),
            ],
        ),
        SpecDef::string(Command::FanSpeed, 158, FAN_SPEED_TOKENS),
        SpecDef::boolean(Command::FindRobot, 160),
        SpecDef::number(Command::BatteryLevel, 163),
        SpecDef::raw_string(Command::Error, 177),
    ],
};

/// RoboVac T2320
///
/// Return-home and locate share data point 152, so they are exposed as one
/// special command.
pub const T2320: ModelDefinition = ModelDefinition {
    inherits: &[Command::Running],
    overrides: &[
        SpecDef::string(
            Command::WorkStatus,
            173,
            &[
                ("auto", WorkStatus::AUTO_CLEANING),
                ("return", WorkStatus::RETURNING_HOME),
                ("pause", WorkStatus::PAUSED),
                ("small_room", WorkStatus::ROOM_CLEANING),
                ("single_room", WorkStatus::ROOM_CLEANING),
            ],
        ),
        SpecDef::string(
            Command::SpecialCommand,
            152,
            &[
                ("return_home", SpecialCommand::RETURN_HOME),
                ("locate", SpecialCommand::FIND_ROBOT),
            ],
        ),
        SpecDef::number(Command::BatteryLevel, 172),
        SpecDef::raw_string(Command::Error, 169),
    ],
};

const fn model(
    model_id: &'static str,
    model_name: &'static str,
    definition: &'static ModelDefinition,
) -> SupportedModel {
    SupportedModel {
        model_id,
        model_name,
        definition,
    }
}

/// Every model with a known command table
pub const SUPPORTED_MODELS: &[SupportedModel] = &[
    model("T2080", "RoboVac S1 Pro", &T2080),
    model("T2103", "RoboVac 11C", &DEFAULT_MODEL),
    model("T2117", "RoboVac 35C", &DEFAULT_MODEL),
    model("T2118", "RoboVac 30C", &DEFAULT_MODEL),
    model("T2119", "RoboVac 11S Plus", &DEFAULT_MODEL),
    model("T2120", "RoboVac 15C", &DEFAULT_MODEL),
    model("T2123", "RoboVac 25C", &DEFAULT_MODEL),
    model("T2128", "RoboVac 15C MAX", &DEFAULT_MODEL),
    model("T2130", "RoboVac 30C MAX", &DEFAULT_MODEL),
    model("T2132", "RoboVac 25C MAX", &DEFAULT_MODEL),
    model("T2150", "RoboVac G10 Hybrid", &DEFAULT_MODEL),
    model("T2181", "RoboVac LR30 Hybrid+", &DEFAULT_MODEL),
    model("T2190", "RoboVac L70 Hybrid", &DEFAULT_MODEL),
    model("T2192", "RoboVac L35 Hybrid+", &DEFAULT_MODEL),
    model("T2193", "RoboVac LR30 Hybrid", &DEFAULT_MODEL),
    model("T2194", "RoboVac L35 Hybrid", &DEFAULT_MODEL),
    model("T2250", "RoboVac G30", &DEFAULT_MODEL),
    model("T2251", "RoboVac G30 Edge", &DEFAULT_MODEL),
    model("T2252", "RoboVac G30 Verge", &DEFAULT_MODEL),
    model("T2253", "RoboVac G30 Hybrid", &DEFAULT_MODEL),
    model("T2254", "RoboVac G35", &DEFAULT_MODEL),
    model("T2255", "RoboVac G40", &DEFAULT_MODEL),
    model("T2259", "RoboVac G32 Pro", &DEFAULT_MODEL),
    model("T2261", "RoboVac X8 Hybrid", &DEFAULT_MODEL),
    model("T2262", "RoboVac X8", &DEFAULT_MODEL),
    model("T2267", "RoboVac L60", &T2267),
    model("T2268", "RoboVac L60 Hybrid", &T2267),
    model("T2270", "RoboVac G35+", &T2267),
    model("T2272", "RoboVac G40+", &T2267),
    model("T2273", "RoboVac G40 Hybrid+", &T2267),
    model("T2275", "RoboVac L50 SES", &T2275),
    model("T2277", "RoboVac L60 SES", &T2277),
    model("T2320", "RoboVac T2320", &T2320),
    model(FALLBACK_MODEL_ID, "default", &DEFAULT_MODEL),
];

/// Ids of every supported model
#[must_use]
pub fn supported_model_ids() -> Vec<String> {
    SUPPORTED_MODELS
        .iter()
        .map(|m| m.model_id.to_string())
        .collect()
}

/// Find the catalogue entry of a model id
#[must_use]
pub fn find_model(model_id: &str) -> Option<&'static SupportedModel> {
    SUPPORTED_MODELS.iter().find(|m| m.model_id == model_id)
}

/// Build the command registry of a model id
///
/// # Errors
///
/// Returns [`RobovacError::UnsupportedModel`] for an unknown id, or
/// [`RobovacError::DuplicateSpec`] if the model's table is inconsistent.
pub fn resolve_model(model_id: &str) -> Result<ModelRegistry> {
    let entry = find_model(model_id).ok_or_else(|| RobovacError::UnsupportedModel {
        model_id: model_id.to_string(),
        supported: supported_model_ids(),
    })?;

    let registry = entry.registry()?;
    debug!(
        "Resolved model {} ({}) with {} commands",
        entry.model_id,
        entry.model_name,
        registry.specs().count()
    );
    Ok(registry)
}
