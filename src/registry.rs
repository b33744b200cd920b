//! Per-model command registry
//!
//! A [`ModelRegistry`] binds every command a model supports to its data point
//! code, its value kind and, for string commands, the table translating vendor
//! tokens into [`SemanticValue`]s.

use std::{collections::HashMap, fmt};

use crate::{
    error::{Result, RobovacError},
    types::{Command, SemanticValue, ValueKind},
};

/// Raw token ↔ semantic value table of one string command
///
/// Tokens are matched case-insensitively. The original spelling is kept for
/// writes, since some tokens are base64 payloads that the device only accepts
/// verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    entries: Vec<(String, SemanticValue)>,
    by_token: HashMap<String, usize>,
}

impl StringTable {
    /// Build a table from `(raw token, value)` pairs
    ///
    /// When two tokens collide after lowercasing, the first one wins.
    #[must_use]
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, SemanticValue)>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for (token, value) in entries {
            let token = token.into();
            let key = token.to_lowercase();
            if table.by_token.contains_key(&key) {
                continue;
            }
            table.by_token.insert(key, table.entries.len());
            table.entries.push((token, value));
        }
        table
    }

    /// Look up a raw token, ignoring case
    #[must_use]
    pub fn decode(&self, token: &str) -> Option<&SemanticValue> {
        self.by_token
            .get(&token.to_lowercase())
            .map(|&index| &self.entries[index].1)
    }

    /// First raw token mapped to the given semantic id
    #[must_use]
    pub fn encode(&self, id: u16) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, value)| value.id == id)
            .map(|(token, _)| token.as_str())
    }

    /// Number of distinct tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True for a table without tokens
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(raw token, value)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SemanticValue)> {
        self.entries.iter().map(|(token, value)| (token.as_str(), value))
    }
}

/// Binding of one command to a data point of a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Semantic command
    pub command: Command,
    /// Data point code on the wire
    pub code: u32,
    /// Value kind of the data point
    pub kind: ValueKind,
    /// Token table for string commands
    pub string_values: Option<StringTable>,
}

impl CommandSpec {
    /// Spec for a boolean data point
    #[must_use]
    pub const fn boolean(command: Command, code: u32) -> Self {
        Self {
            command,
            code,
            kind: ValueKind::Boolean,
            string_values: None,
        }
    }

    /// Spec for a numeric data point
    #[must_use]
    pub const fn number(command: Command, code: u32) -> Self {
        Self {
            command,
            code,
            kind: ValueKind::Number,
            string_values: None,
        }
    }

    /// Spec for a string data point
    #[must_use]
    pub fn string(command: Command, code: u32, string_values: Option<StringTable>) -> Self {
        Self {
            command,
            code,
            kind: ValueKind::StringEnum,
            string_values,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command='{}' code={} kind={}", self.command, self.code, self.kind)
    }
}

/// Immutable command table of one hardware model
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    model_id: String,
    model_name: String,
    specs: Vec<CommandSpec>,
    by_command: HashMap<Command, usize>,
    by_code: HashMap<u32, usize>,
}

impl ModelRegistry {
    /// Index the specs of a model
    ///
    /// # Errors
    ///
    /// Returns [`RobovacError::DuplicateSpec`] if two specs share a command or
    /// a wire code.
    pub fn new(
        model_id: impl Into<String>,
        model_name: impl Into<String>,
        specs: Vec<CommandSpec>,
    ) -> Result<Self> {
        let mut registry = Self {
            model_id: model_id.into(),
            model_name: model_name.into(),
            specs: Vec::with_capacity(specs.len()),
            by_command: HashMap::new(),
            by_code: HashMap::new(),
        };

        for spec in specs {
            if let Some(&index) = registry.by_command.get(&spec.command) {
                return Err(registry.duplicate(
                    format!("command '{}'", spec.command),
                    index,
                    &spec,
                ));
            }
            if let Some(&index) = registry.by_code.get(&spec.code) {
                return Err(registry.duplicate(format!("code {}", spec.code), index, &spec));
            }

            let index = registry.specs.len();
            registry.by_command.insert(spec.command, index);
            registry.by_code.insert(spec.code, index);
            registry.specs.push(spec);
        }

        Ok(registry)
    }

    fn duplicate(&self, conflict: String, existing: usize, duplicate: &CommandSpec) -> RobovacError {
        RobovacError::DuplicateSpec {
            model_id: self.model_id.clone(),
            model_name: self.model_name.clone(),
            conflict,
            existing: self.specs[existing].to_string(),
            duplicate: duplicate.to_string(),
        }
    }

    /// Model id, e.g. `T2118`
    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Marketing name of the model
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Spec bound to a command
    #[must_use]
    pub fn by_command(&self, command: Command) -> Option<&CommandSpec> {
        self.by_command.get(&command).map(|&index| &self.specs[index])
    }

    /// Spec bound to a data point code
    #[must_use]
    pub fn by_code(&self, code: u32) -> Option<&CommandSpec> {
        self.by_code.get(&code).map(|&index| &self.specs[index])
    }

    /// True if the model supports the command
    #[must_use]
    pub fn supports(&self, command: Command) -> bool {
        self.by_command.contains_key(&command)
    }

    /// All specs in declaration order
    pub fn specs(&self) -> impl Iterator<Item = &CommandSpec> {
        self.specs.iter()
    }
}
