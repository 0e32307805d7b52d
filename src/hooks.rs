//! Hook selection: maps input/output hook tags to adapter constructors.

use crate::adapters::{HttpSink, JsonLinesSource};
use crate::{ConnectorError, ConnectorResult, InputAdapter, OutputAdapter, RetrySettings};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Adapter-specific parameters, forwarded verbatim from the configuration
pub type HookParams = serde_json::Map<String, Value>;

/// Everything a hook constructor receives
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub dag_name: &'a str,
    pub params: &'a HookParams,
    pub retry: &'a RetrySettings,
}

pub type InputConstructor =
    Box<dyn Fn(&HookContext<'_>) -> ConnectorResult<Box<dyn InputAdapter>> + Send + Sync>;
pub type OutputConstructor =
    Box<dyn Fn(&HookContext<'_>) -> ConnectorResult<Box<dyn OutputAdapter>> + Send + Sync>;

/// Input hook selector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InputHookType {
    /// Newline-delimited JSON files
    JsonLines,
    /// A constructor registered by the caller
    Custom(String),
}

/// Output hook selector
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OutputHookType {
    /// JSON POST per event
    Http,
    /// A constructor registered by the caller
    Custom(String),
}

fn parse_tag(raw: &str, kind: &str) -> ConnectorResult<String> {
    let tag = raw.trim().to_ascii_lowercase();
    if tag.is_empty() {
        return Err(ConnectorError::config(format!("{kind} hook tag must not be empty")));
    }
    Ok(tag)
}

impl FromStr for InputHookType {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = parse_tag(s, "input")?;
        Ok(match tag.as_str() {
            "jsonl" | "json_lines" => InputHookType::JsonLines,
            _ => InputHookType::Custom(tag),
        })
    }
}

impl FromStr for OutputHookType {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = parse_tag(s, "output")?;
        Ok(match tag.as_str() {
            "http" => OutputHookType::Http,
            _ => OutputHookType::Custom(tag),
        })
    }
}

impl fmt::Display for InputHookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputHookType::JsonLines => f.write_str("jsonl"),
            InputHookType::Custom(tag) => f.write_str(tag),
        }
    }
}

impl fmt::Display for OutputHookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputHookType::Http => f.write_str("http"),
            OutputHookType::Custom(tag) => f.write_str(tag),
        }
    }
}

impl TryFrom<String> for InputHookType {
    type Error = ConnectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for OutputHookType {
    type Error = ConnectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InputHookType> for String {
    fn from(value: InputHookType) -> Self {
        value.to_string()
    }
}

impl From<OutputHookType> for String {
    fn from(value: OutputHookType) -> Self {
        value.to_string()
    }
}

/// Registry of adapter constructors keyed by hook tag
///
/// [`HookRegistry::default`] holds the built-in hooks; callers add their own
/// adapters under custom tags.
pub struct HookRegistry {
    inputs: HashMap<InputHookType, InputConstructor>,
    outputs: HashMap<OutputHookType, OutputConstructor>,
}

impl HookRegistry {
    /// A registry with no hooks at all
    pub fn empty() -> Self {
        Self {
            inputs: HashMap::new(),
            outputs: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for an input hook
    pub fn register_input<F>(&mut self, hook: InputHookType, constructor: F)
    where
        F: Fn(&HookContext<'_>) -> ConnectorResult<Box<dyn InputAdapter>> + Send + Sync + 'static,
    {
        self.inputs.insert(hook, Box::new(constructor));
    }

    /// Register (or replace) the constructor for an output hook
    pub fn register_output<F>(&mut self, hook: OutputHookType, constructor: F)
    where
        F: Fn(&HookContext<'_>) -> ConnectorResult<Box<dyn OutputAdapter>> + Send + Sync + 'static,
    {
        self.outputs.insert(hook, Box::new(constructor));
    }

    /// Build the input adapter selected by `hook`
    pub fn build_input(
        &self,
        hook: &InputHookType,
        ctx: &HookContext<'_>,
    ) -> ConnectorResult<Box<dyn InputAdapter>> {
        let constructor = self
            .inputs
            .get(hook)
            .ok_or_else(|| ConnectorError::config(format!("Unknown input hook: {}", hook)))?;
        constructor(ctx)
    }

    /// Build the output adapter selected by `hook`
    pub fn build_output(
        &self,
        hook: &OutputHookType,
        ctx: &HookContext<'_>,
    ) -> ConnectorResult<Box<dyn OutputAdapter>> {
        let constructor = self
            .outputs
            .get(hook)
            .ok_or_else(|| ConnectorError::config(format!("Unknown output hook: {}", hook)))?;
        constructor(ctx)
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_input(InputHookType::JsonLines, |ctx| {
            Ok(Box::new(JsonLinesSource::from_params(ctx.params)?))
        });
        registry.register_output(OutputHookType::Http, |ctx| {
            Ok(Box::new(HttpSink::from_params(ctx.params, ctx.retry)?))
        });
        registry
    }
}

/// Read a required, non-empty string parameter
pub fn required_str(params: &HookParams, field: &str) -> ConnectorResult<String> {
    if let Some(Value::String(raw)) = params.get(field) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    Err(ConnectorError::config(format!("{field} must not be empty")))
}

/// Read an optional positive integer parameter
pub fn optional_u64(params: &HookParams, field: &str) -> ConnectorResult<Option<u64>> {
    match params.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) if v > 0 => Ok(Some(v)),
            _ => Err(ConnectorError::config(format!(
                "{field} must be a positive integer"
            ))),
        },
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|v| *v > 0)
            .map(Some)
            .ok_or_else(|| ConnectorError::config(format!("{field} must be a positive integer"))),
        Some(_) => Err(ConnectorError::config(format!(
            "{field} must be a positive integer"
        ))),
    }
}
