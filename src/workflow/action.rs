//! Shared machinery for per-workflow action enums.
//!
//! Spec §9's "Dynamic action dispatch" note calls for a tagged variant per workflow instead
//! of a string action name paired with a separate dispatch table, so that an action the
//! prompt never listed cannot silently reach the tool gateway. `RawAction` is the one place
//! untyped JSON survives; every domain module converts it into its own enum immediately and
//! nothing downstream ever matches on a bare string again.

use serde::Deserialize;
use serde_json::{Map, Value};

/// The execute node's parsed response, before it has been validated against a domain's
/// action set.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAction {
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Why a `RawAction` could not be converted into a domain's action enum.
#[derive(Debug, Clone)]
pub struct ActionParseError {
    pub detail: String,
}

impl ActionParseError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }

    pub fn missing_field(action: &str, field: &str) -> Self {
        Self::new(format!("{} is missing required parameter '{}'", action, field))
    }
}

/// Implemented once per workflow domain (`CodingAction`, `ResearchAction`, `DataAction`,
/// `GeneralAction`). `action_names`/`parameter_schema` let the execute node's prompt builder
/// derive its action listing from the type instead of keeping a second, driftable copy.
pub trait ActionSet: Sized + Send + Sync + 'static {
    /// The fixed enumeration this domain recognizes, `COMPLETE` last.
    fn action_names() -> &'static [&'static str];

    /// A short, human-readable parameter schema per action, in the same order as
    /// `action_names`, for the execute prompt.
    fn prompt_schema() -> &'static str;

    fn from_raw(raw: RawAction) -> Result<Self, ActionParseError>;

    fn is_complete(&self) -> bool;

    /// `summary` carried by a `COMPLETE` action, if this is one.
    fn complete_summary(&self) -> Option<&str>;

    /// The action name this value was built from (for `tool_calls` bookkeeping).
    fn name(&self) -> &'static str;

    /// Reconstructs this action's parameters as JSON, for the safety checker and the
    /// `tool_executed` event's `params` field. `COMPLETE` carries none.
    fn to_parameters(&self) -> Map<String, Value>;
}

fn string_param<'a>(params: &'a Map<String, Value>, action: &str, field: &str) -> Result<&'a str, ActionParseError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ActionParseError::missing_field(action, field))
}

pub(super) use string_param as param_str;
