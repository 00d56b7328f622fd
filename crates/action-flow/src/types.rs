//! Script model

use action_locator::Selector;
use action_primitives::ActionKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Ordered list of steps plus declared variables
///
/// Steps are fixed once a run starts; only variable bindings change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Script identifier
    pub name: String,

    /// Declared variables and their initial values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, Value>,

    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: BTreeMap::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Reference to a script variable, kept with its JSON type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VarRef {
    pub var: String,
}

/// Step parameter: literal value or whole-value variable reference
///
/// Strings inside literals may still contain `${name}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Var(VarRef),
    Literal(Value),
}

impl ParamValue {
    pub fn var(name: impl Into<String>) -> Self {
        ParamValue::Var(VarRef { var: name.into() })
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        ParamValue::Literal(value)
    }
}

/// Author guidance for recovering a specific step
///
/// Passed verbatim to the recovery agent. Never used during normal
/// execution, not even the fallback selectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryHint {
    pub guidance: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_selectors: Vec<Selector>,
}

impl RecoveryHint {
    pub fn new(guidance: impl Into<String>) -> Self {
        Self {
            guidance: guidance.into(),
            fallback_selectors: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, selector: Selector) -> Self {
        self.fallback_selectors.push(selector);
        self
    }
}

/// One action of a script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Optional author label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub action: ActionKind,

    /// Target selector; optional for screen-level actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ParamValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery_hints: Vec<RecoveryHint>,

    /// Variable that receives the step's success value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<String>,
}

impl Step {
    pub fn new(action: ActionKind) -> Self {
        Self {
            id: None,
            action,
            selector: None,
            params: BTreeMap::new(),
            recovery_hints: Vec::new(),
            capture: None,
        }
    }

    pub fn tap(selector: Selector) -> Self {
        Self::new(ActionKind::Tap).with_selector(selector)
    }

    pub fn type_text(selector: Selector, text: impl Into<String>) -> Self {
        Self::new(ActionKind::TypeText)
            .with_selector(selector)
            .with_param("text", Value::String(text.into()))
    }

    pub fn read_screen(format: &str) -> Self {
        Self::new(ActionKind::ReadScreen).with_param("format", Value::String(format.to_string()))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_hint(mut self, hint: RecoveryHint) -> Self {
        self.recovery_hints.push(hint);
        self
    }

    pub fn with_capture(mut self, name: impl Into<String>) -> Self {
        self.capture = Some(name.into());
        self
    }

    /// Human label: the id when present, else the action name
    pub fn label(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| self.action.name().to_string())
    }
}
