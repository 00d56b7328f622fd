//! Script variables and `${name}` substitution

use action_locator::Selector;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::StepError;
use crate::types::ParamValue;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.\-]*)\}").expect("placeholder regex"));

static VARIABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("variable name regex"));

/// True when `name` can be bound and referenced as `${name}`
pub fn is_valid_name(name: &str) -> bool {
    VARIABLE_NAME.is_match(name)
}

/// Names referenced by `${..}` placeholders in `text`, in order of appearance
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Every variable a parameter refers to
pub fn param_references(param: &ParamValue) -> Vec<String> {
    match param {
        ParamValue::Var(var) => vec![var.var.clone()],
        ParamValue::Literal(value) => {
            let mut names = Vec::new();
            collect_value_refs(value, &mut names);
            names
        }
    }
}

/// Every variable a selector refers to
pub fn selector_references(selector: &Selector) -> Vec<String> {
    let mut names = Vec::new();
    selector.visit_values(|value| names.extend(placeholders(value)));
    names
}

fn collect_value_refs(value: &Value, names: &mut Vec<String>) {
    match value {
        Value::String(text) => names.extend(placeholders(text)),
        Value::Array(items) => items.iter().for_each(|item| collect_value_refs(item, names)),
        Value::Object(map) => map.values().for_each(|item| collect_value_refs(item, names)),
        _ => {}
    }
}

/// Text form of a bound value: strings verbatim, everything else compact JSON
fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Script-scoped variable bindings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    bindings: BTreeMap<String, Value>,
}

impl Variables {
    pub fn new(initial: BTreeMap<String, Value>) -> Self {
        Self { bindings: initial }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Bind or rebind `name`; later substitutions see the new value
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.bindings.clone()
    }

    /// Replace every `${name}` in `text` with its binding
    pub fn interpolate(&self, text: &str) -> Result<String, StepError> {
        if let Some(missing) = placeholders(text)
            .into_iter()
            .find(|name| !self.contains(name))
        {
            return Err(StepError::UnboundVariable(missing));
        }
        Ok(self.substitute(text))
    }

    /// Resolve a parameter to its current value
    pub fn resolve(&self, param: &ParamValue) -> Result<Value, StepError> {
        match param {
            ParamValue::Var(var) => self
                .get(&var.var)
                .cloned()
                .ok_or_else(|| StepError::UnboundVariable(var.var.clone())),
            ParamValue::Literal(value) => self.resolve_value(value),
        }
    }

    /// Substitute variables into every value of a selector
    pub fn resolve_selector(&self, selector: &Selector) -> Result<Selector, StepError> {
        if let Some(missing) = selector_references(selector)
            .into_iter()
            .find(|name| !self.contains(name))
        {
            return Err(StepError::UnboundVariable(missing));
        }
        Ok(selector.map_values(|value| self.substitute(value)))
    }

    fn resolve_value(&self, value: &Value) -> Result<Value, StepError> {
        Ok(match value {
            Value::String(text) => Value::String(self.interpolate(text)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.resolve_value(item))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| Ok((key.clone(), self.resolve_value(item)?)))
                    .collect::<Result<_, StepError>>()?,
            ),
            other => other.clone(),
        })
    }

    fn substitute(&self, text: &str) -> String {
        PLACEHOLDER
            .replace_all(text, |caps: &regex::Captures<'_>| {
                self.get(&caps[1])
                    .map(render)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

impl From<BTreeMap<String, Value>> for Variables {
    fn from(bindings: BTreeMap<String, Value>) -> Self {
        Self::new(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> Variables {
        let mut vars = Variables::default();
        vars.set("user", json!("alice"));
        vars.set("count", json!(3));
        vars.set("screen", json!([{"id": "a"}]));
        vars
    }

    #[test]
    fn interpolates_strings_and_structured_values() {
        let vars = vars();
        assert_eq!(vars.interpolate("hi ${user}").unwrap(), "hi alice");
        assert_eq!(vars.interpolate("${count} items").unwrap(), "3 items");
        assert_eq!(vars.interpolate("${screen}").unwrap(), r#"[{"id":"a"}]"#);
        assert_eq!(vars.interpolate("no placeholders").unwrap(), "no placeholders");
    }

    #[test]
    fn unbound_placeholder_is_an_error() {
        assert_eq!(
            vars().interpolate("${nobody}"),
            Err(StepError::UnboundVariable("nobody".into()))
        );
    }

    #[test]
    fn var_refs_keep_their_type() {
        let vars = vars();
        assert_eq!(vars.resolve(&ParamValue::var("count")).unwrap(), json!(3));
        assert_eq!(
            vars.resolve(&ParamValue::Literal(json!({"msg": "${user}!"}))).unwrap(),
            json!({"msg": "alice!"})
        );
    }

    #[test]
    fn most_recent_binding_wins() {
        let mut vars = vars();
        vars.set("user", json!("bob"));
        assert_eq!(vars.interpolate("${user}").unwrap(), "bob");
    }

    #[test]
    fn selectors_are_substituted_value_by_value() {
        let vars = vars();
        let selector = Selector::parse("id=list >> text=${user}").unwrap();
        assert_eq!(selector_references(&selector), vec!["user"]);
        let resolved = vars.resolve_selector(&selector).unwrap();
        assert_eq!(resolved.to_string(), "id=list >> text=alice");

        let dangling = Selector::parse("text=${ghost}").unwrap();
        assert!(vars.resolve_selector(&dangling).is_err());
    }

    #[test]
    fn name_rules() {
        assert!(is_valid_name("user_name"));
        assert!(is_valid_name("screen.summary"));
        assert!(!is_valid_name("1st"));
        assert!(!is_valid_name(""));
        assert_eq!(placeholders("${a} and ${b.c}"), vec!["a", "b.c"]);
    }
}
