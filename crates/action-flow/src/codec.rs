//! Script text forms (JSON and YAML)

use std::path::Path;

use crate::errors::FlowError;
use crate::types::Script;

/// Serialized script format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFormat {
    Json,
    Yaml,
}

impl ScriptFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, FlowError> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Ok(ScriptFormat::Json),
            Some("yaml") | Some("yml") => Ok(ScriptFormat::Yaml),
            _ => Err(FlowError::UnknownFormat(path.display().to_string())),
        }
    }
}

impl Script {
    pub fn from_json(text: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self, FlowError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn parse(text: &str, format: ScriptFormat) -> Result<Self, FlowError> {
        match format {
            ScriptFormat::Json => Self::from_json(text),
            ScriptFormat::Yaml => Self::from_yaml(text),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String, FlowError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn render(&self, format: ScriptFormat) -> Result<String, FlowError> {
        match format {
            ScriptFormat::Json => self.to_json_pretty(),
            ScriptFormat::Yaml => self.to_yaml(),
        }
    }

    /// Read a script file, format chosen by extension
    pub fn load(path: &Path) -> Result<Self, FlowError> {
        let format = ScriptFormat::from_path(path)?;
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParamValue, RecoveryHint, Step};
    use action_locator::Selector;
    use action_primitives::ActionKind;
    use serde_json::json;

    fn sample() -> Script {
        Script::new("checkout")
            .with_variable("qty", json!(2))
            .with_variable("card", json!({"last4": "4242"}))
            .with_step(
                Step::tap(Selector::parse(r#"id=cart || role=button && text="View cart""#).unwrap())
                    .with_id("open-cart")
                    .with_hint(
                        RecoveryHint::new("a promo banner sometimes covers the cart")
                            .with_fallback(Selector::parse("text~=cart @first").unwrap()),
                    ),
            )
            .with_step(
                Step::new(ActionKind::ScrollToFind)
                    .with_selector(Selector::parse("text=Checkout").unwrap())
                    .with_param("direction", json!("down"))
                    .with_param("max_attempts", ParamValue::var("qty")),
            )
            .with_step(Step::read_screen("summary").with_capture("screen"))
            .with_step(
                Step::new(ActionKind::Wait)
                    .with_param("condition", json!("stable"))
                    .with_param("timeout_ms", json!(1500)),
            )
    }

    #[test]
    fn json_round_trip_preserves_steps() {
        let script = sample();
        let text = script.to_json_pretty().unwrap();
        let back = Script::from_json(&text).unwrap();
        assert_eq!(back, script);
    }

    #[test]
    fn yaml_round_trip_preserves_steps() {
        let script = sample();
        let text = script.to_yaml().unwrap();
        let back = Script::from_yaml(&text).unwrap();
        assert_eq!(back.steps, script.steps);
        assert_eq!(back.variables, script.variables);
    }

    #[test]
    fn parses_hand_written_yaml() {
        let text = r#"
name: settings
variables:
  target: Wi-Fi
steps:
  - action: scroll_to_find
    selector: text=Settings
    params:
      direction: down
      max_attempts: 5
  - action: tap
    selector: 'text="${target}"'
  - action: read_screen
    params: { format: summary }
    capture: after
"#;
        let script = Script::from_yaml(text).unwrap();
        assert_eq!(script.steps.len(), 3);
        assert_eq!(script.steps[0].action, ActionKind::ScrollToFind);
        assert_eq!(script.steps[2].capture.as_deref(), Some("after"));
        assert!(script.validate().is_ok());
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            ScriptFormat::from_path(Path::new("a/b.YML")).unwrap(),
            ScriptFormat::Yaml
        );
        assert_eq!(
            ScriptFormat::from_path(Path::new("flow.json")).unwrap(),
            ScriptFormat::Json
        );
        assert!(ScriptFormat::from_path(Path::new("flow.txt")).is_err());
    }

    #[test]
    fn rejects_bad_selector_text() {
        let text = r#"{"name": "x", "steps": [{"action": "tap", "selector": "id="}]}"#;
        assert!(Script::from_json(text).is_err());
    }
}
