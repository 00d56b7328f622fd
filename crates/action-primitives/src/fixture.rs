//! Deterministic in-memory device
//!
//! Replays an ordered list of screens. Scrolling down or right advances the
//! screen cursor, scrolling up or left moves it back, and taps on declared
//! elements jump to another screen. Typed text is written into the current
//! screen so later reads observe it. Every input is recorded.

use async_trait::async_trait;
use parking_lot::Mutex;
use perceiver_structural::{ElementDescriptor, PerceiverError, ScreenSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::device::{Device, ElementTarget, ScrollDirection};
use crate::errors::DeviceError;

/// Tap on `on_tap` moves to screen `goto`, optionally only from screen `from`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureTransition {
    pub on_tap: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<usize>,
    pub goto: usize,
}

/// Serializable description of a fixture device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureSpec {
    pub screens: Vec<Vec<ElementDescriptor>>,
    #[serde(default)]
    pub transitions: Vec<FixtureTransition>,
    /// Element ids whose input the device rejects
    #[serde(default)]
    pub failing: Vec<String>,
}

/// On-disk screen file: either a full fixture or a single element forest
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FixtureFile {
    Device(FixtureSpec),
    Screen(Vec<ElementDescriptor>),
}

impl From<FixtureFile> for FixtureSpec {
    fn from(file: FixtureFile) -> Self {
        match file {
            FixtureFile::Device(spec) => spec,
            FixtureFile::Screen(screen) => FixtureSpec {
                screens: vec![screen],
                ..FixtureSpec::default()
            },
        }
    }
}

/// Input recorded by the fixture
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    Tap { element_id: String },
    LongPress { element_id: String, duration_ms: u64 },
    Clear { element_id: String },
    Type { element_id: String, text: String },
    Scroll { direction: ScrollDirection },
}

#[derive(Debug)]
struct FixtureState {
    screens: Vec<Vec<ElementDescriptor>>,
    cursor: usize,
    events: Vec<DeviceEvent>,
}

/// Scripted device for tests and dry runs
#[derive(Debug)]
pub struct FixtureDevice {
    state: Mutex<FixtureState>,
    transitions: Vec<FixtureTransition>,
    failing: Vec<String>,
}

impl FixtureDevice {
    pub fn new(screens: Vec<Vec<ElementDescriptor>>) -> Self {
        Self::from_spec(FixtureSpec {
            screens,
            ..FixtureSpec::default()
        })
    }

    /// Device that always shows one screen
    pub fn single(screen: Vec<ElementDescriptor>) -> Self {
        Self::new(vec![screen])
    }

    pub fn from_spec(spec: FixtureSpec) -> Self {
        Self {
            state: Mutex::new(FixtureState {
                screens: spec.screens,
                cursor: 0,
                events: Vec::new(),
            }),
            transitions: spec.transitions,
            failing: spec.failing,
        }
    }

    pub fn with_transition(mut self, on_tap: impl Into<String>, goto: usize) -> Self {
        self.transitions.push(FixtureTransition {
            on_tap: on_tap.into(),
            from: None,
            goto,
        });
        self
    }

    /// Reject every input aimed at `element_id`
    pub fn with_failing(mut self, element_id: impl Into<String>) -> Self {
        self.failing.push(element_id.into());
        self
    }

    pub fn cursor(&self) -> usize {
        self.state.lock().cursor
    }

    pub fn set_cursor(&self, cursor: usize) {
        let mut state = self.state.lock();
        state.cursor = cursor.min(state.screens.len().saturating_sub(1));
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.state.lock().events.clone()
    }

    /// Ids of tapped elements in order
    pub fn taps(&self) -> Vec<String> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                DeviceEvent::Tap { element_id } => Some(element_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn scroll_count(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|event| matches!(event, DeviceEvent::Scroll { .. }))
            .count()
    }

    fn check_target(&self, target: &ElementTarget) -> Result<(), DeviceError> {
        if self.failing.iter().any(|id| *id == target.element_id) {
            return Err(DeviceError::Rejected(format!(
                "input to '{}' was rejected",
                target.element_id
            )));
        }
        Ok(())
    }

    fn edit_text<F>(&self, element_id: &str, edit: F)
    where
        F: Fn(&mut Option<String>),
    {
        let mut state = self.state.lock();
        let cursor = state.cursor;
        if let Some(screen) = state.screens.get_mut(cursor) {
            if let Some(element) = find_mut(screen, element_id) {
                edit(&mut element.text);
            }
        }
    }
}

fn find_mut<'a>(
    forest: &'a mut [ElementDescriptor],
    element_id: &str,
) -> Option<&'a mut ElementDescriptor> {
    for element in forest.iter_mut() {
        if element.id == element_id {
            return Some(element);
        }
        if let Some(found) = find_mut(&mut element.children, element_id) {
            return Some(found);
        }
    }
    None
}

#[async_trait]
impl ScreenSource for FixtureDevice {
    async fn dump_tree(&self) -> Result<Vec<ElementDescriptor>, PerceiverError> {
        let state = self.state.lock();
        Ok(state.screens.get(state.cursor).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl Device for FixtureDevice {
    async fn tap(&self, target: &ElementTarget) -> Result<(), DeviceError> {
        self.check_target(target)?;
        let mut state = self.state.lock();
        state.events.push(DeviceEvent::Tap {
            element_id: target.element_id.clone(),
        });
        let from = state.cursor;
        let last = state.screens.len().saturating_sub(1);
        if let Some(transition) = self
            .transitions
            .iter()
            .find(|t| t.on_tap == target.element_id && t.from.map_or(true, |f| f == from))
        {
            state.cursor = transition.goto.min(last);
        }
        Ok(())
    }

    async fn long_press(&self, target: &ElementTarget, duration: Duration) -> Result<(), DeviceError> {
        self.check_target(target)?;
        self.state.lock().events.push(DeviceEvent::LongPress {
            element_id: target.element_id.clone(),
            duration_ms: duration.as_millis() as u64,
        });
        Ok(())
    }

    async fn clear(&self, target: &ElementTarget) -> Result<(), DeviceError> {
        self.check_target(target)?;
        self.state.lock().events.push(DeviceEvent::Clear {
            element_id: target.element_id.clone(),
        });
        self.edit_text(&target.element_id, |text| *text = None);
        Ok(())
    }

    async fn type_text(&self, target: &ElementTarget, text: &str) -> Result<(), DeviceError> {
        self.check_target(target)?;
        self.state.lock().events.push(DeviceEvent::Type {
            element_id: target.element_id.clone(),
            text: text.to_string(),
        });
        self.edit_text(&target.element_id, |current| {
            let mut next = current.take().unwrap_or_default();
            next.push_str(text);
            *current = Some(next);
        });
        Ok(())
    }

    async fn scroll(&self, direction: ScrollDirection) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if state.screens.is_empty() {
            return Err(DeviceError::Unavailable("fixture has no screens".to_string()));
        }
        state.events.push(DeviceEvent::Scroll { direction });
        let last = state.screens.len() - 1;
        state.cursor = match direction {
            ScrollDirection::Down | ScrollDirection::Right => (state.cursor + 1).min(last),
            ScrollDirection::Up | ScrollDirection::Left => state.cursor.saturating_sub(1),
        };
        Ok(())
    }
}
