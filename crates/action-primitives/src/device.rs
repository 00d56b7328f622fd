//! Device port
//!
//! The executor drives a device through this trait only. How input is
//! physically delivered (accessibility service, adb, simulator bridge) is the
//! implementor's concern.

use async_trait::async_trait;
use perceiver_structural::{ScreenSource, UiElement};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uiscript_core_types::Bounds;

use crate::errors::DeviceError;

/// Element an input is delivered to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementTarget {
    pub element_id: String,
    pub bounds: Bounds,
}

impl From<&UiElement> for ElementTarget {
    fn from(element: &UiElement) -> Self {
        Self {
            element_id: element.id.clone(),
            bounds: element.bounds,
        }
    }
}

/// Direction of one scroll unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrollDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            "left" => Ok(ScrollDirection::Left),
            "right" => Ok(ScrollDirection::Right),
            other => Err(format!("unknown scroll direction '{other}'")),
        }
    }
}

/// Live device session
///
/// One in-flight call per run at a time; the engine's sequential step model
/// guarantees this, so implementations need no extra locking for ordering.
/// Calls that have started are allowed to finish even if the run is
/// cancelled meanwhile.
#[async_trait]
pub trait Device: ScreenSource {
    async fn tap(&self, target: &ElementTarget) -> Result<(), DeviceError>;

    async fn long_press(&self, target: &ElementTarget, duration: Duration) -> Result<(), DeviceError>;

    /// Remove all text from an editable element
    async fn clear(&self, target: &ElementTarget) -> Result<(), DeviceError>;

    async fn type_text(&self, target: &ElementTarget, text: &str) -> Result<(), DeviceError>;

    /// Scroll the screen by one unit
    async fn scroll(&self, direction: ScrollDirection) -> Result<(), DeviceError>;
}
