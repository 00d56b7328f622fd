//! Screen perception for uiscript.
//!
//! Captures the live UI as an immutable arena of elements (document order
//! is arena order), optionally waiting for the screen to settle, and renders
//! snapshots into the `full`, `summary` and targeted representations.

pub mod errors;
pub mod model;
pub mod policy;
pub mod ports;
pub mod render;
pub mod sampler;

pub use errors::PerceiverError;
pub use model::{ElementDescriptor, ElementRef, NodeIndex, ScreenSnapshot, UiElement};
pub use policy::StabilizePolicy;
pub use ports::ScreenSource;
pub use render::{render_full, render_subtrees, render_summary, SummaryEntry};
pub use sampler::Snapshotter;
