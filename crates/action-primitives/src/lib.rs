//! Action executor
//!
//! This crate provides the single-action building blocks a script step runs:
//! - 7 primitives: tap, long_press, clear, type, read_screen, scroll_to_find, wait
//! - a `Device` port the primitives drive, plus a deterministic fixture device
//! - typed failures (`NoTarget`, `AmbiguousTarget`, `NotFound`, `Timeout`,
//!   `DeviceError`, `Cancelled`) instead of errors

pub mod device;
pub mod errors;
pub mod fixture;
mod primitives;
pub mod types;

pub use device::*;
pub use errors::*;
pub use fixture::{DeviceEvent, FixtureDevice, FixtureFile, FixtureSpec, FixtureTransition};
pub use primitives::*;
pub use types::*;
