//! Element selectors
//!
//! Declarative selectors with ordered fallbacks, their canonical text form,
//! and deterministic resolution against a [`perceiver_structural::ScreenSnapshot`].

pub mod errors;
pub mod parser;
pub mod resolver;
pub mod types;

pub use errors::*;
pub use parser::parse_selector;
pub use resolver::*;
pub use types::*;
