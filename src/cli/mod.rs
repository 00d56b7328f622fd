pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod fixtures;
pub mod output;
pub mod read_screen;
pub mod resolve;
pub mod run;
pub mod runtime;
pub mod validate;

pub use app::run;
