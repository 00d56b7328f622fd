//! Recovery orchestration across the AI boundary
//!
//! The [`RecoveryOrchestrator`] plugs into the script engine as its recovery
//! handler. It speaks the recovery contract with a [`RecoveryAgent`] and
//! never lets an unchecked answer reach the engine. [`ScriptBuilder`] turns
//! agent tool calls into validated scripts.

pub mod builder;
pub mod config;
pub mod contract;
pub mod errors;
pub mod orchestrator;
pub mod provider;

pub use builder::{step_from_tool_call, ScriptBuilder};
pub use config::RecoveryConfig;
pub use contract::{
    ContractLimits, HistoryEntry, RecoveryRequest, RecoveryResponse, KIND_CORRECTIVE,
    KIND_TERMINAL,
};
pub use errors::{AgentError, ContractError};
pub use orchestrator::RecoveryOrchestrator;
pub use provider::{HttpRecoveryAgent, MockRecoveryAgent, RecoveryAgent};
