//! Script model and execution engine
//!
//! A [`Script`] is an ordered list of [`Step`]s with variable bindings. The
//! [`ScriptEngine`] runs it one step at a time against a device, hands every
//! failure to a [`RecoveryHandler`] and always returns a [`RunRecord`].

pub mod codec;
pub mod errors;
pub mod executor;
pub mod record;
pub mod request;
pub mod schema;
pub mod state;
pub mod strategies;
pub mod types;
pub mod vars;

pub use codec::ScriptFormat;
pub use errors::{FlowError, SchemaError, StepError};
pub use executor::{EngineConfig, ScriptEngine, ScriptRunner};
pub use record::{
    AbortInfo, AbortReason, AuditDecision, CorrectiveRun, RecoveryAudit, RunRecord, RunStatus,
    StepOrigin, StepRecord, StepResult,
};
pub use request::build_request;
pub use schema::{validate_script, validate_step, validate_steps, SchemaOptions};
pub use state::{EngineState, StateMachine, StateTransition};
pub use strategies::{RecoveryContext, RecoveryDecision, RecoveryHandler, RecoveryOutcome};
pub use types::{ParamValue, RecoveryHint, Script, Step, VarRef};
pub use vars::Variables;
