//! Plan execution.

mod executor;
mod types;

pub use executor::{Executor, approval_rationale};
pub use types::{
    ApprovalContext, DUPLICATE_OUTPUT, ExecutionDisposition, Plan, PlanStep, StepErrorKind,
    StepResult,
};
