//! Human approval workflow for write steps.

mod service;
mod store;
mod types;

pub use service::ApprovalService;
pub use store::{APPROVALS_FILE, ApprovalStore};
pub use types::{ApprovalOutcome, ApprovalStatus, PendingApproval};
