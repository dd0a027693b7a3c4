//! Agent loop primitives (turns, events, approvals).

pub mod approvals;
pub mod events;
pub mod runner;
pub mod types;

pub use approvals::{
    approval_reason, rejection_message, ApprovalRequest, ApprovalStore, InMemoryApprovalStore,
    PendingApproval,
};
pub use events::{EventEmitter, EventStream, StreamEvent, ToolResultEvent, WireEvent};
pub use runner::ToolLoop;
pub use types::{LoopOutcome, LoopRequest};
