//! The two request-facing orchestrators (§4.6, §4.7): bulk submission,
//! the hard concurrency-control problem this service exists to solve, and
//! batch creation, a much simpler non-atomic per-draft persistence loop.

pub mod batch_create;
pub mod bulk_submit;

pub use batch_create::BatchCreateOrchestrator;
pub use bulk_submit::{BulkSubmitOrchestrator, SubmitError};
