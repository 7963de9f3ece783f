//! Reconciliation, accuracy aggregation and store checks

pub mod aggregate;
pub mod reconcile;
pub mod verify;

pub use aggregate::{aggregate, ModelResultSet, ModelSummary};
pub use reconcile::{reconcile, JoinMismatchError, Reconciliation, ReconciledRecord, SingleYesPolicy};
pub use verify::{verify_store, VerificationReport};
