//! Long-running background work and built-in event subscribers.
//!
//! - `ExpirationSweeper`: closes voting on expired group wagers on an interval
//! - `TopHolderTracker`: recomputes the richest account on `BalanceChanged`
//! - `AuditLog`: writes every committed event to the tracing log

pub mod audit_log;
pub mod expiration_sweeper;
pub mod top_holder;

pub use audit_log::AuditLog;
pub use expiration_sweeper::ExpirationSweeper;
pub use top_holder::{TopHolder, TopHolderTracker};
