//! Reconciliation between the relational and the document store
//!
//! - [`Reconciler`]: decides which store is authoritative for a user
//! - [`Repairer`]: brings the losing store up to date
//! - [`RepairPool`]: runs repairs in the background

pub mod reconciler;
pub mod repair;
pub mod worker;

pub use reconciler::Reconciler;
pub use repair::{RepairHandler, RepairScheduler, RepairTask, Repairer};
pub use worker::{RepairFailure, RepairPool, RepairStats, RepairStatsSnapshot};
