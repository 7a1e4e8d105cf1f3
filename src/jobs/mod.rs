//! Background jobs run by the scheduler and by the one-shot CLI commands.
//!
//! - `extraction_job` - resume both series from their watermarks
//! - `training_job` - train and save the price model
//!
//! Each entry point takes the run lock for its job kind, so overlapping
//! invocations of the same kind are skipped rather than queued.

pub mod extraction_job;
pub mod training_job;
