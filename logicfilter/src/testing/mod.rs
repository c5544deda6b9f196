//! Testing utilities for the enhancement pipeline.
//!
//! This module provides:
//! - A scripted in-memory [`ModelClient`](crate::client::ModelClient)
//! - Sleepers that record backoff delays instead of waiting
//! - Configuration fixtures with one distinct model per phase

mod fixtures;
mod mocks;

pub use fixtures::{isolated_config, phase_model, PRESENTER_MODEL};
pub use mocks::{CallRecord, NoSleep, RecordingSleeper, ScriptedClient};
