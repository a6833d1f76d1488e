//! Subsystem modules. Each one except `comms` registers a bus handler with
//! the supervisor.

pub mod agents;
pub mod comms;
#[cfg(feature = "subsystem-cron")]
pub mod cron;
pub mod llm;
pub mod memory;
pub mod runtime;
pub mod tasks;
pub mod tools;
